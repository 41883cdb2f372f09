//! Registry of the ticket tables this engine can publish.
//!
//! Only two tables are supported. Each entry records the request ids that
//! select it, the source table queried upstream, and the display metadata
//! attached to the output collection.
//!
//! # Examples
//!
//! ```
//! use snowgeo_core::tables::{TicketTable, find_table};
//!
//! let table = find_table("requests").expect("requests should be supported");
//! assert_eq!(table.kind, TicketTable::Request);
//! assert_eq!(table.source_table, "sc_request");
//! assert!(find_table("widgets").is_none());
//! ```

use std::fmt;

use crate::error::{Result, SnowGeoError};

/// Base type every ticket table inherits columns from.
pub const BASE_TABLE: &str = "task";

/// The supported ticket tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketTable {
    /// Incident tickets (`incident`).
    Incident,
    /// Service catalog requests (`sc_request`).
    Request,
}

impl TicketTable {
    /// Returns every supported table.
    #[must_use]
    pub const fn all() -> [TicketTable; 2] {
        [TicketTable::Incident, TicketTable::Request]
    }

    /// Returns the registry entry for this table.
    #[must_use]
    pub fn definition(self) -> &'static TableDefinition {
        match self {
            TicketTable::Incident => &TABLES[0],
            TicketTable::Request => &TABLES[1],
        }
    }
}

impl fmt::Display for TicketTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition().source_table)
    }
}

/// Static description of a supported ticket table.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    /// Which table this is.
    pub kind: TicketTable,
    /// Request id used in service paths (e.g. `"incidents"`).
    pub id: &'static str,
    /// Additional request ids accepted for this table.
    pub aliases: &'static [&'static str],
    /// Table name queried upstream.
    pub source_table: &'static str,
    /// Display name of the published layer.
    pub display_name: &'static str,
    /// Description of the published layer.
    pub description: &'static str,
    /// Property used as the label of each feature.
    pub display_field: &'static str,
}

impl TableDefinition {
    /// Returns `true` if `id` selects this table.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        self.id == id || self.aliases.contains(&id)
    }
}

static TABLES: [TableDefinition; 2] = [
    TableDefinition {
        kind: TicketTable::Incident,
        id: "incidents",
        aliases: &[],
        source_table: "incident",
        display_name: "ServiceNow Incidents",
        description: "ServiceNow Incidents",
        display_field: "number",
    },
    TableDefinition {
        kind: TicketTable::Request,
        id: "requests",
        aliases: &["sc_request"],
        source_table: "sc_request",
        display_name: "ServiceNow Requests",
        description: "ServiceNow Requests",
        display_field: "number",
    },
];

/// Returns all table definitions in registry order.
#[must_use]
pub fn get_tables() -> &'static [TableDefinition] {
    &TABLES
}

/// Returns the request ids of all supported tables.
#[must_use]
pub fn get_table_ids() -> Vec<&'static str> {
    TABLES.iter().map(|t| t.id).collect()
}

/// Looks up a table by request id or alias.
#[must_use]
pub fn find_table(id: &str) -> Option<&'static TableDefinition> {
    TABLES.iter().find(|t| t.matches(id))
}

/// Looks up a table by request id, failing with [`SnowGeoError::UnsupportedTable`].
///
/// # Errors
///
/// Returns an error if `id` does not name a supported table.
pub fn resolve_table(id: &str) -> Result<&'static TableDefinition> {
    find_table(id).ok_or_else(|| unsupported_table(id))
}

/// Builds an [`SnowGeoError::UnsupportedTable`] listing the supported ids.
#[must_use]
pub fn unsupported_table(id: &str) -> SnowGeoError {
    SnowGeoError::UnsupportedTable {
        requested: id.to_string(),
        available: get_table_ids().join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_incidents() {
        let table = find_table("incidents").unwrap();
        assert_eq!(table.kind, TicketTable::Incident);
        assert_eq!(table.source_table, "incident");
        assert_eq!(table.display_field, "number");
    }

    #[test]
    fn test_find_request_by_alias() {
        let by_id = find_table("requests").unwrap();
        let by_alias = find_table("sc_request").unwrap();
        assert_eq!(by_id.kind, by_alias.kind);
        assert_eq!(by_alias.display_name, "ServiceNow Requests");
    }

    #[test]
    fn test_source_table_name_is_not_an_id() {
        // `incident` is the upstream name, not a request id
        assert!(find_table("incident").is_none());
    }

    #[test]
    fn test_resolve_unsupported_table() {
        let err = resolve_table("widgets").unwrap_err();
        match err {
            SnowGeoError::UnsupportedTable {
                requested,
                available,
            } => {
                assert_eq!(requested, "widgets");
                assert_eq!(available, "incidents, requests");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_definition_round_trips_kind() {
        for kind in TicketTable::all() {
            assert_eq!(kind.definition().kind, kind);
        }
        assert_eq!(TicketTable::Request.to_string(), "sc_request");
    }
}
