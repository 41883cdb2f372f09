//! Process-stable integer identities for ticket rows.
//!
//! Rendering clients need a numeric row identifier that stays the same across
//! requests. Each supported table owns an [`IdentityStore`] mapping the row's
//! natural key (`sys_id`) to an integer assigned on first sight. Entries are
//! never reassigned or removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::tables::TicketTable;

/// Natural key column of every ticket table.
pub const NATURAL_KEY_FIELD: &str = "sys_id";

/// Identity field name used when synthetic identities are tracked.
pub const DEFAULT_IDENTITY_FIELD: &str = "OBJECTID";

/// How the output collection identifies its features.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityMode {
    /// No identity field is advertised.
    #[default]
    Disabled,
    /// Integer identities are assigned from the natural key and written to `field`.
    Tracked {
        /// Output property holding the identity
        field: String,
    },
    /// An existing source column is advertised as the identity field.
    SourceField {
        /// Source column name
        field: String,
    },
}

impl IdentityMode {
    /// Tracked identities written to [`DEFAULT_IDENTITY_FIELD`].
    #[must_use]
    pub fn tracked() -> Self {
        IdentityMode::Tracked {
            field: DEFAULT_IDENTITY_FIELD.to_string(),
        }
    }

    /// Field advertised as `idField`, if any.
    #[must_use]
    pub fn id_field(&self) -> Option<&str> {
        match self {
            IdentityMode::Disabled => None,
            IdentityMode::Tracked { field } | IdentityMode::SourceField { field } => Some(field),
        }
    }

    /// Field receiving synthetic identities, if tracking is enabled.
    #[must_use]
    pub fn tracked_field(&self) -> Option<&str> {
        match self {
            IdentityMode::Tracked { field } => Some(field),
            _ => None,
        }
    }

    /// Field listed first in the metadata as the OID column.
    ///
    /// Tracked identities always get one; a source field only when it is
    /// named like [`DEFAULT_IDENTITY_FIELD`] (any case).
    #[must_use]
    pub fn oid_field(&self) -> Option<&str> {
        match self {
            IdentityMode::Tracked { field } => Some(field),
            IdentityMode::SourceField { field }
                if field.eq_ignore_ascii_case(DEFAULT_IDENTITY_FIELD) =>
            {
                Some(field)
            },
            _ => None,
        }
    }
}

/// Assigns integer identities to natural keys.
///
/// Implementations must hand out strictly increasing identities and return
/// the same identity for a key on every later call.
pub trait IdentityStore: Send + Sync + fmt::Debug {
    /// Returns the identity for `natural_key`, assigning one on first sight.
    fn identity_for(&self, natural_key: &str) -> i64;

    /// Number of keys seen so far.
    fn len(&self) -> usize;

    /// Returns `true` if no key has been seen.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct IdentityState {
    next: i64,
    ids: HashMap<String, i64>,
}

/// Mutex-guarded in-memory [`IdentityStore`], living as long as the process.
#[derive(Debug)]
pub struct InMemoryIdentityStore {
    state: Mutex<IdentityState>,
}

impl InMemoryIdentityStore {
    /// Creates an empty store whose first identity is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an empty store whose first identity is `first`.
    #[must_use]
    pub fn starting_at(first: i64) -> Self {
        Self {
            state: Mutex::new(IdentityState {
                next: first,
                ids: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for InMemoryIdentityStore {
    fn identity_for(&self, natural_key: &str) -> i64 {
        // assignment never leaves the map half-updated, so a poisoned lock is still consistent
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = state.ids.get(natural_key) {
            return *id;
        }
        let id = state.next;
        state.next += 1;
        state.ids.insert(natural_key.to_string(), id);
        id
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }
}

/// One identity store per supported table.
#[derive(Debug, Clone)]
pub struct IdentityRegistries {
    incident: Arc<dyn IdentityStore>,
    request: Arc<dyn IdentityStore>,
}

impl IdentityRegistries {
    /// Creates fresh in-memory stores for both tables.
    #[must_use]
    pub fn new() -> Self {
        Self::with_stores(
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(InMemoryIdentityStore::new()),
        )
    }

    /// Uses caller-provided stores.
    #[must_use]
    pub fn with_stores(incident: Arc<dyn IdentityStore>, request: Arc<dyn IdentityStore>) -> Self {
        Self { incident, request }
    }

    /// Returns the store owned by `table`.
    #[must_use]
    pub fn for_table(&self, table: TicketTable) -> Arc<dyn IdentityStore> {
        match table {
            TicketTable::Incident => Arc::clone(&self.incident),
            TicketTable::Request => Arc::clone(&self.request),
        }
    }
}

impl Default for IdentityRegistries {
    fn default() -> Self {
        Self::new()
    }
}
