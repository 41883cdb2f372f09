//! Schema resolution against the remote table dictionary.
//!
//! The resolver reads the dictionary rows of a ticket table (and the base
//! `task` type it inherits from), maps every column's internal type to an
//! output type, and synthesizes descriptors for reference expansions and
//! derived values. The result is a [`ResolvedSchema`]: the ordered fetch
//! list, a descriptor lookup table, and the output field metadata.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use geojson::JsonValue;
use log::{debug, info, warn};
use snowgeo_core_common::{DictionaryQuery, RawRecord, TableSource};

use crate::error::{ResolutionError, Result};
use crate::identity::IdentityMode;
use crate::tables::{BASE_TABLE, TableDefinition};
use crate::types::{
    CodedField, FieldDescriptor, FieldPath, FieldRole, LocationSlot, OutputField, OutputType,
    TypeMapping, map_internal_type,
};
use crate::utils::{JsonValueExt, parse_max_length};

/// Reference columns that always expand to a `<field>.name` sub-field.
const USER_REFERENCE_FIELDS: [&str; 3] = ["assigned_to", "opened_by", "caller_id"];

/// Reference target tables treated as user records.
const USER_TARGET_TABLES: [&str; 1] = ["sys_user"];

/// How the output name of an expanded sub-field is formed.
#[derive(Debug, Clone, Copy)]
enum OutputName {
    /// A fixed property name.
    Fixed(&'static str),
    /// The reference column name followed by a suffix.
    Suffixed(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Alias {
    /// Reuse the reference column's label.
    Inherit,
    Fixed(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct SubFieldOutput {
    name: OutputName,
    alias: Alias,
    output_type: OutputType,
}

/// One dotted sub-field fetched for a reference column.
#[derive(Debug, Clone, Copy)]
struct SubField {
    path: &'static [&'static str],
    internal_type: &'static str,
    output: Option<SubFieldOutput>,
}

const fn exposed(
    path: &'static [&'static str],
    internal_type: &'static str,
    name: OutputName,
    alias: Alias,
    output_type: OutputType,
) -> SubField {
    SubField {
        path,
        internal_type,
        output: Some(SubFieldOutput {
            name,
            alias,
            output_type,
        }),
    }
}

const fn fetched_only(path: &'static [&'static str]) -> SubField {
    SubField {
        path,
        internal_type: "string",
        output: None,
    }
}

const LOCATION_SUB_FIELDS: [SubField; 6] = [
    exposed(
        &["name"],
        "string",
        OutputName::Suffixed("_name"),
        Alias::Inherit,
        OutputType::String,
    ),
    fetched_only(&["parent", "name"]),
    fetched_only(&["parent", "parent", "name"]),
    exposed(
        &["latitude"],
        "double",
        OutputName::Fixed("latitude"),
        Alias::Fixed("Latitude"),
        OutputType::Double,
    ),
    exposed(
        &["longitude"],
        "double",
        OutputName::Fixed("longitude"),
        Alias::Fixed("Longitude"),
        OutputType::Double,
    ),
    exposed(
        &["elevation"],
        "double",
        OutputName::Fixed("elevation"),
        Alias::Fixed("Elevation"),
        OutputType::Double,
    ),
];

const LOCATION_SLOTS: [(LocationSlot, &str); 3] = [
    (LocationSlot::Unit, "Unit"),
    (LocationSlot::Level, "Level"),
    (LocationSlot::Facility, "Facility"),
];

const USER_SUB_FIELDS: [SubField; 1] = [exposed(
    &["name"],
    "string",
    OutputName::Suffixed("_name"),
    Alias::Inherit,
    OutputType::String,
)];

/// Reference columns the engine knows how to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceKind {
    Location,
    User,
}

impl ReferenceKind {
    fn classify(field: &str, target: Option<&str>) -> Option<Self> {
        if field == "location" {
            Some(ReferenceKind::Location)
        } else if USER_REFERENCE_FIELDS.contains(&field)
            || target.is_some_and(|t| USER_TARGET_TABLES.contains(&t))
        {
            Some(ReferenceKind::User)
        } else {
            None
        }
    }

    fn sub_fields(self) -> &'static [SubField] {
        match self {
            ReferenceKind::Location => &LOCATION_SUB_FIELDS,
            ReferenceKind::User => &USER_SUB_FIELDS,
        }
    }
}

/// One dictionary row, normalized.
#[derive(Debug, Clone)]
struct DictionaryColumn {
    table: String,
    element: String,
    alias: String,
    internal_type: String,
    max_length: Option<u32>,
    reference_target: Option<String>,
}

impl DictionaryColumn {
    fn from_row(row: &RawRecord) -> Option<Self> {
        let string = |key: &str| {
            row.get(key)
                .and_then(JsonValue::as_non_empty_str)
                .map(str::to_string)
        };
        let element = string("element")?;
        Some(Self {
            table: string("name").unwrap_or_default(),
            alias: string("column_label").unwrap_or_else(|| element.clone()),
            element,
            internal_type: row
                .get("internal_type")
                .and_then(JsonValue::reference_value)
                .unwrap_or_default()
                .to_string(),
            max_length: parse_max_length(row.get("max_length")),
            reference_target: row
                .get("reference")
                .and_then(JsonValue::reference_value)
                .map(str::to_string),
        })
    }
}

/// The schema of one ticket table as seen by this engine.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    /// The table this schema describes.
    pub table: &'static TableDefinition,
    /// All descriptors, sorted by field key.
    pub descriptors: Vec<FieldDescriptor>,
    /// Field keys requested from the remote table, in descriptor order.
    pub fetch_fields: Vec<String>,
    /// Output field metadata, identity field first when tracked.
    pub output_fields: Vec<OutputField>,
    /// Identity handling for this schema.
    pub identity: IdentityMode,
    fields_by_field: HashMap<String, usize>,
}

impl ResolvedSchema {
    /// Builds a schema from dictionary rows.
    ///
    /// Rows without an element name are skipped. When the same element is
    /// described by both the requested table and the base type, the
    /// requested table's row wins. Unknown internal types are logged and
    /// dropped.
    #[must_use]
    pub fn from_dictionary(
        table: &'static TableDefinition,
        rows: &[RawRecord],
        identity: IdentityMode,
    ) -> Self {
        let mut columns: BTreeMap<String, DictionaryColumn> = BTreeMap::new();
        for row in rows {
            let Some(column) = DictionaryColumn::from_row(row) else {
                debug!("Skipping dictionary row without element: {row:?}");
                continue;
            };
            match columns.entry(column.element.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(column);
                },
                Entry::Occupied(mut slot) => {
                    if column.table == table.source_table
                        && slot.get().table != table.source_table
                    {
                        slot.insert(column);
                    }
                },
            }
        }

        let mut by_key: BTreeMap<String, FieldDescriptor> = BTreeMap::new();
        let mut synthesized = Vec::new();
        for column in columns.values() {
            let (descriptor, extra) = describe_column(column);
            by_key.insert(descriptor.key(), descriptor);
            synthesized.extend(extra);
        }
        for descriptor in synthesized {
            let key = descriptor.key();
            if by_key.contains_key(&key) {
                debug!("Synthesized field '{key}' replaces a dictionary column");
            }
            by_key.insert(key, descriptor);
        }

        // BTreeMap iteration gives the sorted field-key order
        let mut descriptors: Vec<FieldDescriptor> = by_key.into_values().collect();

        let mut output_names = HashSet::new();
        if let Some(field) = identity.oid_field() {
            output_names.insert(field.to_string());
        }
        for descriptor in &mut descriptors {
            let duplicate = descriptor
                .output
                .as_ref()
                .is_some_and(|o| !output_names.insert(o.name.clone()));
            if duplicate {
                debug!(
                    "Output name already taken; '{}' is not exposed",
                    descriptor.key()
                );
                descriptor.output = None;
            }
        }

        let fetch_fields = descriptors
            .iter()
            .filter(|d| d.supported && d.fetch)
            .map(FieldDescriptor::key)
            .collect();

        let mut output_fields = Vec::new();
        if let Some(field) = identity.oid_field() {
            output_fields.push(OutputField::identity(field));
        }
        output_fields.extend(
            descriptors
                .iter()
                .filter(|d| d.supported)
                .filter_map(|d| d.output.clone()),
        );

        let fields_by_field = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key(), i))
            .collect();

        Self {
            table,
            descriptors,
            fetch_fields,
            output_fields,
            identity,
            fields_by_field,
        }
    }

    /// Looks up a descriptor by exact field key.
    #[must_use]
    pub fn descriptor(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields_by_field.get(key).map(|i| &self.descriptors[*i])
    }

    /// Returns `true` if the location chain is part of this schema.
    #[must_use]
    pub fn has_location(&self) -> bool {
        self.descriptors
            .iter()
            .any(|d| matches!(d.role, FieldRole::Location(_)))
    }

    /// Coded fields whose labels are exposed.
    pub fn coded_labels(&self) -> impl Iterator<Item = CodedField> + '_ {
        self.descriptors.iter().filter_map(|d| match d.role {
            FieldRole::CodedLabel(coded) => Some(coded),
            _ => None,
        })
    }
}

/// Builds the descriptor for a dictionary column plus any synthesized descriptors.
fn describe_column(column: &DictionaryColumn) -> (FieldDescriptor, Vec<FieldDescriptor>) {
    let field = column.element.as_str();
    let mapping = map_internal_type(&column.internal_type);
    let mut descriptor = FieldDescriptor {
        table: column.table.clone(),
        field: FieldPath::parse(field),
        alias: column.alias.clone(),
        internal_type: column.internal_type.clone(),
        max_length: column.max_length,
        supported: false,
        fetch: true,
        output: None,
        role: FieldRole::Column,
    };
    let mut extra = Vec::new();

    match mapping {
        TypeMapping::Output(output_type) => {
            descriptor.supported = true;
            let coded = (output_type == OutputType::Integer)
                .then(|| CodedField::from_field(field))
                .flatten();
            if let Some(coded) = coded {
                // only the label is exposed
                descriptor.role = FieldRole::Coded(coded);
                extra.push(FieldDescriptor::synthetic(
                    FieldPath::parse(coded.label_field()),
                    &column.alias,
                    "string",
                    Some(OutputField::new(
                        coded.label_field(),
                        &column.alias,
                        OutputType::String,
                        None,
                    )),
                    false,
                    FieldRole::CodedLabel(coded),
                ));
            } else {
                descriptor.output = Some(OutputField::new(
                    field,
                    &column.alias,
                    output_type,
                    column.max_length,
                ));
            }
            debug!(
                "{}.{}: {} -> {output_type}",
                column.table, field, column.internal_type
            );
        },
        TypeMapping::Reference => {
            match ReferenceKind::classify(field, column.reference_target.as_deref()) {
                Some(kind) => extra.extend(expand_reference(column, kind)),
                None => debug!(
                    "{}.{}: reference to {:?} is not expanded",
                    column.table, field, column.reference_target
                ),
            }
        },
        TypeMapping::Ignored => {
            info!(
                "{}.{}: {} is not supported",
                column.table, field, column.internal_type
            );
        },
        TypeMapping::Unknown => {
            warn!(
                "Unknown internal_type {} {} {}",
                column.table, field, column.internal_type
            );
        },
    }

    (descriptor, extra)
}

fn expand_reference(column: &DictionaryColumn, kind: ReferenceKind) -> Vec<FieldDescriptor> {
    let root = column.element.as_str();
    let mut descriptors: Vec<FieldDescriptor> = kind
        .sub_fields()
        .iter()
        .map(|sub| {
            let output = sub.output.map(|out| {
                let name = match out.name {
                    OutputName::Fixed(name) => name.to_string(),
                    OutputName::Suffixed(suffix) => format!("{root}{suffix}"),
                };
                let alias = match out.alias {
                    Alias::Inherit => column.alias.as_str(),
                    Alias::Fixed(alias) => alias,
                };
                OutputField::new(&name, alias, out.output_type, None)
            });
            let alias = output
                .as_ref()
                .map_or_else(|| column.alias.clone(), |o| o.alias.clone());
            FieldDescriptor::synthetic(
                FieldPath::nested(root, sub.path),
                &alias,
                sub.internal_type,
                output,
                true,
                FieldRole::Column,
            )
        })
        .collect();

    if kind == ReferenceKind::Location {
        descriptors.extend(LOCATION_SLOTS.iter().map(|(slot, alias)| {
            FieldDescriptor::synthetic(
                FieldPath::parse(slot.output_name()),
                alias,
                "string",
                Some(OutputField::new(
                    slot.output_name(),
                    alias,
                    OutputType::String,
                    None,
                )),
                false,
                FieldRole::Location(*slot),
            )
        }));
    }
    descriptors
}

/// Resolves table schemas through a [`TableSource`].
pub struct SchemaResolver<'a, S: ?Sized> {
    source: &'a S,
    identity: &'a IdentityMode,
}

impl<'a, S> SchemaResolver<'a, S>
where
    S: TableSource + ?Sized,
{
    /// Creates a resolver reading from `source`.
    #[must_use]
    pub fn new(source: &'a S, identity: &'a IdentityMode) -> Self {
        Self { source, identity }
    }

    /// Queries the dictionary for `table` and its base type and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] if the dictionary query fails. An empty
    /// dictionary is logged and yields an empty schema.
    pub async fn resolve(&self, table: &'static TableDefinition) -> Result<ResolvedSchema> {
        let query = DictionaryQuery::with_base(table.source_table, BASE_TABLE);
        let rows = self
            .source
            .query_dictionary(&query)
            .await
            .map_err(|source| ResolutionError {
                table: table.source_table.to_string(),
                source,
            })?;

        if rows.is_empty() {
            warn!(
                "Unable to read schema for {}: dictionary query '{}' returned no rows",
                table.source_table,
                query.encoded_filter()
            );
        }

        Ok(ResolvedSchema::from_dictionary(
            table,
            &rows,
            self.identity.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TicketTable;
    use serde_json::json;

    fn row(table: &str, element: &str, label: &str, internal_type: &str) -> RawRecord {
        json!({
            "name": table,
            "element": element,
            "column_label": label,
            "internal_type": {"link": "https://example/api", "value": internal_type},
            "max_length": "40"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn incident() -> &'static TableDefinition {
        TicketTable::Incident.definition()
    }

    #[test]
    fn test_basic_mapping_and_sorting() {
        let rows = vec![
            row("task", "short_description", "Short description", "string"),
            row("task", "number", "Number", "string"),
            row("task", "opened_at", "Opened", "glide_date_time"),
            row("task", "sys_id", "Sys ID", "GUID"),
            row("task", "work_notes", "Work notes", "journal_input"),
            row("task", "comments_and_work_notes", "Comments", "journal_list"),
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);

        assert_eq!(
            schema.fetch_fields,
            vec![
                "number",
                "opened_at",
                "short_description",
                "sys_id",
                "work_notes"
            ]
        );
        let names: Vec<&str> = schema
            .output_fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "number",
                "opened_at",
                "short_description",
                "sys_id",
                "work_notes"
            ]
        );
        let dropped = schema.descriptor("comments_and_work_notes").unwrap();
        assert!(!dropped.supported);
        assert!(dropped.output.is_none());
        assert_eq!(
            schema.descriptor("number").unwrap().output.as_ref().unwrap().length,
            Some(40)
        );
    }

    #[test]
    fn test_unknown_type_is_dropped() {
        let rows = vec![
            row("task", "number", "Number", "string"),
            row("task", "hologram", "Hologram", "hologram_3d"),
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);
        assert_eq!(schema.fetch_fields, vec!["number"]);
        assert!(!schema.descriptor("hologram").unwrap().supported);
        assert_eq!(schema.output_fields.len(), 1);
    }

    #[test]
    fn test_coded_fields_expose_labels_only() {
        let rows = vec![
            row("task", "priority", "Priority", "integer"),
            row("task", "state", "State", "integer"),
            row("task", "impact", "Impact", "integer"),
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);

        assert_eq!(schema.fetch_fields, vec!["impact", "priority", "state"]);
        let names: Vec<&str> = schema
            .output_fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["impact", "priority_label", "state_label"]);

        let label = schema.descriptor("state_label").unwrap();
        assert!(!label.fetch);
        assert_eq!(label.role, FieldRole::CodedLabel(CodedField::State));
        assert_eq!(label.alias, "State");
        assert_eq!(
            schema.descriptor("priority").unwrap().role,
            FieldRole::Coded(CodedField::Priority)
        );
        let labels: Vec<CodedField> = schema.coded_labels().collect();
        assert_eq!(labels, vec![CodedField::Priority, CodedField::State]);
    }

    #[test]
    fn test_location_expansion() {
        let rows = vec![row("task", "location", "Location", "reference")];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);

        assert_eq!(
            schema.fetch_fields,
            vec![
                "location.elevation",
                "location.latitude",
                "location.longitude",
                "location.name",
                "location.parent.name",
                "location.parent.parent.name",
            ]
        );
        let names: Vec<&str> = schema
            .output_fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "elevation",
                "latitude",
                "longitude",
                "location_name",
                "location_facility_name",
                "location_level_name",
                "location_unit_name",
            ]
        );
        assert!(schema.has_location());
        let reference = schema.descriptor("location").unwrap();
        assert!(!reference.supported);
        let name = schema.descriptor("location.name").unwrap();
        assert_eq!(name.output.as_ref().unwrap().alias, "Location");
        assert_eq!(name.alias, "Location");
        assert_eq!(name.table, crate::types::SYNTHETIC_TABLE);
        // expanded descriptors carry the alias of their output field
        assert_eq!(schema.descriptor("location.latitude").unwrap().alias, "Latitude");
        let parent = schema.descriptor("location.parent.name").unwrap();
        assert!(parent.output.is_none());
        assert_eq!(parent.alias, "Location");
        let unit = schema.descriptor("location_unit_name").unwrap();
        assert!(!unit.fetch);
        assert_eq!(unit.alias, "Unit");
    }

    #[test]
    fn test_user_reference_expansion() {
        let mut by_target = row("incident", "resolved_by", "Resolved by", "reference");
        by_target.insert("reference".to_string(), json!({"value": "sys_user"}));
        let mut other = row("task", "company", "Company", "reference");
        other.insert("reference".to_string(), json!("core_company"));
        let rows = vec![
            row("task", "assigned_to", "Assigned to", "reference"),
            row("task", "opened_by", "Opened by", "reference"),
            row("incident", "caller_id", "Caller", "reference"),
            by_target,
            other,
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);

        assert_eq!(
            schema.fetch_fields,
            vec![
                "assigned_to.name",
                "caller_id.name",
                "opened_by.name",
                "resolved_by.name"
            ]
        );
        let caller = schema.descriptor("caller_id.name").unwrap();
        let output = caller.output.as_ref().unwrap();
        assert_eq!(output.name, "caller_id_name");
        assert_eq!(output.alias, "Caller");
        assert!(schema.descriptor("company.name").is_none());
        assert!(!schema.has_location());
    }

    #[test]
    fn test_table_row_wins_over_base() {
        let rows = vec![
            row("task", "state", "Task state", "string"),
            row("incident", "state", "Incident state", "integer"),
            row("task", "number", "Number", "string"),
            row("sc_request", "number", "Request number", "string"),
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);
        let state = schema.descriptor("state").unwrap();
        assert_eq!(state.table, "incident");
        assert_eq!(state.internal_type, "integer");
        // neither row belongs to the requested table, so the first one stays
        assert_eq!(schema.descriptor("number").unwrap().alias, "Number");
        assert_eq!(
            schema.fetch_fields.iter().filter(|f| *f == "state").count(),
            1
        );
    }

    #[test]
    fn test_tracked_identity_prepends_oid() {
        let rows = vec![
            row("task", "sys_id", "Sys ID", "GUID"),
            row("task", "number", "Number", "string"),
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::tracked());
        assert_eq!(schema.output_fields[0].name, "OBJECTID");
        assert_eq!(schema.output_fields[0].output_type, OutputType::Oid);
        assert_eq!(schema.output_fields.len(), 3);
        // the identity is never fetched
        assert!(!schema.fetch_fields.contains(&"OBJECTID".to_string()));
    }

    #[test]
    fn test_objectid_source_field_prepends_oid() {
        let rows = vec![
            row("task", "objectid", "Object id", "integer"),
            row("task", "number", "Number", "string"),
        ];
        let identity = IdentityMode::SourceField {
            field: "objectid".to_string(),
        };
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, identity);
        assert_eq!(schema.output_fields[0].name, "objectid");
        assert_eq!(schema.output_fields[0].output_type, OutputType::Oid);
        // the source column is still fetched but not listed twice
        assert!(schema.fetch_fields.contains(&"objectid".to_string()));
        assert_eq!(
            schema
                .output_fields
                .iter()
                .filter(|f| f.name == "objectid")
                .count(),
            1
        );

        let identity = IdentityMode::SourceField {
            field: "number".to_string(),
        };
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, identity);
        assert!(
            schema
                .output_fields
                .iter()
                .all(|f| f.output_type != OutputType::Oid)
        );
    }

    #[test]
    fn test_rows_without_element_are_skipped() {
        let mut collection = row("incident", "", "Incident", "collection");
        collection.remove("element");
        let rows = vec![collection, row("task", "number", "Number", "string")];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);
        assert_eq!(schema.descriptors.len(), 1);
    }

    #[test]
    fn test_internal_type_as_plain_string() {
        let rows = vec![
            json!({"name": "task", "element": "number", "column_label": "Number", "internal_type": "string"})
                .as_object()
                .unwrap()
                .clone(),
        ];
        let schema = ResolvedSchema::from_dictionary(incident(), &rows, IdentityMode::Disabled);
        assert_eq!(schema.fetch_fields, vec!["number"]);
        assert_eq!(
            schema.output_fields[0].length,
            Some(128),
            "no max_length falls back to the default"
        );
    }
}
