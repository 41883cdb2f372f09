//! Field descriptor types shared by the schema, assembly, and collection stages.
//!
//! A [`FieldDescriptor`] describes either a column reported by the remote
//! dictionary or a virtual column synthesized from a reference expansion. The
//! mapping from the remote internal type tag to an [`OutputType`] is closed:
//! every tag resolves to a [`TypeMapping`] arm, with unknown tags kept apart
//! from the ones that are deliberately ignored.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Sentinel table name for synthesized descriptors.
pub const SYNTHETIC_TABLE: &str = "_ref_";

/// Output column type understood by rendering clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// Integer object identity.
    Oid,
    /// Whole number.
    Integer,
    /// Floating point number.
    Double,
    /// Text.
    String,
    /// UTC date-time rendered as ISO 8601.
    Date,
}

impl OutputType {
    /// Type name emitted in field metadata.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            OutputType::Oid => "esriFieldTypeOID",
            OutputType::Integer => "Integer",
            OutputType::Double => "Double",
            OutputType::String => "String",
            OutputType::Date => "Date",
        }
    }

    /// SQL type name emitted in field metadata.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            OutputType::Oid => "sqlTypeInteger",
            _ => "sqlTypeOther",
        }
    }

    /// Length reported when the dictionary does not declare one.
    #[must_use]
    pub fn default_length(self) -> Option<u32> {
        match self {
            OutputType::String => Some(128),
            OutputType::Date => Some(36),
            _ => None,
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// How a remote internal type is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMapping {
    /// The column is fetched and exposed with this output type.
    Output(OutputType),
    /// The column is a reference; only expanded sub-fields are exposed.
    Reference,
    /// A known type this engine deliberately drops.
    Ignored,
    /// A type tag this engine has never seen.
    Unknown,
}

impl TypeMapping {
    /// Returns the output type, if the column is exposed directly.
    #[must_use]
    pub fn output_type(self) -> Option<OutputType> {
        match self {
            TypeMapping::Output(t) => Some(t),
            _ => None,
        }
    }
}

/// Maps a remote internal type tag to its handling.
///
/// ```
/// use snowgeo_core::types::{OutputType, TypeMapping, map_internal_type};
///
/// assert_eq!(map_internal_type("integer"), TypeMapping::Output(OutputType::Integer));
/// assert_eq!(map_internal_type("glide_date_time"), TypeMapping::Output(OutputType::Date));
/// assert_eq!(map_internal_type("journal"), TypeMapping::Ignored);
/// assert_eq!(map_internal_type("hologram"), TypeMapping::Unknown);
/// ```
#[must_use]
pub fn map_internal_type(internal_type: &str) -> TypeMapping {
    match internal_type {
        // boolean values come back from the table API as strings
        "string" | "GUID" | "sys_class_name" | "domain_path" | "journal_input" | "user_input"
        | "workflow" | "boolean" => TypeMapping::Output(OutputType::String),
        "currency" | "decimal" | "float" | "double" => TypeMapping::Output(OutputType::Double),
        "integer" => TypeMapping::Output(OutputType::Integer),
        "glide_date_time" | "due_date" | "glide_date" | "timer" => {
            TypeMapping::Output(OutputType::Date)
        },
        "reference" => TypeMapping::Reference,
        "domain_id" | "collection" | "glide_list" | "glide_duration" | "journal"
        | "journal_list" | "variables" => TypeMapping::Ignored,
        _ => TypeMapping::Unknown,
    }
}

/// A field key split into path segments (`location.parent.name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parses a dotted key.
    #[must_use]
    pub fn parse(key: &str) -> Self {
        Self(key.split('.').map(str::to_string).collect())
    }

    /// Builds a path from a root field and sub-segments.
    #[must_use]
    pub fn nested(root: &str, segments: &[&str]) -> Self {
        let mut path = vec![root.to_string()];
        path.extend(segments.iter().map(|s| (*s).to_string()));
        Self(path)
    }

    /// Path segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if the path addresses a sub-field of a reference.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.0.len() > 1
    }

    /// Dotted key as used by the remote API and record maps.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Small integer enumerations exposed as `"<code> - <label>"` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodedField {
    /// Ticket priority (1 Critical .. 5 Planning).
    Priority,
    /// Ticket state (1 New .. 8 Canceled).
    State,
}

impl CodedField {
    /// Returns the coded field for a source column name.
    #[must_use]
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "priority" => Some(CodedField::Priority),
            "state" => Some(CodedField::State),
            _ => None,
        }
    }

    /// Source column name.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            CodedField::Priority => "priority",
            CodedField::State => "state",
        }
    }

    /// Output property carrying the label.
    #[must_use]
    pub fn label_field(self) -> &'static str {
        match self {
            CodedField::Priority => "priority_label",
            CodedField::State => "state_label",
        }
    }

    /// Label for a code, if the code is known.
    #[must_use]
    pub fn label(self, code: i64) -> Option<&'static str> {
        match (self, code) {
            (CodedField::Priority, 1) => Some("Critical"),
            (CodedField::Priority, 2) => Some("High"),
            (CodedField::Priority, 3) => Some("Moderate"),
            (CodedField::Priority, 4) => Some("Low"),
            (CodedField::Priority, 5) => Some("Planning"),
            (CodedField::State, 1) => Some("New"),
            (CodedField::State, 2) => Some("In Progress"),
            (CodedField::State, 3..=5) => Some("On Hold"),
            (CodedField::State, 6) => Some("Resolved"),
            (CodedField::State, 7) => Some("Closed"),
            (CodedField::State, 8) => Some("Canceled"),
            _ => None,
        }
    }
}

/// One slot of the decomposed location hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationSlot {
    /// Most specific level (e.g. a room or unit).
    Unit,
    /// Floor or level.
    Level,
    /// Building or facility.
    Facility,
}

impl LocationSlot {
    /// Output property carrying this slot.
    #[must_use]
    pub fn output_name(self) -> &'static str {
        match self {
            LocationSlot::Unit => "location_unit_name",
            LocationSlot::Level => "location_level_name",
            LocationSlot::Facility => "location_facility_name",
        }
    }
}

/// What drives the value of a descriptor's output property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Raw value coerced per output type.
    Column,
    /// Raw coded value; only its label is exposed.
    Coded(CodedField),
    /// Label computed from a coded value (never fetched).
    CodedLabel(CodedField),
    /// Slot computed from the location chain (never fetched).
    Location(LocationSlot),
}

/// Output column metadata handed to rendering clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    /// Property name in each feature.
    pub name: String,
    /// Human label.
    pub alias: String,
    /// Output type.
    pub output_type: OutputType,
    /// Declared or default length.
    pub length: Option<u32>,
}

impl OutputField {
    /// Creates an output field, falling back to the type's default length.
    #[must_use]
    pub fn new(name: &str, alias: &str, output_type: OutputType, max_length: Option<u32>) -> Self {
        let length = match output_type {
            OutputType::String => max_length.or(output_type.default_length()),
            _ => output_type.default_length(),
        };
        Self {
            name: name.to_string(),
            alias: alias.to_string(),
            output_type,
            length,
        }
    }

    /// The integer identity column.
    #[must_use]
    pub fn identity(name: &str) -> Self {
        Self::new(name, name, OutputType::Oid, None)
    }
}

impl Serialize for OutputField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let is_oid = self.output_type == OutputType::Oid;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("alias", &self.alias)?;
        map.serialize_entry("type", self.output_type.type_name())?;
        map.serialize_entry("sqlType", self.output_type.sql_type())?;
        map.serialize_entry("domain", &())?;
        map.serialize_entry("defaultValue", &())?;
        if !is_oid {
            map.serialize_entry("editable", &false)?;
            map.serialize_entry("nullable", &true)?;
        }
        if let Some(length) = self.length {
            map.serialize_entry("length", &length)?;
        }
        map.end()
    }
}

/// Describes one source column or one synthesized virtual column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Source table, or [`SYNTHETIC_TABLE`] for synthesized descriptors.
    pub table: String,
    /// Source field path.
    pub field: FieldPath,
    /// Human label.
    pub alias: String,
    /// Remote internal type tag.
    pub internal_type: String,
    /// Declared string length.
    pub max_length: Option<u32>,
    /// Whether the engine knows how to map the type.
    pub supported: bool,
    /// Whether the field is requested from the remote table.
    pub fetch: bool,
    /// Mapped output column, if exposed.
    pub output: Option<OutputField>,
    /// How the output value is derived.
    pub role: FieldRole,
}

impl FieldDescriptor {
    /// Dotted source key.
    #[must_use]
    pub fn key(&self) -> String {
        self.field.key()
    }

    /// Creates a synthesized descriptor for a reference sub-field or derived value.
    #[must_use]
    pub fn synthetic(
        field: FieldPath,
        alias: &str,
        internal_type: &str,
        output: Option<OutputField>,
        fetch: bool,
        role: FieldRole,
    ) -> Self {
        Self {
            table: SYNTHETIC_TABLE.to_string(),
            field,
            alias: alias.to_string(),
            internal_type: internal_type.to_string(),
            max_length: None,
            supported: true,
            fetch,
            output,
            role,
        }
    }
}
