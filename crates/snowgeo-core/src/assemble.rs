//! Conversion of raw ticket rows into geometry-bearing features.
//!
//! Each [`RawRecord`] becomes exactly one [`AssembledFeature`]. The
//! [`FeatureAssembler`] applies, in order: identity assignment, geometry
//! derivation from the location coordinates, decomposition of the location
//! hierarchy, coded-value expansion, and per-type coercion of every other
//! exposed column.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use geojson::{Feature, Geometry, JsonObject, JsonValue, Value};
use log::{debug, warn};
use snowgeo_core_common::{RawRecord, describe_value};

use crate::identity::{IdentityStore, NATURAL_KEY_FIELD};
use crate::schema::ResolvedSchema;
use crate::types::{CodedField, FieldRole, LocationSlot, OutputType};
use crate::utils::JsonValueExt;

/// Raw keys the geometry is derived from.
pub const LONGITUDE_FIELD: &str = "location.longitude";
/// Raw keys the geometry is derived from.
pub const LATITUDE_FIELD: &str = "location.latitude";
/// Raw keys the geometry is derived from.
pub const ELEVATION_FIELD: &str = "location.elevation";

/// Raw keys of the location chain, most specific first.
pub const LOCATION_CHAIN_FIELDS: [&str; 3] = [
    "location.name",
    "location.parent.name",
    "location.parent.parent.name",
];

/// Output property that is present on every feature.
pub const ELEVATION_PROPERTY: &str = "elevation";

/// A feature produced from one raw row.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFeature {
    /// Point geometry, or `None` when the row has no usable coordinates.
    pub geometry: Option<Geometry>,
    /// Output properties keyed by output field name.
    pub properties: JsonObject,
}

impl AssembledFeature {
    /// Returns `true` if a geometry was derived.
    #[must_use]
    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }
}

impl From<AssembledFeature> for Feature {
    fn from(feature: AssembledFeature) -> Self {
        Feature {
            bbox: None,
            geometry: feature.geometry,
            id: None,
            properties: Some(feature.properties),
            foreign_members: None,
        }
    }
}

impl fmt::Display for AssembledFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let geom = if self.geometry.is_some() {
            "Some(Point)"
        } else {
            "None"
        };
        write!(
            f,
            "AssembledFeature(properties={} keys, geometry={geom})",
            self.properties.len()
        )
    }
}

/// The location chain classified into unit, level and facility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationHierarchy {
    /// Most specific level (room, unit).
    pub unit: Option<String>,
    /// Floor or level.
    pub level: Option<String>,
    /// Building or facility.
    pub facility: Option<String>,
}

impl LocationHierarchy {
    /// Value of one slot.
    #[must_use]
    pub fn slot(&self, slot: LocationSlot) -> Option<&str> {
        match slot {
            LocationSlot::Unit => self.unit.as_deref(),
            LocationSlot::Level => self.level.as_deref(),
            LocationSlot::Facility => self.facility.as_deref(),
        }
    }
}

/// Classifies a location chain (`name`, `parent.name`, `parent.parent.name`).
///
/// Empty strings count as missing. A full chain maps to
/// `(unit, level, facility)`; a two-level chain is `(level, facility)`; a
/// single name is the facility. Any other shape yields nothing.
///
/// ```
/// use snowgeo_core::assemble::decompose_location;
///
/// let h = decompose_location(Some("UnitA"), Some("LevelA"), Some(""));
/// assert_eq!(h.unit, None);
/// assert_eq!(h.level.as_deref(), Some("UnitA"));
/// assert_eq!(h.facility.as_deref(), Some("LevelA"));
/// ```
#[must_use]
pub fn decompose_location(
    name: Option<&str>,
    parent: Option<&str>,
    grandparent: Option<&str>,
) -> LocationHierarchy {
    let present = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
    match (present(name), present(parent), present(grandparent)) {
        (Some(unit), Some(level), Some(facility)) => LocationHierarchy {
            unit: Some(unit),
            level: Some(level),
            facility: Some(facility),
        },
        (Some(level), Some(facility), None) => LocationHierarchy {
            unit: None,
            level: Some(level),
            facility: Some(facility),
        },
        (Some(facility), None, None) => LocationHierarchy {
            unit: None,
            level: None,
            facility: Some(facility),
        },
        _ => LocationHierarchy::default(),
    }
}

/// Derives a point from the location coordinates of a raw row.
///
/// Empty or non-numeric coordinates yield `None`. Elevation becomes the z
/// coordinate when finite, otherwise z is `0`.
#[must_use]
pub fn make_geometry(record: &RawRecord) -> Option<Geometry> {
    let x = record.get(LONGITUDE_FIELD)?.as_lenient_f64()?;
    let y = record.get(LATITUDE_FIELD)?.as_lenient_f64()?;
    let z = record
        .get(ELEVATION_FIELD)
        .and_then(JsonValue::as_lenient_f64)
        .unwrap_or(0.0);
    Some(Geometry::new(Value::Point(vec![x, y, z])))
}

/// Expands a coded value to `"<code> - <label>"`, or `""` for unknown codes.
///
/// ```
/// use serde_json::json;
/// use snowgeo_core::assemble::expand_coded_value;
/// use snowgeo_core::types::CodedField;
///
/// assert_eq!(expand_coded_value(CodedField::State, Some(&json!("6"))), "6 - Resolved");
/// assert_eq!(expand_coded_value(CodedField::Priority, Some(&json!("9"))), "");
/// ```
#[must_use]
pub fn expand_coded_value(coded: CodedField, value: Option<&JsonValue>) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let code = value
        .and_then(JsonValue::as_lenient_f64)
        .filter(|n| n.fract() == 0.0)
        .map(|n| n as i64);
    code.and_then(|code| coded.label(code).map(|label| format!("{code} - {label}")))
        .unwrap_or_default()
}

/// Coerces a raw value to its output type.
///
/// Numbers are parsed from trimmed strings; empty or unparsable input is
/// `null`. Dates are rewritten to UTC ISO 8601; any other non-empty date
/// shape is logged and becomes `null`. Everything else passes through.
#[must_use]
pub fn coerce_value(field: &str, value: Option<&JsonValue>, output_type: OutputType) -> JsonValue {
    let Some(value) = value else {
        return JsonValue::Null;
    };
    match output_type {
        OutputType::Integer => match value {
            JsonValue::Number(_) => value.clone(),
            _ => value
                .as_lenient_i64()
                .map(JsonValue::from)
                .or_else(|| value.as_lenient_f64().map(JsonValue::from))
                .unwrap_or(JsonValue::Null),
        },
        OutputType::Double => value
            .as_lenient_f64()
            .map_or(JsonValue::Null, JsonValue::from),
        OutputType::Date => match value {
            JsonValue::String(s) => coerce_date(field, s),
            JsonValue::Null => JsonValue::Null,
            other => {
                warn!(
                    "Unexpected {} value for date field {field}",
                    describe_value(other)
                );
                JsonValue::Null
            },
        },
        OutputType::String | OutputType::Oid => value.clone(),
    }
}

/// Rewrites `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` as a UTC ISO 8601 string.
///
/// ```
/// use serde_json::json;
/// use snowgeo_core::assemble::coerce_date;
///
/// assert_eq!(coerce_date("opened_at", "2020-01-02 03:04:05"), json!("2020-01-02T03:04:05Z"));
/// assert_eq!(coerce_date("due_date", "2020-01-02"), json!("2020-01-02T00:00:00Z"));
/// assert!(coerce_date("closed_at", "").is_null());
/// ```
#[must_use]
pub fn coerce_date(field: &str, raw: &str) -> JsonValue {
    if raw.is_empty() {
        return JsonValue::Null;
    }
    let parsed = match raw.len() {
        19 => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|d| d.format("%Y-%m-%dT00:00:00Z").to_string()),
        _ => None,
    };
    match parsed {
        Some(iso) => JsonValue::String(iso),
        None => {
            warn!("Unexpected date format for {field}: {raw:?}");
            JsonValue::Null
        },
    }
}

/// Maps raw rows of one table to features using a resolved schema.
pub struct FeatureAssembler<'a> {
    schema: &'a ResolvedSchema,
    identities: Arc<dyn IdentityStore>,
}

impl<'a> FeatureAssembler<'a> {
    /// Creates an assembler. `identities` is only consulted when the schema tracks identities.
    #[must_use]
    pub fn new(schema: &'a ResolvedSchema, identities: Arc<dyn IdentityStore>) -> Self {
        Self { schema, identities }
    }

    /// Assembles every row, preserving order.
    #[must_use]
    pub fn assemble_all(&self, records: &[RawRecord]) -> Vec<AssembledFeature> {
        records.iter().map(|r| self.assemble(r)).collect()
    }

    /// Assembles one row.
    #[must_use]
    pub fn assemble(&self, record: &RawRecord) -> AssembledFeature {
        let mut properties = JsonObject::new();

        if let Some(field) = self.schema.identity.tracked_field() {
            match record.get(NATURAL_KEY_FIELD).and_then(JsonValue::as_non_empty_str) {
                Some(sys_id) => {
                    let id = self.identities.identity_for(sys_id);
                    properties.insert(field.to_string(), JsonValue::from(id));
                },
                None => debug!("Row without {NATURAL_KEY_FIELD}; no identity assigned"),
            }
        }

        let geometry = make_geometry(record);

        if self.schema.has_location() {
            let [name, parent, grandparent] = LOCATION_CHAIN_FIELDS
                .map(|key| record.get(key).and_then(JsonValue::as_str));
            let hierarchy = decompose_location(name, parent, grandparent);
            for slot in [LocationSlot::Unit, LocationSlot::Level, LocationSlot::Facility] {
                properties.insert(
                    slot.output_name().to_string(),
                    hierarchy
                        .slot(slot)
                        .map_or(JsonValue::Null, JsonValue::from),
                );
            }
        }

        for coded in self.schema.coded_labels() {
            let label = expand_coded_value(coded, record.get(coded.field_name()));
            properties.insert(coded.label_field().to_string(), JsonValue::String(label));
        }

        for descriptor in &self.schema.descriptors {
            if !(descriptor.supported && descriptor.fetch && descriptor.role == FieldRole::Column)
            {
                continue;
            }
            let Some(output) = &descriptor.output else {
                continue;
            };
            let key = descriptor.key();
            properties.insert(
                output.name.clone(),
                coerce_value(&key, record.get(&key), output.output_type),
            );
        }

        properties
            .entry(ELEVATION_PROPERTY)
            .or_insert(JsonValue::Null);

        AssembledFeature {
            geometry,
            properties,
        }
    }
}
