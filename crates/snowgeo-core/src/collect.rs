//! Packaging of assembled features into the output feature collection.

use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use serde::{Serialize, Serializer};

use crate::assemble::AssembledFeature;
use crate::schema::ResolvedSchema;
use crate::types::OutputField;

/// Title attached to every collection.
pub const COLLECTION_TITLE: &str = "ServiceNow Feature Layer";

/// Geometry type of every collection produced by this engine.
pub const GEOMETRY_TYPE: &str = "Point";

/// Default collection time-to-live, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 600;

/// Collection-level metadata consumed by rendering clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    /// Collection title.
    pub title: String,
    /// Layer name.
    pub name: String,
    /// Layer description.
    pub description: String,
    /// Property used as the feature label.
    pub display_field: String,
    /// Always `"Point"`.
    pub geometry_type: String,
    /// Identity field, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    /// Output field metadata.
    pub fields: Vec<OutputField>,
    /// Symbology passed through from configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<JsonValue>,
}

/// The final feature collection for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputCollection {
    /// Features with a geometry, in row order.
    pub features: Vec<Feature>,
    /// Cache time-to-live in seconds.
    pub ttl: u64,
    /// Collection metadata.
    pub metadata: CollectionMetadata,
}

impl OutputCollection {
    /// Converts into a `GeoJSON` feature collection carrying `ttl` and
    /// `metadata` as foreign members.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be represented as JSON.
    pub fn to_feature_collection(&self) -> serde_json::Result<FeatureCollection> {
        let mut foreign_members = JsonObject::new();
        foreign_members.insert("ttl".to_string(), JsonValue::from(self.ttl));
        foreign_members.insert("metadata".to_string(), serde_json::to_value(&self.metadata)?);
        Ok(FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members: Some(foreign_members),
        })
    }

    /// Serializes the collection to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

impl Serialize for OutputCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_feature_collection()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// Filters assembled features and attaches collection metadata.
#[derive(Debug, Clone)]
pub struct ResultCollector {
    ttl: u64,
    renderer: Option<JsonValue>,
}

impl ResultCollector {
    /// Creates a collector with a time-to-live and an optional renderer block.
    #[must_use]
    pub fn new(ttl: u64, renderer: Option<JsonValue>) -> Self {
        Self { ttl, renderer }
    }

    /// Keeps the features that have a geometry and builds the collection.
    #[must_use]
    pub fn collect(
        &self,
        schema: &ResolvedSchema,
        features: Vec<AssembledFeature>,
    ) -> OutputCollection {
        let table = schema.table;
        let metadata = CollectionMetadata {
            title: COLLECTION_TITLE.to_string(),
            name: table.display_name.to_string(),
            description: table.description.to_string(),
            display_field: table.display_field.to_string(),
            geometry_type: GEOMETRY_TYPE.to_string(),
            id_field: schema.identity.id_field().map(str::to_string),
            fields: schema.output_fields.clone(),
            renderer: self.renderer.clone(),
        };

        OutputCollection {
            features: features
                .into_iter()
                .filter(AssembledFeature::has_geometry)
                .map(Feature::from)
                .collect(),
            ttl: self.ttl,
            metadata,
        }
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityMode;
    use crate::tables::TicketTable;
    use geojson::{Geometry, Value};
    use serde_json::json;

    fn schema(identity: IdentityMode) -> ResolvedSchema {
        let rows = vec![
            json!({"name": "task", "element": "number", "column_label": "Number", "internal_type": "string"})
                .as_object()
                .unwrap()
                .clone(),
        ];
        ResolvedSchema::from_dictionary(TicketTable::Incident.definition(), &rows, identity)
    }

    fn feature(number: &str, located: bool) -> AssembledFeature {
        AssembledFeature {
            geometry: located.then(|| Geometry::new(Value::Point(vec![1.0, 2.0, 0.0]))),
            properties: json!({"number": number}).as_object().unwrap().clone(),
        }
    }

    #[test]
    fn test_filters_features_without_geometry() {
        let collector = ResultCollector::default();
        let collection = collector.collect(&schema(IdentityMode::Disabled), vec![
            feature("INC1", true),
            feature("INC2", false),
            feature("INC3", true),
        ]);
        assert_eq!(collection.features.len(), 2);
        assert_eq!(collection.ttl, 600);
        let numbers: Vec<&JsonValue> = collection
            .features
            .iter()
            .map(|f| &f.properties.as_ref().unwrap()["number"])
            .collect();
        assert_eq!(numbers, vec!["INC1", "INC3"]);
    }

    #[test]
    fn test_metadata() {
        let renderer = json!({"type": "simple"});
        let collector = ResultCollector::new(10, Some(renderer.clone()));
        let collection = collector.collect(&schema(IdentityMode::tracked()), Vec::new());
        let metadata = &collection.metadata;
        assert_eq!(metadata.title, COLLECTION_TITLE);
        assert_eq!(metadata.name, "ServiceNow Incidents");
        assert_eq!(metadata.display_field, "number");
        assert_eq!(metadata.geometry_type, "Point");
        assert_eq!(metadata.id_field.as_deref(), Some("OBJECTID"));
        assert_eq!(metadata.renderer, Some(renderer));
        assert_eq!(metadata.fields.len(), 2);
        assert!(collection.features.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let collector = ResultCollector::new(30, None);
        let collection =
            collector.collect(&schema(IdentityMode::Disabled), vec![feature("INC1", true)]);
        let value = serde_json::to_value(&collection).unwrap();

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["ttl"], 30);
        assert_eq!(value["features"][0]["type"], "Feature");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
        assert_eq!(value["metadata"]["displayField"], "number");
        assert_eq!(value["metadata"]["geometryType"], "Point");
        assert_eq!(value["metadata"]["fields"][0]["name"], "number");
        assert!(value["metadata"].get("idField").is_none());
        assert!(value["metadata"].get("renderer").is_none());
    }

    #[test]
    fn test_json_string_is_stable() {
        let collector = ResultCollector::default();
        let build = || {
            collector
                .collect(&schema(IdentityMode::Disabled), vec![feature("INC1", true)])
                .to_json_string(false)
                .unwrap()
        };
        assert_eq!(build(), build());
        assert!(
            collector
                .collect(&schema(IdentityMode::Disabled), Vec::new())
                .to_json_string(true)
                .unwrap()
                .contains('\n')
        );
    }
}
