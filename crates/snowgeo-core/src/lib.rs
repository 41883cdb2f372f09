//! `snowgeo-core` translates ServiceNow ticket tables into point feature
//! collections.
//!
//! This crate includes:
//! - **Table Registry**: The two supported ticket tables and their display metadata.
//! - **Schema Resolution**: Dictionary metadata mapped to typed field descriptors.
//! - **Pagination**: Sequential offset paging with a record cap.
//! - **Feature Assembly**: Geometry, derived properties and stable identities per row.
//! - **Collection**: Filtering and collection-level metadata.
//!
//! The `operations` module exposes [`FeatureService`], which runs the whole
//! pipeline against any [`TableSource`]; `client` provides the HTTP source.

pub mod assemble;
pub mod client;
pub mod collect;
pub mod config;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod operations;
pub mod schema;
pub mod tables;
pub mod types;
pub mod utils;

pub use collect::OutputCollection;
pub use config::{EngineOptions, ServiceNowConfig};
pub use error::{Result, SnowGeoError};
pub use operations::FeatureService;
pub use snowgeo_core_common::{RawRecord, SourceError, TableSource};
