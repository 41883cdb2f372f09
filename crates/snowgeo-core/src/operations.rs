//! The fetch pipeline for one ticket table.
//!
//! A request runs as a sequence of stages, each consuming the previous
//! stage's value: table lookup, schema resolution, paging, assembly and
//! collection. An unsupported table fails before any upstream call, and any
//! upstream failure aborts the whole request without partial output.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use snowgeo_core_common::TableSource;

use crate::assemble::FeatureAssembler;
use crate::collect::{OutputCollection, ResultCollector};
use crate::config::EngineOptions;
use crate::error::Result;
use crate::fetch::{FetchResult, PaginatedFetcher};
use crate::identity::IdentityRegistries;
use crate::schema::{ResolvedSchema, SchemaResolver};
use crate::tables::resolve_table;

/// Translates ticket tables of one upstream store into feature collections.
///
/// The identity stores live as long as the service, so identities stay
/// stable across requests and are shared by concurrent requests.
pub struct FeatureService<S: ?Sized> {
    source: Arc<S>,
    options: EngineOptions,
    identities: IdentityRegistries,
}

impl<S: ?Sized> Clone for FeatureService<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            options: self.options.clone(),
            identities: self.identities.clone(),
        }
    }
}

impl<S: ?Sized> fmt::Debug for FeatureService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureService")
            .field("options", &self.options)
            .field("identities", &self.identities)
            .finish_non_exhaustive()
    }
}

impl<S> FeatureService<S>
where
    S: TableSource + ?Sized,
{
    /// Creates a service with fresh in-memory identity stores.
    #[must_use]
    pub fn new(source: Arc<S>, options: EngineOptions) -> Self {
        Self::with_identities(source, options, IdentityRegistries::new())
    }

    /// Creates a service with caller-provided identity stores.
    #[must_use]
    pub fn with_identities(
        source: Arc<S>,
        options: EngineOptions,
        identities: IdentityRegistries,
    ) -> Self {
        Self {
            source,
            options,
            identities,
        }
    }

    /// Engine parameters in use.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Identity stores in use.
    #[must_use]
    pub fn identities(&self) -> &IdentityRegistries {
        &self.identities
    }

    /// Resolves the schema of the table selected by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SnowGeoError::UnsupportedTable`] without contacting
    /// the source, or a resolution error if the dictionary query fails.
    pub async fn resolve_schema(&self, id: &str) -> Result<ResolvedSchema> {
        let table = resolve_table(id)?;
        SchemaResolver::new(self.source.as_ref(), &self.options.identity)
            .resolve(table)
            .await
    }

    /// Fetches the table selected by `id` and builds its feature collection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SnowGeoError::UnsupportedTable`] without contacting
    /// the source, or the first resolution or query failure.
    pub async fn get_data(&self, id: &str) -> Result<OutputCollection> {
        let schema = self.resolve_schema(id).await?;
        let table = schema.table;

        let fetched = if schema.fetch_fields.is_empty() {
            debug!("No fetchable fields for {}; skipping table query", table.source_table);
            FetchResult::default()
        } else {
            PaginatedFetcher::new(
                self.source.as_ref(),
                self.options.page_size,
                self.options.cap,
            )
            .fetch_all(table.source_table, &schema.fetch_fields)
            .await?
        };

        let assembler = FeatureAssembler::new(&schema, self.identities.for_table(table.kind));
        let features = assembler.assemble_all(&fetched.records);

        let collector = ResultCollector::new(
            self.options.ttl,
            self.options.renderer(table.kind).cloned(),
        );
        let collection = collector.collect(&schema, features);

        info!(
            "{}: {} (with location) out of {}",
            table.source_table,
            collection.features.len(),
            fetched.records.len()
        );
        Ok(collection)
    }
}

/// Builds the cache key of a collection from its provider path segments.
///
/// Absent segments are skipped; present ones are joined by `::`.
///
/// # Examples
///
/// ```
/// use snowgeo_core::operations::cache_key;
///
/// assert_eq!(cache_key("servicenow", None, Some("incidents"), Some("0")), "servicenow::incidents::0");
/// assert_eq!(cache_key("servicenow", None, None, None), "servicenow");
/// ```
#[must_use]
pub fn cache_key(
    provider: &str,
    host: Option<&str>,
    id: Option<&str>,
    layer: Option<&str>,
) -> String {
    std::iter::once(provider)
        .chain([host, id, layer].into_iter().flatten())
        .collect::<Vec<_>>()
        .join("::")
}
