use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::store::DatasetStore;
use crate::datasource::ConnectorRegistry;
use crate::error::DataSourceError;
use crate::models::{CanonicalSchema, Dataset, DatasetStatus, TableRecord};

/// Guards the inference-runs-once property: a dataset's schema is fetched
/// at most once unless a refresh forces it, and every discovery outcome is
/// recorded on the dataset before the caller sees it.
#[derive(Clone)]
pub struct SchemaCache {
    store: DatasetStore,
    registry: Arc<ConnectorRegistry>,
    table_cap: usize,
}

impl SchemaCache {
    pub fn new(store: DatasetStore, registry: Arc<ConnectorRegistry>, table_cap: usize) -> Self {
        Self {
            store,
            registry,
            table_cap,
        }
    }

    /// Return the dataset's canonical schema, fetching and persisting it on
    /// first need. A cached non-placeholder schema short-circuits unless
    /// `force` is set. Failures are recorded as `status=Error` with the
    /// message, then propagated.
    pub async fn ensure_schema(
        &self,
        dataset: &Dataset,
        force: bool,
    ) -> Result<CanonicalSchema, DataSourceError> {
        if !force && dataset.has_cached_schema() {
            if let Some(schema) = &dataset.schema {
                return Ok(schema.clone());
            }
        }

        let connector = self
            .registry
            .create(dataset.connector_type, &dataset.connector_config)?;

        info!(dataset_id = %dataset.id, connector_type = %dataset.connector_type, "fetching schema");
        let schema = match connector.fetch_schema(None, self.table_cap).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(dataset_id = %dataset.id, error = %e, "schema discovery failed");
                self.store
                    .set_status(dataset.id, DatasetStatus::Error, Some(&e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        // A source with nothing to query is an error, not an empty cache:
        // an empty schema would never satisfy `has_cached_schema` and every
        // query would re-pay discovery.
        if schema.tables.is_empty() {
            let e = DataSourceError::SchemaInferenceFailed(
                "no tables found in the data source".into(),
            );
            warn!(dataset_id = %dataset.id, "schema discovery returned no tables");
            self.store
                .set_status(dataset.id, DatasetStatus::Error, Some(&e.to_string()))
                .await?;
            return Err(e);
        }

        self.persist(dataset.id, &schema).await?;
        Ok(schema)
    }

    /// Write the schema and one table record per discovered table.
    /// Duplicate (dataset, name) pairs are skipped by the store.
    pub async fn persist(
        &self,
        dataset_id: Uuid,
        schema: &CanonicalSchema,
    ) -> Result<(), DataSourceError> {
        self.store
            .set_schema(dataset_id, schema, DatasetStatus::Ready)
            .await?;
        for table in &schema.tables {
            self.store
                .upsert_table(&TableRecord {
                    id: Uuid::new_v4(),
                    dataset_id,
                    name: table.name.clone(),
                    display_name: table.display_name.clone(),
                    description: None,
                    columns: table.columns.clone(),
                    row_count: table.row_count,
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }
}
