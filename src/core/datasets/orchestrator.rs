use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::schema_cache::SchemaCache;
use super::store::DatasetStore;
use crate::config::CoreConfig;
use crate::datasource::csv::parse_csv_payload;
use crate::datasource::{ConnectorRegistry, ConnectorRequirements};
use crate::error::DataSourceError;
use crate::models::{
    CanonicalSchema, ConnectorType, Dataset, DatasetStatus, DatasetSummary,
};

const DEFERRED_MESSAGE: &str = "schema discovery deferred until first query";
const STUB_MESSAGE: &str = "schema discovery is not available for this connector type";

/// Owns the dataset lifecycle: registration, refresh, deletion, listing.
/// Query serving lives in the executor; both share the same store.
#[derive(Clone)]
pub struct DatasetOrchestrator {
    store: DatasetStore,
    registry: Arc<ConnectorRegistry>,
    schema_cache: SchemaCache,
}

impl DatasetOrchestrator {
    pub fn new(store: DatasetStore, registry: Arc<ConnectorRegistry>, config: &CoreConfig) -> Self {
        let schema_cache = SchemaCache::new(
            store.clone(),
            Arc::clone(&registry),
            config.schema_table_cap,
        );
        Self {
            store,
            registry,
            schema_cache,
        }
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema_cache
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Register a new dataset. Unknown tags and invalid configurations
    /// fail before any record exists. CSV payloads are parsed
    /// synchronously; other uploads keep a placeholder until a readable
    /// path is configured. Live sources attempt discovery immediately and
    /// fall back to a placeholder schema when the source is unreachable
    /// (discovery then happens on first query).
    pub async fn register_dataset(
        &self,
        workspace_id: &str,
        name: &str,
        connector_type: &str,
        connector_config: Value,
        file_payload: Option<&[u8]>,
    ) -> Result<DatasetSummary, DataSourceError> {
        let kind: ConnectorType = connector_type.parse()?;
        let has_payload = kind.is_file() && file_payload.is_some();
        // Uploaded payloads carry their own data; only path- or
        // connection-configured sources need a connector up front. Building
        // it here surfaces configuration problems before any record exists.
        if !has_payload {
            self.registry.create(kind, &connector_config)?;
        }

        let dataset = Dataset::new(workspace_id, name, kind, connector_config);
        let id = dataset.id;
        self.store.insert_dataset(&dataset).await?;
        info!(dataset_id = %id, connector_type = %kind, "dataset registered");

        if let (ConnectorType::Csv, Some(bytes)) = (kind, file_payload) {
            self.process_file_payload(&dataset, bytes).await?;
        } else if has_payload {
            // Workbook bytes are not parsed in place; the record stands
            // until the caller configures a readable path.
            self.store
                .set_schema(
                    id,
                    &CanonicalSchema::placeholder(DEFERRED_MESSAGE),
                    DatasetStatus::Ready,
                )
                .await?;
        } else if kind.is_declared_stub() {
            self.store
                .set_schema(id, &CanonicalSchema::placeholder(STUB_MESSAGE), DatasetStatus::Ready)
                .await?;
        } else {
            self.store
                .set_status(id, DatasetStatus::Processing, None)
                .await?;
            if let Err(e) = self.schema_cache.ensure_schema(&dataset, false).await {
                if matches!(e, DataSourceError::ConnectionFailed(_)) {
                    // Unreachable now does not mean unreachable later.
                    warn!(dataset_id = %id, error = %e, "initial discovery failed, deferring");
                    self.store
                        .set_schema(
                            id,
                            &CanonicalSchema::placeholder(DEFERRED_MESSAGE),
                            DatasetStatus::Ready,
                        )
                        .await?;
                } else {
                    // The cache already recorded `status=Error` with the
                    // message; the returned summary carries it.
                    warn!(dataset_id = %id, error = %e, "initial discovery failed");
                }
            }
        }

        Ok(self.store.get_dataset(id).await?.summary())
    }

    /// Single-pass parse of an uploaded CSV payload. A parse failure is
    /// terminal: the record keeps `status=Error` and no partial schema.
    async fn process_file_payload(
        &self,
        dataset: &Dataset,
        bytes: &[u8],
    ) -> Result<(), DataSourceError> {
        self.store
            .set_status(dataset.id, DatasetStatus::Processing, None)
            .await?;

        let delimiter = dataset
            .connector_config
            .get("delimiter")
            .and_then(|v| v.as_str())
            .and_then(|s| s.bytes().next())
            .unwrap_or(b',');

        match parse_csv_payload(bytes, &dataset.name, delimiter) {
            Ok(parsed) => {
                self.store
                    .set_sample_rows(
                        dataset.id,
                        &parsed.sample_rows,
                        parsed.row_count,
                        Some(bytes.len() as i64),
                    )
                    .await?;
                self.schema_cache.persist(dataset.id, &parsed.schema).await?;
                Ok(())
            }
            Err(e) => {
                warn!(dataset_id = %dataset.id, error = %e, "file payload parse failed");
                self.store
                    .set_status(dataset.id, DatasetStatus::Error, Some(&e.to_string()))
                    .await?;
                Ok(())
            }
        }
    }

    /// Re-run discovery for live sources; file-backed and stub datasets
    /// only get their refresh timestamp bumped.
    pub async fn refresh_dataset(&self, id: Uuid) -> Result<DatasetSummary, DataSourceError> {
        let dataset = self.store.get_dataset(id).await?;

        if dataset.connector_type.is_file() || dataset.connector_type.is_declared_stub() {
            self.store.touch_refresh(id).await?;
            return Ok(self.store.get_dataset(id).await?.summary());
        }

        self.store
            .set_status(id, DatasetStatus::Refreshing, None)
            .await?;
        self.schema_cache.ensure_schema(&dataset, true).await?;
        self.store.touch_refresh(id).await?;
        Ok(self.store.get_dataset(id).await?.summary())
    }

    pub async fn delete_dataset(&self, id: Uuid) -> Result<(), DataSourceError> {
        self.store.delete_dataset(id).await?;
        info!(dataset_id = %id, "dataset deleted");
        Ok(())
    }

    pub async fn get_dataset(&self, id: Uuid) -> Result<Dataset, DataSourceError> {
        self.store.get_dataset(id).await
    }

    pub async fn list_datasets(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<DatasetSummary>, DataSourceError> {
        Ok(self
            .store
            .list_datasets(workspace_id)
            .await?
            .iter()
            .map(Dataset::summary)
            .collect())
    }

    pub fn list_supported_connectors(&self) -> Vec<ConnectorRequirements> {
        self.registry
            .supported_types()
            .into_iter()
            .map(|kind| self.registry.requirements(kind))
            .collect()
    }

    /// Probe a configuration without registering anything.
    pub async fn test_connection(
        &self,
        connector_type: &str,
        connector_config: &Value,
    ) -> Result<(bool, String), DataSourceError> {
        let kind: ConnectorType = connector_type.parse()?;
        let connector = self.registry.create(kind, connector_config)?;
        Ok(connector.test_connection().await)
    }
}
