pub mod executor;
pub mod orchestrator;
pub mod schema_cache;
pub mod store;

pub use executor::QueryExecutor;
pub use orchestrator::DatasetOrchestrator;
pub use schema_cache::SchemaCache;
pub use store::DatasetStore;
