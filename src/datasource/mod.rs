pub mod base;
pub mod csv;
pub mod excel;
pub mod factory;
pub mod inference;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;
pub mod stub;
pub mod webapi;

pub use base::DataSourceConnector;
pub use factory::{ConnectorRegistry, ConnectorRequirements};
