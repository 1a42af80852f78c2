pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod oracle;
pub mod services;

use crate::config::AppConfig;
use crate::oracle::OracleConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub oracle: OracleConfig,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
