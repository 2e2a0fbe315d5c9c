//! Router management API: JSON over HTTP with basic auth.

pub mod client;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{ActiveSession, MikrotikRouter};

pub use client::RouterApiClient;
pub use types::{row_f64, row_str, RouterApiError, RouterRow};

/// Router-side calls used by the MikroTik and RADIUS services
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Lightweight reachability probe
    async fn health(&self, router: &MikrotikRouter) -> Result<(), RouterApiError>;

    /// List rows of a menu such as `/radius`, filtered by exact property match
    async fn print(
        &self,
        router: &MikrotikRouter,
        menu: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<RouterRow>, RouterApiError>;

    async fn add(&self, router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError>;

    async fn set(&self, router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError>;

    async fn remove(&self, router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError>;

    /// Run a console command path such as `/system/backup/save`
    async fn command(&self, router: &MikrotikRouter, path: &str, params: &Value) -> Result<Value, RouterApiError>;

    async fn active_sessions(&self, router: &MikrotikRouter) -> Result<Vec<ActiveSession>, RouterApiError>;

    /// `/system/resource` row: cpu-load, free-memory, total-memory, uptime
    async fn resources(&self, router: &MikrotikRouter) -> Result<RouterRow, RouterApiError>;
}
