use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::Config;
use crate::db::Store;
use crate::mikrotik::{row_str, RouterApi};
use crate::models::*;

const RADIUS_MENU: &str = "/radius";
const CLIENT_COMMENT: &str = "Auto-configured by ISP Solution";
const CLIENT_TIMEOUT: &str = "3s";

const NETWATCH_MENU: &str = "/tool/netwatch";
// RADIUS up: only RADIUS users may connect. RADIUS down: local secrets take over.
const NETWATCH_UP_SCRIPT: &str = "/ppp secret disable [find disabled=no];/ppp active remove [find radius=no];";
const NETWATCH_DOWN_SCRIPT: &str = "/ppp secret enable [find disabled=yes];";

/// RADIUS values pushed to routers
#[derive(Debug, Clone)]
pub struct RadiusSettings {
    pub auth_port: u16,
    pub acct_port: u16,
    pub interim_update: String,
}

impl From<&Config> for RadiusSettings {
    fn from(config: &Config) -> Self {
        Self {
            auth_port: config.radius_auth_port,
            acct_port: config.radius_acct_port,
            interim_update: config.radius_interim_update.clone(),
        }
    }
}

impl Default for RadiusSettings {
    fn default() -> Self {
        Self {
            auth_port: 1812,
            acct_port: 1813,
            interim_update: "5m".to_string(),
        }
    }
}

/// Points routers at the central RADIUS server
pub struct RadiusService {
    store: Store,
    api: Arc<dyn RouterApi>,
    settings: RadiusSettings,
}

impl RadiusService {
    pub fn new(store: Store, api: Arc<dyn RouterApi>, settings: RadiusSettings) -> Self {
        Self { store, api, settings }
    }

    /// Configure a freshly added router for central authentication.
    /// Each step runs regardless of earlier failures and is reported on its own.
    pub async fn provision_on_first_connect(&self, router: &MikrotikRouter) -> ProvisioningResult {
        let nas = match router.nas_id {
            Some(nas_id) => match self.store.get_nas(nas_id).await {
                Ok(nas) => nas,
                Err(e) => {
                    tracing::error!("Failed to load NAS {} for router {}: {}", nas_id, router.id, e);
                    None
                }
            },
            None => None,
        };
        let Some(nas) = nas else {
            tracing::warn!("Router {} has no NAS record, skipping RADIUS provisioning", router.name);
            return ProvisioningResult {
                success: false,
                message: "Router has no associated NAS record".to_string(),
                steps: None,
            };
        };

        let steps = ProvisioningSteps {
            radius_client: self.configure_radius_client(router, &nas).await,
            ppp_aaa: self.configure_ppp_aaa(router).await,
            radius_incoming: self.configure_radius_incoming(router).await,
            backup: self.create_initial_backup(router).await,
            netwatch: self.configure_netwatch(router, &nas).await,
            nas_table: self.ensure_nas_entry(router, &nas).await,
        };

        let failed = steps.failed_count();
        if failed == 0 {
            if let Err(e) = self.store.mark_router_provisioned(router.id).await {
                tracing::error!("Failed to mark router {} as provisioned: {}", router.id, e);
            }
            tracing::info!("Provisioned router {} for RADIUS", router.name);
            ProvisioningResult {
                success: true,
                message: "Router provisioned successfully for RADIUS authentication".to_string(),
                steps: Some(steps),
            }
        } else {
            tracing::warn!("RADIUS provisioning of {}: {} step(s) failed", router.name, failed);
            ProvisioningResult {
                success: false,
                message: format!("{} step(s) failed", failed),
                steps: Some(steps),
            }
        }
    }

    /// Edit the client entry for the NAS server in place, or add one
    async fn configure_radius_client(&self, router: &MikrotikRouter, nas: &Nas) -> bool {
        let existing = match self
            .api
            .print(router, RADIUS_MENU, &[("address", nas.server.as_str())])
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Failed to read RADIUS clients on {}: {}", router.name, e);
                return false;
            }
        };

        let mut params = json!({
            "secret": nas.secret,
            "service": "hotspot,ppp",
            "authentication-port": self.settings.auth_port.to_string(),
            "accounting-port": self.settings.acct_port.to_string(),
            "timeout": CLIENT_TIMEOUT,
        });

        let result = match existing.first().and_then(|row| row_str(row, ".id")) {
            Some(row_id) => {
                params[".id"] = json!(row_id);
                self.api.set(router, RADIUS_MENU, &params).await
            }
            None => {
                params["address"] = json!(nas.server);
                params["comment"] = json!(CLIENT_COMMENT);
                self.api.add(router, RADIUS_MENU, &params).await
            }
        };
        step_ok(router, "radius client", result)
    }

    /// Watch the RADIUS server and switch PPP authentication with its reachability.
    /// An existing entry for the server is edited in place.
    async fn configure_netwatch(&self, router: &MikrotikRouter, nas: &Nas) -> bool {
        let existing = match self
            .api
            .print(router, NETWATCH_MENU, &[("host", nas.server.as_str())])
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Failed to read netwatch entries on {}: {}", router.name, e);
                return false;
            }
        };

        let mut params = json!({
            "interval": "1m",
            "timeout": "1s",
            "up-script": NETWATCH_UP_SCRIPT,
            "down-script": NETWATCH_DOWN_SCRIPT,
            "comment": "radius",
        });

        let result = match existing.first().and_then(|row| row_str(row, ".id")) {
            Some(row_id) => {
                params[".id"] = json!(row_id);
                self.api.set(router, NETWATCH_MENU, &params).await
            }
            None => {
                params["host"] = json!(nas.server);
                self.api.add(router, NETWATCH_MENU, &params).await
            }
        };
        step_ok(router, "netwatch", result)
    }

    async fn configure_ppp_aaa(&self, router: &MikrotikRouter) -> bool {
        let params = json!({
            "use-radius": "yes",
            "accounting": "yes",
            "interim-update": self.settings.interim_update,
        });
        let result = self.api.command(router, "/ppp/aaa/set", &params).await;
        step_ok(router, "ppp aaa", result)
    }

    async fn configure_radius_incoming(&self, router: &MikrotikRouter) -> bool {
        let result = self
            .api
            .command(router, "/radius/incoming/set", &json!({ "accept": "yes" }))
            .await;
        step_ok(router, "radius incoming", result)
    }

    async fn create_initial_backup(&self, router: &MikrotikRouter) -> bool {
        let name = format!("initial-backup-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        let result = self
            .api
            .command(router, "/system/backup/save", &json!({ "name": name, "dont-encrypt": "yes" }))
            .await;
        step_ok(router, "initial backup", result)
    }

    /// The NAS row must carry the router address and the router must point at it
    async fn ensure_nas_entry(&self, router: &MikrotikRouter, nas: &Nas) -> bool {
        let result = async {
            if nas.nasname != router.ip_address {
                self.store.update_nas_name(nas.id, &router.ip_address).await?;
            }
            if router.nas_id != Some(nas.id) {
                self.store.set_router_nas(router.id, nas.id).await?;
            }
            anyhow::Ok(())
        };
        match result.await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to update NAS entry for router {}: {}", router.id, e);
                false
            }
        }
    }

    /// A router counts as provisioned once a run completed with every step
    pub async fn is_provisioned(&self, router_id: i64) -> Result<bool> {
        Ok(self
            .store
            .get_router(router_id)
            .await?
            .is_some_and(|router| router.nas_id.is_some() && router.provisioned_at.is_some()))
    }

    /// Snapshot the router's PPP secrets into a file on the router
    pub async fn export_ppp_secrets(&self, router: &MikrotikRouter) -> ExportResult {
        let filename = format!("ppp-secret-backup-by-billing-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        match self
            .api
            .command(router, "/ppp/secret/export", &json!({ "file": filename }))
            .await
        {
            Ok(_) => {
                tracing::info!("Exported PPP secrets of {} to {}", router.name, filename);
                ExportResult {
                    success: true,
                    filename,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to export PPP secrets of {}: {}", router.name, e);
                ExportResult {
                    success: false,
                    filename,
                }
            }
        }
    }
}

fn step_ok<E: std::fmt::Display>(router: &MikrotikRouter, step: &str, result: Result<Value, E>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Provisioning step '{}' failed on {}: {}", step, router.name, e);
            false
        }
    }
}
