use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::db::Store;
use crate::mikrotik::{RouterApi, RouterRow};
use crate::models::*;

const PPP_SECRET: &str = "/ppp/secret";
const PPP_ACTIVE: &str = "/ppp/active";

/// PPPoE secret management on routers with a local mirror.
///
/// Router calls come first; the mirror is only touched after the router
/// accepted the change. Concurrent writers to the same mirror row are
/// last-write-wins.
pub struct MikrotikService {
    store: Store,
    api: Arc<dyn RouterApi>,
    /// Router remembered by the last successful connect_router
    current_router: Mutex<Option<i64>>,
}

impl MikrotikService {
    pub fn new(store: Store, api: Arc<dyn RouterApi>) -> Self {
        Self {
            store,
            api,
            current_router: Mutex::new(None),
        }
    }

    async fn load_router(&self, router_id: i64) -> Option<MikrotikRouter> {
        match self.store.get_router(router_id).await {
            Ok(router) => router,
            Err(e) => {
                tracing::error!("Failed to load router {}: {}", router_id, e);
                None
            }
        }
    }

    fn current_router_id(&self) -> Option<i64> {
        match self.current_router.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn remember_router(&self, router_id: i64) {
        let mut guard = match self.current_router.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(router_id);
    }

    /// Reachability probe. Remembers the router for disconnect_session.
    pub async fn connect_router(&self, router_id: i64) -> bool {
        let Some(router) = self.load_router(router_id).await else {
            return false;
        };
        match self.api.health(&router).await {
            Ok(()) => {
                self.remember_router(router.id);
                tracing::info!("Connected to router {} ({})", router.name, router.ip_address);
                true
            }
            Err(e) => {
                tracing::warn!("Router {} unreachable: {}", router.name, e);
                false
            }
        }
    }

    // ========== PPPoE Secrets ==========

    /// Add a secret on the router, then mirror it locally as synced
    pub async fn create_pppoe_user(&self, req: &CreatePppoeUserRequest) -> bool {
        let Some(router) = self.load_router(req.router_id).await else {
            return false;
        };

        let mut params = json!({
            "name": req.username,
            "password": req.password,
            "service": req.service,
            "profile": req.profile,
        });
        if let Some(addr) = &req.local_address {
            params["local-address"] = json!(addr);
        }
        if let Some(addr) = &req.remote_address {
            params["remote-address"] = json!(addr);
        }

        if let Err(e) = self.api.add(&router, PPP_SECRET, &params).await {
            tracing::warn!("Failed to create PPPoE user {} on {}: {}", req.username, router.name, e);
            return false;
        }

        match self.store.upsert_pppoe_user(req).await {
            Ok(_) => {
                tracing::info!("Created PPPoE user {} on {}", req.username, router.name);
                true
            }
            Err(e) => {
                tracing::error!("Failed to mirror PPPoE user {}: {}", req.username, e);
                false
            }
        }
    }

    /// Router owning a secret: the freshest mirror row, else the connected router
    async fn locate_secret(&self, username: &str) -> Option<(MikrotikRouter, Option<MikrotikPppoeUser>)> {
        let mirror = match self.store.find_pppoe_user(username).await {
            Ok(mirror) => mirror,
            Err(e) => {
                tracing::error!("Failed to look up PPPoE user {}: {}", username, e);
                return None;
            }
        };
        let router_id = mirror
            .as_ref()
            .map(|m| m.router_id)
            .or_else(|| self.current_router_id())?;
        let router = self.load_router(router_id).await?;
        Some((router, mirror))
    }

    pub async fn update_pppoe_user(&self, username: &str, changes: &UpdatePppoeUserRequest) -> bool {
        let Some((router, mirror)) = self.locate_secret(username).await else {
            tracing::warn!("No router found for PPPoE user {}", username);
            return false;
        };
        if mirror.as_ref().is_some_and(|m| m.status == pppoe_status::INACTIVE) {
            tracing::warn!("PPPoE user {} was deleted, create it again instead of updating", username);
            return false;
        }

        let mut params = Map::new();
        params.insert("numbers".to_string(), json!(username));
        let fields = [
            ("password", &changes.password),
            ("service", &changes.service),
            ("profile", &changes.profile),
            ("local-address", &changes.local_address),
            ("remote-address", &changes.remote_address),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                params.insert(key.to_string(), json!(value));
            }
        }

        if let Err(e) = self.api.set(&router, PPP_SECRET, &Value::Object(params)).await {
            tracing::warn!("Failed to update PPPoE user {} on {}: {}", username, router.name, e);
            return false;
        }

        if let Some(mirror) = mirror {
            if let Err(e) = self.store.update_pppoe_user(mirror.id, changes).await {
                tracing::error!("Failed to update mirror of PPPoE user {}: {}", username, e);
                return false;
            }
        }
        tracing::info!("Updated PPPoE user {} on {}", username, router.name);
        true
    }

    /// Remove the secret on the router; the mirror row is kept as inactive
    pub async fn delete_pppoe_user(&self, username: &str) -> bool {
        let Some((router, mirror)) = self.locate_secret(username).await else {
            tracing::warn!("No router found for PPPoE user {}", username);
            return false;
        };

        if let Err(e) = self
            .api
            .remove(&router, PPP_SECRET, &json!({ "numbers": username }))
            .await
        {
            tracing::warn!("Failed to delete PPPoE user {} on {}: {}", username, router.name, e);
            return false;
        }

        if let Some(mirror) = mirror {
            if let Err(e) = self
                .store
                .set_pppoe_user_status(mirror.id, pppoe_status::INACTIVE)
                .await
            {
                tracing::error!("Failed to deactivate mirror of PPPoE user {}: {}", username, e);
                return false;
            }
        }
        tracing::info!("Deleted PPPoE user {} on {}", username, router.name);
        true
    }

    // ========== Sessions ==========

    pub async fn get_active_sessions(&self, router_id: i64) -> Vec<ActiveSession> {
        let Some(router) = self.load_router(router_id).await else {
            return Vec::new();
        };
        match self.api.active_sessions(&router).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!("Failed to list sessions on {}: {}", router.name, e);
                Vec::new()
            }
        }
    }

    /// Drop an active session on the connected router
    pub async fn disconnect_session(&self, session_id: &str) -> bool {
        let Some(router_id) = self.current_router_id() else {
            tracing::warn!("disconnect_session called without a connected router");
            return false;
        };
        let Some(router) = self.load_router(router_id).await else {
            return false;
        };

        match self
            .api
            .remove(&router, PPP_ACTIVE, &json!({ "id": session_id, ".id": session_id }))
            .await
        {
            Ok(_) => {
                tracing::info!("Disconnected session {} on {}", session_id, router.name);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to disconnect session {} on {}: {}", session_id, router.name, e);
                false
            }
        }
    }

    // ========== Resources ==========

    /// System resources, recording API reachability on the router row.
    /// Empty on any failure.
    pub async fn get_resources(&self, router_id: i64) -> RouterRow {
        let Some(router) = self.load_router(router_id).await else {
            return RouterRow::new();
        };

        let started = Instant::now();
        let result = self.api.resources(&router).await;
        let elapsed = started.elapsed().as_millis() as i64;

        let (status, error, resources) = match result {
            Ok(row) => (api_status::ONLINE, None, row),
            Err(e) => {
                tracing::warn!("Failed to read resources from {}: {}", router.name, e);
                (api_status::OFFLINE, Some(e.to_string()), RouterRow::new())
            }
        };
        let response_time = (status == api_status::ONLINE).then_some(elapsed);

        if let Err(e) = self
            .store
            .update_router_api_status(router.id, status, error.as_deref(), response_time)
            .await
        {
            tracing::error!("Failed to record API status for router {}: {}", router.id, e);
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::services::testing::FakeRouterApi;

    async fn setup() -> (MikrotikService, Arc<FakeRouterApi>, Store, MikrotikRouter, tempfile::TempDir) {
        let (store, dir) = temp_store().await;
        let api = Arc::new(FakeRouterApi::new());
        let router = store
            .create_router(&CreateRouterRequest {
                name: "core-1".to_string(),
                ip_address: "192.0.2.1".to_string(),
                api_port: Some(8728),
                username: "admin".to_string(),
                password: "password".to_string(),
                radius_secret: None,
                nas_id: None,
            })
            .await
            .unwrap();
        let service = MikrotikService::new(store.clone(), api.clone());
        (service, api, store, router, dir)
    }

    fn new_user(router_id: i64, username: &str) -> CreatePppoeUserRequest {
        CreatePppoeUserRequest {
            router_id,
            username: username.to_string(),
            password: "testpass".to_string(),
            service: "pppoe".to_string(),
            profile: "default".to_string(),
            local_address: None,
            remote_address: Some("10.10.0.5".to_string()),
        }
    }

    #[tokio::test]
    async fn test_connect_router() {
        let (service, api, _store, router, _dir) = setup().await;
        assert!(service.connect_router(router.id).await);
        assert!(!service.connect_router(router.id + 100).await);

        api.go_offline();
        assert!(!service.connect_router(router.id).await);
    }

    #[tokio::test]
    async fn test_create_pppoe_user_mirrors_on_success() {
        let (service, api, store, router, _dir) = setup().await;

        assert!(service.create_pppoe_user(&new_user(router.id, "testuser")).await);

        let calls = api.calls_to("add", PPP_SECRET);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params["name"], "testuser");
        assert_eq!(calls[0].params["remote-address"], "10.10.0.5");
        assert!(calls[0].params.get("local-address").is_none());

        let mirror = store.get_pppoe_user(router.id, "testuser").await.unwrap().unwrap();
        assert_eq!(mirror.status, pppoe_status::SYNCED);
    }

    #[tokio::test]
    async fn test_create_pppoe_user_failure_leaves_no_mirror() {
        let (service, api, store, router, _dir) = setup().await;
        api.fail(PPP_SECRET);

        assert!(!service.create_pppoe_user(&new_user(router.id, "testuser")).await);
        assert!(store.get_pppoe_user(router.id, "testuser").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_pppoe_user() {
        let (service, api, store, router, _dir) = setup().await;
        assert!(service.create_pppoe_user(&new_user(router.id, "testuser")).await);

        let changes = UpdatePppoeUserRequest {
            password: Some("newpass".to_string()),
            ..Default::default()
        };
        assert!(service.update_pppoe_user("testuser", &changes).await);

        let calls = api.calls_to("set", PPP_SECRET);
        assert_eq!(calls[0].params, json!({ "numbers": "testuser", "password": "newpass" }));

        let mirror = store.get_pppoe_user(router.id, "testuser").await.unwrap().unwrap();
        assert_eq!(mirror.password, "newpass");
        assert_eq!(mirror.profile, "default");
    }

    #[tokio::test]
    async fn test_update_unknown_user_without_connection_fails() {
        let (service, api, _store, _router, _dir) = setup().await;
        let changes = UpdatePppoeUserRequest {
            profile: Some("10mbps".to_string()),
            ..Default::default()
        };
        assert!(!service.update_pppoe_user("ghost", &changes).await);
        assert!(api.calls_to("set", PPP_SECRET).is_empty());
    }

    #[tokio::test]
    async fn test_update_rejected_keeps_mirror() {
        let (service, api, store, router, _dir) = setup().await;
        assert!(service.create_pppoe_user(&new_user(router.id, "testuser")).await);
        api.fail(PPP_SECRET);

        let changes = UpdatePppoeUserRequest {
            password: Some("newpass".to_string()),
            ..Default::default()
        };
        assert!(!service.update_pppoe_user("testuser", &changes).await);
        let mirror = store.get_pppoe_user(router.id, "testuser").await.unwrap().unwrap();
        assert_eq!(mirror.password, "testpass");
    }

    #[tokio::test]
    async fn test_delete_pppoe_user_soft_deletes() {
        let (service, api, store, router, _dir) = setup().await;
        assert!(service.create_pppoe_user(&new_user(router.id, "testuser")).await);

        assert!(service.delete_pppoe_user("testuser").await);
        assert_eq!(api.calls_to("remove", PPP_SECRET)[0].params, json!({ "numbers": "testuser" }));

        let mirror = store.get_pppoe_user(router.id, "testuser").await.unwrap().unwrap();
        assert_eq!(mirror.status, pppoe_status::INACTIVE);
    }

    #[tokio::test]
    async fn test_update_deleted_user_is_refused() {
        let (service, api, store, router, _dir) = setup().await;
        assert!(service.create_pppoe_user(&new_user(router.id, "testuser")).await);
        assert!(service.delete_pppoe_user("testuser").await);

        let changes = UpdatePppoeUserRequest {
            password: Some("newpass".to_string()),
            ..Default::default()
        };
        assert!(!service.update_pppoe_user("testuser", &changes).await);
        assert!(api.calls_to("set", PPP_SECRET).is_empty());

        let mirror = store.get_pppoe_user(router.id, "testuser").await.unwrap().unwrap();
        assert_eq!(mirror.status, pppoe_status::INACTIVE);
        assert_eq!(mirror.password, "testpass");

        // the mirror write itself never revives an inactive row
        store.update_pppoe_user(mirror.id, &changes).await.unwrap();
        let mirror = store.get_pppoe_user(router.id, "testuser").await.unwrap().unwrap();
        assert_eq!(mirror.status, pppoe_status::INACTIVE);
        assert_eq!(mirror.password, "newpass");
    }

    #[tokio::test]
    async fn test_get_active_sessions() {
        let (service, api, _store, router, _dir) = setup().await;
        api.set_sessions(vec![
            ActiveSession {
                id: "*1".to_string(),
                name: "user1".to_string(),
                address: "10.0.0.1".to_string(),
                uptime: "1h".to_string(),
                caller_id: None,
                service: None,
            },
            ActiveSession {
                id: "*2".to_string(),
                name: "user2".to_string(),
                address: "10.0.0.2".to_string(),
                uptime: "30m".to_string(),
                caller_id: None,
                service: None,
            },
        ]);

        let sessions = service.get_active_sessions(router.id).await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].name, "user1");
        assert_eq!(sessions[1].name, "user2");

        api.go_offline();
        assert!(service.get_active_sessions(router.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_session_requires_connection() {
        let (service, api, _store, router, _dir) = setup().await;
        assert!(!service.disconnect_session("*1").await);

        assert!(service.connect_router(router.id).await);
        assert!(service.disconnect_session("*1").await);
        assert_eq!(api.calls_to("remove", PPP_ACTIVE)[0].params["id"], "*1");
    }

    #[tokio::test]
    async fn test_get_resources_records_api_status() {
        let (service, api, store, router, _dir) = setup().await;
        api.set_resources(json!({
            "cpu-load": 7,
            "free-memory": 268435456u64,
            "total-memory": 1073741824u64,
            "uptime": "1w2d3h4m5s",
        }));

        let resources = service.get_resources(router.id).await;
        assert_eq!(resources.get("cpu-load"), Some(&json!(7)));
        let stored = store.get_router(router.id).await.unwrap().unwrap();
        assert_eq!(stored.api_status, api_status::ONLINE);
        assert!(stored.last_checked_at.is_some());
        assert!(stored.last_error.is_none());

        api.go_offline();
        assert!(service.get_resources(router.id).await.is_empty());
        let stored = store.get_router(router.id).await.unwrap().unwrap();
        assert_eq!(stored.api_status, api_status::OFFLINE);
        assert!(stored.last_error.unwrap().contains("503"));

        assert!(service.get_resources(router.id + 100).await.is_empty());
    }
}
