//! In-memory device fakes for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::mikrotik::{RouterApi, RouterApiError, RouterRow};
use crate::models::{ActiveSession, MikrotikRouter};
use crate::transport::{DeviceEndpoint, DeviceTransport, SnmpValue, TransportError};

#[derive(Clone)]
enum Reply {
    Output(String),
    AuthFailure,
    Refused,
}

/// Scripted SSH/SNMP device. Unscripted commands return empty output.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, Reply>>,
    gets: Mutex<HashMap<String, SnmpValue>>,
    walks: Mutex<HashMap<String, Vec<(String, SnmpValue)>>>,
    unreachable: Mutex<bool>,
    pub commands: Mutex<Vec<String>>,
    pub sessions: Mutex<HashSet<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, command: &str, output: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), Reply::Output(output.to_string()));
    }

    pub fn reject_auth(&self, command: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), Reply::AuthFailure);
    }

    pub fn refuse(&self, command: &str) {
        self.replies.lock().unwrap().insert(command.to_string(), Reply::Refused);
    }

    pub fn set_get(&self, oid: &str, value: SnmpValue) {
        self.gets.lock().unwrap().insert(oid.to_string(), value);
    }

    pub fn set_walk(&self, root: &str, entries: Vec<(String, SnmpValue)>) {
        self.walks.lock().unwrap().insert(root.to_string(), entries);
    }

    pub fn go_offline(&self) {
        *self.unreachable.lock().unwrap() = true;
    }

    pub fn sent(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn check_reachable(&self, ep: &DeviceEndpoint) -> Result<(), TransportError> {
        if *self.unreachable.lock().unwrap() {
            return Err(TransportError::Connect(format!("{}: connection refused", ep.host)));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceTransport for FakeTransport {
    async fn exec(&self, endpoint: &DeviceEndpoint, command: &str) -> Result<String, TransportError> {
        self.check_reachable(endpoint)?;
        self.commands.lock().unwrap().push(command.to_string());
        match self.replies.lock().unwrap().get(command).cloned() {
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::AuthFailure) => Err(TransportError::Auth("bad password".to_string())),
            Some(Reply::Refused) => Err(TransportError::Connect("connection refused".to_string())),
            None => Ok(String::new()),
        }
    }

    async fn snmp_get(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Option<SnmpValue>, TransportError> {
        self.check_reachable(endpoint)?;
        Ok(self.gets.lock().unwrap().get(oid).cloned())
    }

    async fn snmp_walk(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Vec<(String, SnmpValue)>, TransportError> {
        self.check_reachable(endpoint)?;
        Ok(self.walks.lock().unwrap().get(oid).cloned().unwrap_or_default())
    }

    async fn open_session(&self, endpoint: &DeviceEndpoint) -> Result<(), TransportError> {
        self.check_reachable(endpoint)?;
        self.sessions.lock().unwrap().insert(endpoint.key());
        Ok(())
    }

    async fn close_session(&self, endpoint: &DeviceEndpoint) -> bool {
        self.sessions.lock().unwrap().remove(&endpoint.key())
    }
}

/// One recorded router API call
#[derive(Debug, Clone, PartialEq)]
pub struct RouterCall {
    pub method: &'static str,
    pub path: String,
    pub params: Value,
}

/// Scripted router management API
#[derive(Default)]
pub struct FakeRouterApi {
    pub calls: Mutex<Vec<RouterCall>>,
    rows: Mutex<HashMap<String, Vec<RouterRow>>>,
    failing: Mutex<HashSet<String>>,
    sessions: Mutex<Vec<ActiveSession>>,
    resources: Mutex<Option<RouterRow>>,
    down: Mutex<bool>,
}

impl FakeRouterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by `print` for a menu
    pub fn set_rows(&self, menu: &str, rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        self.rows.lock().unwrap().insert(menu.to_string(), rows);
    }

    /// Make every call against a menu or command path fail
    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn set_sessions(&self, sessions: Vec<ActiveSession>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_resources(&self, row: Value) {
        *self.resources.lock().unwrap() = row.as_object().cloned();
    }

    pub fn go_offline(&self) {
        *self.down.lock().unwrap() = true;
    }

    pub fn recorded(&self) -> Vec<RouterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<RouterCall> {
        self.recorded()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    fn record(&self, method: &'static str, path: &str, params: &Value) -> Result<(), RouterApiError> {
        if *self.down.lock().unwrap() {
            return Err(RouterApiError::Status {
                status: 503,
                body: "router unreachable".to_string(),
            });
        }
        self.calls.lock().unwrap().push(RouterCall {
            method,
            path: path.to_string(),
            params: params.clone(),
        });
        if self.failing.lock().unwrap().contains(path) {
            return Err(RouterApiError::Rejected(format!("{} {} failed", method, path)));
        }
        Ok(())
    }
}

#[async_trait]
impl RouterApi for FakeRouterApi {
    async fn health(&self, _router: &MikrotikRouter) -> Result<(), RouterApiError> {
        self.record("health", "/health", &Value::Null)
    }

    async fn print(
        &self,
        _router: &MikrotikRouter,
        menu: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<RouterRow>, RouterApiError> {
        let params: serde_json::Map<String, Value> = query
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        self.record("print", menu, &Value::Object(params))?;
        let rows = self.rows.lock().unwrap().get(menu).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| {
                query
                    .iter()
                    .all(|(k, v)| row.get(*k).and_then(Value::as_str) == Some(*v))
            })
            .collect())
    }

    async fn add(&self, _router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.record("add", menu, params)?;
        Ok(json!({ "success": true, "ret": "*1" }))
    }

    async fn set(&self, _router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.record("set", menu, params)?;
        Ok(json!({ "success": true }))
    }

    async fn remove(&self, _router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.record("remove", menu, params)?;
        Ok(json!({ "success": true }))
    }

    async fn command(&self, _router: &MikrotikRouter, path: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.record("command", path, params)?;
        Ok(Value::Null)
    }

    async fn active_sessions(&self, _router: &MikrotikRouter) -> Result<Vec<ActiveSession>, RouterApiError> {
        self.record("active_sessions", "/ppp/active", &Value::Null)?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn resources(&self, _router: &MikrotikRouter) -> Result<RouterRow, RouterApiError> {
        self.record("resources", "/system/resource", &Value::Null)?;
        self.resources
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RouterApiError::Decode("no resource row".to_string()))
    }
}
