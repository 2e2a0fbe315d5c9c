use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;

use super::types::*;
use super::RouterApi;
use crate::models::{ActiveSession, MikrotikRouter};

/// HTTP client for the router management API
pub struct RouterApiClient {
    client: Client,
}

impl RouterApiClient {
    pub fn new(timeout: Duration) -> Result<Self, RouterApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn base_url(router: &MikrotikRouter) -> String {
        format!("http://{}:{}", router.ip_address, router.api_port)
    }

    fn api_url(router: &MikrotikRouter, path: &str) -> String {
        format!("{}/api/{}", Self::base_url(router), path.trim_start_matches('/'))
    }

    /// `/ppp/secret` + `add` -> `ppp/secret/add`
    fn menu_path(menu: &str, action: &str) -> String {
        format!("{}/{}", menu.trim_matches('/'), action)
    }

    /// Helper to turn a response into a checked JSON body
    async fn read_body(resp: Response) -> Result<Value, RouterApiError> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RouterApiError::Status { status, body });
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let body: Value =
            serde_json::from_str(&text).map_err(|e| RouterApiError::Decode(e.to_string()))?;
        check_success(&body)?;
        Ok(body)
    }

    async fn get(
        &self,
        router: &MikrotikRouter,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, RouterApiError> {
        let resp = self
            .client
            .get(Self::api_url(router, path))
            .basic_auth(&router.username, Some(&router.password))
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        Self::read_body(resp).await
    }

    async fn post(&self, router: &MikrotikRouter, path: &str, params: &Value) -> Result<Value, RouterApiError> {
        let resp = self
            .client
            .post(Self::api_url(router, path))
            .basic_auth(&router.username, Some(&router.password))
            .json(params)
            .send()
            .await?;
        Self::read_body(resp).await
    }
}

#[async_trait]
impl RouterApi for RouterApiClient {
    async fn health(&self, router: &MikrotikRouter) -> Result<(), RouterApiError> {
        let resp = self
            .client
            .get(format!("{}/health", Self::base_url(router)))
            .basic_auth(&router.username, Some(&router.password))
            .send()
            .await?;
        Self::read_body(resp).await.map(|_| ())
    }

    async fn print(
        &self,
        router: &MikrotikRouter,
        menu: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<RouterRow>, RouterApiError> {
        let body = self.get(router, &Self::menu_path(menu, "print"), query).await?;
        rows_from(body)
    }

    async fn add(&self, router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.post(router, &Self::menu_path(menu, "add"), params).await
    }

    async fn set(&self, router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.post(router, &Self::menu_path(menu, "set"), params).await
    }

    async fn remove(&self, router: &MikrotikRouter, menu: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.post(router, &Self::menu_path(menu, "remove"), params).await
    }

    async fn command(&self, router: &MikrotikRouter, path: &str, params: &Value) -> Result<Value, RouterApiError> {
        self.post(router, path, params).await
    }

    async fn active_sessions(&self, router: &MikrotikRouter) -> Result<Vec<ActiveSession>, RouterApiError> {
        let body = self.get(router, "ppp/active/print", &[]).await?;
        let parsed: ActiveSessionsResponse =
            serde_json::from_value(body).map_err(|e| RouterApiError::Decode(e.to_string()))?;
        Ok(parsed.sessions)
    }

    async fn resources(&self, router: &MikrotikRouter) -> Result<RouterRow, RouterApiError> {
        match self.get(router, "system/resource/print", &[]).await? {
            Value::Object(row) => Ok(row),
            // Some firmware wraps the single row in an array
            Value::Array(items) => items
                .into_iter()
                .find_map(|item| match item {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .ok_or_else(|| RouterApiError::Decode("empty resource listing".to_string())),
            other => Err(RouterApiError::Decode(format!("resource response is {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn router_for(server: &MockServer) -> MikrotikRouter {
        let now = Utc::now();
        MikrotikRouter {
            id: 1,
            nas_id: None,
            name: "core-1".to_string(),
            ip_address: server.address().ip().to_string(),
            api_port: server.address().port(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            radius_secret: None,
            status: "active".to_string(),
            api_status: "unknown".to_string(),
            last_checked_at: None,
            last_error: None,
            response_time_ms: None,
            provisioned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn client() -> RouterApiClient {
        RouterApiClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_health_sends_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        client().health(&router_for(&server)).await.unwrap();
    }

    #[tokio::test]
    async fn test_health_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client().health(&router_for(&server)).await.unwrap_err();
        assert!(matches!(err, RouterApiError::Status { status: 401, .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_print_with_query_and_wrapped_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/radius/print"))
            .and(query_param("address", "10.9.9.9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{".id": "*3", "address": "10.9.9.9"}]
            })))
            .mount(&server)
            .await;

        let rows = client()
            .print(&router_for(&server), "/radius", &[("address", "10.9.9.9")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(row_str(&rows[0], ".id"), Some("*3"));
    }

    #[tokio::test]
    async fn test_add_rejected_by_router() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ppp/secret/add"))
            .and(body_json(json!({"name": "alice", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "failure: secret with the same name already exists"
            })))
            .mount(&server)
            .await;

        let err = client()
            .add(&router_for(&server), "/ppp/secret", &json!({"name": "alice", "password": "pw"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterApiError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_active_sessions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ppp/active/print"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "sessions": [
                    {".id": "*A1", "name": "alice", "address": "10.0.0.2", "uptime": "1h2m", "caller-id": "AA:BB"},
                    {"id": "*A2", "name": "bob", "address": "10.0.0.3", "uptime": "5m"}
                ]
            })))
            .mount(&server)
            .await;

        let sessions = client().active_sessions(&router_for(&server)).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "*A1");
        assert_eq!(sessions[0].caller_id.as_deref(), Some("AA:BB"));
        assert_eq!(sessions[1].name, "bob");
    }

    #[tokio::test]
    async fn test_resources_array_form() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/system/resource/print"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"cpu-load": "7", "free-memory": "512", "total-memory": "1024", "uptime": "1d2h"}
            ])))
            .mount(&server)
            .await;

        let row = client().resources(&router_for(&server)).await.unwrap();
        assert_eq!(row_f64(&row, "cpu-load"), Some(7.0));
        assert_eq!(row_str(&row, "uptime"), Some("1d2h"));
    }

    #[tokio::test]
    async fn test_command_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/system/backup/save"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let body = client()
            .command(&router_for(&server), "/system/backup/save", &json!({"name": "b"}))
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
    }
}
