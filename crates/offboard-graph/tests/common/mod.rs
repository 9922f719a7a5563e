//! Common test utilities for offboard-graph integration tests.

#![allow(dead_code)]

use offboard_graph::{GraphClient, GraphCredentials, GraphSettings};
use secrecy::SecretString;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT_ID: &str = "test-tenant";

/// Test data factory for directory users.
pub fn create_test_user(id: &str, upn: &str, enabled: bool) -> Value {
    json!({
        "id": id,
        "userPrincipalName": upn,
        "displayName": format!("Test User {id}"),
        "mail": upn,
        "accountEnabled": enabled
    })
}

/// Test data factory for delegated grants.
pub fn create_grant(id: &str, principal_id: &str, client_id: &str, scope: &str) -> Value {
    json!({
        "id": id,
        "clientId": client_id,
        "consentType": "Principal",
        "principalId": principal_id,
        "resourceId": "sp-graph",
        "scope": scope
    })
}

/// Test data factory for app-role assignments.
pub fn create_role_assignment(id: &str, principal_id: &str, resource_id: &str) -> Value {
    json!({
        "id": id,
        "appRoleId": "00000000-0000-0000-0000-000000000000",
        "principalId": principal_id,
        "resourceId": resource_id,
        "resourceDisplayName": format!("App {resource_id}"),
        "createdDateTime": "2024-01-10T08:00:00Z"
    })
}

/// Test data factory for sign-in events.
pub fn create_sign_in(id: &str, upn: &str, app_id: &str, created: &str) -> Value {
    json!({
        "id": id,
        "createdDateTime": created,
        "userPrincipalName": upn,
        "appId": app_id,
        "appDisplayName": format!("App {app_id}"),
        "ipAddress": "203.0.113.7",
        "isInteractive": true,
        "status": {"errorCode": 0},
        "riskLevelAggregated": "none",
        "riskState": "none"
    })
}

/// Wraps items in an OData collection response.
pub fn create_odata_response(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Creates an OData error response.
pub fn create_odata_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Creates a mock OAuth token response.
pub fn create_token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

pub fn test_credentials() -> GraphCredentials {
    GraphCredentials {
        tenant_id: TENANT_ID.to_string(),
        client_id: "test-client".to_string(),
        client_secret: SecretString::from("test-secret".to_string()),
    }
}

/// Mock server wrapper with common setup helpers.
pub struct MockGraphServer {
    pub server: MockServer,
}

impl MockGraphServer {
    /// Starts a mock server with the token endpoint mounted.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let mock = Self { server };
        mock.mock_token_endpoint().await;
        mock
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Settings pointing both Graph and login at this server.
    pub fn settings(&self) -> GraphSettings {
        GraphSettings::for_endpoint(&self.url(), Some(test_credentials()))
    }

    pub fn client(&self) -> GraphClient {
        GraphClient::new(&self.settings(), test_credentials()).unwrap()
    }

    pub async fn mock_token_endpoint(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT_ID}/oauth2/v2.0/token")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_token_response("mock-access-token", 3600)),
            )
            .mount(&self.server)
            .await;
    }

    /// Mounts a single-page GET response at `api_path` (relative to `/v1.0`).
    pub async fn mock_get(&self, api_path: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0{api_path}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mounts an error response for any method at `api_path`.
    pub async fn mock_error(&self, http_method: &str, api_path: &str, status: u16, code: &str) {
        Mock::given(method(http_method))
            .and(path(format!("/v1.0{api_path}")))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(create_odata_error(code, "mock error")),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of requests received that were not token requests.
    pub async fn api_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().starts_with("/v1.0"))
            .count()
    }
}
