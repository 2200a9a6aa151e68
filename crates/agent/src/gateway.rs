use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use parley_core::config::CrmConfig;
use parley_core::{ConnectionContext, Record};

pub const DEFAULT_PAGE_LENGTH: u32 = 20;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid CRM url `{0}`")]
    InvalidUrl(String),
    #[error("CRM request failed: {0}")]
    Transport(String),
    /// Non-2xx reply. `body` is the upstream payload, JSON when it parsed, text otherwise.
    #[error("CRM returned HTTP {status}")]
    Upstream { status: u16, body: Value },
    #[error("CRM client could not be built: {0}")]
    Setup(String),
}

/// A list read against one doctype, with the REST API's defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceQuery {
    pub doctype: String,
    pub filters: Value,
    pub fields: Value,
    pub limit: u32,
}

impl ResourceQuery {
    pub fn new(doctype: impl Into<String>) -> Self {
        Self {
            doctype: doctype.into(),
            filters: json!([]),
            fields: json!(["*"]),
            limit: DEFAULT_PAGE_LENGTH,
        }
    }

    pub fn with_filters(mut self, filters: Value) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
pub trait CrmGateway: Send + Sync {
    async fn fetch_resources(
        &self,
        context: &ConnectionContext,
        query: &ResourceQuery,
    ) -> Result<Value, GatewayError>;

    async fn create_resource(
        &self,
        context: &ConnectionContext,
        doctype: &str,
        data: &Record,
    ) -> Result<Value, GatewayError>;

    async fn call_method(
        &self,
        context: &ConnectionContext,
        method: &str,
        args: &Value,
    ) -> Result<Value, GatewayError>;

    async fn logged_user(&self, context: &ConnectionContext) -> Result<Value, GatewayError>;
}

/// Frappe REST client. Credentials travel with each call, so one instance serves every caller.
#[derive(Clone)]
pub struct FrappeGateway {
    client: reqwest::Client,
}

impl FrappeGateway {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Setup(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &CrmConfig) -> Result<Self, GatewayError> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }

    fn endpoint(context: &ConnectionContext, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(context.base_url())
            .map_err(|_| GatewayError::InvalidUrl(context.api_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(context.api_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        context: &ConnectionContext,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        debug!(event_name = "crm.request", method = %method, path = url.path());

        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", context.authorization())
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(GatewayError::Upstream { status: status.as_u16(), body });
        }
        Ok(body)
    }
}

#[async_trait]
impl CrmGateway for FrappeGateway {
    async fn fetch_resources(
        &self,
        context: &ConnectionContext,
        query: &ResourceQuery,
    ) -> Result<Value, GatewayError> {
        let mut url = Self::endpoint(context, &["api", "resource", &query.doctype])?;
        url.query_pairs_mut()
            .append_pair("filters", &query.filters.to_string())
            .append_pair("fields", &query.fields.to_string())
            .append_pair("limit_page_length", &query.limit.to_string());

        self.send(context, Method::GET, url, None).await
    }

    async fn create_resource(
        &self,
        context: &ConnectionContext,
        doctype: &str,
        data: &Record,
    ) -> Result<Value, GatewayError> {
        let url = Self::endpoint(context, &["api", "resource", doctype])?;
        let body = Value::Object(data.clone());
        self.send(context, Method::POST, url, Some(&body)).await
    }

    async fn call_method(
        &self,
        context: &ConnectionContext,
        method: &str,
        args: &Value,
    ) -> Result<Value, GatewayError> {
        let url = Self::endpoint(context, &["api", "method", method])?;
        self.send(context, Method::POST, url, Some(args)).await
    }

    async fn logged_user(&self, context: &ConnectionContext) -> Result<Value, GatewayError> {
        let url = Self::endpoint(context, &["api", "method", "frappe.auth.get_logged_user"])?;
        self.send(context, Method::GET, url, None).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use parley_core::ConnectionContext;

    use super::{CrmGateway, FrappeGateway, GatewayError, ResourceQuery};

    fn gateway() -> FrappeGateway {
        FrappeGateway::new(Duration::from_secs(5)).expect("gateway")
    }

    fn context(server: &MockServer) -> ConnectionContext {
        ConnectionContext::new(format!("{}/", server.uri()), "key", "secret")
    }

    #[tokio::test]
    async fn fetch_sends_token_auth_and_encoded_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resource/Lead"))
            .and(header("Authorization", "token key:secret"))
            .and(query_param("filters", r#"[["status","=","Open"]]"#))
            .and(query_param("fields", r#"["*"]"#))
            .and(query_param("limit_page_length", "5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": [{ "name": "LEAD-00001" }] })),
            )
            .mount(&server)
            .await;

        let query = ResourceQuery::new("Lead")
            .with_filters(json!([["status", "=", "Open"]]))
            .with_limit(5);
        let body = gateway().fetch_resources(&context(&server), &query).await.expect("fetch");

        assert_eq!(body, json!({ "data": [{ "name": "LEAD-00001" }] }));
    }

    #[tokio::test]
    async fn upstream_errors_keep_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/method/frappe.client.get_count"))
            .and(body_json(json!({ "doctype": "Lead" })))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "exc_type": "PermissionError" })),
            )
            .mount(&server)
            .await;

        let error = gateway()
            .call_method(&context(&server), "frappe.client.get_count", &json!({ "doctype": "Lead" }))
            .await;

        assert!(matches!(
            error,
            Err(GatewayError::Upstream { status: 403, ref body })
                if body == &json!({ "exc_type": "PermissionError" })
        ));
    }

    #[tokio::test]
    async fn non_json_error_body_is_kept_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/method/frappe.auth.get_logged_user"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Not Authorized"))
            .mount(&server)
            .await;

        let error = gateway().logged_user(&context(&server)).await;

        assert!(matches!(
            error,
            Err(GatewayError::Upstream { status: 401, ref body }) if body == &json!("Not Authorized")
        ));
    }

    #[tokio::test]
    async fn create_posts_record_to_resource_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/resource/Task"))
            .and(body_json(json!({ "subject": "Call back" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "name": "TASK-9" } })),
            )
            .mount(&server)
            .await;

        let data = json!({ "subject": "Call back" }).as_object().cloned().unwrap_or_default();
        let body = gateway()
            .create_resource(&context(&server), "Task", &data)
            .await
            .expect("create");

        assert_eq!(body["data"]["name"], "TASK-9");
    }

    #[tokio::test]
    async fn malformed_api_url_is_rejected_without_a_request() {
        let context = ConnectionContext::new("not a url", "key", "secret");

        let error = gateway().logged_user(&context).await;

        assert!(matches!(error, Err(GatewayError::InvalidUrl(_))));
    }
}
