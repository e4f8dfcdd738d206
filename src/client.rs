//! Signed RPC client for one platform service.
//!
//! `CloudApiClient` owns a `(service, version)` pair and dispatches
//! single HTTP calls: it resolves credentials, strips null params, signs
//! the canonical request and parses the JSON response envelope into
//! either the `Response` object or a [`CloudBaseError`].
//!
//! The client never retries (retry policy belongs to callers, see the
//! function service) and never logs secret material.

use crate::config::CloudBaseContext;
use crate::error::{CloudBaseError, CloudBaseResult};
use crate::signing::Tc3Signer;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Signed RPC client bound to one `(service, version)` pair.
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    service: String,
    version: String,
    /// Service-level params merged over every request's params.
    base_params: Map<String, Value>,
    context: CloudBaseContext,
    http: reqwest::Client,
}

impl CloudApiClient {
    /// Create a client for a service/version pair.
    pub fn new(context: CloudBaseContext, service: &str, version: &str) -> Self {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(proxy_url) = context.proxy() {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => log::warn!("ignoring invalid proxy URL: {}", e),
            }
        }

        let http = builder.build().unwrap_or_else(|_| reqwest::Client::new());

        Self {
            service: service.to_string(),
            version: version.to_string(),
            base_params: Map::new(),
            context,
            http,
        }
    }

    /// Attach service-level base params (merged over request params).
    pub fn with_base_params(mut self, base_params: Map<String, Value>) -> Self {
        self.base_params = base_params;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Dispatch a POST action and return the `Response` envelope body.
    pub async fn request(&self, action: &str, params: Value) -> CloudBaseResult<Value> {
        self.execute(action, params, "POST")
            .await
            .map_err(|e| e.with_action(action))
    }

    /// Dispatch a GET action; params are sent as a query string.
    pub async fn request_get(&self, action: &str, params: Value) -> CloudBaseResult<Value> {
        self.execute(action, params, "GET")
            .await
            .map_err(|e| e.with_action(action))
    }

    async fn execute(&self, action: &str, params: Value, method: &str) -> CloudBaseResult<Value> {
        let credentials = self.context.resolve_credentials()?;

        let data = strip_void(merge_params(params, &self.base_params));

        let endpoint = self.context.endpoint(&self.service);
        let base = Url::parse(&endpoint)
            .map_err(|e| CloudBaseError::transport(&format!("invalid endpoint {endpoint}: {e}")))?;
        let host = base
            .host_str()
            .ok_or_else(|| CloudBaseError::transport(&format!("endpoint {endpoint} has no host")))?
            .to_string();
        // The Host header carries the port; the signature covers only
        // the hostname.
        let host_header = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };

        let timestamp = Utc::now().timestamp();

        let (url, query, body) = if method == "GET" {
            let query = query_string(&data);
            let mut url = base.clone();
            url.set_query(if query.is_empty() { None } else { Some(&query) });
            (url, query, None)
        } else {
            let body = serde_json::to_string(&data)
                .map_err(|e| CloudBaseError::invalid_argument(&format!("unserializable params: {e}")))?;
            (base.clone(), String::new(), Some(body))
        };

        let signer = Tc3Signer::new(&credentials.secret_id, &credentials.secret_key, &self.service);
        let authorization = signer.sign(
            method,
            &host,
            base.path(),
            &query,
            body.as_deref(),
            timestamp,
        );

        let mut req = if method == "GET" {
            self.http
                .get(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
        } else {
            self.http
                .post(url)
                .header("Content-Type", "application/json")
        };

        req = req
            .header("Host", &host_header)
            .header("X-TC-Action", action)
            .header("X-TC-Region", self.context.region())
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Version", &self.version)
            .header("Authorization", authorization);

        if let Some(ref token) = credentials.token {
            req = req.header("X-TC-Token", token);
        }

        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(CloudBaseError::from)?;
        let text = resp.text().await.map_err(CloudBaseError::from)?;

        // The envelope carries errors even on HTTP 200; some gateway
        // failures return HTML instead of JSON.
        let envelope: Value = serde_json::from_str(&text).map_err(|_| {
            let snippet: String = text.chars().take(200).collect();
            CloudBaseError::response_parse(&snippet)
        })?;

        let response = envelope
            .get("Response")
            .cloned()
            .ok_or_else(|| CloudBaseError::response_parse("missing Response envelope"))?;

        let request_id = response
            .get("RequestId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        if let Some(err) = response.get("Error") {
            let code = err.get("Code").and_then(|v| v.as_str()).unwrap_or("UnknownError");
            let message = err.get("Message").and_then(|v| v.as_str()).unwrap_or("unknown error");
            let mut remote = CloudBaseError::remote(code, message);
            if let Some(id) = request_id {
                remote = remote.with_request_id(id);
            }
            return Err(remote);
        }

        Ok(response)
    }
}

/// Minimal envelope acknowledgement: just the remote request id.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ResponseInfo {
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}

/// Deserialize a `Response` envelope body into a typed value.
pub(crate) fn parse_response<T: DeserializeOwned>(value: Value, action: &str) -> CloudBaseResult<T> {
    serde_json::from_value(value)
        .map_err(|e| CloudBaseError::response_parse(&format!("unexpected response shape: {e}")).with_action(action))
}

/// Merge request params under service-level base params.
fn merge_params(params: Value, base_params: &Map<String, Value>) -> Value {
    let mut merged = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            // Non-object params cannot be merged; send as-is.
            return other;
        }
    };
    for (key, value) in base_params {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

/// Recursively remove `null` members from a JSON value.
///
/// The remote side hashes the stripped representation, so stripping must
/// happen before signing. Array order and object key order are
/// preserved; stripping an already-stripped value is a no-op.
pub fn strip_void(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(strip_void).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_void(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Render params as a form-urlencoded query string.
fn query_string(params: &Value) -> String {
    let map = match params {
        Value::Object(map) => map,
        _ => return String::new(),
    };
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        serializer.append_pair(key, &rendered);
    }
    serializer.finish()
}
