//! Raw action passthrough for callers that need an endpoint this crate
//! does not wrap.

use crate::client::CloudApiClient;
use crate::config::CloudBaseContext;
use crate::error::{CloudBaseError, CloudBaseResult};
use serde_json::Value;

/// Generic client for one of the platform services. Params are passed
/// through untouched; no business logic.
#[derive(Debug, Clone)]
pub struct CommonService {
    client: CloudApiClient,
}

impl CommonService {
    /// Create a passthrough client for `tcb`, `flexdb` or `scf`, with an
    /// optional version override.
    pub fn new(
        context: CloudBaseContext,
        service_type: &str,
        version: Option<&str>,
    ) -> CloudBaseResult<Self> {
        let default_version = match service_type {
            "tcb" => "2018-06-08",
            "flexdb" => "2018-11-27",
            "scf" => "2018-04-16",
            other => {
                return Err(CloudBaseError::invalid_argument(&format!(
                    "unsupported service type: {other}"
                )))
            }
        };
        Ok(Self {
            client: CloudApiClient::new(
                context,
                service_type,
                version.unwrap_or(default_version),
            ),
        })
    }

    /// Call an arbitrary action.
    pub async fn call(&self, action: &str, params: Value) -> CloudBaseResult<Value> {
        if action.is_empty() {
            return Err(CloudBaseError::invalid_argument("Action is required"));
        }
        self.client.request(action, params).await
    }
}
