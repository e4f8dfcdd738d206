//! Credential handling, environment-variable fallback and endpoint
//! resolution.
//!
//! Credentials are resolved once per request: explicit values on the
//! [`CloudBaseContext`] win, otherwise the standard `TENCENTCLOUD_*`
//! environment variables are consulted. Inside the managed serverless
//! runtime (marked by `TENCENTCLOUD_RUNENV=SCF`) missing credentials are
//! a deployment problem and get a distinct error message.

use crate::error::{CloudBaseError, CloudBaseResult};
use serde::{Deserialize, Serialize};

// ── Environment variable names ──────────────────────────────────────────

pub const ENV_SECRET_ID: &str = "TENCENTCLOUD_SECRETID";
pub const ENV_SECRET_KEY: &str = "TENCENTCLOUD_SECRETKEY";
pub const ENV_SESSION_TOKEN: &str = "TENCENTCLOUD_SESSIONTOKEN";
/// Runtime marker; equals [`RUN_ENV_SCF`] inside the managed runtime.
pub const ENV_RUN_ENV: &str = "TENCENTCLOUD_RUNENV";
pub const ENV_REGION: &str = "TCB_REGION";

pub const RUN_ENV_SCF: &str = "SCF";
pub const DEFAULT_REGION: &str = "ap-shanghai";

// ── Credentials ─────────────────────────────────────────────────────────

/// A resolved secret-id/secret-key pair with an optional session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
    /// Present for temporary credentials.
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(secret_id: &str, secret_key: &str) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Resolve credentials from the process environment.
    pub fn from_environment() -> Option<Self> {
        let secret_id = std::env::var(ENV_SECRET_ID).ok().filter(|v| !v.is_empty())?;
        let secret_key = std::env::var(ENV_SECRET_KEY).ok().filter(|v| !v.is_empty())?;
        let token = std::env::var(ENV_SESSION_TOKEN).ok().filter(|v| !v.is_empty());
        Some(Self {
            secret_id,
            secret_key,
            token,
        })
    }
}

// ── Manager configuration ───────────────────────────────────────────────

/// Caller-supplied configuration for [`crate::manager::CloudBase`].
///
/// `secret_id` and `secret_key` must be given as a pair; exactly one of
/// the two is rejected at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub token: Option<String>,
    pub env_id: Option<String>,
    /// HTTP(S) proxy URL for all outbound calls.
    pub proxy: Option<String>,
    /// Region sent as `X-TC-Region`; falls back to `TCB_REGION`, then to
    /// [`DEFAULT_REGION`].
    pub region: Option<String>,
    /// Redirects every service endpoint to the given base URL. Intended
    /// for local stacks and tests.
    pub endpoint_override: Option<String>,
}

// ── Context ─────────────────────────────────────────────────────────────

/// Shared, read-only request context: explicit credentials (if any),
/// proxy, region and endpoint override. Cheap to clone; one instance is
/// shared by every sub-service client of a manager.
#[derive(Debug, Clone, Default)]
pub struct CloudBaseContext {
    pub(crate) credentials: Option<Credentials>,
    pub(crate) proxy: Option<String>,
    pub(crate) region: Option<String>,
    pub(crate) endpoint_override: Option<String>,
}

impl CloudBaseContext {
    /// Build a context from a validated manager configuration.
    ///
    /// The credential-pair invariant must already have been checked; a
    /// config carrying only one half of the pair is treated as carrying
    /// none.
    pub fn new(config: &ManagerConfig) -> Self {
        let credentials = match (&config.secret_id, &config.secret_key) {
            (Some(id), Some(key)) => {
                let mut creds = Credentials::new(id, key);
                if let Some(ref token) = config.token {
                    creds.token = Some(token.clone());
                }
                Some(creds)
            }
            _ => None,
        };
        Self {
            credentials,
            proxy: config.proxy.clone(),
            region: config.region.clone(),
            endpoint_override: config.endpoint_override.clone(),
        }
    }

    /// Resolve credentials for one request: explicit values first, then
    /// the process environment.
    pub fn resolve_credentials(&self) -> CloudBaseResult<Credentials> {
        if let Some(ref creds) = self.credentials {
            return Ok(creds.clone());
        }
        match Credentials::from_environment() {
            Some(creds) => Ok(creds),
            None => {
                if std::env::var(ENV_RUN_ENV).as_deref() == Ok(RUN_ENV_SCF) {
                    Err(CloudBaseError::configuration(
                        "missing authorization key, redeploy the function",
                    ))
                } else {
                    Err(CloudBaseError::configuration(
                        "missing secretId or secretKey of tencent cloud",
                    ))
                }
            }
        }
    }

    /// Region sent with every request.
    pub fn region(&self) -> String {
        self.region
            .clone()
            .or_else(|| std::env::var(ENV_REGION).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Base endpoint for a service, honoring the override.
    pub fn endpoint(&self, service: &str) -> String {
        if let Some(ref url) = self.endpoint_override {
            url.clone()
        } else {
            service_endpoint(service)
        }
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

/// Default endpoint for a platform service.
pub fn service_endpoint(service: &str) -> String {
    match service {
        "tcb" => "https://tcb.tencentcloudapi.com".to_string(),
        "scf" => "https://scf.tencentcloudapi.com".to_string(),
        "vpc" => "https://vpc.tencentcloudapi.com".to_string(),
        "flexdb" => "https://flexdb.ap-shanghai.tencentcloudapi.com".to_string(),
        "cam" => "https://cam.tencentcloudapi.com".to_string(),
        "cdn" => "https://cdn.tencentcloudapi.com".to_string(),
        _ => format!("https://{}.tencentcloudapi.com", service),
    }
}
