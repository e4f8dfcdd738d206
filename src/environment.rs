//! Per-environment bundle of sub-service clients.
//!
//! Most operations need pieces of the remote environment descriptor
//! (function namespace, storage bucket, database instance). That
//! descriptor is fetched once through [`EnvConfigCache::ensure_ready`]
//! and cached for the lifetime of the bundle; every dependent operation
//! calls the accessor before doing real work.

use crate::client::CloudApiClient;
use crate::common::CommonService;
use crate::config::{CloudBaseContext, Credentials};
use crate::database::DatabaseService;
use crate::env::{EnvInfo, EnvService, ListEnvsResponse};
use crate::error::{CloudBaseError, CloudBaseResult};
use crate::function::FunctionService;
use crate::hosting::HostingService;
use crate::storage::StorageService;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

const SERVICE: &str = "tcb";
const VERSION: &str = "2018-06-08";

/// Guarded accessor for the remote environment descriptor.
///
/// Fetched at most once; concurrent callers share the first fetch's
/// result. An unknown environment id is an error, not an empty config.
pub struct EnvConfigCache {
    tcb: CloudApiClient,
    env_id: String,
    state: Mutex<Option<EnvInfo>>,
}

impl EnvConfigCache {
    pub fn new(context: CloudBaseContext, env_id: &str) -> Self {
        Self {
            tcb: CloudApiClient::new(context, SERVICE, VERSION),
            env_id: env_id.to_string(),
            state: Mutex::new(None),
        }
    }

    /// Return the environment descriptor, fetching it on first use.
    pub async fn ensure_ready(&self) -> CloudBaseResult<EnvInfo> {
        let mut state = self.state.lock().await;
        if let Some(ref info) = *state {
            return Ok(info.clone());
        }

        let res = self
            .tcb
            .request("DescribeEnvs", json!({ "EnvId": self.env_id }))
            .await?;
        let listed: ListEnvsResponse = crate::client::parse_response(res, "DescribeEnvs")?;
        let info = listed
            .env_list
            .into_iter()
            .next()
            .filter(|info| !info.env_id.is_empty())
            .ok_or_else(|| {
                CloudBaseError::remote(
                    "EnvIdNotExists",
                    &format!("environment {} not found", self.env_id),
                )
            })?;

        *state = Some(info.clone());
        Ok(info)
    }

    pub fn env_id(&self) -> &str {
        &self.env_id
    }
}

/// Auth material handed to collaborators that talk to the environment's
/// data plane directly.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub env_id: String,
    pub credentials: Credentials,
    pub proxy: Option<String>,
}

/// One environment and its sub-service clients.
pub struct Environment {
    env_id: String,
    context: CloudBaseContext,
    env_config: Arc<EnvConfigCache>,
    functions: FunctionService,
    database: DatabaseService,
    storage: StorageService,
    hosting: HostingService,
    env: EnvService,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("env_id", &self.env_id)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(context: CloudBaseContext, env_id: &str) -> Self {
        let env_config = Arc::new(EnvConfigCache::new(context.clone(), env_id));
        let storage = StorageService::new(context.clone(), Arc::clone(&env_config));
        Self {
            env_id: env_id.to_string(),
            functions: FunctionService::new(context.clone(), Arc::clone(&env_config)),
            database: DatabaseService::new(context.clone(), Arc::clone(&env_config)),
            hosting: HostingService::new(
                context.clone(),
                Arc::clone(&env_config),
                storage.clone(),
            ),
            storage,
            env: EnvService::new(context.clone(), env_id),
            env_config,
            context,
        }
    }

    pub fn get_env_id(&self) -> &str {
        &self.env_id
    }

    pub fn get_function_service(&self) -> &FunctionService {
        &self.functions
    }

    pub fn get_storage_service(&self) -> &StorageService {
        &self.storage
    }

    pub fn get_database_service(&self) -> &DatabaseService {
        &self.database
    }

    pub fn get_hosting_service(&self) -> &HostingService {
        &self.hosting
    }

    pub fn get_env_service(&self) -> &EnvService {
        &self.env
    }

    pub fn get_common_service(
        &self,
        service_type: &str,
        version: Option<&str>,
    ) -> CloudBaseResult<CommonService> {
        CommonService::new(self.context.clone(), service_type, version)
    }

    /// The cached environment descriptor (fetched on first use).
    pub async fn get_env_config(&self) -> CloudBaseResult<EnvInfo> {
        self.env_config.ensure_ready().await
    }

    /// Resolved credentials plus env id for data-plane collaborators.
    pub fn get_auth_config(&self) -> CloudBaseResult<AuthConfig> {
        Ok(AuthConfig {
            env_id: self.env_id.clone(),
            credentials: self.context.resolve_credentials()?,
            proxy: self.context.proxy().map(|p| p.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context(server: &MockServer) -> CloudBaseContext {
        CloudBaseContext::new(&ManagerConfig {
            secret_id: Some("id".into()),
            secret_key: Some("key".into()),
            endpoint_override: Some(server.uri()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn config_is_fetched_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeEnvs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "EnvList": [{
                        "EnvId": "demo-1",
                        "Functions": [{"Namespace": "demo-1"}],
                        "Databases": [{"InstanceId": "ins-1"}],
                        "Storages": [{"Region": "ap-shanghai", "Bucket": "demo-bucket"}]
                    }],
                    "RequestId": "req-1"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = EnvConfigCache::new(context(&server), "demo-1");
        let first = cache.ensure_ready().await.unwrap();
        let second = cache.ensure_ready().await.unwrap();
        assert_eq!(first.env_id, "demo-1");
        assert_eq!(second.storages[0].bucket, "demo-bucket");
    }

    #[tokio::test]
    async fn unknown_environment_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {"EnvList": [], "RequestId": "req-1"}
            })))
            .mount(&server)
            .await;

        let cache = EnvConfigCache::new(context(&server), "ghost");
        let err = cache.ensure_ready().await.unwrap_err();
        assert!(err.is_code("EnvIdNotExists"));
        assert!(err.message.contains("ghost"));
    }

    #[tokio::test]
    async fn environment_exposes_sub_services() {
        let server = MockServer::start().await;
        let env = Environment::new(context(&server), "demo-1");
        assert_eq!(env.get_env_id(), "demo-1");
        let auth = env.get_auth_config().unwrap();
        assert_eq!(auth.env_id, "demo-1");
        assert_eq!(auth.credentials.secret_id, "id");
        assert!(env.get_common_service("tcb", None).is_ok());
        assert!(env.get_common_service("nope", None).is_err());
    }
}
