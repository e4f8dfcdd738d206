//! Static-hosting sub-service client.
//!
//! Hosting state lives in the environment service (`DescribeStaticStore`
//! and friends); file content is managed through the storage service
//! against the hosting bucket. Domain status checks and attribute
//! changes go through the cdn service.

use crate::client::{parse_response, CloudApiClient, ResponseInfo};
use crate::config::CloudBaseContext;
use crate::environment::EnvConfigCache;
use crate::error::{CloudBaseError, CloudBaseResult};
use crate::storage::{
    DeleteObjectsResponse, DeletedKey, ListFileInfo, StorageService, UploadFile, UploadMetadata,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const SERVICE: &str = "tcb";
const VERSION: &str = "2018-06-08";
const CDN_SERVICE: &str = "cdn";
const CDN_VERSION: &str = "2018-06-06";

const STATUS_ONLINE: &str = "online";
const STATUS_OFFLINE: &str = "offline";
const STATUS_DESTROY_FAIL: &str = "destroy_fail";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HostingInfo {
    #[serde(rename = "EnvId", default)]
    pub env_id: Option<String>,
    #[serde(rename = "CdnDomain", default)]
    pub cdn_domain: Option<String>,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Region", default)]
    pub region: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "MaxDomain", default)]
    pub max_domain: Option<u32>,
    #[serde(rename = "Id", default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct StaticStoreResponse {
    #[serde(rename = "Data", default)]
    data: Vec<HostingInfo>,
}

/// Result of enabling/destroying the hosting service: 0 on success.
#[derive(Debug, Clone)]
pub struct HostingServiceResult {
    pub code: i32,
    pub request_id: String,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Static-hosting client for one environment.
pub struct HostingService {
    tcb: CloudApiClient,
    cdn: CloudApiClient,
    storage: StorageService,
    env_config: Arc<EnvConfigCache>,
}

impl HostingService {
    pub fn new(
        context: CloudBaseContext,
        env_config: Arc<EnvConfigCache>,
        storage: StorageService,
    ) -> Self {
        Self {
            tcb: CloudApiClient::new(context.clone(), SERVICE, VERSION),
            cdn: CloudApiClient::new(context, CDN_SERVICE, CDN_VERSION),
            storage,
            env_config,
        }
    }

    /// Describe the environment's hosting stores.
    pub async fn get_info(&self) -> CloudBaseResult<Vec<HostingInfo>> {
        let res = self
            .tcb
            .request(
                "DescribeStaticStore",
                json!({ "EnvId": self.env_config.env_id() }),
            )
            .await?;
        let store: StaticStoreResponse = parse_response(res, "DescribeStaticStore")?;
        Ok(store.data)
    }

    /// Enable the hosting service. Only an `offline` store may be
    /// re-enabled; anything else already provisioned is an error.
    pub async fn enable_service(&self) -> CloudBaseResult<HostingServiceResult> {
        let hostings = self.get_info().await?;
        if let Some(website) = hostings.first() {
            if website.status.as_deref() != Some(STATUS_OFFLINE) {
                return Err(CloudBaseError::remote(
                    "INVALID_OPERATION",
                    "static hosting is already enabled",
                ));
            }
        }

        let res = self
            .tcb
            .request(
                "CreateStaticStore",
                json!({ "EnvId": self.env_config.env_id() }),
            )
            .await?;
        Ok(service_result(&res))
    }

    /// Destroy the hosting service. Refused while files remain or while
    /// the store is in a state that cannot be destroyed.
    pub async fn destroy_service(&self) -> CloudBaseResult<HostingServiceResult> {
        let files = self.list_files().await?;
        if !files.is_empty() {
            return Err(CloudBaseError::remote(
                "INVALID_OPERATION",
                "hosting files are not empty, the service cannot be destroyed",
            ));
        }

        let hostings = self.get_info().await?;
        let website = hostings.first().ok_or_else(|| {
            CloudBaseError::remote("INVALID_OPERATION", "static hosting is not enabled")
        })?;

        let status = website.status.as_deref().unwrap_or_default();
        if status != STATUS_ONLINE && status != STATUS_DESTROY_FAIL {
            return Err(CloudBaseError::remote(
                "INVALID_OPERATION",
                &format!("static hosting is [{status}], the service cannot be destroyed"),
            ));
        }

        let res = self
            .tcb
            .request(
                "DestroyStaticStore",
                json!({ "EnvId": self.env_config.env_id() }),
            )
            .await?;
        Ok(service_result(&res))
    }

    /// List every hosted file.
    pub async fn list_files(&self) -> CloudBaseResult<Vec<ListFileInfo>> {
        let hosting = self.check_status().await?;
        self.storage
            .walk_cloud_dir_custom("", &hosting.bucket, None)
            .await
    }

    /// Upload files into the hosting bucket under a concurrency ceiling.
    pub async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        parallel: usize,
    ) -> CloudBaseResult<Vec<CloudBaseResult<UploadMetadata>>> {
        let hosting = self.check_status().await?;
        Ok(self
            .storage
            .upload_files_custom(files, &hosting.bucket, parallel)
            .await)
    }

    /// Delete a hosted file or directory. File deletion failures are
    /// reported in the result, not raised.
    pub async fn delete_files(
        &self,
        cloud_path: &str,
        is_dir: bool,
    ) -> CloudBaseResult<DeleteObjectsResponse> {
        let hosting = self.check_status().await?;
        if is_dir {
            self.storage
                .delete_directory_custom(cloud_path, &hosting.bucket, 0)
                .await
        } else {
            match self
                .storage
                .delete_files_custom(&[cloud_path.to_string()], &hosting.bucket)
                .await
            {
                Ok(()) => Ok(DeleteObjectsResponse {
                    deleted: vec![DeletedKey {
                        key: cloud_path.to_string(),
                    }],
                    errors: vec![],
                }),
                Err(e) => Ok(DeleteObjectsResponse {
                    deleted: vec![],
                    errors: vec![json!(e.to_string())],
                }),
            }
        }
    }

    /// Bind a custom domain to the hosting store.
    pub async fn create_hosting_domain(
        &self,
        domain: &str,
        cert_id: &str,
    ) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .tcb
            .request(
                "CreateHostingDomain",
                json!({
                    "EnvId": self.env_config.env_id(),
                    "Domain": domain,
                    "CertId": cert_id,
                }),
            )
            .await?;
        parse_response(res, "CreateHostingDomain")
    }

    /// Unbind a custom domain.
    pub async fn delete_hosting_domain(&self, domain: &str) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .tcb
            .request(
                "DeleteHostingDomain",
                json!({ "EnvId": self.env_config.env_id(), "Domain": domain }),
            )
            .await?;
        parse_response(res, "DeleteHostingDomain")
    }

    /// Query domain status through the cdn service.
    pub async fn check_resource(&self, domains: &[String]) -> CloudBaseResult<Value> {
        self.cdn
            .request("TcbCheckResource", json!({ "Domains": domains }))
            .await
    }

    /// Change a domain's configuration through the cdn service.
    pub async fn modify_attribute(
        &self,
        domain: &str,
        domain_id: u64,
        domain_config: Value,
    ) -> CloudBaseResult<Value> {
        self.cdn
            .request(
                "TcbModifyAttribute",
                json!({
                    "Domain": domain,
                    "DomainId": domain_id,
                    "DomainConfig": domain_config,
                }),
            )
            .await
    }

    /// The hosting store, required to be enabled.
    async fn check_status(&self) -> CloudBaseResult<HostingInfo> {
        let hostings = self.get_info().await?;
        hostings.into_iter().next().ok_or_else(|| {
            CloudBaseError::remote(
                "INVALID_OPERATION",
                "static hosting is not enabled for this environment",
            )
        })
    }
}

fn service_result(res: &Value) -> HostingServiceResult {
    let code = if res.get("Result").and_then(|v| v.as_str()) == Some("succ") {
        0
    } else {
        -1
    };
    HostingServiceResult {
        code,
        request_id: res
            .get("RequestId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}
