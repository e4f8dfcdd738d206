//! Object-storage sub-service client.
//!
//! Control-plane operations (listing, deletion, ACLs, upload metadata)
//! go through the signed RPC layer; file payloads are PUT directly to
//! the per-file upload URL returned by the metadata call. Batch
//! operations fan out through the bounded-concurrency runner and report
//! per-item outcomes in submission order.

use crate::client::{parse_response, CloudApiClient, ResponseInfo};
use crate::config::CloudBaseContext;
use crate::environment::EnvConfigCache;
use crate::error::{CloudBaseError, CloudBaseResult};
use crate::parallel::{task, ParallelRunner};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SERVICE: &str = "tcb";
const VERSION: &str = "2018-06-08";

/// Page size of the file listing walk.
const LIST_PAGE_SIZE: u32 = 100;

/// The batch delete endpoint takes at most this many keys per call.
const DELETE_BATCH_SIZE: usize = 500;

const VALID_ACLS: &[&str] = &["READONLY", "PRIVATE", "ADMINWRITE", "ADMINONLY"];

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

// ── Types ───────────────────────────────────────────────────────────────

/// Upload target descriptor for one cloud path.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadMetadata {
    #[serde(rename = "Url")]
    pub url: String,
    #[serde(rename = "Token", default)]
    pub token: Option<String>,
    #[serde(rename = "Authorization", default)]
    pub authorization: Option<String>,
    #[serde(rename = "FileId", default)]
    pub file_id: Option<String>,
    #[serde(rename = "CosFileId", default)]
    pub cos_file_id: Option<String>,
    #[serde(rename = "DownloadUrl", default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFileInfo {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified", default)]
    pub last_modified: Option<String>,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
    #[serde(rename = "Size", default)]
    pub size: Option<String>,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileListPage {
    #[serde(rename = "Files", default)]
    files: Vec<ListFileInfo>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedKey {
    #[serde(rename = "Key")]
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteObjectsResponse {
    #[serde(rename = "Deleted", default)]
    pub deleted: Vec<DeletedKey>,
    #[serde(rename = "Errors", default)]
    pub errors: Vec<Value>,
}

/// One file of a batch upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub cloud_path: String,
    pub body: Bytes,
}

/// Temporary download URL request for one file.
#[derive(Debug, Clone)]
pub struct TempUrlInfo {
    pub cloud_path: String,
    /// Lifetime in seconds.
    pub max_age: u64,
}

impl From<&str> for TempUrlInfo {
    fn from(cloud_path: &str) -> Self {
        Self {
            cloud_path: cloud_path.to_string(),
            max_age: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TempUrl {
    pub file_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
struct StorageConfig {
    env_id: String,
    bucket: String,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Object-storage client for one environment.
#[derive(Clone)]
pub struct StorageService {
    tcb: CloudApiClient,
    env_config: Arc<EnvConfigCache>,
    http: reqwest::Client,
}

impl StorageService {
    pub fn new(context: CloudBaseContext, env_config: Arc<EnvConfigCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            tcb: CloudApiClient::new(context, SERVICE, VERSION),
            env_config,
            http,
        }
    }

    async fn storage_config(&self) -> CloudBaseResult<StorageConfig> {
        let info = self.env_config.ensure_ready().await?;
        let bucket = info
            .storages
            .first()
            .map(|s| s.bucket.clone())
            .ok_or_else(|| CloudBaseError::invalid_argument("environment has no storage bucket"))?;
        Ok(StorageConfig {
            env_id: info.env_id,
            bucket,
        })
    }

    // ── Upload ──────────────────────────────────────────────────────

    /// Fetch the upload descriptor for one cloud path.
    pub async fn get_upload_metadata(&self, cloud_path: &str) -> CloudBaseResult<UploadMetadata> {
        let config = self.storage_config().await?;
        self.get_upload_metadata_custom(cloud_path, &config.bucket).await
    }

    /// Same as [`Self::get_upload_metadata`], against an explicit bucket.
    pub async fn get_upload_metadata_custom(
        &self,
        cloud_path: &str,
        bucket: &str,
    ) -> CloudBaseResult<UploadMetadata> {
        let res = self
            .tcb
            .request(
                "GetUploadMetadata",
                json!({ "EnvId": self.env_config.env_id(), "Bucket": bucket, "Path": cloud_path }),
            )
            .await?;
        parse_response(res, "GetUploadMetadata")
    }

    /// Upload one file: fetch its metadata, then PUT the payload to the
    /// returned URL.
    pub async fn upload_file(&self, cloud_path: &str, body: Bytes) -> CloudBaseResult<UploadMetadata> {
        let config = self.storage_config().await?;
        self.upload_file_custom(cloud_path, &config.bucket, body).await
    }

    /// Same as [`Self::upload_file`], against an explicit bucket.
    pub async fn upload_file_custom(
        &self,
        cloud_path: &str,
        bucket: &str,
        body: Bytes,
    ) -> CloudBaseResult<UploadMetadata> {
        let metadata = self.get_upload_metadata_custom(cloud_path, bucket).await?;

        let mut req = self.http.put(&metadata.url).body(body);
        if let Some(ref authorization) = metadata.authorization {
            req = req.header("Authorization", authorization);
        }
        if let Some(ref token) = metadata.token {
            req = req.header("X-Cos-Security-Token", token);
        }
        if let Some(ref cos_file_id) = metadata.cos_file_id {
            req = req.header("X-Cos-Meta-Fileid", cos_file_id);
        }

        let resp = req.send().await.map_err(CloudBaseError::from)?;
        if !resp.status().is_success() {
            return Err(CloudBaseError::transport(&format!(
                "[{}] upload failed with status {}",
                cloud_path,
                resp.status()
            )));
        }
        Ok(metadata)
    }

    /// Upload many files under a concurrency ceiling. Outcomes come back
    /// in submission order; one file's failure never aborts the rest.
    pub async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        parallel: usize,
    ) -> CloudBaseResult<Vec<CloudBaseResult<UploadMetadata>>> {
        let config = self.storage_config().await?;
        Ok(self
            .upload_files_custom(files, &config.bucket, parallel)
            .await)
    }

    /// Same as [`Self::upload_files`], against an explicit bucket.
    pub async fn upload_files_custom(
        &self,
        files: Vec<UploadFile>,
        bucket: &str,
        parallel: usize,
    ) -> Vec<CloudBaseResult<UploadMetadata>> {
        let mut runner = ParallelRunner::new(parallel);
        for file in files {
            let service = self.clone();
            let bucket = bucket.to_string();
            runner.push(task(move || async move {
                service
                    .upload_file_custom(&file.cloud_path, &bucket, file.body)
                    .await
            }));
        }
        runner.run().await
    }

    /// Create an empty directory object.
    pub async fn create_cloud_directory(&self, cloud_path: &str) -> CloudBaseResult<UploadMetadata> {
        let dir_key = get_cloud_key(cloud_path);
        self.upload_file(&dir_key, Bytes::new()).await
    }

    // ── Listing ─────────────────────────────────────────────────────

    /// List all files under a cloud directory.
    pub async fn list_directory_files(&self, cloud_path: &str) -> CloudBaseResult<Vec<ListFileInfo>> {
        self.walk_cloud_dir(cloud_path, None).await
    }

    /// Walk a cloud prefix, following pagination markers.
    pub async fn walk_cloud_dir(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> CloudBaseResult<Vec<ListFileInfo>> {
        let config = self.storage_config().await?;
        self.walk_cloud_dir_custom(prefix, &config.bucket, marker).await
    }

    /// Same as [`Self::walk_cloud_dir`], against an explicit bucket.
    pub async fn walk_cloud_dir_custom(
        &self,
        prefix: &str,
        bucket: &str,
        marker: Option<&str>,
    ) -> CloudBaseResult<Vec<ListFileInfo>> {
        let prefix_key = get_cloud_key(prefix);
        let mut files = Vec::new();
        let mut marker = marker.unwrap_or("/").to_string();

        loop {
            let res = self
                .tcb
                .request(
                    "DescribeStorageFileList",
                    json!({
                        "EnvId": self.env_config.env_id(),
                        "Bucket": bucket,
                        "Prefix": prefix_key,
                        "MaxKeys": LIST_PAGE_SIZE,
                        "Marker": marker,
                    }),
                )
                .await?;
            let page: FileListPage = parse_response(res, "DescribeStorageFileList")?;
            files.extend(page.files);

            match (page.is_truncated, page.next_marker) {
                (true, Some(next)) => marker = next,
                _ => break,
            }
        }

        Ok(files)
    }

    // ── Deletion ────────────────────────────────────────────────────

    /// Delete files by cloud path. Fails when any key cannot be deleted.
    pub async fn delete_files(&self, cloud_paths: &[String]) -> CloudBaseResult<()> {
        let config = self.storage_config().await?;
        self.delete_files_custom(cloud_paths, &config.bucket).await
    }

    /// Same as [`Self::delete_files`], against an explicit bucket.
    pub async fn delete_files_custom(
        &self,
        cloud_paths: &[String],
        bucket: &str,
    ) -> CloudBaseResult<()> {
        if cloud_paths.is_empty() {
            return Err(CloudBaseError::invalid_argument("file list must not be empty"));
        }
        if cloud_paths.iter().any(|p| p.is_empty()) {
            return Err(CloudBaseError::invalid_argument(
                "file list entries must be non-empty strings",
            ));
        }

        let res = self.delete_batch(bucket, cloud_paths.to_vec()).await?;
        if !res.errors.is_empty() {
            return Err(CloudBaseError::remote(
                "PartialFailure",
                &format!("some files could not be deleted: {:?}", res.errors),
            ));
        }
        Ok(())
    }

    /// Delete a cloud directory: walk it, then issue chunked batch
    /// deletes through the runner and merge the per-chunk outcomes.
    pub async fn delete_directory(
        &self,
        cloud_path: &str,
        parallel: usize,
    ) -> CloudBaseResult<DeleteObjectsResponse> {
        let config = self.storage_config().await?;
        self.delete_directory_custom(cloud_path, &config.bucket, parallel)
            .await
    }

    /// Same as [`Self::delete_directory`], against an explicit bucket.
    pub async fn delete_directory_custom(
        &self,
        cloud_path: &str,
        bucket: &str,
        parallel: usize,
    ) -> CloudBaseResult<DeleteObjectsResponse> {
        let key = get_cloud_key(cloud_path);
        let files = self.walk_cloud_dir_custom(&key, bucket, None).await?;
        if files.is_empty() {
            return Ok(DeleteObjectsResponse::default());
        }

        let mut runner = ParallelRunner::new(parallel);
        let keys: Vec<String> = files.into_iter().map(|f| f.key).collect();
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let service = self.clone();
            let bucket = bucket.to_string();
            let chunk = chunk.to_vec();
            runner.push(task(move || async move {
                service.delete_batch(&bucket, chunk).await
            }));
        }

        let mut merged = DeleteObjectsResponse::default();
        for outcome in runner.run().await {
            let page = outcome?;
            merged.deleted.extend(page.deleted);
            merged.errors.extend(page.errors);
        }
        Ok(merged)
    }

    async fn delete_batch(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> CloudBaseResult<DeleteObjectsResponse> {
        let res = self
            .tcb
            .request(
                "DeleteStorageObjects",
                json!({ "EnvId": self.env_config.env_id(), "Bucket": bucket, "Keys": keys }),
            )
            .await?;
        parse_response(res, "DeleteStorageObjects")
    }

    // ── ACLs ────────────────────────────────────────────────────────

    /// Read the bucket-wide access policy.
    pub async fn get_storage_acl(&self) -> CloudBaseResult<String> {
        let config = self.storage_config().await?;
        let res = self
            .tcb
            .request(
                "DescribeStorageACL",
                json!({ "EnvId": config.env_id, "Bucket": config.bucket }),
            )
            .await?;
        Ok(res
            .get("AclTag")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Set the bucket-wide access policy. Accepted values: READONLY,
    /// PRIVATE, ADMINWRITE, ADMINONLY.
    pub async fn set_storage_acl(&self, acl: &str) -> CloudBaseResult<ResponseInfo> {
        if !VALID_ACLS.contains(&acl) {
            return Err(CloudBaseError::invalid_argument(&format!(
                "invalid acl type: {acl}"
            )));
        }
        let config = self.storage_config().await?;
        let res = self
            .tcb
            .request(
                "ModifyStorageACL",
                json!({ "EnvId": config.env_id, "Bucket": config.bucket, "AclTag": acl }),
            )
            .await?;
        parse_response(res, "ModifyStorageACL")
    }

    // ── Download URLs ───────────────────────────────────────────────

    /// Fetch temporary download URLs for a list of files.
    pub async fn get_temporary_url(
        &self,
        file_list: Vec<TempUrlInfo>,
    ) -> CloudBaseResult<Vec<TempUrl>> {
        if file_list.is_empty() {
            return Err(CloudBaseError::invalid_argument("file list must not be empty"));
        }
        if let Some(bad) = file_list
            .iter()
            .find(|f| f.cloud_path.is_empty() || f.max_age == 0)
        {
            return Err(CloudBaseError::invalid_argument(&format!(
                "invalid temp url request: {:?}",
                bad
            )));
        }

        let config = self.storage_config().await?;
        let entries: Vec<Value> = file_list
            .iter()
            .map(|f| {
                json!({
                    "FileId": cloud_path_to_file_id(&config.env_id, &config.bucket, &f.cloud_path),
                    "MaxAge": f.max_age,
                })
            })
            .collect();

        let res = self
            .tcb
            .request(
                "BatchGetDownloadUrl",
                json!({ "EnvId": config.env_id, "Bucket": config.bucket, "FileList": entries }),
            )
            .await?;
        let list = res
            .get("DownloadList")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(list
            .into_iter()
            .map(|item| TempUrl {
                file_id: item
                    .get("FileId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                url: item
                    .get("DownloadUrl")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }
}

// ── Key helpers ─────────────────────────────────────────────────────────

/// Normalize a directory path into a cloud key: the root maps to the
/// empty prefix, everything else gets a trailing slash.
fn get_cloud_key(cloud_path: &str) -> String {
    if cloud_path.is_empty() || cloud_path == "/" {
        return String::new();
    }
    if cloud_path.ends_with('/') {
        cloud_path.to_string()
    } else {
        format!("{}/", cloud_path)
    }
}

/// Render the file id of a cloud path.
fn cloud_path_to_file_id(env_id: &str, bucket: &str, cloud_path: &str) -> String {
    format!("cloud://{}.{}/{}", env_id, bucket, cloud_path)
}
