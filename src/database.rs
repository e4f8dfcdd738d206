//! Database-collection sub-service client.
//!
//! Collection operations go through the `flexdb` service and carry the
//! environment's database instance tag; distribution queries go through
//! the environment service.

use crate::client::{parse_response, CloudApiClient, ResponseInfo};
use crate::config::CloudBaseContext;
use crate::environment::EnvConfigCache;
use crate::error::{CloudBaseError, CloudBaseResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const TCB_SERVICE: &str = "tcb";
const TCB_VERSION: &str = "2018-06-08";
const FLEXDB_SERVICE: &str = "flexdb";
const FLEXDB_VERSION: &str = "2018-11-27";

const DEFAULT_LIST_LIMIT: u32 = 100;
const DEFAULT_LIST_OFFSET: u32 = 0;

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExistsResult {
    pub exists: bool,
    pub request_id: Option<String>,
    /// Error message of the probe, when the collection was not found.
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size", default)]
    pub size: Option<u64>,
    #[serde(rename = "Keys", default)]
    pub keys: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableInfo {
    #[serde(rename = "Indexes", default)]
    pub indexes: Vec<IndexInfo>,
    #[serde(rename = "IndexNum", default)]
    pub index_num: u64,
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInfo {
    #[serde(rename = "CollectionName")]
    pub collection_name: String,
    #[serde(rename = "Count", default)]
    pub count: Option<u64>,
    #[serde(rename = "Size", default)]
    pub size: Option<u64>,
    #[serde(rename = "IndexCount", default)]
    pub index_count: Option<u64>,
    #[serde(rename = "IndexSize", default)]
    pub index_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ListCollectionsResponse {
    pub collections: Vec<CollectionInfo>,
    pub pager: Option<Value>,
    pub request_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateIfNotExistsResult {
    pub is_created: bool,
    pub request_id: Option<String>,
    pub exists_result: ExistsResult,
}

/// Pagination options for [`DatabaseService::list_collections`].
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Collection management client for one environment.
pub struct DatabaseService {
    db_op: CloudApiClient,
    coll_op: CloudApiClient,
    env_config: Arc<EnvConfigCache>,
}

impl DatabaseService {
    pub fn new(context: CloudBaseContext, env_config: Arc<EnvConfigCache>) -> Self {
        Self {
            db_op: CloudApiClient::new(context.clone(), TCB_SERVICE, TCB_VERSION),
            coll_op: CloudApiClient::new(context, FLEXDB_SERVICE, FLEXDB_VERSION),
            env_config,
        }
    }

    /// Database instance tag of the environment.
    async fn tag(&self) -> CloudBaseResult<String> {
        let info = self.env_config.ensure_ready().await?;
        info.databases
            .first()
            .map(|db| db.instance_id.clone())
            .ok_or_else(|| {
                CloudBaseError::invalid_argument("environment has no database instance")
            })
    }

    /// Probe a collection's existence. Any probe error counts as "does
    /// not exist" and is reported in the result, not raised.
    pub async fn check_collection_exists(&self, collection_name: &str) -> CloudBaseResult<ExistsResult> {
        match self.describe_collection(collection_name).await {
            Ok(info) => Ok(ExistsResult {
                exists: true,
                request_id: Some(info.request_id),
                msg: None,
            }),
            Err(e) => Ok(ExistsResult {
                exists: false,
                request_id: e.request_id.clone(),
                msg: Some(e.message),
            }),
        }
    }

    /// Create a collection.
    pub async fn create_collection(&self, collection_name: &str) -> CloudBaseResult<ResponseInfo> {
        let tag = self.tag().await?;
        let res = self
            .coll_op
            .request(
                "CreateTable",
                json!({ "Tag": tag, "TableName": collection_name }),
            )
            .await?;
        parse_response(res, "CreateTable")
    }

    /// Create a collection unless it already exists.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
    ) -> CloudBaseResult<CreateIfNotExistsResult> {
        let exists_result = self.check_collection_exists(collection_name).await?;
        if exists_result.exists {
            return Ok(CreateIfNotExistsResult {
                is_created: false,
                request_id: None,
                exists_result,
            });
        }
        let res = self.create_collection(collection_name).await?;
        Ok(CreateIfNotExistsResult {
            is_created: true,
            request_id: Some(res.request_id),
            exists_result,
        })
    }

    /// Delete a collection; a missing collection is not an error.
    pub async fn delete_collection(&self, collection_name: &str) -> CloudBaseResult<ExistsResult> {
        let exists_result = self.check_collection_exists(collection_name).await?;
        if !exists_result.exists {
            return Ok(exists_result);
        }
        let tag = self.tag().await?;
        let res = self
            .coll_op
            .request(
                "DeleteTable",
                json!({ "Tag": tag, "TableName": collection_name }),
            )
            .await?;
        let info: ResponseInfo = parse_response(res, "DeleteTable")?;
        Ok(ExistsResult {
            exists: true,
            request_id: Some(info.request_id),
            msg: None,
        })
    }

    /// Replace a collection's index definitions.
    pub async fn update_collection(
        &self,
        collection_name: &str,
        indexes: Value,
    ) -> CloudBaseResult<ResponseInfo> {
        let tag = self.tag().await?;
        let mut params = Map::new();
        params.insert("Tag".to_string(), json!(tag));
        params.insert("TableName".to_string(), json!(collection_name));
        if let Value::Object(extra) = indexes {
            for (key, value) in extra {
                params.insert(key, value);
            }
        }
        let res = self.coll_op.request("UpdateTable", Value::Object(params)).await?;
        parse_response(res, "UpdateTable")
    }

    /// Fetch a collection's descriptor.
    pub async fn describe_collection(&self, collection_name: &str) -> CloudBaseResult<TableInfo> {
        let tag = self.tag().await?;
        let res = self
            .coll_op
            .request(
                "DescribeTable",
                json!({ "Tag": tag, "TableName": collection_name }),
            )
            .await?;
        parse_response(res, "DescribeTable")
    }

    /// List collections. The wire speaks in tables; the response is
    /// normalized to collection names.
    pub async fn list_collections(
        &self,
        query: CollectionQuery,
    ) -> CloudBaseResult<ListCollectionsResponse> {
        let tag = self.tag().await?;
        let res = self
            .coll_op
            .request(
                "ListTables",
                json!({
                    "Tag": tag,
                    "MgoLimit": query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
                    "MgoOffset": query.offset.unwrap_or(DEFAULT_LIST_OFFSET),
                }),
            )
            .await?;

        let request_id = res
            .get("RequestId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let pager = res.get("Pager").cloned();
        let collections = match res.get("Tables") {
            None | Some(Value::Null) => Vec::new(),
            Some(tables) => tables
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|mut item| {
                    // TableName → CollectionName
                    if let Some(obj) = item.as_object_mut() {
                        if let Some(name) = obj.remove("TableName") {
                            obj.insert("CollectionName".to_string(), name);
                        }
                    }
                    parse_response(item, "ListTables")
                })
                .collect::<CloudBaseResult<Vec<CollectionInfo>>>()?,
        };

        Ok(ListCollectionsResponse {
            collections,
            pager,
            request_id,
        })
    }

    /// Whether a collection carries an index with the given name.
    pub async fn check_index_exists(
        &self,
        collection_name: &str,
        index_name: &str,
    ) -> CloudBaseResult<ExistsResult> {
        let info = self.describe_collection(collection_name).await?;
        let exists = info.indexes.iter().any(|index| index.name == index_name);
        Ok(ExistsResult {
            exists,
            request_id: Some(info.request_id),
            msg: None,
        })
    }

    /// Data distribution across the environment's collections.
    pub async fn distribution(&self) -> CloudBaseResult<Value> {
        self.db_op
            .request(
                "DescribeDbDistribution",
                json!({ "EnvId": self.env_config.env_id() }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloudBaseContext, ManagerConfig};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> DatabaseService {
        let context = CloudBaseContext::new(&ManagerConfig {
            secret_id: Some("id".into()),
            secret_key: Some("key".into()),
            endpoint_override: Some(server.uri()),
            ..Default::default()
        });
        let cache = Arc::new(EnvConfigCache::new(context.clone(), "demo-env"));
        DatabaseService::new(context, cache)
    }

    async fn mount_env_config(server: &MockServer) {
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeEnvs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "EnvList": [{
                        "EnvId": "demo-env",
                        "Functions": [{"Namespace": "demo-env"}],
                        "Databases": [{"InstanceId": "ins-42"}],
                        "Storages": [{"Region": "ap-shanghai", "Bucket": "bkt"}]
                    }],
                    "RequestId": "req-env"
                }
            })))
            .mount(server)
            .await;
    }

    fn ok(body: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "Response": body }))
    }

    #[tokio::test]
    async fn create_collection_carries_instance_tag() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "CreateTable"))
            .and(body_partial_json(json!({"Tag": "ins-42", "TableName": "users"})))
            .respond_with(ok(json!({"RequestId": "req-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let res = service(&server).create_collection("users").await.unwrap();
        assert_eq!(res.request_id, "req-1");
    }

    #[tokio::test]
    async fn check_collection_exists_swallows_probe_errors() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeTable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "Error": {"Code": "ResourceNotFound", "Message": "table missing"},
                    "RequestId": "req-1"
                }
            })))
            .mount(&server)
            .await;

        let res = service(&server).check_collection_exists("ghost").await.unwrap();
        assert!(!res.exists);
        assert!(res.msg.unwrap().contains("table missing"));
    }

    #[tokio::test]
    async fn delete_missing_collection_is_a_noop() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeTable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "Error": {"Code": "ResourceNotFound", "Message": "table missing"},
                    "RequestId": "req-1"
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DeleteTable"))
            .respond_with(ok(json!({"RequestId": "never"})))
            .expect(0)
            .mount(&server)
            .await;

        let res = service(&server).delete_collection("ghost").await.unwrap();
        assert!(!res.exists);
    }

    #[tokio::test]
    async fn list_collections_normalizes_table_names() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "ListTables"))
            .and(body_partial_json(json!({"MgoLimit": 100, "MgoOffset": 0})))
            .respond_with(ok(json!({
                "Tables": [
                    {"TableName": "users", "Count": 3},
                    {"TableName": "orders", "Count": 7}
                ],
                "Pager": {"Total": 2},
                "RequestId": "req-1"
            })))
            .mount(&server)
            .await;

        let res = service(&server)
            .list_collections(CollectionQuery::default())
            .await
            .unwrap();
        let names: Vec<&str> = res
            .collections
            .iter()
            .map(|c| c.collection_name.as_str())
            .collect();
        assert_eq!(names, ["users", "orders"]);
        assert_eq!(res.collections[1].count, Some(7));
    }

    #[tokio::test]
    async fn list_collections_handles_null_tables() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "ListTables"))
            .respond_with(ok(json!({"Tables": null, "RequestId": "req-1"})))
            .mount(&server)
            .await;

        let res = service(&server)
            .list_collections(CollectionQuery::default())
            .await
            .unwrap();
        assert!(res.collections.is_empty());
    }

    #[tokio::test]
    async fn check_index_exists_scans_names() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeTable"))
            .respond_with(ok(json!({
                "Indexes": [{"Name": "_id_"}, {"Name": "by_age"}],
                "IndexNum": 2,
                "RequestId": "req-1"
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        assert!(svc.check_index_exists("users", "by_age").await.unwrap().exists);
        assert!(!svc.check_index_exists("users", "missing").await.unwrap().exists);
    }
}
