//! Role/identity (CAM) sub-service client.

use crate::client::{parse_response, CloudApiClient, ResponseInfo};
use crate::config::CloudBaseContext;
use crate::error::CloudBaseResult;
use serde::{Deserialize, Serialize};
use serde_json::json;

const SERVICE: &str = "cam";
const VERSION: &str = "2019-01-16";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RoleInfo {
    #[serde(rename = "RoleId")]
    pub role_id: String,
    #[serde(rename = "RoleName")]
    pub role_name: String,
    #[serde(rename = "PolicyDocument", default)]
    pub policy_document: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "AddTime", default)]
    pub add_time: Option<String>,
    #[serde(rename = "UpdateTime", default)]
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleListResponse {
    #[serde(rename = "TotalNum", default)]
    pub total_num: u64,
    #[serde(rename = "List", default)]
    pub list: Vec<RoleInfo>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetRoleResponse {
    #[serde(rename = "RoleInfo")]
    pub role_info: RoleInfo,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleResponse {
    #[serde(rename = "RoleId")]
    pub role_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

/// Parameters for [`CamService::create_role`].
#[derive(Debug, Clone, Serialize)]
pub struct CreateRoleParam {
    #[serde(rename = "RoleName")]
    pub role_name: String,
    #[serde(rename = "PolicyDocument")]
    pub policy_document: String,
    #[serde(rename = "Description")]
    pub description: String,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Narrow client for the account's role management.
#[derive(Debug, Clone)]
pub struct CamService {
    client: CloudApiClient,
}

impl CamService {
    pub fn new(context: CloudBaseContext) -> Self {
        Self {
            client: CloudApiClient::new(context, SERVICE, VERSION),
        }
    }

    /// List account roles, paginated.
    pub async fn describe_role_list(&self, page: u32, rp: u32) -> CloudBaseResult<RoleListResponse> {
        let res = self
            .client
            .request("DescribeRoleList", json!({ "Page": page, "Rp": rp }))
            .await?;
        parse_response(res, "DescribeRoleList")
    }

    /// Fetch one role by name.
    pub async fn get_role(&self, role_name: &str) -> CloudBaseResult<GetRoleResponse> {
        let res = self
            .client
            .request("GetRole", json!({ "RoleName": role_name }))
            .await?;
        parse_response(res, "GetRole")
    }

    /// Create a role.
    pub async fn create_role(&self, param: CreateRoleParam) -> CloudBaseResult<CreateRoleResponse> {
        let res = self
            .client
            .request("CreateRole", serde_json::to_value(&param).unwrap_or_default())
            .await?;
        parse_response(res, "CreateRole")
    }

    /// Attach a preset policy to a role.
    pub async fn attach_role_policy(
        &self,
        policy_id: u64,
        attach_role_name: &str,
    ) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .client
            .request(
                "AttachRolePolicy",
                json!({ "PolicyId": policy_id, "AttachRoleName": attach_role_name }),
            )
            .await?;
        parse_response(res, "AttachRolePolicy")
    }

    /// Delete a role by name.
    pub async fn delete_role(&self, role_name: &str) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .client
            .request("DeleteRole", json!({ "RoleName": role_name }))
            .await?;
        parse_response(res, "DeleteRole")
    }
}
