//! Environment sub-service client and the environment provisioning
//! workflow.
//!
//! `create_env` coordinates three independent services (role management
//! in CAM, billing, and the environment service itself) with idempotency
//! checks up front and a compensating `DestroyEnv` when the purchase
//! step fails after an environment id was already allocated.

use crate::billing::{BillingService, GoodItem};
use crate::cam::{CamService, CreateRoleParam};
use crate::client::{parse_response, CloudApiClient, ResponseInfo};
use crate::config::CloudBaseContext;
use crate::error::{CloudBaseError, CloudBaseResult};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

const SERVICE: &str = "tcb";
const VERSION: &str = "2018-06-08";

/// Service role bound to the account when the platform is first enabled.
pub const TCB_ROLE_NAME: &str = "TCB_QcsRole";

/// The one remote code treated as "role does not exist" during the
/// existence probe; every other error aborts the saga.
const ROLE_NOT_EXIST: &str = "InvalidParameter.RoleNotExist";

/// Preset policy attached to the service role.
const TCB_POLICY_ID: u64 = 8_825_032;

const TCB_ROLE_POLICY_DOCUMENT: &str = r#"{"version":"2.0","statement":[{"action":"sts:AssumeRole","effect":"allow","principal":{"service":["scf.qcloud.com","tcb.cloud.tencent.com"]}}]}"#;

const TCB_ROLE_DESCRIPTION: &str = "CloudBase (TCB) service role: manages roles and policy \
bindings in CAM, reads and writes object storage (COS) and serverless function (SCF) \
resources, and reads monitoring data.";

/// Basic prepaid package goods category.
const PREPAY_GOODS_CATEGORY_ID: u64 = 101_183;

// ── Types ───────────────────────────────────────────────────────────────

/// How a freshly created environment is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentMode {
    Prepay,
    #[default]
    Postpay,
}

/// Parameters for [`EnvService::create_env`].
#[derive(Debug, Clone)]
pub struct CreateEnvParam {
    /// Display name; also the prefix of the generated environment id.
    pub name: String,
    pub payment_mode: Option<PaymentMode>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseInstance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "Region", default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageBucket {
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "AppId", default)]
    pub app_id: Option<String>,
    #[serde(rename = "CdnDomain", default)]
    pub cdn_domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionNamespace {
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "Region", default)]
    pub region: Option<String>,
}

/// Environment descriptor as returned by `DescribeEnvs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvInfo {
    #[serde(rename = "EnvId", default)]
    pub env_id: String,
    #[serde(rename = "Alias", default)]
    pub alias: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "CreateTime", default)]
    pub create_time: Option<String>,
    #[serde(rename = "UpdateTime", default)]
    pub update_time: Option<String>,
    #[serde(rename = "PackageId", default)]
    pub package_id: Option<String>,
    #[serde(rename = "PackageName", default)]
    pub package_name: Option<String>,
    #[serde(rename = "Source", default)]
    pub source: Option<String>,
    #[serde(rename = "Databases", default)]
    pub databases: Vec<DatabaseInstance>,
    #[serde(rename = "Storages", default)]
    pub storages: Vec<StorageBucket>,
    #[serde(rename = "Functions", default)]
    pub functions: Vec<FunctionNamespace>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvsResponse {
    #[serde(rename = "EnvList", default)]
    pub env_list: Vec<EnvInfo>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckTcbServiceResponse {
    #[serde(rename = "Initialized", default)]
    pub initialized: bool,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostpayResponse {
    #[serde(rename = "TranId", default)]
    pub tran_id: Option<String>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthDomain {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "Type", default)]
    pub domain_type: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthDomainsResponse {
    #[serde(rename = "Domains", default)]
    pub domains: Vec<AuthDomain>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteDomainResponse {
    #[serde(rename = "Deleted", default)]
    pub deleted: u64,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Environment management client.
#[derive(Debug, Clone)]
pub struct EnvService {
    tcb: CloudApiClient,
    cam: CamService,
    billing: BillingService,
    env_id: String,
}

impl EnvService {
    pub fn new(context: CloudBaseContext, env_id: &str) -> Self {
        Self {
            tcb: CloudApiClient::new(context.clone(), SERVICE, VERSION),
            cam: CamService::new(context.clone()),
            billing: BillingService::new(context),
            env_id: env_id.to_string(),
        }
    }

    /// Create a new environment.
    ///
    /// Workflow: check platform initialization; if uninitialized, make
    /// sure the service role exists (creating and binding it when
    /// missing) and initialize the platform; allocate the environment;
    /// purchase a prepaid or postpaid package. When the purchase fails
    /// after the environment was allocated, a best-effort `DestroyEnv`
    /// runs before the purchase error is re-raised.
    ///
    /// Returns the allocated environment id.
    pub async fn create_env(&self, param: CreateEnvParam) -> CloudBaseResult<String> {
        let CreateEnvParam {
            name,
            payment_mode,
            channel,
        } = param;
        let channel = channel.unwrap_or_else(|| "qc_console".to_string());

        let check = self.check_tcb_service().await?;
        if !check.initialized {
            let mut has_role = false;
            match self.cam.get_role(TCB_ROLE_NAME).await {
                Ok(_) => has_role = true,
                // Only "role does not exist" means the role is missing.
                Err(e) if e.is_code(ROLE_NOT_EXIST) => {}
                Err(e) => return Err(e),
            }

            if !has_role {
                self.cam
                    .create_role(CreateRoleParam {
                        role_name: TCB_ROLE_NAME.to_string(),
                        policy_document: TCB_ROLE_POLICY_DOCUMENT.to_string(),
                        description: TCB_ROLE_DESCRIPTION.to_string(),
                    })
                    .await?;
                self.cam
                    .attach_role_policy(TCB_POLICY_ID, TCB_ROLE_NAME)
                    .await?;
            }

            self.init_tcb(&channel, "qcloud").await?;
        }

        // The suffix is best-effort unique, not guaranteed.
        let requested_env_id = format!("{}-{}", name, guid6());
        let res = self
            .tcb
            .request(
                "CreateEnv",
                json!({
                    "Alias": name,
                    "EnvId": requested_env_id,
                    "Source": "qcloud",
                    "Channel": channel,
                }),
            )
            .await?;
        let env_id = res
            .get("EnvId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CloudBaseError::response_parse("CreateEnv returned no EnvId").with_action("CreateEnv")
            })?
            .to_string();

        match payment_mode.unwrap_or_default() {
            PaymentMode::Prepay => self.purchase_prepay(&env_id).await?,
            PaymentMode::Postpay => {
                if let Err(e) = self.create_postpay_package(&env_id, None).await {
                    self.destroy_best_effort(&env_id).await;
                    return Err(e);
                }
            }
        }

        Ok(env_id)
    }

    /// Prepay purchase: generate the order, then pay it. Order
    /// generation failure destroys the environment; payment failure
    /// after a generated order does not (the order can still be paid
    /// manually).
    async fn purchase_prepay(&self, env_id: &str) -> CloudBaseResult<()> {
        let goods = prepay_goods(env_id);

        let order_ids = match self.billing.generate_deals(&goods).await {
            Ok(res) => res.order_ids,
            Err(e) => {
                self.destroy_best_effort(env_id).await;
                return Err(e);
            }
        };

        let pay_result = match self.billing.pay_deals(&order_ids).await {
            // Payment counts as successful only when the first paid
            // order id matches the first generated one.
            Ok(res) if res.order_ids.first() == order_ids.first() => Ok(()),
            Ok(_) => Err(CloudBaseError::remote(
                "PaidOrderMismatch",
                "paid order ids do not match the generated order",
            )),
            Err(e) => Err(e),
        };

        pay_result.map_err(|e| {
            CloudBaseError::remote(
                "PrepayPaymentFailed",
                "prepay order payment failed, pay the order in the billing console",
            )
            .with_original(e)
        })
    }

    /// Best-effort compensating destroy; its own failure must never mask
    /// the triggering error.
    async fn destroy_best_effort(&self, env_id: &str) {
        if let Err(e) = self.destroy_env(env_id).await {
            log::warn!("compensating DestroyEnv for {} failed: {}", env_id, e);
        }
    }

    /// List every environment of the account.
    pub async fn list_envs(&self) -> CloudBaseResult<ListEnvsResponse> {
        let res = self.tcb.request("DescribeEnvs", json!({})).await?;
        parse_response(res, "DescribeEnvs")
    }

    /// Fetch this environment's descriptor, or `None` when it does not
    /// exist.
    pub async fn get_env_info(&self) -> CloudBaseResult<Option<EnvInfo>> {
        let res = self
            .tcb
            .request("DescribeEnvs", json!({ "EnvId": self.env_id }))
            .await?;
        let listed: ListEnvsResponse = parse_response(res, "DescribeEnvs")?;
        Ok(listed.env_list.into_iter().next())
    }

    /// Rename this environment.
    pub async fn update_env_info(&self, alias: &str) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .tcb
            .request("ModifyEnv", json!({ "EnvId": self.env_id, "Alias": alias }))
            .await?;
        parse_response(res, "ModifyEnv")
    }

    /// Check whether the platform service has been initialized for this
    /// account.
    pub async fn check_tcb_service(&self) -> CloudBaseResult<CheckTcbServiceResponse> {
        let res = self.tcb.request("CheckTcbService", json!({})).await?;
        parse_response(res, "CheckTcbService")
    }

    /// Initialize the platform service.
    pub async fn init_tcb(&self, channel: &str, source: &str) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .tcb
            .request("InitTcb", json!({ "Channel": channel, "Source": source }))
            .await?;
        parse_response(res, "InitTcb")
    }

    /// Purchase the postpaid package for an environment.
    pub async fn create_postpay_package(
        &self,
        env_id: &str,
        source: Option<&str>,
    ) -> CloudBaseResult<CreatePostpayResponse> {
        let res = self
            .tcb
            .request(
                "CreatePostpayPackage",
                json!({ "EnvId": env_id, "Source": source.unwrap_or("qcloud") }),
            )
            .await?;
        parse_response(res, "CreatePostpayPackage")
    }

    /// Destroy an environment.
    pub async fn destroy_env(&self, env_id: &str) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .tcb
            .request("DestroyEnv", json!({ "EnvId": env_id }))
            .await?;
        parse_response(res, "DestroyEnv")
    }

    /// List the environment's auth domains.
    pub async fn get_env_auth_domains(&self) -> CloudBaseResult<AuthDomainsResponse> {
        let res = self
            .tcb
            .request("DescribeAuthDomains", json!({ "EnvId": self.env_id }))
            .await?;
        parse_response(res, "DescribeAuthDomains")
    }

    /// Add auth domains to the environment.
    pub async fn create_env_domain(&self, domains: &[String]) -> CloudBaseResult<ResponseInfo> {
        let res = self
            .tcb
            .request(
                "CreateAuthDomain",
                json!({ "EnvId": self.env_id, "Domains": domains }),
            )
            .await?;
        parse_response(res, "CreateAuthDomain")
    }

    /// Remove auth domains by name; ids are resolved from the current
    /// domain listing first.
    pub async fn delete_env_domain(&self, domains: &[String]) -> CloudBaseResult<DeleteDomainResponse> {
        let listed = self.get_env_auth_domains().await?;
        let domain_ids: Vec<String> = listed
            .domains
            .into_iter()
            .filter(|item| domains.contains(&item.domain))
            .map(|item| item.id)
            .collect();
        let res = self
            .tcb
            .request(
                "DeleteAuthDomain",
                json!({ "EnvId": self.env_id, "DomainIds": domain_ids }),
            )
            .await?;
        parse_response(res, "DeleteAuthDomain")
    }
}

/// Random 6-hex-char environment id suffix. Best-effort unique only.
fn guid6() -> String {
    format!("{:06x}", rand::thread_rng().gen_range(0..0x0100_0000))
}

/// Goods description for the basic prepaid package of an environment.
fn prepay_goods(env_id: &str) -> Vec<GoodItem> {
    let detail = json!({
        "productCode": "p_tcb",
        "subProductCode": "sp_tcb_basic",
        "resourceId": env_id,
        "pid": 16_677,
        "timeUnit": "m",
        "timeSpan": 1,
        "tcb_cos": 1,
        "tcb_cdn": 1,
        "tcb_scf": 1,
        "tcb_mongodb": 1,
        "region": "ap-shanghai",
        "zone": "ap-shanghai-1",
        "source": "qcloud",
        "envId": env_id,
        "packageId": "basic",
        "isAutoRenew": "true",
        "tranType": 1,
    });
    vec![GoodItem {
        goods_category_id: PREPAY_GOODS_CATEGORY_ID,
        region_id: 1,
        zone_id: 0,
        goods_num: 1,
        project_id: 0,
        pay_mode: 1,
        platform: 1,
        goods_detail: detail.to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use serde_json::json;
    use serde_json::Value;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> EnvService {
        EnvService::new(
            CloudBaseContext::new(&ManagerConfig {
                secret_id: Some("id".into()),
                secret_key: Some("key".into()),
                endpoint_override: Some(server.uri()),
                ..Default::default()
            }),
            "demo-env",
        )
    }

    fn action(name: &str) -> wiremock::matchers::HeaderExactMatcher {
        header("X-TC-Action", name)
    }

    fn ok(body: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "Response": body }))
    }

    fn remote_error(code: &str, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Error": {"Code": code, "Message": message},
                "RequestId": "req-err"
            }
        }))
    }

    #[test]
    fn guid6_is_six_hex_chars() {
        for _ in 0..32 {
            let suffix = guid6();
            assert_eq!(suffix.len(), 6);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn prepay_goods_reference_the_environment() {
        let goods = prepay_goods("demo-abc123");
        assert_eq!(goods.len(), 1);
        assert_eq!(goods[0].goods_category_id, PREPAY_GOODS_CATEGORY_ID);
        let detail: Value = serde_json::from_str(&goods[0].goods_detail).unwrap();
        assert_eq!(detail["resourceId"], json!("demo-abc123"));
        assert_eq!(detail["envId"], json!("demo-abc123"));
    }

    #[tokio::test]
    async fn postpay_failure_rolls_back_and_reraises() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": true, "RequestId": "r1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "demo-abc123", "RequestId": "r2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreatePostpayPackage"))
            .respond_with(remote_error("FailedOperation.PayFail", "purchase failed"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("DestroyEnv"))
            .respond_with(ok(json!({"RequestId": "r4"})))
            .expect(1)
            .mount(&server)
            .await;
        // Already initialized: no role or billing traffic at all.
        for skipped in ["GetRole", "CreateRole", "AttachRolePolicy", "InitTcb", "GenerateDeals"] {
            Mock::given(method("POST"))
                .and(action(skipped))
                .respond_with(ok(json!({"RequestId": "never"})))
                .expect(0)
                .mount(&server)
                .await;
        }

        let err = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: Some(PaymentMode::Postpay),
                channel: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_code("FailedOperation.PayFail"));

        // The compensating destroy targets the freshly allocated id.
        let requests = server.received_requests().await.unwrap();
        let destroy = requests
            .iter()
            .find(|r| {
                r.headers
                    .get("X-TC-Action")
                    .map(|v| v.to_str().unwrap_or("") == "DestroyEnv")
                    .unwrap_or(false)
            })
            .unwrap();
        let body: Value = serde_json::from_slice(&destroy.body).unwrap();
        assert_eq!(body["EnvId"], json!("demo-abc123"));
    }

    #[tokio::test]
    async fn uninitialized_platform_with_existing_role_skips_creation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": false, "RequestId": "r1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("GetRole"))
            .respond_with(ok(json!({
                "RoleInfo": {"RoleId": "1", "RoleName": TCB_ROLE_NAME},
                "RequestId": "r2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateRole"))
            .respond_with(ok(json!({"RoleId": "1", "RequestId": "never"})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("InitTcb"))
            .respond_with(ok(json!({"RequestId": "r3"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "demo-ff00aa", "RequestId": "r4"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreatePostpayPackage"))
            .respond_with(ok(json!({"TranId": "t-1", "RequestId": "r5"})))
            .mount(&server)
            .await;

        let env_id = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: None,
                channel: None,
            })
            .await
            .unwrap();
        assert_eq!(env_id, "demo-ff00aa");
    }

    #[tokio::test]
    async fn missing_role_is_created_and_bound() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": false, "RequestId": "r1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("GetRole"))
            .respond_with(remote_error(
                "InvalidParameter.RoleNotExist",
                "role does not exist",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateRole"))
            .respond_with(ok(json!({"RoleId": "7", "RequestId": "r2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("AttachRolePolicy"))
            .respond_with(ok(json!({"RequestId": "r3"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("InitTcb"))
            .respond_with(ok(json!({"RequestId": "r4"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "demo-123abc", "RequestId": "r5"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreatePostpayPackage"))
            .respond_with(ok(json!({"TranId": "t-1", "RequestId": "r6"})))
            .mount(&server)
            .await;

        let env_id = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: Some(PaymentMode::Postpay),
                channel: None,
            })
            .await
            .unwrap();
        assert_eq!(env_id, "demo-123abc");
    }

    #[tokio::test]
    async fn unexpected_role_error_aborts_the_saga() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": false, "RequestId": "r1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("GetRole"))
            .respond_with(remote_error("AuthFailure", "not allowed"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "never", "RequestId": "never"})))
            .expect(0)
            .mount(&server)
            .await;

        let err = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: None,
                channel: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_code("AuthFailure"));
    }

    #[tokio::test]
    async fn prepay_generation_failure_destroys_environment() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": true, "RequestId": "r1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "demo-aa11bb", "RequestId": "r2"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("GenerateDeals"))
            .respond_with(remote_error("FailedOperation.GenerateDealsError", "no deal"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("PayDeals"))
            .respond_with(ok(json!({"OrderIds": [], "RequestId": "never"})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("DestroyEnv"))
            .respond_with(ok(json!({"RequestId": "r3"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: Some(PaymentMode::Prepay),
                channel: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_code("FailedOperation.GenerateDealsError"));
    }

    #[tokio::test]
    async fn prepay_payment_mismatch_fails_without_destroy() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": true, "RequestId": "r1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "demo-cc22dd", "RequestId": "r2"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("GenerateDeals"))
            .respond_with(ok(json!({"OrderIds": ["order-1"], "RequestId": "r3"})))
            .mount(&server)
            .await;
        // The call succeeds but pays a different order.
        Mock::given(method("POST"))
            .and(action("PayDeals"))
            .respond_with(ok(json!({"OrderIds": ["order-2"], "RequestId": "r4"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("DestroyEnv"))
            .respond_with(ok(json!({"RequestId": "never"})))
            .expect(0)
            .mount(&server)
            .await;

        let err = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: Some(PaymentMode::Prepay),
                channel: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_code("PrepayPaymentFailed"));
        assert!(err.original.as_ref().unwrap().is_code("PaidOrderMismatch"));
    }

    #[tokio::test]
    async fn failed_compensation_does_not_mask_payment_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("CheckTcbService"))
            .respond_with(ok(json!({"Initialized": true, "RequestId": "r1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreateEnv"))
            .respond_with(ok(json!({"EnvId": "demo-ee33ff", "RequestId": "r2"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("CreatePostpayPackage"))
            .respond_with(remote_error("FailedOperation.PayFail", "purchase failed"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("DestroyEnv"))
            .respond_with(remote_error("InternalError", "destroy also failed"))
            .expect(1)
            .mount(&server)
            .await;

        let err = service(&server)
            .create_env(CreateEnvParam {
                name: "demo".into(),
                payment_mode: Some(PaymentMode::Postpay),
                channel: None,
            })
            .await
            .unwrap_err();
        // The original purchase failure propagates, not the destroy error.
        assert!(err.is_code("FailedOperation.PayFail"));
    }

    #[tokio::test]
    async fn delete_env_domain_resolves_ids_from_listing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(action("DescribeAuthDomains"))
            .respond_with(ok(json!({
                "Domains": [
                    {"Id": "10", "Domain": "a.example.com"},
                    {"Id": "11", "Domain": "b.example.com"}
                ],
                "RequestId": "r1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(action("DeleteAuthDomain"))
            .respond_with(ok(json!({"Deleted": 1, "RequestId": "r2"})))
            .expect(1)
            .mount(&server)
            .await;

        let res = service(&server)
            .delete_env_domain(&["b.example.com".to_string()])
            .await
            .unwrap();
        assert_eq!(res.deleted, 1);

        let requests = server.received_requests().await.unwrap();
        let delete = requests
            .iter()
            .find(|r| {
                r.headers
                    .get("X-TC-Action")
                    .map(|v| v.to_str().unwrap_or("") == "DeleteAuthDomain")
                    .unwrap_or(false)
            })
            .unwrap();
        let body: Value = serde_json::from_slice(&delete.body).unwrap();
        assert_eq!(body["DomainIds"], json!(["11"]));
    }
}
