//! Serverless-function sub-service client.
//!
//! Wraps the function service (`scf`) and, for network detail
//! resolution, the `vpc` service. Trigger creation and code updates are
//! retried a fixed number of times with a fixed delay: right after a
//! function is created the remote side may briefly report it as missing,
//! and the blunt retry smooths over that consistency lag. It is not an
//! outage-handling mechanism.

use crate::client::{parse_response, CloudApiClient, ResponseInfo};
use crate::config::CloudBaseContext;
use crate::environment::EnvConfigCache;
use crate::error::{CloudBaseError, CloudBaseResult};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const SERVICE: &str = "scf";
const VERSION: &str = "2018-04-16";
const VPC_SERVICE: &str = "vpc";
const VPC_VERSION: &str = "2017-03-12";

/// Retries after the first attempt of trigger creation / code update.
const RETRY_LIMIT: u32 = 3;
/// Fixed delay between attempts, shared by both retried operations.
const RETRY_DELAY: Duration = Duration::from_millis(500);

const STATUS_POLL_DELAY: Duration = Duration::from_millis(1000);

const STATUS_ACTIVE: &str = "Active";
const STATUS_CREATING: &str = "Creating";
const STATUS_UPDATING: &str = "Updating";

/// Uploaded code must stay below this many bytes once decoded.
const MAX_CODE_SIZE: usize = 50 * 1024 * 1024;

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct VpcConf {
    pub vpc_id: String,
    pub subnet_id: String,
}

#[derive(Debug, Clone)]
pub struct FunctionTrigger {
    pub name: String,
    /// Only "timer" triggers are supported.
    pub trigger_type: String,
    /// Trigger description, e.g. a cron expression.
    pub config: Option<String>,
}

/// Function configuration as supplied by the caller.
#[derive(Debug, Clone)]
pub struct CloudFunction {
    pub name: String,
    pub handler: Option<String>,
    pub runtime: Option<String>,
    pub timeout: Option<u32>,
    pub memory_size: Option<u32>,
    pub env_variables: HashMap<String, String>,
    pub vpc: Option<VpcConf>,
    /// Overrides the runtime-based default when set.
    pub install_dependency: Option<bool>,
    pub l5: Option<bool>,
    /// Wait for dependency installation to finish before returning.
    pub is_wait_install: bool,
    pub triggers: Vec<FunctionTrigger>,
}

impl CloudFunction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handler: None,
            runtime: None,
            timeout: None,
            memory_size: None,
            env_variables: HashMap::new(),
            vpc: None,
            install_dependency: None,
            l5: None,
            is_wait_install: false,
            triggers: Vec::new(),
        }
    }
}

/// Function code payload: a base64-encoded ZIP produced by an external
/// packager and sent verbatim as `Code.ZipFile`.
#[derive(Debug, Clone)]
pub struct FunctionCode {
    pub zip_file: String,
}

impl FunctionCode {
    pub fn new(zip_file: String) -> Self {
        Self { zip_file }
    }

    fn validate(&self) -> CloudBaseResult<()> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&self.zip_file)
            .map_err(|_| CloudBaseError::invalid_argument("function code is not valid base64"))?;
        if decoded.is_empty() {
            return Err(CloudBaseError::invalid_argument("function code must not be empty"));
        }
        if decoded.len() > MAX_CODE_SIZE {
            return Err(CloudBaseError::invalid_argument(
                "function code must not exceed 50MB",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateFunctionParam {
    pub func: CloudFunction,
    pub code: FunctionCode,
    /// Overwrite an existing function with the same name.
    pub force: bool,
    pub code_secret: Option<String>,
}

/// Outcome of [`FunctionService::create_function`].
#[derive(Debug, Clone)]
pub enum CreateFunctionOutcome {
    Created(ResponseInfo),
    /// The function already existed and was force-updated.
    Overwritten {
        trigger: Option<ResponseInfo>,
        config: ResponseInfo,
        code: ResponseInfo,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionSummary {
    #[serde(rename = "FunctionId", default)]
    pub function_id: Option<String>,
    #[serde(rename = "FunctionName")]
    pub function_name: String,
    #[serde(rename = "Runtime", default)]
    pub runtime: Option<String>,
    #[serde(rename = "AddTime", default)]
    pub add_time: Option<String>,
    #[serde(rename = "ModTime", default)]
    pub mod_time: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListFunctionsResponse {
    #[serde(rename = "Functions", default)]
    functions: Vec<FunctionSummary>,
}

/// Invocation result; remote `Result` fields flattened next to the
/// request id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvocationResult {
    #[serde(rename = "FunctionRequestId", default)]
    pub function_request_id: Option<String>,
    #[serde(rename = "RetMsg", default)]
    pub ret_msg: Option<String>,
    #[serde(rename = "ErrMsg", default)]
    pub err_msg: Option<String>,
    #[serde(rename = "Log", default)]
    pub log: Option<String>,
    #[serde(rename = "InvokeResult", default)]
    pub invoke_result: Option<i64>,
    #[serde(rename = "Duration", default)]
    pub duration: Option<f64>,
    #[serde(rename = "BillDuration", default)]
    pub bill_duration: Option<f64>,
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: Option<f64>,
    #[serde(skip)]
    pub request_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionLogOptions {
    pub name: String,
    pub offset: u32,
    pub limit: u32,
    pub order: Option<String>,
    pub order_by: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionLogResponse {
    #[serde(rename = "TotalCount", default)]
    pub total_count: u64,
    #[serde(rename = "Data", default)]
    pub data: Vec<Value>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDownloadUrl {
    #[serde(rename = "Url")]
    pub url: String,
    #[serde(rename = "CodeSha256", default)]
    pub code_sha256: Option<String>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Function management client.
#[derive(Clone)]
pub struct FunctionService {
    scf: CloudApiClient,
    vpc: CloudApiClient,
    env_config: Arc<EnvConfigCache>,
}

impl FunctionService {
    pub fn new(context: CloudBaseContext, env_config: Arc<EnvConfigCache>) -> Self {
        Self {
            scf: CloudApiClient::new(context.clone(), SERVICE, VERSION),
            vpc: CloudApiClient::new(context, VPC_SERVICE, VPC_VERSION),
            env_config,
        }
    }

    async fn namespace(&self) -> CloudBaseResult<String> {
        let info = self.env_config.ensure_ready().await?;
        info.functions
            .first()
            .map(|f| f.namespace.clone())
            .ok_or_else(|| {
                CloudBaseError::invalid_argument("environment has no function namespace")
            })
    }

    /// Create a function; with `force`, an existing function of the same
    /// name is updated instead (triggers, configuration, then code).
    pub async fn create_function(
        &self,
        param: CreateFunctionParam,
    ) -> CloudBaseResult<CreateFunctionOutcome> {
        let CreateFunctionParam {
            func,
            code,
            force,
            code_secret,
        } = param;
        code.validate()?;

        let namespace = self.namespace().await?;
        let install = install_dependency(&func);

        let mut params = config_to_params(&func, code_secret.as_deref(), &namespace);
        params.insert("Code".to_string(), json!({ "ZipFile": code.zip_file }));

        match self.scf.request("CreateFunction", Value::Object(params)).await {
            Ok(res) => {
                self.retry_create_trigger(&func.name, &func.triggers).await?;
                if install && func.is_wait_install {
                    self.wait_function_active(&func.name, code_secret.as_deref())
                        .await?;
                }
                Ok(CreateFunctionOutcome::Created(parse_response(res, "CreateFunction")?))
            }
            Err(e) => {
                let exists = e.is_code("ResourceInUse.FunctionName") || e.is_code("ResourceInUse.Function");
                if exists && force {
                    let trigger = self.retry_create_trigger(&func.name, &func.triggers).await?;
                    let config = self.update_function_config(&func).await?;
                    let code = self
                        .retry_update_function_code(&func, &code, code_secret.as_deref())
                        .await?;
                    return Ok(CreateFunctionOutcome::Overwritten {
                        trigger,
                        config,
                        code,
                    });
                }
                if !force {
                    let mut wrapped = CloudBaseError::new(
                        e.kind,
                        &e.code,
                        &format!("[{}] deploy failed: {}", func.name, e.message),
                    );
                    wrapped.request_id = e.request_id.clone();
                    return Err(wrapped);
                }
                Err(e)
            }
        }
    }

    /// List functions of the environment's namespace.
    pub async fn list_functions(
        &self,
        limit: u32,
        offset: u32,
    ) -> CloudBaseResult<Vec<FunctionSummary>> {
        let namespace = self.namespace().await?;
        let res = self
            .scf
            .request(
                "ListFunctions",
                json!({ "Namespace": namespace, "Limit": limit, "Offset": offset }),
            )
            .await?;
        let listed: ListFunctionsResponse = parse_response(res, "ListFunctions")?;
        Ok(listed.functions)
    }

    /// Delete a function by name.
    pub async fn delete_function(&self, name: &str) -> CloudBaseResult<ResponseInfo> {
        let namespace = self.namespace().await?;
        let res = self
            .scf
            .request(
                "DeleteFunction",
                json!({ "FunctionName": name, "Namespace": namespace }),
            )
            .await?;
        parse_response(res, "DeleteFunction")
    }

    /// Fetch a function's detail. VPC and subnet ids are resolved into
    /// full descriptors through the vpc service, best-effort.
    pub async fn get_function_detail(
        &self,
        name: &str,
        code_secret: Option<&str>,
    ) -> CloudBaseResult<Value> {
        let namespace = self.namespace().await?;
        let mut params = json!({
            "FunctionName": name,
            "Namespace": namespace,
            "ShowCode": "TRUE",
        });
        if let Some(secret) = code_secret {
            params["CodeSecret"] = json!(secret);
        }
        let mut data = self.scf.request("GetFunction", params).await?;

        let vpc_id = data["VpcConfig"]["VpcId"].as_str().unwrap_or("").to_string();
        let subnet_id = data["VpcConfig"]["SubnetId"].as_str().unwrap_or("").to_string();
        if !vpc_id.is_empty() && !subnet_id.is_empty() {
            match self.resolve_vpc(&vpc_id, &subnet_id).await {
                Ok(resolved) => data["VpcConfig"] = resolved,
                Err(_) => data["VpcConfig"] = json!({ "vpc": "", "subnet": "" }),
            }
        }
        Ok(data)
    }

    /// Invoke a function synchronously and return its tail log.
    pub async fn invoke_function(
        &self,
        name: &str,
        params: Option<Value>,
    ) -> CloudBaseResult<InvocationResult> {
        let namespace = self.namespace().await?;
        let mut body = json!({
            "FunctionName": name,
            "Namespace": namespace,
            "LogType": "Tail",
        });
        if let Some(context) = params {
            let encoded = serde_json::to_string(&context)
                .map_err(|e| CloudBaseError::invalid_argument(&format!("unserializable invoke params: {e}")))?;
            body["ClientContext"] = json!(encoded);
        }

        let res = self.scf.request("Invoke", body).await.map_err(|e| {
            let mut wrapped = CloudBaseError::new(
                e.kind,
                &e.code,
                &format!("[{}] invoke failed: {}", name, e.message),
            );
            wrapped.request_id = e.request_id.clone();
            wrapped
        })?;

        let request_id = res
            .get("RequestId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mut result: InvocationResult = match res.get("Result") {
            Some(inner) => parse_response(inner.clone(), "Invoke")?,
            None => InvocationResult::default(),
        };
        result.request_id = request_id;
        Ok(result)
    }

    /// Copy a function, optionally into another environment's namespace.
    pub async fn copy_function(
        &self,
        name: &str,
        new_function_name: &str,
        target_env_id: Option<&str>,
        force: bool,
    ) -> CloudBaseResult<ResponseInfo> {
        if name.is_empty() || new_function_name.is_empty() {
            return Err(CloudBaseError::invalid_argument(
                "function name and new function name are required",
            ));
        }
        let namespace = self.namespace().await?;
        let res = self
            .scf
            .request(
                "CopyFunction",
                json!({
                    "FunctionName": name,
                    "NewFunctionName": new_function_name,
                    "Namespace": namespace,
                    "TargetNamespace": target_env_id.unwrap_or(&namespace),
                    "Override": force,
                }),
            )
            .await?;
        parse_response(res, "CopyFunction")
    }

    /// Batch-create triggers for a function. Returns `None` when the
    /// trigger list is empty.
    pub async fn create_function_triggers(
        &self,
        name: &str,
        triggers: &[FunctionTrigger],
    ) -> CloudBaseResult<Option<ResponseInfo>> {
        if triggers.is_empty() {
            return Ok(None);
        }
        let parsed = parse_triggers(triggers)?;
        let namespace = self.namespace().await?;
        let encoded = serde_json::to_string(&parsed)
            .map_err(|e| CloudBaseError::invalid_argument(&format!("unserializable triggers: {e}")))?;
        let res = self
            .scf
            .request(
                "BatchCreateTrigger",
                json!({
                    "FunctionName": name,
                    "Namespace": namespace,
                    "Triggers": encoded,
                    "Count": parsed.len(),
                }),
            )
            .await?;
        Ok(Some(parse_response(res, "BatchCreateTrigger")?))
    }

    /// Delete one timer trigger by name.
    pub async fn delete_function_trigger(
        &self,
        name: &str,
        trigger_name: &str,
    ) -> CloudBaseResult<ResponseInfo> {
        let namespace = self.namespace().await?;
        let res = self
            .scf
            .request(
                "DeleteTrigger",
                json!({
                    "FunctionName": name,
                    "Namespace": namespace,
                    "TriggerName": trigger_name,
                    "Type": "timer",
                }),
            )
            .await?;
        parse_response(res, "DeleteTrigger")
    }

    /// Update a function's configuration.
    pub async fn update_function_config(&self, func: &CloudFunction) -> CloudBaseResult<ResponseInfo> {
        let namespace = self.namespace().await?;

        let mut params = Map::new();
        params.insert("FunctionName".to_string(), json!(func.name));
        params.insert("Namespace".to_string(), json!(namespace));
        // Absent L5 config leaves the remote setting untouched (the null
        // is stripped before dispatch).
        params.insert("L5Enable".to_string(), l5_flag(func));
        if !func.env_variables.is_empty() {
            params.insert("Environment".to_string(), environment_variables(func));
        }
        if let Some(timeout) = func.timeout {
            params.insert("Timeout".to_string(), json!(timeout));
        }
        if let Some(ref runtime) = func.runtime {
            params.insert("Runtime".to_string(), json!(runtime));
        }
        params.insert("VpcConfig".to_string(), vpc_config(func));
        if let Some(memory) = func.memory_size {
            params.insert("MemorySize".to_string(), json!(memory));
        }
        if install_dependency(func) {
            params.insert("InstallDependency".to_string(), json!("TRUE"));
        }
        if let Some(install) = func.install_dependency {
            params.insert(
                "InstallDependency".to_string(),
                json!(if install { "TRUE" } else { "FALSE" }),
            );
        }

        let res = self
            .scf
            .request("UpdateFunctionConfiguration", Value::Object(params))
            .await?;
        parse_response(res, "UpdateFunctionConfiguration")
    }

    /// Update a function's code.
    pub async fn update_function_code(
        &self,
        func: &CloudFunction,
        code: &FunctionCode,
        code_secret: Option<&str>,
    ) -> CloudBaseResult<ResponseInfo> {
        code.validate()?;
        let namespace = self.namespace().await?;
        let install = install_dependency(func);

        let mut params = Map::new();
        params.insert("FunctionName".to_string(), json!(func.name));
        params.insert("Namespace".to_string(), json!(namespace));
        params.insert(
            "Handler".to_string(),
            json!(func.handler.as_deref().unwrap_or("index.main")),
        );
        params.insert(
            "InstallDependency".to_string(),
            json!(if install { "TRUE" } else { "FALSE" }),
        );
        params.insert("ZipFile".to_string(), json!(code.zip_file));
        if let Some(secret) = code_secret {
            params.insert("CodeSecret".to_string(), json!(secret));
        }

        match self
            .scf
            .request("UpdateFunctionCode", Value::Object(params))
            .await
        {
            Ok(res) => {
                if install && func.is_wait_install {
                    self.wait_function_active(&func.name, code_secret).await?;
                }
                parse_response(res, "UpdateFunctionCode")
            }
            Err(e) => {
                let mut wrapped = CloudBaseError::new(
                    e.kind,
                    &e.code,
                    &format!("[{}] function code update failed: {}", func.name, e.message),
                );
                wrapped.request_id = e.request_id.clone();
                Err(wrapped)
            }
        }
    }

    /// Fetch function logs.
    pub async fn get_function_logs(
        &self,
        options: FunctionLogOptions,
    ) -> CloudBaseResult<FunctionLogResponse> {
        let namespace = self.namespace().await?;
        let limit = if options.limit == 0 { 10 } else { options.limit };
        let res = self
            .scf
            .request(
                "GetFunctionLogs",
                json!({
                    "Namespace": namespace,
                    "FunctionName": options.name,
                    "Offset": options.offset,
                    "Limit": limit,
                    "Order": options.order,
                    "OrderBy": options.order_by,
                    "StartTime": options.start_time,
                    "EndTime": options.end_time,
                    "FunctionRequestId": options.request_id,
                }),
            )
            .await?;
        parse_response(res, "GetFunctionLogs")
    }

    /// Fetch a download URL for the function's code package.
    pub async fn get_function_download_url(
        &self,
        name: &str,
        code_secret: Option<&str>,
    ) -> CloudBaseResult<FunctionDownloadUrl> {
        let namespace = self.namespace().await?;
        let mut params = json!({ "FunctionName": name, "Namespace": namespace });
        if let Some(secret) = code_secret {
            params["CodeSecret"] = json!(secret);
        }
        let res = self
            .scf
            .request("GetFunctionAddress", params)
            .await
            .map_err(|e| {
                let mut wrapped = CloudBaseError::new(
                    e.kind,
                    &e.code,
                    &format!("[{}] fetching code download url failed: {}", name, e.message),
                );
                wrapped.request_id = e.request_id.clone();
                wrapped
            })?;
        parse_response(res, "GetFunctionAddress")
    }

    // ── Retry wrapper ───────────────────────────────────────────────

    /// Trigger creation with the fixed-count/fixed-delay retry policy.
    /// The last error propagates verbatim once retries are exhausted.
    async fn retry_create_trigger(
        &self,
        name: &str,
        triggers: &[FunctionTrigger],
    ) -> CloudBaseResult<Option<ResponseInfo>> {
        let mut attempt = 0;
        loop {
            match self.create_function_triggers(name, triggers).await {
                Ok(res) => return Ok(res),
                Err(_) if attempt < RETRY_LIMIT => {
                    attempt += 1;
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Code update with the same retry policy as trigger creation.
    async fn retry_update_function_code(
        &self,
        func: &CloudFunction,
        code: &FunctionCode,
        code_secret: Option<&str>,
    ) -> CloudBaseResult<ResponseInfo> {
        let mut attempt = 0;
        loop {
            match self.update_function_code(func, code, code_secret).await {
                Ok(res) => return Ok(res),
                Err(_) if attempt < RETRY_LIMIT => {
                    attempt += 1;
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll the function status until it leaves Creating/Updating.
    pub async fn wait_function_active(
        &self,
        name: &str,
        code_secret: Option<&str>,
    ) -> CloudBaseResult<()> {
        loop {
            let detail = self.get_function_detail(name, code_secret).await?;
            let status = detail["Status"].as_str().unwrap_or(STATUS_ACTIVE).to_string();
            sleep(STATUS_POLL_DELAY).await;
            if status != STATUS_CREATING && status != STATUS_UPDATING {
                return Ok(());
            }
        }
    }

    // ── VPC detail resolution ───────────────────────────────────────

    async fn resolve_vpc(&self, vpc_id: &str, subnet_id: &str) -> CloudBaseResult<Value> {
        let vpcs = self.vpc.request("DescribeVpcs", json!({})).await?;
        let vpc = vpcs["VpcSet"]
            .as_array()
            .and_then(|set| {
                set.iter()
                    .find(|item| item["VpcId"].as_str() == Some(vpc_id))
                    .cloned()
            })
            .unwrap_or(Value::Null);

        let subnets = self
            .vpc
            .request(
                "DescribeSubnets",
                json!({
                    "Filters": [{ "Name": "vpc-id", "Values": [vpc_id] }]
                }),
            )
            .await?;
        let subnet = subnets["SubnetSet"]
            .as_array()
            .and_then(|set| {
                set.iter()
                    .find(|item| item["SubnetId"].as_str() == Some(subnet_id))
                    .cloned()
            })
            .unwrap_or(Value::Null);

        Ok(json!({ "vpc": vpc, "subnet": subnet }))
    }
}

// ── Parameter mapping ───────────────────────────────────────────────────

fn is_node_function(runtime: Option<&str>) -> bool {
    runtime.map(|r| r.contains("Nodejs")).unwrap_or(false)
}

/// Effective InstallDependency flag: node functions default to true,
/// the explicit option overrides.
fn install_dependency(func: &CloudFunction) -> bool {
    func.install_dependency
        .unwrap_or_else(|| is_node_function(func.runtime.as_deref()))
}

fn l5_flag(func: &CloudFunction) -> Value {
    match func.l5 {
        None => Value::Null,
        Some(true) => json!("TRUE"),
        Some(false) => json!("FALSE"),
    }
}

fn environment_variables(func: &CloudFunction) -> Value {
    let variables: Vec<Value> = func
        .env_variables
        .iter()
        .map(|(key, value)| json!({ "Key": key, "Value": value }))
        .collect();
    json!({ "Variables": variables })
}

fn vpc_config(func: &CloudFunction) -> Value {
    let vpc = func.vpc.clone().unwrap_or_default();
    json!({ "SubnetId": vpc.subnet_id, "VpcId": vpc.vpc_id })
}

/// Map a function config to `CreateFunction` request params. The
/// defaults (Nodejs8.9 runtime, 10s timeout, 256MB memory, index.main
/// handler) match the platform console's.
fn config_to_params(func: &CloudFunction, code_secret: Option<&str>, namespace: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("Namespace".to_string(), json!(namespace));
    params.insert("Role".to_string(), json!("TCB_QcsRole"));
    params.insert("Stamp".to_string(), json!("MINI_QCBASE"));
    params.insert("FunctionName".to_string(), json!(func.name));
    params.insert("L5Enable".to_string(), l5_flag(func));
    if !func.env_variables.is_empty() {
        params.insert("Environment".to_string(), environment_variables(func));
    }
    params.insert(
        "Handler".to_string(),
        json!(func.handler.as_deref().unwrap_or("index.main")),
    );
    params.insert("Timeout".to_string(), json!(func.timeout.unwrap_or(10)));
    params.insert(
        "Runtime".to_string(),
        json!(func.runtime.as_deref().unwrap_or("Nodejs8.9")),
    );
    params.insert("VpcConfig".to_string(), vpc_config(func));
    params.insert(
        "MemorySize".to_string(),
        json!(func.memory_size.unwrap_or(256)),
    );
    params.insert(
        "InstallDependency".to_string(),
        json!(if install_dependency(func) { "TRUE" } else { "FALSE" }),
    );
    if let Some(secret) = code_secret {
        params.insert("CodeSecret".to_string(), json!(secret));
    }
    params
}

/// Validate and convert trigger configs; only timer triggers exist.
fn parse_triggers(triggers: &[FunctionTrigger]) -> CloudBaseResult<Vec<Value>> {
    triggers
        .iter()
        .map(|item| {
            if item.trigger_type != "timer" {
                return Err(CloudBaseError::invalid_argument(&format!(
                    "unsupported trigger type [{}], only timer triggers are supported",
                    item.trigger_type
                )));
            }
            Ok(json!({
                "TriggerName": item.name,
                "Type": item.trigger_type,
                "TriggerDesc": item.config,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloudBaseContext, ManagerConfig};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ZIP: &str = "UEsDBBQAAAAIAA=="; // any valid base64

    fn service(server: &MockServer) -> FunctionService {
        let context = CloudBaseContext::new(&ManagerConfig {
            secret_id: Some("id".into()),
            secret_key: Some("key".into()),
            endpoint_override: Some(server.uri()),
            ..Default::default()
        });
        let cache = Arc::new(EnvConfigCache::new(context.clone(), "demo-env"));
        FunctionService::new(context, cache)
    }

    async fn mount_env_config(server: &MockServer) {
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeEnvs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "EnvList": [{
                        "EnvId": "demo-env",
                        "Functions": [{"Namespace": "demo-env"}],
                        "Databases": [{"InstanceId": "ins-1"}],
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

    fn remote_error(code: &str, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Error": {"Code": code, "Message": message},
                "RequestId": "req-err"
            }
        }))
    }

    #[test]
    fn config_to_params_applies_defaults() {
        let func = CloudFunction::new("app");
        let params = config_to_params(&func, None, "ns");
        assert_eq!(params["Handler"], json!("index.main"));
        assert_eq!(params["Timeout"], json!(10));
        assert_eq!(params["Runtime"], json!("Nodejs8.9"));
        assert_eq!(params["MemorySize"], json!(256));
        assert_eq!(params["Role"], json!("TCB_QcsRole"));
        // Node runtime default: install dependencies.
        assert_eq!(params["InstallDependency"], json!("TRUE"));
        // Unset L5 stays null so stripping removes it.
        assert!(params["L5Enable"].is_null());
        assert!(!params.contains_key("Environment"));
    }

    #[test]
    fn config_to_params_override_wins() {
        let mut func = CloudFunction::new("app");
        func.runtime = Some("Php7".into());
        func.install_dependency = Some(true);
        func.env_variables.insert("KEY".into(), "value".into());
        let params = config_to_params(&func, Some("s3cret"), "ns");
        assert_eq!(params["InstallDependency"], json!("TRUE"));
        assert_eq!(params["CodeSecret"], json!("s3cret"));
        let variables = params["Environment"]["Variables"].as_array().unwrap();
        assert_eq!(variables[0]["Key"], json!("KEY"));
    }

    #[test]
    fn parse_triggers_rejects_non_timer() {
        let triggers = vec![FunctionTrigger {
            name: "t1".into(),
            trigger_type: "http".into(),
            config: None,
        }];
        let err = parse_triggers(&triggers).unwrap_err();
        assert!(err.message.contains("unsupported trigger type"));
    }

    #[test]
    fn function_code_rejects_bad_base64() {
        assert!(FunctionCode::new("not base64 !!".into()).validate().is_err());
        assert!(FunctionCode::new(ZIP.into()).validate().is_ok());
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_trigger_failures() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        // Two consistency-lag failures, then success.
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "BatchCreateTrigger"))
            .respond_with(remote_error("ResourceNotFound.Function", "function not found"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "BatchCreateTrigger"))
            .respond_with(ok(json!({"RequestId": "req-t"})))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(&server);
        let triggers = vec![FunctionTrigger {
            name: "t1".into(),
            trigger_type: "timer".into(),
            config: Some("0 */5 * * * * *".into()),
        }];
        let res = svc.retry_create_trigger("app", &triggers).await.unwrap();
        assert_eq!(res.unwrap().request_id, "req-t");
    }

    #[tokio::test]
    async fn retry_exhaustion_returns_last_error() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "BatchCreateTrigger"))
            .respond_with(remote_error("ResourceNotFound.Function", "still missing"))
            .expect(4) // 1 attempt + 3 retries
            .mount(&server)
            .await;

        let svc = service(&server);
        let triggers = vec![FunctionTrigger {
            name: "t1".into(),
            trigger_type: "timer".into(),
            config: None,
        }];
        let err = svc.retry_create_trigger("app", &triggers).await.unwrap_err();
        assert!(err.is_code("ResourceNotFound.Function"));
    }

    #[tokio::test]
    async fn create_function_force_updates_existing() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "CreateFunction"))
            .respond_with(remote_error("ResourceInUse.Function", "already exists"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "UpdateFunctionConfiguration"))
            .respond_with(ok(json!({"RequestId": "req-cfg"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "UpdateFunctionCode"))
            .and(body_partial_json(json!({"ZipFile": ZIP})))
            .respond_with(ok(json!({"RequestId": "req-code"})))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(&server);
        let outcome = svc
            .create_function(CreateFunctionParam {
                func: CloudFunction::new("app"),
                code: FunctionCode::new(ZIP.into()),
                force: true,
                code_secret: None,
            })
            .await
            .unwrap();
        match outcome {
            CreateFunctionOutcome::Overwritten { trigger, config, code } => {
                assert!(trigger.is_none()); // no triggers configured
                assert_eq!(config.request_id, "req-cfg");
                assert_eq!(code.request_id, "req-code");
            }
            other => panic!("expected overwrite outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_function_wraps_deploy_failure() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "CreateFunction"))
            .respond_with(remote_error("LimitExceeded", "too many functions"))
            .mount(&server)
            .await;

        let svc = service(&server);
        let err = svc
            .create_function(CreateFunctionParam {
                func: CloudFunction::new("app"),
                code: FunctionCode::new(ZIP.into()),
                force: false,
                code_secret: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_code("LimitExceeded"));
        assert!(err.message.contains("[app] deploy failed"));
    }

    #[tokio::test]
    async fn list_functions_maps_summaries() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "ListFunctions"))
            .and(body_partial_json(json!({"Namespace": "demo-env", "Limit": 20})))
            .respond_with(ok(json!({
                "Functions": [
                    {"FunctionName": "app", "Runtime": "Nodejs10.15", "Status": "Active"}
                ],
                "TotalCount": 1,
                "RequestId": "req-1"
            })))
            .mount(&server)
            .await;

        let funcs = service(&server).list_functions(20, 0).await.unwrap();
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].function_name, "app");
        assert_eq!(funcs[0].status.as_deref(), Some("Active"));
    }

    #[tokio::test]
    async fn invoke_flattens_result() {
        let server = MockServer::start().await;
        mount_env_config(&server).await;

        Mock::given(method("POST"))
            .and(header("X-TC-Action", "Invoke"))
            .respond_with(ok(json!({
                "RequestId": "req-inv",
                "Result": {
                    "RetMsg": "\"ok\"",
                    "Log": "START ...",
                    "InvokeResult": 0,
                    "FunctionRequestId": "fn-req-1"
                }
            })))
            .mount(&server)
            .await;

        let res = service(&server)
            .invoke_function("app", Some(json!({"key": "value"})))
            .await
            .unwrap();
        assert_eq!(res.request_id, "req-inv");
        assert_eq!(res.ret_msg.as_deref(), Some("\"ok\""));
        assert_eq!(res.invoke_result, Some(0));
    }
}
