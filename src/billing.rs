//! Billing sub-service client: order generation and payment.

use crate::client::{parse_response, CloudApiClient};
use crate::config::CloudBaseContext;
use crate::error::CloudBaseResult;
use serde::{Deserialize, Serialize};
use serde_json::json;

const SERVICE: &str = "billing";
const VERSION: &str = "2018-07-09";

// ── Types ───────────────────────────────────────────────────────────────

/// One purchasable item of an order.
#[derive(Debug, Clone, Serialize)]
pub struct GoodItem {
    #[serde(rename = "GoodsCategoryId")]
    pub goods_category_id: u64,
    #[serde(rename = "RegionId")]
    pub region_id: u32,
    #[serde(rename = "ZoneId")]
    pub zone_id: u32,
    #[serde(rename = "GoodsNum")]
    pub goods_num: u32,
    #[serde(rename = "ProjectId")]
    pub project_id: u32,
    #[serde(rename = "PayMode")]
    pub pay_mode: u32,
    #[serde(rename = "Platform")]
    pub platform: u32,
    /// JSON-encoded product description.
    #[serde(rename = "GoodsDetail")]
    pub goods_detail: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DealsResponse {
    #[serde(rename = "OrderIds", default)]
    pub order_ids: Vec<String>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

// ── Service ─────────────────────────────────────────────────────────────

/// Narrow client for order generation and payment.
#[derive(Debug, Clone)]
pub struct BillingService {
    client: CloudApiClient,
}

impl BillingService {
    pub fn new(context: CloudBaseContext) -> Self {
        Self {
            client: CloudApiClient::new(context, SERVICE, VERSION),
        }
    }

    /// Generate orders for a list of goods.
    pub async fn generate_deals(&self, goods: &[GoodItem]) -> CloudBaseResult<DealsResponse> {
        let res = self
            .client
            .request("GenerateDeals", json!({ "Goods": goods }))
            .await?;
        parse_response(res, "GenerateDeals")
    }

    /// Pay previously generated orders.
    pub async fn pay_deals(&self, order_ids: &[String]) -> CloudBaseResult<DealsResponse> {
        let res = self
            .client
            .request("PayDeals", json!({ "OrderIds": order_ids }))
            .await?;
        parse_response(res, "PayDeals")
    }
}
