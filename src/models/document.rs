use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 来源单据 (送货单 / 采购单 / 报价单)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: i64,
    pub date: NaiveDate,
    pub counterparty_name: String,
    pub reference_code: String,
}

/// 候选物料行 - 仅在选择过程中存在，不直接持久化
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CandidateLineItem {
    pub source_document_id: i64,
    pub item_code: String,
    pub item_name: String,
    pub quantity: BigDecimal,
    pub unit: String,
    pub unit_cost: BigDecimal,      // 主单据价格
    pub remark: Option<String>,
}

/// 对照价格 (报价单报价 / 销售价目表)，只用于计算毛利
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CounterpartPrice {
    pub item_code: String,
    pub reference: String,
    pub unit_price: BigDecimal,
}
