use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 账本分区: 主单据 / 追加 ("Add") 单据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Primary,
    Supplemental,
}

impl Bucket {
    pub const ALL: [Bucket; 2] = [Bucket::Primary, Bucket::Supplemental];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Supplemental => "supplemental",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "supplemental" | "add" => Ok(Self::Supplemental),
            other => Err(format!("unknown bucket: {}", other)),
        }
    }
}

/// 行查询范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowScope {
    All,
    Bucket(Bucket),
}

impl From<Bucket> for RowScope {
    fn from(bucket: Bucket) -> Self {
        Self::Bucket(bucket)
    }
}

/// 分摊行唯一键 (来源单据ID, 物料编码)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllocationKey {
    pub source_document_id: i64,
    pub item_code: String,
}

impl AllocationKey {
    pub fn new(source_document_id: i64, item_code: impl Into<String>) -> Self {
        Self {
            source_document_id,
            item_code: item_code.into(),
        }
    }
}

/// 分摊行 - 持久化单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub source_document_id: i64,
    pub item_code: String,
    pub item_name: String,
    pub quantity: BigDecimal,
    pub unit: String,
    pub unit_cost: BigDecimal,
    pub total_cost: BigDecimal,                 // quantity × unit_cost
    pub unit_sale_price: Option<BigDecimal>,    // 对照价格
    pub total_sale_price: Option<BigDecimal>,   // quantity × unit_sale_price
    pub margin_percent: Option<BigDecimal>,     // 任一价格缺失或成本为 0 时为空
    pub remark: Option<String>,
}

impl AllocationRow {
    pub fn key(&self) -> AllocationKey {
        AllocationKey::new(self.source_document_id, self.item_code.clone())
    }
}
