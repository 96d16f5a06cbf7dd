use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

/// 汇总结果 - 每次账本变更后重新计算，不单独修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub row_count: usize,
    pub total_cost: BigDecimal,
    pub total_sales: BigDecimal,
    pub additional_cost: BigDecimal,    // 运费等单独录入的固定费用
    pub profit: BigDecimal,             // total_sales - total_cost - additional_cost
    pub margin_percent: BigDecimal,     // 相对成本的利润率, 成本为 0 时为 0
}

impl Default for AggregateSummary {
    fn default() -> Self {
        Self {
            row_count: 0,
            total_cost: BigDecimal::zero(),
            total_sales: BigDecimal::zero(),
            additional_cost: BigDecimal::zero(),
            profit: BigDecimal::zero(),
            margin_percent: BigDecimal::zero(),
        }
    }
}

/// 单个分区小计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSubtotal {
    pub total_cost: BigDecimal,
    pub total_sales: BigDecimal,
}

impl Default for BucketSubtotal {
    fn default() -> Self {
        Self {
            total_cost: BigDecimal::zero(),
            total_sales: BigDecimal::zero(),
        }
    }
}
