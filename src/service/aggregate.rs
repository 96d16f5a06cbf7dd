//! 汇总计算 - 纯函数，相同输入恒得相同输出

use crate::models::{AggregateSummary, AllocationRow, BucketSubtotal};
use bigdecimal::{BigDecimal, Zero};

/// 毛利率保留小数位
pub const MARGIN_SCALE: i64 = 2;

/// 相对成本的利润率: profit / cost × 100
/// 成本为 0 时返回 None，由调用方决定显示为空还是 0
pub fn margin_percent(profit: &BigDecimal, cost: &BigDecimal) -> Option<BigDecimal> {
    if cost.is_zero() {
        return None;
    }
    let hundred = BigDecimal::from(100);
    Some(((profit * &hundred) / cost).round(MARGIN_SCALE))
}

/// 按分区或全部行重新计算汇总
pub fn recompute<'a, I>(rows: I, additional_cost: &BigDecimal) -> AggregateSummary
where
    I: IntoIterator<Item = &'a AllocationRow>,
{
    let mut row_count = 0usize;
    let mut total_cost = BigDecimal::zero();
    let mut total_sales = BigDecimal::zero();

    for row in rows {
        row_count += 1;
        total_cost += &row.total_cost;
        // 缺失售价按 0 计入，但不影响整体毛利计算
        if let Some(sale) = &row.total_sale_price {
            total_sales += sale;
        }
    }

    let profit = &total_sales - &total_cost - additional_cost;
    let margin = margin_percent(&profit, &total_cost).unwrap_or_else(BigDecimal::zero);

    AggregateSummary {
        row_count,
        total_cost,
        total_sales,
        additional_cost: additional_cost.clone(),
        profit,
        margin_percent: margin,
    }
}

/// 单个分区小计，公式与 recompute 相同
pub fn bucket_subtotal<'a, I>(rows: I) -> BucketSubtotal
where
    I: IntoIterator<Item = &'a AllocationRow>,
{
    rows.into_iter().fold(BucketSubtotal::default(), |mut acc, row| {
        acc.total_cost += &row.total_cost;
        if let Some(sale) = &row.total_sale_price {
            acc.total_sales += sale;
        }
        acc
    })
}
