use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AggregateSummary, AllocationKey, AllocationRow, Bucket, BucketSubtotal, CandidateLineItem,
    CounterpartPrice, RowScope, TaggedRow,
};
use crate::service::aggregate;
use bigdecimal::{BigDecimal, Zero};
use indexmap::map::Entry;
use indexmap::IndexMap;

/// 分摊账本
///
/// 两个分区各自保序去重 (IndexMap)，任何成功的变更都会同步重算汇总，
/// 调用方拿到返回值时汇总已是最新。
#[derive(Debug, Clone)]
pub struct AllocationLedger {
    primary: IndexMap<AllocationKey, AllocationRow>,
    supplemental: IndexMap<AllocationKey, AllocationRow>,
    additional_cost: BigDecimal,
    summary: AggregateSummary,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self {
            primary: IndexMap::new(),
            supplemental: IndexMap::new(),
            additional_cost: BigDecimal::zero(),
            summary: AggregateSummary::default(),
        }
    }

    fn bucket(&self, bucket: Bucket) -> &IndexMap<AllocationKey, AllocationRow> {
        match bucket {
            Bucket::Primary => &self.primary,
            Bucket::Supplemental => &self.supplemental,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut IndexMap<AllocationKey, AllocationRow> {
        match bucket {
            Bucket::Primary => &mut self.primary,
            Bucket::Supplemental => &mut self.supplemental,
        }
    }

    /// 添加分摊行
    ///
    /// 同一分区内 (单据, 物料) 重复时返回 DuplicateKey，账本不变；
    /// 不同分区允许相同键 (追加单据是另一张实物单据)。
    pub fn add_row(
        &mut self,
        candidate: &CandidateLineItem,
        counterpart: Option<&CounterpartPrice>,
        bucket: Bucket,
    ) -> LedgerResult<AllocationRow> {
        let row = build_row(candidate, counterpart)?;

        match self.bucket_mut(bucket).entry(row.key()) {
            Entry::Occupied(_) => {
                tracing::warn!(
                    "重复添加被拒绝: 单据 {} 物料 {} ({})",
                    row.source_document_id, row.item_code, bucket
                );
                return Err(LedgerError::DuplicateKey {
                    source_document_id: row.source_document_id,
                    item_code: row.item_code,
                    bucket,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
            }
        }

        self.refresh();
        tracing::debug!(
            "Added row {}/{} to {} bucket, total_cost={}, rows={}",
            row.source_document_id, row.item_code, bucket, row.total_cost, self.summary.row_count
        );
        Ok(row)
    }

    /// 删除分摊行，键不存在时为空操作
    pub fn remove_row(&mut self, source_document_id: i64, item_code: &str, bucket: Bucket) -> bool {
        let key = AllocationKey::new(source_document_id, item_code);
        // shift_remove 保持其余行的顺序
        let removed = self.bucket_mut(bucket).shift_remove(&key).is_some();
        if removed {
            self.refresh();
            tracing::debug!(
                "Removed row {}/{} from {} bucket, rows={}",
                source_document_id, item_code, bucket, self.summary.row_count
            );
        }
        removed
    }

    /// 录入运费等固定费用
    pub fn set_additional_cost(&mut self, cost: BigDecimal) -> LedgerResult<()> {
        if cost < BigDecimal::zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "additional cost must not be negative: {}",
                cost
            )));
        }
        self.additional_cost = cost;
        self.refresh();
        Ok(())
    }

    pub fn additional_cost(&self) -> &BigDecimal {
        &self.additional_cost
    }

    /// 主分区在前、追加分区在后，各自保持插入顺序
    pub fn rows(&self, scope: impl Into<RowScope>) -> Vec<&AllocationRow> {
        match scope.into() {
            RowScope::All => self.primary.values().chain(self.supplemental.values()).collect(),
            RowScope::Bucket(bucket) => self.bucket(bucket).values().collect(),
        }
    }

    /// 带 1 起始行号，用于列表显示
    pub fn numbered_rows(&self, bucket: Bucket) -> Vec<(usize, &AllocationRow)> {
        self.bucket(bucket)
            .values()
            .enumerate()
            .map(|(idx, row)| (idx + 1, row))
            .collect()
    }

    pub fn tagged_rows(&self) -> Vec<TaggedRow> {
        Bucket::ALL
            .iter()
            .flat_map(|&bucket| {
                self.numbered_rows(bucket)
                    .into_iter()
                    .map(move |(line_no, row)| TaggedRow {
                        bucket,
                        line_no,
                        row: row.clone(),
                    })
            })
            .collect()
    }

    pub fn get(&self, source_document_id: i64, item_code: &str, bucket: Bucket) -> Option<&AllocationRow> {
        self.bucket(bucket)
            .get(&AllocationKey::new(source_document_id, item_code))
    }

    pub fn contains(&self, source_document_id: i64, item_code: &str, bucket: Bucket) -> bool {
        self.get(source_document_id, item_code, bucket).is_some()
    }

    pub fn summary(&self) -> &AggregateSummary {
        &self.summary
    }

    pub fn bucket_subtotal(&self, bucket: Bucket) -> BucketSubtotal {
        aggregate::bucket_subtotal(self.bucket(bucket).values())
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.supplemental.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 提交前置检查
    pub fn is_submittable(&self) -> bool {
        !self.is_empty()
    }

    /// 唯一的重算入口
    fn refresh(&mut self) {
        self.summary = aggregate::recompute(
            self.primary.values().chain(self.supplemental.values()),
            &self.additional_cost,
        );
    }
}

impl Default for AllocationLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// 由候选行和对照价格计算分摊行派生字段
pub fn build_row(
    candidate: &CandidateLineItem,
    counterpart: Option<&CounterpartPrice>,
) -> LedgerResult<AllocationRow> {
    let zero = BigDecimal::zero();
    if candidate.item_code.trim().is_empty() {
        return Err(LedgerError::invalid_line(&candidate.item_code, "item code is empty"));
    }
    if candidate.quantity < zero {
        return Err(LedgerError::invalid_line(&candidate.item_code, "quantity is negative"));
    }
    if candidate.unit_cost < zero {
        return Err(LedgerError::invalid_line(&candidate.item_code, "unit cost is negative"));
    }

    let unit_sale_price = match counterpart {
        Some(price) if price.item_code != candidate.item_code => {
            return Err(LedgerError::invalid_line(
                &candidate.item_code,
                format!("counterpart price belongs to item {}", price.item_code),
            ));
        }
        Some(price) if price.unit_price < zero => {
            return Err(LedgerError::invalid_line(&candidate.item_code, "sale price is negative"));
        }
        Some(price) => Some(price.unit_price.clone()),
        None => None,
    };

    let total_cost = &candidate.quantity * &candidate.unit_cost;
    let total_sale_price = unit_sale_price.as_ref().map(|p| &candidate.quantity * p);
    let margin_percent = total_sale_price
        .as_ref()
        .and_then(|sale| aggregate::margin_percent(&(sale - &total_cost), &total_cost));

    Ok(AllocationRow {
        source_document_id: candidate.source_document_id,
        item_code: candidate.item_code.clone(),
        item_name: candidate.item_name.clone(),
        quantity: candidate.quantity.clone(),
        unit: candidate.unit.clone(),
        unit_cost: candidate.unit_cost.clone(),
        total_cost,
        unit_sale_price,
        total_sale_price,
        margin_percent,
        remark: candidate.remark.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn candidate(doc: i64, code: &str, qty: &str, cost: &str) -> CandidateLineItem {
        CandidateLineItem {
            source_document_id: doc,
            item_code: code.to_string(),
            item_name: format!("Material {}", code),
            quantity: dec(qty),
            unit: "PCS".to_string(),
            unit_cost: dec(cost),
            remark: None,
        }
    }

    fn price(code: &str, unit_price: &str) -> CounterpartPrice {
        CounterpartPrice {
            item_code: code.to_string(),
            reference: "QT-001".to_string(),
            unit_price: dec(unit_price),
        }
    }

    #[test]
    fn test_add_row_computes_derived_fields() {
        let mut ledger = AllocationLedger::new();
        let row = ledger
            .add_row(&candidate(1, "A", "10", "1000"), Some(&price("A", "1200")), Bucket::Primary)
            .unwrap();

        assert_eq!(row.total_cost, dec("10000"));
        assert_eq!(row.total_sale_price, Some(dec("12000")));
        assert_eq!(row.margin_percent, Some(dec("20.00")));
        assert_eq!(ledger.summary().total_cost, dec("10000"));
    }

    #[test]
    fn test_row_without_counterpart_has_no_margin() {
        let mut ledger = AllocationLedger::new();
        let row = ledger
            .add_row(&candidate(1, "B", "5", "2000"), None, Bucket::Primary)
            .unwrap();
        assert_eq!(row.total_cost, dec("10000"));
        assert_eq!(row.unit_sale_price, None);
        assert_eq!(row.total_sale_price, None);
        assert_eq!(row.margin_percent, None);
    }

    #[test]
    fn test_zero_cost_row_margin_undefined() {
        let mut ledger = AllocationLedger::new();
        let row = ledger
            .add_row(&candidate(1, "FREE", "3", "0"), Some(&price("FREE", "10")), Bucket::Primary)
            .unwrap();
        assert_eq!(row.total_cost, BigDecimal::zero());
        assert_eq!(row.total_sale_price, Some(dec("30")));
        assert_eq!(row.margin_percent, None);
        assert_eq!(ledger.summary().margin_percent, BigDecimal::zero());
    }

    #[test]
    fn test_row_margin_formula() {
        let mut ledger = AllocationLedger::new();
        let row = ledger
            .add_row(&candidate(7, "X", "2.5", "80"), Some(&price("X", "90")), Bucket::Primary)
            .unwrap();
        let total_cost = row.total_cost.clone();
        let sale = row.total_sale_price.clone().unwrap();
        let expected = ((sale - &total_cost) * BigDecimal::from(100) / &total_cost).round(2);
        assert_eq!(row.margin_percent, Some(expected));
        assert_eq!(row.margin_percent, Some(dec("12.50")));
    }

    #[test]
    fn test_duplicate_in_same_bucket_rejected() {
        let mut ledger = AllocationLedger::new();
        let item = candidate(1, "A", "10", "1000");
        ledger.add_row(&item, None, Bucket::Primary).unwrap();
        let before = ledger.summary().clone();

        let err = ledger
            .add_row(&item, Some(&price("A", "1500")), Bucket::Primary)
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.summary(), &before);
        // 原行未被覆盖
        assert_eq!(ledger.get(1, "A", Bucket::Primary).unwrap().unit_sale_price, None);
    }

    #[test]
    fn test_same_key_allowed_across_buckets() {
        let mut ledger = AllocationLedger::new();
        let item = candidate(1, "A", "10", "1000");
        ledger.add_row(&item, None, Bucket::Primary).unwrap();
        ledger.add_row(&item, None, Bucket::Supplemental).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.summary().total_cost, dec("20000"));
    }

    #[test]
    fn test_get_looks_up_by_document_and_item_within_bucket() {
        let mut ledger = AllocationLedger::new();
        ledger.add_row(&candidate(1, "A", "2", "10"), None, Bucket::Primary).unwrap();
        ledger.add_row(&candidate(2, "A", "3", "10"), None, Bucket::Primary).unwrap();

        assert_eq!(ledger.get(1, "A", Bucket::Primary).unwrap().total_cost, dec("20"));
        assert_eq!(ledger.get(2, "A", Bucket::Primary).unwrap().total_cost, dec("30"));
        assert!(ledger.get(1, "a", Bucket::Primary).is_none());
        assert!(ledger.get(3, "A", Bucket::Primary).is_none());
        assert!(!ledger.contains(1, "A", Bucket::Supplemental));
    }

    #[test]
    fn test_remove_row_is_idempotent() {
        let mut ledger = AllocationLedger::new();
        ledger.add_row(&candidate(1, "A", "1", "10"), None, Bucket::Primary).unwrap();
        ledger.add_row(&candidate(1, "B", "1", "20"), None, Bucket::Primary).unwrap();

        assert!(ledger.remove_row(1, "A", Bucket::Primary));
        let once: Vec<AllocationRow> = ledger.rows(RowScope::All).into_iter().cloned().collect();
        let summary_once = ledger.summary().clone();

        assert!(!ledger.remove_row(1, "A", Bucket::Primary));
        let twice: Vec<AllocationRow> = ledger.rows(RowScope::All).into_iter().cloned().collect();
        assert_eq!(once, twice);
        assert_eq!(ledger.summary(), &summary_once);
        assert_eq!(ledger.summary().total_cost, dec("20"));
    }

    #[test]
    fn test_remove_from_other_bucket_is_noop() {
        let mut ledger = AllocationLedger::new();
        ledger.add_row(&candidate(1, "A", "1", "10"), None, Bucket::Primary).unwrap();
        assert!(!ledger.remove_row(1, "A", Bucket::Supplemental));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_rows_preserve_insertion_order() {
        let mut ledger = AllocationLedger::new();
        for code in ["C", "A", "B", "D"] {
            ledger.add_row(&candidate(1, code, "1", "1"), None, Bucket::Primary).unwrap();
        }
        ledger.add_row(&candidate(2, "Z", "1", "1"), None, Bucket::Supplemental).unwrap();
        ledger.remove_row(1, "A", Bucket::Primary);

        let codes: Vec<&str> = ledger
            .rows(RowScope::All)
            .into_iter()
            .map(|r| r.item_code.as_str())
            .collect();
        assert_eq!(codes, vec!["C", "B", "D", "Z"]);

        let numbered: Vec<(usize, &str)> = ledger
            .numbered_rows(Bucket::Primary)
            .into_iter()
            .map(|(n, r)| (n, r.item_code.as_str()))
            .collect();
        assert_eq!(numbered, vec![(1, "C"), (2, "B"), (3, "D")]);

        let tagged = ledger.tagged_rows();
        assert_eq!(tagged.last().unwrap().bucket, Bucket::Supplemental);
        assert_eq!(tagged.last().unwrap().line_no, 1);
    }

    #[test]
    fn test_totals_commutative_over_insertion_order() {
        let items = [
            candidate(1, "A", "3", "12.5"),
            candidate(1, "B", "4", "7"),
            candidate(2, "C", "1.5", "100"),
        ];
        let mut forward = AllocationLedger::new();
        for item in &items {
            forward.add_row(item, None, Bucket::Primary).unwrap();
        }
        let mut backward = AllocationLedger::new();
        for item in items.iter().rev() {
            backward.add_row(item, None, Bucket::Primary).unwrap();
        }
        assert_eq!(forward.summary(), backward.summary());
        assert_eq!(forward.summary().total_cost, dec("215.5"));
    }

    #[test]
    fn test_bucket_subtotals() {
        let mut ledger = AllocationLedger::new();
        ledger
            .add_row(&candidate(1, "A", "10", "1000"), Some(&price("A", "1200")), Bucket::Primary)
            .unwrap();
        ledger.add_row(&candidate(2, "B", "5", "2000"), None, Bucket::Supplemental).unwrap();

        let primary = ledger.bucket_subtotal(Bucket::Primary);
        assert_eq!(primary.total_cost, dec("10000"));
        assert_eq!(primary.total_sales, dec("12000"));

        let supplemental = ledger.bucket_subtotal(Bucket::Supplemental);
        assert_eq!(supplemental.total_cost, dec("10000"));
        assert_eq!(supplemental.total_sales, BigDecimal::zero());
    }

    #[test]
    fn test_additional_cost_recomputes_summary() {
        let mut ledger = AllocationLedger::new();
        ledger
            .add_row(&candidate(1, "A", "10", "1000"), Some(&price("A", "1200")), Bucket::Primary)
            .unwrap();
        assert_eq!(ledger.summary().margin_percent, dec("20"));

        ledger.set_additional_cost(dec("500")).unwrap();
        assert_eq!(ledger.summary().margin_percent, dec("15"));
        assert!(ledger.set_additional_cost(dec("-1")).is_err());
        assert_eq!(ledger.additional_cost(), &dec("500"));
    }

    #[test]
    fn test_invalid_lines_rejected_without_insert() {
        let mut ledger = AllocationLedger::new();
        let err = ledger
            .add_row(&candidate(1, "A", "-1", "10"), None, Bucket::Primary)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine { .. }));

        let err = ledger
            .add_row(&candidate(1, "A", "1", "10"), Some(&price("B", "12")), Bucket::Primary)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLine { .. }));
        assert!(ledger.is_empty());
        assert!(!ledger.is_submittable());
    }
}
