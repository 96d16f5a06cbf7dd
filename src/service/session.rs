use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AllocationRow, AllocationSubmission, Bucket, CandidateLineItem, CounterpartPrice,
    SourceDocument, SourceReference, SubmissionHeader,
};
use crate::service::ledger::AllocationLedger;
use crate::service::ports::AllocationStore;
use crate::service::resolver::SearchGate;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// 会话状态: Empty → Building → Submittable → Submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    Building,
    Submittable,
    Submitted,
}

/// 单个操作员的分摊编辑会话，独占自己的账本
#[derive(Debug)]
pub struct CompositionSession {
    ledger: AllocationLedger,
    selected: HashMap<Bucket, i64>,
    documents: HashMap<i64, SourceDocument>,
    primary_gate: Arc<SearchGate>,
    supplemental_gate: Arc<SearchGate>,
    touched: bool,
    submitted_id: Option<i64>,
}

impl CompositionSession {
    pub fn new() -> Self {
        Self {
            ledger: AllocationLedger::new(),
            selected: HashMap::new(),
            documents: HashMap::new(),
            primary_gate: Arc::new(SearchGate::new()),
            supplemental_gate: Arc::new(SearchGate::new()),
            touched: false,
            submitted_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.submitted_id.is_some() {
            SessionState::Submitted
        } else if self.ledger.is_submittable() {
            SessionState::Submittable
        } else if self.touched {
            SessionState::Building
        } else {
            SessionState::Empty
        }
    }

    pub fn ledger(&self) -> &AllocationLedger {
        &self.ledger
    }

    /// 每个分区独立的搜索闸门，两个分区的搜索互不作废
    pub fn search_gate(&self, bucket: Bucket) -> Arc<SearchGate> {
        match bucket {
            Bucket::Primary => self.primary_gate.clone(),
            Bucket::Supplemental => self.supplemental_gate.clone(),
        }
    }

    pub fn submitted_id(&self) -> Option<i64> {
        self.submitted_id
    }

    fn ensure_open(&self) -> LedgerResult<()> {
        if self.submitted_id.is_some() {
            return Err(LedgerError::AlreadySubmitted);
        }
        Ok(())
    }

    /// 选中某分区的来源单据
    pub fn select_document(&mut self, bucket: Bucket, document: SourceDocument) -> LedgerResult<()> {
        self.ensure_open()?;
        tracing::info!(
            "Selected {} document {} ({})",
            bucket, document.id, document.reference_code
        );
        self.selected.insert(bucket, document.id);
        self.documents.insert(document.id, document);
        Ok(())
    }

    pub fn selected_document(&self, bucket: Bucket) -> Option<&SourceDocument> {
        self.selected
            .get(&bucket)
            .and_then(|id| self.documents.get(id))
    }

    /// 搜索候选行前的检查: 分区必须已选中单据
    pub fn require_document(&self, bucket: Bucket) -> LedgerResult<&SourceDocument> {
        self.selected_document(bucket)
            .ok_or(LedgerError::NoDocumentSelected(bucket))
    }

    pub fn add_row(
        &mut self,
        bucket: Bucket,
        candidate: &CandidateLineItem,
        counterpart: Option<&CounterpartPrice>,
    ) -> LedgerResult<AllocationRow> {
        self.ensure_open()?;
        // 候选行必须来自该分区当前选中的单据
        if self.selected.get(&bucket) != Some(&candidate.source_document_id) {
            tracing::warn!(
                "Rejected row {}: document {} is not the selected {} document",
                candidate.item_code, candidate.source_document_id, bucket
            );
            return Err(LedgerError::UnknownDocument(candidate.source_document_id));
        }
        let row = self.ledger.add_row(candidate, counterpart, bucket)?;
        self.touched = true;
        Ok(row)
    }

    pub fn remove_row(
        &mut self,
        bucket: Bucket,
        source_document_id: i64,
        item_code: &str,
    ) -> LedgerResult<bool> {
        self.ensure_open()?;
        let removed = self.ledger.remove_row(source_document_id, item_code, bucket);
        self.touched = true;
        Ok(removed)
    }

    pub fn set_additional_cost(&mut self, cost: BigDecimal) -> LedgerResult<()> {
        self.ensure_open()?;
        self.ledger.set_additional_cost(cost)?;
        self.touched = true;
        Ok(())
    }

    /// 由账本和汇总组装提交记录，空账本直接拒绝
    pub fn build_submission(
        &self,
        date: NaiveDate,
        note: Option<String>,
    ) -> LedgerResult<AllocationSubmission> {
        self.ensure_open()?;
        if !self.ledger.is_submittable() {
            return Err(LedgerError::EmptyLedgerSubmission);
        }

        // 按行出现顺序收集 (分区, 单据)
        let mut seen: IndexSet<(Bucket, i64)> = IndexSet::new();
        for bucket in Bucket::ALL {
            for row in self.ledger.rows(bucket) {
                seen.insert((bucket, row.source_document_id));
            }
        }
        let sources = seen
            .into_iter()
            .map(|(bucket, document_id)| SourceReference {
                bucket,
                document_id,
                reference_code: self
                    .documents
                    .get(&document_id)
                    .map(|d| d.reference_code.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(AllocationSubmission {
            header: SubmissionHeader {
                date,
                sources,
                additional_cost: self.ledger.additional_cost().clone(),
                note,
            },
            rows: self.ledger.tagged_rows(),
            summary: self.ledger.summary().clone(),
            primary_subtotal: self.ledger.bucket_subtotal(Bucket::Primary),
            supplemental_subtotal: self.ledger.bucket_subtotal(Bucket::Supplemental),
        })
    }

    /// 提交到持久化边界，成功后会话终止
    pub async fn submit(
        &mut self,
        store: &dyn AllocationStore,
        date: NaiveDate,
        note: Option<String>,
    ) -> LedgerResult<(i64, AllocationSubmission)> {
        let submission = match self.build_submission(date, note) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("提交被拒绝: {}", e);
                return Err(e);
            }
        };

        let id = store.persist(&submission).await?;
        self.submitted_id = Some(id);
        tracing::info!(
            "Allocation {} submitted: {} rows, total_cost={}, total_sales={}, margin={}%",
            id,
            submission.summary.row_count,
            submission.summary.total_cost,
            submission.summary.total_sales,
            submission.summary.margin_percent
        );
        Ok((id, submission))
    }
}

impl Default for CompositionSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryDirectory;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
    }

    fn document(id: i64, code: &str) -> SourceDocument {
        SourceDocument {
            id,
            date: date(),
            counterparty_name: "CV Maju".to_string(),
            reference_code: code.to_string(),
        }
    }

    fn candidate(doc: i64, code: &str, qty: &str, cost: &str) -> CandidateLineItem {
        CandidateLineItem {
            source_document_id: doc,
            item_code: code.to_string(),
            item_name: code.to_string(),
            quantity: dec(qty),
            unit: "KG".to_string(),
            unit_cost: dec(cost),
            remark: Some("gudang 2".to_string()),
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut session = CompositionSession::new();
        assert_eq!(session.state(), SessionState::Empty);

        session.select_document(Bucket::Primary, document(1, "PO-1")).unwrap();
        session.add_row(Bucket::Primary, &candidate(1, "A", "1", "10"), None).unwrap();
        assert_eq!(session.state(), SessionState::Submittable);

        session.remove_row(Bucket::Primary, 1, "A").unwrap();
        assert_eq!(session.state(), SessionState::Building);
    }

    #[test]
    fn test_unknown_document_rejected() {
        let mut session = CompositionSession::new();
        let err = session
            .add_row(Bucket::Primary, &candidate(9, "A", "1", "10"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownDocument(9)));
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.require_document(Bucket::Primary).is_err());
    }

    #[test]
    fn test_row_must_come_from_bucket_selected_document() {
        let mut session = CompositionSession::new();
        session.select_document(Bucket::Primary, document(1, "DO-1")).unwrap();
        session.select_document(Bucket::Supplemental, document(2, "DO-2")).unwrap();

        // 追加单的行不能进入主分区
        let err = session
            .add_row(Bucket::Primary, &candidate(2, "B", "1", "10"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownDocument(2)));
        let err = session
            .add_row(Bucket::Supplemental, &candidate(1, "A", "1", "10"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownDocument(1)));

        // 主分区换单后，旧单据的行不再接受
        session.add_row(Bucket::Primary, &candidate(1, "A", "1", "10"), None).unwrap();
        session.select_document(Bucket::Primary, document(3, "DO-3")).unwrap();
        let err = session
            .add_row(Bucket::Primary, &candidate(1, "C", "1", "10"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownDocument(1)));
        session.add_row(Bucket::Primary, &candidate(3, "C", "1", "10"), None).unwrap();

        let submission = session.build_submission(date(), None).unwrap();
        let primary: Vec<i64> = submission
            .header
            .sources
            .iter()
            .filter(|s| s.bucket == Bucket::Primary)
            .map(|s| s.document_id)
            .collect();
        assert_eq!(primary, vec![1, 3]);
        assert!(submission.rows_in(Bucket::Primary).all(|r| r.row.source_document_id != 2));
    }

    #[test]
    fn test_search_gates_are_per_bucket() {
        let session = CompositionSession::new();
        let primary = session.search_gate(Bucket::Primary);
        let supplemental = session.search_gate(Bucket::Supplemental);

        let p = primary.begin();
        let s = supplemental.begin();
        assert!(primary.is_current(p));
        assert!(supplemental.is_current(s));

        // 同一分区的新搜索作废旧响应
        let p2 = session.search_gate(Bucket::Primary).begin();
        assert!(!primary.is_current(p));
        assert!(primary.is_current(p2));
        assert!(supplemental.is_current(s));
    }

    #[test]
    fn test_build_submission_collects_sources_in_row_order() {
        let mut session = CompositionSession::new();
        session.select_document(Bucket::Primary, document(1, "DO-1")).unwrap();
        session.select_document(Bucket::Supplemental, document(2, "DO-2")).unwrap();
        session.add_row(Bucket::Primary, &candidate(1, "A", "2", "50"), None).unwrap();
        session.add_row(Bucket::Supplemental, &candidate(2, "B", "1", "30"), None).unwrap();
        session.add_row(Bucket::Primary, &candidate(1, "C", "1", "5"), None).unwrap();
        session.set_additional_cost(dec("25")).unwrap();

        let submission = session.build_submission(date(), Some("ongkir".into())).unwrap();
        let refs: Vec<(Bucket, &str)> = submission
            .header
            .sources
            .iter()
            .map(|s| (s.bucket, s.reference_code.as_str()))
            .collect();
        assert_eq!(refs, vec![(Bucket::Primary, "DO-1"), (Bucket::Supplemental, "DO-2")]);
        assert_eq!(submission.rows.len(), 3);
        assert_eq!(submission.rows_in(Bucket::Primary).count(), 2);
        assert_eq!(submission.header.additional_cost, dec("25"));
        assert_eq!(submission.summary.total_cost, dec("135"));
        assert_eq!(submission.primary_subtotal.total_cost, dec("105"));

        // 相同状态重复组装结果一致
        assert_eq!(submission, session.build_submission(date(), Some("ongkir".into())).unwrap());
    }

    #[tokio::test]
    async fn test_empty_submission_never_reaches_store() {
        let store = InMemoryDirectory::new();
        let mut session = CompositionSession::new();
        let err = session.submit(&store, date(), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::EmptyLedgerSubmission));
        assert!(store.submissions().is_empty());
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[tokio::test]
    async fn test_submitted_session_is_terminal() {
        let store = InMemoryDirectory::new();
        let mut session = CompositionSession::new();
        session.select_document(Bucket::Primary, document(1, "QT-1")).unwrap();
        session.add_row(Bucket::Primary, &candidate(1, "A", "1", "10"), None).unwrap();

        let (id, _) = session.submit(&store, date(), None).await.unwrap();
        assert_eq!(session.state(), SessionState::Submitted);
        assert_eq!(session.submitted_id(), Some(id));
        assert_eq!(store.submissions().len(), 1);

        let err = session
            .add_row(Bucket::Primary, &candidate(1, "B", "1", "10"), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadySubmitted));
        assert!(session.submit(&store, date(), None).await.is_err());
        assert_eq!(store.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_session_open() {
        let store = InMemoryDirectory::new();
        store.set_unavailable(true);
        let mut session = CompositionSession::new();
        session.select_document(Bucket::Primary, document(1, "QT-1")).unwrap();
        session.add_row(Bucket::Primary, &candidate(1, "A", "1", "10"), None).unwrap();

        let err = session.submit(&store, date(), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
        assert_eq!(session.state(), SessionState::Submittable);
        assert_eq!(session.ledger().len(), 1);

        store.set_unavailable(false);
        assert!(session.submit(&store, date(), None).await.is_ok());
    }
}
