//! 内存实现 - 未配置数据库时使用，也用于测试

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AllocationSubmission, CandidateLineItem, CounterpartPrice, Page, SearchQuery, SourceDocument,
};
use crate::service::ports::{AllocationStore, CounterpartPriceSource, MaterialSearch};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    documents: RwLock<Vec<SourceDocument>>,
    items: RwLock<Vec<CandidateLineItem>>,
    /// (对照单号, 物料编码) -> 单价
    prices: DashMap<(String, String), BigDecimal>,
    submissions: RwLock<Vec<(i64, AllocationSubmission)>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn matches_text(text: &str, fields: &[&str]) -> bool {
    if text.is_empty() {
        return true;
    }
    let needle = text.to_lowercase();
    fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&self, document: SourceDocument) {
        write(&self.documents).push(document);
    }

    pub fn add_item(&self, item: CandidateLineItem) {
        write(&self.items).push(item);
    }

    pub fn add_price(&self, reference: &str, item_code: &str, unit_price: BigDecimal) {
        self.prices
            .insert((reference.to_string(), item_code.to_string()), unit_price);
    }

    /// 模拟服务不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<(i64, AllocationSubmission)> {
        read(&self.submissions).clone()
    }

    fn check_available(&self) -> LedgerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::LookupFailure(
                "in-memory directory is unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MaterialSearch for InMemoryDirectory {
    async fn search_documents(&self, query: &SearchQuery) -> LedgerResult<Page<SourceDocument>> {
        self.check_available()?;
        let matched: Vec<SourceDocument> = read(&self.documents)
            .iter()
            .filter(|d| matches_text(&query.text, &[d.reference_code.as_str(), d.counterparty_name.as_str()]))
            .cloned()
            .collect();
        Ok(Page::paginate(matched, query))
    }

    async fn search_candidates(
        &self,
        source_document_id: i64,
        query: &SearchQuery,
    ) -> LedgerResult<Page<CandidateLineItem>> {
        self.check_available()?;
        let matched: Vec<CandidateLineItem> = read(&self.items)
            .iter()
            .filter(|i| i.source_document_id == source_document_id)
            .filter(|i| matches_text(&query.text, &[i.item_code.as_str(), i.item_name.as_str()]))
            .cloned()
            .collect();
        Ok(Page::paginate(matched, query))
    }
}

#[async_trait]
impl CounterpartPriceSource for InMemoryDirectory {
    async fn find_price(
        &self,
        item_code: &str,
        reference: &str,
    ) -> LedgerResult<Option<CounterpartPrice>> {
        self.check_available()?;
        Ok(self
            .prices
            .get(&(reference.to_string(), item_code.to_string()))
            .map(|price| CounterpartPrice {
                item_code: item_code.to_string(),
                reference: reference.to_string(),
                unit_price: price.value().clone(),
            }))
    }
}

#[async_trait]
impl AllocationStore for InMemoryDirectory {
    async fn persist(&self, submission: &AllocationSubmission) -> LedgerResult<i64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::persistence("in-memory store is unavailable"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        write(&self.submissions).push((id, submission.clone()));
        tracing::info!("Stored allocation {} with {} rows in memory", id, submission.rows.len());
        Ok(id)
    }
}
