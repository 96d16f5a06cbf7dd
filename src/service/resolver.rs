use crate::error::{LedgerError, LedgerResult};
use crate::models::{CandidateLineItem, CounterpartPrice, Page, PageSize, SearchQuery, SourceDocument};
use crate::service::ports::{CounterpartPriceSource, MaterialSearch};
use futures::future::try_join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 搜索票据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

/// 最新请求闸门 - 只有最后一次发起的搜索结果可以被采用
#[derive(Debug, Default)]
pub struct SearchGate {
    latest: AtomicU64,
}

impl SearchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发起新搜索，之前所有票据随即过期
    pub fn begin(&self) -> SearchTicket {
        SearchTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// 候选行解析器
///
/// 只读路径：搜索单据和物料、查询对照价格，不修改账本。
pub struct CandidateResolver {
    search: Arc<dyn MaterialSearch>,
    prices: Arc<dyn CounterpartPriceSource>,
    max_page_size: u32,
}

impl CandidateResolver {
    pub fn new(
        search: Arc<dyn MaterialSearch>,
        prices: Arc<dyn CounterpartPriceSource>,
        max_page_size: u32,
    ) -> Self {
        Self {
            search,
            prices,
            max_page_size,
        }
    }

    fn query(&self, text: &str, page: u32, page_size: PageSize) -> SearchQuery {
        SearchQuery::new(text.trim(), page, page_size.capped(self.max_page_size))
    }

    /// 搜索来源单据
    pub async fn search_documents(
        &self,
        text: &str,
        page: u32,
        page_size: PageSize,
    ) -> LedgerResult<Page<SourceDocument>> {
        let query = self.query(text, page, page_size);
        let result = self.search.search_documents(&query).await.map_err(|e| {
            tracing::error!("单据搜索失败 query={:?}: {}", query.text, e);
            e
        })?;
        ensure_consistent(&result, "document search")?;
        tracing::info!(
            "Document search '{}' page {}/{}: {} of {}",
            query.text, result.current_page, result.last_page, result.items.len(), result.total
        );
        Ok(result)
    }

    /// 搜索单据上的候选物料
    pub async fn search_candidates(
        &self,
        source_document_id: i64,
        text: &str,
        page: u32,
        page_size: PageSize,
    ) -> LedgerResult<Page<CandidateLineItem>> {
        let query = self.query(text, page, page_size);
        let result = self
            .search
            .search_candidates(source_document_id, &query)
            .await
            .map_err(|e| {
                tracing::error!(
                    "物料搜索失败 document={} query={:?}: {}",
                    source_document_id, query.text, e
                );
                e
            })?;
        ensure_consistent(&result, "candidate search")?;

        if let Some(stray) = result
            .items
            .iter()
            .find(|item| item.source_document_id != source_document_id)
        {
            return Err(LedgerError::LookupFailure(format!(
                "candidate search for document {} returned item {} of document {}",
                source_document_id, stray.item_code, stray.source_document_id
            )));
        }

        tracing::info!(
            "Candidate search document {} '{}' page {}/{}: {} of {}",
            source_document_id,
            query.text,
            result.current_page,
            result.last_page,
            result.items.len(),
            result.total
        );
        Ok(result)
    }

    /// 发起搜索并只在仍是最新请求时返回结果，过期响应返回 None
    pub async fn search_latest(
        &self,
        gate: &SearchGate,
        source_document_id: i64,
        text: &str,
        page: u32,
        page_size: PageSize,
    ) -> LedgerResult<Option<Page<CandidateLineItem>>> {
        let ticket = gate.begin();
        let result = self
            .search_candidates(source_document_id, text, page, page_size)
            .await;

        if !gate.is_current(ticket) {
            tracing::warn!(
                "丢弃过期搜索响应: document={} query={:?} ticket={:?}",
                source_document_id, text, ticket
            );
            return Ok(None);
        }
        result.map(Some)
    }

    /// 查询对照价格，找不到不是错误
    pub async fn resolve_counterpart_price(
        &self,
        item_code: &str,
        reference: &str,
    ) -> LedgerResult<Option<CounterpartPrice>> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }
        let price = self.prices.find_price(item_code, reference).await?;
        if price.is_none() {
            tracing::debug!("No counterpart price for {} under {}", item_code, reference);
        }
        Ok(price)
    }

    /// 并发查询一页候选行的对照价格，顺序与输入一致
    pub async fn resolve_page_prices(
        &self,
        items: &[CandidateLineItem],
        reference: &str,
    ) -> LedgerResult<Vec<Option<CounterpartPrice>>> {
        try_join_all(
            items
                .iter()
                .map(|item| self.resolve_counterpart_price(&item.item_code, reference)),
        )
        .await
    }
}

fn ensure_consistent<T>(page: &Page<T>, what: &str) -> LedgerResult<()> {
    if page.is_consistent() {
        return Ok(());
    }
    Err(LedgerError::LookupFailure(format!(
        "{} returned inconsistent pagination: page {}/{} total {} with {} items",
        what,
        page.current_page,
        page.last_page,
        page.total,
        page.items.len()
    )))
}
