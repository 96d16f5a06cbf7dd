use crate::db::queries;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AllocationSubmission, CandidateLineItem, CounterpartPrice, Page, SearchQuery, SourceDocument,
};
use crate::service::ports::{AllocationStore, CounterpartPriceSource, MaterialSearch};
use async_trait::async_trait;
use sqlx::PgPool;

/// PostgreSQL 实现: 单据/物料搜索、对照价格、分摊单持久化
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn limit_of(query: &SearchQuery) -> Option<i64> {
    query.page_size.limit().map(i64::from)
}

#[async_trait]
impl MaterialSearch for PgDirectory {
    async fn search_documents(&self, query: &SearchQuery) -> LedgerResult<Page<SourceDocument>> {
        let total = queries::count_documents(&self.pool, &query.text)
            .await
            .map_err(LedgerError::lookup)?;
        let items = queries::search_documents(
            &self.pool,
            &query.text,
            limit_of(query),
            query.offset() as i64,
        )
        .await
        .map_err(LedgerError::lookup)?;
        Ok(Page::from_parts(items, query, total.max(0) as u64))
    }

    async fn search_candidates(
        &self,
        source_document_id: i64,
        query: &SearchQuery,
    ) -> LedgerResult<Page<CandidateLineItem>> {
        let total = queries::count_candidate_items(&self.pool, source_document_id, &query.text)
            .await
            .map_err(LedgerError::lookup)?;
        let items = queries::search_candidate_items(
            &self.pool,
            source_document_id,
            &query.text,
            limit_of(query),
            query.offset() as i64,
        )
        .await
        .map_err(LedgerError::lookup)?;
        Ok(Page::from_parts(items, query, total.max(0) as u64))
    }
}

#[async_trait]
impl CounterpartPriceSource for PgDirectory {
    async fn find_price(
        &self,
        item_code: &str,
        reference: &str,
    ) -> LedgerResult<Option<CounterpartPrice>> {
        queries::find_counterpart_price(&self.pool, item_code, reference)
            .await
            .map_err(LedgerError::lookup)
    }
}

#[async_trait]
impl AllocationStore for PgDirectory {
    async fn persist(&self, submission: &AllocationSubmission) -> LedgerResult<i64> {
        queries::insert_allocation(&self.pool, submission)
            .await
            .map_err(LedgerError::persistence)
    }
}
