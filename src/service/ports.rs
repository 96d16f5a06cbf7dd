//! 外部服务接口: 单据/物料搜索、对照价格、持久化

use crate::error::LedgerResult;
use crate::models::{
    AllocationSubmission, CandidateLineItem, CounterpartPrice, Page, SearchQuery, SourceDocument,
};
use async_trait::async_trait;

/// 单据/物料搜索服务
#[async_trait]
pub trait MaterialSearch: Send + Sync {
    /// 搜索可选的来源单据
    async fn search_documents(&self, query: &SearchQuery) -> LedgerResult<Page<SourceDocument>>;

    /// 搜索某张单据上的候选物料行
    async fn search_candidates(
        &self,
        source_document_id: i64,
        query: &SearchQuery,
    ) -> LedgerResult<Page<CandidateLineItem>>;
}

/// 对照价格服务，找不到价格返回 Ok(None)
#[async_trait]
pub trait CounterpartPriceSource: Send + Sync {
    async fn find_price(
        &self,
        item_code: &str,
        reference: &str,
    ) -> LedgerResult<Option<CounterpartPrice>>;
}

/// 持久化边界，返回保存后的分摊单ID
#[async_trait]
pub trait AllocationStore: Send + Sync {
    async fn persist(&self, submission: &AllocationSubmission) -> LedgerResult<i64>;
}
