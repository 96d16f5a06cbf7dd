use crate::models::Bucket;
use thiserror::Error;

/// 分摊账本错误
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 查询服务不可用或返回非成功结果 (可重试)
    #[error("Lookup failed: {0}")]
    LookupFailure(String),

    /// 同一分区内 (单据, 物料) 已存在
    #[error("Item {item_code} of document {source_document_id} already added to {bucket} bucket")]
    DuplicateKey {
        source_document_id: i64,
        item_code: String,
        bucket: Bucket,
    },

    /// 空账本提交
    #[error("Nothing to allocate: ledger is empty")]
    EmptyLedgerSubmission,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid line {item_code}: {reason}")]
    InvalidLine { item_code: String, reason: String },

    /// 候选行所属单据未在当前会话中选中
    #[error("Source document {0} has not been selected in this session")]
    UnknownDocument(i64),

    #[error("No {0} document selected")]
    NoDocumentSelected(Bucket),

    #[error("Session already submitted")]
    AlreadySubmitted,

    #[error("Session {0} not found")]
    SessionNotFound(u64),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn lookup(err: impl std::fmt::Display) -> Self {
        Self::LookupFailure(err.to_string())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_line(item_code: &str, reason: impl Into<String>) -> Self {
        Self::InvalidLine {
            item_code: item_code.to_string(),
            reason: reason.into(),
        }
    }

    /// 界面据此提示 "已添加" 而不是通用失败
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// 同一查询可直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LookupFailure(_) | Self::Persistence(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
