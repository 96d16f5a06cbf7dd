use super::{AggregateSummary, AllocationRow, Bucket, BucketSubtotal};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 来源单据引用 (按分区)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub bucket: Bucket,
    pub document_id: i64,
    pub reference_code: String,
}

/// 提交表头
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionHeader {
    pub date: NaiveDate,
    pub sources: Vec<SourceReference>,
    pub additional_cost: BigDecimal,
    pub note: Option<String>,
}

/// 带分区标记和行号的分摊行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRow {
    pub bucket: Bucket,
    pub line_no: usize,
    #[serde(flatten)]
    pub row: AllocationRow,
}

/// 提交到持久化边界的完整记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSubmission {
    pub header: SubmissionHeader,
    pub rows: Vec<TaggedRow>,
    pub summary: AggregateSummary,
    pub primary_subtotal: BucketSubtotal,
    pub supplemental_subtotal: BucketSubtotal,
}

impl AllocationSubmission {
    pub fn rows_in(&self, bucket: Bucket) -> impl Iterator<Item = &TaggedRow> {
        self.rows.iter().filter(move |r| r.bucket == bucket)
    }
}
