pub mod allocation;
pub mod document;
pub mod page;
pub mod submission;
pub mod summary;

pub use allocation::{AllocationKey, AllocationRow, Bucket, RowScope};
pub use document::{CandidateLineItem, CounterpartPrice, SourceDocument};
pub use page::{Page, PageSize, SearchQuery};
pub use submission::{AllocationSubmission, SourceReference, SubmissionHeader, TaggedRow};
pub use summary::{AggregateSummary, BucketSubtotal};
