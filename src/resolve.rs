//! Request-key resolution: event classification, batch-wide deduplication,
//! backfill window splitting, fetch planning, and result demultiplexing.

pub mod classify;
pub mod dedupe;
pub mod demux;
pub mod fetch;
pub mod split;

pub use classify::{classify, try_classify, ClassificationRules, NotFoundReason};
pub use dedupe::{ClassifiedKey, DedupedKeys, DuplicateKeyConflict, KeyDeduplicator};
pub use demux::{FetchedResources, ResultDemultiplexer, ResultSet};
pub use fetch::{execute_call, plan_fetches, FetchCall, FetchExecutor, FetchPlan};
pub use split::{DateRangeSplitter, SplitError};
