pub mod dag;
pub mod report;
pub mod stage;

pub use dag::{CompletenessDagPublisher, DEFAULT_DAG_TOPIC};
pub use report::{KeyFailure, PublishReport, UNKNOWN_RESOURCE_ID};
pub use stage::{StagedResults, TransformPublishStage};
