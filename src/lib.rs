pub mod clients;
pub mod engine;
pub mod model;
pub mod publish;
pub mod resolve;
pub mod resources;
pub mod runtime;
pub mod schedule;

pub use clients::{
    CompletenessClient, DagDeclaration, EventStreamClient, PublishSink, PushFailure, PushResult,
    ResourceClient, SearchQuery, TenantConfigStore, TransformService,
};
pub use engine::{EngineServices, Resolution, ResolutionEngine, StrategyResolution};
pub use model::{
    CanonicalResource, DateRange, Event, EventMetadata, FetchArgs, LoadEvent, PublishEvent,
    RequestKey, Resource, ResourceType, Trigger,
};
pub use publish::{
    CompletenessDagPublisher, KeyFailure, PublishReport, StagedResults, TransformPublishStage,
};
pub use resolve::{
    ClassificationRules, DateRangeSplitter, DuplicateKeyConflict, FetchExecutor,
    KeyDeduplicator, NotFoundReason, ResultDemultiplexer, ResultSet,
};
pub use resources::{
    MedicationStatementStrategy, ObservationStrategy, ProcedureStrategy, ResourceStrategy,
};
pub use runtime::config::{EngineConfig, EngineConfigBuilder, EngineConfigParams};
pub use runtime::error::EngineError;
pub use runtime::runner::{BatchOutcome, Runner};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use schedule::{AvailabilityWindow, AvailabilityWindowScheduler, WindowState};
