//! Contracts of the external collaborators the engine talks to: the event
//! stream, per-type downstream data sources, the canonical transform service,
//! the publish sink, the completeness side channel, and tenant configuration.
//!
//! Every trait is object safe and returns boxed futures so implementations can
//! be shared as `Arc<dyn Trait>` across worker tasks.

pub mod completeness;
pub mod downstream;
pub mod publish;
pub mod stream;
pub mod tenant;

pub use completeness::{CompletenessClient, DagDeclaration, PushFailure, PushResult};
pub use downstream::{ResourceClient, SearchQuery};
pub use publish::{PublishSink, TransformService};
pub use stream::EventStreamClient;
pub use tenant::TenantConfigStore;
