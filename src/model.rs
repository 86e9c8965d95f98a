//! Domain data flowing through the resolution engine: stream events, fetch
//! identities, and the JSON-backed resources fetched and republished.

pub mod event;
pub mod key;
pub mod resource;

pub use event::{DateRange, Event, EventMetadata, LoadEvent, PublishEvent, Trigger};
pub use key::{FetchArgs, RequestKey};
pub use resource::{CanonicalResource, Resource, ResourceType};
