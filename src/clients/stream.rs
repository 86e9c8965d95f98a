use crate::model::Event;
use anyhow::Result;
use futures::future::BoxFuture;

pub trait EventStreamClient: Send + Sync {
    /// Returns the next batch for `group_id`; an empty batch means nothing is pending.
    fn poll_events<'a>(&'a self, group_id: &'a str) -> BoxFuture<'a, Result<Vec<Event>>>;

    /// Acknowledges a batch previously returned by [`EventStreamClient::poll_events`].
    fn mark_consumed<'a>(
        &'a self,
        group_id: &'a str,
        events: &'a [Event],
    ) -> BoxFuture<'a, Result<()>>;
}
