use crate::schedule::AvailabilityWindow;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use futures::future::BoxFuture;

/// Read/write access to the externally persisted per-tenant settings.
pub trait TenantConfigStore: Send + Sync {
    /// `None` means the tenant has no window configured.
    fn availability_window<'a>(
        &'a self,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<Option<AvailabilityWindow>>>;

    /// Tenant-local UTC offset; `None` is treated as UTC.
    fn tenant_offset<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, Result<Option<FixedOffset>>>;

    fn last_run_marker<'a>(
        &'a self,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>>;

    fn set_last_run_marker<'a>(
        &'a self,
        tenant: &'a str,
        marker: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>>;
}
