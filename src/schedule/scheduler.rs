use crate::clients::TenantConfigStore;
use crate::schedule::window::{evaluate, WindowState};
use anyhow::{Context, Result};
use chrono::{DateTime, Offset, Utc};
use std::sync::Arc;

/// Decides whether a tenant's scheduled job should run at a given instant.
///
/// The read of the last-run marker and the following write are not atomic;
/// one scheduler instance per deployment is assumed.
#[derive(Clone)]
pub struct AvailabilityWindowScheduler {
    store: Arc<dyn TenantConfigStore>,
}

impl AvailabilityWindowScheduler {
    pub fn new(store: Arc<dyn TenantConfigStore>) -> Self {
        Self { store }
    }

    /// Current window state without touching the persisted marker.
    pub async fn state(&self, tenant: &str, now: DateTime<Utc>) -> Result<WindowState> {
        let window = self
            .store
            .availability_window(tenant)
            .await
            .with_context(|| format!("failed to load availability window for {tenant}"))?;
        let offset = self
            .store
            .tenant_offset(tenant)
            .await
            .with_context(|| format!("failed to load utc offset for {tenant}"))?
            .unwrap_or_else(|| Utc.fix());
        let last_run = self
            .store
            .last_run_marker(tenant)
            .await
            .with_context(|| format!("failed to load last run marker for {tenant}"))?;

        Ok(evaluate(now, offset, window.as_ref(), last_run))
    }

    /// Returns `true` at most once per window occurrence.
    ///
    /// The marker is written before returning `true`, so a job that crashes
    /// midway is not re-entered within the same window.
    pub async fn should_run(&self, tenant: &str, now: DateTime<Utc>) -> Result<bool> {
        let state = self.state(tenant, now).await?;
        tracing::debug!(tenant, %now, state = %state, "availability window evaluated");

        if !state.should_run() {
            return Ok(false);
        }

        self.store
            .set_last_run_marker(tenant, now)
            .await
            .with_context(|| format!("failed to persist last run marker for {tenant}"))?;
        tracing::info!(tenant, %now, "tenant scheduled run starting");
        Ok(true)
    }
}
