//! Resume articles that were claimed but never handed downstream.
//!
//! An article sits in `claimed` only between a successful claim and the end of
//! the publish step. One that has been there longer than `stale_after` belongs
//! to an invocation that failed or died; the sweep publishes it and finishes
//! the status change. `stale_after` must exceed the engine's claim hold limit
//! (see [`ReconcileConfig::check_window`]), otherwise the sweep can race a
//! live invocation and notify twice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};

use super::EngineConfig;
use super::bounded;
use crate::bus::Publisher;
use crate::error::{Error, Result};
use crate::model::{Article, ItemStatus};
use crate::store::{TransitionOutcome, WorkItemStore};
use crate::telemetry::metrics;
use crate::telemetry::stage::{record_state_transition, start_sweep_span};

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub channel: String,
    pub stale_after: Duration,
    pub batch_size: usize,
    pub store_timeout: Duration,
}

impl ReconcileConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            stale_after: Duration::from_secs(300),
            batch_size: 100,
            store_timeout: Duration::from_secs(5),
        }
    }

    /// The sweep must not touch an article a live invocation still holds.
    pub fn check_window(&self, engine: &EngineConfig) -> Result<()> {
        let hold = engine.claim_hold_limit();
        if self.stale_after <= hold {
            return Err(Error::Config(format!(
                "stale_after ({:?}) must exceed the longest claim hold ({hold:?})",
                self.stale_after
            )));
        }
        Ok(())
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    /// Published and marked processed.
    pub resumed: usize,
    /// Finished by someone else while we were looking.
    pub skipped: usize,
    /// Left `claimed` for the next sweep.
    pub failed: usize,
}

enum Resumed {
    Done,
    Skipped,
}

pub struct Reconciler {
    store: Arc<dyn WorkItemStore>,
    publisher: Arc<dyn Publisher>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        publisher: Arc<dyn Publisher>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Run one pass over stale `claimed` articles.
    ///
    /// Fails only if the stale set cannot be listed. Per-article failures are
    /// counted in the report and retried on the next pass.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let span = start_sweep_span();
        let started = Instant::now();

        let report = async {
            let stale_after = chrono::Duration::from_std(self.config.stale_after)
                .map_err(|e| Error::Config(format!("stale_after out of range: {e}")))?;
            let cutoff = Utc::now() - stale_after;

            let stale = bounded(
                "find_stale",
                self.config.store_timeout,
                self.store
                    .find_stale(ItemStatus::Claimed, cutoff, self.config.batch_size),
            )
            .await?;

            let mut report = SweepReport {
                examined: stale.len(),
                ..SweepReport::default()
            };
            for article in &stale {
                let result = match self.resume(article).await {
                    Ok(Resumed::Done) => {
                        report.resumed += 1;
                        "resumed"
                    }
                    Ok(Resumed::Skipped) => {
                        report.skipped += 1;
                        "skipped"
                    }
                    Err(e) => {
                        warn!(item.id = %article.id, error = %e, "could not resume claimed article");
                        report.failed += 1;
                        "failed"
                    }
                };
                metrics::reconcile_items().add(1, &[KeyValue::new("result", result)]);
            }
            Ok::<_, Error>(report)
        }
        .instrument(span.clone())
        .await?;

        span.record("reconcile.examined", report.examined);
        span.record("reconcile.resumed", report.resumed);
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "stage.reconcile")],
        );
        if report.examined > 0 {
            info!(?report, "reconciliation sweep finished");
        }
        Ok(report)
    }

    async fn resume(&self, article: &Article) -> Result<Resumed> {
        self.publisher
            .publish(&self.config.channel, &article.id)
            .await?;

        let outcome = bounded(
            "transition",
            self.config.store_timeout,
            self.store.transition(
                &article.id,
                ItemStatus::Claimed,
                ItemStatus::ProcessedForIntegration,
                Utc::now(),
            ),
        )
        .await?;

        Ok(match outcome {
            TransitionOutcome::Applied => {
                metrics::state_transitions().add(
                    1,
                    &[
                        KeyValue::new("from", ItemStatus::Claimed.as_str()),
                        KeyValue::new("to", ItemStatus::ProcessedForIntegration.as_str()),
                    ],
                );
                record_state_transition(
                    &tracing::Span::current(),
                    "claimed",
                    "processed_for_integration",
                );
                info!(item.id = %article.id, "resumed claimed article");
                Resumed::Done
            }
            TransitionOutcome::Conflict | TransitionOutcome::NotFound => Resumed::Skipped,
        })
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run_periodic(&self, interval: Duration, shutdown: Arc<Notify>) {
        info!(?interval, stale_after = ?self.config.stale_after, "reconciliation sweep started");
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("reconciliation sweep shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep().await {
                        error!("reconciliation sweep error: {e}");
                    }
                }
            }
        }
    }
}
