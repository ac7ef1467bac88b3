//! One trigger, at most one advanced article.
//!
//! An invocation walks `find → claim → analyze → publish → finish`:
//!
//! 1. Find a `received` candidate, unless the trigger names one.
//! 2. Claim it with the conditional write `received → claimed`. Losing the
//!    race sends us back to step 1, at most `max_conflict_retries` times.
//! 3. Run the analyzer and store its annotations, best effort.
//! 4. Publish the id downstream.
//! 5. Finish with `claimed → processed_for_integration`.
//!
//! If step 4 fails the article stays `claimed` and the error is returned as
//! retryable. A redelivered trigger will not see the article again because it
//! is no longer `received`; the [`Reconciler`](super::Reconciler) picks it up
//! once it has been `claimed` for longer than its staleness window. Nothing is
//! rolled back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, Span, error, info, warn};

use super::bounded;
use crate::analysis::{Analyzer, NoopAnalyzer};
use crate::bus::Publisher;
use crate::error::{Error, Result};
use crate::model::{Content, ItemId, ItemStatus, Trigger};
use crate::store::{TransitionOutcome, WorkItemStore};
use crate::telemetry::metrics;
use crate::telemetry::stage::{
    record_item, record_outcome, record_state_transition, start_run_span,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Downstream channel notified for every advanced article.
    pub channel: String,
    /// Deadline for each store call.
    pub store_timeout: Duration,
    /// Overall deadline for handing one id to the publisher, retries included.
    pub publish_timeout: Duration,
    /// Deadline for the analyzer. An analyzer that runs over is skipped.
    pub analysis_timeout: Duration,
    /// How many times a lost claim race may send us back to find another candidate.
    pub max_conflict_retries: u32,
}

impl EngineConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            store_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(30),
            analysis_timeout: Duration::from_secs(10),
            max_conflict_retries: 1,
        }
    }

    /// Longest time a live invocation can keep an article in `claimed`:
    /// read-back, analysis, annotation write, then publish.
    pub fn claim_hold_limit(&self) -> Duration {
        self.store_timeout.saturating_mul(2) + self.analysis_timeout + self.publish_timeout
    }
}

/// Successful end of an invocation. Both variants acknowledge the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The article was claimed and the next stage notified.
    Advanced { id: ItemId },
    /// Nothing to do.
    NoCandidate(NoCandidateReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoCandidateReason {
    /// No article in `received` status.
    Empty,
    /// Another invocation claimed the candidate and no other one was left.
    LostRace,
    /// The candidate vanished before it could be claimed.
    NotFound,
    /// The targeted article is already past `received`.
    AlreadyAdvanced,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Advanced { .. } => "advanced",
            RunOutcome::NoCandidate(_) => "no_candidate",
        }
    }
}

enum Claim {
    Won { id: ItemId, content: Option<Content> },
    Lost(NoCandidateReason),
}

pub struct ClaimEngine {
    store: Arc<dyn WorkItemStore>,
    publisher: Arc<dyn Publisher>,
    analyzer: Arc<dyn Analyzer>,
    config: EngineConfig,
}

impl ClaimEngine {
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        publisher: Arc<dyn Publisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            analyzer: Arc::new(NoopAnalyzer),
            config,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the store answers within `store_timeout`.
    pub async fn ping(&self) -> Result<()> {
        bounded("ping", self.config.store_timeout, self.store.ping()).await
    }

    /// Handle one trigger.
    ///
    /// `Ok` means the trigger can be acknowledged. `Err` carries the reason;
    /// [`Error::is_retryable`] says whether redelivery could help.
    pub async fn run(&self, trigger: &Trigger) -> Result<RunOutcome> {
        let span = start_run_span(trigger.message_id.as_deref());
        let started = Instant::now();

        let result = self
            .advance(trigger, &span)
            .instrument(span.clone())
            .await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        record_outcome(&span, label);
        metrics::runs().add(1, &[KeyValue::new("outcome", label)]);
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "stage.run")],
        );
        result
    }

    async fn advance(&self, trigger: &Trigger, span: &Span) -> Result<RunOutcome> {
        let claim = match &trigger.target {
            Some(id) => self.claim_target(id, span).await?,
            None => self.claim_any(span).await?,
        };
        let (id, content) = match claim {
            Claim::Won { id, content } => (id, content),
            Claim::Lost(reason) => {
                info!(?reason, "no candidate to advance");
                return Ok(RunOutcome::NoCandidate(reason));
            }
        };

        if let Some(content) = content {
            self.analyze(&id, &content).await;
        }

        if let Err(e) = self.notify(&id).await {
            error!(item.id = %id, error = %e, "article claimed but downstream not notified; left for reconciliation");
            return Err(e);
        }
        record_state_transition(span, "claimed", "notified");

        self.finish(&id, span).await;
        info!(item.id = %id, channel = %self.config.channel, "article advanced");
        Ok(RunOutcome::Advanced { id })
    }

    /// Find-and-claim with bounded retry on lost races.
    async fn claim_any(&self, span: &Span) -> Result<Claim> {
        let mut conflicts = 0u32;
        loop {
            let candidate = bounded(
                "find_candidate",
                self.config.store_timeout,
                self.store.find_candidate(ItemStatus::Received),
            )
            .await?;

            let Some(candidate) = candidate else {
                let reason = if conflicts == 0 {
                    NoCandidateReason::Empty
                } else {
                    NoCandidateReason::LostRace
                };
                return Ok(Claim::Lost(reason));
            };
            record_item(span, candidate.id.as_str());

            match self.claim(&candidate.id, span).await? {
                TransitionOutcome::Applied => {
                    return Ok(Claim::Won {
                        id: candidate.id,
                        content: Some(candidate.content),
                    });
                }
                TransitionOutcome::NotFound => {
                    return Ok(Claim::Lost(NoCandidateReason::NotFound));
                }
                TransitionOutcome::Conflict => {
                    conflicts += 1;
                    metrics::claim_conflicts().add(1, &[]);
                    info!(item.id = %candidate.id, conflicts, "lost claim race");
                    if conflicts > self.config.max_conflict_retries {
                        return Err(Error::Contended {
                            attempts: conflicts,
                        });
                    }
                }
            }
        }
    }

    /// Claim the exact article a trigger named. No fallback to other candidates.
    ///
    /// The conditional write goes first: an article past `received` may carry a
    /// status owned by a later stage, which this stage never needs to read.
    async fn claim_target(&self, id: &ItemId, span: &Span) -> Result<Claim> {
        record_item(span, id.as_str());
        match self.claim(id, span).await? {
            TransitionOutcome::Applied => {}
            TransitionOutcome::Conflict => {
                info!(item.id = %id, "targeted article is not received");
                return Ok(Claim::Lost(NoCandidateReason::AlreadyAdvanced));
            }
            TransitionOutcome::NotFound => return Ok(Claim::Lost(NoCandidateReason::NotFound)),
        }

        let content = match bounded(
            "get_by_id",
            self.config.store_timeout,
            self.store.get_by_id(id),
        )
        .await
        {
            Ok(article) => article.map(|a| a.content),
            Err(e) => {
                warn!(item.id = %id, error = %e, "claimed article could not be read back; skipping analysis");
                None
            }
        };
        Ok(Claim::Won {
            id: id.clone(),
            content,
        })
    }

    async fn claim(&self, id: &ItemId, span: &Span) -> Result<TransitionOutcome> {
        let outcome = self
            .transition(id, ItemStatus::Received, ItemStatus::Claimed)
            .await?;
        if outcome == TransitionOutcome::Applied {
            record_state_transition(span, "received", "claimed");
        }
        Ok(outcome)
    }

    async fn transition(
        &self,
        id: &ItemId,
        from: ItemStatus,
        to: ItemStatus,
    ) -> Result<TransitionOutcome> {
        if !from.can_advance_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let outcome = bounded(
            "transition",
            self.config.store_timeout,
            self.store.transition(id, from, to, Utc::now()),
        )
        .await?;
        if outcome == TransitionOutcome::Applied {
            metrics::state_transitions().add(
                1,
                &[
                    KeyValue::new("from", from.as_str()),
                    KeyValue::new("to", to.as_str()),
                ],
            );
        }
        Ok(outcome)
    }

    /// Analysis is a side channel: failures are logged, never surfaced.
    async fn analyze(&self, id: &ItemId, content: &Content) {
        let classified =
            tokio::time::timeout(self.config.analysis_timeout, self.analyzer.classify(content))
                .await;
        let annotations = match classified {
            Ok(Ok(Some(annotations))) => annotations,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                warn!(item.id = %id, error = %e, "analysis failed");
                return;
            }
            Err(_) => {
                warn!(item.id = %id, timeout = ?self.config.analysis_timeout, "analysis timed out");
                return;
            }
        };
        let written = bounded(
            "annotate",
            self.config.store_timeout,
            self.store.annotate(id, &annotations),
        )
        .await;
        if let Err(e) = written {
            warn!(item.id = %id, error = %e, "failed to store analysis");
        }
    }

    async fn notify(&self, id: &ItemId) -> Result<()> {
        let channel = self.config.channel.as_str();
        match tokio::time::timeout(
            self.config.publish_timeout,
            self.publisher.publish(channel, id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Publish {
                channel: channel.to_string(),
                item_id: id.to_string(),
                reason: format!("timed out after {:?}", self.config.publish_timeout),
            }),
        }
    }

    /// The notification already went out, so failures here only delay the
    /// status change until the next sweep.
    async fn finish(&self, id: &ItemId, span: &Span) {
        match self
            .transition(id, ItemStatus::Claimed, ItemStatus::ProcessedForIntegration)
            .await
        {
            Ok(TransitionOutcome::Applied) => {
                record_state_transition(span, "claimed", "processed_for_integration");
            }
            Ok(other) => {
                warn!(item.id = %id, outcome = ?other, "article changed under us after notify");
            }
            Err(e) => {
                warn!(item.id = %id, error = %e, "notified but could not mark processed; sweep will finish it");
            }
        }
    }
}
