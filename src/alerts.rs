//! One-shot price alert evaluation
//!
//! Each alert moves `active -> inactive` exactly once, when its condition first
//! holds. The evaluator emits one `TriggerEvent` for that crossing and then
//! writes `is_active = false` back to the alert store. Prices come from the
//! provider's per-coin detail endpoint, not from the bulk snapshot.
//!
//! A trigger whose deactivation fails is remembered in-process. Later passes
//! retry the deactivation for it without fetching a price or notifying again.

use crate::{
    cache::PriceSnapshotCache,
    error::EngineError,
    lookup::DetailLookup,
    notify::NotificationSink,
    schedule::{PeriodicTask, Schedule, SingleFlight},
    store::AlertStore,
    types::{Alert, AlertCondition, AlertPatch, TriggerEvent},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Result of one pass, shared by every coalesced caller
pub type EvaluationOutcome = Result<Arc<EvaluationReport>, EngineError>;

/// An alert that could not be evaluated this pass
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAlert {
    pub alert_id: String,
    pub coin_id: String,
    pub error: EngineError,
}

/// What happened during one `evaluate_once` pass
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    /// Alerts compared against a live price
    pub evaluated: usize,
    /// Events emitted this pass, in store order
    pub triggered: Vec<TriggerEvent>,
    pub skipped: Vec<SkippedAlert>,
    /// Alerts still active in the store because deactivation failed
    pub persist_failures: Vec<String>,
    /// Earlier failed deactivations that went through this pass
    pub recovered: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Target price and condition an alert held when it fired
type TriggeredOn = (Decimal, AlertCondition);

struct EvaluatorState {
    store: Arc<AlertStore>,
    details: DetailLookup,
    sink: Arc<dyn NotificationSink>,
    /// Alerts already notified whose deactivation has not been stored yet,
    /// with the target and condition they triggered on
    undelivered: Mutex<HashMap<String, TriggeredOn>>,
}

impl EvaluatorState {
    fn undelivered(&self) -> std::sync::MutexGuard<'_, HashMap<String, TriggeredOn>> {
        self.undelivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn evaluate(&self) -> Result<EvaluationReport, EngineError> {
        let started_at = Utc::now();
        let alerts = self.store.list().await.map_err(|e| {
            tracing::warn!(error = %e, "Could not load alerts, skipping evaluation pass");
            EngineError::from(e)
        })?;

        let active: Vec<Alert> = alerts.into_iter().filter(|a| a.is_active).collect();

        let pending = {
            let mut undelivered = self.undelivered();
            // Deleted, deactivated or re-armed alerts need no further write.
            undelivered.retain(|id, (target, condition)| {
                active.iter().any(|a| {
                    &a.id == id && a.target_price == *target && a.condition == *condition
                })
            });
            undelivered.clone()
        };

        let mut report = EvaluationReport {
            evaluated: 0,
            triggered: Vec::new(),
            skipped: Vec::new(),
            persist_failures: Vec::new(),
            recovered: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        for alert in active.iter().filter(|a| pending.contains_key(&a.id)) {
            match self.deactivate(alert).await {
                Ok(()) => {
                    tracing::info!(
                        alert_id = %alert.id,
                        "Stored deactivation from an earlier trigger"
                    );
                    self.undelivered().remove(&alert.id);
                    report.recovered.push(alert.id.clone());
                }
                Err(_) => report.persist_failures.push(alert.id.clone()),
            }
        }

        let to_check: Vec<&Alert> = active
            .iter()
            .filter(|a| !pending.contains_key(&a.id))
            .collect();

        let prices = self
            .details
            .fetch_many(to_check.iter().map(|a| a.coin_id.as_str()))
            .await;

        for alert in to_check {
            let price = match prices.get(&alert.coin_id) {
                Some(Ok(quote)) if quote.current_price > Decimal::ZERO => quote.current_price,
                Some(Ok(_)) => {
                    self.skip(&mut report, alert, EngineError::not_found(&alert.coin_id));
                    continue;
                }
                Some(Err(e)) => {
                    self.skip(&mut report, alert, e.clone());
                    continue;
                }
                None => {
                    self.skip(&mut report, alert, EngineError::internal("price lookup missing"));
                    continue;
                }
            };

            report.evaluated += 1;
            if !alert.condition.is_met(price, alert.target_price) {
                continue;
            }

            let event = TriggerEvent::new(alert, price);
            tracing::info!(
                alert_id = %alert.id,
                coin_id = %alert.coin_id,
                price = %price,
                condition = %alert.condition,
                target = %alert.target_price,
                "Alert triggered"
            );

            if let Err(e) = self.sink.notify(&event).await {
                tracing::warn!(
                    alert_id = %alert.id,
                    error = %e,
                    "Trigger notification not delivered"
                );
            }

            if self.deactivate(alert).await.is_err() {
                self.undelivered()
                    .insert(alert.id.clone(), (alert.target_price, alert.condition));
                report.persist_failures.push(alert.id.clone());
            }
            report.triggered.push(event);
        }

        report.finished_at = Utc::now();
        tracing::debug!(
            evaluated = report.evaluated,
            triggered = report.triggered.len(),
            skipped = report.skipped.len(),
            persist_failures = report.persist_failures.len(),
            "Alert evaluation pass finished"
        );
        Ok(report)
    }

    async fn deactivate(&self, alert: &Alert) -> Result<(), EngineError> {
        self.store
            .update(&alert.id, AlertPatch::deactivate())
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to deactivate triggered alert"
                );
                EngineError::from(e)
            })
    }

    fn skip(&self, report: &mut EvaluationReport, alert: &Alert, error: EngineError) {
        tracing::warn!(
            alert_id = %alert.id,
            coin_id = %alert.coin_id,
            error = %error,
            transient = error.is_transient(),
            "Cannot evaluate alert this cycle"
        );
        report.skipped.push(SkippedAlert {
            alert_id: alert.id.clone(),
            coin_id: alert.coin_id.clone(),
            error,
        });
    }
}

/// Evaluates active alerts against live prices
pub struct AlertEvaluator {
    state: Arc<EvaluatorState>,
    flight: Arc<SingleFlight<EvaluationOutcome>>,
    cache: Arc<PriceSnapshotCache>,
    task: PeriodicTask,
    schedule: Schedule,
}

impl AlertEvaluator {
    /// Creates a stopped evaluator
    ///
    /// `cache` is only used to wait for the first data load before the first
    /// scheduled pass.
    pub fn new(
        store: Arc<AlertStore>,
        details: DetailLookup,
        sink: Arc<dyn NotificationSink>,
        cache: Arc<PriceSnapshotCache>,
        interval: Duration,
        start_delay: Duration,
    ) -> Self {
        Self {
            state: Arc::new(EvaluatorState {
                store,
                details,
                sink,
                undelivered: Mutex::new(HashMap::new()),
            }),
            flight: Arc::new(SingleFlight::new()),
            cache,
            task: PeriodicTask::new("alert_evaluator"),
            schedule: Schedule::every(interval).with_initial_delay(start_delay),
        }
    }

    /// Runs one pass, or joins the pass already in progress
    pub async fn evaluate_once(&self) -> EvaluationOutcome {
        Self::coalesced_pass(&self.state, &self.flight).await
    }

    async fn coalesced_pass(
        state: &Arc<EvaluatorState>,
        flight: &SingleFlight<EvaluationOutcome>,
    ) -> EvaluationOutcome {
        flight
            .run(|| {
                let state = state.clone();
                async move {
                    // A pass is never cut off between notifying and deactivating.
                    tokio::spawn(async move { state.evaluate().await.map(Arc::new) })
                        .await
                        .unwrap_or_else(|e| {
                            Err(EngineError::internal(format!("evaluation task failed: {}", e)))
                        })
                }
            })
            .await
    }

    /// Starts scheduled passes
    ///
    /// The first pass runs the start delay after the cache receives its first
    /// snapshot, or after one interval if no snapshot arrives by then.
    pub fn start(&self) -> bool {
        let state = self.state.clone();
        let flight = self.flight.clone();
        let cache = self.cache.clone();
        let interval = self.schedule.interval;

        let warmup = async move {
            if tokio::time::timeout(interval, cache.wait_for_data()).await.is_err() {
                tracing::warn!("No market data yet, evaluating alerts anyway");
            }
        };

        self.task.start(self.schedule, warmup, move || {
            let state = state.clone();
            let flight = flight.clone();
            async move {
                let _ = Self::coalesced_pass(&state, &flight).await;
            }
        })
    }

    pub fn stop(&self) -> bool {
        self.task.stop()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Alerts notified whose deactivation is still outstanding
    pub fn pending_deactivations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.undelivered().keys().cloned().collect();
        ids.sort();
        ids
    }
}
