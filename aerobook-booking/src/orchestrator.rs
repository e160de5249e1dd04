use aerobook_core::events::BookingEventPublisher;
use aerobook_core::search::SearchCriteria;
use aerobook_core::{
    BookingError, ErrorClassifier, LegDescriptor, OfferBinding, PassengerRecord, SessionStore,
    TripShape, UpstreamGateway,
};
use aerobook_shared::models::events::LegRecoveredEvent;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{LegRun, Stage};
use crate::rematch::FlightRematcher;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Attempt budget and exponential backoff for upstream calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Bound on a single upstream call; hitting it counts as a transient failure.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay before the n-th retry (1-based): `initial_delay * 2^(n-1)`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }
}

/// What one workflow lends to every upstream call of its legs.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowScope<'a> {
    pub workflow_id: Uuid,
    pub shape: TripShape,
    pub passengers: &'a [PassengerRecord],
}

/// Exists only while a session-expired failure is being recovered.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    /// The leg as originally chosen, never a rebound copy.
    pub stale: LegDescriptor,
    pub failed_binding: OfferBinding,
    pub leg_index: usize,
}

/// Wraps every Requote, Reserve and Issue call: retries transient failures with
/// backoff and replaces an expired session by re-searching and rematching the leg.
pub struct RecoveryOrchestrator {
    gateway: Arc<dyn UpstreamGateway>,
    store: Arc<dyn SessionStore>,
    rematcher: FlightRematcher,
    classifier: ErrorClassifier,
    policy: RetryPolicy,
    events: Option<Arc<dyn BookingEventPublisher>>,
}

impl RecoveryOrchestrator {
    pub fn new(gateway: Arc<dyn UpstreamGateway>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            gateway,
            store,
            rematcher: FlightRematcher::new(),
            classifier: ErrorClassifier::default(),
            policy: RetryPolicy::default(),
            events: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn BookingEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gateway(&self) -> &dyn UpstreamGateway {
        self.gateway.as_ref()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Runs `op` with the leg's current binding until it succeeds, fails for
    /// good, or the attempt budget runs out. Returns the value and the binding
    /// that produced it; a recovered binding is also left on `leg`.
    pub async fn execute<T, F, Fut>(
        &self,
        scope: &WorkflowScope<'_>,
        leg: &mut LegRun,
        stage: Stage,
        mut op: F,
    ) -> Result<(T, OfferBinding), BookingError>
    where
        F: FnMut(OfferBinding) -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let binding = leg.binding().clone();
            let failure = match timeout(self.policy.call_timeout, op(binding.clone())).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        info!(
                            workflow_id = %scope.workflow_id,
                            leg = leg.index,
                            "{} succeeded on attempt {}",
                            stage,
                            attempt
                        );
                    }
                    return Ok((value, binding));
                }
                Ok(Err(err)) => err,
                Err(_) => BookingError::Transient(format!(
                    "{} timed out after {:?}",
                    stage, self.policy.call_timeout
                )),
            };

            let retryable = failure.is_session_expired() || failure.is_transient();
            if !retryable || attempt >= max_attempts {
                error!(
                    workflow_id = %scope.workflow_id,
                    leg = leg.index,
                    attempt,
                    "{} failed: {}",
                    stage,
                    failure
                );
                return Err(failure);
            }

            let delay = self.policy.delay_before_retry(attempt);
            if failure.is_session_expired() {
                warn!(
                    workflow_id = %scope.workflow_id,
                    leg = leg.index,
                    "Session expired during {}, recovering {}",
                    stage,
                    leg.original.route()
                );
                let context = RecoveryContext {
                    stale: leg.original.clone(),
                    failed_binding: binding,
                    leg_index: leg.index,
                };
                let recovered = self.recover(scope, stage, context).await?;
                leg.adopt(recovered);
                leg.recoveries += 1;
            } else {
                warn!(
                    workflow_id = %scope.workflow_id,
                    leg = leg.index,
                    "{} attempt {} failed ({}), retrying in {:?}",
                    stage,
                    attempt,
                    failure,
                    delay
                );
            }

            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Re-searches the original leg one-way, rematches it and persists the new binding.
    async fn recover(
        &self,
        scope: &WorkflowScope<'_>,
        stage: Stage,
        context: RecoveryContext,
    ) -> Result<OfferBinding, BookingError> {
        let criteria = SearchCriteria::for_leg(&context.stale, scope.passengers);

        let result = match timeout(self.policy.call_timeout, self.gateway.search(&criteria)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                let err = self.classifier.classify(err);
                error!(
                    leg = context.leg_index,
                    stale_token = %context.failed_binding.session_token,
                    "Recovery search failed: {}",
                    err
                );
                return Err(err);
            }
            Err(_) => {
                return Err(BookingError::Transient(format!(
                    "recovery search timed out after {:?}",
                    self.policy.call_timeout
                )))
            }
        };

        let rematch = self
            .rematcher
            .rematch(&context.stale, context.leg_index, &result.candidates)?;
        let binding = OfferBinding::new(result.session_token, rematch.candidate.offer_handle.clone());

        self.persist(scope, context.leg_index, &binding).await?;

        info!(
            workflow_id = %scope.workflow_id,
            leg = context.leg_index,
            score = rematch.score,
            "Rematched {} to offer {} (result #{})",
            context.stale.route(),
            binding.offer_handle,
            rematch.position
        );

        if let Some(events) = &self.events {
            let event = LegRecoveredEvent {
                workflow_id: scope.workflow_id,
                leg_index: context.leg_index,
                stage: stage.to_string(),
                score: rematch.score,
                timestamp: chrono::Utc::now().timestamp(),
            };
            if let Err(e) = events.leg_recovered(&event).await {
                warn!("Failed to publish recovery event: {}", e);
            }
        }

        Ok(binding)
    }

    /// Multi-city legs own their binding; other shapes also share one booking token.
    pub(crate) async fn persist(
        &self,
        scope: &WorkflowScope<'_>,
        leg_index: usize,
        binding: &OfferBinding,
    ) -> Result<(), BookingError> {
        if scope.shape != TripShape::MultiCity {
            self.store
                .set_token(scope.workflow_id, &binding.session_token)
                .await?;
        }
        self.store
            .set_leg_binding(scope.workflow_id, leg_index, binding)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        candidate, descriptor, search_result, segment, GatewayCall, ScriptedGateway,
    };
    use aerobook_core::{ErrorKind, LegKey, MemorySessionStore, UpstreamError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn orchestrator(gateway: Arc<ScriptedGateway>, store: Arc<MemorySessionStore>) -> RecoveryOrchestrator {
        RecoveryOrchestrator::new(gateway, store)
    }

    fn scope(shape: TripShape) -> WorkflowScope<'static> {
        WorkflowScope {
            workflow_id: Uuid::nil(),
            shape,
            passengers: &[],
        }
    }

    fn expired() -> BookingError {
        BookingError::SessionExpired {
            code: 6,
            message: "TraceId expired".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        for n in 1..=5u32 {
            assert_eq!(
                policy.delay_before_retry(n),
                policy.delay_before_retry(1) * 2u32.pow(n - 1)
            );
        }
        assert_eq!(policy.delay_before_retry(1), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_back_off_exponentially() {
        let gateway = Arc::new(ScriptedGateway::new());
        let store = Arc::new(MemorySessionStore::new());
        let orchestrator = orchestrator(gateway, store);
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));
        let calls = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let (value, binding) = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Requote, |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BookingError::Transient("connection reset".to_string()))
                    } else {
                        Ok("priced")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "priced");
        assert_eq!(binding.offer_handle, "OB1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(3100), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_retry_waits_twice_as_long() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGateway::new()),
            Arc::new(MemorySessionStore::new()),
        )
        .with_policy(RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        });
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));
        let called_at = std::sync::Mutex::new(Vec::new());

        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Reserve, |_| {
                called_at.lock().unwrap().push(tokio::time::Instant::now());
                async { Err(BookingError::Transient("503".to_string())) }
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        let called_at = called_at.into_inner().unwrap();
        assert_eq!(called_at.len(), 5);
        for (n, pair) in called_at.windows(2).enumerate() {
            let waited = pair[1] - pair[0];
            let expected = Duration::from_secs(1 << n);
            assert!(
                waited >= expected && waited < expected + Duration::from_millis(100),
                "retry {} waited {:?}",
                n + 1,
                waited
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiring_on_every_attempt_exhausts_budget() {
        let gateway = Arc::new(ScriptedGateway::new());
        for token in ["trace-a", "trace-b"] {
            gateway
                .push_search(Ok(search_result(
                    token,
                    vec![candidate(
                        &format!("OB-{}", token),
                        vec![segment("DEL", "BOM", "AI", "865", 10, 8, 0)],
                    )],
                )))
                .await;
        }
        let store = Arc::new(MemorySessionStore::new());
        let orchestrator = orchestrator(gateway.clone(), store.clone());
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));
        let calls = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Issue, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(expired()) }
            })
            .await;

        assert!(result.unwrap_err().is_session_expired());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(leg.recoveries, 2);
        assert_eq!(leg.binding(), &OfferBinding::new("trace-b", "OB-trace-b"));

        let searches = gateway
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Search(_)))
            .count();
        assert_eq!(searches, 2);

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(3100), "waited {:?}", waited);
        assert_eq!(store.token(Uuid::nil()).await.unwrap().as_deref(), Some("trace-b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhausted() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGateway::new()),
            Arc::new(MemorySessionStore::new()),
        );
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));
        let calls = AtomicU32::new(0);

        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Issue, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BookingError::Transient("503".to_string())) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_business_error_not_retried() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGateway::new()),
            Arc::new(MemorySessionStore::new()),
        );
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));
        let calls = AtomicU32::new(0);

        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Reserve, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(BookingError::BookingAlreadyExists {
                        code: 21,
                        message: "Booking already exists".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::BookingAlreadyExists);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_as_transient() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGateway::new()),
            Arc::new(MemorySessionStore::new()),
        )
        .with_policy(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        });
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));

        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Requote, |_| async {
                sleep(Duration::from_secs(120)).await;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_recovered_and_persisted() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway
            .push_search(Ok(search_result(
                "trace-fresh",
                vec![
                    candidate("OB-far", vec![segment("DEL", "BOM", "6E", "2011", 10, 13, 0)]),
                    candidate("OB-same", vec![segment("DEL", "BOM", "AI", "865", 10, 8, 0)]),
                ],
            )))
            .await;
        let store = Arc::new(MemorySessionStore::new());
        let orchestrator = orchestrator(gateway.clone(), store.clone());
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));
        let seen = std::sync::Mutex::new(Vec::new());

        let (_, binding) = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Issue, |b| {
                seen.lock().unwrap().push(b.clone());
                let first = seen.lock().unwrap().len() == 1;
                async move {
                    if first {
                        Err(expired())
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(binding, OfferBinding::new("trace-fresh", "OB-same"));
        assert_eq!(leg.binding(), &binding);
        assert_eq!(leg.recoveries, 1);
        assert_eq!(seen.lock().unwrap()[0], OfferBinding::new("trace-1", "OB1"));

        let id = Uuid::nil();
        assert_eq!(store.token(id).await.unwrap().as_deref(), Some("trace-fresh"));
        assert_eq!(store.leg_binding(id, 0).await.unwrap(), Some(binding));

        let calls = gateway.calls().await;
        assert!(matches!(&calls[..], [GatewayCall::Search(c)] if c.origin == "DEL" && c.destination == "BOM"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_without_match_propagates() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway
            .push_search(Ok(search_result(
                "trace-fresh",
                vec![candidate("OB-x", vec![segment("DEL", "BLR", "AI", "501", 10, 8, 0)])],
            )))
            .await;
        let orchestrator = orchestrator(gateway, Arc::new(MemorySessionStore::new()));
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));

        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Requote, |_| async { Err(expired()) })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NoMatchFound);
        assert_eq!(leg.binding().offer_handle, "OB1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_search_failure_propagates() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway
            .push_search(Err(UpstreamError::Business {
                code: 25,
                message: "No result found".to_string(),
            }))
            .await;
        let orchestrator = orchestrator(gateway, Arc::new(MemorySessionStore::new()));
        let mut leg = LegRun::new(0, LegKey::OneWay, descriptor("DEL", "BOM", 10, 8, 0));

        let result: Result<((), OfferBinding), _> = orchestrator
            .execute(&scope(TripShape::OneWay), &mut leg, Stage::Requote, |_| async { Err(expired()) })
            .await;

        assert_eq!(
            result.unwrap_err(),
            BookingError::UpstreamBusiness {
                code: 25,
                message: "No result found".to_string()
            }
        );
    }
}
