//! Retrying wrapper around a [`MessagingGateway`].
//!
//! Transient and rate-limited failures are retried with capped exponential
//! backoff; everything else fails on the first attempt.

use std::{sync::Arc, time::Duration};

use {anonka_common::UserId, anonka_config::DeliveryConfig, rand::Rng, tracing::warn};

use crate::gateway::{GatewayError, MessageRef, MessagingGateway, Outbound};

/// Backoff parameters for outbound sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts in total, including the first. Never less than one.
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each further retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread each delay by up to ±25% so parallel senders do not retry in
    /// lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(c: &DeliveryConfig) -> Self {
        Self {
            max_attempts: c.max_attempts.max(1),
            base_delay: Duration::from_millis(c.base_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            jitter: c.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), before jitter.
    /// Retry 0 waits `base_delay`, retry 1 twice that, and so on up to
    /// `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay_for(&self, retry: u32, err: &GatewayError) -> Duration {
        let mut delay = self.backoff(retry);
        if self.jitter && !delay.is_zero() {
            delay = delay.mul_f64(rand::rng().random_range(0.75..=1.25));
        }
        // A server-provided hint is a floor, not a suggestion.
        match err.retry_after() {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}

/// A send that did not go through.
#[derive(Debug, thiserror::Error)]
#[error("delivery to {recipient} failed after {attempts} attempt(s): {source}")]
pub struct DeliveryError {
    pub recipient: UserId,
    pub attempts: u32,
    #[source]
    pub source: GatewayError,
}

/// Gateway wrapper that retries transient failures.
#[derive(Clone)]
pub struct ResilientDelivery {
    gateway: Arc<dyn MessagingGateway>,
    policy: RetryPolicy,
}

impl ResilientDelivery {
    pub fn new(gateway: Arc<dyn MessagingGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Send one message, retrying while the failure is transient and attempts
    /// remain.
    pub async fn send(&self, to: UserId, message: &Outbound) -> Result<MessageRef, DeliveryError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.gateway.send(to, message).await {
                Ok(sent) => return Ok(sent),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt - 1, &err);
                    warn!(
                        user_id = %to,
                        operation = message.operation(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error_kind = err.kind(),
                        "retrying send after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => {
                    return Err(DeliveryError {
                        recipient: to,
                        attempts: attempt,
                        source: err,
                    });
                },
            }
        }
    }

    /// Send a dispatch plan in order. The first message carries the content
    /// and decides the outcome; once it is delivered, a failed follow-up is
    /// logged and skipped so the content is never sent twice.
    pub async fn send_plan(&self, to: UserId, messages: &[Outbound]) -> Result<(), DeliveryError> {
        let Some((primary, follow_ups)) = messages.split_first() else {
            return Ok(());
        };
        self.send(to, primary).await?;
        for message in follow_ups {
            if let Err(err) = self.send(to, message).await {
                warn!(
                    user_id = %to,
                    operation = message.operation(),
                    attempts = err.attempts,
                    error_kind = err.source.kind(),
                    "follow-up send failed, primary already delivered"
                );
            }
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use {super::*, async_trait::async_trait, rstest::rstest};

    /// Plays back scripted outcomes (`None` succeeds), then succeeds.
    struct Scripted {
        outcomes: Mutex<VecDeque<Option<GatewayError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(failures: impl IntoIterator<Item = GatewayError>) -> Arc<Self> {
            Self::script(failures.into_iter().map(Some))
        }

        fn script(outcomes: impl IntoIterator<Item = Option<GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessagingGateway for Scripted {
        async fn send(&self, _to: UserId, _message: &Outbound) -> Result<MessageRef, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcomes.lock().unwrap().pop_front().flatten() {
                Some(err) => Err(err),
                None => Ok(MessageRef(n.to_string())),
            }
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: false,
        }
    }

    fn transient(n: usize) -> Vec<GatewayError> {
        (0..n).map(|_| GatewayError::transient("timeout")).collect()
    }

    #[rstest]
    #[case(0, 1)]
    #[case(2, 3)]
    #[case(4, 5)]
    #[tokio::test]
    async fn retries_until_success(#[case] failures: usize, #[case] expected_calls: u32) {
        let gw = Scripted::new(transient(failures));
        let delivery = ResilientDelivery::new(gw.clone(), fast(5));
        delivery
            .send(UserId(7), &Outbound::text("hi"))
            .await
            .unwrap();
        assert_eq!(gw.calls(), expected_calls);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let gw = Scripted::new(transient(10));
        let delivery = ResilientDelivery::new(gw.clone(), fast(5));
        let err = delivery
            .send(UserId(7), &Outbound::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 5);
        assert_eq!(err.recipient, UserId(7));
        assert_eq!(gw.calls(), 5);
    }

    #[rstest]
    #[case(GatewayError::unreachable("bot was blocked by the user"))]
    #[case(GatewayError::rejected("message text is empty"))]
    #[tokio::test]
    async fn permanent_failures_are_not_retried(#[case] failure: GatewayError) {
        let gw = Scripted::new([failure]);
        let delivery = ResilientDelivery::new(gw.clone(), fast(5));
        let err = delivery
            .send(UserId(7), &Outbound::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(!err.source.is_transient());
        assert_eq!(gw.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let gw = Scripted::new([GatewayError::RateLimited {
            retry_after: Some(Duration::from_millis(2)),
        }]);
        let delivery = ResilientDelivery::new(gw.clone(), fast(3));
        delivery
            .send(UserId(7), &Outbound::text("hi"))
            .await
            .unwrap();
        assert_eq!(gw.calls(), 2);
    }

    #[tokio::test]
    async fn plan_fails_when_primary_fails() {
        let gw = Scripted::new([GatewayError::rejected("nope")]);
        let delivery = ResilientDelivery::new(gw.clone(), fast(3));
        let messages = [Outbound::text("a"), Outbound::text("b")];
        assert!(delivery.send_plan(UserId(1), &messages).await.is_err());
        assert_eq!(gw.calls(), 1);
    }

    #[tokio::test]
    async fn plan_tolerates_failed_follow_up() {
        let gw = Scripted::script([None, Some(GatewayError::unreachable("gone")), None]);
        let delivery = ResilientDelivery::new(gw.clone(), fast(3));
        let messages = [
            Outbound::text("a"),
            Outbound::text("b"),
            Outbound::text("c"),
        ];
        delivery.send_plan(UserId(1), &messages).await.unwrap();
        assert_eq!(gw.calls(), 3);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: false,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy {
            jitter: true,
            ..fast(3)
        };
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(1),
            ..policy
        };
        let err = GatewayError::transient("x");
        for _ in 0..100 {
            let d = policy.delay_for(0, &err);
            assert!(d >= Duration::from_millis(300) && d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn retry_after_hint_is_a_floor() {
        let err = GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(fast(3).delay_for(0, &err), Duration::from_secs(3));
    }

    #[test]
    fn zero_attempts_means_one() {
        let cfg = DeliveryConfig {
            max_attempts: 0,
            ..DeliveryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&cfg).max_attempts, 1);
    }
}
