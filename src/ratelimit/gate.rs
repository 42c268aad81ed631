//! Rate limiter gate.
//!
//! Ties classification, policy, key building and the window counter together
//! and turns the result into a [`Verdict`]. Store problems never escape from
//! here: they become [`Verdict::FailOpen`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::classifier::{IdentityClassifier, PlanDirectory, StaticDirectory};
use super::key::WindowKeyBuilder;
use super::policy::TierPolicy;
use super::window::{AdmitMode, Decision, SlidingWindowCounter};
use crate::config::TiergateConfig;
use crate::error::Result;
use crate::store::WindowStore;

/// Why a request was let through without being counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOpenCause {
    /// The gate was built without a store
    NoStore,
    /// The store failed or timed out during this check
    Store(String),
    /// The resolved plan has no quota configured
    Policy(String),
}

/// Result of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Admitted and recorded against the caller's window
    Allow {
        plan: String,
        limit: u64,
        remaining: u64,
    },
    /// Over quota
    Deny {
        plan: String,
        reason: String,
        retry_after: Duration,
    },
    /// Admitted without enforcement
    FailOpen { plan: String, cause: FailOpenCause },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Verdict::Deny { .. })
    }

    pub fn plan(&self) -> &str {
        match self {
            Verdict::Allow { plan, .. }
            | Verdict::Deny { plan, .. }
            | Verdict::FailOpen { plan, .. } => plan,
        }
    }
}

/// Denial message shown to callers.
pub fn denial_reason(plan: &str) -> String {
    format!("Rate limit for {} tier exceeded. Try again later.", plan)
}

/// Per-request admission gate.
///
/// Stateless between calls; safe to share across tasks behind an `Arc`.
#[derive(Clone)]
pub struct RateLimitGate {
    classifier: IdentityClassifier,
    policy: Arc<TierPolicy>,
    keys: WindowKeyBuilder,
    counter: Option<SlidingWindowCounter>,
}

impl RateLimitGate {
    /// Build a gate. Without a counter every check fails open.
    pub fn new(
        classifier: IdentityClassifier,
        policy: TierPolicy,
        keys: WindowKeyBuilder,
        counter: Option<SlidingWindowCounter>,
    ) -> Self {
        Self {
            classifier,
            policy: Arc::new(policy),
            keys,
            counter,
        }
    }

    /// Build a gate from configuration with the static directory it carries.
    pub fn from_config(config: &TiergateConfig, store: Option<Arc<dyn WindowStore>>) -> Result<Self> {
        let directory: Arc<dyn PlanDirectory> =
            Arc::new(StaticDirectory::from_entries(&config.directory));
        Self::with_directory(config, directory, store)
    }

    /// Build a gate from configuration with an external directory.
    pub fn with_directory(
        config: &TiergateConfig,
        directory: Arc<dyn PlanDirectory>,
        store: Option<Arc<dyn WindowStore>>,
    ) -> Result<Self> {
        let policy = TierPolicy::from_config(&config.tiers)?;
        let classifier = IdentityClassifier::new(directory, config.tiers.default_plan.clone());
        let keys = WindowKeyBuilder::new(config.store.key_prefix.clone());

        let mode = if config.store.atomic {
            AdmitMode::Atomic
        } else {
            AdmitMode::Sequential
        };
        let counter = store
            .map(|store| SlidingWindowCounter::new(store, mode, config.store.command_timeout()));

        Ok(Self::new(classifier, policy, keys, counter))
    }

    /// Whether checks are enforced at all, as opposed to failing open for
    /// the process lifetime.
    pub fn has_store(&self) -> bool {
        self.counter.is_some()
    }

    /// Decide whether the caller may proceed.
    ///
    /// `now` is fractional epoch seconds.
    #[instrument(skip(self, credential))]
    pub async fn check(&self, credential: Option<&str>, origin: &str, now: f64) -> Verdict {
        let identity = self.classifier.classify(credential, origin).await;

        let tier = match self.policy.resolve(&identity.plan) {
            Ok(tier) => tier,
            Err(e) => {
                warn!(plan = %identity.plan, error = %e, "No quota for plan, failing open");
                return Verdict::FailOpen {
                    plan: identity.plan,
                    cause: FailOpenCause::Policy(e.to_string()),
                };
            }
        };

        let Some(counter) = &self.counter else {
            return Verdict::FailOpen {
                plan: tier.name.clone(),
                cause: FailOpenCause::NoStore,
            };
        };

        let key = self.keys.build(&identity.origin, &tier.name);
        match counter.admit(&key, tier.limit, tier.window, now).await {
            Ok(Decision::Allowed { count }) => Verdict::Allow {
                plan: tier.name.clone(),
                limit: tier.limit,
                remaining: tier.limit.saturating_sub(count),
            },
            Ok(Decision::Denied { count }) => {
                debug!(key = %key, plan = %tier.name, count = count, "Rate limit exceeded");
                Verdict::Deny {
                    plan: tier.name.clone(),
                    reason: denial_reason(&tier.name),
                    retry_after: tier.window,
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Store error during rate limit check, failing open");
                Verdict::FailOpen {
                    plan: tier.name.clone(),
                    cause: FailOpenCause::Store(e.to_string()),
                }
            }
        }
    }

    /// Store status for health reporting.
    pub async fn store_status(&self) -> StoreStatus {
        match &self.counter {
            None => StoreStatus::Disabled,
            Some(counter) => match counter.ping().await {
                Ok(()) => StoreStatus::Up,
                Err(e) => {
                    debug!(error = %e, "Store health check failed");
                    StoreStatus::Down
                }
            },
        }
    }
}

/// Reachability of the counting store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Up,
    Down,
    Disabled,
}

impl StoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Up => "up",
            StoreStatus::Down => "down",
            StoreStatus::Disabled => "disabled",
        }
    }
}
