//! Tier policy: plan name to quota.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::config::TiersConfig;
use crate::error::{Result, TiergateError};

/// Quota attached to a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Plan name as configured
    pub name: String,
    /// Maximum requests admitted within any trailing window
    pub limit: u64,
    /// Length of the trailing window
    pub window: Duration,
}

impl Tier {
    /// Quota of `limit` requests per trailing `window` for plan `name`.
    pub fn new(name: impl Into<String>, limit: u64, window: Duration) -> Self {
        Self {
            name: name.into(),
            limit,
            window,
        }
    }
}

/// Immutable mapping from plan name to [`Tier`].
#[derive(Debug, Clone)]
pub struct TierPolicy {
    tiers: HashMap<String, Tier>,
    default_plan: Option<String>,
}

impl TierPolicy {
    /// Build a policy. `default_plan` is used for names missing from `tiers`.
    pub fn new(tiers: impl IntoIterator<Item = Tier>, default_plan: Option<String>) -> Self {
        Self {
            tiers: tiers.into_iter().map(|t| (t.name.clone(), t)).collect(),
            default_plan,
        }
    }

    /// Build the policy from configuration, checking that the default plan exists.
    pub fn from_config(config: &TiersConfig) -> Result<Self> {
        let policy = Self::new(
            config
                .plans
                .iter()
                .map(|p| Tier::new(&p.name, p.limit, Duration::from_secs(p.window_secs))),
            Some(config.default_plan.clone()),
        );

        if !policy.contains(&config.default_plan) {
            return Err(TiergateError::UnknownPlan(config.default_plan.clone()));
        }
        Ok(policy)
    }

    /// Look up the quota for `plan`.
    ///
    /// Falls back to the default plan for unknown names; fails with
    /// [`TiergateError::UnknownPlan`] only when that is missing as well.
    pub fn resolve(&self, plan: &str) -> Result<&Tier> {
        if let Some(tier) = self.tiers.get(plan) {
            return Ok(tier);
        }

        let fallback = self
            .default_plan
            .as_deref()
            .and_then(|name| self.tiers.get(name))
            .ok_or_else(|| TiergateError::UnknownPlan(plan.to_string()))?;

        warn!(plan = %plan, fallback = %fallback.name, "Unknown plan, using default");
        Ok(fallback)
    }

    /// Whether `plan` has a quota of its own, ignoring the default fallback.
    pub fn contains(&self, plan: &str) -> bool {
        self.tiers.contains_key(plan)
    }

    /// Plan whose quota stands in for unknown names, if any.
    pub fn default_plan(&self) -> Option<&str> {
        self.default_plan.as_deref()
    }
}
