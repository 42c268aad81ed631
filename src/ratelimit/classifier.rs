//! Caller identity and plan resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::config::DirectoryEntry;

/// Source of truth for which plan a credential is subscribed to.
#[async_trait]
pub trait PlanDirectory: Send + Sync {
    /// Plan name for `credential`, or `None` when it is not known.
    async fn lookup(&self, credential: &str) -> Option<String>;
}

/// Directory backed by a fixed table loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    plans: HashMap<String, String>,
}

impl StaticDirectory {
    /// Directory over `(credential, plan)` pairs. A repeated credential keeps
    /// its last plan.
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            plans: entries.into_iter().collect(),
        }
    }

    pub fn from_entries(entries: &[DirectoryEntry]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|e| (e.credential.clone(), e.plan.clone())),
        )
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[async_trait]
impl PlanDirectory for StaticDirectory {
    async fn lookup(&self, credential: &str) -> Option<String> {
        self.plans.get(credential).cloned()
    }
}

/// Who is calling, as far as rate limiting is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Resolved plan name
    pub plan: String,
    /// Network origin of the caller
    pub origin: String,
}

/// Resolves a credential to a plan, substituting the default plan for
/// anything the directory does not recognise.
#[derive(Clone)]
pub struct IdentityClassifier {
    directory: Arc<dyn PlanDirectory>,
    default_plan: String,
}

impl IdentityClassifier {
    /// Classifier that hands `default_plan` to callers `directory` does not
    /// know.
    pub fn new(directory: Arc<dyn PlanDirectory>, default_plan: impl Into<String>) -> Self {
        Self {
            directory,
            default_plan: default_plan.into(),
        }
    }

    /// Never fails: missing, empty or unknown credentials get the default plan.
    pub async fn classify(&self, credential: Option<&str>, origin: &str) -> ClientIdentity {
        let found = match credential {
            Some(credential) if !credential.is_empty() => self.directory.lookup(credential).await,
            _ => None,
        };

        let plan = found.unwrap_or_else(|| self.default_plan.clone());
        trace!(origin = %origin, plan = %plan, "Classified caller");

        ClientIdentity {
            plan,
            origin: origin.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IdentityClassifier {
        let directory = StaticDirectory::new([
            ("free_user_key_123".to_string(), "FREE".to_string()),
            ("pro_user_key_456".to_string(), "PRO".to_string()),
        ]);
        IdentityClassifier::new(Arc::new(directory), "FREE")
    }

    #[tokio::test]
    async fn test_known_credential() {
        let identity = classifier()
            .classify(Some("pro_user_key_456"), "10.0.0.1")
            .await;
        assert_eq!(identity.plan, "PRO");
        assert_eq!(identity.origin, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_unknown_credential_uses_default() {
        let identity = classifier().classify(Some("bogus"), "10.0.0.1").await;
        assert_eq!(identity.plan, "FREE");
    }

    #[tokio::test]
    async fn test_missing_and_empty_credential_use_default() {
        let classifier = classifier();
        assert_eq!(classifier.classify(None, "10.0.0.1").await.plan, "FREE");
        assert_eq!(classifier.classify(Some(""), "10.0.0.1").await.plan, "FREE");
    }

    #[test]
    fn test_static_directory_from_entries() {
        let directory = StaticDirectory::from_entries(&[DirectoryEntry {
            credential: "k".to_string(),
            plan: "PRO".to_string(),
        }]);
        assert_eq!(directory.len(), 1);
        assert!(!directory.is_empty());
    }
}
