//! Window key construction.

use std::fmt;

/// Store key holding one (origin, plan) pair's sliding window.
///
/// Two requests share a key iff they share both origin and plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey(String);

impl WindowKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds `<prefix>:<origin>:<plan>` keys.
///
/// `:` and `%` inside the origin or plan are percent-escaped, so an IPv6
/// origin or a plan name containing the separator cannot make two different
/// pairs produce the same key.
#[derive(Debug, Clone)]
pub struct WindowKeyBuilder {
    prefix: String,
}

impl Default for WindowKeyBuilder {
    fn default() -> Self {
        Self::new("rate_limit")
    }
}

impl WindowKeyBuilder {
    /// Builder producing keys under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key for one `(origin, plan)` pair: `<prefix>:<origin>:<plan>`, with
    /// `:` and `%` percent-escaped in both components.
    pub fn build(&self, origin: &str, plan: &str) -> WindowKey {
        WindowKey(format!(
            "{}:{}:{}",
            self.prefix,
            escape(origin),
            escape(plan)
        ))
    }
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}
