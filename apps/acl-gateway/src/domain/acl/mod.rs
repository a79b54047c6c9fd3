//! Access Control Policy
//!
//! Maps each consumer to the set of RPC methods it may call.
//!
//! # Policy Document
//!
//! The policy is built once at startup from a JSON object mapping consumer
//! names to ordered lists of method patterns:
//!
//! ```json
//! {
//!     "logger": ["/gateway.v1.Admin/Logging"],
//!     "biz_user": ["/gateway.v1.Biz/Check", "/gateway.v1.Biz/Add"],
//!     "biz_admin": ["/gateway.v1.Biz/*"]
//! }
//! ```
//!
//! A pattern is either an exact `/<service>/<method>` or `/<service>/*`,
//! which admits every method of that service. The wildcard is only
//! recognised in the method segment.
//!
//! After construction the policy is never mutated, so it is shared across
//! calls behind a plain `Arc` with no locking.

use std::collections::HashMap;

// =============================================================================
// Method Patterns
// =============================================================================

/// Wildcard accepted in the method segment of a pattern.
const METHOD_WILDCARD: &str = "*";

/// Method segment of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MethodMatcher {
    /// Any method of the service.
    Any,
    /// One named method.
    Exact(String),
}

/// A single permitted method pattern, parsed from `/<service>/<method>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPattern {
    service: String,
    method: MethodMatcher,
}

impl MethodPattern {
    /// Parse a pattern of the form `/<service>/<method>` or `/<service>/*`.
    ///
    /// Returns `None` if the pattern does not have exactly two non-empty
    /// segments after the leading slash.
    #[must_use]
    pub fn parse(pattern: &str) -> Option<Self> {
        let (service, method) = split_full_method(pattern)?;
        let method = if method == METHOD_WILDCARD {
            MethodMatcher::Any
        } else {
            MethodMatcher::Exact(method.to_string())
        };
        Some(Self {
            service: service.to_string(),
            method,
        })
    }

    /// Whether this pattern admits the given full method name.
    #[must_use]
    pub fn matches(&self, full_method: &str) -> bool {
        let Some((service, method)) = split_full_method(full_method) else {
            return false;
        };
        if service != self.service {
            return false;
        }
        match &self.method {
            MethodMatcher::Any => true,
            MethodMatcher::Exact(expected) => expected == method,
        }
    }

    /// Whether the method segment is the service wildcard.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self.method, MethodMatcher::Any)
    }
}

impl std::fmt::Display for MethodPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.method {
            MethodMatcher::Any => write!(f, "/{}/{METHOD_WILDCARD}", self.service),
            MethodMatcher::Exact(method) => write!(f, "/{}/{method}", self.service),
        }
    }
}

/// Split `/<service>/<method>` into its two segments.
fn split_full_method(full_method: &str) -> Option<(&str, &str)> {
    let rest = full_method.strip_prefix('/')?;
    let (service, method) = rest.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some((service, method))
}

// =============================================================================
// Access Policy
// =============================================================================

/// Immutable consumer → permitted-methods mapping.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<String, Vec<MethodPattern>>,
}

impl AccessPolicy {
    /// Build a policy from its JSON document.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Malformed` if the text is not a JSON object of
    /// string arrays, or `PolicyError::InvalidPattern` if any entry is not a
    /// `/<service>/<method>` pattern.
    pub fn from_json(text: &str) -> Result<Self, PolicyError> {
        let document: HashMap<String, Vec<String>> = serde_json::from_str(text)?;

        let mut rules = HashMap::with_capacity(document.len());
        for (consumer, patterns) in document {
            let parsed = patterns
                .iter()
                .map(|pattern| {
                    MethodPattern::parse(pattern).ok_or_else(|| PolicyError::InvalidPattern {
                        consumer: consumer.clone(),
                        pattern: pattern.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rules.insert(consumer, parsed);
        }

        Ok(Self { rules })
    }

    /// Decide whether `consumer` may call `method`.
    ///
    /// # Errors
    ///
    /// - `AccessDenied::MissingConsumer` if no (or an empty) consumer was given
    /// - `AccessDenied::UnknownConsumer` if the consumer has no policy entry
    /// - `AccessDenied::NotAuthorized` if no pattern admits the method
    pub fn check(&self, consumer: Option<&str>, method: &str) -> Result<(), AccessDenied> {
        let consumer = match consumer {
            Some(c) if !c.is_empty() => c,
            _ => return Err(AccessDenied::MissingConsumer),
        };

        let patterns = self
            .rules
            .get(consumer)
            .ok_or_else(|| AccessDenied::UnknownConsumer(consumer.to_string()))?;

        if patterns.iter().any(|p| p.matches(method)) {
            Ok(())
        } else {
            Err(AccessDenied::NotAuthorized {
                consumer: consumer.to_string(),
                method: method.to_string(),
            })
        }
    }

    /// Permitted patterns for a consumer, in document order.
    #[must_use]
    pub fn patterns(&self, consumer: &str) -> Option<&[MethodPattern]> {
        self.rules.get(consumer).map(Vec::as_slice)
    }

    /// Consumers with a policy entry, sorted by name.
    #[must_use]
    pub fn consumers(&self) -> Vec<&str> {
        let mut consumers: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        consumers.sort_unstable();
        consumers
    }

    /// Number of consumers in the policy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the policy has no consumers at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// The policy document could not be turned into an `AccessPolicy`.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The document is not a JSON object of string arrays.
    #[error("malformed ACL document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An entry is not a `/<service>/<method>` pattern.
    #[error("invalid method pattern {pattern:?} for consumer {consumer:?}")]
    InvalidPattern {
        /// Consumer owning the entry.
        consumer: String,
        /// Offending pattern text.
        pattern: String,
    },
}

/// A call was refused by the policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// The call carried no consumer identity.
    #[error("missing consumer")]
    MissingConsumer,

    /// The consumer has no policy entry.
    #[error("unknown consumer: {0}")]
    UnknownConsumer(String),

    /// The consumer may not call this method.
    #[error("not authorized: {consumer} cannot call {method}")]
    NotAuthorized {
        /// Consumer that made the call.
        consumer: String,
        /// Full method name that was requested.
        method: String,
    },
}

impl AccessDenied {
    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingConsumer => "missing_consumer",
            Self::UnknownConsumer(_) => "unknown_consumer",
            Self::NotAuthorized { .. } => "not_authorized",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
