//! Navigation policy, resolved once per attempt from its settings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::AttemptSettings;

/// The rule set deciding which question-to-question moves are permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationPolicy {
    Unrestricted,
    /// A move is allowed if either endpoint is answered.
    RequireAnswer,
    /// Forward only, and only away from an answered question.
    EnforceLinear,
    /// Legacy forward-only mode with no answer requirement. Kept for
    /// existing attempts; do not use it for new ones.
    Yolo,
    Composable {
        backtracking_allowed: bool,
        skipping_allowed: bool,
    },
}

impl NavigationPolicy {
    /// Resolve the active policy from whichever settings shape is populated.
    ///
    /// The string shape wins when both are set. No shape at all means
    /// [`NavigationPolicy::Unrestricted`].
    pub fn resolve(settings: &AttemptSettings) -> Result<Self, EngineError> {
        match (
            settings.assessment_navigation_policy.as_deref(),
            settings.navigation_policy,
        ) {
            (Some(name), composable) => {
                if composable.is_some() {
                    tracing::warn!(
                        "both navigation policy shapes are set, using '{name}' and ignoring the composable settings"
                    );
                }
                name.parse()
            }
            (None, Some(c)) => Ok(NavigationPolicy::Composable {
                backtracking_allowed: c.backtracking_allowed,
                skipping_allowed: c.skipping_allowed,
            }),
            (None, None) => Ok(NavigationPolicy::Unrestricted),
        }
    }
}

impl fmt::Display for NavigationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationPolicy::Unrestricted => write!(f, "unrestricted"),
            NavigationPolicy::RequireAnswer => write!(f, "require_answer"),
            NavigationPolicy::EnforceLinear => write!(f, "enforce_linear"),
            NavigationPolicy::Yolo => write!(f, "yolo"),
            NavigationPolicy::Composable {
                backtracking_allowed,
                skipping_allowed,
            } => write!(
                f,
                "composable(backtracking={backtracking_allowed}, skipping={skipping_allowed})"
            ),
        }
    }
}

impl FromStr for NavigationPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "" | "unrestricted" | "none" => Ok(NavigationPolicy::Unrestricted),
            "require_answer" => Ok(NavigationPolicy::RequireAnswer),
            "enforce_linear" | "linear" => Ok(NavigationPolicy::EnforceLinear),
            "yolo" => Ok(NavigationPolicy::Yolo),
            _ => Err(EngineError::UnknownPolicy(s.to_string())),
        }
    }
}
