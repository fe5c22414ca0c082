//! Safety gate between the external model and local actions.
//!
//! [`validate`] is a pure function with no side effects; it is the sole
//! gate between a non-deterministic text generator and irreversible local
//! operations.

use crate::ai::AiResponse;
use crate::config::SafetyConfig;
use std::collections::HashSet;

/// Compiled safety policy.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    dangerous: HashSet<String>,
    allowed: HashSet<String>,
    dangerous_min_confidence: f32,
    confirm_below_confidence: f32,
}

impl SafetyPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            dangerous: config.dangerous_actions.iter().cloned().collect(),
            allowed: config.allowed_actions.iter().cloned().collect(),
            dangerous_min_confidence: config.dangerous_min_confidence,
            confirm_below_confidence: config.confirm_below_confidence,
        }
    }

    /// Whether an accepted command still needs verbal confirmation.
    #[must_use]
    pub fn needs_confirmation(&self, confidence: f32) -> bool {
        confidence < self.confirm_below_confidence
    }
}

/// Why a command response was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// Dangerous action proposed without enough confidence.
    #[error("ishonch past ({:.0}%)", .confidence * 100.0)]
    LowConfidence {
        /// The confidence the model reported.
        confidence: f32,
    },

    /// Action outside the allow-list, regardless of confidence.
    #[error("noma'lum amal: {action}")]
    UnknownAction {
        /// The unrecognized action identifier.
        action: String,
    },
}

/// Decide whether an AI response may be executed.
///
/// Non-command responses always pass. A command is refused when its
/// action is dangerous and under-confident, or when the action is not on
/// the allow-list at all.
pub fn validate(response: &AiResponse, policy: &SafetyPolicy) -> Result<(), Rejection> {
    let AiResponse::Command {
        action, confidence, ..
    } = response
    else {
        return Ok(());
    };

    if policy.dangerous.contains(action) && *confidence < policy.dangerous_min_confidence {
        return Err(Rejection::LowConfidence {
            confidence: *confidence,
        });
    }
    if !action.is_empty() && !policy.allowed.contains(action) {
        return Err(Rejection::UnknownAction {
            action: action.clone(),
        });
    }
    Ok(())
}
