use crate::core::resource::Level;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single predicate over recent samples that, once satisfied, moves a
/// breaker `Closed -> Open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TriggerCondition {
    /// Trips when `failed * 100 >= total * error_percent` and `total >= min_samples`,
    /// measured over the trailing `interval_secs` seconds.
    ErrorRate {
        interval_secs: u32,
        min_samples: u64,
        error_percent: f64,
    },
    /// Trips after `error_count` consecutive failures.
    ConsecutiveError { error_count: u32 },
}

impl TriggerCondition {
    fn is_valid(&self) -> Result<()> {
        match self {
            TriggerCondition::ErrorRate {
                interval_secs,
                min_samples,
                error_percent,
            } => {
                if *interval_secs == 0 {
                    return Err(Error::msg("error-rate trigger: interval_secs must be > 0"));
                }
                if *min_samples == 0 {
                    return Err(Error::msg("error-rate trigger: min_samples must be > 0"));
                }
                if !(0.0..=100.0).contains(error_percent) {
                    return Err(Error::msg(
                        "error-rate trigger: error_percent must be within [0, 100]",
                    ));
                }
            }
            TriggerCondition::ConsecutiveError { error_count } => {
                if *error_count == 0 {
                    return Err(Error::msg(
                        "consecutive-error trigger: error_count must be > 0",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A predicate classifying an `Unknown` sample as a failure, based on the
/// raw return code or the observed delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "input_type")]
pub enum ErrorCondition {
    /// Regex matched against the string form of the return code.
    RetCode { pattern: String },
    /// Failure when `delay_ms >= operand_ms`.
    Delay { operand_ms: u64 },
}

impl ErrorCondition {
    fn is_valid(&self) -> Result<()> {
        if let ErrorCondition::RetCode { pattern } = self {
            regex::Regex::new(pattern)
                .map_err(|e| Error::msg(format!("invalid RET_CODE pattern {:?}: {}", pattern, e)))?;
        }
        Ok(())
    }
}

/// Recovery parameters controlling `Open -> HalfOpen -> Closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverCondition {
    pub sleep_window_secs: u32,
    pub consecutive_success_count: u32,
}

impl RecoverCondition {
    fn is_valid(&self) -> Result<()> {
        if self.sleep_window_secs == 0 {
            return Err(Error::msg("recover condition: sleep_window_secs must be > 0"));
        }
        if self.consecutive_success_count == 0 {
            return Err(Error::msg(
                "recover condition: consecutive_success_count must be > 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub code: i32,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub enable: bool,
    pub response: FallbackResponse,
}

/// Immutable configuration bound to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerRule {
    pub rule_name: String,
    pub level: Level,
    pub triggers: Vec<TriggerCondition>,
    #[serde(default)]
    pub error_conditions: Vec<ErrorCondition>,
    pub recover: RecoverCondition,
    #[serde(default)]
    pub fallback: Option<FallbackConfig>,
}

impl CircuitBreakerRule {
    pub fn is_valid(&self) -> Result<()> {
        if self.rule_name.is_empty() {
            return Err(Error::msg("circuit breaker rule: empty rule_name"));
        }
        if self.triggers.is_empty() {
            return Err(Error::msg(
                "circuit breaker rule: at least one trigger condition is required",
            ));
        }
        for trigger in &self.triggers {
            trigger.is_valid()?;
        }
        for cond in &self.error_conditions {
            cond.is_valid()?;
        }
        self.recover.is_valid()?;
        Ok(())
    }
}

impl fmt::Display for CircuitBreakerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
