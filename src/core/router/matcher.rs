//! String matching predicates used by route source/destination clauses, with
//! `$variable` substitution against a caller-supplied variable map before the
//! comparison runs.

use crate::utils::is_wildcard;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOperator {
    Exact,
    Regex,
    NotEquals,
    In,
    NotIn,
    Range,
}

/// One label/field predicate. `value` is compared against the actual field
/// after variable resolution: a value of the form `$name` is replaced with
/// `variables["name"]` (empty string if absent) before the operator runs.
/// This is how a route matches "the destination's region equals the caller's
/// region" without hardcoding a region name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchString {
    pub operator: MatchOperator,
    pub value: String,
}

impl MatchString {
    pub fn exact(value: impl Into<String>) -> Self {
        MatchString {
            operator: MatchOperator::Exact,
            value: value.into(),
        }
    }

    /// Resolves `self.value` against `variables`, then evaluates the operator
    /// for `actual`. A malformed `Regex`/`Range` value is treated as a
    /// non-match rather than a panic, since rule validation should have
    /// caught it before this runs.
    pub fn matches(&self, actual: &str, variables: &HashMap<String, String>) -> bool {
        let expected = resolve(&self.value, variables);
        match self.operator {
            MatchOperator::Exact => actual == expected,
            MatchOperator::NotEquals => actual != expected,
            MatchOperator::Regex => Regex::new(&expected)
                .map(|re| re.is_match(actual))
                .unwrap_or(false),
            MatchOperator::In => expected.split(',').any(|candidate| candidate.trim() == actual),
            MatchOperator::NotIn => {
                !expected.split(',').any(|candidate| candidate.trim() == actual)
            }
            MatchOperator::Range => match_range(&expected, actual),
        }
    }

    /// Whether this predicate's resolved value is the literal wildcard `*`,
    /// used to decide whether an absent actual value still counts as a match.
    pub fn is_wildcard(&self, variables: &HashMap<String, String>) -> bool {
        is_wildcard(&resolve(&self.value, variables))
    }

    pub fn is_valid(&self) -> crate::Result<()> {
        if self.operator == MatchOperator::Regex && !self.value.starts_with('$') {
            regex::Regex::new(&self.value)
                .map_err(|e| crate::Error::msg(format!("invalid REGEX pattern {:?}: {}", self.value, e)))?;
        }
        Ok(())
    }
}

fn resolve(value: &str, variables: &HashMap<String, String>) -> String {
    match value.strip_prefix('$') {
        Some(name) => variables.get(name).cloned().unwrap_or_default(),
        None => value.to_string(),
    }
}

/// `expected` is `"lo-hi"`; both bounds inclusive, compared as `f64`.
fn match_range(expected: &str, actual: &str) -> bool {
    let mut parts = expected.splitn(2, '-');
    let (lo, hi) = match (parts.next(), parts.next()) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => return false,
    };
    let (lo, hi, actual) = match (lo.parse::<f64>(), hi.parse::<f64>(), actual.parse::<f64>()) {
        (Ok(lo), Ok(hi), Ok(actual)) => (lo, hi, actual),
        _ => return false,
    };
    actual >= lo && actual <= hi
}

/// Evaluates a set of labeled predicates against an actual label map: every
/// predicate present must match (`AND` semantics). A label absent from
/// `actual` matches only a predicate whose resolved value is the literal
/// wildcard `*`; any other predicate treats absence as a non-match.
pub fn match_labels(
    predicates: &HashMap<String, MatchString>,
    actual: &HashMap<String, String>,
    variables: &HashMap<String, String>,
) -> bool {
    predicates.iter().all(|(key, predicate)| match actual.get(key) {
        Some(value) => predicate.matches(value, variables),
        None => predicate.is_wildcard(variables),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn exact_match() {
        assert!(MatchString::exact("prod").matches("prod", &vars()));
        assert!(!MatchString::exact("prod").matches("staging", &vars()));
    }

    #[test]
    fn variable_substitution() {
        let mut variables = HashMap::new();
        variables.insert("region".to_string(), "us-west".to_string());
        let m = MatchString {
            operator: MatchOperator::Exact,
            value: "$region".into(),
        };
        assert!(m.matches("us-west", &variables));
        assert!(!m.matches("us-east", &variables));
    }

    #[test]
    fn in_and_not_in() {
        let m = MatchString {
            operator: MatchOperator::In,
            value: "a, b, c".into(),
        };
        assert!(m.matches("b", &vars()));
        assert!(!m.matches("d", &vars()));
        let m = MatchString {
            operator: MatchOperator::NotIn,
            value: "a, b, c".into(),
        };
        assert!(m.matches("d", &vars()));
        assert!(!m.matches("a", &vars()));
    }

    #[test]
    fn range_inclusive_bounds() {
        let m = MatchString {
            operator: MatchOperator::Range,
            value: "10-20".into(),
        };
        assert!(m.matches("10", &vars()));
        assert!(m.matches("20", &vars()));
        assert!(m.matches("15", &vars()));
        assert!(!m.matches("21", &vars()));
    }

    #[test]
    fn regex_match() {
        let m = MatchString {
            operator: MatchOperator::Regex,
            value: "^v[0-9]+$".into(),
        };
        assert!(m.matches("v2", &vars()));
        assert!(!m.matches("canary", &vars()));
    }

    #[test]
    fn match_labels_treats_absence_as_wildcard_match_only() {
        let actual = HashMap::new();

        let mut wildcard_predicate = HashMap::new();
        wildcard_predicate.insert("region".to_string(), MatchString::exact("*"));
        assert!(match_labels(&wildcard_predicate, &actual, &vars()));

        let mut exact_predicate = HashMap::new();
        exact_predicate.insert("region".to_string(), MatchString::exact("us-west"));
        assert!(!match_labels(&exact_predicate, &actual, &vars()));

        let mut not_equals_predicate = HashMap::new();
        not_equals_predicate.insert(
            "region".to_string(),
            MatchString {
                operator: MatchOperator::NotEquals,
                value: "us-west".into(),
            },
        );
        // absence is a non-match by default, even for NotEquals
        assert!(!match_labels(&not_equals_predicate, &actual, &vars()));
    }

    #[test]
    fn match_labels_requires_all_predicates() {
        let mut predicates = HashMap::new();
        predicates.insert("region".to_string(), MatchString::exact("us-west"));
        predicates.insert("tier".to_string(), MatchString::exact("gold"));
        let mut actual = HashMap::new();
        actual.insert("region".to_string(), "us-west".to_string());
        actual.insert("tier".to_string(), "gold".to_string());
        assert!(match_labels(&predicates, &actual, &vars()));
        actual.insert("tier".to_string(), "silver".to_string());
        assert!(!match_labels(&predicates, &actual, &vars()));
    }
}
