//! Route rule data model: a `RouteRule` pairs a set of source matchers with
//! an ordered set of destination groups.

use super::matcher::{match_labels, MatchString};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Whether a route applies to requests made *by* a service (outbound) or
/// requests arriving *at* a service (inbound). [`super::router::RuleRouter`]
/// tries the inbound rule set first on every `route()` call and falls back
/// to the outbound rule set within that same call if inbound doesn't resolve
/// an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteDirection {
    Inbound,
    Outbound,
}

/// Matches the caller: service identity plus arbitrary labels. `None` fields
/// match any value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    #[serde(default)]
    pub namespace: Option<MatchString>,
    #[serde(default)]
    pub service: Option<MatchString>,
    #[serde(default)]
    pub labels: HashMap<String, MatchString>,
}

impl SourceMatch {
    /// `check_identity` is false for outbound rules: the routing specification
    /// has outbound source clauses match on labels alone and skip the
    /// (namespace, service) check, since the caller's own identity is already
    /// known by construction on that path.
    pub fn matches(
        &self,
        namespace: &str,
        service: &str,
        labels: &HashMap<String, String>,
        variables: &HashMap<String, String>,
        check_identity: bool,
    ) -> bool {
        if check_identity {
            if let Some(m) = &self.namespace {
                if !m.matches(namespace, variables) {
                    return false;
                }
            }
            if let Some(m) = &self.service {
                if !m.matches(service, variables) {
                    return false;
                }
            }
        }
        match_labels(&self.labels, labels, variables)
    }
}

/// One candidate destination: a subset of a service, selected further by
/// label predicates against each instance's own metadata, weighted within
/// its priority group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub namespace: String,
    pub service: String,
    /// Empty means "no subset", i.e. any instance of the service.
    #[serde(default)]
    pub subset: String,
    #[serde(default)]
    pub labels: HashMap<String, MatchString>,
    /// Ascending: `0` is the most preferred priority group. Groups are tried
    /// in ascending order; the first with a non-empty eligible instance set
    /// wins.
    #[serde(default)]
    pub priority: u32,
    /// Relative weight for selection within its priority group. `0` excludes
    /// the destination from weighted selection even if it matches.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Isolated destinations are dropped before matching runs, as if they
    /// weren't configured at all - used to pull a subset out of rotation
    /// without deleting its rule entry.
    #[serde(default)]
    pub isolate: bool,
}

fn default_weight() -> u32 {
    100
}

impl Destination {
    pub fn is_valid(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::msg("destination: empty namespace"));
        }
        if self.service.is_empty() {
            return Err(Error::msg("destination: empty service"));
        }
        Ok(())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}${} (priority={}, weight={})",
            self.namespace, self.service, self.subset, self.priority, self.weight
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub rule_name: String,
    pub direction: RouteDirection,
    /// `OR`'d: the rule applies if any one source clause matches. An empty
    /// list matches every caller.
    #[serde(default)]
    pub sources: Vec<SourceMatch>,
    pub destinations: Vec<Destination>,
}

impl RouteRule {
    pub fn is_valid(&self) -> Result<()> {
        if self.rule_name.is_empty() {
            return Err(Error::msg("route rule: empty rule_name"));
        }
        if self.destinations.is_empty() {
            return Err(Error::msg("route rule: at least one destination is required"));
        }
        for dest in &self.destinations {
            dest.is_valid()?;
        }
        Ok(())
    }

    pub fn matches_source(
        &self,
        namespace: &str,
        service: &str,
        labels: &HashMap<String, String>,
        variables: &HashMap<String, String>,
        check_identity: bool,
    ) -> bool {
        self.sources.is_empty()
            || self
                .sources
                .iter()
                .any(|source| source.matches(namespace, service, labels, variables, check_identity))
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn base_rule() -> RouteRule {
        RouteRule {
            rule_name: "r1".into(),
            direction: RouteDirection::Outbound,
            sources: vec![],
            destinations: vec![Destination {
                namespace: "ns".into(),
                service: "svc".into(),
                subset: "canary".into(),
                labels: HashMap::new(),
                priority: 0,
                weight: 100,
                isolate: false,
            }],
        }
    }

    #[test]
    fn valid_rule_passes() {
        assert!(base_rule().is_valid().is_ok());
    }

    #[test]
    fn empty_destinations_is_invalid() {
        let mut rule = base_rule();
        rule.destinations.clear();
        assert!(rule.is_valid().is_err());
    }

    #[test]
    fn empty_sources_matches_any_caller() {
        let rule = base_rule();
        assert!(rule.matches_source("ns", "caller", &HashMap::new(), &HashMap::new(), true));
    }

    #[test]
    fn source_matches_any_of_several_clauses() {
        let mut rule = base_rule();
        rule.sources = vec![
            SourceMatch {
                namespace: None,
                service: Some(MatchString::exact("alpha")),
                labels: HashMap::new(),
            },
            SourceMatch {
                namespace: None,
                service: Some(MatchString::exact("beta")),
                labels: HashMap::new(),
            },
        ];
        assert!(rule.matches_source("ns", "beta", &HashMap::new(), &HashMap::new(), true));
        assert!(!rule.matches_source("ns", "gamma", &HashMap::new(), &HashMap::new(), true));
    }

    #[test]
    fn outbound_check_skips_identity_and_matches_on_labels_only() {
        let mut rule = base_rule();
        rule.sources = vec![SourceMatch {
            namespace: None,
            service: Some(MatchString::exact("alpha")),
            labels: HashMap::new(),
        }];
        // service name "gamma" doesn't match "alpha", but check_identity=false
        // (outbound) skips that check entirely - an empty labels predicate set
        // matches unconditionally.
        assert!(rule.matches_source("ns", "gamma", &HashMap::new(), &HashMap::new(), false));
    }
}
