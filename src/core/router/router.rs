//! `RuleRouter`: evaluates a candidate instance pool against the configured
//! inbound and outbound route rule sets, producing a single selected instance
//! (or `None` if no destination is presently reachable and the effective
//! failover policy is `None`).

use super::rule::{Destination, RouteDirection, RouteRule};
use crate::config::FailoverType;
use crate::core::circuitbreaker::BreakerRegistry;
use crate::core::resource::Resource;
use crate::utils::is_wildcard;
use rand::distributions::{Distribution, WeightedIndex};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// One instance in the candidate pool handed to `route()`. Discovery and
/// health tracking are a host application's responsibility; this crate only
/// consumes the resulting flat list.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub namespace: String,
    pub service: String,
    pub host: String,
    pub port: u32,
    /// Empty when the instance belongs to no named subset.
    pub subset: String,
    pub labels: HashMap<String, String>,
    pub healthy: bool,
}

impl Instance {
    pub fn resource(&self) -> Resource {
        Resource::instance(&self.namespace, &self.service, &self.host, self.port)
    }
}

/// A host-provided push stream of instance list updates. This crate only
/// defines the seam; subscribing to a discovery protocol and re-invoking
/// `route` with a fresh pool on every call is left to the host application.
pub trait InstanceSource: Send + Sync {
    fn instances(&self, namespace: &str, service: &str) -> Vec<Instance>;
}

pub struct RouteRequest<'a> {
    pub source_namespace: &'a str,
    pub source_service: &'a str,
    pub source_labels: &'a HashMap<String, String>,
    /// The service this call is destined for. Only consulted by outbound
    /// rules, whose destinations must name this (namespace, service) pair
    /// (wildcard-aware) since outbound source clauses skip the caller-identity
    /// check.
    pub dest_namespace: &'a str,
    pub dest_service: &'a str,
    pub instances: &'a [Instance],
    /// Per-call override of the process-wide failover policy. `None` defers
    /// to `config::failover_type()`.
    pub failover_override: Option<FailoverType>,
    /// Whether the router is allowed to apply rules for this call at all.
    /// Mirrors the per-call `enabled` metadata flag in the routing
    /// specification; `false` forces a plain passthrough over `instances`.
    pub enabled: bool,
}

impl<'a> RouteRequest<'a> {
    /// Convenience constructor for the common case: no per-call failover
    /// override, router enabled.
    pub fn new(
        source_namespace: &'a str,
        source_service: &'a str,
        source_labels: &'a HashMap<String, String>,
        dest_namespace: &'a str,
        dest_service: &'a str,
        instances: &'a [Instance],
    ) -> Self {
        RouteRequest {
            source_namespace,
            source_service,
            source_labels,
            dest_namespace,
            dest_service,
            instances,
            failover_override: None,
            enabled: true,
        }
    }
}

/// Outcome of evaluating one direction's rule set against a request.
enum EvalOutcome {
    /// A rule matched the source and resolved to an instance.
    Matched(Instance),
    /// A rule's source matched but its destinations resolved to nothing -
    /// the routing specification calls this `destRuleFail`/`sourceRuleFail`
    /// and has it skip straight to the failover step rather than trying the
    /// next rule set.
    SourceMatchedEmpty,
    /// No rule's source matched this request at all.
    NoSourceMatch,
}

/// Inbound and outbound rule sets, plus the breaker registry consulted to
/// exclude tripped destination subsets and the global variable map available
/// to `$variable` substitution.
pub struct RuleRouter {
    rules: RwLock<Vec<RouteRule>>,
    breaker_registry: Option<Arc<BreakerRegistry>>,
    global_variables: RwLock<HashMap<String, String>>,
}

impl Default for RuleRouter {
    fn default() -> Self {
        RuleRouter {
            rules: RwLock::new(Vec::new()),
            breaker_registry: None,
            global_variables: RwLock::new(HashMap::new()),
        }
    }
}

impl RuleRouter {
    pub fn new(breaker_registry: Arc<BreakerRegistry>, global_variables: HashMap<String, String>) -> Self {
        RuleRouter {
            rules: RwLock::new(Vec::new()),
            breaker_registry: Some(breaker_registry),
            global_variables: RwLock::new(global_variables),
        }
    }

    pub fn load_rules(&self, rules: Vec<RouteRule>) -> crate::Result<()> {
        for rule in &rules {
            rule.is_valid()?;
        }
        *self.rules.write().unwrap() = rules;
        Ok(())
    }

    pub fn set_global_variable(&self, key: impl Into<String>, value: impl Into<String>) {
        self.global_variables
            .write()
            .unwrap()
            .insert(key.into(), value.into());
    }

    /// Evaluates `request` against the inbound rule set first, falling back
    /// to the outbound rule set within the same call per the routing
    /// specification's two-phase algorithm, then applying the effective
    /// failover policy if neither phase resolved an instance.
    pub fn route(&self, request: &RouteRequest) -> Option<Instance> {
        let variables = self.variables_for(request.source_labels);
        let (inbound, outbound): (Vec<RouteRule>, Vec<RouteRule>) = {
            let rules = self.rules.read().unwrap();
            rules
                .iter()
                .cloned()
                .partition(|rule| rule.direction == RouteDirection::Inbound)
        };

        if self.is_disabled(request, &inbound, &outbound) {
            return pick_uniform(healthy(request.instances));
        }

        if !inbound.is_empty() {
            match self.evaluate_rules(&inbound, request, &variables, true) {
                EvalOutcome::Matched(instance) => return Some(instance),
                // a matched inbound rule resolved to nothing: per the
                // specification this is `destRuleFail` and skips outbound
                // entirely, going straight to failover.
                EvalOutcome::SourceMatchedEmpty => return self.failover(request),
                EvalOutcome::NoSourceMatch => {}
            }
        }

        if !outbound.is_empty() {
            match self.evaluate_rules(&outbound, request, &variables, false) {
                EvalOutcome::Matched(instance) => return Some(instance),
                EvalOutcome::SourceMatchedEmpty | EvalOutcome::NoSourceMatch => {}
            }
        }

        self.failover(request)
    }

    /// Disabled when there's no source service to route on behalf of, the
    /// call explicitly opts out, or there are no rules of either direction to
    /// apply - in all three cases routing degrades to a plain passthrough.
    fn is_disabled(&self, request: &RouteRequest, inbound: &[RouteRule], outbound: &[RouteRule]) -> bool {
        request.source_service.is_empty()
            || !request.enabled
            || !crate::config::router_enabled()
            || (inbound.is_empty() && outbound.is_empty())
    }

    fn failover(&self, request: &RouteRequest) -> Option<Instance> {
        match request.failover_override.unwrap_or_else(crate::config::failover_type) {
            FailoverType::None => None,
            FailoverType::All => pick_uniform(healthy(request.instances)),
        }
    }

    fn variables_for(&self, source_labels: &HashMap<String, String>) -> HashMap<String, String> {
        let mut variables = self.global_variables.read().unwrap().clone();
        for (key, value) in source_labels {
            variables.insert(key.clone(), value.clone());
        }
        variables
    }

    /// Tries each rule in order: the first whose source matches and whose
    /// destinations resolve to an instance wins. A rule whose source matches
    /// but whose destinations resolve to nothing stops the scan rather than
    /// falling through to the next rule.
    fn evaluate_rules(
        &self,
        rules: &[RouteRule],
        request: &RouteRequest,
        variables: &HashMap<String, String>,
        is_inbound: bool,
    ) -> EvalOutcome {
        let mut any_source_matched = false;
        for rule in rules {
            if !rule.matches_source(
                request.source_namespace,
                request.source_service,
                request.source_labels,
                variables,
                is_inbound,
            ) {
                continue;
            }
            any_source_matched = true;
            if let Some(instance) = self.resolve_destination(rule, request, variables, is_inbound) {
                return EvalOutcome::Matched(instance);
            }
        }
        if any_source_matched {
            EvalOutcome::SourceMatchedEmpty
        } else {
            EvalOutcome::NoSourceMatch
        }
    }

    /// Groups the rule's eligible destinations by ascending priority and
    /// draws a weighted pick from the first non-empty group.
    ///
    /// Breaker-tripped destinations are excluded on the first pass. Only if
    /// that leaves every priority group empty - meaning the rule would
    /// otherwise resolve nothing at all - is the pass retried with breaker
    /// filtering disabled, retaining the broken destinations as a last
    /// resort rather than producing an outright empty result. A priority
    /// group that's merely short of matching instances for reasons unrelated
    /// to the breaker correctly falls through to the next group on the first
    /// pass; the retry only ever fires rule-wide, once every group has
    /// already been tried.
    fn resolve_destination(
        &self,
        rule: &RouteRule,
        request: &RouteRequest,
        variables: &HashMap<String, String>,
        is_inbound: bool,
    ) -> Option<Instance> {
        let mut eligible: Vec<&Destination> = Vec::new();
        for dest in &rule.destinations {
            if destination_eligible(dest, request, is_inbound) {
                eligible.push(dest);
            }
        }

        let not_broken: Vec<&Destination> = eligible
            .iter()
            .filter(|dest| !self.is_broken(*dest))
            .copied()
            .collect();

        if let Some(instance) = self.pick_from_priority_groups(&not_broken, request, variables) {
            return Some(instance);
        }
        if not_broken.len() == eligible.len() {
            return None;
        }
        self.pick_from_priority_groups(&eligible, request, variables)
    }

    fn pick_from_priority_groups(
        &self,
        destinations: &[&Destination],
        request: &RouteRequest,
        variables: &HashMap<String, String>,
    ) -> Option<Instance> {
        let mut by_priority: BTreeMap<u32, Vec<&Destination>> = BTreeMap::new();
        for dest in destinations {
            by_priority.entry(dest.priority).or_default().push(*dest);
        }

        for (_, dests) in by_priority {
            let mut buckets: Vec<(&Destination, Vec<Instance>)> = Vec::new();
            for dest in dests {
                let mut matched = Vec::new();
                for instance in request.instances {
                    if instance_matches_destination(dest, instance, variables) {
                        matched.push(instance.clone());
                    }
                }
                buckets.push((dest, matched));
            }

            if let Some(instance) = pick_weighted_destination(&buckets) {
                return Some(instance);
            }
        }
        None
    }

    fn is_broken(&self, dest: &Destination) -> bool {
        let registry = match &self.breaker_registry {
            Some(registry) => registry,
            None => return false,
        };
        if dest.subset.is_empty() {
            return false;
        }
        let resource = Resource::subset(&dest.namespace, &dest.service, &dest.subset, BTreeMap::new());
        registry.is_broken(&resource)
    }
}

/// Destination-level eligibility, independent of any particular instance:
/// isolated or zero-weight destinations are dropped outright, and outbound
/// destinations must additionally name the service this call is destined
/// for (wildcard-aware), since outbound source clauses don't check identity.
fn destination_eligible(dest: &Destination, request: &RouteRequest, is_inbound: bool) -> bool {
    if dest.isolate || dest.weight == 0 {
        return false;
    }
    if is_inbound {
        return true;
    }
    wildcard_eq(&dest.namespace, request.dest_namespace) && wildcard_eq(&dest.service, request.dest_service)
}

fn wildcard_eq(rule_value: &str, actual: &str) -> bool {
    is_wildcard(rule_value) || rule_value == actual
}

fn instance_matches_destination(
    dest: &Destination,
    instance: &Instance,
    variables: &HashMap<String, String>,
) -> bool {
    if !instance.healthy {
        return false;
    }
    if dest.namespace != instance.namespace || dest.service != instance.service {
        return false;
    }
    if !dest.subset.is_empty() && dest.subset != instance.subset {
        return false;
    }
    super::matcher::match_labels(&dest.labels, &instance.labels, variables)
}

fn healthy(instances: &[Instance]) -> Vec<Instance> {
    instances.iter().filter(|i| i.healthy).cloned().collect()
}

fn pick_uniform(candidates: Vec<Instance>) -> Option<Instance> {
    if candidates.is_empty() {
        return None;
    }
    let idx = rand::random::<usize>() % candidates.len();
    Some(candidates[idx].clone())
}

/// Weighted random selection over destinations, not instances: a
/// destination's draw probability is its own `weight` relative to the other
/// destinations in the same priority group, independent of how many
/// instances happen to belong to it. The winning destination's instance is
/// then picked uniformly from its own matched set.
fn pick_weighted_destination(buckets: &[(&Destination, Vec<Instance>)]) -> Option<Instance> {
    let nonempty: Vec<&(&Destination, Vec<Instance>)> =
        buckets.iter().filter(|(_, instances)| !instances.is_empty()).collect();
    if nonempty.is_empty() {
        return None;
    }
    if nonempty.iter().all(|(dest, _)| dest.weight == 0) {
        let idx = rand::random::<usize>() % nonempty.len();
        return pick_uniform(nonempty[idx].1.clone());
    }
    let weights: Vec<u32> = nonempty.iter().map(|(dest, _)| dest.weight).collect();
    let dist = match WeightedIndex::new(&weights) {
        Ok(dist) => dist,
        Err(_) => return pick_uniform(nonempty[0].1.clone()),
    };
    let idx = dist.sample(&mut rand::thread_rng());
    pick_uniform(nonempty[idx].1.clone())
}
