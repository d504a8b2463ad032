//! Rule-based service router: label matching ([`matcher`]), the route rule
//! data model ([`rule`]) and [`router::RuleRouter`] which evaluates a
//! candidate instance pool against those rules.

pub mod matcher;
pub mod router;
pub mod rule;

pub use matcher::{MatchOperator, MatchString};
pub use router::{Instance, InstanceSource, RouteRequest, RuleRouter};
pub use rule::{Destination, RouteDirection, RouteRule, SourceMatch};
