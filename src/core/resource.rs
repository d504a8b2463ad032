use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `Resource` is the stable identity of a target of circuit breaking: a
/// service, a method on a service, a named subset of a service, or a single
/// instance. Resources are immutable and compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Service {
        namespace: String,
        service: String,
    },
    Method {
        namespace: String,
        service: String,
        method: String,
    },
    Subset {
        namespace: String,
        service: String,
        subset: String,
        /// `BTreeMap` rather than `HashMap` so two resources built from the
        /// same metadata always hash and compare equal regardless of the
        /// order keys were inserted in.
        metadata: BTreeMap<String, String>,
    },
    Instance {
        namespace: String,
        service: String,
        host: String,
        port: u32,
    },
}

impl Resource {
    pub fn service(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Resource::Service {
            namespace: namespace.into(),
            service: service.into(),
        }
    }

    pub fn method(
        namespace: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Resource::Method {
            namespace: namespace.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    pub fn subset(
        namespace: impl Into<String>,
        service: impl Into<String>,
        subset: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Resource::Subset {
            namespace: namespace.into(),
            service: service.into(),
            subset: subset.into(),
            metadata,
        }
    }

    pub fn instance(
        namespace: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
        port: u32,
    ) -> Self {
        Resource::Instance {
            namespace: namespace.into(),
            service: service.into(),
            host: host.into(),
            port,
        }
    }

    /// The (namespace, service) pair every resource variant carries.
    pub fn namespace_service(&self) -> (&str, &str) {
        match self {
            Resource::Service { namespace, service }
            | Resource::Method {
                namespace, service, ..
            }
            | Resource::Subset {
                namespace, service, ..
            }
            | Resource::Instance {
                namespace, service, ..
            } => (namespace, service),
        }
    }

    /// The rule level this resource resolves rules at, most-specific-wins.
    pub fn level(&self) -> Level {
        match self {
            Resource::Service { .. } => Level::Service,
            Resource::Method { .. } => Level::Method,
            Resource::Subset { .. } => Level::Subset,
            Resource::Instance { .. } => Level::Instance,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Service { namespace, service } => write!(f, "{}/{}", namespace, service),
            Resource::Method {
                namespace,
                service,
                method,
            } => write!(f, "{}/{}#{}", namespace, service, method),
            Resource::Subset {
                namespace,
                service,
                subset,
                ..
            } => write!(f, "{}/{}${}", namespace, service, subset),
            Resource::Instance {
                namespace,
                service,
                host,
                port,
            } => write!(f, "{}/{}@{}:{}", namespace, service, host, port),
        }
    }
}

/// Rule precedence level. Most-specific wins: `Method` > `Service` > `Subset` > `Instance`.
/// A resource carrying a method name always resolves its rule ahead of one
/// that only names the owning service, even if both levels have a matching
/// rule configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Method,
    Service,
    Subset,
    Instance,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equality_is_by_value() {
        let a = Resource::service("ns", "svc");
        let b = Resource::service("ns", "svc");
        assert_eq!(a, b);

        let c = Resource::service("ns", "other");
        assert_ne!(a, c);
    }

    #[test]
    fn subset_metadata_order_independent() {
        let mut m1 = BTreeMap::new();
        m1.insert("region".to_string(), "west".to_string());
        m1.insert("az".to_string(), "1".to_string());
        let mut m2 = BTreeMap::new();
        m2.insert("az".to_string(), "1".to_string());
        m2.insert("region".to_string(), "west".to_string());
        assert_eq!(
            Resource::subset("ns", "svc", "canary", m1),
            Resource::subset("ns", "svc", "canary", m2)
        );
    }

    #[test]
    fn level_precedence_ordering() {
        let mut levels = vec![Level::Instance, Level::Subset, Level::Service, Level::Method];
        levels.sort();
        assert_eq!(
            levels,
            vec![Level::Method, Level::Service, Level::Subset, Level::Instance]
        );
    }
}
