//! Domain types for the Mist placement optimizer.
//!
//! Entities are loaded once from configuration and never mutated after
//! the model is built. Identifiers are not part of the documents
//! themselves: they are the keys of the collection each entity lives in
//! and are injected by the normalizer.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Unique identifier for a node (execution host or requestor).
pub type NodeId = String;

/// Unique identifier for a deployable service.
pub type ServiceId = String;

/// Unique identifier for a placement request.
pub type RequestId = String;

/// Free-form metadata attached to nodes, services and requests.
pub type Metadata = BTreeMap<String, MetadataValue>;

pub type Nodes = BTreeMap<NodeId, Node>;
pub type Services = BTreeMap<ServiceId, Service>;
pub type Requests = BTreeMap<RequestId, Request>;

// ── Metadata ──────────────────────────────────────────────────────

/// A scalar metadata value.
///
/// Values of different kinds never compare: `Number(3.0)` is neither
/// below nor above `Text("3")`, so a bound on one can never be satisfied
/// by the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a.partial_cmp(b),
            (MetadataValue::Number(a), MetadataValue::Number(b)) => a.partial_cmp(b),
            (MetadataValue::Text(a), MetadataValue::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

// ── Resources ─────────────────────────────────────────────────────

/// One of the three capacity dimensions tracked per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Ram,
    Cpu,
    Storage,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Ram, Resource::Cpu, Resource::Storage];

    pub fn name(self) -> &'static str {
        match self {
            Resource::Ram => "ram",
            Resource::Cpu => "cpu",
            Resource::Storage => "storage",
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A candidate execution host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(skip)]
    pub id: NodeId,
    pub ram: f64,
    pub cpu: f64,
    pub storage: f64,
    pub owner: String,
    /// Distance from this node to other nodes (requestors).
    #[serde(default)]
    pub location: BTreeMap<NodeId, f64>,
    /// Latency from this node to requestors.
    #[serde(default)]
    pub latency: BTreeMap<NodeId, f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Node {
    pub fn capacity(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Ram => self.ram,
            Resource::Cpu => self.cpu,
            Resource::Storage => self.storage,
        }
    }

    /// Distance to `other`. Unknown pairs count as zero.
    pub fn distance_to(&self, other: &str) -> f64 {
        self.location.get(other).copied().unwrap_or(0.0)
    }

    /// Latency to `other`. Unknown pairs count as zero.
    pub fn latency_to(&self, other: &str) -> f64 {
        self.latency.get(other).copied().unwrap_or(0.0)
    }
}

// ── Service ───────────────────────────────────────────────────────

/// A deployable workload type.
///
/// The footprint is charged once per node hosting the service, no matter
/// how many requests for it land there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(skip)]
    pub id: ServiceId,
    pub developer: String,
    pub ram: f64,
    pub cpu: f64,
    pub storage: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Service {
    pub fn footprint(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Ram => self.ram,
            Resource::Cpu => self.cpu,
            Resource::Storage => self.storage,
        }
    }
}

// ── Request ───────────────────────────────────────────────────────

/// A requestor node asking for an instance of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(skip)]
    pub id: RequestId,
    /// The requesting node.
    pub node: NodeId,
    pub service: ServiceId,
    #[serde(default)]
    pub metadata: Metadata,
}

// ── Policies ──────────────────────────────────────────────────────

/// Constraint authored by a node owner on which tenants the node accepts.
///
/// Only honoured when `user` is the owner of `node`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub node: NodeId,
    pub user: String,
    /// Maximum share of RAM (percent) that services may use.
    pub max_ram: Option<f64>,
    pub max_cpu: Option<f64>,
    pub max_storage: Option<f64>,
    pub allowed_developers: Option<BTreeSet<String>>,
    pub allowed_users: Option<BTreeSet<String>>,
    pub max_distance: Option<f64>,
    pub max_latency: Option<f64>,
    pub forced_metadata: Option<Metadata>,
    pub upper_bound_metadata: Option<Metadata>,
    pub lower_bound_metadata: Option<Metadata>,
}

/// Percentage used when a policy does not limit a resource.
pub const FULL_CAPACITY_PERCENT: f64 = 100.0;

impl ResourcePolicy {
    pub fn new(node: &str, user: &str) -> Self {
        Self {
            node: node.to_string(),
            user: user.to_string(),
            ..Default::default()
        }
    }

    /// The percentage of `resource` this policy allows services to use.
    pub fn max_percent(&self, resource: Resource) -> f64 {
        let limit = match resource {
            Resource::Ram => self.max_ram,
            Resource::Cpu => self.max_cpu,
            Resource::Storage => self.max_storage,
        };
        limit.unwrap_or(FULL_CAPACITY_PERCENT)
    }
}

/// Constraint authored by a service developer on which hosts it accepts.
///
/// Only honoured when `developer` is the developer of `service`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePolicy {
    pub service: ServiceId,
    pub developer: String,
    pub forced_metadata: Option<Metadata>,
    pub upper_bound_metadata: Option<Metadata>,
    pub lower_bound_metadata: Option<Metadata>,
    pub allowed_owners: Option<BTreeSet<String>>,
}

impl ServicePolicy {
    pub fn new(service: &str, developer: &str) -> Self {
        Self {
            service: service.to_string(),
            developer: developer.to_string(),
            ..Default::default()
        }
    }
}

/// Flavor of a metadata compatibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataRule {
    /// Value must equal the policy value.
    Forced,
    /// Value must not exceed the policy value.
    UpperBound,
    /// Value must not fall below the policy value.
    LowerBound,
}

impl MetadataRule {
    pub const ALL: [MetadataRule; 3] = [
        MetadataRule::Forced,
        MetadataRule::UpperBound,
        MetadataRule::LowerBound,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetadataRule::Forced => "forced_metadata",
            MetadataRule::UpperBound => "upper_bound_metadata",
            MetadataRule::LowerBound => "lower_bound_metadata",
        }
    }

    /// Whether `actual` satisfies the rule for every key in `governed`.
    ///
    /// A governed key missing from `actual`, or holding a value of a
    /// different kind, fails the rule.
    pub fn is_satisfied(self, governed: &Metadata, actual: &Metadata) -> bool {
        governed.iter().all(|(key, bound)| {
            let Some(value) = actual.get(key) else {
                return false;
            };
            match self {
                MetadataRule::Forced => value == bound,
                MetadataRule::UpperBound => {
                    matches!(value.partial_cmp(bound), Some(Ordering::Less | Ordering::Equal))
                }
                MetadataRule::LowerBound => {
                    matches!(value.partial_cmp(bound), Some(Ordering::Greater | Ordering::Equal))
                }
            }
        })
    }
}

impl ResourcePolicy {
    pub fn metadata(&self, rule: MetadataRule) -> Option<&Metadata> {
        match rule {
            MetadataRule::Forced => self.forced_metadata.as_ref(),
            MetadataRule::UpperBound => self.upper_bound_metadata.as_ref(),
            MetadataRule::LowerBound => self.lower_bound_metadata.as_ref(),
        }
    }
}

impl ServicePolicy {
    pub fn metadata(&self, rule: MetadataRule) -> Option<&Metadata> {
        match rule {
            MetadataRule::Forced => self.forced_metadata.as_ref(),
            MetadataRule::UpperBound => self.upper_bound_metadata.as_ref(),
            MetadataRule::LowerBound => self.lower_bound_metadata.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn numbers_and_text_do_not_compare() {
        let n = MetadataValue::from(3.0);
        let t = MetadataValue::from("3");
        assert_eq!(n.partial_cmp(&t), None);
        assert_ne!(n, t);
    }

    #[test]
    fn upper_bound_accepts_equal_value() {
        let governed = meta(&[("gpu_mem", 8.0.into())]);
        let actual = meta(&[("gpu_mem", 8.0.into())]);
        assert!(MetadataRule::UpperBound.is_satisfied(&governed, &actual));
        assert!(MetadataRule::LowerBound.is_satisfied(&governed, &actual));
    }

    #[test]
    fn bounds_reject_out_of_range_values() {
        let governed = meta(&[("cores", 4.0.into())]);
        let high = meta(&[("cores", 6.0.into())]);
        let low = meta(&[("cores", 2.0.into())]);
        assert!(!MetadataRule::UpperBound.is_satisfied(&governed, &high));
        assert!(MetadataRule::UpperBound.is_satisfied(&governed, &low));
        assert!(MetadataRule::LowerBound.is_satisfied(&governed, &high));
        assert!(!MetadataRule::LowerBound.is_satisfied(&governed, &low));
    }

    #[test]
    fn missing_key_fails_every_rule() {
        let governed = meta(&[("arch", "arm64".into())]);
        let actual = Metadata::new();
        for rule in MetadataRule::ALL {
            assert!(!rule.is_satisfied(&governed, &actual), "{}", rule.name());
        }
    }

    #[test]
    fn forced_requires_exact_match() {
        let governed = meta(&[("arch", "arm64".into()), ("secure", true.into())]);
        let matching = meta(&[("arch", "arm64".into()), ("secure", true.into())]);
        let partial = meta(&[("arch", "arm64".into()), ("secure", false.into())]);
        assert!(MetadataRule::Forced.is_satisfied(&governed, &matching));
        assert!(!MetadataRule::Forced.is_satisfied(&governed, &partial));
    }

    #[test]
    fn unset_limits_default_to_full_capacity() {
        let mut policy = ResourcePolicy::new("n1", "alice");
        policy.max_cpu = Some(40.0);
        assert_eq!(policy.max_percent(Resource::Ram), FULL_CAPACITY_PERCENT);
        assert_eq!(policy.max_percent(Resource::Cpu), 40.0);
    }

    #[test]
    fn missing_location_means_zero_distance() {
        let node: Node = serde_json::from_str(
            r#"{"ram": 4, "cpu": 2, "storage": 10, "owner": "alice", "location": {"n2": 7.5}}"#,
        )
        .unwrap();
        assert_eq!(node.distance_to("n2"), 7.5);
        assert_eq!(node.distance_to("n3"), 0.0);
        assert_eq!(node.latency_to("n2"), 0.0);
    }

    #[test]
    fn metadata_values_deserialize_untagged() {
        let parsed: Metadata =
            serde_json::from_str(r#"{"a": 1, "b": 2.5, "c": "x", "d": true}"#).unwrap();
        assert_eq!(parsed["a"], MetadataValue::Number(1.0));
        assert_eq!(parsed["b"], MetadataValue::Number(2.5));
        assert_eq!(parsed["c"], MetadataValue::Text("x".to_string()));
        assert_eq!(parsed["d"], MetadataValue::Bool(true));
    }
}
