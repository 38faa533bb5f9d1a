//! Hosted zones and alias records.

use stratus_common::error::Result;
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

use super::add_construct;

/// A hosted zone, created here or imported by attributes.
#[derive(Debug, Clone)]
pub struct HostedZone {
    zone_id: Value,
    zone_name: String,
}

impl HostedZone {
    /// Imports an existing zone.
    pub fn from_attributes(zone_id: impl Into<String>, zone_name: impl Into<String>) -> Self {
        Self {
            zone_id: Value::String(zone_id.into()),
            zone_name: zone_name.into(),
        }
    }

    /// Zone id.
    #[must_use]
    pub fn hosted_zone_id(&self) -> Value {
        self.zone_id.clone()
    }

    /// Zone apex, without a trailing dot.
    #[must_use]
    pub fn zone_name(&self) -> &str {
        self.zone_name.trim_end_matches('.')
    }
}

/// A public hosted zone created in the template.
#[derive(Debug, Clone)]
pub struct PublicHostedZone {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::Route53::HostedZone` resource.
    pub resource: NodeId,
    zone: HostedZone,
}

impl PublicHostedZone {
    /// Creates a public zone for `zone_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the id is taken.
    pub fn new(tree: &mut ConstructTree, scope: NodeId, id: &str, zone_name: &str) -> Result<Self> {
        let apex = zone_name.trim_end_matches('.');
        let resource =
            Resource::new("AWS::Route53::HostedZone").with_property("Name", format!("{apex}."));
        let (node, resource) = add_construct(tree, scope, id, resource)?;
        if apex.is_empty() {
            return Err(tree.error(node, "zone name must not be empty"));
        }
        Ok(Self {
            node,
            resource,
            zone: HostedZone {
                zone_id: Value::Ref(resource),
                zone_name: apex.to_string(),
            },
        })
    }

    /// The zone as a [`HostedZone`].
    #[must_use]
    pub const fn as_zone(&self) -> &HostedZone {
        &self.zone
    }
}

/// Where an alias record points.
#[derive(Debug, Clone)]
pub enum RecordTarget {
    /// A load balancer alias.
    LoadBalancer {
        /// DNS name of the load balancer.
        dns_name: Value,
        /// Zone id that hosts the load balancer's name.
        canonical_hosted_zone_id: Value,
    },
}

impl RecordTarget {
    fn alias_target(&self) -> Value {
        match self {
            Self::LoadBalancer {
                dns_name,
                canonical_hosted_zone_id,
            } => Value::object([
                (
                    "DNSName",
                    Value::join("", vec!["dualstack.".into(), dns_name.clone()]),
                ),
                ("HostedZoneId", canonical_hosted_zone_id.clone()),
            ]),
        }
    }
}

/// An `A` alias record.
#[derive(Debug, Clone)]
pub struct ARecord {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::Route53::RecordSet` resource.
    pub resource: NodeId,
    domain_name: String,
}

impl ARecord {
    /// Creates a record in `zone`. Without a record name the zone apex is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        zone: &HostedZone,
        record_name: Option<&str>,
        target: &RecordTarget,
    ) -> Result<Self> {
        let domain_name = record_name.map_or_else(
            || zone.zone_name().to_string(),
            |name| fully_qualified_domain_name(name, zone.zone_name()),
        );
        tracing::debug!(record = %domain_name, zone = zone.zone_name(), "adding alias record");
        let resource = Resource::new("AWS::Route53::RecordSet")
            .with_property("Name", format!("{domain_name}."))
            .with_property("Type", "A")
            .with_property("HostedZoneId", zone.hosted_zone_id())
            .with_property("AliasTarget", target.alias_target());
        let (node, resource) = add_construct(tree, scope, id, resource)?;
        Ok(Self {
            node,
            resource,
            domain_name,
        })
    }

    /// Fully qualified record name, without a trailing dot.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }
}

/// Qualifies `record_name` with `zone_name`.
///
/// A trailing dot is dropped. Names that already end in the zone, or equal
/// it, are returned as they are.
#[must_use]
pub fn fully_qualified_domain_name(record_name: &str, zone_name: &str) -> String {
    let record = record_name.trim_end_matches('.');
    let zone = zone_name.trim_end_matches('.');
    if record == zone || record.ends_with(&format!(".{zone}")) {
        record.to_string()
    } else {
        format!("{record}.{zone}")
    }
}
