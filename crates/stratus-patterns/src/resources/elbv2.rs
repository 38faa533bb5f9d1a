//! Application and network load balancers, listeners, and target groups.
//!
//! Listener default actions live in a fragment below the listener and are
//! rendered lazily, so a target group can be attached after the listener is
//! built. Late validators report listeners that never received one.

use std::fmt;

use serde::{Deserialize, Serialize};
use stratus_common::constants::{
    MAX_IDLE_TIMEOUT_SECS, MAX_LOAD_BALANCER_NAME_LENGTH, MIN_IDLE_TIMEOUT_SECS,
};
use stratus_common::error::Result;
use stratus_common::types::Severity;
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

use super::acm::Certificate;
use super::ec2::{Peer, SecurityGroup, SubnetType, Vpc};
use super::route53::RecordTarget;
use super::{add_construct, push_property, set_property};

const DEFAULT_ACTION_ID: &str = "DefaultAction";
const MIN_RULE_PRIORITY: u32 = 1;
const MAX_RULE_PRIORITY: u32 = 50_000;

/// Listener and target protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Raw TCP.
    Tcp,
    /// TCP with TLS termination.
    Tls,
    /// UDP.
    Udp,
    /// TCP and UDP on the same port.
    TcpUdp,
}

impl Protocol {
    /// Template representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Udp => "UDP",
            Self::TcpUdp => "TCP_UDP",
        }
    }

    /// Well-known port of the protocol.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Https | Self::Tls => 443,
            _ => 80,
        }
    }

    /// URL scheme used in service URLs.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
            Self::Udp => "udp",
            Self::TcpUdp => "tcp_udp",
        }
    }

    const fn is_application(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a target group addresses its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// EC2 instance ids (bridge and host networking).
    Instance,
    /// Task IP addresses (awsvpc networking).
    Ip,
}

impl TargetType {
    /// Template representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Ip => "ip",
        }
    }
}

/// Options shared by both load balancer kinds.
#[derive(Debug, Clone)]
pub struct LoadBalancerProps {
    /// VPC to place the load balancer in.
    pub vpc: Vpc,
    /// Public subnets and an internet-facing scheme when `true`.
    pub internet_facing: bool,
    /// Explicit load balancer name.
    pub name: Option<String>,
    /// Connection idle timeout (application load balancers only).
    pub idle_timeout_secs: Option<u32>,
    /// Security group to use instead of a generated one.
    pub security_group: Option<SecurityGroup>,
}

impl LoadBalancerProps {
    /// Internet-facing defaults for `vpc`.
    #[must_use]
    pub const fn new(vpc: Vpc) -> Self {
        Self {
            vpc,
            internet_facing: true,
            name: None,
            idle_timeout_secs: None,
            security_group: None,
        }
    }
}

fn check_load_balancer_name(name: &str) -> std::result::Result<(), String> {
    if name.len() > MAX_LOAD_BALANCER_NAME_LENGTH {
        return Err(format!(
            "Load balancer name: \"{name}\" can have a maximum of {MAX_LOAD_BALANCER_NAME_LENGTH} characters."
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!(
            "Load balancer name: \"{name}\" must contain only alphanumeric characters or hyphens."
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(format!("Load balancer name: \"{name}\" must not begin or end with a hyphen."));
    }
    if name.starts_with("internal-") {
        return Err(format!("Load balancer name: \"{name}\" must not begin with \"internal-\"."));
    }
    Ok(())
}

fn load_balancer_resource(kind: &str, props: &LoadBalancerProps) -> Resource {
    let (scheme, subnets) = if props.internet_facing {
        ("internet-facing", SubnetType::Public)
    } else {
        ("internal", SubnetType::Private)
    };
    let attributes = props.idle_timeout_secs.map(|secs| {
        Value::List(vec![Value::object([
            ("Key", Value::from("idle_timeout.timeout_seconds")),
            ("Value", secs.to_string().into()),
        ])])
    });
    Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
        .with_property("Type", kind)
        .with_property("Scheme", scheme)
        .with_property("Subnets", Value::List(props.vpc.select_subnets(subnets)))
        .with_property("Name", props.name.as_deref())
        .with_property("LoadBalancerAttributes", attributes)
}

fn check_load_balancer(tree: &ConstructTree, node: NodeId, props: &LoadBalancerProps) -> Result<()> {
    if let Some(name) = &props.name {
        check_load_balancer_name(name).map_err(|message| tree.error(node, message))?;
    }
    if let Some(secs) = props.idle_timeout_secs {
        if !(MIN_IDLE_TIMEOUT_SECS..=MAX_IDLE_TIMEOUT_SECS).contains(&secs) {
            return Err(tree.error(
                node,
                format!(
                    "idle timeout must be between {MIN_IDLE_TIMEOUT_SECS} and {MAX_IDLE_TIMEOUT_SECS} seconds, got {secs}"
                ),
            ));
        }
    }
    Ok(())
}

/// An application load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationLoadBalancer {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ElasticLoadBalancingV2::LoadBalancer` resource.
    pub resource: NodeId,
    /// Security group in front of the load balancer.
    pub security_group: SecurityGroup,
}

impl ApplicationLoadBalancer {
    /// Creates an application load balancer.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or idle timeout is out of range.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: &LoadBalancerProps,
    ) -> Result<Self> {
        let (node, resource) =
            add_construct(tree, scope, id, load_balancer_resource("application", props))?;
        check_load_balancer(tree, node, props)?;
        let security_group = match props.security_group {
            Some(group) => group,
            None => {
                let description = format!("Automatically created Security Group for ELB {}", tree.path(node));
                SecurityGroup::new(tree, node, "SecurityGroup", &props.vpc, &description, true)?
            }
        };
        set_property(
            tree,
            resource,
            "SecurityGroups",
            Value::List(vec![security_group.group_id()]),
        )?;
        tracing::debug!(path = %tree.path(node), internet_facing = props.internet_facing, "created application load balancer");
        Ok(Self {
            node,
            resource,
            security_group,
        })
    }

    /// Load balancer ARN.
    #[must_use]
    pub const fn arn(&self) -> Value {
        Value::Ref(self.resource)
    }

    /// Public DNS name.
    #[must_use]
    pub fn dns_name(&self) -> Value {
        Value::get_att(self.resource, "DNSName")
    }

    /// Zone id hosting the DNS name.
    #[must_use]
    pub fn canonical_hosted_zone_id(&self) -> Value {
        Value::get_att(self.resource, "CanonicalHostedZoneID")
    }

    /// Alias target pointing at this load balancer.
    #[must_use]
    pub fn record_target(&self) -> RecordTarget {
        RecordTarget::LoadBalancer {
            dns_name: self.dns_name(),
            canonical_hosted_zone_id: self.canonical_hosted_zone_id(),
        }
    }

    /// Adds a listener.
    ///
    /// # Errors
    ///
    /// See [`ApplicationListener::new`].
    pub fn add_listener(
        &self,
        tree: &mut ConstructTree,
        id: &str,
        props: ApplicationListenerProps,
    ) -> Result<ApplicationListener> {
        ApplicationListener::new(tree, *self, id, props)
    }

    /// Adds a listener that redirects plain HTTP to HTTPS.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken.
    pub fn add_redirect(
        &self,
        tree: &mut ConstructTree,
        id: &str,
        options: RedirectOptions,
    ) -> Result<ApplicationListener> {
        let listener = self.add_listener(
            tree,
            id,
            ApplicationListenerProps {
                port: Some(options.source_port),
                protocol: Some(Protocol::Http),
                open: options.open,
                ..ApplicationListenerProps::default()
            },
        )?;
        listener.set_default_action(
            tree,
            &ListenerAction::Redirect {
                protocol: Protocol::Https,
                port: options.target_port,
            },
        )?;
        Ok(listener)
    }
}

/// A network load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkLoadBalancer {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ElasticLoadBalancingV2::LoadBalancer` resource.
    pub resource: NodeId,
}

impl NetworkLoadBalancer {
    /// Creates a network load balancer.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an idle timeout is given.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: &LoadBalancerProps,
    ) -> Result<Self> {
        let (node, resource) =
            add_construct(tree, scope, id, load_balancer_resource("network", props))?;
        if props.idle_timeout_secs.is_some() {
            return Err(tree.error(node, "idle timeout is only supported by application load balancers"));
        }
        check_load_balancer(tree, node, props)?;
        Ok(Self { node, resource })
    }

    /// Public DNS name.
    #[must_use]
    pub fn dns_name(&self) -> Value {
        Value::get_att(self.resource, "DNSName")
    }

    /// Zone id hosting the DNS name.
    #[must_use]
    pub fn canonical_hosted_zone_id(&self) -> Value {
        Value::get_att(self.resource, "CanonicalHostedZoneID")
    }

    /// Alias target pointing at this load balancer.
    #[must_use]
    pub fn record_target(&self) -> RecordTarget {
        RecordTarget::LoadBalancer {
            dns_name: self.dns_name(),
            canonical_hosted_zone_id: self.canonical_hosted_zone_id(),
        }
    }

    /// Adds a listener.
    ///
    /// # Errors
    ///
    /// See [`NetworkListener::new`].
    pub fn add_listener(
        &self,
        tree: &mut ConstructTree,
        id: &str,
        props: NetworkListenerProps,
    ) -> Result<NetworkListener> {
        NetworkListener::new(tree, *self, id, props)
    }
}

/// What a listener does with a matching request.
#[derive(Debug, Clone)]
pub enum ListenerAction {
    /// Forward to a target group.
    Forward(Value),
    /// Answer with a permanent redirect.
    Redirect {
        /// Target protocol.
        protocol: Protocol,
        /// Target port.
        port: u16,
    },
}

impl ListenerAction {
    /// Forwards to `target_group`.
    pub fn forward(target_group: &impl TargetGroup) -> Self {
        Self::Forward(target_group.arn())
    }

    fn render(&self) -> Value {
        match self {
            Self::Forward(arn) => Value::object([
                ("TargetGroupArn", arn.clone()),
                ("Type", "forward".into()),
            ]),
            Self::Redirect { protocol, port } => Value::object([
                (
                    "RedirectConfig",
                    Value::object([
                        ("Port", Value::from(port.to_string())),
                        ("Protocol", protocol.as_str().into()),
                        ("StatusCode", "HTTP_301".into()),
                    ]),
                ),
                ("Type", "redirect".into()),
            ]),
        }
    }
}

/// Request matcher of a listener rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerCondition {
    /// Matches request paths.
    PathPatterns(Vec<String>),
    /// Matches `Host` headers.
    HostHeaders(Vec<String>),
}

impl ListenerCondition {
    fn render(&self) -> Value {
        let (field, config, values) = match self {
            Self::PathPatterns(values) => ("path-pattern", "PathPatternConfig", values),
            Self::HostHeaders(values) => ("host-header", "HostHeaderConfig", values),
        };
        Value::object([
            ("Field", Value::from(field)),
            (config, Value::object([("Values", Value::list(values))])),
        ])
    }
}

/// Options for [`ApplicationLoadBalancer::add_redirect`].
#[derive(Debug, Clone, Copy)]
pub struct RedirectOptions {
    /// Port the redirect listener binds.
    pub source_port: u16,
    /// Port clients are sent to.
    pub target_port: u16,
    /// Whether to allow inbound traffic from anywhere.
    pub open: bool,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self {
            source_port: 80,
            target_port: 443,
            open: true,
        }
    }
}

/// Options for [`ApplicationListener::new`].
#[derive(Debug, Clone)]
pub struct ApplicationListenerProps {
    /// Listener port. Defaults to the protocol's well-known port.
    pub port: Option<u16>,
    /// Listener protocol. Inferred from the port and certificates.
    pub protocol: Option<Protocol>,
    /// Server certificates (HTTPS only).
    pub certificates: Vec<Certificate>,
    /// Whether to allow inbound traffic from anywhere.
    pub open: bool,
    /// TLS negotiation policy.
    pub ssl_policy: Option<String>,
}

impl Default for ApplicationListenerProps {
    fn default() -> Self {
        Self {
            port: None,
            protocol: None,
            certificates: Vec::new(),
            open: true,
            ssl_policy: None,
        }
    }
}

fn certificate_list(certificates: &[Certificate]) -> Option<Value> {
    (!certificates.is_empty()).then(|| {
        Value::List(
            certificates
                .iter()
                .map(|cert| Value::object([("CertificateArn", cert.arn())]))
                .collect(),
        )
    })
}

/// Renders the default-action fragment as the `DefaultActions` list.
fn default_actions(action: NodeId) -> Value {
    Value::lazy(move |tree| match tree.fragment(action) {
        Some(value) if !value.is_null() => Value::List(vec![value.clone()]),
        _ => Value::Null,
    })
}

fn has_default_action(tree: &ConstructTree, listener: NodeId) -> bool {
    tree.find_child(listener, DEFAULT_ACTION_ID)
        .and_then(|action| tree.fragment(action))
        .is_some_and(|value| !value.is_null())
}

fn replace_default_action(tree: &mut ConstructTree, listener: NodeId, action: &ListenerAction) -> Result<()> {
    if has_default_action(tree, listener) {
        tree.annotate(
            listener,
            Severity::Warning,
            "A default action already existed on this listener and was replaced. Configure exactly one default target group.",
        );
    }
    let node = tree
        .find_child(listener, DEFAULT_ACTION_ID)
        .ok_or_else(|| tree.error(listener, "listener has no default action slot"))?;
    *super::fragment_mut(tree, node)? = action.render();
    Ok(())
}

fn require_default_action(tree: &ConstructTree, node: NodeId) -> Vec<String> {
    if has_default_action(tree, node) {
        Vec::new()
    } else {
        vec!["Listener needs at least one default action or target group (call addTargetGroups or addAction)".to_string()]
    }
}

/// A listener of an application load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationListener {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ElasticLoadBalancingV2::Listener` resource.
    pub resource: NodeId,
    /// Owning load balancer.
    pub load_balancer: ApplicationLoadBalancer,
    /// Bound port.
    pub port: u16,
    /// Listener protocol.
    pub protocol: Protocol,
}

impl ApplicationListener {
    /// Creates a listener on `load_balancer`.
    ///
    /// Port 443 or a certificate implies HTTPS; the port defaults to the
    /// protocol's well-known port. An open listener admits 0.0.0.0/0 on its
    /// port through the load balancer's security group.
    ///
    /// # Errors
    ///
    /// Returns an error for non-HTTP protocols, or certificates on a plain
    /// HTTP listener.
    pub fn new(
        tree: &mut ConstructTree,
        load_balancer: ApplicationLoadBalancer,
        id: &str,
        props: ApplicationListenerProps,
    ) -> Result<Self> {
        let protocol = props.protocol.unwrap_or(
            if props.port == Some(443) || !props.certificates.is_empty() {
                Protocol::Https
            } else {
                Protocol::Http
            },
        );
        let port = props.port.unwrap_or_else(|| protocol.default_port());

        let node = tree.add_scope(load_balancer.node, id)?;
        if !protocol.is_application() {
            return Err(tree.error(
                node,
                format!("application listeners support only HTTP and HTTPS, got {protocol}"),
            ));
        }
        if protocol == Protocol::Http && !props.certificates.is_empty() {
            return Err(tree.error(node, "certificates can only be used with HTTPS listeners"));
        }

        let action = tree.add_fragment(node, DEFAULT_ACTION_ID, Value::Null)?;
        let resource = tree.add_resource(
            node,
            super::PRIMARY_RESOURCE_ID,
            Resource::new("AWS::ElasticLoadBalancingV2::Listener")
                .with_property("LoadBalancerArn", load_balancer.arn())
                .with_property("Port", port)
                .with_property("Protocol", protocol.as_str())
                .with_property("Certificates", certificate_list(&props.certificates))
                .with_property("SslPolicy", props.ssl_policy)
                .with_property("DefaultActions", default_actions(action)),
        )?;

        tree.add_validator(node, require_default_action);
        if protocol == Protocol::Https {
            tree.add_validator(node, move |tree, _| {
                let has_certificate = tree
                    .resource(resource)
                    .is_some_and(|r| r.property("Certificates").is_some());
                if has_certificate {
                    Vec::new()
                } else {
                    vec!["HTTPS Listener needs at least one certificate (call addCertificates)".to_string()]
                }
            });
        }

        if props.open {
            load_balancer.security_group.add_ingress(
                tree,
                Peer::AnyIpv4,
                port,
                &format!("Allow from anyone on port {port}"),
            )?;
        }
        tracing::debug!(path = %tree.path(node), port, %protocol, "created application listener");

        Ok(Self {
            node,
            resource,
            load_balancer,
            port,
            protocol,
        })
    }

    /// Adds server certificates.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener is not HTTPS.
    pub fn add_certificates(&self, tree: &mut ConstructTree, certificates: &[Certificate]) -> Result<()> {
        if self.protocol != Protocol::Https {
            return Err(tree.error(self.node, "certificates can only be used with HTTPS listeners"));
        }
        for cert in certificates {
            push_property(
                tree,
                self.resource,
                "Certificates",
                Value::object([("CertificateArn", cert.arn())]),
            )?;
        }
        Ok(())
    }

    /// Sets the default action, replacing (with a warning) any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener was not built by [`ApplicationListener::new`].
    pub fn set_default_action(&self, tree: &mut ConstructTree, action: &ListenerAction) -> Result<()> {
        replace_default_action(tree, self.node, action)
    }

    /// Routes traffic to `target_group`.
    ///
    /// Without conditions the group becomes the default action. With
    /// conditions and a priority a listener rule named `<id>Rule` is added.
    ///
    /// # Errors
    ///
    /// Returns an error if only one of `priority` and `conditions` is
    /// given, the priority is out of range, or it is already used on this
    /// listener.
    pub fn add_target_group(
        &self,
        tree: &mut ConstructTree,
        id: &str,
        target_group: &ApplicationTargetGroup,
        priority: Option<u32>,
        conditions: &[ListenerCondition],
    ) -> Result<()> {
        let action = ListenerAction::forward(target_group);
        let Some(priority) = priority else {
            if !conditions.is_empty() {
                return Err(tree.error(self.node, "Setting 'conditions' requires 'priority' to be set"));
            }
            return self.set_default_action(tree, &action);
        };

        if conditions.is_empty() {
            return Err(tree.error(
                self.node,
                "Setting 'priority' requires at least one condition (path pattern or host header)",
            ));
        }
        if !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&priority) {
            return Err(tree.error(
                self.node,
                format!("Priority must be between {MIN_RULE_PRIORITY} and {MAX_RULE_PRIORITY}, got {priority}"),
            ));
        }
        if self.rule_priorities(tree).contains(&priority) {
            return Err(tree.error(
                self.node,
                format!("Priority {priority} is already used by another rule on this listener"),
            ));
        }

        let rule = Resource::new("AWS::ElasticLoadBalancingV2::ListenerRule")
            .with_property("ListenerArn", Value::Ref(self.resource))
            .with_property("Priority", priority)
            .with_property(
                "Conditions",
                Value::List(conditions.iter().map(ListenerCondition::render).collect()),
            )
            .with_property("Actions", Value::List(vec![action.render()]));
        let _ = tree.add_resource(self.node, &format!("{id}Rule"), rule)?;
        Ok(())
    }

    fn rule_priorities(&self, tree: &ConstructTree) -> Vec<u32> {
        tree.children(self.node)
            .iter()
            .filter_map(|&child| tree.resource(child))
            .filter(|r| r.resource_type == "AWS::ElasticLoadBalancingV2::ListenerRule")
            .filter_map(|r| r.property("Priority").and_then(Value::as_u64))
            .filter_map(|p| u32::try_from(p).ok())
            .collect()
    }
}

/// Options for [`NetworkListener::new`].
#[derive(Debug, Clone)]
pub struct NetworkListenerProps {
    /// Listener port.
    pub port: u16,
    /// Listener protocol. TLS when certificates are given, TCP otherwise.
    pub protocol: Option<Protocol>,
    /// Server certificates (TLS only).
    pub certificates: Vec<Certificate>,
    /// TLS negotiation policy.
    pub ssl_policy: Option<String>,
}

impl Default for NetworkListenerProps {
    fn default() -> Self {
        Self {
            port: 80,
            protocol: None,
            certificates: Vec::new(),
            ssl_policy: None,
        }
    }
}

/// A listener of a network load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkListener {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ElasticLoadBalancingV2::Listener` resource.
    pub resource: NodeId,
    /// Bound port.
    pub port: u16,
    /// Listener protocol.
    pub protocol: Protocol,
}

impl NetworkListener {
    /// Creates a listener on `load_balancer`.
    ///
    /// # Errors
    ///
    /// Returns an error for HTTP protocols, TLS without a certificate, or
    /// certificates on a non-TLS listener.
    pub fn new(
        tree: &mut ConstructTree,
        load_balancer: NetworkLoadBalancer,
        id: &str,
        props: NetworkListenerProps,
    ) -> Result<Self> {
        let protocol = props.protocol.unwrap_or(if props.certificates.is_empty() {
            Protocol::Tcp
        } else {
            Protocol::Tls
        });
        let node = tree.add_scope(load_balancer.node, id)?;
        if protocol.is_application() {
            return Err(tree.error(
                node,
                format!("network listeners do not support {protocol}"),
            ));
        }
        if protocol == Protocol::Tls && props.certificates.is_empty() {
            return Err(tree.error(node, "A certificate must be specified when using the TLS protocol"));
        }
        if protocol != Protocol::Tls && !props.certificates.is_empty() {
            return Err(tree.error(node, "certificates can only be used with TLS listeners"));
        }

        let action = tree.add_fragment(node, DEFAULT_ACTION_ID, Value::Null)?;
        let resource = tree.add_resource(
            node,
            super::PRIMARY_RESOURCE_ID,
            Resource::new("AWS::ElasticLoadBalancingV2::Listener")
                .with_property("LoadBalancerArn", Value::Ref(load_balancer.resource))
                .with_property("Port", props.port)
                .with_property("Protocol", protocol.as_str())
                .with_property("Certificates", certificate_list(&props.certificates))
                .with_property("SslPolicy", props.ssl_policy)
                .with_property("DefaultActions", default_actions(action)),
        )?;
        tree.add_validator(node, require_default_action);

        Ok(Self {
            node,
            resource,
            port: props.port,
            protocol,
        })
    }

    /// Makes `target_group` the default action.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener was not built by [`NetworkListener::new`].
    pub fn add_target_group(&self, tree: &mut ConstructTree, target_group: &NetworkTargetGroup) -> Result<()> {
        replace_default_action(tree, self.node, &ListenerAction::forward(target_group))
    }
}

/// Target health checking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HealthCheck {
    /// Ping path (HTTP checks).
    pub path: Option<String>,
    /// Seconds between checks.
    pub interval_secs: Option<u32>,
    /// Seconds before a check counts as failed.
    pub timeout_secs: Option<u32>,
    /// Consecutive successes before a target is healthy.
    pub healthy_threshold: Option<u32>,
    /// Consecutive failures before a target is unhealthy.
    pub unhealthy_threshold: Option<u32>,
    /// Accepted HTTP status codes, e.g. `200-299`.
    pub healthy_http_codes: Option<String>,
}

impl HealthCheck {
    fn check(&self) -> std::result::Result<(), String> {
        match (self.interval_secs, self.timeout_secs) {
            (Some(interval), Some(timeout)) if interval <= timeout => Err(format!(
                "Health check interval '{interval}' must be greater than the timeout '{timeout}'"
            )),
            _ => Ok(()),
        }
    }

    fn apply(&self, resource: &mut Resource) {
        resource.set_property("HealthCheckPath", self.path.as_deref());
        resource.set_property("HealthCheckIntervalSeconds", self.interval_secs);
        resource.set_property("HealthCheckTimeoutSeconds", self.timeout_secs);
        resource.set_property("HealthyThresholdCount", self.healthy_threshold);
        resource.set_property("UnhealthyThresholdCount", self.unhealthy_threshold);
        if let Some(codes) = &self.healthy_http_codes {
            resource.set_property("Matcher", Value::object([("HttpCode", Value::from(codes))]));
        }
    }
}

/// Options for target groups.
#[derive(Debug, Clone, Default)]
pub struct TargetGroupProps {
    /// Port targets receive traffic on. Defaults to the protocol's port.
    pub port: Option<u16>,
    /// Target protocol. HTTP for application and TCP for network groups.
    pub protocol: Option<Protocol>,
    /// Health checking.
    pub health_check: Option<HealthCheck>,
    /// Explicit target group name.
    pub target_group_name: Option<String>,
    /// Connection draining time.
    pub deregistration_delay_secs: Option<u32>,
}

fn target_group(
    tree: &mut ConstructTree,
    scope: NodeId,
    id: &str,
    vpc: &Vpc,
    protocol: Protocol,
    props: &TargetGroupProps,
) -> Result<(NodeId, NodeId)> {
    let mut resource = Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup")
        .with_property("Port", props.port.unwrap_or_else(|| protocol.default_port()))
        .with_property("Protocol", protocol.as_str())
        .with_property("VpcId", vpc.vpc_id())
        .with_property("Name", props.target_group_name.as_deref());
    if let Some(delay) = props.deregistration_delay_secs {
        resource.set_property(
            "TargetGroupAttributes",
            Value::List(vec![Value::object([
                ("Key", Value::from("deregistration_delay.timeout_seconds")),
                ("Value", delay.to_string().into()),
            ])]),
        );
    }
    if let Some(health_check) = &props.health_check {
        health_check.apply(&mut resource);
    }
    let (node, resource) = add_construct(tree, scope, id, resource)?;
    if let Some(message) = props.health_check.as_ref().and_then(|h| h.check().err()) {
        return Err(tree.error(node, message));
    }
    Ok((node, resource))
}

/// Behaviour shared by both target group kinds.
pub trait TargetGroup {
    /// Construct scope.
    fn node(&self) -> NodeId;

    /// `AWS::ElasticLoadBalancingV2::TargetGroup` resource.
    fn resource(&self) -> NodeId;

    /// Target group ARN.
    fn arn(&self) -> Value {
        Value::Ref(self.resource())
    }

    /// Records how targets are addressed. All targets must agree.
    ///
    /// # Errors
    ///
    /// Returns an error if a different target type was already set.
    fn set_target_type(&self, tree: &mut ConstructTree, target_type: TargetType) -> Result<()> {
        let existing = tree
            .resource(self.resource())
            .and_then(|r| r.property("TargetType"))
            .and_then(Value::as_str)
            .map(str::to_string);
        match existing {
            Some(current) if current != target_type.as_str() => Err(tree.error(
                self.node(),
                format!(
                    "Already have a target of type '{current}', adding '{}'; make all targets the same type.",
                    target_type.as_str()
                ),
            )),
            Some(_) => Ok(()),
            None => set_property(tree, self.resource(), "TargetType", target_type.as_str()),
        }
    }
}

/// A target group for application load balancers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationTargetGroup {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ElasticLoadBalancingV2::TargetGroup` resource.
    pub resource: NodeId,
}

impl ApplicationTargetGroup {
    /// Creates a target group.
    ///
    /// # Errors
    ///
    /// Returns an error for non-HTTP protocols or an inconsistent health check.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        vpc: &Vpc,
        props: &TargetGroupProps,
    ) -> Result<Self> {
        let protocol = props.protocol.unwrap_or(Protocol::Http);
        let (node, resource) = target_group(tree, scope, id, vpc, protocol, props)?;
        if !protocol.is_application() {
            return Err(tree.error(
                node,
                format!("application target groups support only HTTP and HTTPS, got {protocol}"),
            ));
        }
        Ok(Self { node, resource })
    }
}

impl TargetGroup for ApplicationTargetGroup {
    fn node(&self) -> NodeId {
        self.node
    }

    fn resource(&self) -> NodeId {
        self.resource
    }
}

/// A target group for network load balancers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTargetGroup {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ElasticLoadBalancingV2::TargetGroup` resource.
    pub resource: NodeId,
}

impl NetworkTargetGroup {
    /// Creates a target group.
    ///
    /// # Errors
    ///
    /// Returns an error for HTTP protocols or an inconsistent health check.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        vpc: &Vpc,
        props: &TargetGroupProps,
    ) -> Result<Self> {
        let protocol = props.protocol.unwrap_or(Protocol::Tcp);
        let (node, resource) = target_group(tree, scope, id, vpc, protocol, props)?;
        if protocol.is_application() {
            return Err(tree.error(
                node,
                format!("network target groups do not support {protocol}"),
            ));
        }
        Ok(Self { node, resource })
    }
}

impl TargetGroup for NetworkTargetGroup {
    fn node(&self) -> NodeId {
        self.node
    }

    fn resource(&self) -> NodeId {
        self.resource
    }
}
