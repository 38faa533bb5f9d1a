//! An ECS service exposed through several listeners and target groups.
//!
//! Load balancers and listeners are declared by name; target groups refer
//! to listeners by that name. Without declarations one public load balancer
//! `LB` with an HTTP listener `PublicListener` on port 80 is created and the
//! container port is routed to it.

use std::collections::BTreeSet;

use stratus_common::error::Result;
use stratus_synth::tree::{ConstructTree, NodeId};

use super::{
    ServiceOptions, TaskSetup, TaskSizing, add_dns_output, add_domain_record, add_url_output,
    base_service_options, desired_count, map_ports, prepare_task, resolve_cluster,
};
use crate::resources::acm::{Certificate, CertificateValidation};
use crate::resources::ec2::{Peer, SecurityGroup};
use crate::resources::ecs::{
    BaseService, Cluster, Ec2Service, FargateService, FargateServiceProps, LaunchType, TaskDefinition,
};
use crate::resources::elbv2::{
    ApplicationListener, ApplicationListenerProps, ApplicationLoadBalancer, ApplicationTargetGroup,
    ListenerCondition, LoadBalancerProps, Protocol, TargetGroupProps,
};
use crate::resources::route53::HostedZone;

const DEFAULT_LOAD_BALANCER: &str = "LB";
const DEFAULT_LISTENER: &str = "PublicListener";

/// A named listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    /// Listener name, unique across all load balancers of the pattern.
    pub name: String,
    /// Listener protocol. HTTPS when a certificate is given, HTTP otherwise.
    pub protocol: Option<Protocol>,
    /// Listener port. Defaults to the protocol's well-known port.
    pub port: Option<u16>,
    /// Listener certificate. Requested from ACM for HTTPS when absent.
    pub certificate: Option<Certificate>,
    /// TLS negotiation policy.
    pub ssl_policy: Option<String>,
}

impl ListenerOptions {
    /// Listener `name` with defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A named load balancer and its listeners.
#[derive(Debug, Clone)]
pub struct LoadBalancerOptions {
    /// Load balancer name, used as its construct id.
    pub name: String,
    /// Listeners. At least one is required.
    pub listeners: Vec<ListenerOptions>,
    /// Internet-facing load balancer. Defaults to `true`.
    pub public_load_balancer: bool,
    /// Idle timeout.
    pub idle_timeout_secs: Option<u32>,
    /// Custom domain for this load balancer.
    pub domain_name: Option<String>,
    /// Zone hosting `domain_name`.
    pub domain_zone: Option<HostedZone>,
}

impl LoadBalancerOptions {
    /// Public load balancer `name` with the given listeners.
    pub fn new(name: impl Into<String>, listeners: Vec<ListenerOptions>) -> Self {
        Self {
            name: name.into(),
            listeners,
            public_load_balancer: true,
            idle_timeout_secs: None,
            domain_name: None,
            domain_zone: None,
        }
    }
}

/// Routes a container port through a listener.
#[derive(Debug, Clone, Default)]
pub struct TargetOptions {
    /// Container port receiving the traffic.
    pub container_port: u16,
    /// Listener name. Defaults to the first listener.
    pub listener: Option<String>,
    /// Target protocol. Defaults to HTTP.
    pub protocol: Option<Protocol>,
    /// Rule priority. Required with a path pattern or host header.
    pub priority: Option<u32>,
    /// Path pattern condition.
    pub path_pattern: Option<String>,
    /// Host header condition.
    pub host_header: Option<String>,
}

impl TargetOptions {
    fn conditions(&self) -> Vec<ListenerCondition> {
        let mut conditions = Vec::new();
        if let Some(host) = &self.host_header {
            conditions.push(ListenerCondition::HostHeaders(vec![host.clone()]));
        }
        if let Some(path) = &self.path_pattern {
            conditions.push(ListenerCondition::PathPatterns(vec![path.clone()]));
        }
        conditions
    }
}

/// Options of the load balancing side.
#[derive(Debug, Clone, Default)]
pub struct ApplicationMultipleTargetGroupsServiceBaseProps {
    /// Service and task options.
    pub service: ServiceOptions,
    /// Load balancers. One public `LB` with `PublicListener` when absent.
    pub load_balancers: Option<Vec<LoadBalancerOptions>>,
    /// Target groups. The container port on the first listener when absent.
    pub target_groups: Option<Vec<TargetOptions>>,
}

/// Load balancers, listeners and target groups shared by both flavours.
#[derive(Debug, Clone)]
pub struct ApplicationMultipleTargetGroupsServiceBase {
    /// Construct scope.
    pub node: NodeId,
    /// Cluster the service runs in.
    pub cluster: Cluster,
    /// Number of tasks.
    pub desired_count: u32,
    /// Load balancers in declaration order.
    pub load_balancers: Vec<ApplicationLoadBalancer>,
    /// Listeners in declaration order.
    pub listeners: Vec<ApplicationListener>,
    /// Target groups, filled once the service is registered.
    pub target_groups: Vec<ApplicationTargetGroup>,
}

impl ApplicationMultipleTargetGroupsServiceBase {
    /// Creates the load balancers and listeners below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Returns an error for conflicting cluster options, a zero desired
    /// count, an empty or duplicated load balancer or listener declaration,
    /// a listener protocol conflict, or a domain without a zone.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: &ApplicationMultipleTargetGroupsServiceBaseProps,
    ) -> Result<Self> {
        let node = tree.add_scope(scope, id)?;
        let desired_count = desired_count(tree, node, &props.service)?;
        let cluster = resolve_cluster(tree, node, &props.service)?;

        let (declared, suffixed) = match &props.load_balancers {
            Some(load_balancers) => {
                check_declarations(tree, node, load_balancers)?;
                (load_balancers.clone(), true)
            }
            None => (
                vec![LoadBalancerOptions::new(
                    DEFAULT_LOAD_BALANCER,
                    vec![ListenerOptions::new(DEFAULT_LISTENER)],
                )],
                false,
            ),
        };

        let mut base = Self {
            node,
            cluster,
            desired_count,
            load_balancers: Vec::new(),
            listeners: Vec::new(),
            target_groups: Vec::new(),
        };
        for options in &declared {
            base.add_load_balancer(tree, options, suffixed)?;
        }
        tracing::info!(
            path = %tree.path(node),
            load_balancers = base.load_balancers.len(),
            listeners = base.listeners.len(),
            "built multiple target groups service"
        );
        Ok(base)
    }

    fn add_load_balancer(&mut self, tree: &mut ConstructTree, options: &LoadBalancerOptions, suffixed: bool) -> Result<()> {
        let load_balancer = ApplicationLoadBalancer::new(
            tree,
            self.node,
            &options.name,
            &LoadBalancerProps {
                internet_facing: options.public_load_balancer,
                idle_timeout_secs: options.idle_timeout_secs,
                ..LoadBalancerProps::new(self.cluster.vpc.clone())
            },
        )?;

        let mut schemes = Vec::with_capacity(options.listeners.len());
        for listener_options in &options.listeners {
            let listener = self.add_listener(tree, load_balancer, options, listener_options)?;
            schemes.push((listener_options.name.as_str(), listener.protocol.scheme()));
            self.listeners.push(listener);
        }

        let domain_name = add_domain_record(
            tree,
            self.node,
            &format!("DNS{}", options.name),
            options.domain_name.as_deref(),
            options.domain_zone.as_ref(),
            &load_balancer.record_target(),
        )?;
        let lb_suffix = if suffixed { options.name.as_str() } else { "" };
        add_dns_output(tree, self.node, lb_suffix, load_balancer.dns_name())?;
        for (listener_name, scheme) in schemes {
            let suffix = if suffixed { format!("{}{listener_name}", options.name) } else { String::new() };
            add_url_output(tree, self.node, &suffix, scheme, domain_name.as_deref(), load_balancer.dns_name())?;
        }
        self.load_balancers.push(load_balancer);
        Ok(())
    }

    fn add_listener(
        &self,
        tree: &mut ConstructTree,
        load_balancer: ApplicationLoadBalancer,
        lb_options: &LoadBalancerOptions,
        options: &ListenerOptions,
    ) -> Result<ApplicationListener> {
        if options.certificate.is_some() && options.protocol.is_some_and(|p| p != Protocol::Https) {
            return Err(tree.error(self.node, "The HTTPS protocol must be used when a certificate is given"));
        }
        let protocol = options.protocol.unwrap_or(if options.certificate.is_some() {
            Protocol::Https
        } else {
            Protocol::Http
        });
        let listener = load_balancer.add_listener(
            tree,
            &options.name,
            ApplicationListenerProps {
                port: options.port,
                protocol: Some(protocol),
                ssl_policy: options.ssl_policy.clone(),
                ..ApplicationListenerProps::default()
            },
        )?;

        if protocol == Protocol::Https {
            let certificate = match &options.certificate {
                Some(certificate) => certificate.clone(),
                None => {
                    let (Some(domain_name), Some(zone)) = (&lb_options.domain_name, &lb_options.domain_zone) else {
                        return Err(tree.error(self.node, "A domain name and zone is required when using the HTTPS protocol"));
                    };
                    Certificate::new(
                        tree,
                        self.node,
                        &format!("Certificate{}", options.name),
                        domain_name,
                        &CertificateValidation::Dns(zone.clone()),
                    )?
                }
            };
            listener.add_certificates(tree, std::slice::from_ref(&certificate))?;
        }
        Ok(listener)
    }

    fn find_listener(&self, tree: &ConstructTree, name: Option<&str>) -> Result<ApplicationListener> {
        let found = match name {
            None => self.listeners.first(),
            Some(name) => self.listeners.iter().find(|l| tree.id(l.node) == name),
        };
        found.copied().ok_or_else(|| {
            let name = name.unwrap_or_default();
            tree.error(
                self.node,
                format!("Listener {name} is not defined. Did you define listener with name {name}?"),
            )
        })
    }

    /// Container ports to map for `targets`, defaulting to the task's port.
    fn target_ports(props: &ApplicationMultipleTargetGroupsServiceBaseProps, task: &TaskSetup) -> Vec<u16> {
        props.target_groups.as_ref().map_or_else(
            || vec![task.container_port],
            |targets| targets.iter().map(|t| t.container_port).collect(),
        )
    }

    /// Creates one target group per target and registers the service with it.
    fn register(
        &mut self,
        tree: &mut ConstructTree,
        service: &BaseService,
        task: &TaskSetup,
        targets: Option<&[TargetOptions]>,
    ) -> Result<()> {
        let targets = match targets {
            Some([]) => return Err(tree.error(self.node, "At least one target group should be specified")),
            Some(targets) => targets.to_vec(),
            None => vec![TargetOptions {
                container_port: task.container_port,
                ..TargetOptions::default()
            }],
        };

        for target in &targets {
            let listener = self.find_listener(tree, target.listener.as_deref())?;
            let id = format!("ECSTargetGroup{}{}", task.container_name, target.container_port);
            let target_group = ApplicationTargetGroup::new(
                tree,
                listener.node,
                &id,
                &self.cluster.vpc,
                &TargetGroupProps {
                    port: Some(target.container_port),
                    protocol: Some(target.protocol.unwrap_or(Protocol::Http)),
                    ..TargetGroupProps::default()
                },
            )?;
            listener.add_target_group(tree, &id, &target_group, target.priority, &target.conditions())?;
            service.attach_to_target_group(tree, &target_group, &task.container_name, target.container_port)?;
            tree.add_dependency(service.node, listener.node);
            if let Some(group) = service.security_group {
                group.add_ingress(
                    tree,
                    Peer::SecurityGroup(listener.load_balancer.security_group),
                    target.container_port,
                    "Load balancer to target",
                )?;
            }
            self.target_groups.push(target_group);
        }
        Ok(())
    }
}

fn check_declarations(tree: &ConstructTree, node: NodeId, load_balancers: &[LoadBalancerOptions]) -> Result<()> {
    if load_balancers.is_empty() {
        return Err(tree.error(node, "At least one load balancer must be specified"));
    }
    let mut lb_names = BTreeSet::new();
    let mut listener_names = BTreeSet::new();
    for lb in load_balancers {
        if !lb_names.insert(lb.name.as_str()) {
            return Err(tree.error(node, format!("Load balancer name {} is used more than once", lb.name)));
        }
        if lb.listeners.is_empty() {
            return Err(tree.error(node, "At least one listener must be specified"));
        }
        for listener in &lb.listeners {
            if !listener_names.insert(listener.name.as_str()) {
                return Err(tree.error(node, format!("Listener name {} is used more than once", listener.name)));
            }
        }
    }
    Ok(())
}

/// Options of [`ApplicationMultipleTargetGroupsEc2Service`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationMultipleTargetGroupsEc2ServiceProps {
    /// Load balancing and service options.
    pub base: ApplicationMultipleTargetGroupsServiceBaseProps,
    /// Container CPU units.
    pub cpu: Option<u32>,
    /// Container hard memory limit in MiB.
    pub memory_limit_mib: Option<u32>,
    /// Container soft memory limit in MiB.
    pub memory_reservation_mib: Option<u32>,
}

/// An EC2 service behind several listeners.
#[derive(Debug, Clone)]
pub struct ApplicationMultipleTargetGroupsEc2Service {
    /// Load balancing side.
    pub base: ApplicationMultipleTargetGroupsServiceBase,
    /// Task definition the service runs.
    pub task_definition: TaskDefinition,
    /// The service.
    pub service: Ec2Service,
}

impl ApplicationMultipleTargetGroupsEc2Service {
    /// Builds the pattern below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Any error of [`ApplicationMultipleTargetGroupsServiceBase::new`], an
    /// ambiguous task source, an undefined listener, or an invalid service
    /// configuration.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: ApplicationMultipleTargetGroupsEc2ServiceProps,
    ) -> Result<Self> {
        let mut base = ApplicationMultipleTargetGroupsServiceBase::new(tree, scope, id, &props.base)?;
        let task = prepare_task(
            tree,
            base.node,
            &props.base.service,
            LaunchType::Ec2,
            TaskSizing {
                cpu: props.cpu,
                memory_limit_mib: props.memory_limit_mib,
                memory_reservation_mib: props.memory_reservation_mib,
            },
        )?;
        map_ports(tree, &task.container, &ApplicationMultipleTargetGroupsServiceBase::target_ports(&props.base, &task))?;

        let options = base_service_options(&props.base.service, base.cluster.clone(), task.task_definition, base.desired_count);
        let service = Ec2Service::new(tree, base.node, "Service", options)?;
        base.register(tree, &service, &task, props.base.target_groups.as_deref())?;
        Ok(Self {
            base,
            task_definition: task.task_definition,
            service,
        })
    }
}

/// Options of [`ApplicationMultipleTargetGroupsFargateService`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationMultipleTargetGroupsFargateServiceProps {
    /// Load balancing and service options.
    pub base: ApplicationMultipleTargetGroupsServiceBaseProps,
    /// Task CPU units. Defaults to 256.
    pub cpu: Option<u32>,
    /// Task memory in MiB. Defaults to 512.
    pub memory_limit_mib: Option<u32>,
    /// Give tasks public IPs and run them in public subnets.
    pub assign_public_ip: bool,
    /// Fargate platform version.
    pub platform_version: Option<String>,
    /// Security groups to use instead of a generated one.
    pub security_groups: Vec<SecurityGroup>,
}

/// A Fargate service behind several listeners.
#[derive(Debug, Clone)]
pub struct ApplicationMultipleTargetGroupsFargateService {
    /// Load balancing side.
    pub base: ApplicationMultipleTargetGroupsServiceBase,
    /// Task definition the service runs.
    pub task_definition: TaskDefinition,
    /// The service.
    pub service: FargateService,
}

impl ApplicationMultipleTargetGroupsFargateService {
    /// Builds the pattern below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Any error of [`ApplicationMultipleTargetGroupsServiceBase::new`], an
    /// ambiguous task source, an undefined listener, or an invalid service
    /// configuration.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: ApplicationMultipleTargetGroupsFargateServiceProps,
    ) -> Result<Self> {
        let mut base = ApplicationMultipleTargetGroupsServiceBase::new(tree, scope, id, &props.base)?;
        let task = prepare_task(
            tree,
            base.node,
            &props.base.service,
            LaunchType::Fargate,
            TaskSizing {
                cpu: props.cpu,
                memory_limit_mib: props.memory_limit_mib,
                memory_reservation_mib: None,
            },
        )?;
        map_ports(tree, &task.container, &ApplicationMultipleTargetGroupsServiceBase::target_ports(&props.base, &task))?;

        let mut options = base_service_options(&props.base.service, base.cluster.clone(), task.task_definition, base.desired_count);
        options.security_groups = props.security_groups;
        let service = FargateService::new(
            tree,
            base.node,
            "Service",
            FargateServiceProps {
                base: options,
                assign_public_ip: props.assign_public_ip,
                platform_version: props.platform_version,
            },
        )?;
        base.register(tree, &service, &task, props.base.target_groups.as_deref())?;
        Ok(Self {
            base,
            task_definition: task.task_definition,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use stratus_synth::tree::StackProps;

    use super::*;
    use crate::patterns::TaskImageOptions;

    fn setup() -> (ConstructTree, NodeId) {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Api", StackProps::default()).expect("stack");
        (tree, stack)
    }

    fn image_props() -> ApplicationMultipleTargetGroupsFargateServiceProps {
        let mut props = ApplicationMultipleTargetGroupsFargateServiceProps::default();
        props.base.service.task_image_options = Some(TaskImageOptions::new("api:1"));
        props
    }

    fn error_of(props: ApplicationMultipleTargetGroupsFargateServiceProps) -> String {
        let (mut tree, stack) = setup();
        ApplicationMultipleTargetGroupsFargateService::new(&mut tree, stack, "Api", props)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn defaults_to_one_load_balancer_and_listener() {
        let (mut tree, stack) = setup();
        let pattern = ApplicationMultipleTargetGroupsFargateService::new(&mut tree, stack, "Api", image_props())
            .expect("pattern");
        assert_eq!(pattern.base.load_balancers.len(), 1);
        assert_eq!(tree.id(pattern.base.listeners[0].node), "PublicListener");
        assert_eq!(pattern.base.target_groups.len(), 1);
        assert!(tree.find_child(pattern.base.node, "LoadBalancerDNS").is_some());
        assert!(tree.find_child(pattern.base.node, "ServiceURL").is_some());
        assert!(tree.run_validators(pattern.base.listeners[0].node).is_empty());
    }

    #[test]
    fn routes_targets_to_named_listeners() {
        let (mut tree, stack) = setup();
        let mut props = image_props();
        props.base.load_balancers = Some(vec![
            LoadBalancerOptions::new("Public", vec![ListenerOptions::new("Web")]),
            LoadBalancerOptions::new(
                "Admin",
                vec![ListenerOptions {
                    port: Some(8080),
                    ..ListenerOptions::new("Console")
                }],
            ),
        ]);
        props.base.target_groups = Some(vec![
            TargetOptions {
                container_port: 80,
                listener: Some("Web".into()),
                ..TargetOptions::default()
            },
            TargetOptions {
                container_port: 9000,
                listener: Some("Console".into()),
                ..TargetOptions::default()
            },
            TargetOptions {
                container_port: 9090,
                listener: Some("Web".into()),
                priority: Some(10),
                path_pattern: Some("/metrics".into()),
                ..TargetOptions::default()
            },
        ]);
        let pattern = ApplicationMultipleTargetGroupsFargateService::new(&mut tree, stack, "Api", props)
            .expect("pattern");

        assert_eq!(pattern.base.target_groups.len(), 3);
        let container = pattern.task_definition.default_container(&tree).expect("container");
        assert_eq!(container.container_ports(&tree), vec![80, 9000, 9090]);
        for output in ["LoadBalancerDNSPublic", "LoadBalancerDNSAdmin", "ServiceURLPublicWeb", "ServiceURLAdminConsole"] {
            assert!(tree.find_child(pattern.base.node, output).is_some(), "missing {output}");
        }
        let web = pattern.base.listeners[0];
        assert!(tree.find_child(web.node, "ECSTargetGroupweb9090Rule").is_some());
        assert_eq!(tree.dependencies(pattern.service.node).len(), 2);
    }

    #[test]
    fn rejects_empty_declarations() {
        let mut props = image_props();
        props.base.load_balancers = Some(Vec::new());
        assert!(error_of(props).contains("At least one load balancer must be specified"));

        let mut props = image_props();
        props.base.load_balancers = Some(vec![LoadBalancerOptions::new("Public", Vec::new())]);
        assert!(error_of(props).contains("At least one listener must be specified"));

        let mut props = image_props();
        props.base.target_groups = Some(Vec::new());
        assert!(error_of(props).contains("At least one target group should be specified"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut props = image_props();
        props.base.load_balancers = Some(vec![
            LoadBalancerOptions::new("Public", vec![ListenerOptions::new("Web")]),
            LoadBalancerOptions::new("Other", vec![ListenerOptions::new("Web")]),
        ]);
        assert!(error_of(props).contains("Listener name Web is used more than once"));
    }

    #[test]
    fn rejects_unknown_listener() {
        let mut props = image_props();
        props.base.target_groups = Some(vec![TargetOptions {
            container_port: 80,
            listener: Some("Missing".into()),
            ..TargetOptions::default()
        }]);
        let err = error_of(props);
        assert!(
            err.contains("Listener Missing is not defined. Did you define listener with name Missing?"),
            "got: {err}"
        );
    }

    #[test]
    fn path_pattern_requires_priority() {
        let mut props = image_props();
        props.base.target_groups = Some(vec![TargetOptions {
            container_port: 80,
            path_pattern: Some("/api/*".into()),
            ..TargetOptions::default()
        }]);
        assert!(error_of(props).contains("requires 'priority'"));
    }

    #[test]
    fn ec2_flavour_registers_instances() {
        let (mut tree, stack) = setup();
        let mut props = ApplicationMultipleTargetGroupsEc2ServiceProps {
            memory_limit_mib: Some(256),
            ..ApplicationMultipleTargetGroupsEc2ServiceProps::default()
        };
        props.base.service.task_image_options = Some(TaskImageOptions::new("api:1"));
        let pattern = ApplicationMultipleTargetGroupsEc2Service::new(&mut tree, stack, "Api", props)
            .expect("pattern");
        let target_type = tree
            .resource(pattern.base.target_groups[0].resource)
            .and_then(|r| r.property("TargetType"))
            .and_then(stratus_synth::token::Value::as_str);
        assert_eq!(target_type, Some("instance"));
    }
}
