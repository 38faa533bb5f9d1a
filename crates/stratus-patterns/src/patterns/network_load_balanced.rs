//! An ECS service behind a network load balancer.

use stratus_common::error::Result;
use stratus_synth::tree::{ConstructTree, NodeId};

use super::{
    ServiceOptions, TaskSetup, TaskSizing, add_dns_output, add_domain_record, base_service_options,
    desired_count, map_ports, prepare_task, resolve_cluster,
};
use crate::resources::acm::Certificate;
use crate::resources::ec2::SecurityGroup;
use crate::resources::ecs::{
    BaseService, Cluster, Ec2Service, FargateService, FargateServiceProps, LaunchType, TaskDefinition,
};
use crate::resources::elbv2::{
    HealthCheck, LoadBalancerProps, NetworkListener, NetworkListenerProps, NetworkLoadBalancer,
    NetworkTargetGroup, Protocol, TargetGroupProps,
};
use crate::resources::route53::HostedZone;

const DEFAULT_LISTENER_PORT: u16 = 80;

/// Options of the load balancing side.
#[derive(Debug, Clone)]
pub struct NetworkLoadBalancedServiceBaseProps {
    /// Service and task options.
    pub service: ServiceOptions,
    /// Listener port. Defaults to 80.
    pub listener_port: Option<u16>,
    /// Listener protocol. TLS when a certificate is given, TCP otherwise.
    pub protocol: Option<Protocol>,
    /// Listener certificate (TLS only).
    pub certificate: Option<Certificate>,
    /// TLS negotiation policy.
    pub ssl_policy: Option<String>,
    /// Protocol between the load balancer and the tasks. Defaults to TCP.
    pub target_protocol: Option<Protocol>,
    /// Custom domain for the service.
    pub domain_name: Option<String>,
    /// Zone hosting `domain_name`.
    pub domain_zone: Option<HostedZone>,
    /// Internet-facing load balancer. Defaults to `true`.
    pub public_load_balancer: bool,
    /// Existing load balancer to use instead of a new one.
    pub load_balancer: Option<NetworkLoadBalancer>,
    /// Name of the new load balancer.
    pub load_balancer_name: Option<String>,
    /// Target group health check.
    pub health_check: Option<HealthCheck>,
}

impl Default for NetworkLoadBalancedServiceBaseProps {
    fn default() -> Self {
        Self {
            service: ServiceOptions::default(),
            listener_port: None,
            protocol: None,
            certificate: None,
            ssl_policy: None,
            target_protocol: None,
            domain_name: None,
            domain_zone: None,
            public_load_balancer: true,
            load_balancer: None,
            load_balancer_name: None,
            health_check: None,
        }
    }
}

/// Load balancer, listener, target group and DNS shared by both flavours.
#[derive(Debug, Clone)]
pub struct NetworkLoadBalancedServiceBase {
    /// Construct scope.
    pub node: NodeId,
    /// Cluster the service runs in.
    pub cluster: Cluster,
    /// Number of tasks.
    pub desired_count: u32,
    /// Load balancer.
    pub load_balancer: NetworkLoadBalancer,
    /// Listener receiving client traffic.
    pub listener: NetworkListener,
    /// Target group of the service.
    pub target_group: NetworkTargetGroup,
    /// Custom domain, if one was configured.
    pub domain_name: Option<String>,
}

impl NetworkLoadBalancedServiceBase {
    /// Creates the load balancing side below a new scope `id`.
    ///
    /// The target group port follows the image's container port so that
    /// health checks reach the task.
    ///
    /// # Errors
    ///
    /// Returns an error for conflicting cluster options, a zero desired
    /// count, a certificate on a non-TLS listener, or a domain without a
    /// zone.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: &NetworkLoadBalancedServiceBaseProps,
    ) -> Result<Self> {
        let node = tree.add_scope(scope, id)?;
        let desired_count = desired_count(tree, node, &props.service)?;
        let cluster = resolve_cluster(tree, node, &props.service)?;

        if props.certificate.is_some() && props.protocol.is_some_and(|p| p != Protocol::Tls) {
            return Err(tree.error(node, "The TLS protocol must be used when a certificate is given"));
        }

        let load_balancer = match props.load_balancer {
            Some(load_balancer) => load_balancer,
            None => NetworkLoadBalancer::new(
                tree,
                node,
                "LB",
                &LoadBalancerProps {
                    internet_facing: props.public_load_balancer,
                    name: props.load_balancer_name.clone(),
                    ..LoadBalancerProps::new(cluster.vpc.clone())
                },
            )?,
        };
        let listener = load_balancer.add_listener(
            tree,
            "PublicListener",
            NetworkListenerProps {
                port: props.listener_port.unwrap_or(DEFAULT_LISTENER_PORT),
                protocol: props.protocol,
                certificates: props.certificate.iter().cloned().collect(),
                ssl_policy: props.ssl_policy.clone(),
            },
        )?;

        let target_port = props
            .service
            .task_image_options
            .as_ref()
            .and_then(|image| image.container_port);
        let target_group = NetworkTargetGroup::new(
            tree,
            listener.node,
            "ECSGroup",
            &cluster.vpc,
            &TargetGroupProps {
                port: Some(target_port.unwrap_or(DEFAULT_LISTENER_PORT)),
                protocol: Some(props.target_protocol.unwrap_or(Protocol::Tcp)),
                health_check: props.health_check.clone(),
                ..TargetGroupProps::default()
            },
        )?;
        listener.add_target_group(tree, &target_group)?;

        let domain_name = add_domain_record(
            tree,
            node,
            "DNS",
            props.domain_name.as_deref(),
            props.domain_zone.as_ref(),
            &load_balancer.record_target(),
        )?;
        add_dns_output(tree, node, "", load_balancer.dns_name())?;

        tracing::info!(
            path = %tree.path(node),
            protocol = %listener.protocol,
            port = listener.port,
            "built network load balanced service"
        );
        Ok(Self {
            node,
            cluster,
            desired_count,
            load_balancer,
            listener,
            target_group,
            domain_name,
        })
    }

    fn register(&self, tree: &mut ConstructTree, service: &BaseService, task: &TaskSetup) -> Result<()> {
        service.attach_to_target_group(tree, &self.target_group, &task.container_name, task.container_port)?;
        tree.add_dependency(service.node, self.listener.node);
        Ok(())
    }
}

/// Options of [`NetworkLoadBalancedEc2Service`].
#[derive(Debug, Clone, Default)]
pub struct NetworkLoadBalancedEc2ServiceProps {
    /// Load balancing and service options.
    pub base: NetworkLoadBalancedServiceBaseProps,
    /// Container CPU units.
    pub cpu: Option<u32>,
    /// Container hard memory limit in MiB.
    pub memory_limit_mib: Option<u32>,
    /// Container soft memory limit in MiB.
    pub memory_reservation_mib: Option<u32>,
}

/// An EC2 service behind a network load balancer.
#[derive(Debug, Clone)]
pub struct NetworkLoadBalancedEc2Service {
    /// Load balancing side.
    pub base: NetworkLoadBalancedServiceBase,
    /// Task definition the service runs.
    pub task_definition: TaskDefinition,
    /// The service.
    pub service: Ec2Service,
}

impl NetworkLoadBalancedEc2Service {
    /// Builds the pattern below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Any error of [`NetworkLoadBalancedServiceBase::new`], an ambiguous
    /// task source, or an invalid service configuration.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: NetworkLoadBalancedEc2ServiceProps,
    ) -> Result<Self> {
        let base = NetworkLoadBalancedServiceBase::new(tree, scope, id, &props.base)?;
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
        map_ports(tree, &task.container, &[task.container_port])?;

        let options = base_service_options(&props.base.service, base.cluster.clone(), task.task_definition, base.desired_count);
        let service = Ec2Service::new(tree, base.node, "Service", options)?;
        base.register(tree, &service, &task)?;
        Ok(Self {
            base,
            task_definition: task.task_definition,
            service,
        })
    }
}

/// Options of [`NetworkLoadBalancedFargateService`].
#[derive(Debug, Clone, Default)]
pub struct NetworkLoadBalancedFargateServiceProps {
    /// Load balancing and service options.
    pub base: NetworkLoadBalancedServiceBaseProps,
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

/// A Fargate service behind a network load balancer.
#[derive(Debug, Clone)]
pub struct NetworkLoadBalancedFargateService {
    /// Load balancing side.
    pub base: NetworkLoadBalancedServiceBase,
    /// Task definition the service runs.
    pub task_definition: TaskDefinition,
    /// The service.
    pub service: FargateService,
}

impl NetworkLoadBalancedFargateService {
    /// Builds the pattern below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Any error of [`NetworkLoadBalancedServiceBase::new`], an ambiguous
    /// task source, or an invalid service configuration.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: NetworkLoadBalancedFargateServiceProps,
    ) -> Result<Self> {
        let base = NetworkLoadBalancedServiceBase::new(tree, scope, id, &props.base)?;
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
        map_ports(tree, &task.container, &[task.container_port])?;

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
        base.register(tree, &service, &task)?;
        Ok(Self {
            base,
            task_definition: task.task_definition,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use stratus_synth::token::Value;
    use stratus_synth::tree::StackProps;

    use super::*;
    use crate::patterns::TaskImageOptions;

    fn setup() -> (ConstructTree, NodeId) {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Net", StackProps::default()).expect("stack");
        (tree, stack)
    }

    fn image_props() -> NetworkLoadBalancedFargateServiceProps {
        let mut props = NetworkLoadBalancedFargateServiceProps::default();
        props.base.service.task_image_options = Some(TaskImageOptions::new("redis:7"));
        props
    }

    #[test]
    fn defaults_to_tcp_on_port_80() {
        let (mut tree, stack) = setup();
        let pattern = NetworkLoadBalancedFargateService::new(&mut tree, stack, "Cache", image_props())
            .expect("pattern");
        assert_eq!(pattern.base.listener.protocol, Protocol::Tcp);
        assert_eq!(pattern.base.listener.port, 80);
        assert!(tree.find_child(pattern.base.node, "LoadBalancerDNS").is_some());
        assert!(tree.find_child(pattern.base.node, "ServiceURL").is_none());
        assert!(tree.run_validators(pattern.base.listener.node).is_empty());

        let target_type = tree
            .resource(pattern.base.target_group.resource)
            .and_then(|r| r.property("TargetType"))
            .and_then(Value::as_str);
        assert_eq!(target_type, Some("ip"));
    }

    #[test]
    fn certificate_implies_tls() {
        let (mut tree, stack) = setup();
        let mut props = image_props();
        props.base.listener_port = Some(443);
        props.base.certificate = Some(Certificate::from_arn("arn:aws:acm:us-east-1:123:certificate/abc"));
        let pattern = NetworkLoadBalancedFargateService::new(&mut tree, stack, "Cache", props).expect("pattern");
        assert_eq!(pattern.base.listener.protocol, Protocol::Tls);
    }

    #[test]
    fn certificate_requires_tls() {
        let (mut tree, stack) = setup();
        let mut props = image_props();
        props.base.protocol = Some(Protocol::Tcp);
        props.base.certificate = Some(Certificate::from_arn("arn:aws:acm:us-east-1:123:certificate/abc"));
        let err = NetworkLoadBalancedFargateService::new(&mut tree, stack, "Cache", props).unwrap_err();
        assert!(err.to_string().contains("The TLS protocol must be used"), "got: {err}");
    }

    #[test]
    fn tls_without_certificate_is_rejected() {
        let (mut tree, stack) = setup();
        let mut props = image_props();
        props.base.protocol = Some(Protocol::Tls);
        let err = NetworkLoadBalancedFargateService::new(&mut tree, stack, "Cache", props).unwrap_err();
        assert!(err.to_string().contains("A certificate must be specified"), "got: {err}");
    }

    #[test]
    fn container_port_drives_the_target_group() {
        let (mut tree, stack) = setup();
        let mut props = NetworkLoadBalancedEc2ServiceProps {
            memory_reservation_mib: Some(256),
            ..NetworkLoadBalancedEc2ServiceProps::default()
        };
        let mut image = TaskImageOptions::new("redis:7");
        image.container_port = Some(6379);
        props.base.service.task_image_options = Some(image);
        let pattern = NetworkLoadBalancedEc2Service::new(&mut tree, stack, "Cache", props).expect("pattern");

        let port = tree
            .resource(pattern.base.target_group.resource)
            .and_then(|r| r.property("Port"))
            .and_then(Value::as_u64);
        assert_eq!(port, Some(6379));
        let container = pattern.task_definition.default_container(&tree).expect("container");
        assert_eq!(container.container_ports(&tree), vec![6379]);
    }
}
