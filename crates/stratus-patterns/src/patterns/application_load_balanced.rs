//! An ECS service behind an application load balancer.

use stratus_common::error::Result;
use stratus_synth::tree::{ConstructTree, NodeId};

use super::{
    ServiceOptions, TaskSetup, TaskSizing, add_dns_output, add_domain_record, add_url_output,
    base_service_options, desired_count, map_ports, prepare_task, resolve_cluster,
};
use crate::resources::acm::{Certificate, CertificateValidation};
use crate::resources::ec2::{Peer, SecurityGroup};
use crate::resources::ecs::{
    BaseService, BaseServiceOptions, Cluster, Ec2Service, FargateService, FargateServiceProps, LaunchType, TaskDefinition,
};
use crate::resources::elbv2::{
    ApplicationListener, ApplicationListenerProps, ApplicationLoadBalancer, ApplicationTargetGroup,
    HealthCheck, LoadBalancerProps, Protocol, RedirectOptions, TargetGroupProps,
};
use crate::resources::route53::HostedZone;

/// Options of the load balancing side.
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancedServiceBaseProps {
    /// Service and task options.
    pub service: ServiceOptions,
    /// Listener protocol. HTTPS when a certificate is given, HTTP otherwise.
    pub protocol: Option<Protocol>,
    /// Listener port. Defaults to the protocol's well-known port.
    pub listener_port: Option<u16>,
    /// Protocol between the load balancer and the tasks. Defaults to HTTP.
    pub target_protocol: Option<Protocol>,
    /// Listener certificate. Requested from ACM for HTTPS when absent.
    pub certificate: Option<Certificate>,
    /// TLS negotiation policy.
    pub ssl_policy: Option<String>,
    /// Custom domain for the service.
    pub domain_name: Option<String>,
    /// Zone hosting `domain_name`.
    pub domain_zone: Option<HostedZone>,
    /// Add a port 80 listener that redirects to HTTPS.
    pub redirect_http: bool,
    /// Admit traffic from anywhere on the listener port. Defaults to `true`.
    pub open_listener: bool,
    /// Internet-facing load balancer. Defaults to `true`.
    pub public_load_balancer: bool,
    /// Existing load balancer to use instead of a new one.
    pub load_balancer: Option<ApplicationLoadBalancer>,
    /// Name of the new load balancer.
    pub load_balancer_name: Option<String>,
    /// Idle timeout of the new load balancer.
    pub idle_timeout_secs: Option<u32>,
    /// Target group health check.
    pub health_check: Option<HealthCheck>,
}

impl Default for ApplicationLoadBalancedServiceBaseProps {
    fn default() -> Self {
        Self {
            service: ServiceOptions::default(),
            protocol: None,
            listener_port: None,
            target_protocol: None,
            certificate: None,
            ssl_policy: None,
            domain_name: None,
            domain_zone: None,
            redirect_http: false,
            open_listener: true,
            public_load_balancer: true,
            load_balancer: None,
            load_balancer_name: None,
            idle_timeout_secs: None,
            health_check: None,
        }
    }
}

/// Load balancer, listeners, target group and DNS shared by both flavours.
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancedServiceBase {
    /// Construct scope.
    pub node: NodeId,
    /// Cluster the service runs in.
    pub cluster: Cluster,
    /// Number of tasks.
    pub desired_count: u32,
    /// Load balancer.
    pub load_balancer: ApplicationLoadBalancer,
    /// Listener receiving client traffic.
    pub listener: ApplicationListener,
    /// HTTP to HTTPS redirect listener, if requested.
    pub redirect_listener: Option<ApplicationListener>,
    /// Target group of the service.
    pub target_group: ApplicationTargetGroup,
    /// Listener certificate (HTTPS only).
    pub certificate: Option<Certificate>,
    /// Custom domain, if one was configured.
    pub domain_name: Option<String>,
}

impl ApplicationLoadBalancedServiceBase {
    /// Creates the load balancing side below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Returns an error for conflicting cluster options, a zero desired
    /// count, a certificate or redirect without HTTPS, HTTPS without a
    /// certificate or a domain to request one for, or a domain without a
    /// zone.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: &ApplicationLoadBalancedServiceBaseProps,
    ) -> Result<Self> {
        let node = tree.add_scope(scope, id)?;
        let desired_count = desired_count(tree, node, &props.service)?;
        let cluster = resolve_cluster(tree, node, &props.service)?;

        if props.certificate.is_some() && props.protocol.is_some_and(|p| p != Protocol::Https) {
            return Err(tree.error(node, "The HTTPS protocol must be used when a certificate is given"));
        }
        let protocol = props.protocol.unwrap_or(if props.certificate.is_some() {
            Protocol::Https
        } else {
            Protocol::Http
        });
        if props.redirect_http && protocol != Protocol::Https {
            return Err(tree.error(node, "The HTTPS protocol must be used when redirecting HTTP traffic"));
        }

        let load_balancer = match props.load_balancer {
            Some(load_balancer) => load_balancer,
            None => ApplicationLoadBalancer::new(
                tree,
                node,
                "LB",
                &LoadBalancerProps {
                    internet_facing: props.public_load_balancer,
                    name: props.load_balancer_name.clone(),
                    idle_timeout_secs: props.idle_timeout_secs,
                    ..LoadBalancerProps::new(cluster.vpc.clone())
                },
            )?,
        };
        let listener = load_balancer.add_listener(
            tree,
            "PublicListener",
            ApplicationListenerProps {
                port: props.listener_port,
                protocol: Some(protocol),
                open: props.open_listener,
                ssl_policy: props.ssl_policy.clone(),
                ..ApplicationListenerProps::default()
            },
        )?;
        let target_group = ApplicationTargetGroup::new(
            tree,
            listener.node,
            "ECSGroup",
            &cluster.vpc,
            &TargetGroupProps {
                protocol: Some(props.target_protocol.unwrap_or(Protocol::Http)),
                health_check: props.health_check.clone(),
                ..TargetGroupProps::default()
            },
        )?;
        listener.add_target_group(tree, "ECS", &target_group, None, &[])?;

        let certificate = if protocol == Protocol::Https {
            let certificate = match &props.certificate {
                Some(certificate) => certificate.clone(),
                None => {
                    let (Some(domain_name), Some(zone)) = (&props.domain_name, &props.domain_zone) else {
                        return Err(tree.error(node, "A domain name and zone is required when using the HTTPS protocol"));
                    };
                    Certificate::new(tree, node, "Certificate", domain_name, &CertificateValidation::Dns(zone.clone()))?
                }
            };
            listener.add_certificates(tree, std::slice::from_ref(&certificate))?;
            Some(certificate)
        } else {
            None
        };

        let redirect_listener = if props.redirect_http {
            Some(load_balancer.add_redirect(
                tree,
                "PublicRedirectListener",
                RedirectOptions {
                    open: props.open_listener,
                    ..RedirectOptions::default()
                },
            )?)
        } else {
            None
        };

        let domain_name = add_domain_record(
            tree,
            node,
            "DNS",
            props.domain_name.as_deref(),
            props.domain_zone.as_ref(),
            &load_balancer.record_target(),
        )?;
        add_dns_output(tree, node, "", load_balancer.dns_name())?;
        add_url_output(tree, node, "", protocol.scheme(), domain_name.as_deref(), load_balancer.dns_name())?;

        tracing::info!(path = %tree.path(node), %protocol, port = listener.port, "built application load balanced service");
        Ok(Self {
            node,
            cluster,
            desired_count,
            load_balancer,
            listener,
            redirect_listener,
            target_group,
            certificate,
            domain_name,
        })
    }

    /// Registers the service's container with the target group.
    ///
    /// The service is ordered after the listener, and the load balancer's
    /// security group may reach the tasks on the container port.
    fn register(&self, tree: &mut ConstructTree, service: &BaseService, task: &TaskSetup) -> Result<()> {
        service.attach_to_target_group(tree, &self.target_group, &task.container_name, task.container_port)?;
        tree.add_dependency(service.node, self.listener.node);
        if let Some(group) = service.security_group {
            allow_from_load_balancer(tree, group, self.load_balancer.security_group, task.container_port)?;
        }
        Ok(())
    }

    fn options_for(&self, props: &ApplicationLoadBalancedServiceBaseProps, task: &TaskSetup) -> BaseServiceOptions {
        base_service_options(&props.service, self.cluster.clone(), task.task_definition, self.desired_count)
    }
}

fn allow_from_load_balancer(
    tree: &mut ConstructTree,
    service_group: SecurityGroup,
    load_balancer_group: SecurityGroup,
    port: u16,
) -> Result<()> {
    service_group.add_ingress(tree, Peer::SecurityGroup(load_balancer_group), port, "Load balancer to target")
}

/// Options of [`ApplicationLoadBalancedEc2Service`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationLoadBalancedEc2ServiceProps {
    /// Load balancing and service options.
    pub base: ApplicationLoadBalancedServiceBaseProps,
    /// Container CPU units.
    pub cpu: Option<u32>,
    /// Container hard memory limit in MiB.
    pub memory_limit_mib: Option<u32>,
    /// Container soft memory limit in MiB.
    pub memory_reservation_mib: Option<u32>,
}

/// An EC2 service behind an application load balancer.
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancedEc2Service {
    /// Load balancing side.
    pub base: ApplicationLoadBalancedServiceBase,
    /// Task definition the service runs.
    pub task_definition: TaskDefinition,
    /// The service.
    pub service: Ec2Service,
}

impl ApplicationLoadBalancedEc2Service {
    /// Builds the pattern below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Any error of [`ApplicationLoadBalancedServiceBase::new`], an
    /// ambiguous task source, or an invalid service configuration.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: ApplicationLoadBalancedEc2ServiceProps,
    ) -> Result<Self> {
        let base = ApplicationLoadBalancedServiceBase::new(tree, scope, id, &props.base)?;
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

        let service = Ec2Service::new(tree, base.node, "Service", base.options_for(&props.base, &task))?;
        base.register(tree, &service, &task)?;
        Ok(Self {
            base,
            task_definition: task.task_definition,
            service,
        })
    }
}

/// Options of [`ApplicationLoadBalancedFargateService`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationLoadBalancedFargateServiceProps {
    /// Load balancing and service options.
    pub base: ApplicationLoadBalancedServiceBaseProps,
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

/// A Fargate service behind an application load balancer.
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancedFargateService {
    /// Load balancing side.
    pub base: ApplicationLoadBalancedServiceBase,
    /// Task definition the service runs.
    pub task_definition: TaskDefinition,
    /// The service.
    pub service: FargateService,
}

impl ApplicationLoadBalancedFargateService {
    /// Builds the pattern below a new scope `id`.
    ///
    /// # Errors
    ///
    /// Any error of [`ApplicationLoadBalancedServiceBase::new`], an
    /// ambiguous task source, or an invalid service configuration.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: ApplicationLoadBalancedFargateServiceProps,
    ) -> Result<Self> {
        let base = ApplicationLoadBalancedServiceBase::new(tree, scope, id, &props.base)?;
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

        let mut options = base.options_for(&props.base, &task);
        options.security_groups.clone_from(&props.security_groups);
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
        for group in &props.security_groups {
            allow_from_load_balancer(tree, *group, base.load_balancer.security_group, task.container_port)?;
        }
        Ok(Self {
            base,
            task_definition: task.task_definition,
            service,
        })
    }
}
