//! YAML app manifest and its translation into a construct tree.
//!
//! ```yaml
//! stacks:
//!   - name: Web
//!     environment: { region: eu-west-1 }
//!     vpc: { max_azs: 3 }
//! services:
//!   - name: Api
//!     stack: Web
//!     pattern: application_load_balanced
//!     image: nginx:latest
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;
use stratus_common::config::{Environment, SynthConfig};
use stratus_common::error::Result as StratusResult;
use stratus_patterns::patterns::application_load_balanced::{
    ApplicationLoadBalancedEc2Service, ApplicationLoadBalancedEc2ServiceProps,
    ApplicationLoadBalancedFargateService, ApplicationLoadBalancedFargateServiceProps,
    ApplicationLoadBalancedServiceBaseProps,
};
use stratus_patterns::patterns::multiple_target_groups::{
    ApplicationMultipleTargetGroupsEc2Service, ApplicationMultipleTargetGroupsEc2ServiceProps,
    ApplicationMultipleTargetGroupsFargateService, ApplicationMultipleTargetGroupsFargateServiceProps,
    ApplicationMultipleTargetGroupsServiceBaseProps, ListenerOptions, LoadBalancerOptions, TargetOptions,
};
use stratus_patterns::patterns::network_load_balanced::{
    NetworkLoadBalancedEc2Service, NetworkLoadBalancedEc2ServiceProps, NetworkLoadBalancedFargateService,
    NetworkLoadBalancedFargateServiceProps, NetworkLoadBalancedServiceBaseProps,
};
use stratus_patterns::patterns::{ServiceOptions, TaskImageOptions};
use stratus_patterns::resources::acm::Certificate;
use stratus_patterns::resources::ec2::{Vpc, VpcProps};
use stratus_patterns::resources::ecs::{AwsLogDriver, CircuitBreaker, Cluster, PropagateTags};
use stratus_patterns::resources::elbv2::{HealthCheck, Protocol};
use stratus_patterns::resources::route53::HostedZone;
use stratus_synth::tree::{ConstructTree, NodeId, StackProps};

/// Root of an app manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppManifest {
    /// Stacks to synthesize.
    #[serde(default)]
    pub stacks: Vec<StackSpec>,
    /// Services, each placed in one of the stacks.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
}

/// A stack declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackSpec {
    /// Construct id and deployed stack name.
    pub name: String,
    /// Template description.
    #[serde(default)]
    pub description: Option<String>,
    /// Target environment. Falls back to the CLI defaults.
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Shared VPC for the stack's services.
    #[serde(default)]
    pub vpc: Option<VpcSpec>,
    /// Construct id of a shared cluster for the stack's services.
    #[serde(default)]
    pub cluster: Option<String>,
}

/// Shared VPC options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VpcSpec {
    /// Address block.
    pub cidr: String,
    /// Availability zones to span.
    pub max_azs: usize,
}

impl Default for VpcSpec {
    fn default() -> Self {
        let props = VpcProps::default();
        Self {
            cidr: props.cidr,
            max_azs: props.max_azs,
        }
    }
}

/// Which pattern a service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// One application load balancer and listener.
    ApplicationLoadBalanced,
    /// One network load balancer and listener.
    NetworkLoadBalanced,
    /// Named load balancers, listeners and target groups.
    MultipleTargetGroups,
}

/// Where tasks run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchKind {
    /// Fargate.
    #[default]
    Fargate,
    /// EC2 container instances.
    Ec2,
}

/// A hosted zone by id and name.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneSpec {
    /// Hosted zone id.
    pub id: String,
    /// Zone name.
    pub name: String,
}

impl ZoneSpec {
    fn to_zone(&self) -> HostedZone {
        HostedZone::from_attributes(&self.id, &self.name)
    }
}

/// A listener of a multiple-target-groups service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerSpec {
    /// Listener name.
    pub name: String,
    /// Listener protocol.
    #[serde(default)]
    pub protocol: Option<Protocol>,
    /// Listener port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Imported certificate ARN.
    #[serde(default)]
    pub certificate_arn: Option<String>,
    /// TLS negotiation policy.
    #[serde(default)]
    pub ssl_policy: Option<String>,
}

/// A load balancer of a multiple-target-groups service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerSpec {
    /// Load balancer name.
    pub name: String,
    /// Listeners.
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
    /// Internet-facing load balancer.
    #[serde(default = "default_true")]
    pub public: bool,
    /// Idle timeout.
    #[serde(default)]
    pub idle_timeout_secs: Option<u32>,
    /// Custom domain.
    #[serde(default)]
    pub domain_name: Option<String>,
    /// Zone hosting the custom domain.
    #[serde(default)]
    pub domain_zone: Option<ZoneSpec>,
}

/// A target group of a multiple-target-groups service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    /// Container port.
    pub container_port: u16,
    /// Listener name.
    #[serde(default)]
    pub listener: Option<String>,
    /// Target protocol.
    #[serde(default)]
    pub protocol: Option<Protocol>,
    /// Rule priority.
    #[serde(default)]
    pub priority: Option<u32>,
    /// Path pattern condition.
    #[serde(default)]
    pub path_pattern: Option<String>,
    /// Host header condition.
    #[serde(default)]
    pub host_header: Option<String>,
}

/// A service declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Construct id of the pattern.
    pub name: String,
    /// Stack the service belongs to.
    pub stack: String,
    /// Pattern to build.
    pub pattern: PatternKind,
    /// Launch type.
    #[serde(default)]
    pub launch_type: LaunchKind,
    /// Container image.
    pub image: String,
    /// Container name.
    #[serde(default)]
    pub container_name: Option<String>,
    /// Container port.
    #[serde(default)]
    pub container_port: Option<u16>,
    /// Plain environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Secret-backed environment variables, by secret ARN.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    /// Command override.
    #[serde(default)]
    pub command: Vec<String>,
    /// Entry point override.
    #[serde(default)]
    pub entry_point: Vec<String>,
    /// Docker labels.
    #[serde(default)]
    pub docker_labels: BTreeMap<String, String>,
    /// Ship container output to CloudWatch.
    #[serde(default = "default_true")]
    pub enable_logging: bool,
    /// Log retention of the generated log group.
    #[serde(default)]
    pub log_retention_days: Option<u32>,
    /// Task definition family.
    #[serde(default)]
    pub family: Option<String>,
    /// Number of tasks.
    #[serde(default)]
    pub desired_count: Option<u32>,
    /// Explicit service name.
    #[serde(default)]
    pub service_name: Option<String>,
    /// CPU units.
    #[serde(default)]
    pub cpu: Option<u32>,
    /// Memory limit in MiB.
    #[serde(default)]
    pub memory_limit_mib: Option<u32>,
    /// Memory reservation in MiB (EC2 only).
    #[serde(default)]
    pub memory_reservation_mib: Option<u32>,
    /// Public task IPs (Fargate only).
    #[serde(default)]
    pub assign_public_ip: bool,
    /// Fargate platform version.
    #[serde(default)]
    pub platform_version: Option<String>,
    /// Lower deployment bound in percent.
    #[serde(default)]
    pub min_healthy_percent: Option<u32>,
    /// Upper deployment bound in percent.
    #[serde(default)]
    pub max_healthy_percent: Option<u32>,
    /// Health check grace period.
    #[serde(default)]
    pub health_check_grace_period_secs: Option<u32>,
    /// Deployment circuit breaker.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreaker>,
    /// Let ECS tag tasks.
    #[serde(default)]
    pub enable_ecs_managed_tags: bool,
    /// Tag propagation.
    #[serde(default)]
    pub propagate_tags: Option<PropagateTags>,
    /// Listener port.
    #[serde(default)]
    pub listener_port: Option<u16>,
    /// Listener protocol.
    #[serde(default)]
    pub protocol: Option<Protocol>,
    /// Target protocol.
    #[serde(default)]
    pub target_protocol: Option<Protocol>,
    /// Imported listener certificate ARN.
    #[serde(default)]
    pub certificate_arn: Option<String>,
    /// TLS negotiation policy.
    #[serde(default)]
    pub ssl_policy: Option<String>,
    /// Custom domain.
    #[serde(default)]
    pub domain_name: Option<String>,
    /// Zone hosting the custom domain.
    #[serde(default)]
    pub domain_zone: Option<ZoneSpec>,
    /// Redirect port 80 to HTTPS.
    #[serde(default)]
    pub redirect_http: bool,
    /// Open the listener to the world.
    #[serde(default = "default_true")]
    pub open_listener: bool,
    /// Internet-facing load balancer.
    #[serde(default = "default_true")]
    pub public_load_balancer: bool,
    /// Load balancer name.
    #[serde(default)]
    pub load_balancer_name: Option<String>,
    /// Load balancer idle timeout.
    #[serde(default)]
    pub idle_timeout_secs: Option<u32>,
    /// Target group health check.
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    /// Load balancers (multiple target groups only).
    #[serde(default)]
    pub load_balancers: Option<Vec<LoadBalancerSpec>>,
    /// Target groups (multiple target groups only).
    #[serde(default)]
    pub target_groups: Option<Vec<TargetSpec>>,
    /// Services deployed before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

const fn default_true() -> bool {
    true
}

/// Reads and parses a manifest file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid manifest.
pub fn load(path: &Path) -> anyhow::Result<AppManifest> {
    tracing::info!(path = %path.display(), "loading manifest");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    parse(&content).with_context(|| format!("invalid manifest {}", path.display()))
}

/// Parses manifest text.
///
/// # Errors
///
/// Returns an error if the text is not a valid manifest.
pub fn parse(content: &str) -> anyhow::Result<AppManifest> {
    Ok(serde_yaml::from_str(content)?)
}

/// Shared infrastructure declared on a stack.
#[derive(Debug, Default)]
struct StackShared {
    vpc: Option<Vpc>,
    cluster: Option<Cluster>,
}

/// Builds the construct tree of `manifest`.
///
/// # Errors
///
/// Returns an error for unknown or duplicate stack and service names, or
/// any construction error of the patterns.
pub fn build(manifest: &AppManifest, config: &SynthConfig) -> anyhow::Result<ConstructTree> {
    if manifest.stacks.is_empty() {
        bail!("manifest declares no stacks");
    }
    let mut tree = ConstructTree::with_environment(config.environment.clone());

    let mut stacks: HashMap<&str, (NodeId, StackShared)> = HashMap::new();
    for spec in &manifest.stacks {
        let node = tree
            .add_stack(
                &spec.name,
                StackProps {
                    stack_name: None,
                    environment: spec.environment.clone(),
                    description: spec.description.clone(),
                },
            )
            .with_context(|| format!("stack {}", spec.name))?;
        let shared = add_shared(&mut tree, node, spec).with_context(|| format!("stack {}", spec.name))?;
        if stacks.insert(spec.name.as_str(), (node, shared)).is_some() {
            bail!("stack {} is declared more than once", spec.name);
        }
    }

    let mut services: HashMap<&str, NodeId> = HashMap::new();
    for spec in &manifest.services {
        let Some((stack, shared)) = stacks.get(spec.stack.as_str()) else {
            bail!("service {} refers to unknown stack {}", spec.name, spec.stack);
        };
        let node = add_service(&mut tree, *stack, shared, spec)
            .with_context(|| format!("service {}", spec.name))?;
        if services.insert(spec.name.as_str(), node).is_some() {
            bail!("service {} is declared more than once", spec.name);
        }
    }

    for spec in &manifest.services {
        for dependency in &spec.depends_on {
            let Some(&target) = services.get(dependency.as_str()) else {
                bail!("service {} depends on unknown service {dependency}", spec.name);
            };
            let dependent = services[spec.name.as_str()];
            tree.add_dependency(dependent, target);
        }
    }

    tracing::info!(
        stacks = manifest.stacks.len(),
        services = manifest.services.len(),
        "built construct tree"
    );
    Ok(tree)
}

fn add_shared(tree: &mut ConstructTree, stack: NodeId, spec: &StackSpec) -> StratusResult<StackShared> {
    let vpc = match &spec.vpc {
        Some(vpc) => Some(Vpc::new(
            tree,
            stack,
            "Vpc",
            &VpcProps {
                cidr: vpc.cidr.clone(),
                max_azs: vpc.max_azs,
            },
        )?),
        None => None,
    };
    let cluster = match &spec.cluster {
        Some(id) => Some(Cluster::new(tree, stack, id, vpc.clone())?),
        None => None,
    };
    Ok(StackShared { vpc, cluster })
}

fn service_options(spec: &ServiceSpec, shared: &StackShared) -> ServiceOptions {
    let mut image = TaskImageOptions::new(&spec.image);
    image.container_name.clone_from(&spec.container_name);
    image.container_port = spec.container_port;
    image.environment.clone_from(&spec.environment);
    image.secrets.clone_from(&spec.secrets);
    image.command.clone_from(&spec.command);
    image.entry_point.clone_from(&spec.entry_point);
    image.docker_labels.clone_from(&spec.docker_labels);
    image.enable_logging = spec.enable_logging;
    image.family.clone_from(&spec.family);
    if spec.enable_logging && spec.log_retention_days.is_some() {
        image.log_driver = Some(AwsLogDriver {
            stream_prefix: spec.name.clone(),
            retention_days: spec.log_retention_days,
        });
    }

    // A shared cluster already carries the shared VPC.
    let (cluster, vpc) = match (&shared.cluster, &shared.vpc) {
        (Some(cluster), _) => (Some(cluster.clone()), None),
        (None, vpc) => (None, vpc.clone()),
    };
    ServiceOptions {
        cluster,
        vpc,
        desired_count: spec.desired_count,
        service_name: spec.service_name.clone(),
        health_check_grace_period_secs: spec.health_check_grace_period_secs,
        min_healthy_percent: spec.min_healthy_percent,
        max_healthy_percent: spec.max_healthy_percent,
        circuit_breaker: spec.circuit_breaker,
        enable_ecs_managed_tags: spec.enable_ecs_managed_tags,
        propagate_tags: spec.propagate_tags,
        task_definition: None,
        task_image_options: Some(image),
    }
}

fn add_service(
    tree: &mut ConstructTree,
    stack: NodeId,
    shared: &StackShared,
    spec: &ServiceSpec,
) -> StratusResult<NodeId> {
    let service = service_options(spec, shared);
    let certificate = spec.certificate_arn.as_ref().map(Certificate::from_arn);
    let domain_zone = spec.domain_zone.as_ref().map(ZoneSpec::to_zone);
    tracing::debug!(service = %spec.name, pattern = ?spec.pattern, launch_type = ?spec.launch_type, "adding service");

    match spec.pattern {
        PatternKind::ApplicationLoadBalanced => {
            let base = ApplicationLoadBalancedServiceBaseProps {
                service,
                protocol: spec.protocol,
                listener_port: spec.listener_port,
                target_protocol: spec.target_protocol,
                certificate,
                ssl_policy: spec.ssl_policy.clone(),
                domain_name: spec.domain_name.clone(),
                domain_zone,
                redirect_http: spec.redirect_http,
                open_listener: spec.open_listener,
                public_load_balancer: spec.public_load_balancer,
                load_balancer: None,
                load_balancer_name: spec.load_balancer_name.clone(),
                idle_timeout_secs: spec.idle_timeout_secs,
                health_check: spec.health_check.clone(),
            };
            match spec.launch_type {
                LaunchKind::Fargate => ApplicationLoadBalancedFargateService::new(
                    tree,
                    stack,
                    &spec.name,
                    ApplicationLoadBalancedFargateServiceProps {
                        base,
                        cpu: spec.cpu,
                        memory_limit_mib: spec.memory_limit_mib,
                        assign_public_ip: spec.assign_public_ip,
                        platform_version: spec.platform_version.clone(),
                        security_groups: Vec::new(),
                    },
                )
                .map(|p| p.base.node),
                LaunchKind::Ec2 => ApplicationLoadBalancedEc2Service::new(
                    tree,
                    stack,
                    &spec.name,
                    ApplicationLoadBalancedEc2ServiceProps {
                        base,
                        cpu: spec.cpu,
                        memory_limit_mib: spec.memory_limit_mib,
                        memory_reservation_mib: spec.memory_reservation_mib,
                    },
                )
                .map(|p| p.base.node),
            }
        }
        PatternKind::NetworkLoadBalanced => {
            let base = NetworkLoadBalancedServiceBaseProps {
                service,
                listener_port: spec.listener_port,
                protocol: spec.protocol,
                certificate,
                ssl_policy: spec.ssl_policy.clone(),
                target_protocol: spec.target_protocol,
                domain_name: spec.domain_name.clone(),
                domain_zone,
                public_load_balancer: spec.public_load_balancer,
                load_balancer: None,
                load_balancer_name: spec.load_balancer_name.clone(),
                health_check: spec.health_check.clone(),
            };
            match spec.launch_type {
                LaunchKind::Fargate => NetworkLoadBalancedFargateService::new(
                    tree,
                    stack,
                    &spec.name,
                    NetworkLoadBalancedFargateServiceProps {
                        base,
                        cpu: spec.cpu,
                        memory_limit_mib: spec.memory_limit_mib,
                        assign_public_ip: spec.assign_public_ip,
                        platform_version: spec.platform_version.clone(),
                        security_groups: Vec::new(),
                    },
                )
                .map(|p| p.base.node),
                LaunchKind::Ec2 => NetworkLoadBalancedEc2Service::new(
                    tree,
                    stack,
                    &spec.name,
                    NetworkLoadBalancedEc2ServiceProps {
                        base,
                        cpu: spec.cpu,
                        memory_limit_mib: spec.memory_limit_mib,
                        memory_reservation_mib: spec.memory_reservation_mib,
                    },
                )
                .map(|p| p.base.node),
            }
        }
        PatternKind::MultipleTargetGroups => {
            let base = ApplicationMultipleTargetGroupsServiceBaseProps {
                service,
                load_balancers: spec
                    .load_balancers
                    .as_ref()
                    .map(|lbs| lbs.iter().map(load_balancer_options).collect()),
                target_groups: spec
                    .target_groups
                    .as_ref()
                    .map(|targets| targets.iter().map(target_options).collect()),
            };
            match spec.launch_type {
                LaunchKind::Fargate => ApplicationMultipleTargetGroupsFargateService::new(
                    tree,
                    stack,
                    &spec.name,
                    ApplicationMultipleTargetGroupsFargateServiceProps {
                        base,
                        cpu: spec.cpu,
                        memory_limit_mib: spec.memory_limit_mib,
                        assign_public_ip: spec.assign_public_ip,
                        platform_version: spec.platform_version.clone(),
                        security_groups: Vec::new(),
                    },
                )
                .map(|p| p.base.node),
                LaunchKind::Ec2 => ApplicationMultipleTargetGroupsEc2Service::new(
                    tree,
                    stack,
                    &spec.name,
                    ApplicationMultipleTargetGroupsEc2ServiceProps {
                        base,
                        cpu: spec.cpu,
                        memory_limit_mib: spec.memory_limit_mib,
                        memory_reservation_mib: spec.memory_reservation_mib,
                    },
                )
                .map(|p| p.base.node),
            }
        }
    }
}

fn load_balancer_options(spec: &LoadBalancerSpec) -> LoadBalancerOptions {
    let listeners = spec
        .listeners
        .iter()
        .map(|listener| ListenerOptions {
            name: listener.name.clone(),
            protocol: listener.protocol,
            port: listener.port,
            certificate: listener.certificate_arn.as_ref().map(Certificate::from_arn),
            ssl_policy: listener.ssl_policy.clone(),
        })
        .collect();
    LoadBalancerOptions {
        public_load_balancer: spec.public,
        idle_timeout_secs: spec.idle_timeout_secs,
        domain_name: spec.domain_name.clone(),
        domain_zone: spec.domain_zone.as_ref().map(ZoneSpec::to_zone),
        ..LoadBalancerOptions::new(&spec.name, listeners)
    }
}

fn target_options(spec: &TargetSpec) -> TargetOptions {
    TargetOptions {
        container_port: spec.container_port,
        listener: spec.listener.clone(),
        protocol: spec.protocol,
        priority: spec.priority,
        path_pattern: spec.path_pattern.clone(),
        host_header: spec.host_header.clone(),
    }
}

#[cfg(test)]
mod tests {
    use stratus_synth::synth::synthesize;

    use super::*;

    const TWO_STACKS: &str = r"
stacks:
  - name: Network
    vpc: { max_azs: 3 }
    cluster: Shared
  - name: App
    environment: { region: eu-west-1 }
services:
  - name: Cache
    stack: Network
    pattern: network_load_balanced
    image: redis:7
    container_port: 6379
  - name: Web
    stack: App
    pattern: application_load_balanced
    image: nginx:latest
    desired_count: 2
    circuit_breaker: { rollback: true }
    depends_on: [Cache]
";

    #[test]
    fn parses_stacks_and_services() {
        let manifest = parse(TWO_STACKS).expect("parse");
        assert_eq!(manifest.stacks.len(), 2);
        assert_eq!(manifest.stacks[0].vpc.as_ref().map(|v| v.max_azs), Some(3));
        assert_eq!(manifest.services[0].pattern, PatternKind::NetworkLoadBalanced);
        assert_eq!(manifest.services[1].launch_type, LaunchKind::Fargate);
        assert!(manifest.services[1].open_listener);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = parse("stacks: []\nservice: []\n").unwrap_err();
        assert!(err.to_string().contains("unknown field"), "got: {err}");
    }

    #[test]
    fn builds_and_orders_dependent_stacks() {
        let manifest = parse(TWO_STACKS).expect("parse");
        let tree = build(&manifest, &SynthConfig::default()).expect("build");
        let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");

        let names: Vec<&str> = assembly.stacks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Network", "App"]);
        let app = assembly.stack("App").expect("app");
        assert_eq!(app.dependencies, vec!["Network".to_string()]);
        assert_eq!(app.environment.region, "eu-west-1");
        assert_eq!(assembly.stack("Network").expect("network").environment.region, "us-east-1");
        assert_eq!(
            assembly
                .stack("Network")
                .expect("network")
                .template
                .resources_of_type("AWS::EC2::Subnet")
                .len(),
            6
        );
    }

    #[test]
    fn unknown_stack_is_reported() {
        let manifest = parse(
            "stacks: [{ name: App }]\nservices: [{ name: Web, stack: Missing, pattern: application_load_balanced, image: nginx }]\n",
        )
        .expect("parse");
        let err = build(&manifest, &SynthConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unknown stack Missing"), "got: {err}");
    }

    #[test]
    fn pattern_errors_carry_the_service_name() {
        let manifest = parse(
            "stacks: [{ name: App }]\nservices: [{ name: Web, stack: App, pattern: application_load_balanced, image: nginx, redirect_http: true }]\n",
        )
        .expect("parse");
        let err = build(&manifest, &SynthConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "service Web");
        assert!(format!("{err:#}").contains("redirecting HTTP traffic"));
    }
}
