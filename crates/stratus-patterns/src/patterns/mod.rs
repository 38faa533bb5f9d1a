//! Load-balanced ECS service patterns.
//!
//! Each pattern comes in an EC2 and a Fargate flavour sharing a base that
//! owns the load balancing side. Option combinations are checked while the
//! pattern is built, so a bad combination fails at the call site rather than
//! at synthesis.

pub mod application_load_balanced;
pub mod multiple_target_groups;
pub mod network_load_balanced;

use std::collections::BTreeMap;

use stratus_common::constants::{DEFAULT_CONTAINER_NAME, DEFAULT_CONTAINER_PORT};
use stratus_common::error::Result;
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Output};

use crate::resources::ecs::{
    AwsLogDriver, BaseServiceOptions, CircuitBreaker, Cluster, Compatibility, ContainerDefinition,
    ContainerOptions, LaunchType, NetworkMode, PortMapping, PropagateTags, TaskDefinition,
    TaskDefinitionProps, get_or_create_cluster,
};
use crate::resources::ec2::Vpc;
use crate::resources::iam::Role;
use crate::resources::route53::{ARecord, HostedZone, RecordTarget};

/// How to build the task definition from an image.
#[derive(Debug, Clone)]
pub struct TaskImageOptions {
    /// Image reference.
    pub image: String,
    /// Container name. Defaults to `web`.
    pub container_name: Option<String>,
    /// Port the container listens on. Defaults to 80.
    pub container_port: Option<u16>,
    /// Ship container output to CloudWatch. Defaults to `true`.
    pub enable_logging: bool,
    /// Log driver to use instead of the default one.
    pub log_driver: Option<AwsLogDriver>,
    /// Plain environment variables.
    pub environment: BTreeMap<String, String>,
    /// Environment variables read from secrets.
    pub secrets: BTreeMap<String, String>,
    /// Command override.
    pub command: Vec<String>,
    /// Entry point override.
    pub entry_point: Vec<String>,
    /// Docker labels.
    pub docker_labels: BTreeMap<String, String>,
    /// Execution role to use instead of a generated one.
    pub execution_role: Option<Role>,
    /// Task role to use instead of a generated one.
    pub task_role: Option<Role>,
    /// Task definition family.
    pub family: Option<String>,
}

impl TaskImageOptions {
    /// Options running `image` with logging enabled.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            container_name: None,
            container_port: None,
            enable_logging: true,
            log_driver: None,
            environment: BTreeMap::new(),
            secrets: BTreeMap::new(),
            command: Vec::new(),
            entry_point: Vec::new(),
            docker_labels: BTreeMap::new(),
            execution_role: None,
            task_role: None,
            family: None,
        }
    }

    fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or(DEFAULT_CONTAINER_NAME)
    }
}

/// Service options common to every pattern.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Cluster to run in. Exclusive with `vpc`.
    pub cluster: Option<Cluster>,
    /// VPC whose shared cluster to run in. Exclusive with `cluster`.
    pub vpc: Option<Vpc>,
    /// Number of tasks. Defaults to 1.
    pub desired_count: Option<u32>,
    /// Explicit service name.
    pub service_name: Option<String>,
    /// Seconds to ignore failing health checks after a task starts.
    pub health_check_grace_period_secs: Option<u32>,
    /// Lower bound of running tasks during a deployment, in percent.
    pub min_healthy_percent: Option<u32>,
    /// Upper bound of running tasks during a deployment, in percent.
    pub max_healthy_percent: Option<u32>,
    /// Deployment circuit breaker.
    pub circuit_breaker: Option<CircuitBreaker>,
    /// Let ECS tag tasks.
    pub enable_ecs_managed_tags: bool,
    /// Tag propagation to tasks.
    pub propagate_tags: Option<PropagateTags>,
    /// Task definition to run. Exclusive with `task_image_options`.
    pub task_definition: Option<TaskDefinition>,
    /// Image to build a task definition for. Exclusive with `task_definition`.
    pub task_image_options: Option<TaskImageOptions>,
}

/// Task-level (Fargate) or container-level (EC2) sizing.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TaskSizing {
    pub cpu: Option<u32>,
    pub memory_limit_mib: Option<u32>,
    pub memory_reservation_mib: Option<u32>,
}

/// The task a pattern runs and the container that receives traffic.
#[derive(Debug, Clone)]
pub(crate) struct TaskSetup {
    pub task_definition: TaskDefinition,
    pub container: ContainerDefinition,
    pub container_name: String,
    pub container_port: u16,
}

/// Checks the cluster options, returning the cluster to use.
pub(crate) fn resolve_cluster(tree: &mut ConstructTree, node: NodeId, options: &ServiceOptions) -> Result<Cluster> {
    match (&options.cluster, &options.vpc) {
        (Some(_), Some(_)) => Err(tree.error(
            node,
            "You can only specify either vpc or cluster. Alternatively, you can leave both blank",
        )),
        (Some(cluster), None) => Ok(cluster.clone()),
        (None, vpc) => get_or_create_cluster(tree, node, vpc.as_ref()),
    }
}

/// Returns the desired count, rejecting zero.
pub(crate) fn desired_count(tree: &ConstructTree, node: NodeId, options: &ServiceOptions) -> Result<u32> {
    match options.desired_count {
        Some(0) => Err(tree.error(node, "You must specify a desiredCount greater than 0")),
        count => Ok(count.unwrap_or(1)),
    }
}

/// Builds or adopts the task definition of a pattern.
///
/// Image options produce a task definition `TaskDef` holding a single
/// container. An adopted task definition contributes its default container.
pub(crate) fn prepare_task(
    tree: &mut ConstructTree,
    node: NodeId,
    options: &ServiceOptions,
    launch_type: LaunchType,
    sizing: TaskSizing,
) -> Result<TaskSetup> {
    match (&options.task_definition, &options.task_image_options) {
        (Some(_), Some(_)) => Err(tree.error(
            node,
            "You must specify either a taskDefinition or taskImageOptions, not both.",
        )),
        (None, None) => Err(tree.error(node, "You must specify one of: taskDefinition or image")),
        (Some(task_definition), None) => {
            let container = task_definition.default_container(tree).ok_or_else(|| {
                tree.error(node, "the supplied task definition has no essential container")
            })?;
            let container_name = container.name(tree).unwrap_or_default();
            let container_port = container
                .container_ports(tree)
                .first()
                .copied()
                .unwrap_or(DEFAULT_CONTAINER_PORT);
            Ok(TaskSetup {
                task_definition: *task_definition,
                container,
                container_name,
                container_port,
            })
        }
        (None, Some(image)) => image_task(tree, node, image, launch_type, sizing),
    }
}

fn image_task(
    tree: &mut ConstructTree,
    node: NodeId,
    image: &TaskImageOptions,
    launch_type: LaunchType,
    sizing: TaskSizing,
) -> Result<TaskSetup> {
    let fargate = launch_type == LaunchType::Fargate;
    let props = TaskDefinitionProps {
        compatibility: if fargate { Compatibility::Fargate } else { Compatibility::Ec2 },
        cpu: if fargate { sizing.cpu } else { None },
        memory_mib: if fargate { sizing.memory_limit_mib } else { None },
        network_mode: Some(if fargate { NetworkMode::AwsVpc } else { NetworkMode::Bridge }),
        family: image.family.clone(),
        task_role: image.task_role,
        execution_role: image.execution_role,
    };
    let task_definition = TaskDefinition::new(tree, node, "TaskDef", props)?;

    let stream_prefix = tree.id(node).to_string();
    let logging = image
        .log_driver
        .clone()
        .or_else(|| image.enable_logging.then(|| AwsLogDriver::new(stream_prefix)));
    let container_name = image.container_name().to_string();
    let container = task_definition.add_container(
        tree,
        &container_name,
        ContainerOptions {
            image: image.image.clone(),
            container_name: Some(container_name.clone()),
            memory_limit_mib: if fargate { None } else { sizing.memory_limit_mib },
            memory_reservation_mib: if fargate { None } else { sizing.memory_reservation_mib },
            cpu: if fargate { None } else { sizing.cpu },
            essential: Some(true),
            environment: image.environment.clone(),
            secrets: image.secrets.clone(),
            command: image.command.clone(),
            entry_point: image.entry_point.clone(),
            docker_labels: image.docker_labels.clone(),
            logging,
        },
    )?;

    Ok(TaskSetup {
        task_definition,
        container,
        container_name,
        container_port: image.container_port.unwrap_or(DEFAULT_CONTAINER_PORT),
    })
}

/// Maps every port not yet mapped on `container`.
pub(crate) fn map_ports(tree: &mut ConstructTree, container: &ContainerDefinition, ports: &[u16]) -> Result<()> {
    let mut missing: Vec<PortMapping> = Vec::new();
    for &port in ports {
        if !container.has_port_mapping(tree, port) && !missing.iter().any(|m| m.container_port == port) {
            missing.push(PortMapping::tcp(port));
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    container.add_port_mappings(tree, &missing)
}

/// Service options derived from the pattern options.
pub(crate) fn base_service_options(
    options: &ServiceOptions,
    cluster: Cluster,
    task_definition: TaskDefinition,
    desired_count: u32,
) -> BaseServiceOptions {
    BaseServiceOptions {
        desired_count: Some(desired_count),
        service_name: options.service_name.clone(),
        min_healthy_percent: options.min_healthy_percent,
        max_healthy_percent: options.max_healthy_percent,
        health_check_grace_period_secs: options.health_check_grace_period_secs,
        circuit_breaker: options.circuit_breaker,
        enable_ecs_managed_tags: options.enable_ecs_managed_tags,
        propagate_tags: options.propagate_tags,
        ..BaseServiceOptions::new(cluster, task_definition)
    }
}

/// Adds the alias record for a custom domain.
///
/// Returns the domain name, or `None` when no domain was requested.
pub(crate) fn add_domain_record(
    tree: &mut ConstructTree,
    node: NodeId,
    id: &str,
    domain_name: Option<&str>,
    domain_zone: Option<&HostedZone>,
    target: &RecordTarget,
) -> Result<Option<String>> {
    let Some(domain_name) = domain_name else {
        return Ok(None);
    };
    let Some(zone) = domain_zone else {
        return Err(tree.error(
            node,
            "A Route53 hosted domain zone name is required to configure the specified domain name",
        ));
    };
    let record = ARecord::new(tree, node, id, zone, Some(domain_name), target)?;
    Ok(Some(record.domain_name().to_string()))
}

/// Adds the `LoadBalancerDNS<suffix>` output.
pub(crate) fn add_dns_output(tree: &mut ConstructTree, node: NodeId, suffix: &str, dns_name: Value) -> Result<()> {
    let _ = tree.add_output(
        node,
        &format!("LoadBalancerDNS{suffix}"),
        Output::new(dns_name).with_description("DNS name of the load balancer"),
    )?;
    Ok(())
}

/// Adds the `ServiceURL<suffix>` output: `<scheme>://<domain>`, falling back
/// to the load balancer's DNS name.
pub(crate) fn add_url_output(
    tree: &mut ConstructTree,
    node: NodeId,
    suffix: &str,
    scheme: &str,
    domain_name: Option<&str>,
    dns_name: Value,
) -> Result<()> {
    let host = match domain_name {
        Some(domain) => domain.to_string(),
        None => tree.token_string(dns_name),
    };
    let _ = tree.add_output(
        node,
        &format!("ServiceURL{suffix}"),
        Output::new(format!("{scheme}://{host}")).with_description("URL of the service"),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use stratus_synth::tree::StackProps;

    use super::*;
    use crate::resources::ec2::VpcProps;

    fn setup() -> (ConstructTree, NodeId) {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let node = tree.add_scope(stack, "Service").expect("scope");
        (tree, node)
    }

    #[test]
    fn cluster_and_vpc_are_exclusive() {
        let (mut tree, node) = setup();
        let stack = tree.parent(node).expect("stack");
        let vpc = Vpc::new(&mut tree, stack, "Vpc", &VpcProps::default()).expect("vpc");
        let cluster = Cluster::new(&mut tree, stack, "Cluster", Some(vpc.clone())).expect("cluster");
        let options = ServiceOptions {
            cluster: Some(cluster),
            vpc: Some(vpc),
            ..ServiceOptions::default()
        };
        let err = resolve_cluster(&mut tree, node, &options).unwrap_err();
        assert!(err.to_string().contains("either vpc or cluster"), "got: {err}");
    }

    #[test]
    fn zero_desired_count_is_rejected() {
        let (tree, node) = setup();
        let options = ServiceOptions {
            desired_count: Some(0),
            ..ServiceOptions::default()
        };
        assert!(desired_count(&tree, node, &options).is_err());
        assert_eq!(desired_count(&tree, node, &ServiceOptions::default()).expect("default"), 1);
    }

    #[test]
    fn task_source_must_be_unambiguous() {
        let (mut tree, node) = setup();
        let err = prepare_task(&mut tree, node, &ServiceOptions::default(), LaunchType::Fargate, TaskSizing::default())
            .unwrap_err();
        assert!(err.to_string().contains("taskDefinition or image"), "got: {err}");

        let existing = TaskDefinition::new(
            &mut tree,
            node,
            "Existing",
            TaskDefinitionProps {
                compatibility: Compatibility::Fargate,
                ..TaskDefinitionProps::default()
            },
        )
        .expect("task definition");
        let options = ServiceOptions {
            task_definition: Some(existing),
            task_image_options: Some(TaskImageOptions::new("nginx")),
            ..ServiceOptions::default()
        };
        let err = prepare_task(&mut tree, node, &options, LaunchType::Fargate, TaskSizing::default()).unwrap_err();
        assert!(err.to_string().contains("not both"), "got: {err}");
    }

    #[test]
    fn image_task_uses_defaults() {
        let (mut tree, node) = setup();
        let options = ServiceOptions {
            task_image_options: Some(TaskImageOptions::new("nginx")),
            ..ServiceOptions::default()
        };
        let setup = prepare_task(&mut tree, node, &options, LaunchType::Fargate, TaskSizing::default())
            .expect("task");
        assert_eq!(setup.container_name, DEFAULT_CONTAINER_NAME);
        assert_eq!(setup.container_port, DEFAULT_CONTAINER_PORT);
        let task_node = setup.task_definition.node;
        assert!(tree.find_child(task_node, "webLogGroup").is_some());

        map_ports(&mut tree, &setup.container, &[80, 80, 8080]).expect("ports");
        map_ports(&mut tree, &setup.container, &[80]).expect("again");
        assert_eq!(setup.container.container_ports(&tree), vec![80, 8080]);
    }

    #[test]
    fn domain_requires_a_zone() {
        let (mut tree, node) = setup();
        let target = RecordTarget::LoadBalancer {
            dns_name: "lb.example.com".into(),
            canonical_hosted_zone_id: "Z123".into(),
        };
        let err = add_domain_record(&mut tree, node, "DNS", Some("api"), None, &target).unwrap_err();
        assert!(err.to_string().contains("hosted domain zone"), "got: {err}");

        let zone = HostedZone::from_attributes("Z1", "example.com");
        let domain = add_domain_record(&mut tree, node, "DNS", Some("api"), Some(&zone), &target)
            .expect("record");
        assert_eq!(domain.as_deref(), Some("api.example.com"));
    }
}
