//! ECS clusters, task definitions, containers, and services.
//!
//! Container definitions are fragments below their task definition. The
//! task definition renders them through a lazy value, so containers, port
//! mappings, and log settings may be added in any order before synthesis.
//! Services keep their load balancer attachments in a fragment the same way.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use stratus_common::constants::{
    DEFAULT_CLUSTER_ID, DEFAULT_FARGATE_CPU, DEFAULT_FARGATE_MEMORY_MIB,
    DEFAULT_HEALTH_CHECK_GRACE_PERIOD_SECS,
};
use stratus_common::error::{Result, StratusError};
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, NodeKind, Resource};

use super::ec2::{SecurityGroup, SubnetType, Vpc, VpcProps};
use super::elbv2::{TargetGroup, TargetType};
use super::iam::{ECS_TASKS_PRINCIPAL, Role};
use super::logs::{LogGroup, LogGroupProps};
use super::{add_construct, fragment_mut, primary_resource, set_property};

const DEFAULT_MIN_HEALTHY_PERCENT: u32 = 50;
const DEFAULT_MAX_HEALTHY_PERCENT: u32 = 200;
const LOAD_BALANCERS_ID: &str = "LoadBalancerTargets";
const EXECUTION_ROLE_ARN: &str = "ExecutionRoleArn";

/// An ECS cluster and the VPC its tasks run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ECS::Cluster` resource.
    pub resource: NodeId,
    /// VPC of the cluster.
    pub vpc: Vpc,
}

impl Cluster {
    /// Creates a cluster. Without a VPC, a default one is created below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken.
    pub fn new(tree: &mut ConstructTree, scope: NodeId, id: &str, vpc: Option<Vpc>) -> Result<Self> {
        let (node, resource) = add_construct(tree, scope, id, Resource::new("AWS::ECS::Cluster"))?;
        let vpc = match vpc {
            Some(vpc) => vpc,
            None => Vpc::new(tree, node, "Vpc", &VpcProps::default())?,
        };
        Ok(Self { node, resource, vpc })
    }

    /// Cluster name.
    #[must_use]
    pub const fn cluster_name(&self) -> Value {
        Value::Ref(self.resource)
    }

    /// Cluster ARN.
    #[must_use]
    pub fn arn(&self) -> Value {
        Value::get_att(self.resource, "Arn")
    }
}

/// Returns the shared cluster of `scope`'s stack, creating it on first use.
///
/// One shared cluster exists per VPC; its id is the fixed default cluster id
/// followed by the VPC's construct id.
///
/// # Errors
///
/// Returns an error if `scope` is not inside a stack.
pub fn get_or_create_cluster(tree: &mut ConstructTree, scope: NodeId, vpc: Option<&Vpc>) -> Result<Cluster> {
    let stack = tree
        .stack_of(scope)
        .ok_or_else(|| tree.error(scope, "a cluster can only be created inside a stack"))?;
    let id = format!("{DEFAULT_CLUSTER_ID}{}", vpc.map_or("", |v| tree.id(v.node)));

    if let Some(node) = tree.find_child(stack, &id) {
        tracing::debug!(cluster = %id, "reusing shared cluster");
        let resource = primary_resource(tree, node)?;
        let vpc = match vpc {
            Some(vpc) => vpc.clone(),
            None => {
                let vpc_node = tree.find_child(node, "Vpc").ok_or_else(|| StratusError::NotFound {
                    kind: "vpc",
                    id: format!("{}/Vpc", tree.path(node)),
                })?;
                Vpc::from_node(tree, vpc_node)?
            }
        };
        return Ok(Cluster { node, resource, vpc });
    }

    tracing::debug!(cluster = %id, "creating shared cluster");
    Cluster::new(tree, stack, &id, vpc.cloned())
}

/// Launch types a task definition supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// EC2 container instances.
    #[default]
    Ec2,
    /// Fargate.
    Fargate,
    /// Either.
    Ec2AndFargate,
}

impl Compatibility {
    const fn supports(self, launch_type: LaunchType) -> bool {
        matches!(
            (self, launch_type),
            (Self::Ec2 | Self::Ec2AndFargate, LaunchType::Ec2)
                | (Self::Fargate | Self::Ec2AndFargate, LaunchType::Fargate)
        )
    }

    fn requires(self) -> Value {
        match self {
            Self::Ec2 => Value::list(["EC2"]),
            Self::Fargate => Value::list(["FARGATE"]),
            Self::Ec2AndFargate => Value::list(["EC2", "FARGATE"]),
        }
    }
}

/// Task networking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// Docker bridge with dynamic host ports.
    Bridge,
    /// Host networking.
    Host,
    /// One elastic network interface per task.
    AwsVpc,
    /// No networking.
    None,
}

impl NetworkMode {
    /// Template representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Host => "host",
            Self::AwsVpc => "awsvpc",
            Self::None => "none",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a service's tasks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchType {
    /// EC2 container instances.
    Ec2,
    /// Fargate.
    Fargate,
}

impl LaunchType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ec2 => "EC2",
            Self::Fargate => "FARGATE",
        }
    }
}

/// Options for [`TaskDefinition::new`].
#[derive(Debug, Clone, Default)]
pub struct TaskDefinitionProps {
    /// Supported launch types.
    pub compatibility: Compatibility,
    /// Task CPU units. Fargate defaults to 256.
    pub cpu: Option<u32>,
    /// Task memory in MiB. Fargate defaults to 512.
    pub memory_mib: Option<u32>,
    /// Networking. Fargate requires (and defaults to) awsvpc; EC2 defaults to bridge.
    pub network_mode: Option<NetworkMode>,
    /// Family name. Derived from the construct path when absent.
    pub family: Option<String>,
    /// Role assumed by the containers. Created when absent.
    pub task_role: Option<Role>,
    /// Role used by the agent to pull images and write logs. Created on demand.
    pub execution_role: Option<Role>,
}

/// A task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefinition {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ECS::TaskDefinition` resource.
    pub resource: NodeId,
    /// Supported launch types.
    pub compatibility: Compatibility,
    /// Task networking.
    pub network_mode: NetworkMode,
    /// Role assumed by the containers.
    pub task_role: Role,
}

impl TaskDefinition {
    /// Creates a task definition.
    ///
    /// # Errors
    ///
    /// Returns an error if a Fargate-compatible definition asks for a
    /// network mode other than awsvpc.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        props: TaskDefinitionProps,
    ) -> Result<Self> {
        let fargate = props.compatibility.supports(LaunchType::Fargate);
        let (cpu, memory) = if fargate {
            (
                Some(props.cpu.unwrap_or(DEFAULT_FARGATE_CPU)),
                Some(props.memory_mib.unwrap_or(DEFAULT_FARGATE_MEMORY_MIB)),
            )
        } else {
            (props.cpu, props.memory_mib)
        };

        let node = tree.add_scope(scope, id)?;
        let network_mode = match props.network_mode {
            Some(mode) if fargate && mode != NetworkMode::AwsVpc => {
                return Err(tree.error(
                    node,
                    format!("Fargate tasks can only have AwsVpc network mode, got: {mode}"),
                ));
            }
            Some(mode) => mode,
            None if fargate => NetworkMode::AwsVpc,
            None => NetworkMode::Bridge,
        };

        let family = props.family.unwrap_or_else(|| {
            tree.path(node)
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect()
        });
        let containers = Value::lazy(move |tree| {
            Value::List(
                tree.children(node)
                    .iter()
                    .filter_map(|&child| tree.fragment(child).cloned())
                    .collect(),
            )
        });
        let resource = tree.add_resource(
            node,
            super::PRIMARY_RESOURCE_ID,
            Resource::new("AWS::ECS::TaskDefinition")
                .with_property("Family", family)
                .with_property("NetworkMode", network_mode.as_str())
                .with_property("RequiresCompatibilities", props.compatibility.requires())
                .with_property("Cpu", cpu.map(|c| c.to_string()))
                .with_property("Memory", memory.map(|m| m.to_string()))
                .with_property("ContainerDefinitions", containers),
        )?;

        let task_role = match props.task_role {
            Some(role) => role,
            None => Role::new(tree, node, "TaskRole", ECS_TASKS_PRINCIPAL)?,
        };
        set_property(tree, resource, "TaskRoleArn", task_role.arn())?;
        if let Some(role) = props.execution_role {
            set_property(tree, resource, EXECUTION_ROLE_ARN, role.arn())?;
        }

        tree.add_validator(node, |tree, node| {
            let containers = containers_of(tree, node);
            if containers.iter().any(|c| c.is_essential(tree)) {
                Vec::new()
            } else {
                vec!["ECS task definition must have at least one essential container".to_string()]
            }
        });
        if props.compatibility.supports(LaunchType::Ec2) {
            tree.add_validator(node, |tree, node| {
                containers_of(tree, node)
                    .into_iter()
                    .filter_map(|c| tree.fragment(c.node))
                    .filter(|def| def.get("Memory").is_none() && def.get("MemoryReservation").is_none())
                    .map(|def| {
                        let name = def.get("Name").and_then(Value::as_str).unwrap_or_default();
                        format!(
                            "ECS Container {name} must have at least one of 'memoryLimitMiB' or 'memoryReservationMiB' specified"
                        )
                    })
                    .collect()
            });
        }

        tracing::debug!(path = %tree.path(node), %network_mode, "created task definition");
        Ok(Self {
            node,
            resource,
            compatibility: props.compatibility,
            network_mode,
            task_role,
        })
    }

    /// Adds a container named after `id`, unless options name it otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is empty, the memory limit is below the
    /// reservation, or the id is taken.
    pub fn add_container(
        &self,
        tree: &mut ConstructTree,
        id: &str,
        options: ContainerOptions,
    ) -> Result<ContainerDefinition> {
        let node = tree.add_fragment(self.node, id, Value::Null)?;
        if options.image.is_empty() {
            return Err(tree.error(node, "container image must not be empty"));
        }
        if let (Some(limit), Some(reservation)) =
            (options.memory_limit_mib, options.memory_reservation_mib)
        {
            if limit < reservation {
                return Err(tree.error(
                    node,
                    format!(
                        "Memory limit ({limit} MiB) must be greater than or equal to memory reservation ({reservation} MiB)"
                    ),
                ));
            }
        }

        let name = options.container_name.clone().unwrap_or_else(|| id.to_string());
        let log_configuration = match &options.logging {
            Some(driver) => Some(driver.bind(tree, self, id)?),
            None => None,
        };
        if !options.secrets.is_empty() {
            self.ensure_execution_role(tree)?;
        }

        let mut definition: BTreeMap<String, Value> = BTreeMap::new();
        let mut put = |key: &str, value: Value| {
            if !value.is_null() {
                let _ = definition.insert(key.to_string(), value);
            }
        };
        put("Name", name.clone().into());
        put("Image", options.image.into());
        put("Essential", options.essential.unwrap_or(true).into());
        put("Memory", options.memory_limit_mib.into());
        put("MemoryReservation", options.memory_reservation_mib.into());
        put("Cpu", options.cpu.into());
        put("Environment", name_value_list(&options.environment, "Value"));
        put("Secrets", name_value_list(&options.secrets, "ValueFrom"));
        put("Command", string_list(&options.command));
        put("EntryPoint", string_list(&options.entry_point));
        put(
            "DockerLabels",
            if options.docker_labels.is_empty() {
                Value::Null
            } else {
                Value::Map(
                    options
                        .docker_labels
                        .into_iter()
                        .map(|(k, v)| (k, Value::from(v)))
                        .collect(),
                )
            },
        );
        put("LogConfiguration", log_configuration.into());
        put("PortMappings", Value::List(Vec::new()));
        *fragment_mut(tree, node)? = Value::Map(definition);

        tracing::debug!(container = %name, path = %tree.path(node), "added container");
        Ok(ContainerDefinition {
            node,
            network_mode: self.network_mode,
        })
    }

    /// Containers in insertion order.
    #[must_use]
    pub fn containers(&self, tree: &ConstructTree) -> Vec<ContainerDefinition> {
        containers_of(tree, self.node)
    }

    /// First essential container.
    #[must_use]
    pub fn default_container(&self, tree: &ConstructTree) -> Option<ContainerDefinition> {
        self.containers(tree).into_iter().find(|c| c.is_essential(tree))
    }

    /// Finds a container by name.
    #[must_use]
    pub fn find_container(&self, tree: &ConstructTree, name: &str) -> Option<ContainerDefinition> {
        self.containers(tree)
            .into_iter()
            .find(|c| c.name(tree).as_deref() == Some(name))
    }

    /// Creates the execution role unless one is already set.
    ///
    /// # Errors
    ///
    /// Returns an error if the task definition resource is missing.
    pub fn ensure_execution_role(&self, tree: &mut ConstructTree) -> Result<()> {
        let present = tree
            .resource(self.resource)
            .is_some_and(|r| r.property(EXECUTION_ROLE_ARN).is_some());
        if present {
            return Ok(());
        }
        let role = Role::new(tree, self.node, "ExecutionRole", ECS_TASKS_PRINCIPAL)?;
        set_property(tree, self.resource, EXECUTION_ROLE_ARN, role.arn())
    }
}

fn containers_of(tree: &ConstructTree, task_definition: NodeId) -> Vec<ContainerDefinition> {
    let network_mode = tree
        .find_child(task_definition, super::PRIMARY_RESOURCE_ID)
        .and_then(|r| tree.resource(r))
        .and_then(|r| r.property("NetworkMode"))
        .and_then(Value::as_str)
        .map_or(NetworkMode::Bridge, |mode| match mode {
            "awsvpc" => NetworkMode::AwsVpc,
            "host" => NetworkMode::Host,
            "none" => NetworkMode::None,
            _ => NetworkMode::Bridge,
        });
    tree.children(task_definition)
        .iter()
        .filter(|&&child| matches!(tree.kind(child), NodeKind::Fragment(_)))
        .map(|&node| ContainerDefinition { node, network_mode })
        .collect()
}

fn name_value_list(entries: &BTreeMap<String, String>, value_key: &str) -> Value {
    if entries.is_empty() {
        return Value::Null;
    }
    Value::List(
        entries
            .iter()
            .map(|(name, value)| Value::object([("Name", Value::from(name)), (value_key, value.into())]))
            .collect(),
    )
}

fn string_list(items: &[String]) -> Value {
    if items.is_empty() { Value::Null } else { Value::list(items) }
}

/// Options for [`TaskDefinition::add_container`].
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Image reference.
    pub image: String,
    /// Container name. Defaults to the construct id.
    pub container_name: Option<String>,
    /// Hard memory limit in MiB.
    pub memory_limit_mib: Option<u32>,
    /// Soft memory limit in MiB.
    pub memory_reservation_mib: Option<u32>,
    /// CPU units.
    pub cpu: Option<u32>,
    /// Whether the task stops when this container stops. Defaults to `true`.
    pub essential: Option<bool>,
    /// Plain environment variables.
    pub environment: BTreeMap<String, String>,
    /// Environment variables read from secrets, by secret ARN.
    pub secrets: BTreeMap<String, String>,
    /// Command override.
    pub command: Vec<String>,
    /// Entry point override.
    pub entry_point: Vec<String>,
    /// Docker labels.
    pub docker_labels: BTreeMap<String, String>,
    /// Log shipping.
    pub logging: Option<AwsLogDriver>,
}

impl ContainerOptions {
    /// Options for `image` with everything else defaulted.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }
}

/// Ships container output to a CloudWatch log group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsLogDriver {
    /// Prefix of every log stream.
    pub stream_prefix: String,
    /// Retention of the generated log group.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

impl AwsLogDriver {
    /// Driver writing streams under `stream_prefix`.
    pub fn new(stream_prefix: impl Into<String>) -> Self {
        Self {
            stream_prefix: stream_prefix.into(),
            retention_days: None,
        }
    }

    /// Creates the retained log group and the execution role, and returns
    /// the container's log configuration.
    fn bind(&self, tree: &mut ConstructTree, task_definition: &TaskDefinition, container_id: &str) -> Result<Value> {
        let group = LogGroup::new(
            tree,
            task_definition.node,
            &format!("{container_id}LogGroup"),
            LogGroupProps {
                retention_days: self.retention_days,
                ..LogGroupProps::default()
            },
        )?;
        task_definition.ensure_execution_role(tree)?;
        let region = tree.environment_of(task_definition.node).region.clone();
        Ok(Value::object([
            ("LogDriver", Value::from("awslogs")),
            (
                "Options",
                Value::object([
                    ("awslogs-group", group.log_group_name()),
                    ("awslogs-stream-prefix", self.stream_prefix.as_str().into()),
                    ("awslogs-region", region.into()),
                ]),
            ),
        ]))
    }
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortProtocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl PortProtocol {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// A container port exposed to the task network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host. Dynamic (0) in bridge mode when absent.
    pub host_port: Option<u16>,
    /// Transport protocol.
    pub protocol: PortProtocol,
}

impl PortMapping {
    /// TCP mapping of `container_port`.
    #[must_use]
    pub const fn tcp(container_port: u16) -> Self {
        Self {
            container_port,
            host_port: None,
            protocol: PortProtocol::Tcp,
        }
    }
}

/// Handle to a container of a task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerDefinition {
    /// Fragment node holding the definition.
    pub node: NodeId,
    network_mode: NetworkMode,
}

impl ContainerDefinition {
    /// Container name.
    #[must_use]
    pub fn name(&self, tree: &ConstructTree) -> Option<String> {
        tree.fragment(self.node)
            .and_then(|def| def.get("Name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Whether the container is essential.
    #[must_use]
    pub fn is_essential(&self, tree: &ConstructTree) -> bool {
        matches!(
            tree.fragment(self.node).and_then(|def| def.get("Essential")),
            Some(Value::Bool(true))
        )
    }

    /// Container ports already mapped, in insertion order.
    #[must_use]
    pub fn container_ports(&self, tree: &ConstructTree) -> Vec<u16> {
        tree.fragment(self.node)
            .and_then(|def| def.get("PortMappings"))
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(|m| m.get("ContainerPort").and_then(Value::as_u64))
            .filter_map(|p| u16::try_from(p).ok())
            .collect()
    }

    /// Whether `port` is mapped.
    #[must_use]
    pub fn has_port_mapping(&self, tree: &ConstructTree, port: u16) -> bool {
        self.container_ports(tree).contains(&port)
    }

    /// Adds port mappings.
    ///
    /// Under awsvpc the host port must be absent or equal to the container
    /// port; it is filled in with the container port. Bridge mode defaults
    /// to a dynamic host port.
    ///
    /// # Errors
    ///
    /// Returns an error if an awsvpc mapping names a different host port.
    pub fn add_port_mappings(&self, tree: &mut ConstructTree, mappings: &[PortMapping]) -> Result<()> {
        let mut rendered = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let host_port = match self.network_mode {
                NetworkMode::AwsVpc | NetworkMode::Host => match mapping.host_port {
                    Some(host) if host != mapping.container_port => {
                        return Err(tree.error(
                            self.node,
                            format!(
                                "Host port ({host}) must be left out or equal to container port {} for network mode {}",
                                mapping.container_port, self.network_mode
                            ),
                        ));
                    }
                    _ => mapping.container_port,
                },
                _ => mapping.host_port.unwrap_or(0),
            };
            rendered.push(Value::object([
                ("ContainerPort", Value::from(mapping.container_port)),
                ("HostPort", host_port.into()),
                ("Protocol", mapping.protocol.as_str().into()),
            ]));
        }

        let definition = fragment_mut(tree, self.node)?;
        let Some(map) = definition.as_map_mut() else {
            return Err(StratusError::NotFound {
                kind: "container definition",
                id: format!("{:?}", self.node),
            });
        };
        match map.get_mut("PortMappings").and_then(Value::as_list_mut) {
            Some(list) => list.extend(rendered),
            None => {
                let _ = map.insert("PortMappings".to_string(), Value::List(rendered));
            }
        }
        Ok(())
    }
}

/// Deployment circuit breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    /// Roll back to the last healthy deployment on failure.
    #[serde(default)]
    pub rollback: bool,
}

/// Where service tags are copied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagateTags {
    /// From the service.
    Service,
    /// From the task definition.
    TaskDefinition,
}

impl PropagateTags {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "SERVICE",
            Self::TaskDefinition => "TASK_DEFINITION",
        }
    }
}

/// Options shared by EC2 and Fargate services.
#[derive(Debug, Clone)]
pub struct BaseServiceOptions {
    /// Cluster to run in.
    pub cluster: Cluster,
    /// Task to run.
    pub task_definition: TaskDefinition,
    /// Number of tasks. Defaults to 1.
    pub desired_count: Option<u32>,
    /// Explicit service name.
    pub service_name: Option<String>,
    /// Lower bound of running tasks during a deployment, in percent.
    pub min_healthy_percent: Option<u32>,
    /// Upper bound of running tasks during a deployment, in percent.
    pub max_healthy_percent: Option<u32>,
    /// Seconds to ignore failing load balancer health checks after start.
    pub health_check_grace_period_secs: Option<u32>,
    /// Deployment circuit breaker.
    pub circuit_breaker: Option<CircuitBreaker>,
    /// Let ECS tag tasks with cluster and service names.
    pub enable_ecs_managed_tags: bool,
    /// Tag propagation to tasks.
    pub propagate_tags: Option<PropagateTags>,
    /// Security groups for awsvpc tasks. One is generated when empty.
    pub security_groups: Vec<SecurityGroup>,
    /// Subnet tier for awsvpc tasks.
    pub vpc_subnets: Option<SubnetType>,
}

impl BaseServiceOptions {
    /// Options with everything but the cluster and task defaulted.
    #[must_use]
    pub const fn new(cluster: Cluster, task_definition: TaskDefinition) -> Self {
        Self {
            cluster,
            task_definition,
            desired_count: None,
            service_name: None,
            min_healthy_percent: None,
            max_healthy_percent: None,
            health_check_grace_period_secs: None,
            circuit_breaker: None,
            enable_ecs_managed_tags: false,
            propagate_tags: None,
            security_groups: Vec::new(),
            vpc_subnets: None,
        }
    }
}

/// An ECS service of either launch type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseService {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::ECS::Service` resource.
    pub resource: NodeId,
    /// Task the service runs.
    pub task_definition: TaskDefinition,
    /// Security group of awsvpc tasks, if one was generated.
    pub security_group: Option<SecurityGroup>,
    load_balancers: NodeId,
}

impl BaseService {
    fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        options: BaseServiceOptions,
        launch_type: LaunchType,
        assign_public_ip: bool,
        platform_version: Option<String>,
    ) -> Result<Self> {
        let node = tree.add_scope(scope, id)?;
        let desired_count = options.desired_count.unwrap_or(1);
        if desired_count < 1 {
            return Err(tree.error(node, "You must specify a desiredCount greater than 0"));
        }
        let min_healthy = options.min_healthy_percent.unwrap_or(DEFAULT_MIN_HEALTHY_PERCENT);
        let max_healthy = options.max_healthy_percent.unwrap_or(DEFAULT_MAX_HEALTHY_PERCENT);
        if min_healthy >= max_healthy {
            return Err(tree.error(
                node,
                format!(
                    "Minimum healthy percent ({min_healthy}) must be less than maximum healthy percent ({max_healthy})"
                ),
            ));
        }
        let task_definition = options.task_definition;
        if !task_definition.compatibility.supports(launch_type) {
            let target = match launch_type {
                LaunchType::Ec2 => "EC2",
                LaunchType::Fargate => "Fargate",
            };
            return Err(tree.error(
                node,
                format!("Supplied TaskDefinition is not configured for compatibility with {target}"),
            ));
        }

        let mut security_group = None;
        let network_configuration = if task_definition.network_mode == NetworkMode::AwsVpc {
            let mut groups = options.security_groups.clone();
            if groups.is_empty() {
                let description = format!("{} security group", tree.path(node));
                let generated =
                    SecurityGroup::new(tree, node, "SecurityGroup", &options.cluster.vpc, &description, true)?;
                security_group = Some(generated);
                groups.push(generated);
            }
            let subnets = options.vpc_subnets.unwrap_or(if assign_public_ip {
                SubnetType::Public
            } else {
                SubnetType::Private
            });
            Value::object([(
                "AwsvpcConfiguration",
                Value::object([
                    (
                        "AssignPublicIp",
                        Value::from(if assign_public_ip { "ENABLED" } else { "DISABLED" }),
                    ),
                    (
                        "SecurityGroups",
                        Value::List(groups.iter().map(SecurityGroup::group_id).collect()),
                    ),
                    ("Subnets", Value::List(options.cluster.vpc.select_subnets(subnets))),
                ]),
            )])
        } else {
            if assign_public_ip {
                return Err(tree.error(node, "assignPublicIp requires the awsvpc network mode"));
            }
            Value::Null
        };

        let load_balancers = tree.add_fragment(node, LOAD_BALANCERS_ID, Value::List(Vec::new()))?;
        let grace_period = options.health_check_grace_period_secs;
        let mut deployment = BTreeMap::new();
        let _ = deployment.insert("MaximumPercent".to_string(), Value::from(max_healthy));
        let _ = deployment.insert("MinimumHealthyPercent".to_string(), Value::from(min_healthy));
        if let Some(breaker) = options.circuit_breaker {
            let _ = deployment.insert(
                "DeploymentCircuitBreaker".to_string(),
                Value::object([("Enable", Value::from(true)), ("Rollback", breaker.rollback.into())]),
            );
        }

        let resource = tree.add_resource(
            node,
            super::PRIMARY_RESOURCE_ID,
            Resource::new("AWS::ECS::Service")
                .with_property("Cluster", options.cluster.cluster_name())
                .with_property("TaskDefinition", Value::Ref(task_definition.resource))
                .with_property("DesiredCount", desired_count)
                .with_property("LaunchType", launch_type.as_str())
                .with_property("SchedulingStrategy", "REPLICA")
                .with_property("ServiceName", options.service_name)
                .with_property("DeploymentConfiguration", Value::Map(deployment))
                .with_property("EnableECSManagedTags", options.enable_ecs_managed_tags.then_some(true))
                .with_property("PropagateTags", options.propagate_tags.map(PropagateTags::as_str))
                .with_property("NetworkConfiguration", network_configuration)
                .with_property("PlatformVersion", platform_version)
                .with_property(
                    "HealthCheckGracePeriodSeconds",
                    Value::lazy(move |tree| match grace_period {
                        Some(secs) => Value::from(secs),
                        None if has_load_balancers(tree, load_balancers) => {
                            Value::from(DEFAULT_HEALTH_CHECK_GRACE_PERIOD_SECS)
                        }
                        None => Value::Null,
                    }),
                )
                .with_property(
                    "LoadBalancers",
                    Value::lazy(move |tree| {
                        if has_load_balancers(tree, load_balancers) {
                            tree.fragment(load_balancers).cloned().unwrap_or_default()
                        } else {
                            Value::Null
                        }
                    }),
                ),
        )?;

        tracing::debug!(path = %tree.path(node), launch_type = launch_type.as_str(), desired_count, "created service");
        Ok(Self {
            node,
            resource,
            task_definition,
            security_group,
            load_balancers,
        })
    }

    /// Registers a container port of this service with `target_group`.
    ///
    /// Sets the group's target type from the task's network mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist, does not map the
    /// port, or the target group already holds targets of another type.
    pub fn attach_to_target_group(
        &self,
        tree: &mut ConstructTree,
        target_group: &impl TargetGroup,
        container_name: &str,
        container_port: u16,
    ) -> Result<()> {
        let container = self
            .task_definition
            .find_container(tree, container_name)
            .ok_or_else(|| {
                tree.error(
                    self.node,
                    format!("No container named '{container_name}'. Did you call \"addContainer()\"?"),
                )
            })?;
        if !container.has_port_mapping(tree, container_port) {
            return Err(tree.error(
                self.node,
                format!(
                    "Container '{container_name}' has no mapping for port {container_port} and protocol tcp. Did you call \"container.addPortMappings()\"?"
                ),
            ));
        }

        let target_type = if self.task_definition.network_mode == NetworkMode::AwsVpc {
            TargetType::Ip
        } else {
            TargetType::Instance
        };
        target_group.set_target_type(tree, target_type)?;

        let entry = Value::object([
            ("ContainerName", Value::from(container_name)),
            ("ContainerPort", container_port.into()),
            ("TargetGroupArn", target_group.arn()),
        ]);
        if let Some(list) = fragment_mut(tree, self.load_balancers)?.as_list_mut() {
            list.push(entry);
        }
        tracing::debug!(container = container_name, port = container_port, "attached service to target group");
        Ok(())
    }
}

fn has_load_balancers(tree: &ConstructTree, fragment: NodeId) -> bool {
    tree.fragment(fragment)
        .and_then(Value::as_list)
        .is_some_and(|list| !list.is_empty())
}

/// A service on EC2 container instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ec2Service(BaseService);

impl Ec2Service {
    /// Creates the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the desired count is zero, the healthy percent
    /// bounds are inverted, or the task is not EC2 compatible.
    pub fn new(tree: &mut ConstructTree, scope: NodeId, id: &str, options: BaseServiceOptions) -> Result<Self> {
        BaseService::new(tree, scope, id, options, LaunchType::Ec2, false, None).map(Self)
    }
}

impl std::ops::Deref for Ec2Service {
    type Target = BaseService;

    fn deref(&self) -> &BaseService {
        &self.0
    }
}

/// Options for [`FargateService::new`].
#[derive(Debug, Clone)]
pub struct FargateServiceProps {
    /// Shared service options.
    pub base: BaseServiceOptions,
    /// Give each task a public IP (and default to public subnets).
    pub assign_public_ip: bool,
    /// Fargate platform version.
    pub platform_version: Option<String>,
}

/// A service on Fargate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FargateService(BaseService);

impl FargateService {
    /// Creates the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the desired count is zero, the healthy percent
    /// bounds are inverted, or the task is not Fargate compatible.
    pub fn new(tree: &mut ConstructTree, scope: NodeId, id: &str, props: FargateServiceProps) -> Result<Self> {
        BaseService::new(
            tree,
            scope,
            id,
            props.base,
            LaunchType::Fargate,
            props.assign_public_ip,
            props.platform_version,
        )
        .map(Self)
    }
}

impl std::ops::Deref for FargateService {
    type Target = BaseService;

    fn deref(&self) -> &BaseService {
        &self.0
    }
}
