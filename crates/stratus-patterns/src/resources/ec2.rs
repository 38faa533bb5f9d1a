//! VPCs, subnets, and security groups.

use stratus_common::constants::{DEFAULT_MAX_AZS, DEFAULT_VPC_CIDR};
use stratus_common::error::{Result, StratusError};
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

use super::{add_construct, primary_resource, push_property};

/// Smallest subnet carved from a VPC block.
const MAX_SUBNET_PREFIX: u32 = 28;

const PUBLIC_SUBNET_PREFIX: &str = "PublicSubnet";
const PRIVATE_SUBNET_PREFIX: &str = "PrivateSubnet";
const SUBNET_ID: &str = "Subnet";
const ANY_IPV4: &str = "0.0.0.0/0";

/// Options for [`Vpc::new`].
#[derive(Debug, Clone)]
pub struct VpcProps {
    /// Address block of the VPC.
    pub cidr: String,
    /// Number of availability zones to spread subnets over.
    pub max_azs: usize,
}

impl Default for VpcProps {
    fn default() -> Self {
        Self {
            cidr: DEFAULT_VPC_CIDR.to_string(),
            max_azs: DEFAULT_MAX_AZS,
        }
    }
}

/// Subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetType {
    /// Routed through the internet gateway.
    Public,
    /// Routed through a NAT gateway.
    Private,
}

/// A VPC with one public and one private subnet per availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::EC2::VPC` resource.
    pub resource: NodeId,
    public_subnets: Vec<NodeId>,
    private_subnets: Vec<NodeId>,
}

impl Vpc {
    /// Creates a VPC, its internet gateway, and its subnets.
    ///
    /// # Errors
    ///
    /// Returns a config error if the CIDR block is malformed or too small to
    /// split across the requested zones.
    pub fn new(tree: &mut ConstructTree, scope: NodeId, id: &str, props: &VpcProps) -> Result<Self> {
        let (base, prefix) = parse_cidr(&props.cidr).ok_or_else(|| StratusError::Config {
            message: format!("invalid VPC CIDR block \"{}\"", props.cidr),
        })?;
        if props.max_azs == 0 {
            return Err(StratusError::Config {
                message: "a VPC needs at least one availability zone".to_string(),
            });
        }
        let zones = tree.environment_of(scope).availability_zones(props.max_azs);
        let blocks = carve(base, prefix, zones.len() * 2).ok_or_else(|| StratusError::Config {
            message: format!(
                "VPC CIDR block {} is too small for {} subnets",
                props.cidr,
                zones.len() * 2
            ),
        })?;
        tracing::debug!(cidr = %props.cidr, zones = zones.len(), "creating vpc");

        let (node, resource) = add_construct(
            tree,
            scope,
            id,
            Resource::new("AWS::EC2::VPC")
                .with_property("CidrBlock", props.cidr.as_str())
                .with_property("EnableDnsHostnames", true)
                .with_property("EnableDnsSupport", true),
        )?;
        let igw = tree.add_resource(node, "IGW", Resource::new("AWS::EC2::InternetGateway"))?;
        let attachment = tree.add_resource(
            node,
            "VPCGW",
            Resource::new("AWS::EC2::VPCGatewayAttachment")
                .with_property("VpcId", Value::Ref(resource))
                .with_property("InternetGatewayId", Value::Ref(igw)),
        )?;

        let mut public_subnets = Vec::with_capacity(zones.len());
        let mut nat_gateways = Vec::with_capacity(zones.len());
        for (index, zone) in zones.iter().enumerate() {
            let id = format!("{PUBLIC_SUBNET_PREFIX}{}", index + 1);
            let (scope, subnet, table) = add_subnet(tree, node, resource, &id, &blocks[index], zone, true)?;
            let route = tree.add_resource(
                scope,
                "DefaultRoute",
                route(table).with_property("GatewayId", Value::Ref(igw)),
            )?;
            tree.add_dependency(route, attachment);
            let eip = tree.add_resource(
                scope,
                "EIP",
                Resource::new("AWS::EC2::EIP").with_property("Domain", "vpc"),
            )?;
            let nat = tree.add_resource(
                scope,
                "NATGateway",
                Resource::new("AWS::EC2::NatGateway")
                    .with_property("SubnetId", Value::Ref(subnet))
                    .with_property("AllocationId", Value::get_att(eip, "AllocationId")),
            )?;
            public_subnets.push(subnet);
            nat_gateways.push(nat);
        }

        let mut private_subnets = Vec::with_capacity(zones.len());
        for (index, zone) in zones.iter().enumerate() {
            let id = format!("{PRIVATE_SUBNET_PREFIX}{}", index + 1);
            let block = &blocks[zones.len() + index];
            let (scope, subnet, table) = add_subnet(tree, node, resource, &id, block, zone, false)?;
            let _ = tree.add_resource(
                scope,
                "DefaultRoute",
                route(table).with_property("NatGatewayId", Value::Ref(nat_gateways[index])),
            )?;
            private_subnets.push(subnet);
        }

        Ok(Self {
            node,
            resource,
            public_subnets,
            private_subnets,
        })
    }

    /// Rebuilds a handle from a VPC construct created by [`Vpc::new`].
    ///
    /// # Errors
    ///
    /// Returns an error if `node` is not such a construct.
    pub fn from_node(tree: &ConstructTree, node: NodeId) -> Result<Self> {
        let resource = primary_resource(tree, node)?;
        let subnets = |prefix: &str| -> Vec<NodeId> {
            tree.children(node)
                .iter()
                .filter(|&&child| tree.id(child).starts_with(prefix))
                .filter_map(|&child| tree.find_child(child, SUBNET_ID))
                .collect()
        };
        Ok(Self {
            node,
            resource,
            public_subnets: subnets(PUBLIC_SUBNET_PREFIX),
            private_subnets: subnets(PRIVATE_SUBNET_PREFIX),
        })
    }

    /// VPC id.
    #[must_use]
    pub const fn vpc_id(&self) -> Value {
        Value::Ref(self.resource)
    }

    /// Subnet ids of one tier.
    #[must_use]
    pub fn select_subnets(&self, subnet_type: SubnetType) -> Vec<Value> {
        let subnets = match subnet_type {
            SubnetType::Public => &self.public_subnets,
            SubnetType::Private => &self.private_subnets,
        };
        subnets.iter().map(|&s| Value::Ref(s)).collect()
    }
}

fn add_subnet(
    tree: &mut ConstructTree,
    vpc_node: NodeId,
    vpc: NodeId,
    id: &str,
    cidr: &str,
    zone: &str,
    public: bool,
) -> Result<(NodeId, NodeId, NodeId)> {
    let scope = tree.add_scope(vpc_node, id)?;
    let subnet = tree.add_resource(
        scope,
        SUBNET_ID,
        Resource::new("AWS::EC2::Subnet")
            .with_property("VpcId", Value::Ref(vpc))
            .with_property("CidrBlock", cidr)
            .with_property("AvailabilityZone", zone)
            .with_property("MapPublicIpOnLaunch", public),
    )?;
    let table = tree.add_resource(
        scope,
        "RouteTable",
        Resource::new("AWS::EC2::RouteTable").with_property("VpcId", Value::Ref(vpc)),
    )?;
    let _ = tree.add_resource(
        scope,
        "RouteTableAssociation",
        Resource::new("AWS::EC2::SubnetRouteTableAssociation")
            .with_property("RouteTableId", Value::Ref(table))
            .with_property("SubnetId", Value::Ref(subnet)),
    )?;
    Ok((scope, subnet, table))
}

fn route(table: NodeId) -> Resource {
    Resource::new("AWS::EC2::Route")
        .with_property("RouteTableId", Value::Ref(table))
        .with_property("DestinationCidrBlock", ANY_IPV4)
}

/// Parses `a.b.c.d/n` into its network address and prefix length.
///
/// Host bits must be zero.
fn parse_cidr(cidr: &str) -> Option<(u32, u32)> {
    let (address, prefix) = cidr.split_once('/')?;
    let prefix: u32 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    let octets: Vec<u8> = address
        .split('.')
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let [a, b, c, d] = octets.as_slice() else {
        return None;
    };
    let base = u32::from_be_bytes([*a, *b, *c, *d]);
    let host_mask = u32::MAX.checked_shr(prefix).unwrap_or(0);
    (base & host_mask == 0).then_some((base, prefix))
}

/// Splits a block into `count` equal subnets, rounding up to a power of two.
fn carve(base: u32, prefix: u32, count: usize) -> Option<Vec<String>> {
    let bits = count.max(1).next_power_of_two().trailing_zeros();
    let subnet_prefix = prefix + bits;
    if subnet_prefix > MAX_SUBNET_PREFIX {
        return None;
    }
    let size = 1_u32 << (32 - subnet_prefix);
    (0..count)
        .map(|i| {
            let offset = u32::try_from(i).ok()?.checked_mul(size)?;
            let [a, b, c, d] = (base + offset).to_be_bytes();
            Some(format!("{a}.{b}.{c}.{d}/{subnet_prefix}"))
        })
        .collect()
}

/// Source of inbound traffic.
#[derive(Debug, Clone, Copy)]
pub enum Peer {
    /// Any IPv4 address.
    AnyIpv4,
    /// Members of another security group.
    SecurityGroup(SecurityGroup),
}

/// A security group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityGroup {
    /// Construct scope.
    pub node: NodeId,
    /// `AWS::EC2::SecurityGroup` resource.
    pub resource: NodeId,
}

impl SecurityGroup {
    /// Creates a security group in `vpc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        vpc: &Vpc,
        description: &str,
        allow_all_outbound: bool,
    ) -> Result<Self> {
        let mut resource = Resource::new("AWS::EC2::SecurityGroup")
            .with_property("GroupDescription", description)
            .with_property("VpcId", vpc.vpc_id());
        if allow_all_outbound {
            resource.set_property(
                "SecurityGroupEgress",
                Value::List(vec![Value::object([
                    ("CidrIp", Value::from(ANY_IPV4)),
                    ("Description", "Allow all outbound traffic by default".into()),
                    ("IpProtocol", "-1".into()),
                ])]),
            );
        }
        let (node, resource) = add_construct(tree, scope, id, resource)?;
        Ok(Self { node, resource })
    }

    /// Group id.
    #[must_use]
    pub fn group_id(&self) -> Value {
        Value::get_att(self.resource, "GroupId")
    }

    /// Allows TCP traffic on `port` from `peer`.
    ///
    /// Rules from another group are rendered as standalone ingress resources
    /// below this group; adding the same one twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the group resource is missing.
    pub fn add_ingress(
        &self,
        tree: &mut ConstructTree,
        peer: Peer,
        port: u16,
        description: &str,
    ) -> Result<()> {
        match peer {
            Peer::AnyIpv4 => push_property(
                tree,
                self.resource,
                "SecurityGroupIngress",
                Value::object([
                    ("CidrIp", Value::from(ANY_IPV4)),
                    ("Description", description.into()),
                    ("FromPort", port.into()),
                    ("IpProtocol", "tcp".into()),
                    ("ToPort", port.into()),
                ]),
            ),
            Peer::SecurityGroup(source) => {
                let id = format!("from {}:{port}", tree.path(source.node).replace('/', ""));
                if tree.find_child(self.node, &id).is_some() {
                    return Ok(());
                }
                let _ = tree.add_resource(
                    self.node,
                    &id,
                    Resource::new("AWS::EC2::SecurityGroupIngress")
                        .with_property("Description", description)
                        .with_property("FromPort", port)
                        .with_property("GroupId", self.group_id())
                        .with_property("IpProtocol", "tcp")
                        .with_property("SourceSecurityGroupId", source.group_id())
                        .with_property("ToPort", port),
                )?;
                Ok(())
            }
        }
    }
}
