//! # Network Topology Builder
//!
//! Declares the VPC, cluster, security groups and load balancer of one
//! environment and exports the handles services need.

use super::Ipv4Cidr;
use crate::constants::{DEFAULT_SERVICE_PORT, LOAD_BALANCER_IDLE_TIMEOUT_SECS};
use crate::environment::Environment;
use crate::error::{Result, SynthError};
use crate::template::{Expr, LogicalId, Output, Resource, Stack};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Inbound traffic the shared service security group admits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum IngressPolicy {
    /// Every protocol and port from `0.0.0.0/0`
    #[default]
    AllowAllTraffic,
    /// Only the service port, and only from the load balancer
    LoadBalancerOnly,
}

/// Public domain served over HTTPS by the load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    /// Fully qualified name, e.g. `api.example.com`
    pub name: String,
    /// Existing public hosted zone; a new zone for `name` is created when
    /// unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,
}

/// Resources declared for a custom domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainBinding {
    pub name: String,
    /// Set when the zone was created by this stack
    pub hosted_zone: Option<LogicalId>,
    pub certificate: LogicalId,
    pub https_listener: LogicalId,
    pub alias_record: LogicalId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressSource {
    AnyIpv4,
    SecurityGroup(LogicalId),
}

/// One rule of the service security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// `-1` for all protocols
    pub protocol: String,
    pub port_range: Option<(u16, u16)>,
    pub source: IngressSource,
}

impl IngressRule {
    #[must_use]
    pub fn is_all_traffic_from_anywhere(&self) -> bool {
        self.protocol == "-1" && self.port_range.is_none() && self.source == IngressSource::AnyIpv4
    }

    fn to_expr(&self) -> Expr {
        let mut entries = vec![("IpProtocol", Expr::str(&self.protocol))];
        if let Some((from, to)) = self.port_range {
            entries.push(("FromPort", Expr::from(from)));
            entries.push(("ToPort", Expr::from(to)));
        }
        match &self.source {
            IngressSource::AnyIpv4 => {
                entries.push(("CidrIp", Expr::str("0.0.0.0/0")));
                entries.push(("Description", Expr::str(self.describe())));
            }
            IngressSource::SecurityGroup(group) => {
                entries.push(("SourceSecurityGroupId", Expr::get_att(group, "GroupId")));
                entries.push(("Description", Expr::str(self.describe())));
            }
        }
        Expr::object(entries)
    }

    fn describe(&self) -> String {
        let source = match &self.source {
            IngressSource::AnyIpv4 => "0.0.0.0/0".to_string(),
            IngressSource::SecurityGroup(group) => group.to_string(),
        };
        match self.port_range {
            None => format!("from {source}:ALL TRAFFIC"),
            Some((from, to)) if from == to => format!("from {source}:{from}"),
            Some((from, to)) => format!("from {source}:{from}-{to}"),
        }
    }
}

/// CIDR blocks assigned to one availability zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetAllocation {
    pub az_index: u32,
    pub public: Ipv4Cidr,
    pub private: Ipv4Cidr,
}

/// Handles into the network stack
///
/// Consumers live in other stacks, so every handle meant for them is an
/// `Fn::ImportValue` of an export of the network stack. A topology is
/// shared (never copied) by every service of its environment.
#[derive(Debug)]
pub struct NetworkTopology {
    pub environment: Environment,
    pub stack_name: String,
    pub cidr: Ipv4Cidr,
    pub subnets: Vec<SubnetAllocation>,
    pub ingress_policy: IngressPolicy,
    pub ingress_rules: Vec<IngressRule>,
    pub namespace_name: String,
    pub service_port: u16,
    pub domain: Option<DomainBinding>,

    pub vpc: LogicalId,
    pub cluster: LogicalId,
    pub security_group: LogicalId,
    pub load_balancer: LogicalId,
    pub listener: LogicalId,
    pub target_group: LogicalId,

    pub vpc_id: Expr,
    pub cluster_name: Expr,
    pub cluster_arn: Expr,
    pub security_group_id: Expr,
    pub target_group_arn: Expr,
    pub private_subnet_ids: Vec<Expr>,
    pub namespace_id: Expr,
}

impl NetworkTopology {
    /// Whether the service security group admits everything from anywhere
    #[must_use]
    pub fn allows_all_inbound(&self) -> bool {
        self.ingress_rules
            .iter()
            .any(IngressRule::is_all_traffic_from_anywhere)
    }
}

#[derive(Debug, Clone)]
pub struct NetworkTopologyBuilder {
    cidr: Ipv4Cidr,
    az_count: u8,
    environment: Environment,
    ingress_policy: IngressPolicy,
    service_port: u16,
    idle_timeout_secs: u32,
    domain: Option<DomainConfig>,
}

impl NetworkTopologyBuilder {
    pub fn new(cidr: &str, az_count: u8, environment: Environment) -> Result<Self> {
        if az_count < 2 {
            return Err(SynthError::InvalidConfig(format!(
                "an application load balancer needs at least 2 availability zones, got {az_count}"
            )));
        }
        Ok(Self {
            cidr: cidr.parse()?,
            az_count,
            environment,
            ingress_policy: IngressPolicy::default(),
            service_port: DEFAULT_SERVICE_PORT,
            idle_timeout_secs: LOAD_BALANCER_IDLE_TIMEOUT_SECS,
            domain: None,
        })
    }

    #[must_use]
    pub fn ingress_policy(mut self, policy: IngressPolicy) -> Self {
        self.ingress_policy = policy;
        self
    }

    #[must_use]
    pub fn service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    #[must_use]
    pub fn idle_timeout_secs(mut self, secs: u32) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Serve `domain` over HTTPS; plain HTTP then redirects to it
    #[must_use]
    pub fn domain(mut self, domain: Option<DomainConfig>) -> Self {
        self.domain = domain;
        self
    }

    /// Declare the topology in `stack`
    #[allow(clippy::too_many_lines, reason = "one linear declaration of the whole network")]
    pub fn build(self, stack: &mut Stack) -> Result<NetworkTopology> {
        info!(
            stack = %stack.name(),
            environment = %self.environment,
            cidr = %self.cidr,
            az_count = self.az_count,
            "Building network topology"
        );
        let stack_name = stack.name().to_string();
        let subnets = self.allocate_subnets()?;

        let vpc = stack.add(
            &["Vpc"],
            Resource::new("AWS::EC2::VPC")
                .property("CidrBlock", Expr::str(self.cidr.to_string()))
                .property("EnableDnsHostnames", true)
                .property("EnableDnsSupport", true)
                .property("InstanceTenancy", "default")
                .property("Tags", name_tag(&format!("{stack_name}/Vpc"))),
        )?;

        let igw = stack.add(
            &["Vpc", "IGW"],
            Resource::new("AWS::EC2::InternetGateway")
                .property("Tags", name_tag(&format!("{stack_name}/Vpc"))),
        )?;
        let attachment = stack.add(
            &["Vpc", "VPCGW"],
            Resource::new("AWS::EC2::VPCGatewayAttachment")
                .property("VpcId", Expr::reference(&vpc))
                .property("InternetGatewayId", Expr::reference(&igw)),
        )?;

        let mut public_subnets = Vec::with_capacity(subnets.len());
        let mut public_routes = Vec::with_capacity(subnets.len());
        let mut private_subnets = Vec::with_capacity(subnets.len());
        for allocation in &subnets {
            let public_name = format!("PublicSubnet{}", allocation.az_index + 1);
            let (public_subnet, public_route_table) =
                declare_subnet(stack, &vpc, &public_name, allocation.az_index, allocation.public, true)?;
            let public_route = stack.add(
                &["Vpc", &public_name, "DefaultRoute"],
                Resource::new("AWS::EC2::Route")
                    .property("RouteTableId", Expr::reference(&public_route_table))
                    .property("DestinationCidrBlock", "0.0.0.0/0")
                    .property("GatewayId", Expr::reference(&igw))
                    .depends_on(&attachment),
            )?;
            let eip = stack.add(
                &["Vpc", &public_name, "EIP"],
                Resource::new("AWS::EC2::EIP")
                    .property("Domain", "vpc")
                    .property("Tags", name_tag(&format!("{stack_name}/Vpc/{public_name}"))),
            )?;
            let nat = stack.add(
                &["Vpc", &public_name, "NATGateway"],
                Resource::new("AWS::EC2::NatGateway")
                    .property("SubnetId", Expr::reference(&public_subnet))
                    .property("AllocationId", Expr::get_att(&eip, "AllocationId"))
                    .property("Tags", name_tag(&format!("{stack_name}/Vpc/{public_name}")))
                    .depends_on(&public_route),
            )?;

            let private_name = format!("PrivateSubnet{}", allocation.az_index + 1);
            let (private_subnet, private_route_table) =
                declare_subnet(stack, &vpc, &private_name, allocation.az_index, allocation.private, false)?;
            stack.add(
                &["Vpc", &private_name, "DefaultRoute"],
                Resource::new("AWS::EC2::Route")
                    .property("RouteTableId", Expr::reference(&private_route_table))
                    .property("DestinationCidrBlock", "0.0.0.0/0")
                    .property("NatGatewayId", Expr::reference(&nat)),
            )?;

            public_subnets.push(public_subnet);
            public_routes.push(public_route);
            private_subnets.push(private_subnet);
        }

        let cluster = stack.add(
            &["FargateCluster"],
            Resource::new("AWS::ECS::Cluster").property(
                "ClusterSettings",
                Expr::list([Expr::object([
                    ("Name", Expr::str("containerInsights")),
                    ("Value", Expr::str("enabled")),
                ])]),
            ),
        )?;

        let namespace_name = self.environment.namespace();
        let namespace = stack.add(
            &["FargateCluster", "DefaultServiceDiscoveryNamespace"],
            Resource::new("AWS::ServiceDiscovery::PrivateDnsNamespace")
                .property("Name", Expr::str(&namespace_name))
                .property("Vpc", Expr::reference(&vpc)),
        )?;

        let lb_security_group = stack.add(
            &["external", "SecurityGroup"],
            Resource::new("AWS::EC2::SecurityGroup")
                .property(
                    "GroupDescription",
                    Expr::str(format!("Automatically created Security Group for ELB {stack_name}external")),
                )
                .property("VpcId", Expr::reference(&vpc))
                .property("SecurityGroupEgress", allow_all_egress())
                .property(
                    "SecurityGroupIngress",
                    Expr::list(self.listener_ports().into_iter().map(|port| {
                        IngressRule {
                            protocol: "tcp".to_string(),
                            port_range: Some((port, port)),
                            source: IngressSource::AnyIpv4,
                        }
                        .to_expr()
                    })),
                ),
        )?;

        let ingress_rules = self.ingress_rules(&lb_security_group);
        if self.ingress_policy == IngressPolicy::AllowAllTraffic {
            warn!(
                stack = %stack_name,
                environment = %self.environment,
                "Service security group admits all inbound traffic from 0.0.0.0/0"
            );
        }
        let security_group = stack.add(
            &["SecurityGroup"],
            Resource::new("AWS::EC2::SecurityGroup")
                .property("GroupDescription", Expr::str(format!("{stack_name}/SecurityGroup")))
                .property("VpcId", Expr::reference(&vpc))
                .property("SecurityGroupEgress", allow_all_egress())
                .property(
                    "SecurityGroupIngress",
                    Expr::list(ingress_rules.iter().map(IngressRule::to_expr)),
                ),
        )?;

        let mut load_balancer = Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .property("Type", "application")
            .property("Scheme", "internet-facing")
            .property(
                "Subnets",
                Expr::list(public_subnets.iter().map(Expr::reference)),
            )
            .property(
                "SecurityGroups",
                Expr::list([Expr::get_att(&lb_security_group, "GroupId")]),
            )
            .property(
                "LoadBalancerAttributes",
                Expr::list([Expr::object([
                    ("Key", Expr::str("idle_timeout.timeout_seconds")),
                    ("Value", Expr::str(self.idle_timeout_secs.to_string())),
                ])]),
            );
        for route in &public_routes {
            load_balancer = load_balancer.depends_on(route);
        }
        let load_balancer = stack.add(&["external"], load_balancer)?;

        let target_group = stack.add(
            &["GatewayTargetGroup"],
            Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup")
                .property("Port", self.service_port)
                .property("Protocol", "HTTP")
                .property("TargetType", "ip")
                .property("HealthCheckPath", "/")
                .property("VpcId", Expr::reference(&vpc)),
        )?;

        let forward = Expr::list([Expr::object([
            ("Type", Expr::str("forward")),
            ("TargetGroupArn", Expr::reference(&target_group)),
        ])]);
        let http_actions = if self.domain.is_some() {
            Expr::list([Expr::object([
                ("Type", Expr::str("redirect")),
                (
                    "RedirectConfig",
                    Expr::object([
                        ("Protocol", Expr::str("HTTPS")),
                        ("Port", Expr::str("443")),
                        ("StatusCode", Expr::str("HTTP_301")),
                    ]),
                ),
            ])])
        } else {
            forward.clone()
        };
        let listener = stack.add(
            &["external", "Listener"],
            Resource::new("AWS::ElasticLoadBalancingV2::Listener")
                .property("LoadBalancerArn", Expr::reference(&load_balancer))
                .property("Port", 80u16)
                .property("Protocol", "HTTP")
                .property("DefaultActions", http_actions),
        )?;

        let domain = match &self.domain {
            Some(domain) => Some(declare_domain(stack, domain, &load_balancer, forward)?),
            None => None,
        };

        stack.add_output(
            LogicalId::new("LoadBalancerDNS")?,
            Output::new(Expr::get_att(&load_balancer, "DNSName"))
                .description("Public DNS name of the load balancer"),
        )?;

        let vpc_id = stack.export("VpcId", Expr::reference(&vpc))?;
        let cluster_name = stack.export("ClusterName", Expr::reference(&cluster))?;
        let cluster_arn = stack.export("ClusterArn", Expr::get_att(&cluster, "Arn"))?;
        let security_group_id =
            stack.export("SecurityGroupId", Expr::get_att(&security_group, "GroupId"))?;
        let target_group_arn = stack.export("TargetGroupArn", Expr::reference(&target_group))?;
        let namespace_id = stack.export("NamespaceId", Expr::get_att(&namespace, "Id"))?;
        let private_subnet_ids = private_subnets
            .iter()
            .enumerate()
            .map(|(i, subnet)| {
                stack.export(&format!("PrivateSubnet{}Id", i + 1), Expr::reference(subnet))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NetworkTopology {
            environment: self.environment,
            stack_name,
            cidr: self.cidr,
            subnets,
            ingress_policy: self.ingress_policy,
            ingress_rules,
            namespace_name,
            service_port: self.service_port,
            domain,
            vpc,
            cluster,
            security_group,
            load_balancer,
            listener,
            target_group,
            vpc_id,
            cluster_name,
            cluster_arn,
            security_group_id,
            target_group_arn,
            private_subnet_ids,
            namespace_id,
        })
    }

    /// Ports the load balancer accepts from the internet
    fn listener_ports(&self) -> Vec<u16> {
        if self.domain.is_some() {
            vec![80, 443]
        } else {
            vec![80]
        }
    }

    /// Public subnets take the first half of the block, private the second
    fn allocate_subnets(&self) -> Result<Vec<SubnetAllocation>> {
        let azs = usize::from(self.az_count);
        let blocks = self.cidr.split(azs * 2)?;
        Ok((0u32..)
            .zip(blocks.iter().take(azs).zip(blocks.iter().skip(azs)))
            .map(|(az_index, (public, private))| SubnetAllocation {
                az_index,
                public: *public,
                private: *private,
            })
            .collect())
    }

    fn ingress_rules(&self, lb_security_group: &LogicalId) -> Vec<IngressRule> {
        match self.ingress_policy {
            IngressPolicy::AllowAllTraffic => vec![IngressRule {
                protocol: "-1".to_string(),
                port_range: None,
                source: IngressSource::AnyIpv4,
            }],
            IngressPolicy::LoadBalancerOnly => vec![IngressRule {
                protocol: "tcp".to_string(),
                port_range: Some((self.service_port, self.service_port)),
                source: IngressSource::SecurityGroup(lb_security_group.clone()),
            }],
        }
    }
}

/// Hosted zone, DNS-validated certificate, HTTPS listener and alias record
fn declare_domain(
    stack: &mut Stack,
    domain: &DomainConfig,
    load_balancer: &LogicalId,
    forward: Expr,
) -> Result<DomainBinding> {
    let (hosted_zone, zone_id) = match &domain.hosted_zone_id {
        Some(id) => (None, Expr::str(id)),
        None => {
            let zone = stack.add(
                &["HostedZone"],
                Resource::new("AWS::Route53::HostedZone").property("Name", Expr::str(&domain.name)),
            )?;
            let zone_id = Expr::reference(&zone);
            (Some(zone), zone_id)
        }
    };

    let certificate = stack.add(
        &["Certificate"],
        Resource::new("AWS::CertificateManager::Certificate")
            .property("DomainName", Expr::str(&domain.name))
            .property("ValidationMethod", "DNS")
            .property(
                "DomainValidationOptions",
                Expr::list([Expr::object([
                    ("DomainName", Expr::str(&domain.name)),
                    ("HostedZoneId", zone_id.clone()),
                ])]),
            ),
    )?;

    let https_listener = stack.add(
        &["external", "HttpsListener"],
        Resource::new("AWS::ElasticLoadBalancingV2::Listener")
            .property("LoadBalancerArn", Expr::reference(load_balancer))
            .property("Port", 443u16)
            .property("Protocol", "HTTPS")
            .property(
                "Certificates",
                Expr::list([Expr::object([(
                    "CertificateArn",
                    Expr::reference(&certificate),
                )])]),
            )
            .property("DefaultActions", forward),
    )?;

    let alias_record = stack.add(
        &["external", "DnsRecord"],
        Resource::new("AWS::Route53::RecordSet")
            .property("Name", Expr::str(format!("{}.", domain.name)))
            .property("Type", "A")
            .property("HostedZoneId", zone_id)
            .property(
                "AliasTarget",
                Expr::object([
                    ("DNSName", Expr::get_att(load_balancer, "DNSName")),
                    (
                        "HostedZoneId",
                        Expr::get_att(load_balancer, "CanonicalHostedZoneID"),
                    ),
                ]),
            ),
    )?;

    stack.add_output(
        LogicalId::new("ServiceURL")?,
        Output::new(Expr::str(format!("https://{}", domain.name)))
            .description("Public HTTPS endpoint"),
    )?;

    info!(stack = %stack.name(), domain = %domain.name, "Declared HTTPS endpoint");
    Ok(DomainBinding {
        name: domain.name.clone(),
        hosted_zone,
        certificate,
        https_listener,
        alias_record,
    })
}

fn declare_subnet(
    stack: &mut Stack,
    vpc: &LogicalId,
    name: &str,
    az_index: u32,
    block: Ipv4Cidr,
    public: bool,
) -> Result<(LogicalId, LogicalId)> {
    let stack_name = stack.name().to_string();
    let kind = if public { "Public" } else { "Private" };
    let subnet = stack.add(
        &["Vpc", name, "Subnet"],
        Resource::new("AWS::EC2::Subnet")
            .property("VpcId", Expr::reference(vpc))
            .property("CidrBlock", Expr::str(block.to_string()))
            .property("AvailabilityZone", Expr::select_az(az_index))
            .property("MapPublicIpOnLaunch", public)
            .property(
                "Tags",
                Expr::list([
                    Expr::object([
                        ("Key", Expr::str("Name")),
                        ("Value", Expr::str(format!("{stack_name}/Vpc/{name}"))),
                    ]),
                    Expr::object([
                        ("Key", Expr::str("aws-cdk:subnet-type")),
                        ("Value", Expr::str(kind)),
                    ]),
                ]),
            ),
    )?;
    let route_table = stack.add(
        &["Vpc", name, "RouteTable"],
        Resource::new("AWS::EC2::RouteTable")
            .property("VpcId", Expr::reference(vpc))
            .property("Tags", name_tag(&format!("{stack_name}/Vpc/{name}"))),
    )?;
    stack.add(
        &["Vpc", name, "RouteTableAssociation"],
        Resource::new("AWS::EC2::SubnetRouteTableAssociation")
            .property("RouteTableId", Expr::reference(&route_table))
            .property("SubnetId", Expr::reference(&subnet)),
    )?;
    Ok((subnet, route_table))
}

fn name_tag(name: &str) -> Expr {
    Expr::list([Expr::object([
        ("Key", Expr::str("Name")),
        ("Value", Expr::str(name)),
    ])])
}

fn allow_all_egress() -> Expr {
    Expr::list([Expr::object([
        ("CidrIp", Expr::str("0.0.0.0/0")),
        ("Description", Expr::str("Allow all outbound traffic by default")),
        ("IpProtocol", Expr::str("-1")),
    ])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::StackEnv;

    fn build(policy: IngressPolicy) -> (Stack, NetworkTopology) {
        let mut stack = Stack::new("dev-Cluster", StackEnv::new("123456789012", "us-east-1"));
        let topology = NetworkTopologyBuilder::new("10.1.0.0/20", 2, Environment::Dev)
            .unwrap()
            .ingress_policy(policy)
            .build(&mut stack)
            .unwrap();
        (stack, topology)
    }

    #[test]
    fn allocates_public_then_private_blocks() {
        let (_, topology) = build(IngressPolicy::AllowAllTraffic);
        let blocks: Vec<(String, String)> = topology
            .subnets
            .iter()
            .map(|s| (s.public.to_string(), s.private.to_string()))
            .collect();
        assert_eq!(
            blocks,
            vec![
                ("10.1.0.0/22".to_string(), "10.1.8.0/22".to_string()),
                ("10.1.4.0/22".to_string(), "10.1.12.0/22".to_string()),
            ]
        );
    }

    #[test]
    fn declares_one_of_each_shared_resource() {
        let (stack, _) = build(IngressPolicy::AllowAllTraffic);
        for (resource_type, expected) in [
            ("AWS::EC2::VPC", 1),
            ("AWS::EC2::Subnet", 4),
            ("AWS::EC2::NatGateway", 2),
            ("AWS::ECS::Cluster", 1),
            ("AWS::ElasticLoadBalancingV2::LoadBalancer", 1),
            ("AWS::ElasticLoadBalancingV2::Listener", 1),
            ("AWS::ElasticLoadBalancingV2::TargetGroup", 1),
            ("AWS::ServiceDiscovery::PrivateDnsNamespace", 1),
        ] {
            assert_eq!(
                stack.resources_of_type(resource_type).count(),
                expected,
                "{resource_type}"
            );
        }
        assert!(stack.template().dangling_references().is_empty());
    }

    #[test]
    fn load_balancer_only_policy_restricts_ingress() {
        let (stack, topology) = build(IngressPolicy::LoadBalancerOnly);
        assert!(!topology.allows_all_inbound());
        let ingress = stack
            .resource(&topology.security_group)
            .unwrap()
            .get("SecurityGroupIngress")
            .unwrap()
            .to_json();
        assert_eq!(ingress[0]["IpProtocol"], "tcp");
        assert_eq!(ingress[0]["FromPort"], 80);
        assert!(ingress[0].get("CidrIp").is_none());
    }

    #[test]
    fn no_domain_keeps_plain_http() {
        let (stack, topology) = build(IngressPolicy::AllowAllTraffic);
        assert!(topology.domain.is_none());
        assert_eq!(stack.resources_of_type("AWS::CertificateManager::Certificate").count(), 0);
        let listener = stack.resource(&topology.listener).unwrap();
        assert_eq!(
            listener.get("DefaultActions").unwrap().to_json()[0]["Type"],
            "forward"
        );
    }

    #[test]
    fn domain_adds_https_listener_certificate_and_alias() {
        let mut stack = Stack::new("prod-Cluster", StackEnv::new("123456789012", "us-east-1"));
        let topology = NetworkTopologyBuilder::new("10.2.0.0/20", 2, Environment::Prod)
            .unwrap()
            .domain(Some(DomainConfig {
                name: "api.example.com".to_string(),
                hosted_zone_id: None,
            }))
            .build(&mut stack)
            .unwrap();
        let domain = topology.domain.as_ref().unwrap();
        assert!(domain.hosted_zone.is_some());

        let https = stack.resource(&domain.https_listener).unwrap();
        assert_eq!(https.get("Port").unwrap().to_json(), 443);
        assert_eq!(https.get("Protocol").unwrap().to_json(), "HTTPS");
        assert_eq!(
            https.get("Certificates").unwrap().to_json()[0]["CertificateArn"]["Ref"],
            domain.certificate.as_str()
        );

        let http = stack.resource(&topology.listener).unwrap();
        let redirect = &http.get("DefaultActions").unwrap().to_json()[0];
        assert_eq!(redirect["Type"], "redirect");
        assert_eq!(redirect["RedirectConfig"]["Protocol"], "HTTPS");

        let alias = stack.resource(&domain.alias_record).unwrap();
        assert_eq!(alias.get("Name").unwrap().to_json(), "api.example.com.");
        assert_eq!(
            alias.get("AliasTarget").unwrap().to_json()["DNSName"]["Fn::GetAtt"][0],
            topology.load_balancer.as_str()
        );
        assert!(stack.template().dangling_references().is_empty());
    }

    #[test]
    fn existing_hosted_zone_is_not_recreated() {
        let mut stack = Stack::new("prod-Cluster", StackEnv::new("123456789012", "us-east-1"));
        let topology = NetworkTopologyBuilder::new("10.2.0.0/20", 2, Environment::Prod)
            .unwrap()
            .domain(Some(DomainConfig {
                name: "api.example.com".to_string(),
                hosted_zone_id: Some("Z0123456789ABC".to_string()),
            }))
            .build(&mut stack)
            .unwrap();
        let domain = topology.domain.as_ref().unwrap();
        assert!(domain.hosted_zone.is_none());
        assert_eq!(stack.resources_of_type("AWS::Route53::HostedZone").count(), 0);
        let alias = stack.resource(&domain.alias_record).unwrap();
        assert_eq!(alias.get("HostedZoneId").unwrap().to_json(), "Z0123456789ABC");
    }

    #[test]
    fn requires_two_availability_zones() {
        assert!(NetworkTopologyBuilder::new("10.1.0.0/20", 1, Environment::Dev).is_err());
    }

    #[test]
    fn block_too_small_for_subnets_fails() {
        let mut stack = Stack::new("dev-Cluster", StackEnv::new("1", "us-east-1"));
        let err = NetworkTopologyBuilder::new("10.1.0.0/27", 2, Environment::Dev)
            .unwrap()
            .build(&mut stack)
            .unwrap_err();
        assert!(matches!(err, SynthError::InvalidCidr { .. }));
    }
}
