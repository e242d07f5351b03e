//! # Network Topology
//!
//! One per environment: a VPC spread across availability zones, the Fargate
//! cluster placed inside it, the shared service security group and an
//! internet-facing load balancer with an HTTP listener and target group.
//! An optional custom domain adds a certificate, an HTTPS listener and an
//! alias record, and turns the HTTP listener into a redirect.

mod cidr;
mod topology;

pub use cidr::Ipv4Cidr;
pub use topology::{
    DomainBinding, DomainConfig, IngressPolicy, IngressRule, IngressSource, NetworkTopology, NetworkTopologyBuilder,
    SubnetAllocation,
};
