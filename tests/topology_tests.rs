//! # Network Topology Tests
//!
//! One topology per environment, shared by reference, and the permissive
//! security group default.

mod common;

use common::{compose_app, properties_of_type, stack, template_json, two_environment_config};
use stack_synth::composition::compose;
use stack_synth::environment::{Environment, EnvironmentRegistry};
use stack_synth::error::SynthError;
use stack_synth::network::{DomainConfig, IngressPolicy};
use std::sync::Arc;

#[test]
fn test_one_topology_per_environment() {
    let app = compose_app(&two_environment_config());
    assert_eq!(app.topologies().len(), 2);

    for environment in Environment::ALL {
        let cluster = format!("{environment}-Cluster");
        assert_eq!(
            properties_of_type(&app, &cluster, "AWS::EC2::VPC").len(),
            1,
            "{cluster} should declare exactly one VPC"
        );
        assert_eq!(properties_of_type(&app, &cluster, "AWS::ECS::Cluster").len(), 1);
    }

    for service in app.services() {
        let stack_name = format!("{}-{}Stack", service.environment, service.name);
        assert!(
            properties_of_type(&app, &stack_name, "AWS::EC2::VPC").is_empty(),
            "{stack_name} must not declare its own network"
        );
    }
}

#[test]
fn test_every_service_references_the_same_topology() {
    let app = compose_app(&two_environment_config());
    for service in app.services() {
        let shared = app.topology(service.environment).unwrap();
        assert!(
            Arc::ptr_eq(&service.topology, shared),
            "{} in {} holds a copy of the topology",
            service.name,
            service.environment
        );
        assert!(service.uses_topology(shared));
    }

    let dev = app.topology(Environment::Dev).unwrap();
    let prod = app.topology(Environment::Prod).unwrap();
    assert!(!Arc::ptr_eq(dev, prod));
    assert_eq!(dev.cidr.to_string(), "10.1.0.0/20");
    assert_eq!(prod.cidr.to_string(), "10.2.0.0/20");
}

#[test]
fn test_services_import_network_values_from_cluster_stack() {
    let app = compose_app(&two_environment_config());
    let imports = stack(&app, "dev-apiStack").synthesize().imports();
    assert!(imports.contains("dev-Cluster:ClusterName"));
    assert!(imports.contains("dev-Cluster:SecurityGroupId"));
    assert!(imports.contains("dev-Cluster:TargetGroupArn"));
    assert!(imports.iter().all(|i| i.starts_with("dev-Cluster:")));
}

#[test]
fn test_duplicate_network_for_environment_is_rejected() {
    let mut config = two_environment_config();
    let mut duplicate = config.environments[1].clone();
    duplicate.services.clear();
    config.environments.push(duplicate);
    let err = compose(&config, &EnvironmentRegistry::builtin()).unwrap_err();
    assert!(matches!(err, SynthError::DuplicateNetwork(Environment::Prod)));
}

#[test]
fn test_default_security_group_allows_all_inbound_traffic() {
    let app = compose_app(&two_environment_config());
    let topology = app.topology(Environment::Dev).unwrap();
    assert_eq!(topology.ingress_policy, IngressPolicy::AllowAllTraffic);
    assert!(topology.allows_all_inbound());

    let template = template_json(&app, "dev-Cluster");
    let ingress = &template["Resources"][topology.security_group.as_str()]["Properties"]
        ["SecurityGroupIngress"];
    let rules = ingress.as_array().expect("ingress should be a list");
    assert_eq!(rules.len(), 1, "unexpected change to the service ingress rules");
    assert_eq!(rules[0]["IpProtocol"], "-1");
    assert_eq!(rules[0]["CidrIp"], "0.0.0.0/0");
    assert!(rules[0].get("FromPort").is_none());
    assert!(rules[0].get("ToPort").is_none());
}

#[test]
fn test_load_balancer_only_policy_closes_the_open_rule() {
    let mut config = two_environment_config();
    config.environments[0].network.ingress = IngressPolicy::LoadBalancerOnly;
    let app = compose_app(&config);
    let topology = app.topology(Environment::Dev).unwrap();
    assert!(!topology.allows_all_inbound());
    assert!(app.topology(Environment::Prod).unwrap().allows_all_inbound());
}

#[test]
fn test_custom_domain_serves_https_in_its_environment_only() {
    let mut config = two_environment_config();
    config.environments[1].network.domain = Some(DomainConfig {
        name: "api.example.com".to_string(),
        hosted_zone_id: None,
    });
    let app = compose_app(&config);

    let listeners = properties_of_type(&app, "prod-Cluster", "AWS::ElasticLoadBalancingV2::Listener");
    let mut ports: Vec<i64> = listeners.iter().filter_map(|l| l["Port"].as_i64()).collect();
    ports.sort_unstable();
    assert_eq!(ports, vec![80, 443]);
    assert_eq!(
        properties_of_type(&app, "prod-Cluster", "AWS::CertificateManager::Certificate").len(),
        1
    );
    assert_eq!(properties_of_type(&app, "prod-Cluster", "AWS::Route53::RecordSet").len(), 1);
    assert_eq!(
        template_json(&app, "prod-Cluster")["Outputs"]["ServiceURL"]["Value"],
        "https://api.example.com"
    );

    let lb_ingress: Vec<i64> = properties_of_type(&app, "prod-Cluster", "AWS::EC2::SecurityGroup")
        .iter()
        .flat_map(|sg| sg["SecurityGroupIngress"].as_array().cloned().unwrap_or_default())
        .filter_map(|rule| rule["FromPort"].as_i64())
        .collect();
    assert!(lb_ingress.contains(&443));

    assert!(app.topology(Environment::Dev).unwrap().domain.is_none());
    assert_eq!(
        properties_of_type(&app, "dev-Cluster", "AWS::CertificateManager::Certificate").len(),
        0
    );
}
