//! End-to-end synthesis of the service patterns.
//!
//! These tests build complete stacks and check the rendered templates:
//! 1. Resource shapes and cross-resource references
//! 2. Explicit dependencies and deployment order
//! 3. Outputs mixing literal text and deferred values
//! 4. Late validation and warnings
//! 5. Writing the cloud assembly to disk

#![allow(clippy::expect_used, clippy::unwrap_used)]

use serde_json::json;
use stratus_common::config::SynthConfig;
use stratus_common::error::StratusError;
use stratus_patterns::patterns::application_load_balanced::{
    ApplicationLoadBalancedEc2Service, ApplicationLoadBalancedEc2ServiceProps,
    ApplicationLoadBalancedFargateService, ApplicationLoadBalancedFargateServiceProps,
};
use stratus_patterns::patterns::multiple_target_groups::{
    ApplicationMultipleTargetGroupsFargateService, ApplicationMultipleTargetGroupsFargateServiceProps,
    ListenerOptions, LoadBalancerOptions, TargetOptions,
};
use stratus_patterns::patterns::network_load_balanced::{
    NetworkLoadBalancedFargateService, NetworkLoadBalancedFargateServiceProps,
};
use stratus_patterns::patterns::{ServiceOptions, TaskImageOptions};
use stratus_patterns::resources::ec2::{Vpc, VpcProps};
use stratus_patterns::resources::ecs::{
    Cluster, Compatibility, ContainerOptions, TaskDefinition, TaskDefinitionProps,
};
use stratus_patterns::resources::elbv2::{
    ApplicationListenerProps, ApplicationLoadBalancer, ApplicationTargetGroup, ListenerAction,
    LoadBalancerProps, NetworkLoadBalancer, TargetGroupProps,
};
use stratus_patterns::resources::route53::HostedZone;
use stratus_synth::synth::{StackArtifact, synthesize};
use stratus_synth::tree::{ConstructTree, StackProps};

fn fargate_props(image: &str) -> ApplicationLoadBalancedFargateServiceProps {
    let mut props = ApplicationLoadBalancedFargateServiceProps::default();
    props.base.service = ServiceOptions {
        task_image_options: Some(TaskImageOptions::new(image)),
        ..ServiceOptions::default()
    };
    props
}

fn only_id<'a>(stack: &'a StackArtifact, resource_type: &str) -> &'a str {
    stack
        .template
        .only_resource_of_type(resource_type)
        .unwrap_or_else(|| panic!("expected exactly one {resource_type}"))
        .0
}

fn position(stack: &StackArtifact, logical_id: &str) -> usize {
    stack
        .deployment_order
        .iter()
        .position(|id| id == logical_id)
        .unwrap_or_else(|| panic!("{logical_id} missing from deployment order"))
}

// ── Application load balanced ────────────────────────────────────────

#[test]
fn alb_fargate_renders_service_listener_and_target_group() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Web", fargate_props("nginx:latest"))
        .expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    let template = &web.template;

    let service_id = only_id(web, "AWS::ECS::Service");
    let listener_id = only_id(web, "AWS::ElasticLoadBalancingV2::Listener");
    let target_group_id = only_id(web, "AWS::ElasticLoadBalancingV2::TargetGroup");
    let task_id = only_id(web, "AWS::ECS::TaskDefinition");
    let _ = only_id(web, "AWS::ECS::Cluster");
    let _ = only_id(web, "AWS::EC2::VPC");

    let service = &template.resources[service_id];
    assert_eq!(service.property("LaunchType"), Some(&json!("FARGATE")));
    assert_eq!(service.property("DesiredCount"), Some(&json!(1)));
    assert_eq!(service.property("HealthCheckGracePeriodSeconds"), Some(&json!(60)));
    assert_eq!(service.property("TaskDefinition"), Some(&json!({ "Ref": task_id })));
    assert!(service.depends_on.iter().any(|id| id == listener_id));
    assert_eq!(
        service.property("LoadBalancers"),
        Some(&json!([{
            "ContainerName": "web",
            "ContainerPort": 80,
            "TargetGroupArn": { "Ref": target_group_id },
        }]))
    );
    let network = service.property("NetworkConfiguration").expect("network configuration");
    assert_eq!(network["AwsvpcConfiguration"]["AssignPublicIp"], json!("DISABLED"));

    let target_group = &template.resources[target_group_id];
    assert_eq!(target_group.property("TargetType"), Some(&json!("ip")));

    let task = &template.resources[task_id];
    assert_eq!(task.property("NetworkMode"), Some(&json!("awsvpc")));
    assert_eq!(task.property("Cpu"), Some(&json!("256")));
    let containers = task.property("ContainerDefinitions").expect("containers");
    assert_eq!(containers[0]["Name"], json!("web"));
    assert_eq!(containers[0]["Image"], json!("nginx:latest"));
    assert_eq!(containers[0]["PortMappings"], json!([{"ContainerPort": 80, "HostPort": 80, "Protocol": "tcp"}]));
    assert_eq!(containers[0]["LogConfiguration"]["LogDriver"], json!("awslogs"));

    assert!(position(web, listener_id) < position(web, service_id));
    assert!(position(web, target_group_id) < position(web, listener_id));
}

#[test]
fn alb_outputs_join_literal_text_with_the_dns_name() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Web", fargate_props("nginx"))
        .expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    let lb_id = only_id(web, "AWS::ElasticLoadBalancingV2::LoadBalancer");

    let outputs = &web.template.outputs;
    let dns = outputs.iter().find(|(id, _)| id.contains("LoadBalancerDNS")).expect("dns output").1;
    assert_eq!(dns.value, json!({ "Fn::GetAtt": [lb_id, "DNSName"] }));
    let url = outputs.iter().find(|(id, _)| id.contains("ServiceURL")).expect("url output").1;
    assert_eq!(
        url.value,
        json!({ "Fn::Join": ["", ["http://", { "Fn::GetAtt": [lb_id, "DNSName"] }]] })
    );
}

#[test]
fn alb_https_with_domain_renders_certificate_record_and_redirect() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let mut props = fargate_props("nginx");
    props.base.domain_name = Some("api".into());
    props.base.domain_zone = Some(HostedZone::from_attributes("Z0123", "example.com."));
    props.base.protocol = Some(stratus_patterns::resources::elbv2::Protocol::Https);
    props.base.redirect_http = true;
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Web", props).expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    let template = &web.template;

    let certificate_id = only_id(web, "AWS::CertificateManager::Certificate");
    let record_id = only_id(web, "AWS::Route53::RecordSet");
    assert_eq!(template.resources[record_id].property("Name"), Some(&json!("api.example.com.")));

    let listeners = template.resources_of_type("AWS::ElasticLoadBalancingV2::Listener");
    assert_eq!(listeners.len(), 2);
    let https = listeners
        .iter()
        .find(|(_, entry)| entry.property("Protocol") == Some(&json!("HTTPS")))
        .expect("https listener")
        .1;
    assert_eq!(https.property("Port"), Some(&json!(443)));
    assert_eq!(
        https.property("Certificates"),
        Some(&json!([{ "CertificateArn": { "Ref": certificate_id } }]))
    );
    let redirect = listeners
        .iter()
        .find(|(_, entry)| entry.property("Protocol") == Some(&json!("HTTP")))
        .expect("redirect listener")
        .1;
    assert_eq!(redirect.property("DefaultActions").expect("actions")[0]["Type"], json!("redirect"));

    let url = web
        .template
        .outputs
        .iter()
        .find(|(id, _)| id.contains("ServiceURL"))
        .expect("url output")
        .1;
    assert_eq!(url.value, json!("https://api.example.com"));
}

#[test]
fn alb_ec2_uses_bridge_networking_and_instance_targets() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let mut props = ApplicationLoadBalancedEc2ServiceProps {
        memory_limit_mib: Some(512),
        ..ApplicationLoadBalancedEc2ServiceProps::default()
    };
    props.base.service.task_image_options = Some(TaskImageOptions::new("nginx"));
    let _ = ApplicationLoadBalancedEc2Service::new(&mut tree, stack, "Web", props).expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    let template = &web.template;

    let task = &template.resources[only_id(web, "AWS::ECS::TaskDefinition")];
    assert_eq!(task.property("NetworkMode"), Some(&json!("bridge")));
    assert_eq!(task.property("ContainerDefinitions").expect("containers")[0]["Memory"], json!(512));
    let target_group = &template.resources[only_id(web, "AWS::ElasticLoadBalancingV2::TargetGroup")];
    assert_eq!(target_group.property("TargetType"), Some(&json!("instance")));
    let service = &template.resources[only_id(web, "AWS::ECS::Service")];
    assert!(service.property("NetworkConfiguration").is_none());
}

#[test]
fn services_in_one_stack_share_the_default_cluster() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Front", fargate_props("nginx"))
        .expect("front");
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Back", fargate_props("api"))
        .expect("back");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    assert_eq!(web.template.resources_of_type("AWS::ECS::Cluster").len(), 1);
    assert_eq!(web.template.resources_of_type("AWS::EC2::VPC").len(), 1);
    assert_eq!(web.template.resources_of_type("AWS::ECS::Service").len(), 2);
}

#[test]
fn alb_uses_a_supplied_load_balancer() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let vpc = Vpc::new(&mut tree, stack, "Vpc", &VpcProps::default()).expect("vpc");
    let cluster = Cluster::new(&mut tree, stack, "Cluster", Some(vpc.clone())).expect("cluster");
    let lb = ApplicationLoadBalancer::new(&mut tree, stack, "SharedAlb", &LoadBalancerProps::new(vpc))
        .expect("lb");

    let mut props = fargate_props("nginx:latest");
    props.base.service.cluster = Some(cluster);
    props.base.load_balancer = Some(lb);
    let pattern = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Site", props).expect("pattern");
    assert_eq!(pattern.base.load_balancer, lb);

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    let lb_id = only_id(web, "AWS::ElasticLoadBalancingV2::LoadBalancer");
    assert!(lb_id.starts_with("SharedAlb"), "got: {lb_id}");
    let listener_id = only_id(web, "AWS::ElasticLoadBalancingV2::Listener");
    let listener = &web.template.resources[listener_id];
    assert_eq!(listener.property("LoadBalancerArn"), Some(&json!({ "Ref": lb_id })));
    assert!(position(web, lb_id) < position(web, listener_id));
    assert!(web.template.outputs.values().any(|o| o.value == json!({ "Fn::GetAtt": [lb_id, "DNSName"] })));
}

// ── Network load balanced ────────────────────────────────────────────

#[test]
fn nlb_fargate_renders_tcp_listener() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Cache", StackProps::default()).expect("stack");
    let mut props = NetworkLoadBalancedFargateServiceProps::default();
    props.base.service.task_image_options = Some(TaskImageOptions::new("redis:7"));
    let _ = NetworkLoadBalancedFargateService::new(&mut tree, stack, "Redis", props).expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let cache = assembly.stack("Cache").expect("stack artifact");
    let template = &cache.template;

    let lb = &template.resources[only_id(cache, "AWS::ElasticLoadBalancingV2::LoadBalancer")];
    assert_eq!(lb.property("Type"), Some(&json!("network")));
    let listener = &template.resources[only_id(cache, "AWS::ElasticLoadBalancingV2::Listener")];
    assert_eq!(listener.property("Protocol"), Some(&json!("TCP")));
    assert_eq!(listener.property("Port"), Some(&json!(80)));
    assert_eq!(template.outputs.len(), 1);
}

#[test]
fn nlb_uses_a_supplied_load_balancer() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Cache", StackProps::default()).expect("stack");
    let vpc = Vpc::new(&mut tree, stack, "Vpc", &VpcProps::default()).expect("vpc");
    let cluster = Cluster::new(&mut tree, stack, "Cluster", Some(vpc.clone())).expect("cluster");
    let lb = NetworkLoadBalancer::new(&mut tree, stack, "SharedNlb", &LoadBalancerProps::new(vpc))
        .expect("lb");

    let mut props = NetworkLoadBalancedFargateServiceProps::default();
    props.base.service.cluster = Some(cluster);
    props.base.service.task_image_options = Some(TaskImageOptions::new("redis:7"));
    props.base.load_balancer = Some(lb);
    let pattern = NetworkLoadBalancedFargateService::new(&mut tree, stack, "Redis", props).expect("pattern");
    assert_eq!(pattern.base.load_balancer, lb);

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let cache = assembly.stack("Cache").expect("stack artifact");
    let lb_id = only_id(cache, "AWS::ElasticLoadBalancingV2::LoadBalancer");
    assert!(lb_id.starts_with("SharedNlb"), "got: {lb_id}");
    let listener = &cache.template.resources[only_id(cache, "AWS::ElasticLoadBalancingV2::Listener")];
    assert_eq!(listener.property("LoadBalancerArn"), Some(&json!({ "Ref": lb_id })));
    assert_eq!(cache.template.resources_of_type("AWS::EC2::VPC").len(), 1);
}

// ── Multiple target groups ───────────────────────────────────────────

#[test]
fn multiple_target_groups_render_rules_and_outputs_per_listener() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Api", StackProps::default()).expect("stack");
    let mut props = ApplicationMultipleTargetGroupsFargateServiceProps::default();
    props.base.service.task_image_options = Some(TaskImageOptions::new("api:1"));
    props.base.load_balancers = Some(vec![LoadBalancerOptions::new(
        "Public",
        vec![ListenerOptions::new("Web")],
    )]);
    props.base.target_groups = Some(vec![
        TargetOptions {
            container_port: 80,
            ..TargetOptions::default()
        },
        TargetOptions {
            container_port: 9090,
            listener: Some("Web".into()),
            priority: Some(5),
            path_pattern: Some("/metrics".into()),
            ..TargetOptions::default()
        },
    ]);
    let _ = ApplicationMultipleTargetGroupsFargateService::new(&mut tree, stack, "Api", props).expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let api = assembly.stack("Api").expect("stack artifact");
    let template = &api.template;

    assert_eq!(template.resources_of_type("AWS::ElasticLoadBalancingV2::TargetGroup").len(), 2);
    let rule = &template.resources[only_id(api, "AWS::ElasticLoadBalancingV2::ListenerRule")];
    assert_eq!(rule.property("Priority"), Some(&json!(5)));
    assert_eq!(rule.property("Conditions").expect("conditions")[0]["Field"], json!("path-pattern"));

    let service = &template.resources[only_id(api, "AWS::ECS::Service")];
    assert_eq!(service.property("LoadBalancers").and_then(|v| v.as_array()).map(Vec::len), Some(2));
    assert!(template.outputs.keys().any(|id| id.contains("LoadBalancerDNSPublic")));
    assert!(template.outputs.keys().any(|id| id.contains("ServiceURLPublicWeb")));
}

// ── Building blocks ──────────────────────────────────────────────────

#[test]
fn hand_built_service_reports_missing_default_action() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Manual", StackProps::default()).expect("stack");
    let vpc = Vpc::new(&mut tree, stack, "Vpc", &VpcProps::default()).expect("vpc");
    let lb = ApplicationLoadBalancer::new(&mut tree, stack, "LB", &LoadBalancerProps::new(vpc))
        .expect("load balancer");
    let _ = lb
        .add_listener(&mut tree, "Listener", ApplicationListenerProps::default())
        .expect("listener");

    let err = synthesize(&tree, &SynthConfig::default()).unwrap_err();
    let StratusError::ValidationFailed { errors } = err else {
        panic!("expected validation failure, got {err}");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Listener needs at least one default action"), "got: {errors:?}");
}

#[test]
fn replaced_default_action_warns_and_fails_in_strict_mode() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Manual", StackProps::default()).expect("stack");
    let vpc = Vpc::new(&mut tree, stack, "Vpc", &VpcProps::default()).expect("vpc");
    let lb = ApplicationLoadBalancer::new(&mut tree, stack, "LB", &LoadBalancerProps::new(vpc.clone()))
        .expect("load balancer");
    let listener = lb
        .add_listener(&mut tree, "Listener", ApplicationListenerProps::default())
        .expect("listener");
    let first = ApplicationTargetGroup::new(&mut tree, stack, "First", &vpc, &TargetGroupProps::default())
        .expect("first");
    let second = ApplicationTargetGroup::new(&mut tree, stack, "Second", &vpc, &TargetGroupProps::default())
        .expect("second");
    listener.add_target_group(&mut tree, "First", &first, None, &[]).expect("first");
    listener
        .set_default_action(&mut tree, &ListenerAction::forward(&second))
        .expect("second");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("lenient synth");
    assert_eq!(assembly.warnings().count(), 1);

    let strict = SynthConfig {
        strict: true,
        ..SynthConfig::default()
    };
    assert!(matches!(
        synthesize(&tree, &strict),
        Err(StratusError::ValidationFailed { .. })
    ));
}

#[test]
fn explicit_cluster_and_task_definition_are_used_as_given() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let cluster = Cluster::new(&mut tree, stack, "Cluster", None).expect("cluster");
    let task = TaskDefinition::new(
        &mut tree,
        stack,
        "Task",
        TaskDefinitionProps {
            compatibility: Compatibility::Fargate,
            cpu: Some(512),
            memory_mib: Some(1024),
            ..TaskDefinitionProps::default()
        },
    )
    .expect("task");
    let _ = task
        .add_container(&mut tree, "app", ContainerOptions::new("app:2"))
        .expect("container");

    let mut props = ApplicationLoadBalancedFargateServiceProps::default();
    props.base.service = ServiceOptions {
        cluster: Some(cluster),
        task_definition: Some(task),
        ..ServiceOptions::default()
    };
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Web", props).expect("pattern");

    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");
    let web = assembly.stack("Web").expect("stack artifact");
    let task = &web.template.resources[only_id(web, "AWS::ECS::TaskDefinition")];
    assert_eq!(task.property("Memory"), Some(&json!("1024")));
    let service = &web.template.resources[only_id(web, "AWS::ECS::Service")];
    assert_eq!(service.property("LoadBalancers").expect("targets")[0]["ContainerName"], json!("app"));
}

// ── Cloud assembly ───────────────────────────────────────────────────

#[test]
fn assembly_is_written_with_manifest_and_templates() {
    let mut tree = ConstructTree::new();
    let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
    let _ = ApplicationLoadBalancedFargateService::new(&mut tree, stack, "Web", fargate_props("nginx"))
        .expect("pattern");
    let assembly = synthesize(&tree, &SynthConfig::default()).expect("synth");

    let dir = tempfile::tempdir().expect("tempdir");
    assembly.write(dir.path()).expect("write");

    let template_path = dir.path().join(assembly.stacks[0].template_file());
    let raw = std::fs::read_to_string(template_path).expect("template file");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed["AWSTemplateFormatVersion"], json!("2010-09-09"));
    assert!(dir.path().join("manifest.json").exists());
}
