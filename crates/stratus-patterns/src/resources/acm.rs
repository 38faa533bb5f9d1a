//! ACM certificates.

use stratus_common::error::Result;
use stratus_synth::token::Value;
use stratus_synth::tree::{ConstructTree, NodeId, Resource};

use super::add_construct;
use super::route53::HostedZone;

/// How ownership of the domain is proven.
#[derive(Debug, Clone)]
pub enum CertificateValidation {
    /// DNS validation records written to a hosted zone.
    Dns(HostedZone),
    /// Validation email sent to the domain's contacts.
    Email,
}

/// A certificate, requested here or imported by ARN.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Construct scope, if the certificate is requested in this template.
    pub node: Option<NodeId>,
    arn: Value,
}

impl Certificate {
    /// Requests a certificate for `domain_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the domain name is empty or the id is taken.
    pub fn new(
        tree: &mut ConstructTree,
        scope: NodeId,
        id: &str,
        domain_name: &str,
        validation: &CertificateValidation,
    ) -> Result<Self> {
        let mut resource = Resource::new("AWS::CertificateManager::Certificate")
            .with_property("DomainName", domain_name);
        match validation {
            CertificateValidation::Dns(zone) => {
                resource.set_property("ValidationMethod", "DNS");
                resource.set_property(
                    "DomainValidationOptions",
                    Value::List(vec![Value::object([
                        ("DomainName", Value::from(domain_name)),
                        ("HostedZoneId", zone.hosted_zone_id()),
                    ])]),
                );
            }
            CertificateValidation::Email => resource.set_property("ValidationMethod", "EMAIL"),
        }
        let (node, resource) = add_construct(tree, scope, id, resource)?;
        if domain_name.is_empty() {
            return Err(tree.error(node, "certificate domain name must not be empty"));
        }
        Ok(Self {
            node: Some(node),
            arn: Value::Ref(resource),
        })
    }

    /// Imports an existing certificate.
    pub fn from_arn(arn: impl Into<String>) -> Self {
        Self {
            node: None,
            arn: Value::String(arn.into()),
        }
    }

    /// Certificate ARN.
    #[must_use]
    pub fn arn(&self) -> Value {
        self.arn.clone()
    }
}

#[cfg(test)]
mod tests {
    use stratus_synth::tree::StackProps;

    use super::*;

    #[test]
    fn dns_validation_uses_the_zone() {
        let mut tree = ConstructTree::new();
        let stack = tree.add_stack("Web", StackProps::default()).expect("stack");
        let zone = HostedZone::from_attributes("Z1", "example.com");
        let cert = Certificate::new(
            &mut tree,
            stack,
            "Cert",
            "api.example.com",
            &CertificateValidation::Dns(zone),
        )
        .expect("cert");
        let node = cert.node.expect("created");
        let resource = tree
            .find_child(node, "Resource")
            .and_then(|r| tree.resource(r))
            .expect("resource");
        assert_eq!(resource.property("ValidationMethod").and_then(Value::as_str), Some("DNS"));
        assert!(matches!(cert.arn(), Value::Ref(_)));
    }

    #[test]
    fn imported_certificates_have_no_node() {
        let cert = Certificate::from_arn("arn:aws:acm:us-east-1:1:certificate/abc");
        assert!(cert.node.is_none());
        assert_eq!(cert.arn().as_str(), Some("arn:aws:acm:us-east-1:1:certificate/abc"));
    }
}
