//! Certificate and DNS binding for a custom domain.
//!
//! The zone must already exist; it is looked up, never created. The
//! certificate is always issued in [`CERTIFICATE_REGION`], whatever region
//! the rest of the stack lives in, because the edge distribution only
//! accepts certificates from there. The alias record is declared after the
//! distribution since its target is the distribution's hostname.

use serde_json::json;
use sitestack_provider::{ResourceKind, ResourceSpec};

use crate::resources::{DomainBinding, SITE_ALIAS_RECORD, SITE_CERTIFICATE, SITE_DISTRIBUTION, ZONE};
use crate::token::get_att;

/// Region the edge distribution reads certificates from.
pub const CERTIFICATE_REGION: &str = "us-east-1";

/// Hosted zone id shared by every CloudFront alias target.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// DNS-validated certificate for `site_domain`, validated through the
/// looked-up zone.
pub fn site_certificate(site_domain: &str) -> ResourceSpec {
    ResourceSpec::new(
        SITE_CERTIFICATE,
        ResourceKind::Certificate,
        json!({
            "domainName": site_domain,
            "validation": {
                "method": "DNS",
                "hostedZoneId": get_att(ZONE, "HostedZoneId"),
            },
        }),
    )
    .in_region(CERTIFICATE_REGION)
    .depends_on(ZONE)
}

/// Binding the distribution uses once the certificate exists.
pub fn domain_binding(site_domain: &str) -> DomainBinding {
    DomainBinding {
        site_domain: site_domain.to_string(),
        certificate_arn: get_att(SITE_CERTIFICATE, "Arn"),
    }
}

/// `A` alias record pointing `site_domain` at the distribution.
pub fn alias_record(site_domain: &str) -> ResourceSpec {
    ResourceSpec::new(
        SITE_ALIAS_RECORD,
        ResourceKind::DnsRecord,
        json!({
            "recordName": site_domain,
            "type": "A",
            "hostedZoneId": get_att(ZONE, "HostedZoneId"),
            "aliasTarget": {
                "dnsName": get_att(SITE_DISTRIBUTION, "DomainName"),
                "hostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
            },
        }),
    )
    .depends_on(ZONE)
    .depends_on(SITE_DISTRIBUTION)
}
