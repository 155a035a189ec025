//! Contract tests for CloudProvider.
//!
//! These tests pin down the behaviour the orchestrator and the pipeline rely
//! on, exercised through the in-memory provider.

use serde_json::json;
use sitestack_provider::provider_traits::*;
use sitestack_provider::{MemoryProvider, ProviderError, CREATE_INVALIDATION_ACTION};

async fn provision_distribution(provider: &MemoryProvider) -> ProvisionedResource {
    provider
        .provision(&ResourceSpec::new(
            "SiteDistribution",
            ResourceKind::Distribution,
            json!({ "defaultRootObject": "index.html" }),
        ))
        .await
        .unwrap()
        .resource
}

async fn provision_role(provider: &MemoryProvider, resources: Vec<String>) -> String {
    let role = provider
        .provision(&ResourceSpec::new(
            "InvalidateRole",
            ResourceKind::Role,
            json!({
                "assumedBy": "codebuild.amazonaws.com",
                "policy": [{
                    "actions": [CREATE_INVALIDATION_ACTION],
                    "resources": resources,
                }],
            }),
        ))
        .await
        .unwrap()
        .resource;
    role.attribute("Arn").unwrap().to_string()
}

// ===========================================================================
// provision contract
// ===========================================================================

#[tokio::test]
async fn provision_same_spec_twice_is_unchanged() {
    let provider = MemoryProvider::new();
    let spec = ResourceSpec::new("AlarmTopic", ResourceKind::Topic, json!({ "topicName": "t" }));

    let first = provider.provision(&spec).await.unwrap();
    let second = provider.provision(&spec).await.unwrap();

    assert_eq!(first.change, Change::Created);
    assert_eq!(second.change, Change::Unchanged);
    assert_eq!(first.resource.attributes, second.resource.attributes);
}

#[tokio::test]
async fn certificate_domain_change_replaces_certificate() {
    let provider = MemoryProvider::new();
    let v1 = ResourceSpec::new(
        "SiteCertificate",
        ResourceKind::Certificate,
        json!({ "domainName": "www.example.com" }),
    )
    .in_region("us-east-1");
    let v2 = ResourceSpec::new(
        "SiteCertificate",
        ResourceKind::Certificate,
        json!({ "domainName": "blog.example.com" }),
    )
    .in_region("us-east-1");

    let a = provider.provision(&v1).await.unwrap();
    let b = provider.provision(&v2).await.unwrap();

    assert_eq!(b.change, Change::Replaced);
    assert_ne!(a.resource.attribute("Arn"), b.resource.attribute("Arn"));
    assert!(b.resource.attribute("Arn").unwrap().contains(":us-east-1:"));
}

#[tokio::test]
async fn region_override_is_reported() {
    let provider = MemoryProvider::new().with_region("ap-southeast-2");
    let topic = provider
        .provision(&ResourceSpec::new("AlarmTopic", ResourceKind::Topic, json!({ "topicName": "t" })))
        .await
        .unwrap();
    assert_eq!(topic.resource.region, "ap-southeast-2");
    assert!(topic.resource.attribute("TopicArn").unwrap().contains("ap-southeast-2"));
}

#[tokio::test]
async fn describe_returns_provisioned_resource() {
    let provider = MemoryProvider::new();
    assert!(provider.describe("SiteDistribution").await.unwrap().is_none());

    let created = provision_distribution(&provider).await;
    let described = provider.describe("SiteDistribution").await.unwrap().unwrap();
    assert_eq!(created.physical_id, described.physical_id);
}

// ===========================================================================
// object storage contract
// ===========================================================================

#[tokio::test]
async fn put_objects_requires_existing_bucket() {
    let provider = MemoryProvider::new();
    let err = provider
        .put_objects(
            "nope",
            vec![StoredObject {
                key: "index.html".to_string(),
                body: Vec::new(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ResourceNotFound { .. }));
}

#[tokio::test]
async fn list_objects_is_sorted() {
    let provider = MemoryProvider::new();
    provider
        .provision(&ResourceSpec::new(
            "SiteBucket",
            ResourceKind::Bucket,
            json!({ "bucketName": "site" }),
        ))
        .await
        .unwrap();
    let objects = ["b.html", "a.html", "css/site.css"]
        .iter()
        .map(|k| StoredObject {
            key: k.to_string(),
            body: b"x".to_vec(),
        })
        .collect();
    assert_eq!(provider.put_objects("site", objects).await.unwrap(), 3);
    assert_eq!(
        provider.list_objects("site").await.unwrap(),
        vec!["a.html", "b.html", "css/site.css"]
    );
}

#[tokio::test]
async fn delete_objects_skips_absent_keys() {
    let provider = MemoryProvider::new();
    provider
        .provision(&ResourceSpec::new(
            "SiteBucket",
            ResourceKind::Bucket,
            json!({ "bucketName": "site" }),
        ))
        .await
        .unwrap();
    let objects = ["index.html", "old.html"]
        .iter()
        .map(|k| StoredObject {
            key: k.to_string(),
            body: b"x".to_vec(),
        })
        .collect();
    provider.put_objects("site", objects).await.unwrap();

    let removed = provider
        .delete_objects("site", &["old.html".to_string(), "never.html".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(provider.list_objects("site").await.unwrap(), vec!["index.html"]);

    let err = provider.delete_objects("nope", &[]).await.unwrap_err();
    assert!(matches!(err, ProviderError::ResourceNotFound { .. }));
}

// ===========================================================================
// invalidation contract
// ===========================================================================

#[tokio::test]
async fn invalidation_allowed_with_scoped_grant() {
    let provider = MemoryProvider::new();
    let distribution = provision_distribution(&provider).await;
    let role_arn =
        provision_role(&provider, vec![distribution.attribute("Arn").unwrap().to_string()]).await;

    let record = provider
        .create_invalidation(&role_arn, &distribution.physical_id, &["/*".to_string()])
        .await
        .unwrap();

    assert_eq!(record.distribution_id, distribution.physical_id);
    assert_eq!(record.paths, vec!["/*"]);
    assert_eq!(provider.invalidations().len(), 1);
}

#[tokio::test]
async fn invalidation_denied_for_other_distribution_grant() {
    let provider = MemoryProvider::new();
    let distribution = provision_distribution(&provider).await;
    let role_arn = provision_role(
        &provider,
        vec!["arn:aws:cloudfront::000000000000:distribution/EOTHER".to_string()],
    )
    .await;

    let err = provider
        .create_invalidation(&role_arn, &distribution.physical_id, &["/*".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::AccessDenied { .. }));
    assert!(provider.invalidations().is_empty());
}

#[tokio::test]
async fn invalidation_denied_for_unknown_principal() {
    let provider = MemoryProvider::new();
    let distribution = provision_distribution(&provider).await;

    let err = provider
        .create_invalidation(
            "arn:aws:iam::000000000000:role/nobody",
            &distribution.physical_id,
            &["/*".to_string()],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::AccessDenied { .. }));
}

#[tokio::test]
async fn bucket_deployment_records_invalidation() {
    let provider = MemoryProvider::new();
    provider
        .provision(&ResourceSpec::new(
            "SiteBucket",
            ResourceKind::Bucket,
            json!({ "bucketName": "site" }),
        ))
        .await
        .unwrap();
    let distribution = provision_distribution(&provider).await;

    let spec = ResourceSpec::new(
        "DeployWithInvalidation",
        ResourceKind::BucketDeployment,
        json!({
            "destinationBucketName": "site",
            "distributionId": distribution.physical_id,
            "distributionPaths": ["/*"],
        }),
    );
    provider.provision(&spec).await.unwrap();
    provider.provision(&spec).await.unwrap();

    // unchanged deployment does not invalidate again
    assert_eq!(provider.invalidations().len(), 1);
}
