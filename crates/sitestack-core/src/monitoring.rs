//! Alarm rules and the shared notification channel.
//!
//! The rule set is a static table. Each row becomes one alarm resource whose
//! metric dimensions point at the stack's distribution or bucket, and whose
//! only action is publishing to the alarm topic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sitestack_provider::{ProvisionedResource, ResourceKind, ResourceSpec};

use crate::config::StackSettings;
use crate::error::{Result, SiteError};
use crate::resources::{ALARM_TOPIC, SITE_BUCKET, SITE_DISTRIBUTION};
use crate::token::get_att;

pub const TOPIC_DISPLAY_NAME: &str = "Static Site Monitoring Alerts";

/// Missing datapoints are neither breaching nor OK. `AlarmEvaluator` reports
/// a range with no data as `InsufficientData`, which is what this declares.
pub const TREAT_MISSING_DATA: &str = "missing";

const CLOUDFRONT_NAMESPACE: &str = "AWS/CloudFront";
const S3_NAMESPACE: &str = "AWS/S3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    LessThanThreshold,
}

impl ComparisonOperator {
    /// Whether `value` breaches `threshold`.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThanThreshold => value > threshold,
            ComparisonOperator::LessThanThreshold => value < threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThanThreshold => ">",
            ComparisonOperator::LessThanThreshold => "<",
        }
    }
}

/// Which stack resource a metric is reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSource {
    Distribution,
    Bucket,
}

/// One row of the alarm table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmDefinition {
    pub logical_id: &'static str,
    pub alarm_name: &'static str,
    pub description: &'static str,
    pub namespace: &'static str,
    pub metric_name: &'static str,
    pub statistic: Statistic,
    pub source: MetricSource,
    pub threshold: f64,
    pub comparison: ComparisonOperator,
    pub evaluation_periods: u32,
    pub period_secs: u64,
}

pub const ALARM_TABLE: [AlarmDefinition; 4] = [
    AlarmDefinition {
        logical_id: "High4XXErrorRateAlarm",
        alarm_name: "CloudFrontHigh4XXErrorRate",
        description: "4XX error rate above 50% for two consecutive 5 minute periods",
        namespace: CLOUDFRONT_NAMESPACE,
        metric_name: "4xxErrorRate",
        statistic: Statistic::Average,
        source: MetricSource::Distribution,
        threshold: 50.0,
        comparison: ComparisonOperator::GreaterThanThreshold,
        evaluation_periods: 2,
        period_secs: 300,
    },
    AlarmDefinition {
        logical_id: "HighLatencyAlarm",
        alarm_name: "CloudFrontHighLatency",
        description: "Origin latency above 2000 ms for two consecutive 5 minute periods",
        namespace: CLOUDFRONT_NAMESPACE,
        metric_name: "OriginLatency",
        statistic: Statistic::Average,
        source: MetricSource::Distribution,
        threshold: 2000.0,
        comparison: ComparisonOperator::GreaterThanThreshold,
        evaluation_periods: 2,
        period_secs: 300,
    },
    AlarmDefinition {
        logical_id: "LowBytesDownloadedAlarm",
        alarm_name: "CloudFrontLowBytesDownloaded",
        description: "Fewer than 1 MB downloaded for two consecutive 5 minute periods",
        namespace: CLOUDFRONT_NAMESPACE,
        metric_name: "BytesDownloaded",
        statistic: Statistic::Sum,
        source: MetricSource::Distribution,
        threshold: 1_000_000.0,
        comparison: ComparisonOperator::LessThanThreshold,
        evaluation_periods: 2,
        period_secs: 300,
    },
    AlarmDefinition {
        logical_id: "BucketSizeAlarm",
        alarm_name: "S3BucketSizeExceeded",
        description: "Bucket size above 1 GB",
        namespace: S3_NAMESPACE,
        metric_name: "BucketSizeBytes",
        statistic: Statistic::Average,
        source: MetricSource::Bucket,
        threshold: 1_000_000_000.0,
        comparison: ComparisonOperator::GreaterThanThreshold,
        evaluation_periods: 1,
        period_secs: 86_400,
    },
];

/// Look up a table row by alarm name.
pub fn alarm_definition(alarm_name: &str) -> Option<&'static AlarmDefinition> {
    ALARM_TABLE.iter().find(|d| d.alarm_name == alarm_name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRef {
    pub namespace: String,
    pub metric_name: String,
    pub statistic: Statistic,
    /// Window length in seconds
    pub period: u64,
    pub dimensions: BTreeMap<String, String>,
}

/// An alarm rule as declared on (and read back from) an alarm resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRule {
    pub alarm_name: String,
    pub alarm_description: String,
    pub metric: MetricRef,
    pub threshold: f64,
    pub comparison_operator: ComparisonOperator,
    pub evaluation_periods: u32,
    pub alarm_actions: Vec<String>,
}

impl AlarmRule {
    /// Rule for a table row with its dimensions and action as tokens.
    pub fn from_definition(def: &AlarmDefinition) -> Self {
        let dimensions = match def.source {
            MetricSource::Distribution => BTreeMap::from([
                (
                    "DistributionId".to_string(),
                    get_att(SITE_DISTRIBUTION, "DistributionId"),
                ),
                ("Region".to_string(), "Global".to_string()),
            ]),
            MetricSource::Bucket => BTreeMap::from([
                ("BucketName".to_string(), get_att(SITE_BUCKET, "BucketName")),
                ("StorageType".to_string(), "StandardStorage".to_string()),
            ]),
        };
        Self {
            alarm_name: def.alarm_name.to_string(),
            alarm_description: def.description.to_string(),
            metric: MetricRef {
                namespace: def.namespace.to_string(),
                metric_name: def.metric_name.to_string(),
                statistic: def.statistic,
                period: def.period_secs,
                dimensions,
            },
            threshold: def.threshold,
            comparison_operator: def.comparison,
            evaluation_periods: def.evaluation_periods,
            alarm_actions: vec![get_att(ALARM_TOPIC, "TopicArn")],
        }
    }

    /// Read the rule back from a provisioned alarm, tokens resolved.
    pub fn from_resource(resource: &ProvisionedResource) -> Result<Self> {
        if resource.kind != ResourceKind::Alarm {
            return Err(SiteError::UnknownAlarm(resource.logical_id.clone()));
        }
        Ok(serde_json::from_value(resource.properties.clone())?)
    }

    pub fn breaches(&self, value: f64) -> bool {
        self.comparison_operator.holds(value, self.threshold)
    }
}

/// The topic every alarm notifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub topic_name: String,
    pub display_name: String,
}

impl NotificationChannel {
    pub fn for_settings(settings: &StackSettings) -> Self {
        Self {
            topic_name: settings.alarm_topic_name.clone(),
            display_name: TOPIC_DISPLAY_NAME.to_string(),
        }
    }
}

fn topic_spec(settings: &StackSettings) -> Result<ResourceSpec> {
    let channel = NotificationChannel::for_settings(settings);
    Ok(ResourceSpec::new(
        ALARM_TOPIC,
        ResourceKind::Topic,
        serde_json::to_value(channel)?,
    ))
}

fn alarm_spec(def: &AlarmDefinition) -> Result<ResourceSpec> {
    let mut properties = serde_json::to_value(AlarmRule::from_definition(def))?;
    properties["treatMissingData"] = json!(TREAT_MISSING_DATA);
    let target = match def.source {
        MetricSource::Distribution => SITE_DISTRIBUTION,
        MetricSource::Bucket => SITE_BUCKET,
    };
    Ok(ResourceSpec::new(def.logical_id, ResourceKind::Alarm, properties)
        .depends_on(ALARM_TOPIC)
        .depends_on(target))
}

/// Topic followed by one alarm per table row.
pub fn monitoring_resources(settings: &StackSettings) -> Result<Vec<ResourceSpec>> {
    let mut specs = vec![topic_spec(settings)?];
    for def in &ALARM_TABLE {
        specs.push(alarm_spec(def)?);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmEvaluator, AlarmState};
    use crate::token::references;

    #[test]
    fn test_table_matches_rule_set() {
        let high_4xx = alarm_definition("CloudFrontHigh4XXErrorRate").unwrap();
        assert_eq!(high_4xx.threshold, 50.0);
        assert_eq!(high_4xx.evaluation_periods, 2);
        assert_eq!(high_4xx.period_secs, 300);

        let low_bytes = alarm_definition("CloudFrontLowBytesDownloaded").unwrap();
        assert_eq!(low_bytes.statistic, Statistic::Sum);
        assert_eq!(low_bytes.comparison, ComparisonOperator::LessThanThreshold);

        let size = alarm_definition("S3BucketSizeExceeded").unwrap();
        assert_eq!(size.evaluation_periods, 1);
        assert_eq!(size.period_secs, 86_400);
        assert_eq!(size.namespace, "AWS/S3");
    }

    #[test]
    fn test_comparison_is_strict() {
        assert!(!ComparisonOperator::GreaterThanThreshold.holds(50.0, 50.0));
        assert!(ComparisonOperator::GreaterThanThreshold.holds(50.1, 50.0));
        assert!(!ComparisonOperator::LessThanThreshold.holds(1_000_000.0, 1_000_000.0));
        assert!(ComparisonOperator::LessThanThreshold.holds(10.0, 1_000_000.0));
    }

    #[test]
    fn test_every_alarm_notifies_the_topic() {
        let specs = monitoring_resources(&StackSettings::default()).unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0].logical_id, ALARM_TOPIC);
        assert_eq!(specs[0].properties["displayName"], TOPIC_DISPLAY_NAME);
        for spec in &specs[1..] {
            assert_eq!(spec.kind, ResourceKind::Alarm);
            assert_eq!(spec.properties["alarmActions"][0], "${AlarmTopic.TopicArn}");
        }
    }

    #[test]
    fn test_missing_data_declaration_matches_evaluator() {
        for spec in &monitoring_resources(&StackSettings::default()).unwrap()[1..] {
            assert_eq!(spec.properties["treatMissingData"], TREAT_MISSING_DATA);
        }

        let mut eval = AlarmEvaluator::new(AlarmRule::from_definition(&ALARM_TABLE[0]));
        for _ in 0..ALARM_TABLE[0].evaluation_periods {
            eval.observe(None);
        }
        assert_eq!(eval.state(), AlarmState::InsufficientData);
    }

    #[test]
    fn test_dimensions_follow_metric_source() {
        let bucket_rule = AlarmRule::from_definition(alarm_definition("S3BucketSizeExceeded").unwrap());
        assert_eq!(bucket_rule.metric.dimensions["StorageType"], "StandardStorage");

        let latency = AlarmRule::from_definition(alarm_definition("CloudFrontHighLatency").unwrap());
        assert_eq!(latency.metric.dimensions["Region"], "Global");
        let value = serde_json::to_value(&latency).unwrap();
        assert!(references(&value)
            .iter()
            .any(|r| r.logical_id == SITE_DISTRIBUTION));
    }

    #[test]
    fn test_rule_round_trips_through_properties() {
        let rule = AlarmRule::from_definition(&ALARM_TABLE[0]);
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["comparisonOperator"], "GreaterThanThreshold");
        assert_eq!(value["metric"]["metricName"], "4xxErrorRate");
        let back: AlarmRule = serde_json::from_value(value).unwrap();
        assert_eq!(back, rule);
    }
}
