//! Per-rule alarm state machines.
//!
//! Each [`AlarmEvaluator`] owns the window history of exactly one rule.
//! Windows are fed in time order; a window without data counts as
//! non-breaching. There is no state shared between rules.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};
use crate::monitoring::{AlarmRule, NotificationChannel};
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    InsufficientData,
    Ok,
    Alarm,
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmState::InsufficientData => write!(f, "INSUFFICIENT_DATA"),
            AlarmState::Ok => write!(f, "OK"),
            AlarmState::Alarm => write!(f, "ALARM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmTransition {
    pub alarm_name: String,
    pub from: AlarmState,
    pub to: AlarmState,
    /// Zero-based index of the window that caused the transition
    pub window: u64,
}

/// Message published to the notification channel when an alarm fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub topic: String,
    pub alarm_name: String,
    pub subject: String,
    pub message: String,
    pub published_at: DateTime<Utc>,
}

/// Where alarm notifications go.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<()>;
}

/// Sink that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Notification> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, notification: Notification) -> Result<()> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}

/// State machine for one alarm rule.
#[derive(Debug, Clone)]
pub struct AlarmEvaluator {
    rule: AlarmRule,
    state: AlarmState,
    windows: VecDeque<Option<f64>>,
    seen: u64,
}

impl AlarmEvaluator {
    pub fn new(rule: AlarmRule) -> Self {
        let capacity = rule.evaluation_periods.max(1) as usize;
        Self {
            rule,
            state: AlarmState::InsufficientData,
            windows: VecDeque::with_capacity(capacity),
            seen: 0,
        }
    }

    pub fn rule(&self) -> &AlarmRule {
        &self.rule
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Feed the next evaluation window. Returns the transition if the state
    /// changed.
    pub fn observe(&mut self, value: Option<f64>) -> Option<AlarmTransition> {
        let range = self.rule.evaluation_periods.max(1) as usize;
        if self.windows.len() == range {
            self.windows.pop_front();
        }
        self.windows.push_back(value);
        let window = self.seen;
        self.seen += 1;

        let next = if self.windows.len() < range || self.windows.iter().all(Option::is_none) {
            AlarmState::InsufficientData
        } else if self
            .windows
            .iter()
            .all(|w| w.is_some_and(|v| self.rule.breaches(v)))
        {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        };

        if next == self.state {
            return None;
        }
        let transition = AlarmTransition {
            alarm_name: self.rule.alarm_name.clone(),
            from: self.state,
            to: next,
            window,
        };
        self.state = next;
        obs::emit_alarm_transition(&transition);
        Some(transition)
    }
}

/// One independent evaluator per rule, all notifying the same channel.
pub struct AlarmSet {
    channel: NotificationChannel,
    evaluators: BTreeMap<String, AlarmEvaluator>,
    sink: Arc<dyn NotificationSink>,
}

impl AlarmSet {
    pub fn new(
        channel: NotificationChannel,
        rules: impl IntoIterator<Item = AlarmRule>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let evaluators = rules
            .into_iter()
            .map(|rule| (rule.alarm_name.clone(), AlarmEvaluator::new(rule)))
            .collect();
        Self {
            channel,
            evaluators,
            sink,
        }
    }

    pub fn state(&self, alarm_name: &str) -> Option<AlarmState> {
        self.evaluators.get(alarm_name).map(AlarmEvaluator::state)
    }

    pub fn states(&self) -> BTreeMap<String, AlarmState> {
        self.evaluators
            .iter()
            .map(|(name, eval)| (name.clone(), eval.state()))
            .collect()
    }

    /// Feed a window to one rule, publishing if it enters `Alarm`.
    pub async fn observe(
        &mut self,
        alarm_name: &str,
        value: Option<f64>,
    ) -> Result<Option<AlarmTransition>> {
        let evaluator = self
            .evaluators
            .get_mut(alarm_name)
            .ok_or_else(|| SiteError::UnknownAlarm(alarm_name.to_string()))?;
        let transition = evaluator.observe(value);

        if let Some(t) = &transition {
            if t.to == AlarmState::Alarm {
                let rule = evaluator.rule();
                let notification = Notification {
                    topic: self.channel.topic_name.clone(),
                    alarm_name: t.alarm_name.clone(),
                    subject: format!("ALARM: \"{}\"", t.alarm_name),
                    message: format!(
                        "{} ({} {} {} for {} period(s))",
                        rule.alarm_description,
                        rule.metric.metric_name,
                        rule.comparison_operator.symbol(),
                        rule.threshold,
                        rule.evaluation_periods,
                    ),
                    published_at: Utc::now(),
                };
                self.sink.publish(notification).await?;
            }
        }
        Ok(transition)
    }
}
