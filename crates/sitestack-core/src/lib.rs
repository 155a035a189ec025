//! sitestack core library
//!
//! Decides the hosting topology for a static site, turns it into an ordered
//! construction plan and applies that plan through a
//! [`sitestack_provider::CloudProvider`].

pub mod alarm;
pub mod certificate;
pub mod config;
pub mod construction;
pub mod content;
pub mod error;
pub mod monitoring;
pub mod obs;
pub mod orchestrator;
pub mod pipeline;
pub mod resources;
pub mod telemetry;
pub mod token;
pub mod topology;

pub use alarm::{
    AlarmEvaluator, AlarmSet, AlarmState, AlarmTransition, Notification, NotificationSink,
    RecordingSink,
};
pub use config::{Secret, SiteConfiguration, SiteFile, StackSettings};
pub use construction::{build_plan, ConstructionPlan, PlannedStep};
pub use error::{Result, SiteError};
pub use monitoring::{
    alarm_definition, AlarmDefinition, AlarmRule, ComparisonOperator, NotificationChannel,
    ALARM_TABLE,
};
pub use orchestrator::{ApplyReport, Orchestrator, StackOutputs, StepReport, TeardownReport};
pub use pipeline::{
    ActionDefinition, ActionKind, BuildSpec, PipelineDefinition, RunOrderGroup, StageDefinition,
};
pub use topology::{plan, CustomDomain, GitSource, Topology, TopologyMode};

pub use obs::StackSpan;
pub use telemetry::init_tracing;

/// sitestack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
