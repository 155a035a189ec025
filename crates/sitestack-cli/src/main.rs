//! sitestack - static site hosting topology CLI
//!
//! The `sitestack` command plans, provisions and operates one static site
//! stack against a local provider state file.
//!
//! ## Commands
//!
//! - `plan`: Show the construction plan, optionally diffed against state
//! - `apply`: Provision the stack and print its outputs
//! - `outputs`: Print the outputs of the applied stack
//! - `destroy`: Tear the stack down
//! - `pipeline run`: Run the deployment pipeline against a local checkout
//! - `alarms evaluate`: Feed metric windows through the stack's alarms

mod state;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use sitestack_core::resources::PIPELINE;
use sitestack_core::{
    build_plan, AlarmRule, AlarmSet, ConstructionPlan, NotificationChannel, Orchestrator,
    PipelineDefinition, RecordingSink, Secret, SiteConfiguration, SiteFile, StackSettings,
    ALARM_TABLE,
};
use sitestack_pipeline::{
    ActionStatus, CommandRunner, LocalSource, OrderingAudit, PipelineExecutor, RunTrigger,
};
use sitestack_provider::{Change, CloudProvider};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "sitestack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Static site hosting: storage, edge distribution, pipeline and alarms", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Site file (TOML); ignored when it does not exist
    #[arg(short, long, global = true, default_value = "sitestack.toml")]
    config: PathBuf,

    /// Provider state file
    #[arg(long, global = true, default_value = ".sitestack/state.json")]
    state: PathBuf,

    #[command(flatten)]
    site: SiteArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Site keys. Each one, when given, overrides the site file.
#[derive(Args, Debug, Default)]
struct SiteArgs {
    /// Apex domain, e.g. example.com
    #[arg(long, global = true, env = "SITESTACK_DOMAIN_NAME")]
    domain_name: Option<String>,

    /// Label prepended to the domain, e.g. www
    #[arg(long, global = true, env = "SITESTACK_SUB_DOMAIN")]
    sub_domain: Option<String>,

    /// Owner of the source repository
    #[arg(long, global = true, env = "SITESTACK_REPO_OWNER")]
    repo_owner: Option<String>,

    /// Name of the source repository
    #[arg(long, global = true, env = "SITESTACK_REPO_NAME")]
    repo_name: Option<String>,

    /// Token used by the pipeline to read the repository
    #[arg(long, global = true, env = "SITESTACK_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

impl SiteArgs {
    fn overrides(&self) -> SiteConfiguration {
        SiteConfiguration {
            domain_name: self.domain_name.clone(),
            site_sub_domain: self.sub_domain.clone(),
            repo_owner: self.repo_owner.clone(),
            repo_name: self.repo_name.clone(),
            access_token: self.access_token.clone().map(Secret::new),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the construction plan without touching any state
    Plan {
        /// Predict the change for every step against the current state
        #[arg(long)]
        diff: bool,
    },

    /// Provision the stack and print its outputs
    Apply {
        /// Hosted zone that exists in the account (repeatable)
        #[arg(long = "zone")]
        zones: Vec<String>,

        /// Directory the stack's content_dir is resolved against
        #[arg(long, default_value = ".")]
        content_root: PathBuf,
    },

    /// Print the outputs of the applied stack as JSON
    Outputs,

    /// Delete every resource of the stack
    Destroy,

    /// Deployment pipeline operations
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },

    /// Alarm operations
    Alarms {
        #[command(subcommand)]
        action: AlarmsAction,
    },
}

#[derive(Subcommand)]
enum PipelineAction {
    /// Run the provisioned pipeline once
    Run {
        /// Local checkout root; `<source>/<owner>/<repo>` is used when present
        #[arg(long)]
        source: PathBuf,

        /// Directory for run artifacts
        #[arg(long, default_value = ".sitestack/runs")]
        work_dir: PathBuf,

        /// Per-command timeout in seconds
        #[arg(long, default_value = "900")]
        timeout_secs: u64,
    },
}

#[derive(Subcommand)]
enum AlarmsAction {
    /// Feed metric windows (JSON: alarm name -> [value|null, ...]) through the alarms
    Evaluate {
        #[arg(long)]
        datapoints: PathBuf,
    },
}

/// Resolved configuration for one invocation.
struct Stack {
    config: SiteConfiguration,
    settings: StackSettings,
}

impl Stack {
    fn plan(&self) -> Result<ConstructionPlan> {
        build_plan(&self.config, &self.settings).context("Failed to build construction plan")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sitestack_core::init_tracing(cli.json, level);

    let stack = load_stack(&cli.config, &cli.site)?;

    match cli.command {
        Commands::Plan { diff } => cmd_plan(&stack, &cli.state, diff).await,
        Commands::Apply {
            zones,
            content_root,
        } => cmd_apply(&stack, &cli.state, &zones, &content_root).await,
        Commands::Outputs => cmd_outputs(&stack, &cli.state).await,
        Commands::Destroy => cmd_destroy(&stack, &cli.state).await,
        Commands::Pipeline { action } => match action {
            PipelineAction::Run {
                source,
                work_dir,
                timeout_secs,
            } => cmd_pipeline_run(&cli.state, &source, &work_dir, timeout_secs).await,
        },
        Commands::Alarms { action } => match action {
            AlarmsAction::Evaluate { datapoints } => {
                cmd_alarms_evaluate(&stack, &cli.state, &datapoints).await
            }
        },
    }
}

fn load_stack(config_path: &Path, site: &SiteArgs) -> Result<Stack> {
    let file = if config_path.exists() {
        SiteFile::load(config_path)
            .with_context(|| format!("Failed to load site file: {:?}", config_path))?
    } else {
        SiteFile::default()
    };
    Ok(Stack {
        config: file.site.merged_with(&site.overrides()),
        settings: file.stack,
    })
}

fn change_label(change: Option<Change>) -> &'static str {
    match change {
        None => "lookup",
        Some(Change::Created) => "create",
        Some(Change::Updated) => "update",
        Some(Change::Replaced) => "replace",
        Some(Change::Unchanged) => "unchanged",
        Some(Change::Deleted) => "delete",
    }
}

async fn cmd_plan(stack: &Stack, state_path: &Path, diff: bool) -> Result<()> {
    let plan = stack.plan()?;

    println!("Stack: {} ({} mode)", plan.stack_name, plan.mode);
    if let Some(domain) = &plan.effective_domain {
        println!("Domain: {}", domain);
    }
    println!();

    if diff {
        let provider = Arc::new(state::load_provider(state_path)?);
        let changes = Orchestrator::new(provider)
            .diff(&plan)
            .await
            .context("Failed to diff plan against state")?;
        for step in &changes {
            println!("  {:<10} {}", change_label(step.change), step.logical_id);
        }
        let pending = changes
            .iter()
            .filter(|s| matches!(s.change, Some(c) if c != Change::Unchanged))
            .count();
        println!();
        println!("{} of {} step(s) would change", pending, changes.len());
    } else {
        for (index, step) in plan.steps.iter().enumerate() {
            let kind = step
                .kind()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "zone lookup".to_string());
            println!("  {:>2}. {:<26} {}", index + 1, step.logical_id(), kind);
        }
    }
    Ok(())
}

async fn cmd_apply(
    stack: &Stack,
    state_path: &Path,
    zones: &[String],
    content_root: &Path,
) -> Result<()> {
    let plan = stack.plan()?;
    let provider = Arc::new(state::load_provider(state_path)?);
    for zone in zones {
        provider.add_zone(zone.as_str());
    }

    let orchestrator = Orchestrator::new(provider.clone()).with_content_root(content_root);
    let result = orchestrator.apply(&plan).await;

    // Whatever was provisioned before a failure stays provisioned.
    state::save_provider(state_path, &provider)?;
    let report = result.context("Apply failed")?;

    for step in &report.steps {
        println!("  {:<10} {:<26} {}", change_label(step.change), step.logical_id, step.physical_id);
    }
    println!();
    println!(
        "{} changed, {} unchanged ({}ms)",
        report.changed(),
        report.unchanged(),
        report.duration_ms
    );
    println!("{}", serde_json::to_string_pretty(&report.outputs)?);
    Ok(())
}

async fn cmd_outputs(stack: &Stack, state_path: &Path) -> Result<()> {
    let plan = stack.plan()?;
    let provider = Arc::new(state::load_provider(state_path)?);
    let outputs = Orchestrator::new(provider)
        .outputs(&plan)
        .await
        .context("Stack has not been applied")?;
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

async fn cmd_destroy(stack: &Stack, state_path: &Path) -> Result<()> {
    let plan = stack.plan()?;
    let provider = Arc::new(state::load_provider(state_path)?);
    let result = Orchestrator::new(provider.clone()).teardown(&plan).await;
    state::save_provider(state_path, &provider)?;
    let report = result.context("Teardown failed")?;

    for logical_id in &report.deleted {
        println!("  deleted  {}", logical_id);
    }
    println!();
    println!(
        "{} deleted, {} already absent",
        report.deleted.len(),
        report.missing.len()
    );
    Ok(())
}

async fn cmd_pipeline_run(
    state_path: &Path,
    source: &Path,
    work_dir: &Path,
    timeout_secs: u64,
) -> Result<()> {
    let provider = Arc::new(state::load_provider(state_path)?);
    let resource = provider
        .describe(PIPELINE)
        .await?
        .context("No pipeline is provisioned; apply a complete configuration first")?;
    let definition = PipelineDefinition::from_resource(&resource)?;

    println!("Running pipeline: {}", definition.name);
    println!("Source: {:?}", source);
    println!();

    let executor = PipelineExecutor::new(
        provider.clone(),
        Arc::new(LocalSource::new(source)),
        work_dir,
    )
    .with_runner(CommandRunner::new(Duration::from_secs(timeout_secs)));
    let result = executor
        .run(&definition, RunTrigger::Manual)
        .await
        .context("Pipeline failed to start")?;
    state::save_provider(state_path, &provider)?;

    println!("Run ID: {}", result.run_id);
    if let Some(revision) = result.source_revision() {
        println!("Revision: {}", revision);
    }
    println!("Status: {}", if result.success { "✓ PASSED" } else { "✗ FAILED" });
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for stage in &result.stages {
        println!("  {} ({:?})", stage.name, stage.status);
        for action in &stage.actions {
            let mark = match action.status {
                ActionStatus::Succeeded => "✓",
                ActionStatus::Failed => "✗",
                ActionStatus::NotExecuted => "-",
            };
            println!(
                "    {} {} [run order {}] {}",
                mark,
                action.name,
                action.run_order,
                action.message.as_deref().unwrap_or("")
            );
        }
    }

    let verdict = OrderingAudit::evaluate(&definition, &result.events);
    println!();
    println!("Ordering: {}", if verdict.passed { "✓ PASSED" } else { "✗ FAILED" });
    for violation in &verdict.violations {
        println!("  - {}", violation);
    }

    if result.success && verdict.passed {
        info!(run_id = %result.run_id, "pipeline run complete");
        Ok(())
    } else {
        anyhow::bail!("Pipeline run failed")
    }
}

async fn cmd_alarms_evaluate(stack: &Stack, state_path: &Path, datapoints: &Path) -> Result<()> {
    let provider = state::load_provider(state_path)?;
    let mut rules = Vec::new();
    for definition in ALARM_TABLE.iter() {
        if let Some(resource) = provider.describe(definition.logical_id).await? {
            rules.push(AlarmRule::from_resource(&resource)?);
        }
    }
    if rules.is_empty() {
        anyhow::bail!("No alarms are provisioned; apply a complete configuration first");
    }

    let windows: BTreeMap<String, Vec<Option<f64>>> = read_json_file(datapoints)?;
    let sink = Arc::new(RecordingSink::new());
    let mut alarms = AlarmSet::new(
        NotificationChannel::for_settings(&stack.settings),
        rules,
        sink.clone(),
    );

    for (alarm_name, values) in &windows {
        for value in values {
            if let Some(transition) = alarms
                .observe(alarm_name, *value)
                .await
                .with_context(|| format!("Cannot evaluate '{}'", alarm_name))?
            {
                println!(
                    "  {}: {} -> {}",
                    transition.alarm_name, transition.from, transition.to
                );
            }
        }
    }

    println!();
    for (alarm_name, state) in alarms.states() {
        println!("  {:<32} {}", alarm_name, state);
    }
    for notification in sink.published() {
        println!("Notified {}: {}", notification.topic, notification.subject);
    }
    Ok(())
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}
