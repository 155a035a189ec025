//! Deployment pipeline declaration.
//!
//! A pipeline is an ordered list of stages; a stage holds actions, and each
//! action carries a `run_order`. Stages run strictly one after the other.
//! Inside a stage, actions sharing a run order may run together, and a
//! higher run order waits for every lower one to finish.
//!
//! The site pipeline is `Source -> Build -> Deploy`, with the deploy stage
//! uploading the build output (run order 1) before invalidating the edge
//! cache (run order 2). The invalidation runs under a role whose only grant
//! is `cloudfront:CreateInvalidation` on this stack's distribution.
//!
//! Execution lives in the `sitestack-pipeline` crate; this module only
//! describes the shape and declares the backing resources.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sitestack_provider::{
    ContentDigest, PolicyStatement, ProvisionedResource, ResourceKind, ResourceSpec,
    CREATE_INVALIDATION_ACTION,
};

use crate::config::StackSettings;
use crate::error::{Result, SiteError};
use crate::resources::{
    BUILD_PROJECT, INVALIDATE_ALL_PATHS, INVALIDATE_PROJECT, INVALIDATE_ROLE, PIPELINE,
    SITE_BUCKET, SITE_DISTRIBUTION,
};
use crate::token::get_att;
use crate::topology::GitSource;

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build";
pub const DEPLOY_STAGE: &str = "Deploy";

pub const SOURCE_ACTION: &str = "GitHub_Source";
pub const BUILD_ACTION: &str = "Build";
pub const DEPLOY_ACTION: &str = "DeployArtifact";
pub const INVALIDATE_ACTION: &str = "InvalidateCache";

pub const SOURCE_ARTIFACT: &str = "SourceOutput";
pub const BUILD_ARTIFACT: &str = "BuildOutput";

/// Declarative build specification, rendered as a CodeBuild buildspec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub version: String,
    #[serde(default)]
    pub runtime_versions: BTreeMap<String, String>,
    #[serde(default)]
    pub install_commands: Vec<String>,
    #[serde(default)]
    pub build_commands: Vec<String>,
    /// Directory (relative to the source root) holding the build output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_base_directory: Option<String>,
}

impl BuildSpec {
    /// Install the CDK CLI and dependencies, build, test. Output lands in
    /// `dist`.
    pub fn site() -> Self {
        Self {
            version: "0.2".to_string(),
            runtime_versions: BTreeMap::from([("nodejs".to_string(), "14".to_string())]),
            install_commands: vec!["npm install -g aws-cdk".to_string(), "npm install".to_string()],
            build_commands: vec!["npm run build".to_string(), "npm run test".to_string()],
            artifact_base_directory: Some("dist".to_string()),
        }
    }

    /// Single CLI call invalidating every path on `$CLOUDFRONT_ID`.
    pub fn invalidation() -> Self {
        Self {
            version: "0.2".to_string(),
            runtime_versions: BTreeMap::new(),
            install_commands: Vec::new(),
            build_commands: vec![format!(
                "aws cloudfront create-invalidation --distribution-id ${{CLOUDFRONT_ID}} --paths \"{}\"",
                INVALIDATE_ALL_PATHS
            )],
            artifact_base_directory: None,
        }
    }

    /// Install commands followed by build commands, in execution order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.install_commands
            .iter()
            .chain(self.build_commands.iter())
            .map(String::as_str)
    }

    /// Render as a buildspec document.
    pub fn to_document(&self) -> Value {
        let mut phases = serde_json::Map::new();
        if !self.install_commands.is_empty() || !self.runtime_versions.is_empty() {
            let mut install = json!({ "commands": self.install_commands });
            if !self.runtime_versions.is_empty() {
                install["runtime-versions"] = json!(self.runtime_versions);
            }
            phases.insert("install".to_string(), install);
        }
        phases.insert("build".to_string(), json!({ "commands": self.build_commands }));

        let mut doc = json!({ "version": self.version, "phases": phases });
        if let Some(base) = &self.artifact_base_directory {
            doc["artifacts"] = json!({ "base-directory": base, "files": ["**/*"] });
        }
        doc
    }
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Fetch a branch of a hosted repository.
    GitHubSource {
        owner: String,
        repo: String,
        branch: String,
        output: String,
        /// Short digest of the access token; changes when the token rotates
        oauth_token_digest: String,
    },
    /// Run a build specification against an input artifact.
    CodeBuild {
        project_name: String,
        input: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        spec: BuildSpec,
    },
    /// Upload an artifact into a bucket.
    S3Deploy { bucket_name: String, input: String },
    /// Invalidate cached paths under a scoped role.
    Invalidate {
        project_name: String,
        distribution_id: String,
        paths: Vec<String>,
        role_arn: String,
    },
}

impl ActionKind {
    pub fn input(&self) -> Option<&str> {
        match self {
            ActionKind::GitHubSource { .. } | ActionKind::Invalidate { .. } => None,
            ActionKind::CodeBuild { input, .. } | ActionKind::S3Deploy { input, .. } => {
                Some(input.as_str())
            }
        }
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            ActionKind::GitHubSource { output, .. } => Some(output.as_str()),
            ActionKind::CodeBuild { output, .. } => output.as_deref(),
            ActionKind::S3Deploy { .. } | ActionKind::Invalidate { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub run_order: u32,
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// Actions of one stage that share a run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOrderGroup<'a> {
    pub run_order: u32,
    pub actions: Vec<&'a ActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub actions: Vec<ActionDefinition>,
}

impl StageDefinition {
    /// Actions grouped by run order, lowest first. Declaration order is kept
    /// inside a group.
    pub fn run_order_groups(&self) -> Vec<RunOrderGroup<'_>> {
        let mut groups: BTreeMap<u32, Vec<&ActionDefinition>> = BTreeMap::new();
        for action in &self.actions {
            groups.entry(action.run_order).or_default().push(action);
        }
        groups
            .into_iter()
            .map(|(run_order, actions)| RunOrderGroup { run_order, actions })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDefinition> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .find(|a| a.name == name)
    }

    /// Check structural invariants.
    ///
    /// Every input artifact must be produced by an earlier stage or by a
    /// lower run order in the same stage.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SiteError::InvalidPipeline(msg));

        if self.name.is_empty() {
            return invalid("pipeline name is empty".to_string());
        }
        if self.stages.is_empty() {
            return invalid(format!("pipeline '{}' has no stages", self.name));
        }

        let mut stage_names = BTreeSet::new();
        let mut action_names = BTreeSet::new();
        let mut artifacts: BTreeSet<&str> = BTreeSet::new();

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return invalid(format!("duplicate stage '{}'", stage.name));
            }
            if stage.actions.is_empty() {
                return invalid(format!("stage '{}' has no actions", stage.name));
            }
            for group in stage.run_order_groups() {
                if group.run_order == 0 {
                    return invalid(format!("stage '{}' has an action with run order 0", stage.name));
                }
                for action in &group.actions {
                    if !action_names.insert(action.name.as_str()) {
                        return invalid(format!("duplicate action '{}'", action.name));
                    }
                    if let Some(input) = action.kind.input() {
                        if !artifacts.contains(input) {
                            return invalid(format!(
                                "action '{}' consumes '{}' before it is produced",
                                action.name, input
                            ));
                        }
                    }
                }
                for action in &group.actions {
                    if let Some(output) = action.kind.output() {
                        if !artifacts.insert(output) {
                            return invalid(format!("artifact '{}' produced twice", output));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Recover the definition from a provisioned pipeline resource.
    pub fn from_resource(resource: &ProvisionedResource) -> Result<Self> {
        if resource.kind != ResourceKind::Pipeline {
            return Err(SiteError::InvalidPipeline(format!(
                "'{}' is a {}, not a pipeline",
                resource.logical_id, resource.kind
            )));
        }
        let definition = resource
            .properties
            .get("definition")
            .cloned()
            .ok_or_else(|| {
                SiteError::InvalidPipeline(format!("'{}' has no definition", resource.logical_id))
            })?;
        Ok(serde_json::from_value(definition)?)
    }
}

/// The `Source -> Build -> Deploy` pipeline for a site.
///
/// Resource-assigned values are tokens; they are resolved when the pipeline
/// resource is provisioned.
pub fn site_pipeline(source: &GitSource, settings: &StackSettings) -> PipelineDefinition {
    let token_digest = ContentDigest::from_bytes(source.token.expose().as_bytes());
    PipelineDefinition {
        name: settings.pipeline_name.clone(),
        stages: vec![
            StageDefinition {
                name: SOURCE_STAGE.to_string(),
                actions: vec![ActionDefinition {
                    name: SOURCE_ACTION.to_string(),
                    run_order: 1,
                    kind: ActionKind::GitHubSource {
                        owner: source.owner.clone(),
                        repo: source.repo.clone(),
                        branch: settings.branch.clone(),
                        output: SOURCE_ARTIFACT.to_string(),
                        oauth_token_digest: token_digest.short().to_string(),
                    },
                }],
            },
            StageDefinition {
                name: BUILD_STAGE.to_string(),
                actions: vec![ActionDefinition {
                    name: BUILD_ACTION.to_string(),
                    run_order: 1,
                    kind: ActionKind::CodeBuild {
                        project_name: get_att(BUILD_PROJECT, "Name"),
                        input: SOURCE_ARTIFACT.to_string(),
                        output: Some(BUILD_ARTIFACT.to_string()),
                        spec: BuildSpec::site(),
                    },
                }],
            },
            StageDefinition {
                name: DEPLOY_STAGE.to_string(),
                actions: vec![
                    ActionDefinition {
                        name: DEPLOY_ACTION.to_string(),
                        run_order: 1,
                        kind: ActionKind::S3Deploy {
                            bucket_name: get_att(SITE_BUCKET, "BucketName"),
                            input: BUILD_ARTIFACT.to_string(),
                        },
                    },
                    ActionDefinition {
                        name: INVALIDATE_ACTION.to_string(),
                        run_order: 2,
                        kind: ActionKind::Invalidate {
                            project_name: get_att(INVALIDATE_PROJECT, "Name"),
                            distribution_id: get_att(SITE_DISTRIBUTION, "DistributionId"),
                            paths: vec![INVALIDATE_ALL_PATHS.to_string()],
                            role_arn: get_att(INVALIDATE_ROLE, "Arn"),
                        },
                    },
                ],
            },
        ],
    }
}

fn build_project(settings: &StackSettings) -> ResourceSpec {
    ResourceSpec::new(
        BUILD_PROJECT,
        ResourceKind::BuildProject,
        json!({
            "buildSpec": BuildSpec::site().to_document(),
            "environment": { "buildImage": settings.build_image },
        }),
    )
}

/// Role for the invalidation project: one grant, one distribution.
fn invalidate_role() -> ResourceSpec {
    let policy = vec![PolicyStatement {
        actions: vec![CREATE_INVALIDATION_ACTION.to_string()],
        resources: vec![get_att(SITE_DISTRIBUTION, "Arn")],
    }];
    ResourceSpec::new(
        INVALIDATE_ROLE,
        ResourceKind::Role,
        json!({
            "assumedBy": "codebuild.amazonaws.com",
            "policy": policy,
        }),
    )
    .depends_on(SITE_DISTRIBUTION)
}

fn invalidate_project(settings: &StackSettings) -> ResourceSpec {
    ResourceSpec::new(
        INVALIDATE_PROJECT,
        ResourceKind::BuildProject,
        json!({
            "buildSpec": BuildSpec::invalidation().to_document(),
            "environment": {
                "buildImage": settings.build_image,
                "variables": { "CLOUDFRONT_ID": get_att(SITE_DISTRIBUTION, "DistributionId") },
            },
            "roleArn": get_att(INVALIDATE_ROLE, "Arn"),
        }),
    )
    .depends_on(INVALIDATE_ROLE)
}

fn pipeline_resource(definition: &PipelineDefinition) -> ResourceSpec {
    ResourceSpec::new(
        PIPELINE,
        ResourceKind::Pipeline,
        json!({
            "pipelineName": definition.name,
            "definition": definition,
        }),
    )
    .depends_on(BUILD_PROJECT)
    .depends_on(INVALIDATE_PROJECT)
    .depends_on(SITE_BUCKET)
}

/// Resources backing the site pipeline, in dependency order.
pub fn pipeline_resources(source: &GitSource, settings: &StackSettings) -> Vec<ResourceSpec> {
    let definition = site_pipeline(source, settings);
    vec![
        build_project(settings),
        invalidate_role(),
        invalidate_project(settings),
        pipeline_resource(&definition),
    ]
}
