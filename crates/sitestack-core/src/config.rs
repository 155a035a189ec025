//! Site configuration and stack settings.
//!
//! A site file is TOML with the site keys at the top level and an optional
//! `[stack]` table:
//!
//! ```toml
//! domainName = "example.com"
//! siteSubDomain = "www"
//! repoOwner = "octo"
//! repoName = "blog"
//! accessToken = "ghp_..."
//!
//! [stack]
//! region = "eu-west-2"
//! content_dir = "public"
//! ```
//!
//! Every site key is optional. Empty strings are treated as absent.

use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, SiteError};

/// A credential that never shows up in logs or serialized output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Only the source fetch should ever need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

/// Operator input describing the site. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfiguration {
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default, alias = "subDomain")]
    pub site_sub_domain: Option<String>,
    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default, alias = "gitHubToken")]
    pub access_token: Option<Secret>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl SiteConfiguration {
    pub fn domain_name(&self) -> Option<&str> {
        present(&self.domain_name)
    }

    pub fn site_sub_domain(&self) -> Option<&str> {
        present(&self.site_sub_domain)
    }

    pub fn repo_owner(&self) -> Option<&str> {
        present(&self.repo_owner)
    }

    pub fn repo_name(&self) -> Option<&str> {
        present(&self.repo_name)
    }

    pub fn access_token(&self) -> Option<&Secret> {
        self.access_token.as_ref().filter(|t| !t.is_empty())
    }

    /// `sub.domain` when both are present, `domain` alone when only the
    /// domain is present, otherwise `None`. A sub domain without a domain is
    /// ignored.
    pub fn effective_domain(&self) -> Option<String> {
        let domain = self.domain_name()?;
        Some(match self.site_sub_domain() {
            Some(sub) => format!("{}.{}", sub, domain),
            None => domain.to_string(),
        })
    }

    /// Field-wise override: every field present in `overrides` wins.
    pub fn merged_with(&self, overrides: &SiteConfiguration) -> SiteConfiguration {
        fn pick<T: Clone>(over: &Option<T>, base: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }
        SiteConfiguration {
            domain_name: pick(&overrides.domain_name, &self.domain_name),
            site_sub_domain: pick(&overrides.site_sub_domain, &self.site_sub_domain),
            repo_owner: pick(&overrides.repo_owner, &self.repo_owner),
            repo_name: pick(&overrides.repo_name, &self.repo_name),
            access_token: pick(&overrides.access_token, &self.access_token),
        }
    }
}

/// Fixed-shape stack settings. None of these influence the topology mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    pub name: String,
    pub region: String,
    /// Local directory synced into the bucket at the end of every apply
    pub content_dir: String,
    pub pipeline_name: String,
    pub branch: String,
    pub build_image: String,
    pub alarm_topic_name: String,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            name: "StaticSite".to_string(),
            region: "eu-west-1".to_string(),
            content_dir: "public".to_string(),
            pipeline_name: "StaticSitePipeline".to_string(),
            branch: "main".to_string(),
            build_image: "aws/codebuild/standard:5.0".to_string(),
            alarm_topic_name: "static-site-alarms".to_string(),
        }
    }
}

/// On-disk site file: site keys plus an optional `[stack]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SiteFile {
    #[serde(flatten)]
    pub site: SiteConfiguration,
    #[serde(default)]
    pub stack: StackSettings,
}

impl SiteFile {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SiteError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SiteError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(domain: Option<&str>, sub: Option<&str>) -> SiteConfiguration {
        SiteConfiguration {
            domain_name: domain.map(str::to_string),
            site_sub_domain: sub.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_effective_domain_with_sub_domain() {
        let cfg = config(Some("example.com"), Some("www"));
        assert_eq!(cfg.effective_domain().as_deref(), Some("www.example.com"));
    }

    #[test]
    fn test_effective_domain_without_sub_domain() {
        let cfg = config(Some("example.com"), None);
        assert_eq!(cfg.effective_domain().as_deref(), Some("example.com"));
    }

    #[test]
    fn test_effective_domain_requires_domain() {
        assert_eq!(config(None, Some("www")).effective_domain(), None);
        assert_eq!(config(None, None).effective_domain(), None);
    }

    #[test]
    fn test_empty_strings_are_absent() {
        assert_eq!(config(Some(""), Some("www")).effective_domain(), None);
        assert_eq!(
            config(Some("example.com"), Some("")).effective_domain().as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("ghp_supersecret");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"***\"");
        assert_eq!(secret.expose(), "ghp_supersecret");
    }

    #[test]
    fn test_merge_overrides_present_fields_only() {
        let base = SiteConfiguration {
            domain_name: Some("example.com".to_string()),
            repo_owner: Some("octo".to_string()),
            ..Default::default()
        };
        let overrides = SiteConfiguration {
            repo_owner: Some("someone-else".to_string()),
            repo_name: Some("blog".to_string()),
            ..Default::default()
        };
        let merged = base.merged_with(&overrides);
        assert_eq!(merged.domain_name(), Some("example.com"));
        assert_eq!(merged.repo_owner(), Some("someone-else"));
        assert_eq!(merged.repo_name(), Some("blog"));
    }

    #[test]
    fn test_site_file_parses_camel_case_keys() {
        let file = SiteFile::from_toml_str(
            r#"
            domainName = "example.com"
            siteSubDomain = "www"
            repoOwner = "octo"
            repoName = "blog"
            accessToken = "token"

            [stack]
            region = "eu-west-2"
            "#,
        )
        .expect("parse");
        assert_eq!(file.site.effective_domain().as_deref(), Some("www.example.com"));
        assert_eq!(file.site.access_token().map(Secret::expose), Some("token"));
        assert_eq!(file.stack.region, "eu-west-2");
        assert_eq!(file.stack.branch, "main");
    }

    #[test]
    fn test_site_file_all_optional() {
        let file = SiteFile::from_toml_str("").expect("parse");
        assert_eq!(file.site, SiteConfiguration::default());
        assert_eq!(file.stack, StackSettings::default());
    }

    #[test]
    fn test_site_file_rejects_bad_toml() {
        let err = SiteFile::from_toml_str("domainName = ").unwrap_err();
        assert!(matches!(err, SiteError::Config(_)));
    }
}
