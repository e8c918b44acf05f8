use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use mailtunnel_alias::{Resolver, StaticFacts};
use mailtunnel_common::{internal, logging::LogConfig, sanity::SanityConfig};
use mailtunnel_forward::{DeliverySink, DirectorySink, Forwarder, LogSink};
use serde::Deserialize;

use crate::{organisation::Organisation, service::Service};

pub const CONFIG_ENV: &str = "MAILTUNNEL_CONFIG";

/// Where forwarded messages end up
#[derive(Clone, Debug, Default, Deserialize)]
pub enum SinkConfig {
    /// Print every message
    #[default]
    Log,
    /// Write every delivery to `path`
    Directory { path: PathBuf },
}

impl SinkConfig {
    pub fn build(&self) -> Arc<dyn DeliverySink> {
        match self {
            Self::Log => Arc::new(LogSink),
            Self::Directory { path } => Arc::new(DirectorySink::new(path)),
        }
    }
}

/// The organisation the forwarder serves
#[derive(Clone, Debug, Deserialize)]
pub struct OrganisationConfig {
    /// Only recipients in this domain are resolved
    pub domain: String,

    /// Subjects are tagged `[<tag>] `
    #[serde(default = "default_subject_tag")]
    pub subject_tag: String,

    /// Used when the fact source knows of no administrators
    #[serde(default)]
    pub admins: Vec<String>,

    /// Used when the current period has never been read
    #[serde(default)]
    pub fallback_period: Option<i32>,

    /// Local part of the envelope sender of every group delivery
    #[serde(default = "default_bounce_local_part")]
    pub bounce_local_part: String,

    /// Messages that could not be handled are kept here
    #[serde(default = "default_error_directory")]
    pub error_directory: PathBuf,
}

fn default_subject_tag() -> String {
    String::from("TK")
}

fn default_bounce_local_part() -> String {
    String::from("admin")
}

fn default_error_directory() -> PathBuf {
    PathBuf::from("error")
}

fn default_hostname() -> String {
    String::from("localhost")
}

#[derive(Clone, Debug, Deserialize)]
pub struct Mailtunnel {
    /// Our name in trace headers
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub diagnostics: SanityConfig,
    #[serde(default)]
    pub logging: LogConfig,
    pub organisation: OrganisationConfig,
    #[serde(default)]
    pub facts: StaticFacts,
    #[serde(default)]
    pub sink: SinkConfig,
}

impl Mailtunnel {
    /// Parse a configuration document
    ///
    /// # Errors
    /// If `config` is not a valid configuration
    pub fn from_ron(config: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(config)?)
    }

    /// Read the configuration at `path`
    ///
    /// # Errors
    /// If the file cannot be read or is not a valid configuration
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Find the configuration file using the following precedence:
    /// 1. `MAILTUNNEL_CONFIG` environment variable
    /// 2. ./mailtunnel.config.ron (current working directory)
    /// 3. /etc/mailtunnel/mailtunnel.config.ron (system-wide config)
    ///
    /// # Errors
    /// If the environment variable names a missing file, or none of the
    /// default locations exist
    pub fn find_config_file() -> anyhow::Result<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Ok(path);
            }
            anyhow::bail!(
                "{CONFIG_ENV} points to non-existent file: {}",
                path.display()
            );
        }

        let default_paths = [
            PathBuf::from("./mailtunnel.config.ron"),
            PathBuf::from("/etc/mailtunnel/mailtunnel.config.ron"),
        ];

        for path in &default_paths {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let paths_tried = default_paths
            .iter()
            .map(|p| format!("  - {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n");

        anyhow::bail!(
            "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
        )
    }

    /// Check the group patterns are sound
    ///
    /// # Errors
    /// The first broken pattern or ambiguity
    pub fn validate(&self) -> anyhow::Result<()> {
        mailtunnel_alias::validate_groups(&self.facts).context("Invalid group configuration")
    }

    /// Build the service, delivering through the configured sink
    ///
    /// # Errors
    /// If the configuration does not validate
    pub fn service(self) -> anyhow::Result<Service> {
        let sink = self.sink.build();
        self.service_with_sink(sink)
    }

    /// Build the service, delivering through `sink`
    ///
    /// # Errors
    /// If the configuration does not validate
    pub fn service_with_sink(self, sink: Arc<dyn DeliverySink>) -> anyhow::Result<Service> {
        self.validate()?;
        mailtunnel_common::sanity::init(self.diagnostics);

        let resolver =
            Resolver::new(Arc::new(self.facts)).context("Could not read the group table")?;
        let organisation = Arc::new(Organisation::new(self.organisation, resolver));
        let forwarder =
            Forwarder::new(self.hostname, Arc::clone(&sink)).with_hooks(organisation.hooks());

        internal!(level = INFO, "Forwarding for {}", organisation.domain());

        Ok(Service::new(forwarder, organisation, sink))
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::{Mailtunnel, SinkConfig};

    #[test]
    fn defaults() {
        let config = Mailtunnel::from_ron(r#"(organisation: (domain: "example.org"))"#).unwrap();

        assert_eq!(config.hostname, "localhost");
        assert_eq!(config.organisation.subject_tag, "TK");
        assert_eq!(config.organisation.bounce_local_part, "admin");
        assert_eq!(config.organisation.fallback_period, None);
        assert!(config.diagnostics.enabled);
        assert!(config.logging.level.is_none());
        assert!(matches!(config.sink, SinkConfig::Log));
        assert!(config.facts.groups.is_empty());
    }

    #[test]
    fn directory_sink() {
        let config = Mailtunnel::from_ron(
            r#"(
                hostname: "mx.example.org",
                logging: (level: Some("debug"), file: Some("/var/log/mailtunnel.log")),
                organisation: (domain: "example.org", subject_tag: "X", fallback_period: Some(2020)),
                sink: Directory(path: "/var/spool/mailtunnel"),
            )"#,
        )
        .unwrap();

        assert_eq!(config.hostname, "mx.example.org");
        assert_eq!(config.organisation.fallback_period, Some(2020));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(matches!(
            config.sink,
            SinkConfig::Directory { ref path } if *path == PathBuf::from("/var/spool/mailtunnel")
        ));
    }

    #[test]
    fn missing_organisation_is_an_error() {
        assert!(Mailtunnel::from_ron("()").is_err());
    }

    #[test]
    fn load_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ron");

        let err = Mailtunnel::load(&path).unwrap_err();
        assert!(err.to_string().contains("missing.ron"), "{err}");
    }

    #[test]
    fn ambiguous_groups_fail_validation() {
        let config = Mailtunnel::from_ron(
            r#"(
                organisation: (domain: "example.org"),
                facts: (groups: [
                    (id: 1, name: "REVY", pattern: "REVY.*"),
                    (id: 2, name: "REVYTEKNIK", pattern: "REVYTEKNIK"),
                ]),
            )"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }
}
