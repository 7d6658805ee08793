//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! the HTTP surface, logging defaults, and the pipeline's external commands.
//! `AppConfig` is the root configuration struct containing all settings.

use serde::Deserialize;
use std::path::Path;

// =============================================================================
// HTTP Surface
// =============================================================================

/// Body of `GET /`
pub const GREETING: &str = "Hello from ValenCloud!";

/// Default listen address and port (the container contract binds 3000)
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Seconds to wait for in-flight requests after SIGTERM/SIGINT
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Health responses must never be served from a cache
pub const CACHE_CONTROL_HEALTH: &str = "no-store";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "valencloud=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Branch whose successful builds are published
pub const DEFAULT_RELEASE_BRANCH: &str = "main";

pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Per-command timeout in seconds
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 1800;

pub const DEFAULT_USERNAME_ENV: &str = "REGISTRY_USERNAME";
pub const DEFAULT_TOKEN_ENV: &str = "REGISTRY_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Pipeline gate configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "HttpServerConfig::default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            shutdown_grace_seconds: Self::default_shutdown_grace(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_SECS
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

/// Pipeline gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Branch whose successful pushes are published
    #[serde(default = "PipelineConfig::default_release_branch")]
    pub release_branch: String,
    /// Image repository, e.g. "valencloud/hello". Prefixed with `registry`
    /// unless it already names a registry host.
    #[serde(default)]
    pub image: String,
    /// Registry host logged in to and pushed to
    #[serde(default = "PipelineConfig::default_registry")]
    pub registry: String,
    /// Timeout applied to every external command (0 disables)
    #[serde(default = "PipelineConfig::default_stage_timeout")]
    pub stage_timeout_seconds: u64,
    /// Refuse to publish when the commit tag already exists in the registry
    #[serde(default = "PipelineConfig::default_guard")]
    pub guard_immutable_tags: bool,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub commands: PipelineCommands,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            release_branch: Self::default_release_branch(),
            image: String::new(),
            registry: Self::default_registry(),
            stage_timeout_seconds: Self::default_stage_timeout(),
            guard_immutable_tags: Self::default_guard(),
            credentials: CredentialsConfig::default(),
            commands: PipelineCommands::default(),
        }
    }
}

impl PipelineConfig {
    fn default_release_branch() -> String {
        DEFAULT_RELEASE_BRANCH.to_string()
    }

    fn default_registry() -> String {
        DEFAULT_REGISTRY.to_string()
    }

    fn default_stage_timeout() -> u64 {
        DEFAULT_STAGE_TIMEOUT_SECS
    }

    fn default_guard() -> bool {
        true
    }

    /// Credential variable names, removed from every command's environment
    pub fn secret_env_names(&self) -> Vec<String> {
        vec![
            self.credentials.username_env.clone(),
            self.credentials.token_env.clone(),
        ]
    }

    /// The repository `{image}` renders to, always qualified with the registry host.
    pub fn image_repository(&self) -> String {
        let image = self.image.trim();
        match registry_host(image) {
            Some(_) => image.to_string(),
            None => format!("{}/{}", self.registry.trim_end_matches('/'), image),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.release_branch.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pipeline.release_branch must not be empty".to_string(),
            ));
        }
        if let Some(host) = registry_host(self.image.trim()) {
            if host != self.registry.trim_end_matches('/') {
                return Err(ConfigError::Validation(format!(
                    "pipeline.image names registry {} but pipeline.registry is {}",
                    host, self.registry
                )));
            }
        }
        if self.guard_immutable_tags && self.commands.absent_markers.is_empty() {
            return Err(ConfigError::Validation(
                "pipeline.commands.absent_markers must not be empty while guard_immutable_tags is on"
                    .to_string(),
            ));
        }
        let commands = &self.commands;
        let single = [
            ("login", &commands.login),
            ("tag", &commands.tag),
            ("push", &commands.push),
            ("exists", &commands.exists),
        ];
        for (name, argv) in single {
            if argv.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "pipeline.commands.{} must not be empty",
                    name
                )));
            }
        }
        for (name, list) in [("test", &commands.test), ("build", &commands.build)] {
            if list.is_empty() || list.iter().any(|argv| argv.is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "pipeline.commands.{} needs at least one non-empty command",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Environment variable names holding the registry credentials
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "CredentialsConfig::default_username_env")]
    pub username_env: String,
    #[serde(default = "CredentialsConfig::default_token_env")]
    pub token_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username_env: Self::default_username_env(),
            token_env: Self::default_token_env(),
        }
    }
}

impl CredentialsConfig {
    fn default_username_env() -> String {
        DEFAULT_USERNAME_ENV.to_string()
    }

    fn default_token_env() -> String {
        DEFAULT_TOKEN_ENV.to_string()
    }
}

/// Argv templates for the external collaborators.
///
/// Placeholders: `{image}`, `{sha}`, `{tag}`, `{registry}`, `{username}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineCommands {
    /// Run in order; the first fetch must start from a clean dependency state
    #[serde(default = "PipelineCommands::default_test")]
    pub test: Vec<Vec<String>>,
    #[serde(default = "PipelineCommands::default_build")]
    pub build: Vec<Vec<String>>,
    /// Receives the token on stdin
    #[serde(default = "PipelineCommands::default_login")]
    pub login: Vec<String>,
    /// Points `{image}:{tag}` at the freshly built `{image}:{sha}`
    #[serde(default = "PipelineCommands::default_tag")]
    pub tag: Vec<String>,
    #[serde(default = "PipelineCommands::default_push")]
    pub push: Vec<String>,
    /// Exit status 0 means `{image}:{tag}` is already in the registry
    #[serde(default = "PipelineCommands::default_exists")]
    pub exists: Vec<String>,
    /// Output of a failed `exists` that proves the tag is absent. Any other
    /// failure leaves the answer unknown and blocks publishing.
    #[serde(default = "PipelineCommands::default_absent_markers")]
    pub absent_markers: Vec<String>,
}

impl Default for PipelineCommands {
    fn default() -> Self {
        Self {
            test: Self::default_test(),
            build: Self::default_build(),
            login: Self::default_login(),
            tag: Self::default_tag(),
            push: Self::default_push(),
            exists: Self::default_exists(),
            absent_markers: Self::default_absent_markers(),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl PipelineCommands {
    fn default_test() -> Vec<Vec<String>> {
        vec![
            argv(&["cargo", "fetch", "--locked"]),
            argv(&["cargo", "test", "--locked", "--all-targets"]),
        ]
    }

    fn default_build() -> Vec<Vec<String>> {
        vec![argv(&["docker", "build", "--pull", "--tag", "{image}:{sha}", "."])]
    }

    fn default_login() -> Vec<String> {
        argv(&[
            "docker",
            "login",
            "--username",
            "{username}",
            "--password-stdin",
            "{registry}",
        ])
    }

    fn default_tag() -> Vec<String> {
        argv(&["docker", "tag", "{image}:{sha}", "{image}:{tag}"])
    }

    fn default_push() -> Vec<String> {
        argv(&["docker", "push", "{image}:{tag}"])
    }

    fn default_exists() -> Vec<String> {
        argv(&["docker", "manifest", "inspect", "{image}:{tag}"])
    }

    fn default_absent_markers() -> Vec<String> {
        argv(&["no such manifest", "manifest unknown"])
    }

    /// True when a failed `exists` check reported the tag as missing.
    pub fn reports_absent(&self, output: &str) -> bool {
        let output = output.to_lowercase();
        self.absent_markers
            .iter()
            .any(|marker| output.contains(&marker.to_lowercase()))
    }
}

/// Registry host named by an image reference's first path component, if any.
fn registry_host(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    (first.contains('.') || first.contains(':') || first == "localhost").then_some(first)
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        self.pipeline.validate()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").expect("empty config is valid");
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.pipeline.release_branch, "main");
        assert!(config.pipeline.guard_immutable_tags);
        assert_eq!(config.pipeline.commands.test.len(), 2);
        assert!(config
            .pipeline
            .commands
            .test
            .iter()
            .all(|argv| argv.contains(&"--locked".to_string())));
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_image_is_qualified_with_registry() {
        let mut config = PipelineConfig {
            image: "valencloud/hello".to_string(),
            registry: "ghcr.io".to_string(),
            ..PipelineConfig::default()
        };
        assert_eq!(config.image_repository(), "ghcr.io/valencloud/hello");

        config.image = "ghcr.io/valencloud/hello".to_string();
        assert_eq!(config.image_repository(), "ghcr.io/valencloud/hello");

        config.image = "localhost:5000/hello".to_string();
        config.registry = "localhost:5000".to_string();
        assert_eq!(config.image_repository(), "localhost:5000/hello");
    }

    #[test]
    fn test_rejects_image_on_another_registry() {
        let err = AppConfig::from_toml(
            "[pipeline]\nimage = \"ghcr.io/valencloud/hello\"\nregistry = \"docker.io\"",
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghcr.io"), "{}", err);
    }

    #[test]
    fn test_absent_markers() {
        let commands = PipelineCommands::default();
        assert!(commands.reports_absent("no such manifest: docker.io/valencloud/hello:abc123"));
        assert!(commands.reports_absent("MANIFEST_UNKNOWN: Manifest unknown"));
        assert!(!commands.reports_absent("dial tcp: i/o timeout"));
        assert!(!commands.reports_absent("unauthorized: authentication required"));

        let err = AppConfig::from_toml("[pipeline.commands]\nabsent_markers = []").unwrap_err();
        assert!(err.to_string().contains("absent_markers"));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [http]
            port = 8080

            [logging]
            format = "json"

            [pipeline]
            release_branch = "trunk"
            image = "valencloud/hello"

            [pipeline.credentials]
            token_env = "DOCKERHUB_TOKEN"
            "#,
        )
        .expect("valid config");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.host, "0.0.0.0");
        assert!(config.logging.is_json());
        assert_eq!(config.pipeline.release_branch, "trunk");
        assert_eq!(config.pipeline.image, "valencloud/hello");
        assert_eq!(config.pipeline.credentials.username_env, "REGISTRY_USERNAME");
        assert_eq!(
            config.pipeline.secret_env_names(),
            vec!["REGISTRY_USERNAME".to_string(), "DOCKERHUB_TOKEN".to_string()]
        );
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let err = AppConfig::from_toml("[logging]\nformat = \"xml\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_empty_command() {
        let err = AppConfig::from_toml("[pipeline.commands]\npush = []").unwrap_err();
        assert!(err.to_string().contains("push"));

        let err = AppConfig::from_toml("[pipeline.commands]\ntest = [[]]").unwrap_err();
        assert!(err.to_string().contains("test"));
    }

    #[test]
    fn test_rejects_blank_release_branch() {
        let err = AppConfig::from_toml("[pipeline]\nrelease_branch = \" \"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[http]\nhost = \"127.0.0.1\"").expect("write");
        let config = AppConfig::load(file.path()).expect("load");
        assert_eq!(config.http.host, "127.0.0.1");
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/valencloud.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = AppConfig::from_toml("[http]\nport = \"not a number\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
