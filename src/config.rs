use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the generator
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Docker connection and container selection
    #[serde(default)]
    pub docker: DockerConfig,

    /// Where the generated Caddyfile goes
    #[serde(default)]
    pub output: OutputConfig,

    /// Event handling timings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Reload signal sent after the Caddyfile changed
    pub notify: Option<NotifyConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DockerConfig {
    /// Docker endpoint (`unix://...` or `tcp://...`); falls back to DOCKER_HOST
    pub host: Option<String>,

    /// Network shared with Caddy (default: gateway)
    #[serde(default = "default_network")]
    pub network: String,

    /// Label holding the site bindings (default: virtual.bind)
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            network: default_network(),
            label: default_label(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Path of the generated Caddyfile
    #[serde(default = "default_output_path")]
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Quiet period after the last event before regenerating (default: 1000)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Wait before resubscribing after an event stream error (default: 5)
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

/// Reload command; runs inside `container_id` when set, locally otherwise
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct NotifyConfig {
    /// Command and arguments
    #[serde(default)]
    pub command: Vec<String>,

    /// Container to exec the command in
    pub container_id: Option<String>,

    /// Working directory for the exec
    pub working_dir: Option<String>,
}

// Default value functions
fn default_network() -> String {
    "gateway".to_string()
}

fn default_label() -> String {
    "virtual.bind".to_string()
}

fn default_output_path() -> String {
    "Caddyfile".to_string()
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_backoff_secs() -> u64 {
    5
}

impl Config {
    /// Load from a TOML file, apply environment overrides and validate
    ///
    /// A missing file is not an error: the generator is usually configured
    /// purely through the environment of its container.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the TOML file alone, defaults when it does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `CADDY_GEN_*` overrides using the given variable lookup
    pub fn apply_env<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("DOCKER_HOST") {
            if self.docker.host.is_none() {
                self.docker.host = Some(host);
            }
        }
        if let Some(network) = var("CADDY_GEN_NETWORK") {
            self.docker.network = network;
        }
        if let Some(label) = var("CADDY_GEN_LABEL") {
            self.docker.label = label;
        }
        if let Some(path) = var("CADDY_GEN_OUTFILE") {
            self.output.path = path;
        }
        if let Some(command) = var("CADDY_GEN_NOTIFY") {
            let command = shell_words::split(&command)
                .map_err(|e| anyhow::anyhow!("Invalid CADDY_GEN_NOTIFY '{}': {}", command, e))?;
            self.notify.get_or_insert_with(NotifyConfig::default).command = command;
        }
        if let Some(container_id) = var("CADDY_GEN_NOTIFY_CONTAINER") {
            self.notify.get_or_insert_with(NotifyConfig::default).container_id = Some(container_id);
        }
        if let Some(dir) = var("CADDY_GEN_NOTIFY_DIR") {
            self.notify.get_or_insert_with(NotifyConfig::default).working_dir = Some(dir);
        }
        Ok(())
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.docker.network.trim().is_empty() {
            errors.push("'docker.network' must not be empty".to_string());
        }
        if self.docker.label.trim().is_empty() {
            errors.push("'docker.label' must not be empty".to_string());
        }
        if self.output.path.trim().is_empty() {
            errors.push("'output.path' must not be empty".to_string());
        }
        if self.watch.debounce_ms == 0 {
            errors.push("'watch.debounce_ms' must be greater than 0".to_string());
        }
        if self.watch.backoff_secs == 0 {
            errors.push("'watch.backoff_secs' must be greater than 0".to_string());
        }
        if let Some(ref notify) = self.notify {
            if notify.command.is_empty() {
                errors.push("'notify.command' must not be empty".to_string());
            }
            if notify.working_dir.is_some() && notify.container_id.is_none() {
                errors.push("'notify.working_dir' requires 'notify.container_id'".to_string());
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
