//! Docker access for the reconciler
//!
//! The reconciler only needs three things from the platform: list the
//! containers on the proxy network, follow start/stop events, and run a
//! command inside a container. [`ContainerPlatform`] is that seam;
//! [`DockerPlatform`] implements it on top of bollard.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::models::{ContainerSummary, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::debug;

/// A container as seen by the generator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Names as reported by Docker, usually with a leading `/`
    pub names: Vec<String>,
    pub labels: HashMap<String, String>,
    /// IP address per attached network
    pub network_ips: HashMap<String, String>,
}

impl ContainerInfo {
    /// First name without its leading `/`, falling back to the id
    pub fn display_name(&self) -> String {
        match self.names.first() {
            Some(name) => name.trim_start_matches('/').to_string(),
            None => self.id.clone(),
        }
    }
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(summary: ContainerSummary) -> Self {
        let network_ips = summary
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .map(|(network, endpoint)| (network, endpoint.ip_address.unwrap_or_default()))
            .collect();

        Self {
            id: summary.id.unwrap_or_default(),
            names: summary.names.unwrap_or_default(),
            labels: summary.labels.unwrap_or_default(),
            network_ips,
        }
    }
}

/// A container lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerEvent {
    /// Docker action, `start` or `stop`
    pub action: String,
    pub container_id: Option<String>,
}

impl From<EventMessage> for ContainerEvent {
    fn from(message: EventMessage) -> Self {
        Self {
            action: message.action.unwrap_or_default(),
            container_id: message.actor.and_then(|actor| actor.id),
        }
    }
}

/// Stream of events from one subscription; ends or errors on disconnect
pub type EventStream = BoxStream<'static, anyhow::Result<ContainerEvent>>;

/// Operations the reconciler needs from the container platform
#[async_trait]
pub trait ContainerPlatform: Send + Sync {
    /// Containers attached to `network` in state created or running
    async fn list_containers(&self, network: &str) -> anyhow::Result<Vec<ContainerInfo>>;

    /// Open a fresh subscription to container start/stop events
    fn subscribe(&self) -> EventStream;

    /// Run a detached command inside a container without capturing output
    async fn exec_detached(
        &self,
        container_id: &str,
        command: &[String],
        working_dir: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Filters for containers that should be routed
pub fn list_filters(network: &str) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert("network".to_string(), vec![network.to_string()]);
    filters.insert(
        "status".to_string(),
        vec!["created".to_string(), "running".to_string()],
    );
    filters
}

/// Filters for the events that can change the routing table
pub fn event_filters() -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert("type".to_string(), vec!["container".to_string()]);
    filters.insert(
        "event".to_string(),
        vec!["start".to_string(), "stop".to_string()],
    );
    filters
}

/// Docker daemon connection
pub struct DockerPlatform {
    client: Docker,
}

/// Socket used when neither the config nor DOCKER_HOST name a daemon
const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

impl DockerPlatform {
    /// Connect to `docker_host`, else DOCKER_HOST, else the local socket
    ///
    /// Fails when the daemon does not answer a ping.
    pub async fn connect(docker_host: Option<&str>) -> anyhow::Result<Self> {
        let host = docker_host
            .map(str::to_string)
            .or_else(|| std::env::var("DOCKER_HOST").ok())
            .unwrap_or_else(|| DEFAULT_DOCKER_HOST.to_string());

        let client = connect_to_host(&host)?;
        client.ping().await.map_err(|e| {
            anyhow::anyhow!(
                "Docker daemon at '{}' is not responding: {}. \
                 Ensure the Docker socket is mounted into this container.",
                host, e
            )
        })?;

        debug!(host = %host, "Connected to Docker daemon");
        Ok(Self { client })
    }
}

fn connect_to_host(host: &str) -> anyhow::Result<Docker> {
    if let Some(socket_path) = host.strip_prefix("unix://") {
        Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| anyhow::anyhow!("Cannot connect to Unix socket '{}': {}", socket_path, e))
    } else if host.starts_with("tcp://") || host.starts_with("http://") {
        Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| anyhow::anyhow!("Cannot connect to TCP endpoint '{}': {}", host, e))
    } else {
        anyhow::bail!(
            "Invalid docker host '{}'. Expected 'unix:///path/to/socket' or 'tcp://host:port'",
            host
        )
    }
}

#[async_trait]
impl ContainerPlatform for DockerPlatform {
    async fn list_containers(&self, network: &str) -> anyhow::Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: list_filters(network),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list containers on network '{}': {}", network, e))?;

        Ok(containers.into_iter().map(ContainerInfo::from).collect())
    }

    fn subscribe(&self) -> EventStream {
        let options = EventsOptions::<String> {
            filters: event_filters(),
            ..Default::default()
        };

        self.client
            .events(Some(options))
            .map(|result| {
                result
                    .map(ContainerEvent::from)
                    .map_err(|e| anyhow::anyhow!("Docker event stream error: {}", e))
            })
            .boxed()
    }

    async fn exec_detached(
        &self,
        container_id: &str,
        command: &[String],
        working_dir: Option<&str>,
    ) -> anyhow::Result<()> {
        let options = CreateExecOptions::<String> {
            cmd: Some(command.to_vec()),
            working_dir: working_dir.map(str::to_string),
            attach_stdin: Some(false),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(container_id, options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create exec in '{}': {}", container_id, e))?;

        self.client
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start exec '{}' in '{}': {}", exec.id, container_id, e))?;

        debug!(container_id, exec_id = %exec.id, "Started detached exec");
        Ok(())
    }
}
