//! Reload signalling after the Caddyfile changed
//!
//! Either a local command (e.g. `caddy reload` when running next to Caddy),
//! or a detached exec inside the Caddy container. Failures are logged and
//! never reach the reconciler.

use crate::config::NotifyConfig;
use crate::docker::ContainerPlatform;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How to tell the edge server to reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Notifier {
    #[default]
    Disabled,
    /// Spawn a local process
    Local { command: Vec<String> },
    /// Exec inside a running container
    Remote {
        container_id: String,
        command: Vec<String>,
        working_dir: Option<String>,
    },
}

impl Notifier {
    pub fn from_config(config: Option<&NotifyConfig>) -> Self {
        let Some(config) = config else {
            return Self::Disabled;
        };
        if config.command.is_empty() {
            return Self::Disabled;
        }

        match &config.container_id {
            Some(container_id) => Self::Remote {
                container_id: container_id.clone(),
                command: config.command.clone(),
                working_dir: config.working_dir.clone(),
            },
            None => Self::Local {
                command: config.command.clone(),
            },
        }
    }

    /// Fire the configured signal
    pub async fn notify<P: ContainerPlatform + ?Sized>(&self, platform: &P) {
        match self {
            Self::Disabled => {
                debug!("No notify target configured");
            }
            Self::Local { command } => spawn_local(command),
            Self::Remote {
                container_id,
                command,
                working_dir,
            } => {
                info!(container_id = %container_id, command = ?command, "Notifying container");
                if let Err(e) = platform
                    .exec_detached(container_id, command, working_dir.as_deref())
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to notify container");
                }
            }
        }
    }
}

fn spawn_local(command: &[String]) {
    let Some((program, args)) = command.split_first() else {
        return;
    };

    info!(command = ?command, "Running notify command");
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    match cmd.spawn() {
        Ok(mut child) => {
            let program = program.clone();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!(program = %program, %status, "Notify command exited"),
                    Err(e) => debug!(program = %program, error = %e, "Failed to wait for notify command"),
                }
            });
        }
        Err(e) => {
            warn!(program = %program, error = %e, "Failed to spawn notify command");
        }
    }
}
