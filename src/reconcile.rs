//! Keeps the Caddyfile in sync with the running containers
//!
//! The [`Reconciler`] runs one pass at startup, then follows Docker
//! start/stop events. Events are debounced so a `docker compose up` of ten
//! services produces a single regeneration. A broken event stream is retried
//! forever after a fixed backoff.
//!
//! ```text
//! Init ──► Subscribe ──► Watch ──(error / end)──► Backoff ──┐
//!              ▲           │ event: re-arm debounce          │
//!              │           │ debounce expired: reconcile     │
//!              └───────────┴─────────────────────────────────┘
//! ```

use crate::config::Config;
use crate::docker::{ContainerPlatform, EventStream};
use crate::label::{container_sites, SiteConfig};
use crate::notify::Notifier;
use crate::output::OutputFile;
use crate::render::render;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Settings for container selection and event handling
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Network shared with Caddy
    pub network: String,
    /// Label key holding the bindings
    pub label: String,
    /// Quiet period after the last event
    pub debounce: Duration,
    /// Wait before resubscribing after a stream error
    pub backoff: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            network: config.docker.network.clone(),
            label: config.docker.label.clone(),
            debounce: config.watch.debounce(),
            backoff: config.watch.backoff(),
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Rendered document matched the file, nothing written
    Unchanged,
    /// File rewritten and reload signalled
    Updated,
    /// Listing or writing failed, file left as it was
    Failed,
}

/// Phase of the watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Subscribe,
    Watch,
    Backoff,
    Stopped,
}

/// Single-slot re-armable timer
#[derive(Debug, Default)]
struct Debounce {
    deadline: Option<Instant>,
}

impl Debounce {
    /// Start or restart the quiet period
    fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    fn clear(&mut self) {
        self.deadline = None;
    }

    /// Resolves when the armed deadline passes, never if unarmed
    async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

/// Drives list, render, diff, write and notify
pub struct Reconciler<P: ContainerPlatform + ?Sized> {
    platform: Arc<P>,
    settings: ReconcilerSettings,
    output: OutputFile,
    notifier: Notifier,
}

impl<P: ContainerPlatform + ?Sized> Reconciler<P> {
    pub fn new(
        platform: Arc<P>,
        settings: ReconcilerSettings,
        output: OutputFile,
        notifier: Notifier,
    ) -> Self {
        Self {
            platform,
            settings,
            output,
            notifier,
        }
    }

    pub fn from_config(platform: Arc<P>, config: &Config) -> Self {
        Self::new(
            platform,
            ReconcilerSettings::from_config(config),
            OutputFile::new(&config.output.path),
            Notifier::from_config(config.notify.as_ref()),
        )
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Collect bindings from every container on the network
    ///
    /// A container whose label fails to parse is skipped; the others still
    /// contribute.
    pub async fn collect_sites(&self) -> anyhow::Result<Vec<SiteConfig>> {
        let containers = self
            .platform
            .list_containers(&self.settings.network)
            .await?;

        let sites: Vec<SiteConfig> = containers
            .iter()
            .flat_map(|container| {
                container_sites(container, &self.settings.label, &self.settings.network)
            })
            .collect();

        debug!(
            containers = containers.len(),
            sites = sites.len(),
            network = %self.settings.network,
            "Collected site bindings"
        );
        Ok(sites)
    }

    /// Render the Caddyfile for the current container population
    pub async fn generate(&self) -> anyhow::Result<String> {
        let sites = self.collect_sites().await?;
        Ok(render(&sites))
    }

    /// Run one pass, writing and notifying only when the output changed
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let document = match self.generate().await {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "Failed to generate config");
                return ReconcileOutcome::Failed;
            }
        };

        if self.output.read() == document {
            info!("No change, skip notifying");
            return ReconcileOutcome::Unchanged;
        }

        if let Err(e) = self.output.write(&document) {
            error!(path = %self.output.path().display(), error = %e, "Failed to write config");
            return ReconcileOutcome::Failed;
        }
        info!(path = %self.output.path().display(), bytes = document.len(), "Caddy config written");

        self.notifier.notify(self.platform.as_ref()).await;
        ReconcileOutcome::Updated
    }

    /// Run the watch loop until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut state = State::Init;
        let mut events: Option<EventStream> = None;
        let mut debounce = Debounce::default();

        while state != State::Stopped {
            if *shutdown.borrow() {
                break;
            }

            state = match state {
                State::Init => {
                    self.reconcile().await;
                    State::Subscribe
                }
                State::Subscribe => {
                    info!("Waiting for Docker events...");
                    events = Some(self.platform.subscribe());
                    State::Watch
                }
                State::Watch => match events.as_mut() {
                    None => State::Subscribe,
                    Some(stream) => tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() { State::Stopped } else { State::Watch }
                        }
                        _ = debounce.expired() => {
                            debounce.clear();
                            self.reconcile().await;
                            State::Watch
                        }
                        next = stream.next() => match next {
                            Some(Ok(event)) => {
                                debug!(
                                    action = %event.action,
                                    container_id = ?event.container_id,
                                    "Container event"
                                );
                                debounce.arm(self.settings.debounce);
                                State::Watch
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "Error receiving events");
                                State::Backoff
                            }
                            None => {
                                warn!("Docker event stream ended");
                                State::Backoff
                            }
                        },
                    },
                },
                State::Backoff => {
                    events = None;
                    self.backoff(&mut shutdown, &mut debounce).await
                }
                State::Stopped => State::Stopped,
            };
        }

        info!("Reconciler stopped");
    }

    /// Sleep out the backoff interval, still honouring a pending debounce
    async fn backoff(&self, shutdown: &mut watch::Receiver<bool>, debounce: &mut Debounce) -> State {
        let resume_at = Instant::now() + self.settings.backoff;
        debug!(backoff_secs = self.settings.backoff.as_secs_f64(), "Reconnecting to Docker events");

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(resume_at) => return State::Subscribe,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return State::Stopped;
                    }
                }
                _ = debounce.expired() => {
                    debounce.clear();
                    self.reconcile().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_debounce_rearm_moves_deadline() {
        let mut debounce = Debounce::default();
        debounce.arm(Duration::from_millis(100));
        let first = debounce.deadline.unwrap();

        tokio::time::advance(Duration::from_millis(60)).await;
        debounce.arm(Duration::from_millis(100));
        assert!(debounce.deadline.unwrap() > first);

        let started = Instant::now();
        debounce.expired().await;
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_debounce_never_fires() {
        let debounce = Debounce::default();
        let result = tokio::time::timeout(Duration::from_secs(60), debounce.expired()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = ReconcilerSettings::from_config(&Config::default());
        assert_eq!(settings.network, "gateway");
        assert_eq!(settings.label, "virtual.bind");
        assert_eq!(settings.debounce, Duration::from_secs(1));
        assert_eq!(settings.backoff, Duration::from_secs(5));
    }
}
