//! Scripted container platform for reconciler tests

use async_trait::async_trait;
use caddy_gen::docker::{ContainerEvent, ContainerInfo, ContainerPlatform, EventStream};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// One recorded exec call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub container_id: String,
    pub command: Vec<String>,
    pub working_dir: Option<String>,
}

/// In-memory platform with scripted containers and event subscriptions
#[derive(Default)]
pub struct MockPlatform {
    containers: Mutex<Vec<ContainerInfo>>,
    subscriptions: Mutex<VecDeque<EventStream>>,
    execs: Mutex<Vec<ExecCall>>,
    fail_list: AtomicBool,
    pub list_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new(containers: Vec<ContainerInfo>) -> Self {
        Self {
            containers: Mutex::new(containers),
            ..Default::default()
        }
    }

    pub fn set_containers(&self, containers: Vec<ContainerInfo>) {
        *self.containers.lock() = containers;
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Queue the stream returned by the next `subscribe` call
    pub fn push_subscription(&self, stream: EventStream) {
        self.subscriptions.lock().push_back(stream);
    }

    pub fn execs(&self) -> Vec<ExecCall> {
        self.execs.lock().clone()
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerPlatform for MockPlatform {
    async fn list_containers(&self, network: &str) -> anyhow::Result<Vec<ContainerInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            anyhow::bail!("daemon unavailable");
        }
        let containers = self.containers.lock().clone();
        Ok(containers
            .into_iter()
            .filter(|c| c.network_ips.contains_key(network))
            .collect())
    }

    fn subscribe(&self) -> EventStream {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .pop_front()
            .unwrap_or_else(|| futures::stream::pending::<anyhow::Result<ContainerEvent>>().boxed())
    }

    async fn exec_detached(
        &self,
        container_id: &str,
        command: &[String],
        working_dir: Option<&str>,
    ) -> anyhow::Result<()> {
        self.execs.lock().push(ExecCall {
            container_id: container_id.to_string(),
            command: command.to_vec(),
            working_dir: working_dir.map(str::to_string),
        });
        Ok(())
    }
}

/// Event stream fed from the returned sender; ends when the sender drops
pub fn event_channel() -> (mpsc::UnboundedSender<anyhow::Result<ContainerEvent>>, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (tx, stream)
}

pub fn start_event(id: &str) -> anyhow::Result<ContainerEvent> {
    Ok(ContainerEvent {
        action: "start".to_string(),
        container_id: Some(id.to_string()),
    })
}

/// Container on the `gateway` network carrying a `virtual.bind` label
pub fn container(name: &str, ip: &str, bind: &str) -> ContainerInfo {
    let mut labels = HashMap::new();
    labels.insert("virtual.bind".to_string(), bind.to_string());
    let mut network_ips = HashMap::new();
    network_ips.insert("gateway".to_string(), ip.to_string());
    ContainerInfo {
        id: format!("{}-id", name),
        names: vec![format!("/{}", name)],
        labels,
        network_ips,
    }
}
