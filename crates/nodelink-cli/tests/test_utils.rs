//! Test utilities for the CLI
//!
//! A simulated node that answers filename and file-transfer requests the way
//! the firmware does, and a central that finds it as soon as a scan starts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::{self, BoxStream, StreamExt};
use nodelink_cli::CliAppConfig;
use nodelink_core::{
    BleCentral, ConnectedChannel, Discovery, EndpointRole, NotificationStream, PeripheralHandle,
    PeripheralId, RadioState, TransportError, NODE_SERVICE_UUID,
};
use nodelink_runtime::RuntimeConfig;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Simulated Node
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct SimulatedNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: PeripheralId,
    name: String,
    listing: String,
    files: HashMap<String, Vec<Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    subscribers: Mutex<HashMap<Uuid, UnboundedSender<Result<Vec<u8>, TransportError>>>>,
    disconnected: AtomicBool,
}

impl SimulatedNode {
    /// Node holding `b.txt` (sent as DE AD / BE EF / 01), an empty `a.txt` and
    /// a plain-text `notes.txt` that is not part of the listing
    pub fn new(id: &str, name: &str) -> Self {
        let mut files = HashMap::new();
        files.insert(
            "b.txt".to_string(),
            vec![vec![0xDE, 0xAD], vec![0xBE, 0xEF], vec![0x01]],
        );
        files.insert("a.txt".to_string(), Vec::new());
        files.insert(
            "notes.txt".to_string(),
            vec![b"hello,".to_vec(), b"world\n".to_vec()],
        );
        Self {
            inner: Arc::new(NodeInner {
                id: PeripheralId::new(id),
                name: name.to_string(),
                listing: "a.txt|0;b.txt|5;EOF".to_string(),
                files,
                writes: Mutex::new(Vec::new()),
                subscribers: Mutex::new(HashMap::new()),
                disconnected: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &PeripheralId {
        &self.inner.id
    }

    fn push(&self, role: EndpointRole, value: Vec<u8>) {
        if let Some(tx) = self.inner.subscribers.lock().unwrap().get(&role.uuid()) {
            let _ = tx.unbounded_send(Ok(value));
        }
    }

    /// Written payloads as text, in order
    pub fn written_text(&self) -> Vec<(Uuid, String)> {
        self.inner
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|(uuid, payload)| (*uuid, String::from_utf8_lossy(payload).into_owned()))
            .collect()
    }

    pub async fn wait_writes(&self, count: usize) -> Vec<(Uuid, String)> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let writes = self.written_text();
                if writes.len() >= count {
                    return writes;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("writes never arrived")
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.disconnected.load(Ordering::SeqCst)
    }

    pub async fn wait_disconnected(&self) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !self.is_disconnected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("node never disconnected");
    }

    /// Wait until the session listens on both notifying endpoints
    pub async fn wait_subscribed(&self) {
        let roles = [EndpointRole::Filename, EndpointRole::FileTransfer];
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let ready = {
                    let subscribers = self.inner.subscribers.lock().unwrap();
                    roles.iter().all(|role| subscribers.contains_key(&role.uuid()))
                };
                if ready {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriptions never arrived");
    }
}

#[async_trait]
impl ConnectedChannel for SimulatedNode {
    fn peripheral(&self) -> &PeripheralId {
        &self.inner.id
    }

    async fn discover_services(&self) -> Result<Vec<Uuid>, TransportError> {
        Ok(vec![NODE_SERVICE_UUID])
    }

    async fn discover_characteristics(&self, service: Uuid) -> Result<Vec<Uuid>, TransportError> {
        if service != NODE_SERVICE_UUID {
            return Err(TransportError::ServiceNotFound { service });
        }
        Ok(EndpointRole::ALL.iter().map(|role| role.uuid()).collect())
    }

    async fn write(
        &self,
        characteristic: Uuid,
        payload: &[u8],
        _require_ack: bool,
    ) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Disconnected);
        }
        self.inner
            .writes
            .lock()
            .unwrap()
            .push((characteristic, payload.to_vec()));

        if characteristic == EndpointRole::Filename.uuid() {
            let request = String::from_utf8_lossy(payload).into_owned();
            if request == "request" {
                self.push(EndpointRole::Filename, self.inner.listing.clone().into_bytes());
            } else if let Some(chunks) = self.inner.files.get(&request) {
                for chunk in chunks {
                    self.push(EndpointRole::FileTransfer, chunk.clone());
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream, TransportError> {
        let (tx, rx) = unbounded();
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .insert(characteristic, tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnected.store(true, Ordering::SeqCst);
        self.inner.subscribers.lock().unwrap().clear();
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Simulated Central
// ----------------------------------------------------------------------------

/// Central whose scans report every registered node right away
#[derive(Clone, Default)]
pub struct SimulatedCentral {
    nodes: Arc<Mutex<Vec<SimulatedNode>>>,
}

impl SimulatedCentral {
    pub fn with_node(node: SimulatedNode) -> Self {
        let central = Self::default();
        central.nodes.lock().unwrap().push(node);
        central
    }
}

#[async_trait]
impl BleCentral for SimulatedCentral {
    async fn radio_state(&self) -> RadioState {
        RadioState::PoweredOn
    }

    async fn scan(&self, _service: Uuid) -> Result<BoxStream<'static, Discovery>, TransportError> {
        let sightings: Vec<Discovery> = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .map(|node| Discovery {
                handle: PeripheralHandle::new(node.inner.id.clone(), Some(node.inner.name.clone())),
                rssi: Some(-60),
            })
            .collect();
        Ok(stream::iter(sightings).chain(stream::pending()).boxed())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn connect(
        &self,
        handle: &PeripheralHandle,
    ) -> Result<Arc<dyn ConnectedChannel>, TransportError> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.iter().find(|node| node.inner.id == handle.id) {
            Some(node) => Ok(Arc::new(node.clone())),
            None => Err(TransportError::PeripheralNotFound {
                peripheral: handle.id.clone(),
            }),
        }
    }

    async fn disconnections(&self) -> Result<BoxStream<'static, PeripheralId>, TransportError> {
        Ok(stream::pending().boxed())
    }
}

/// Configuration with short waits
pub fn test_config() -> CliAppConfig {
    let mut config = CliAppConfig::default();
    config.session.scan_timeout = Duration::from_millis(300);
    config.runtime = RuntimeConfig::testing();
    config.cli.ready_timeout_secs = 1;
    config.cli.response_timeout_ms = 1000;
    config.cli.transfer_idle_ms = 150;
    config
}
