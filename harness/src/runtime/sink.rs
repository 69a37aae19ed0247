//! Protocol Sinks
//!
//! One HTTP listener per ingestion protocol. Every accepted payload is decoded
//! into the canonical hierarchy and appended to the sink's [`BatchStore`];
//! undecodable payloads are dropped and logged without stopping the listener.
//!
//! [`ApiStubHandle`] stands in for the SignalFx API the collector's exporter
//! calls alongside its data endpoint.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    routing::post,
};
use shared::{PayloadDecoder, Protocol, component_debug, component_info, component_warn};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::SinkConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::store::BatchStore;

#[derive(Clone)]
struct SinkState {
    protocol: Protocol,
    store: BatchStore,
    decoder: Arc<dyn PayloadDecoder>,
    dropped: Arc<AtomicUsize>,
}

/// Running sink; dropping the handle leaves the listener running until the runtime stops
pub struct SinkHandle {
    protocol: Protocol,
    local_addr: SocketAddr,
    store: BatchStore,
    dropped: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
    server_task: JoinHandle<()>,
}

impl SinkHandle {
    /// Bind `addr` and start serving `protocol` into `store`
    pub async fn start(
        protocol: Protocol,
        addr: SocketAddr,
        store: BatchStore,
        decoder: Arc<dyn PayloadDecoder>,
    ) -> HarnessResult<Self> {
        let dropped = Arc::new(AtomicUsize::new(0));
        let state = SinkState {
            protocol,
            store: store.clone(),
            decoder,
            dropped: dropped.clone(),
        };

        let app = Router::new()
            .route("/", post(receive_payload))
            .route(protocol.route(), post(receive_payload))
            .with_state(state);

        let (local_addr, shutdown_tx, server_task) = serve(&protocol.to_string(), addr, app).await?;
        component_info!(protocol, "📡 Sink listening on {}", local_addr);

        Ok(Self {
            protocol,
            local_addr,
            store,
            dropped,
            shutdown: Some(shutdown_tx),
            server_task,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &BatchStore {
        &self.store
    }

    /// Number of payloads rejected because they could not be decoded
    pub fn dropped_payloads(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting connections and wait for the server task to finish
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.server_task).await {
            tracing::warn!("Sink {} task ended abnormally: {}", self.protocol, e);
        }
        component_info!(self.protocol, "🛑 Sink on {} stopped", self.local_addr);
    }
}

/// Bind `addr` and serve `app` until the returned sender fires
async fn serve(
    label: &str,
    addr: SocketAddr,
    app: Router,
) -> HarnessResult<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| HarnessError::SinkStartup {
            protocol: label.to_string(),
            addr: addr.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let label = label.to_string();
    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::error!("{} server error: {}", label, e);
        }
    });

    Ok((local_addr, shutdown_tx, server_task))
}

async fn receive_payload(State(state): State<SinkState>, body: Bytes) -> StatusCode {
    match state.decoder.decode(state.protocol, &body) {
        Ok(batch) => {
            let records = batch.record_count();
            let arrival = state.store.append(state.protocol, batch);
            component_debug!(
                state.protocol,
                "📥 Stored batch #{} ({} records, {} bytes)",
                arrival,
                records,
                body.len()
            );
            StatusCode::OK
        }
        Err(e) => {
            state.dropped.fetch_add(1, Ordering::Relaxed);
            component_warn!(state.protocol, "⚠️ Dropping undecodable payload: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

/// All sinks of one run, keyed by protocol
#[derive(Default)]
pub struct SinkSet {
    sinks: BTreeMap<Protocol, SinkHandle>,
}

impl SinkSet {
    /// Start one sink per config entry, each with its own store
    pub async fn start(configs: &[SinkConfig], decoder: Arc<dyn PayloadDecoder>) -> HarnessResult<Self> {
        let mut set = SinkSet::default();
        for config in configs {
            let handle = match SinkHandle::start(config.protocol, config.bind, BatchStore::new(), decoder.clone()).await {
                Ok(handle) => handle,
                Err(e) => {
                    // Do not leak the listeners that already started
                    set.stop_all().await;
                    return Err(e);
                }
            };
            set.sinks.insert(config.protocol, handle);
        }
        Ok(set)
    }

    pub fn store(&self, protocol: Protocol) -> HarnessResult<&BatchStore> {
        self.sink(protocol).map(SinkHandle::store)
    }

    pub fn sink(&self, protocol: Protocol) -> HarnessResult<&SinkHandle> {
        self.sinks.get(&protocol).ok_or_else(|| HarnessError::SinkNotConfigured {
            protocol: protocol.to_string(),
        })
    }

    pub fn protocols(&self) -> impl Iterator<Item = Protocol> + '_ {
        self.sinks.keys().copied()
    }

    /// Reset every store, typically between test phases
    pub fn reset_all(&self) {
        for sink in self.sinks.values() {
            sink.store().reset();
        }
    }

    pub async fn stop_all(&mut self) {
        let sinks = std::mem::take(&mut self.sinks);
        for (protocol, sink) in sinks {
            let stats = sink.store().stats();
            component_info!(
                protocol,
                "📊 Captured {} batches ({} records, {} points), dropped {}",
                stats.total_batches,
                stats.total_records,
                stats.total_points,
                sink.dropped_payloads()
            );
            sink.stop().await;
        }
    }
}

/// Stub of the SignalFx API: every request on any path gets 200
pub struct ApiStubHandle {
    local_addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
    server_task: JoinHandle<()>,
}

impl ApiStubHandle {
    pub async fn start(addr: SocketAddr) -> HarnessResult<Self> {
        let requests = Arc::new(AtomicUsize::new(0));
        let app = Router::new().fallback(answer_api_call).with_state(requests.clone());

        let (local_addr, shutdown, server_task) = serve("signalfx-api", addr, app).await?;
        tracing::info!("🪪 SignalFx API stub listening on {}", local_addr);

        Ok(Self {
            local_addr,
            requests,
            shutdown: Some(shutdown),
            server_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Calls answered so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.server_task).await {
            tracing::warn!("SignalFx API stub task ended abnormally: {}", e);
        }
        tracing::info!("🛑 SignalFx API stub on {} stopped after {} calls", self.local_addr, self.requests());
    }
}

async fn answer_api_call(State(requests): State<Arc<AtomicUsize>>, method: Method, uri: Uri) -> StatusCode {
    requests.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("🪪 SignalFx API call {} {}", method, uri);
    StatusCode::OK
}
