//! Engine-wide shared state and the TCP accept loop.

mod manager;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::buffer::MemoryPool;
use crate::config::{ConfigError, EngineConfig};
use crate::connection::HttpConnection;
use crate::handler::Handler;
use crate::timeout::{DateCache, DebuggerProbe, Heartbeat, HeartbeatHandler, ProcessDebugger};

pub use manager::ConnectionManager;

/// State shared by every connection of one engine.
pub struct EngineContext {
    pub config: EngineConfig,
    pub pool: MemoryPool,
    pub date: Arc<DateCache>,
    pub connections: Arc<ConnectionManager>,
    pub debugger: Arc<dyn DebuggerProbe>,
    debugger_refresh: Option<Arc<dyn HeartbeatHandler>>,
}

impl EngineContext {
    /// Validates `config` and probes the process for an attached debugger on every heartbeat.
    pub fn new(config: EngineConfig) -> Result<Arc<Self>, ConfigError> {
        let debugger = Arc::new(ProcessDebugger::new());
        let refresh = Arc::clone(&debugger) as Arc<dyn HeartbeatHandler>;
        Self::build(config, debugger, Some(refresh))
    }

    pub fn with_debugger(config: EngineConfig, debugger: Arc<dyn DebuggerProbe>) -> Result<Arc<Self>, ConfigError> {
        Self::build(config, debugger, None)
    }

    fn build(
        config: EngineConfig,
        debugger: Arc<dyn DebuggerProbe>,
        debugger_refresh: Option<Arc<dyn HeartbeatHandler>>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Self {
            pool: MemoryPool::new(config.block_size),
            date: Arc::new(DateCache::new()),
            connections: Arc::new(ConnectionManager::new()),
            debugger,
            debugger_refresh,
            config,
        }))
    }

    /// Starts ticking the date cache and every connection's timeouts. Stops when dropped.
    pub fn start_heartbeat(&self) -> Heartbeat {
        let mut handlers: Vec<Arc<dyn HeartbeatHandler>> =
            vec![Arc::clone(&self.date) as Arc<dyn HeartbeatHandler>, Arc::clone(&self.connections) as _];
        handlers.extend(self.debugger_refresh.clone());
        Heartbeat::start(handlers, self.config.heartbeat_interval)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

/// Accepts TCP connections and serves each one on its own task.
#[derive(Debug)]
pub struct Server {
    engine: Arc<EngineContext>,
}

impl Server {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self { engine: EngineContext::new(config)? })
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    /// Serves `listener` until `shutdown` resolves, then stops the open connections.
    ///
    /// Returns whether every connection closed within the shutdown timeout.
    pub async fn serve<H, S>(&self, listener: TcpListener, handler: Arc<H>, shutdown: S) -> bool
    where
        H: Handler + Sync + 'static,
        S: Future<Output = ()>,
    {
        let _heartbeat = self.engine.start_heartbeat();
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };
            tokio::spawn(serve_stream(stream, remote_addr, Arc::clone(&self.engine), Arc::clone(&handler)));
        }

        info!("stopped accepting connections");
        self.engine.connections.shutdown(self.engine.config.shutdown_timeout).await
    }
}

async fn serve_stream<H>(stream: TcpStream, remote_addr: SocketAddr, engine: Arc<EngineContext>, handler: Arc<H>)
where
    H: Handler + Sync + 'static,
{
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%remote_addr, cause = %e, "failed to set TCP_NODELAY");
    }
    let (reader, writer) = stream.into_split();
    if let Err(e) = HttpConnection::new(reader, writer, engine).process(handler).await {
        debug!(%remote_addr, cause = %e, "connection closed abnormally");
    }
}

/// Serves `listener` until Ctrl-C.
pub async fn serve<H>(listener: TcpListener, handler: H, config: EngineConfig) -> Result<bool, ConfigError>
where
    H: Handler + Sync + 'static,
{
    let server = Server::new(config)?;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "start listening");
    }
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(cause = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    Ok(server.serve(listener, Arc::new(handler), shutdown).await)
}
