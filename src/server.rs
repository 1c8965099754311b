use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnectionSession, LinesReader, LinesWriter};
use crate::errors::ServerError;
use crate::handler::RequestHandler;
use crate::pool::WorkerPool;
use crate::stats::StatsStore;

pub struct ComputeServer {
    config: ServerConfig,
    stats: Arc<StatsStore>,
    listener: Option<TcpListener>,
}

impl ComputeServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            config,
            stats: Arc::new(StatsStore::new()),
            listener: None,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Timing records shared by every connection of this server.
    pub fn stats(&self) -> Arc<StatsStore> {
        self.stats.clone()
    }

    /// Binds the listening socket without accepting yet. Returns the bound address, which
    /// differs from the configured one when port 0 was requested.
    pub async fn bind(&mut self) -> Result<SocketAddr, ServerError> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        let addr = listener.local_addr()?;
        info!("listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    /// Accepts connections forever, one session task each. Binds first if
    /// [`ComputeServer::bind`] was not called; accept errors are logged and skipped.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        self.bind().await?;
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| ServerError::ConnectionError("listener not bound".to_string()))?;

        let pool = Arc::new(WorkerPool::new(self.config.worker_threads()));
        let handler = RequestHandler::new(self.stats.clone());
        info!(workers = pool.width(), "accepting connections");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!("accept failed: {}", err);
                    continue;
                }
            };
            tokio::spawn(Self::serve(
                stream,
                peer,
                handler.clone(),
                pool.clone(),
                self.config.clone(),
            ));
        }
    }

    async fn serve(
        stream: TcpStream,
        peer: SocketAddr,
        handler: RequestHandler,
        pool: Arc<WorkerPool>,
        config: ServerConfig,
    ) {
        if let Err(err) = stream.set_nodelay(true) {
            warn!(%peer, "failed to set TCP_NODELAY: {}", err);
        }
        let (read_half, write_half) = stream.into_split();
        let session = ConnectionSession::new(
            peer.to_string(),
            LinesReader::new(read_half, config.max_line_length()),
            LinesWriter::new(write_half),
            handler,
            pool,
            config.idle_timeout(),
        );
        session.run().await;
    }
}
