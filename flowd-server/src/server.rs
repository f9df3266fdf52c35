//! TCP server implementation.

use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::session::{Session, SessionState};
use flowd_core::WorkflowEngine;
use flowd_protocol::{codec, ErrorCode, LineDecoder, Request, Response, ResponseError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Maximum length of a single request line in bytes.
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", flowd_protocol::DEFAULT_PORT)
                .parse()
                .expect("default bind address is valid"),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            max_line_bytes: flowd_protocol::MAX_LINE_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds a server config from the loaded file/env configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            max_line_bytes: config.network.max_line_bytes,
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for flowd.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, engine: Arc<WorkflowEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(CommandHandler::new(engine)),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Signals the server to stop accepting connections and close
    /// existing ones.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_on(listener).await
    }

    /// Serves on an already-bound listener until shutdown.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(addr = %listener.local_addr()?, "server listening");

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!(%addr, "connection limit reached, rejecting");
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    stream,
                                    addr,
                                    handler,
                                    config,
                                    stats.clone(),
                                    &mut conn_shutdown,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!(%addr, error = %e, "connection error");
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!(%addr, "client disconnected");
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handles a single connection.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<CommandHandler>,
        config: ServerConfig,
        stats: Arc<ServerStats>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(%addr, "client connected");

        let mut session = Session::new(addr);
        let mut decoder = LineDecoder::with_max_line(config.max_line_bytes);
        let mut buf = [0u8; 8192];

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(%addr, "closing connection on shutdown");
                    return Ok(());
                }
                result = tokio::time::timeout(config.idle_timeout, stream.read(&mut buf)) => {
                    match result {
                        Err(_) => {
                            tracing::info!(%addr, "closing idle connection");
                            return Ok(());
                        }
                        Ok(Ok(0)) => {
                            tracing::debug!(%addr, "connection closed by client");
                            return Ok(());
                        }
                        Ok(Ok(n)) => {
                            decoder.extend(&buf[..n]);
                        }
                        Ok(Err(e)) => {
                            return Err(ServerError::Io(e));
                        }
                    }
                }
            }

            loop {
                match decoder.decode_line::<Request>() {
                    Ok(Some(request)) => {
                        stats.requests_total.fetch_add(1, Ordering::Relaxed);

                        let response = handler.handle(&mut session, &request);
                        if response.is_error() {
                            stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        }

                        stream.write_all(&codec::encode(&response)?).await?;

                        if session.state() == SessionState::Closing {
                            tracing::debug!(
                                %addr,
                                requests = session.request_count(),
                                "session closed by client"
                            );
                            return Ok(());
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // Framing is unrecoverable mid-stream; report
                        // and drop the connection.
                        tracing::debug!(%addr, error = %e, "protocol error");
                        let response = Response::error(
                            "",
                            ResponseError::new(ErrorCode::BadRequest, e.to_string()),
                        );
                        stream.write_all(&codec::encode(&response)?).await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowd_protocol::{Operation, ResponseStatus, PROTOCOL_VERSION};
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio_test::assert_ok;

    async fn start_server() -> (Arc<Server>, SocketAddr) {
        let engine = Arc::new(WorkflowEngine::new());
        let server = Arc::new(Server::new(ServerConfig::default(), engine));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = server.clone();
        tokio::spawn(async move { running.run_on(listener).await });

        (server, addr)
    }

    async fn send(
        write: &mut tokio::net::tcp::OwnedWriteHalf,
        request: &Request,
    ) {
        write
            .write_all(&codec::encode(request).unwrap())
            .await
            .unwrap();
    }

    async fn recv(
        lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    ) -> Response {
        let line = tokio_test::assert_ok!(lines.next_line().await).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_workflow_session() {
        let (server, addr) = start_server().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        // Handshake
        send(
            &mut write,
            &Request::new("1", Operation::Hello)
                .with_params(json!({"protocol_version": PROTOCOL_VERSION})),
        )
        .await;
        let hello = recv(&mut lines).await;
        assert_eq!(hello.status, ResponseStatus::Ok);

        // Register a definition
        send(
            &mut write,
            &Request::new("2", Operation::RegisterDefinition).with_params(json!({
                "definition": {
                    "id": "ticket",
                    "states": [
                        {"id": "open", "is_initial": true},
                        {"id": "closed", "is_final": true}
                    ],
                    "actions": [
                        {"id": "close", "from_states": ["open"], "to_state": "closed"}
                    ]
                }
            })),
        )
        .await;
        let registered = recv(&mut lines).await;
        assert_eq!(registered.status, ResponseStatus::Ok, "{:?}", registered.error);

        // Create an instance and execute the action
        send(
            &mut write,
            &Request::new("3", Operation::CreateInstance)
                .with_params(json!({"definition_id": "ticket"})),
        )
        .await;
        let created = recv(&mut lines).await;
        let instance_id = created.result.unwrap()["instance"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        send(
            &mut write,
            &Request::new("4", Operation::ExecuteAction)
                .with_params(json!({"instance_id": instance_id, "action_id": "close"})),
        )
        .await;
        let executed = recv(&mut lines).await;
        let instance = executed.result.unwrap()["instance"].clone();
        assert_eq!(instance["current_state"], "closed");
        assert_eq!(instance["history"][0]["action_id"], "close");

        // Goodbye closes the connection
        send(&mut write, &Request::new("5", Operation::Bye)).await;
        let bye = recv(&mut lines).await;
        assert_eq!(bye.status, ResponseStatus::Ok);
        assert!(tokio_test::assert_ok!(lines.next_line().await).is_none());

        assert_eq!(server.stats().requests_total.load(Ordering::Relaxed), 5);
        server.shutdown();
    }

    #[tokio::test]
    async fn malformed_line_gets_bad_request_and_disconnect() {
        let (server, addr) = start_server().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"this is not json\n").await.unwrap();
        let response = recv(&mut lines).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error.unwrap().code, ErrorCode::BadRequest);

        assert!(tokio_test::assert_ok!(lines.next_line().await).is_none());
        server.shutdown();
    }

    #[tokio::test]
    async fn two_pipelined_requests_get_two_responses() {
        let (server, addr) = start_server().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        // Two requests in one write; the decoder drains both.
        let mut data = codec::encode(&Request::new("a", Operation::Ping)).unwrap();
        data.extend(codec::encode(&Request::new("b", Operation::Ping)).unwrap());
        write.write_all(&data).await.unwrap();

        assert_eq!(recv(&mut lines).await.id, "a");
        assert_eq!(recv(&mut lines).await.id, "b");
        server.shutdown();
    }
}
