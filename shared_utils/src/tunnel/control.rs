//! Built-in control-connection client.
//!
//! Dials the server, logs in with the shared token and keeps the control
//! connection alive with heartbeats until the server goes away or a
//! graceful close is requested. Messages are newline-delimited JSON.
//!
//! The protocol, TLS and DNS settings are validated, logged and announced in
//! the login message. The connection itself is always plain TCP through the
//! system resolver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::config::{Protocol, RunContext};
use crate::tunnel::error::{TunnelError, TunnelResult};
use crate::tunnel::service::{ServiceFactory, TunnelService};
use crate::tunnel::types::TunnelId;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Login {
        version: String,
        run_id: String,
        user: String,
        privilege_key: String,
        tls: bool,
        proxies: Vec<String>,
        visitors: Vec<String>,
    },
    Ping,
    Close,
}

/// Messages sent by the server; unknown kinds are ignored.
#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    error: String,
}

/// Control-connection client for one [`RunContext`].
#[derive(Debug)]
pub struct ControlClient {
    id: TunnelId,
    endpoint: String,
    protocol: Protocol,
    dns_server: Option<SocketAddr>,
    login: ControlMessage,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Duration,
    /// `Some(budget)` once a graceful close has been requested
    shutdown: watch::Sender<Option<Duration>>,
}

impl ControlClient {
    pub fn new(ctx: &RunContext) -> TunnelResult<Self> {
        let common = &ctx.common;
        if common.server_addr.is_empty() {
            return Err(TunnelError::Config("server_addr is empty".to_string()));
        }

        let dns_server = match common.dns_server.as_str() {
            "" => None,
            _ => Some(common.dns_server_addr().ok_or_else(|| {
                TunnelError::Config(format!("invalid dns_server {:?}", common.dns_server))
            })?),
        };

        let qualify = |name: &String| match common.user.as_str() {
            "" => name.clone(),
            user => format!("{}.{}", user, name),
        };
        let mut proxies: Vec<String> = ctx.proxies.keys().map(qualify).collect();
        let mut visitors: Vec<String> = ctx.visitors.keys().map(qualify).collect();
        proxies.sort();
        visitors.sort();

        let id = TunnelId::generate();
        if !common.login_fail_exit {
            warn!(
                tunnel_id = %id,
                "login_fail_exit = false is not supported, a failed login stops this instance"
            );
        }

        let login = ControlMessage::Login {
            version: CLIENT_VERSION.to_string(),
            run_id: id.to_string(),
            user: common.user.clone(),
            privilege_key: common.token.clone(),
            tls: common.tls_enable,
            proxies,
            visitors,
        };

        let (shutdown, _) = watch::channel(None);

        Ok(ControlClient {
            id,
            endpoint: common.server_endpoint(),
            protocol: common.protocol,
            dns_server,
            login,
            heartbeat_interval: match common.heartbeat_interval {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            heartbeat_timeout: Duration::from_secs(common.heartbeat_timeout),
            shutdown,
        })
    }

    fn handle_server_line(&self, line: &str) -> TunnelResult<()> {
        match serde_json::from_str::<ServerMessage>(line) {
            Ok(msg) if msg.kind == "login_resp" => {
                if !msg.error.is_empty() {
                    return Err(TunnelError::Authentication(msg.error));
                }
                info!(tunnel_id = %self.id, "Login to server success");
            }
            Ok(msg) => debug!(tunnel_id = %self.id, kind = %msg.kind, "Server message"),
            Err(_) => debug!(tunnel_id = %self.id, line, "Ignoring unrecognized server message"),
        }
        Ok(())
    }

    /// Stop sending work, let the server finish its side, give up after `budget`.
    async fn drain(
        &self,
        mut lines: Lines<BufReader<OwnedReadHalf>>,
        mut writer: OwnedWriteHalf,
        budget: Duration,
    ) -> TunnelResult<()> {
        let drain = async {
            let _ = send(&mut writer, &ControlMessage::Close).await;
            let _ = writer.shutdown().await;
            while let Ok(Some(_)) = lines.next_line().await {}
        };

        if tokio::time::timeout(budget, drain).await.is_err() {
            warn!(
                tunnel_id = %self.id,
                budget_ms = budget.as_millis() as u64,
                "Graceful close budget elapsed, dropping control connection"
            );
        }

        info!(tunnel_id = %self.id, "Control connection closed");
        Ok(())
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, msg: &ControlMessage) -> TunnelResult<()> {
    let mut line = serde_json::to_vec(msg).map_err(|e| TunnelError::Other(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

async fn close_requested(rx: &mut watch::Receiver<Option<Duration>>) -> Duration {
    loop {
        let requested = *rx.borrow_and_update();
        if let Some(budget) = requested {
            return budget;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

#[async_trait]
impl TunnelService for ControlClient {
    fn id(&self) -> &TunnelId {
        &self.id
    }

    async fn run(&self) -> TunnelResult<()> {
        let mut shutdown = self.shutdown.subscribe();

        info!(
            tunnel_id = %self.id,
            server = %self.endpoint,
            protocol = %self.protocol,
            dns_server = ?self.dns_server,
            "Connecting to server"
        );

        let stream = tokio::select! {
            res = TcpStream::connect(&self.endpoint) => res.map_err(|e| {
                TunnelError::Connection(format!("{}: {}", self.endpoint, e))
            })?,
            _ = close_requested(&mut shutdown) => {
                info!(tunnel_id = %self.id, "Closed before the control connection was established");
                return Ok(());
            }
        };

        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        send(&mut writer, &self.login).await?;

        let period = self.heartbeat_interval.unwrap_or(Duration::from_secs(3600));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        last_seen = Instant::now();
                        self.handle_server_line(&line)?;
                    }
                    None => {
                        warn!(tunnel_id = %self.id, "Control connection closed by server");
                        return Err(TunnelError::Closed);
                    }
                },
                _ = heartbeat.tick(), if self.heartbeat_interval.is_some() => {
                    if last_seen.elapsed() > self.heartbeat_timeout {
                        return Err(TunnelError::Timeout(format!(
                            "no server traffic for {}s",
                            self.heartbeat_timeout.as_secs()
                        )));
                    }
                    send(&mut writer, &ControlMessage::Ping).await?;
                }
                budget = close_requested(&mut shutdown) => {
                    return self.drain(lines, writer, budget).await;
                }
            }
        }
    }

    async fn graceful_close(&self, timeout: Duration) {
        info!(
            tunnel_id = %self.id,
            timeout_ms = timeout.as_millis() as u64,
            "Graceful close requested"
        );
        self.shutdown.send_replace(Some(timeout));
    }
}

/// Builds a [`ControlClient`] per context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlClientFactory;

#[async_trait]
impl ServiceFactory for ControlClientFactory {
    async fn create(&self, ctx: &RunContext) -> TunnelResult<Arc<dyn TunnelService>> {
        Ok(Arc::new(ControlClient::new(ctx)?))
    }
}
