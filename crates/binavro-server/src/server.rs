//! CDC TCP server
//!
//! Accepts client connections and drives each one through the session state
//! machine on its own task. Replies are line-oriented; once a session enters
//! `RequestData` the connection becomes a one-way record stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::protocol::{
    parse_request, ClientFormat, Request, ERR_REGISTRATION, OK_RESPONSE,
};
use crate::session::{DataStream, SessionState, StreamHub};

/// How long a caught-up session sleeps before re-checking for data even
/// without a flush notification; covers rotation to a new version file.
const IDLE_RECHECK: Duration = Duration::from_millis(500);

/// The CDC serving endpoint.
pub struct CdcServer {
    hub: Arc<StreamHub>,
    listener: Option<TcpListener>,
}

impl CdcServer {
    /// Bind the listener up front so the bound address is known before the
    /// accept loop starts.
    pub async fn bind(addr: &str, hub: Arc<StreamHub>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            hub,
            listener: Some(listener),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener
            .as_ref()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "server not bound")
            })
            .and_then(|l| l.local_addr())
    }

    /// Run the accept loop forever.
    pub async fn start(mut self) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("server already started"))?;
        info!("CDC server listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("new CDC client from {addr}");
                    let hub = Arc::clone(&self.hub);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, hub).await {
                            debug!("client {addr} closed: {e:#}");
                        }
                    });
                }
                Err(e) => {
                    error!("accept failed: {e}");
                }
            }
        }
    }
}

/// Drive one client through registration and into streaming.
async fn handle_connection(stream: TcpStream, hub: Arc<StreamHub>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let mut state = SessionState::Unregistered;
    let mut format = ClientFormat::Avro;
    let mut uuid = String::new();

    let data_stream = loop {
        let Some(line) = lines.next_line().await? else {
            // Client went away before requesting data.
            return Ok(());
        };

        match (state, parse_request(&line)) {
            (SessionState::Unregistered, Request::Register { uuid: id, format: f }) => {
                uuid = id;
                format = f;
                state = SessionState::Registered;
                reply(&mut write_half, OK_RESPONSE).await?;
                info!(client = %uuid, ?format, "client registered");
            }
            (SessionState::Unregistered, Request::BadRegister) => {
                reply(&mut write_half, ERR_REGISTRATION).await?;
                return Ok(());
            }
            (SessionState::Registered, Request::RequestData { filestem, gtid }) => {
                // Seek-to-GTID only applies to the JSON record path.
                let seek = gtid.filter(|_| format == ClientFormat::Json);
                match DataStream::open(Arc::clone(&hub), &filestem, format, seek) {
                    Ok(stream) => break stream,
                    Err(filename) => {
                        reply(
                            &mut write_half,
                            &format!("ERR NO-FILE File '{filename}' not found."),
                        )
                        .await?;
                    }
                }
            }
            (_, Request::BadRequestData { reply: msg }) => {
                reply(&mut write_half, msg).await?;
            }
            (SessionState::Unregistered, _) => {
                // Nothing but registration is valid before registering.
                reply(&mut write_half, ERR_REGISTRATION).await?;
                return Ok(());
            }
            (_, Request::Unknown(text)) => {
                reply(&mut write_half, &format!("ECHO:{text}")).await?;
            }
            (_, _) => {
                reply(&mut write_half, &format!("ECHO:{}", line.trim_end())).await?;
            }
        }
    };

    stream_records(data_stream, &mut write_half, &hub, &uuid).await
}

/// The `RequestData` phase: schema preamble, then records until the client
/// disconnects. A failed socket write surfaces as an error and tears the
/// session down.
async fn stream_records(
    mut stream: DataStream,
    out: &mut OwnedWriteHalf,
    hub: &Arc<StreamHub>,
    uuid: &str,
) -> anyhow::Result<()> {
    stream.send_preamble(out).await?;

    loop {
        let progress = stream.drain(out).await?;
        if progress.bytes_sent > 0 {
            debug!(client = %uuid, bytes = progress.bytes_sent, "sent records");
        }
        if !progress.more {
            tokio::select! {
                _ = hub.wait_for_data() => {}
                _ = tokio::time::sleep(IDLE_RECHECK) => {}
            }
        }
    }
}

async fn reply(out: &mut OwnedWriteHalf, message: &str) -> std::io::Result<()> {
    out.write_all(message.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
