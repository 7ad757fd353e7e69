// UDP command client
//
// On startup a short hello is sent to the command server so it learns our
// address. After that a background task polls the non-blocking socket at a
// fixed interval and feeds every datagram from the server's IP through the
// command arbiter.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, NetworkConfig, HELLO_PAYLOAD};
use crate::control::CommandArbiter;
use crate::messages::Command;

const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("UDP error: {0}")]
    Io(#[from] io::Error),
}

pub struct NetworkClient {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
}

impl NetworkClient {
    /// Bind the local socket and send the hello to the server
    pub async fn connect(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let server = config.server_addr()?;
        let socket = UdpSocket::bind(config.bind_addr()?).await?;

        socket.send_to(HELLO_PAYLOAD, server).await?;
        info!("Sent hello to command server {}", server);

        Ok(Self {
            socket: Arc::new(socket),
            server,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start polling the socket every `period`
    pub fn spawn_listener(&self, arbiter: CommandArbiter, period: Duration) -> Listener {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(listen(
            Arc::clone(&self.socket),
            self.server.ip(),
            arbiter,
            period,
            rx,
        ));
        info!("UDP listener started ({}ms poll)", period.as_millis());
        Listener { shutdown, handle }
    }

    /// Drop the socket. The listener must already be stopped.
    pub fn close(self) {
        drop(self.socket);
        info!("UDP client disconnected");
    }
}

/// Handle to the background listener task
pub struct Listener {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Signal the task to exit and wait for it
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.handle.await
    }
}

async fn listen(
    socket: Arc<UdpSocket>,
    server_ip: IpAddr,
    arbiter: CommandArbiter,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(period);
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => break,
        }

        // Drain everything queued since the last tick
        loop {
            match socket.try_recv_from(&mut buf) {
                Ok((len, from)) => handle_datagram(&buf[..len], from, server_ip, &arbiter),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("UDP receive failed: {}", e);
                    break;
                }
            }
        }
    }
    debug!("UDP listener stopped");
}

/// Parse and dispatch one datagram. Anything malformed is logged and dropped.
fn handle_datagram(data: &[u8], from: SocketAddr, server_ip: IpAddr, arbiter: &CommandArbiter) {
    if from.ip() != server_ip {
        debug!("Ignoring datagram from {}", from);
        return;
    }

    match Command::from_datagram(data) {
        Ok(command) => {
            debug!("Received {:?} from {}", command, from);
            arbiter.dispatch(command);
        }
        Err(e) => warn!(
            "Dropping message {:?}: {}",
            String::from_utf8_lossy(data),
            e
        ),
    }
}
