/// Live event-channel connection
///
/// Exactly one connection exists per authenticated session. Consumers only
/// see it through `subscribe` (inbound events plus lifecycle notices) and
/// `emit` (fire-and-forget outbound). Only this module creates or destroys
/// the underlying socket.
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::events::{ChannelEvent, ClientEvent, ServerEvent};
use crate::wire::{read_frame, write_event};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

/// Capacity of the fan-out buffer; a lagging subscriber skips, not blocks
const EVENT_BUFFER: usize = 256;

/// Outbound capability handed to components. Emits are fire-and-forget and
/// silently dropped while disconnected; callers needing delivery use the
/// REST fallback instead.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClientEvent);
    fn connected(&self) -> bool;
}

pub struct ConnectionManager {
    config: Config,
    events: broadcast::Sender<ChannelEvent>,
    outbound_tx: mpsc::UnboundedSender<ClientEvent>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<ClientEvent>>>,
    connected: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    shutdown: Arc<AtomicBool>,
    task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionManager {
    pub fn new(config: Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            config,
            events,
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            connected: Arc::new(AtomicBool::new(false)),
            attempts: Arc::new(AtomicU32::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
            task: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Start the connection loop. Idempotent: calling while the loop is
    /// alive reuses the existing connection.
    pub fn connect(&self, token: &str) {
        let mut guard = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                debug!("connect called while already connected, reusing");
                return;
            }
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let manager = self.clone();
        let token = token.to_string();
        *guard = Some(tokio::spawn(async move {
            manager.run(token).await;
        }));
    }

    /// Subscribe to inbound events and lifecycle notices. Receivers are
    /// bound to this manager instance; a new session gets a new manager.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Consecutive failed reconnect attempts in the current outage
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Tear down the connection and stop reconnecting. Used on logout or
    /// session end; the manager is not reusable afterwards.
    pub fn dispose(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        let mut guard = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        let _ = self.events.send(ChannelEvent::Down);
        info!("Connection disposed");
    }

    fn notify(&self, event: ChannelEvent) {
        // No receivers is fine (e.g. during teardown)
        let _ = self.events.send(event);
    }

    async fn run(self, token: String) {
        // Held for the lifetime of the loop so a re-issued connect after
        // the ceiling was hit picks the receiver back up
        let mut outbound = self.outbound_rx.lock().await;

        let mut consecutive_failures: u32 = 0;
        let mut degraded_notified = false;
        let mut recovering = false;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match timeout(self.config.connect_timeout, TcpStream::connect(self.config.event_addr))
                .await
            {
                Ok(Ok(mut stream)) => {
                    if let Err(e) =
                        write_event(&mut stream, &ClientEvent::Auth { token: token.clone() }).await
                    {
                        warn!("Auth frame failed: {}", e);
                    } else {
                        info!("Event channel connected to {}", self.config.event_addr);
                        // No queuing across connections: anything emitted
                        // against the previous instance is stale
                        while outbound.try_recv().is_ok() {}
                        self.connected.store(true, Ordering::SeqCst);
                        self.attempts.store(0, Ordering::SeqCst);
                        consecutive_failures = 0;

                        if degraded_notified {
                            self.notify(ChannelEvent::Restored);
                            degraded_notified = false;
                        } else if recovering {
                            self.notify(ChannelEvent::Restored);
                        }
                        recovering = false;
                        self.notify(ChannelEvent::Up);

                        if let Err(e) = self.drive(stream, &mut outbound).await {
                            warn!("Event channel error: {}", e);
                        }

                        self.connected.store(false, Ordering::SeqCst);
                        self.notify(ChannelEvent::Down);
                        recovering = true;

                        if self.shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        // Dropped connections retry immediately once, then
                        // back off like any other failure
                        continue;
                    }
                }
                Ok(Err(e)) => {
                    warn!("Failed to connect to {}: {}", self.config.event_addr, e);
                }
                Err(_) => {
                    warn!("Connection timeout to {}", self.config.event_addr);
                }
            }

            consecutive_failures += 1;
            recovering = true;
            self.attempts.store(consecutive_failures, Ordering::SeqCst);

            if consecutive_failures >= self.config.degraded_after && !degraded_notified {
                self.notify(ChannelEvent::Degraded);
                degraded_notified = true;
            }

            if consecutive_failures >= self.config.max_reconnect_attempts {
                error!(
                    "Giving up after {} reconnect attempts",
                    consecutive_failures
                );
                break;
            }

            sleep(self.backoff_delay(consecutive_failures)).await;
        }

        self.connected.store(false, Ordering::SeqCst);
    }

    /// Exponential backoff capped at `reconnect_cap`, with jitter so a
    /// fleet of clients does not reconnect in lockstep
    fn backoff_delay(&self, failures: u32) -> std::time::Duration {
        let shift = failures.saturating_sub(1).min(6);
        let base = self
            .config
            .reconnect_initial
            .saturating_mul(1u32 << shift)
            .min(self.config.reconnect_cap);
        let jitter = rand::thread_rng().gen_range(0..250);
        base + std::time::Duration::from_millis(jitter)
    }

    /// Pump one established connection until it drops. Reads and writes
    /// run as separate loops so an outbound write never cancels a frame
    /// read halfway through its bytes.
    async fn drive(
        &self,
        stream: TcpStream,
        outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        let write_loop = async {
            while let Some(event) = outbound.recv().await {
                write_event(&mut writer, &event).await?;
            }
            Ok::<(), ChatError>(()) // session over, sender side gone
        };

        let read_loop = async {
            loop {
                let frame =
                    match timeout(self.config.keepalive_timeout, read_frame(&mut reader)).await {
                        Ok(result) => result?,
                        Err(_) => {
                            warn!("Keepalive timeout, dropping connection");
                            return Ok(());
                        }
                    };
                let frame = match frame {
                    Some(frame) => frame,
                    None => {
                        debug!("Event channel closed by server");
                        return Ok(());
                    }
                };
                match frame.decode::<ServerEvent>() {
                    Ok(ServerEvent::Ping { timestamp }) => {
                        trace!("Ping from server");
                        // Replies queue through the writer loop
                        let _ = self.outbound_tx.send(ClientEvent::Pong { timestamp });
                    }
                    Ok(event) => {
                        trace!("Inbound event: {}", event.event_type());
                        self.notify(ChannelEvent::Server(event));
                    }
                    Err(e) => {
                        // A malformed event never takes the channel down
                        warn!("Undecodable event skipped: {}", e);
                    }
                }
            }
        };

        tokio::select! {
            result = write_loop => result,
            result = read_loop => result,
        }
    }
}

impl EventSink for ConnectionManager {
    fn emit(&self, event: ClientEvent) {
        if !self.connected.load(Ordering::SeqCst) {
            trace!("Emit while disconnected, dropped");
            return;
        }
        let _ = self.outbound_tx.send(event);
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Clone for ConnectionManager {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            events: self.events.clone(),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: self.outbound_rx.clone(),
            connected: self.connected.clone(),
            attempts: self.attempts.clone(),
            shutdown: self.shutdown.clone(),
            task: self.task.clone(),
        }
    }
}
