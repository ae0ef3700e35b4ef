use std::sync::Arc;
use std::time::Duration;

use afkbot_client::client::{
    Credential, EventDispatcher, KeepaliveWorker, OutboundQueue, SessionState,
    run_outbound_worker,
};
use afkbot_client::config::{BotConfig, KeepaliveConfig, ReconnectConfig};
use afkbot_client::transport::{Connector, EVENT_CHANNEL_CAPACITY, ServerTarget};
use afkbot_events::{ClientEvent, SessionEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::calculate_delay;

/// How long teardown waits for the connection to close, and for each cycle
/// task before aborting it
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const SESSION_EVENT_CAPACITY: usize = 64;

/// The parts of a live cycle that outside producers may use
#[derive(Clone)]
pub struct ActiveSession {
    pub session: Arc<SessionState>,
    pub outbound: OutboundQueue,
}

/// Everything one session cycle owns
struct Cycle {
    session: Arc<SessionState>,
    teardown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    events_tx: Option<mpsc::Sender<ClientEvent>>,
    queue_rx: Option<mpsc::UnboundedReceiver<String>>,
}

/// Runs session cycles back to back, forever.
///
/// Each cycle connects, runs until the session stops, tears everything
/// down and sleeps for a delay chosen from the disconnect cause. Only a
/// shutdown signal (or Ctrl+C when none is given) ends the loop.
pub struct SessionRunner {
    connector: Arc<dyn Connector>,
    target: ServerTarget,
    credential: Credential,
    reconnect: ReconnectConfig,
    keepalive: KeepaliveConfig,
    active: watch::Sender<Option<ActiveSession>>,
    events: broadcast::Sender<SessionEvent>,
    last_cause: String,
    cycle: u64,
}

impl SessionRunner {
    pub fn new(connector: Arc<dyn Connector>, config: &BotConfig, credential: Credential) -> Self {
        let (active, _) = watch::channel(None);
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            connector,
            target: config.target(),
            credential,
            reconnect: config.reconnect.clone(),
            keepalive: config.keepalive.clone(),
            active,
            events,
            last_cause: String::new(),
            cycle: 0,
        }
    }

    /// Lifecycle events for observers
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The current cycle's session and chat queue, `None` between cycles
    pub fn active_session(&self) -> watch::Receiver<Option<ActiveSession>> {
        self.active.subscribe()
    }

    /// The most recent non-empty disconnect cause
    pub fn last_cause(&self) -> &str {
        &self.last_cause
    }

    fn publish(&self, event: SessionEvent) {
        // Having no subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn run(mut self, mut shutdown_rx: Option<watch::Receiver<bool>>) {
        info!(target: "runner", "Session runner started for {}", self.target);

        loop {
            self.cycle += 1;
            let mut cycle = self.start_cycle();

            let shutdown = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown_rx) => true,
                _ = self.connect_and_wait(&mut cycle) => false,
            };

            let cause = self.finish_cycle(cycle).await;
            if shutdown {
                break;
            }

            let backoff = calculate_delay(&cause, &self.reconnect);
            let shown_cause = if cause.is_empty() {
                "unknown"
            } else {
                cause.as_str()
            };
            if backoff.throttled {
                warn!(
                    target: "runner",
                    "Server is throttling connections, reconnecting in {}s (cause: {})",
                    backoff.delay.as_secs(),
                    shown_cause
                );
            } else {
                info!(
                    target: "runner",
                    "Reconnecting in {}s (cause: {})",
                    backoff.delay.as_secs(),
                    shown_cause
                );
            }
            self.publish(SessionEvent::ReconnectScheduled {
                cycle: self.cycle,
                delay_secs: backoff.delay.as_secs(),
                cause,
                throttled: backoff.throttled,
            });

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(backoff.delay) => {}
            }
        }

        info!(target: "runner", "Session runner stopped");
    }

    /// Fresh state for a new cycle, with the dispatcher already consuming
    /// the channel the transport will be handed.
    fn start_cycle(&self) -> Cycle {
        let session = Arc::new(SessionState::new());
        let (outbound, queue_rx) = OutboundQueue::channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (teardown, teardown_rx) = watch::channel(false);

        let dispatcher =
            EventDispatcher::new(session.clone(), self.credential.clone(), outbound.clone());
        let dispatcher = tokio::spawn(dispatcher.run(events_rx, teardown_rx));

        self.active.send_replace(Some(ActiveSession {
            session: session.clone(),
            outbound,
        }));

        Cycle {
            session,
            teardown,
            tasks: vec![("dispatcher", dispatcher)],
            events_tx: Some(events_tx),
            queue_rx: Some(queue_rx),
        }
    }

    /// Connect, start the workers and wait until the session stops.
    async fn connect_and_wait(&self, cycle: &mut Cycle) {
        let address = self.target.address();
        info!(
            target: "runner",
            "Connecting to {} as {} (attempt {})",
            address,
            self.target.username,
            self.cycle
        );
        self.publish(SessionEvent::ConnectingStarted {
            cycle: self.cycle,
            address,
        });

        let Some(events_tx) = cycle.events_tx.take() else {
            return;
        };

        match self.connector.connect(&self.target, events_tx).await {
            Ok(handle) => {
                cycle.session.set_handle(handle);
                info!(target: "runner", "Connection established");
                self.publish(SessionEvent::Connected { cycle: self.cycle });

                if let Some(queue_rx) = cycle.queue_rx.take() {
                    let outbound = tokio::spawn(run_outbound_worker(
                        cycle.session.clone(),
                        queue_rx,
                        cycle.teardown.subscribe(),
                    ));
                    cycle.tasks.push(("outbound", outbound));
                }

                let keepalive = KeepaliveWorker::new(cycle.session.clone(), self.keepalive.clone());
                let keepalive = tokio::spawn(keepalive.run(cycle.teardown.subscribe()));
                cycle.tasks.push(("keepalive", keepalive));
            }
            Err(e) => {
                error!(target: "runner", "Connection failed: {}", e);
                self.publish(SessionEvent::ConnectFailed {
                    cycle: self.cycle,
                    reason: e.to_string(),
                });
                cycle.session.stop();
            }
        }

        cycle.session.stopped().await;
    }

    /// Tear the cycle down and return the cause to classify.
    async fn finish_cycle(&mut self, cycle: Cycle) -> String {
        let Cycle {
            session,
            teardown,
            tasks,
            ..
        } = cycle;

        self.active.send_replace(None);

        if let Some(handle) = session.clear_handle() {
            debug!(target: "runner", "Closing connection");
            if tokio::time::timeout(JOIN_TIMEOUT, handle.disconnect()).await.is_err() {
                warn!(
                    target: "runner",
                    "Connection did not close within {:?}, dropping it",
                    JOIN_TIMEOUT
                );
            }
        }
        session.stop();
        let _ = teardown.send(true);

        for (name, mut task) in tasks {
            match tokio::time::timeout(JOIN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => debug!(target: "runner", "{} task finished", name),
                Ok(Err(e)) => error!(target: "runner", "{} task panicked: {}", name, e),
                Err(_) => {
                    warn!(
                        target: "runner",
                        "{} task did not finish within {:?}, aborting",
                        name,
                        JOIN_TIMEOUT
                    );
                    task.abort();
                }
            }
        }

        let cause = match session.disconnect_cause().filter(|cause| !cause.is_empty()) {
            Some(cause) => {
                self.last_cause = cause.clone();
                cause
            }
            None => self.last_cause.clone(),
        };

        if cause.is_empty() {
            info!(target: "runner", "Session ended");
        } else {
            info!(target: "runner", "Session ended: {}", cause);
        }
        self.publish(SessionEvent::Disconnected {
            cycle: self.cycle,
            cause: cause.clone(),
        });
        cause
    }
}

/// Resolves when the process should stop: the shutdown channel turns true,
/// or Ctrl+C when no channel was given.
async fn shutdown_requested(shutdown_rx: &mut Option<watch::Receiver<bool>>) {
    match shutdown_rx {
        Some(rx) => {
            let signalled = rx.wait_for(|stop| *stop).await.is_ok();
            if signalled {
                info!(target: "runner", "Received shutdown signal");
                return;
            }
            // Sender gone; nobody can ask us to stop any more
            std::future::pending::<()>().await
        }
        None => match tokio::signal::ctrl_c().await {
            Ok(()) => info!(target: "runner", "Received Ctrl+C, shutting down gracefully..."),
            Err(e) => {
                error!(target: "runner", "Unable to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await
            }
        },
    }
}
