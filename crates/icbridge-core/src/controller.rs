// ── Controller abstraction ──
//
// Lifecycle of one controller connection: starts the session, runs
// discovery on every (re)connect, routes change notifications into the
// registry, and turns commands into protocol writes.
//
// All inbound traffic is handled by a single dispatch task so that
// updates apply in exactly the order the controller sent them.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use icbridge_api::codec::QueryName;
use icbridge_api::{Message, Request, Session, SessionEvent, SessionSender};
use serde_json::Value;
use strum::Display;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{self, Command, CommandResult};
use crate::config::BridgeConfig;
use crate::convert;
use crate::discovery::{Discovery, DiscoveryStep};
use crate::error::CoreError;
use crate::model::{Circuit, HeaterView, Panel, Pump};
use crate::store::{
    BODY_SUBSCRIPTION, EntityEvent, EntityRegistry, FEATURE_SUBSCRIPTION,
    PUMP_CIRCUIT_SUBSCRIPTION, TopologySummary,
};

/// Pause between the writes of a multi-step command, so the controller
/// has absorbed one before the next arrives.
const COMMAND_STEP_DELAY: Duration = Duration::from_millis(10);

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected; discovery queries in flight.
    Discovering,
    /// Discovery complete, registry live.
    Ready,
    /// Connection lost; waiting out the reconnect delay.
    Reconnecting,
}

// ── Controller ───────────────────────────────────────────────────────

/// Main entry point for consumers. Cheaply cloneable.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: BridgeConfig,
    registry: Arc<EntityRegistry>,
    connection_state: watch::Sender<ConnectionState>,
    /// Summary of the most recent completed discovery.
    discovered: watch::Sender<Option<TopologySummary>>,
    sender: ArcSwapOption<SessionSender>,
    session: Mutex<Option<Session>>,
    /// Token of the current connection; replaced on every `connect()`.
    cancel: ArcSwap<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller. Does not connect; call
    /// [`connect()`](Self::connect).
    pub fn new(config: BridgeConfig) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (discovered, _) = watch::channel(None);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                registry: Arc::new(EntityRegistry::new()),
                connection_state,
                discovered,
                sender: ArcSwapOption::empty(),
                session: Mutex::new(None),
                cancel: ArcSwap::from_pointee(CancellationToken::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the session and start the dispatch task. Discovery starts as
    /// soon as the connection is up; use
    /// [`wait_for_discovery`](Self::wait_for_discovery) to await it.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.set_state(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        self.inner.cancel.store(Arc::new(cancel.clone()));

        let session_config = self.inner.config.session_config();
        let (session, events) =
            match Session::connect(session_config, cancel.child_token()).await {
                Ok(pair) => pair,
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e.into());
                }
            };

        self.inner.sender.store(Some(Arc::new(session.sender())));
        *self.inner.session.lock().await = Some(session);

        let ctrl = self.clone();
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(dispatch_task(ctrl, events, cancel)));

        info!(addr = %self.inner.config.addr(), "connected to controller");
        Ok(())
    }

    /// Wait until a discovery has completed on the current connection.
    pub async fn wait_for_discovery(&self, timeout: Duration) -> Result<TopologySummary, CoreError> {
        let mut state = self.inner.connection_state.subscribe();
        let ready = tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Ready))
            .await
            .map_err(|_| CoreError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?;
        ready.map_err(|_| CoreError::ControllerDisconnected)?;

        let summary = *self.inner.discovered.borrow();
        Ok(summary.unwrap_or_default())
    }

    /// Stop the session, the dispatch task and any pending reconnect.
    /// In-flight discovery is discarded. The controller can be connected
    /// again afterwards.
    pub async fn disconnect(&self) {
        self.inner.cancel.load().cancel();
        self.inner.sender.store(None);

        let session = self.inner.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        self.inner.registry.mark_stale();
        self.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// One-shot: connect, wait for discovery, run `f`, disconnect.
    pub async fn oneshot<F, Fut, T>(
        config: BridgeConfig,
        discovery_timeout: Duration,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let controller = Controller::new(config);
        controller.connect().await?;
        let result = match controller.wait_for_discovery(discovery_timeout).await {
            Ok(_) => f(controller.clone()).await,
            Err(e) => Err(e),
        };
        controller.disconnect().await;
        result
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.connection_state.send_replace(state);
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Validate and send a command. Multi-step commands are written in
    /// order with a short pause between steps.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if *self.inner.connection_state.borrow() != ConnectionState::Ready {
            return Err(CoreError::ControllerDisconnected);
        }

        let requests = command::build_requests(&cmd, &self.inner.registry, &self.inner.config)?;
        let mut result = CommandResult::default();
        for (step, request) in requests.into_iter().enumerate() {
            if step > 0 {
                tokio::time::sleep(COMMAND_STEP_DELAY).await;
            }
            result.message_ids.push(self.send_raw(request)?);
        }
        debug!(?cmd, message_ids = ?result.message_ids, "command sent");
        Ok(result)
    }

    /// Queue a request as-is. Returns its message id.
    pub fn send_raw(&self, request: Request) -> Result<String, CoreError> {
        let guard = self.inner.sender.load();
        let sender = guard.as_ref().ok_or(CoreError::ControllerDisconnected)?;
        let message_id = request.message_id.clone();
        sender.send(request);
        Ok(message_id)
    }

    /// Ask for change notifications of `keys` on `object_id`.
    pub fn subscribe(&self, object_id: &str, keys: &[&str]) -> Result<String, CoreError> {
        self.send_raw(Request::subscribe(object_id, keys.iter().copied()))
    }

    // ── State observation ────────────────────────────────────────────

    /// Counts from the most recent completed discovery, if any.
    pub fn discovery_summary(&self) -> Option<TopologySummary> {
        *self.inner.discovered.borrow()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Entity notifications (`Created` / `Changed`).
    pub fn events(&self) -> broadcast::Receiver<Arc<EntityEvent>> {
        self.inner.registry.events()
    }

    // ── Snapshots (delegate to the registry) ─────────────────────────

    pub fn circuits_snapshot(&self) -> Arc<Vec<Arc<Circuit>>> {
        self.inner.registry.circuits_snapshot()
    }

    pub fn heaters_snapshot(&self) -> Arc<Vec<Arc<HeaterView>>> {
        self.inner.registry.heaters_snapshot()
    }

    pub fn pumps_snapshot(&self) -> Arc<Vec<Arc<Pump>>> {
        self.inner.registry.pumps_snapshot()
    }

    pub fn topology(&self) -> Arc<Vec<Panel>> {
        self.inner.registry.topology()
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// Single consumer of session events. Owns the discovery in progress, if
/// any, so a reconnect simply replaces it.
async fn dispatch_task(
    controller: Controller,
    mut events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut discovery: Option<Discovery> = None;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                handle_event(&controller, &mut discovery, event);
            }
        }
    }

    if discovery.take().is_some() {
        debug!("discarding in-flight discovery");
    }
    debug!("dispatch task exiting");
}

fn handle_event(controller: &Controller, discovery: &mut Option<Discovery>, event: SessionEvent) {
    let registry = &controller.inner.registry;
    match event {
        SessionEvent::Connected { generation } => {
            registry.mark_stale();
            let (started, request) = Discovery::start(generation);
            if let Some(previous) = discovery.replace(started) {
                debug!(
                    previous = previous.generation(),
                    generation, "abandoning discovery from earlier connection"
                );
            }
            controller.set_state(ConnectionState::Discovering);
            info!(generation, "starting discovery");
            send_or_log(controller, request);
        }

        SessionEvent::Message {
            generation,
            message,
        } => handle_message(controller, discovery, generation, message),

        SessionEvent::Disconnected { generation, reason } => {
            *discovery = None;
            registry.mark_stale();
            controller.set_state(ConnectionState::Reconnecting);
            warn!(generation, %reason, "controller connection lost, registry is stale");
        }

        SessionEvent::ReconnectFailed { error } => {
            controller.set_state(ConnectionState::Reconnecting);
            warn!(%error, "reconnect attempt failed");
        }

        SessionEvent::SendFailed { message_id, error } => {
            warn!(%message_id, %error, "request was not sent");
        }

        SessionEvent::DecodeFailed { generation, error } => {
            debug!(generation, %error, "skipped undecodable line");
        }

        SessionEvent::FrameOverflow { generation, limit } => {
            debug!(generation, limit, "frame buffer overflow, partial data discarded");
        }
    }
}

fn handle_message(
    controller: &Controller,
    discovery: &mut Option<Discovery>,
    generation: u64,
    message: Message,
) {
    match message {
        Message::Failed {
            status,
            command,
            message_id,
            description,
        } => {
            warn!(
                %status,
                %command,
                ?message_id,
                description = description.as_deref().unwrap_or_default(),
                "controller reported a failure"
            );
        }

        Message::Acknowledged {
            command,
            message_id,
        } => {
            debug!(%command, ?message_id, "acknowledged");
        }

        Message::QueryReply {
            message_id,
            query_name,
            answer,
        } => {
            if query_name.as_deref() != Some(QueryName::GetHardwareDefinition.as_ref()) {
                debug!(?query_name, ?message_id, "ignoring reply to unrelated query");
                return;
            }
            let Some(active) = discovery.as_mut() else {
                debug!(?message_id, "discovery reply with no discovery running");
                return;
            };
            match active.accept(generation, message_id.as_deref(), answer) {
                DiscoveryStep::Next(request) => {
                    debug!(category = ?active.current_category(), "requesting next category");
                    send_or_log(controller, request);
                }
                DiscoveryStep::Complete(tree) => {
                    *discovery = None;
                    finish_discovery(controller, generation, &tree);
                }
                DiscoveryStep::Stale => {}
            }
        }

        Message::Changes {
            source, changes, ..
        } => {
            debug!(?source, count = changes.len(), "routing changes");
            let registry = &controller.inner.registry;
            for change in changes {
                registry.apply_change(&change.object_id, &change.params);
            }
        }

        Message::Unhandled {
            command,
            message_id,
        } => {
            debug!(%command, ?message_id, "unhandled message");
        }
    }
}

/// Transform the merged tree, swap it into the registry, subscribe to
/// every exposed object, then announce the entities.
fn finish_discovery(controller: &Controller, generation: u64, tree: &Value) {
    let registry = &controller.inner.registry;
    let panels = convert::transform(tree);
    if panels.is_empty() {
        warn!(generation, "discovery produced no panels");
    }

    let summary = registry.replace_topology(panels);
    subscribe_all(controller, registry);
    registry.announce();

    controller.inner.discovered.send_replace(Some(summary));
    controller.set_state(ConnectionState::Ready);
    info!(
        generation,
        circuits = summary.circuits,
        heaters = summary.heaters,
        pumps = summary.pumps,
        "discovery complete"
    );
}

fn subscribe_all(controller: &Controller, registry: &EntityRegistry) {
    let circuits = registry.circuits_snapshot();

    let pump_circuits = circuits
        .iter()
        .filter_map(|c| c.pump.as_ref())
        .map(|pc| Request::subscribe(pc.id.as_str(), PUMP_CIRCUIT_SUBSCRIPTION.iter().copied()));
    let bodies = circuits
        .iter()
        .filter(|c| c.is_body())
        .map(|c| Request::subscribe(c.id.as_str(), BODY_SUBSCRIPTION.iter().copied()));
    let features = circuits
        .iter()
        .filter(|c| !c.is_body())
        .map(|c| Request::subscribe(c.id.as_str(), FEATURE_SUBSCRIPTION.iter().copied()));

    for request in pump_circuits.chain(bodies).chain(features) {
        send_or_log(controller, request);
    }
}

fn send_or_log(controller: &Controller, request: Request) {
    if let Err(error) = controller.send_raw(request) {
        warn!(%error, "could not queue request");
    }
}
