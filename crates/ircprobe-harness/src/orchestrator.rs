//! Scenario orchestrator.
//!
//! Starts every client of a [`ScenarioPlan`] as its own tokio task and
//! waits for all of them to reach a terminal state.
//!
//! # Interleaving
//!
//! Every ungated client connects first. Once all of them are connected or
//! have failed, one shared base instant is published and start offsets are
//! measured from it, so two clients with offsets 0 and Δ issue their first
//! action Δ apart regardless of how long spawning or each TCP handshake
//! took. A client can also be gated on a readiness signal raised by another
//! client, for scenarios that need strict ordering instead of a race. Gated
//! clients connect after their gate opens.
//!
//! # Result slots
//!
//! Each task returns its own transcript through its join handle. Nothing is
//! shared for mutation between clients, and no transcript is read until
//! every handle has been joined.
//!
//! # Cancellation
//!
//! Every client runs against a deadline of `base + offset + ceiling` and
//! cancels itself when it passes, dropping its connection. A backstop
//! timeout on the join handle aborts a task that somehow overruns its own
//! deadline.

use std::{collections::HashSet, sync::Arc, time::Duration};

use ircprobe_client::{
    ClientConfig, ClientId, ClientOutcome, ClientScript, Endpoint, SignalBoard, SimClient,
    Transcript, simulate,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};

use crate::error::PlanError;

/// Delay between the end of the connect phase and the shared base instant,
/// so every task has seen the base before the first one starts.
const START_LEAD: Duration = Duration::from_millis(10);

/// Timing knobs shared by all clients of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Upper bound on each TCP handshake.
    pub connect_timeout: Duration,
    /// Upper bound on each read.
    pub read_timeout: Duration,
    /// Listen phase after each script.
    pub listen_window: Duration,
    /// Upper bound on one client's whole run, from its start offset.
    pub ceiling: Duration,
    /// Extra time granted past the ceiling before a task is aborted.
    pub grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
            listen_window: Duration::from_secs(2),
            ceiling: Duration::from_secs(30),
            grace: Duration::from_millis(500),
        }
    }
}

impl Timing {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            listen_window: self.listen_window,
            ..ClientConfig::default()
        }
    }
}

/// Hold a client back until another client raises a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartGate {
    /// Signal to wait for.
    pub signal: String,
    /// Upper bound on the wait. The client is aborted without connecting if
    /// the signal does not come.
    pub timeout: Duration,
}

/// One client of a scenario.
#[derive(Debug, Clone)]
pub struct ClientSpec {
    /// Unique id within the scenario.
    pub id: ClientId,
    /// Server this client connects to.
    pub endpoint: Endpoint,
    /// Actions to run once connected.
    pub script: Arc<ClientScript>,
    /// Delay from the scenario base instant to this client's start.
    pub start_offset: Duration,
    /// Optional readiness gate, checked after the offset and before connect.
    pub start_after: Option<StartGate>,
}

impl ClientSpec {
    /// Client starting at the base instant with no gate.
    pub fn new(id: impl Into<ClientId>, endpoint: Endpoint, script: ClientScript) -> Self {
        Self {
            id: id.into(),
            endpoint,
            script: Arc::new(script),
            start_offset: Duration::ZERO,
            start_after: None,
        }
    }

    /// Start `offset` after the base instant.
    #[must_use]
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    /// Do not connect until `signal` is raised.
    #[must_use]
    pub fn after_signal(mut self, signal: impl Into<String>, timeout: Duration) -> Self {
        self.start_after = Some(StartGate { signal: signal.into(), timeout });
        self
    }
}

/// Everything needed to run one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    /// Scenario name, for logs and reports.
    pub name: String,
    /// Clients in report order.
    pub clients: Vec<ClientSpec>,
    /// Shared timing.
    pub timing: Timing,
}

impl ScenarioPlan {
    /// Empty plan.
    pub fn new(name: impl Into<String>, timing: Timing) -> Self {
        Self { name: name.into(), clients: Vec::new(), timing }
    }

    /// Add a client.
    #[must_use]
    pub fn client(mut self, spec: ClientSpec) -> Self {
        self.clients.push(spec);
        self
    }

    /// Ids of all clients, in plan order.
    pub fn client_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.clients.iter().map(|c| c.id.as_str())
    }

    /// Every signal raised by any script.
    pub fn signal_names(&self) -> HashSet<&str> {
        self.clients.iter().flat_map(|c| c.script.raised_signals()).collect()
    }

    /// Reject plans that cannot be run.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.clients.is_empty() {
            return Err(PlanError::NoClients);
        }
        if self.timing.ceiling.is_zero() {
            return Err(PlanError::ZeroCeiling);
        }

        let mut seen = HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.id.as_str()) {
                return Err(PlanError::DuplicateClient(client.id.clone()));
            }
        }

        let raised = self.signal_names();
        for client in &self.clients {
            let gate = client.start_after.as_ref().map(|g| g.signal.as_str());
            for name in client.script.awaited_signals().chain(gate) {
                if !raised.contains(name) {
                    return Err(PlanError::UnknownSignal {
                        client: client.id.clone(),
                        name: name.to_string(),
                    });
                }
            }
            for command in client.script.commands() {
                command.to_line().map_err(|source| PlanError::InvalidCommand {
                    client: client.id.clone(),
                    source,
                })?;
            }
        }

        Ok(())
    }
}

/// Transcripts of a finished scenario, in plan order.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    /// Scenario name.
    pub name: String,
    /// One transcript per client, in plan order.
    pub transcripts: Vec<Transcript>,
    /// Wall-clock duration of the whole run.
    pub elapsed: Duration,
}

/// Runs a validated plan.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    plan: ScenarioPlan,
}

struct Slot {
    id: ClientId,
    endpoint: Endpoint,
    deadline: Instant,
    handle: JoinHandle<Transcript>,
}

impl Orchestrator {
    /// Validate `plan` and wrap it.
    pub fn new(plan: ScenarioPlan) -> Result<Self, PlanError> {
        plan.validate()?;
        Ok(Self { plan })
    }

    /// The plan being run.
    pub fn plan(&self) -> &ScenarioPlan {
        &self.plan
    }

    /// Spawn every client, wait for all of them, and collect transcripts.
    pub async fn run(&self) -> ScenarioRun {
        let timing = &self.plan.timing;
        let signals = Arc::new(SignalBoard::new(self.plan.signal_names()));
        let config = Arc::new(timing.client_config());
        let started = Instant::now();
        let connect_deadline = started + timing.connect_timeout + START_LEAD;
        let latest_base = connect_deadline + START_LEAD;

        let (connected_tx, mut connected_rx) = mpsc::channel::<()>(1);
        let (base_tx, base_rx) = watch::channel(None);

        tracing::info!(
            scenario = %self.plan.name,
            clients = self.plan.clients.len(),
            ceiling = ?timing.ceiling,
            "starting scenario"
        );

        let slots: Vec<Slot> = self
            .plan
            .clients
            .iter()
            .map(|spec| {
                let token = spec.start_after.is_none().then(|| connected_tx.clone());
                let deadline = latest_base + spec.start_offset + timing.ceiling;
                let handle = tokio::spawn(run_client(
                    spec.clone(),
                    Arc::clone(&config),
                    Arc::clone(&signals),
                    timing.ceiling,
                    token,
                    base_rx.clone(),
                ));
                Slot { id: spec.id.clone(), endpoint: spec.endpoint.clone(), deadline, handle }
            })
            .collect();
        drop(connected_tx);

        // Ungated clients hold a token until their connect attempt ends, so
        // the channel closes once every one of them is connected or failed.
        if tokio::time::timeout_at(connect_deadline, connected_rx.recv()).await.is_err() {
            tracing::warn!(scenario = %self.plan.name, "connect phase overran its timeout");
        }
        let base = Instant::now() + START_LEAD;
        base_tx.send_replace(Some(base));
        tracing::debug!(
            scenario = %self.plan.name,
            connect = ?started.elapsed(),
            "clients released"
        );

        let mut transcripts = Vec::with_capacity(slots.len());
        for slot in slots {
            transcripts.push(join_slot(slot, timing.grace).await);
        }

        let elapsed = started.elapsed();
        tracing::info!(scenario = %self.plan.name, ?elapsed, "scenario finished");

        ScenarioRun { name: self.plan.name.clone(), transcripts, elapsed }
    }
}

async fn run_client(
    spec: ClientSpec,
    config: Arc<ClientConfig>,
    signals: Arc<SignalBoard>,
    ceiling: Duration,
    token: Option<mpsc::Sender<()>>,
    mut base: watch::Receiver<Option<Instant>>,
) -> Transcript {
    // Ungated clients connect before the base instant, so handshake time
    // never shifts their first action.
    let connected = match token {
        Some(token) => {
            let result = connect(&spec, &config).await;
            drop(token);
            Some(result)
        },
        None => None,
    };

    let Ok(Some(base)) = base.wait_for(Option::is_some).await.map(|base| *base) else {
        let outcome = ClientOutcome::Aborted("scenario stopped before the start".to_string());
        return Transcript::empty(spec.id, spec.endpoint, outcome);
    };
    let start = base + spec.start_offset;
    let deadline = start + ceiling;
    tokio::time::sleep_until(start).await;

    match connected {
        Some(Ok(client)) => client.run(&spec.script, &signals, Some(deadline)).await,
        Some(Err(outcome)) => Transcript::empty(spec.id, spec.endpoint, outcome),
        None => run_gated(spec, &config, &signals, deadline).await,
    }
}

async fn connect(spec: &ClientSpec, config: &ClientConfig) -> Result<SimClient, ClientOutcome> {
    SimClient::connect(spec.id.clone(), spec.endpoint.clone(), config.clone()).await.map_err(|err| {
        tracing::warn!(
            client = %spec.id,
            endpoint = %spec.endpoint,
            error = %err,
            "connect failed"
        );
        if err.is_connect_failure() {
            err.outcome()
        } else {
            ClientOutcome::ConnectFailed(err.to_string())
        }
    })
}

async fn run_gated(
    spec: ClientSpec,
    config: &ClientConfig,
    signals: &SignalBoard,
    deadline: Instant,
) -> Transcript {
    if let Some(gate) = &spec.start_after {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Err(err) = signals.wait(&gate.signal, gate.timeout.min(remaining)).await {
            tracing::warn!(client = %spec.id, error = %err, "start gate not opened");
            return Transcript::empty(spec.id, spec.endpoint, err.outcome());
        }
    }

    tracing::debug!(client = %spec.id, endpoint = %spec.endpoint, "gated client starting");
    simulate(spec.id, spec.endpoint, config, &spec.script, signals, Some(deadline)).await
}

async fn join_slot(slot: Slot, grace: Duration) -> Transcript {
    let Slot { id, endpoint, deadline, mut handle } = slot;

    match tokio::time::timeout_at(deadline + grace, &mut handle).await {
        Ok(Ok(transcript)) => transcript,
        Ok(Err(err)) => {
            tracing::error!(client = %id, error = %err, "client task failed");
            let outcome = ClientOutcome::Aborted(format!("client task failed: {err}"));
            Transcript::empty(id, endpoint, outcome)
        },
        Err(_) => {
            tracing::warn!(client = %id, "client overran its deadline, aborting");
            handle.abort();
            // Aborted tasks resolve at their next yield point, which drops
            // the connection.
            let _ = handle.await;
            Transcript::empty(id, endpoint, ClientOutcome::TimedOut)
        },
    }
}
