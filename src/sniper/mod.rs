//! New-pool sniping engine.
//!
//! Architecture:
//! - The `ConnectionManager` streams `logsSubscribe` notifications
//! - The `EventDispatcher` resubscribes on every connect, classifies frames
//!   and matches log lines against the subscription table
//! - A `ConcurrencyGate` bounds how many pipelines run at once; matches that
//!   find the gate full are dropped
//! - Each admitted match runs `process_signature` on its own task: resolve the
//!   mint, apply the configured checks, then buy through the `ExecutionAction`

pub mod executor;
pub mod gate;
pub mod pipeline;

pub use executor::{BuyRequest, ExecutionAction, ExecutionError, SniperooClient};
pub use gate::{ConcurrencyGate, PipelineSlot};
pub use pipeline::{process_signature, PipelineOutcome};

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::admission::AdmissionRuleEngine;
use crate::config::Config;
use crate::notify::Notifier;
use crate::onchain::IdentifierResolver;
use crate::ws::{ConnectionEvent, ConnectionManager, InboundFrame, InboundMessage, SubscriptionRegistry};

/// How much checking a resolved mint gets before the buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Buy without checks.
    None,
    /// Only the mint/freeze authority conditions.
    Snipe,
    /// Mint-suffix pre-check plus every admission rule.
    #[default]
    Full,
}

impl std::fmt::Display for CheckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckMode::None => write!(f, "none"),
            CheckMode::Snipe => write!(f, "snipe"),
            CheckMode::Full => write!(f, "full"),
        }
    }
}

/// Per-run knobs for `process_signature`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub check_mode: CheckMode,
    pub simulation_mode: bool,
    pub amount_sol: f64,
    pub auto_sell: bool,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub play_sound: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            check_mode: config.pipeline.check_mode,
            simulation_mode: config.pipeline.simulation_mode,
            amount_sol: config.buy.amount_sol,
            auto_sell: config.sell.enabled,
            take_profit_pct: config.sell.take_profit_percent,
            stop_loss_pct: config.sell.stop_loss_percent,
            play_sound: config.buy.play_sound,
        }
    }
}

/// Everything a pipeline run needs, shared by all runs.
pub struct PipelineContext {
    pub resolver: IdentifierResolver,
    pub engine: AdmissionRuleEngine,
    pub executor: Arc<dyn ExecutionAction>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: PipelineSettings,
}

/// Why the dispatcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// The connection gave up reconnecting; the caller may start a new one.
    RetriesExhausted,
    Shutdown,
}

/// Consumes connection events and launches pipelines for matching logs.
pub struct EventDispatcher {
    manager: ConnectionManager,
    registry: SubscriptionRegistry,
    gate: ConcurrencyGate,
    ctx: Arc<PipelineContext>,
}

impl EventDispatcher {
    pub fn new(
        manager: ConnectionManager,
        registry: SubscriptionRegistry,
        gate: ConcurrencyGate,
        ctx: Arc<PipelineContext>,
    ) -> Self {
        Self {
            manager,
            registry,
            gate,
            ctx,
        }
    }

    /// Dispatch until shutdown or until the connection exhausts its retries.
    /// In-flight pipelines are left running.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> DispatchExit {
        loop {
            if *shutdown.borrow() {
                return DispatchExit::Shutdown;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return DispatchExit::Shutdown;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(exit) = self.handle(event) {
                            return exit;
                        }
                    }
                    None => {
                        debug!("connection event channel closed");
                        return DispatchExit::Shutdown;
                    }
                },
            }
        }
    }

    pub fn handle(&self, event: ConnectionEvent) -> Option<DispatchExit> {
        match event {
            ConnectionEvent::StateChanged { from, to } => {
                debug!(from = %from, to = %to, "connection state");
            }
            ConnectionEvent::Connected => self.subscribe(),
            ConnectionEvent::Disconnected { reason } => {
                warn!(reason = %reason, "stream disconnected");
            }
            ConnectionEvent::Error(e) => {
                warn!(error = %e, "stream error");
            }
            ConnectionEvent::Message(frame) => {
                self.on_frame(&frame);
            }
            ConnectionEvent::RetriesExhausted { attempts } => {
                error!(attempts, "stream gave up reconnecting");
                return Some(DispatchExit::RetriesExhausted);
            }
        }
        None
    }

    fn subscribe(&self) {
        let requests = self.registry.build_subscribe_requests();
        let mut sent = 0usize;
        for request in &requests {
            if self.manager.send_json(request) {
                sent += 1;
            } else {
                let id = &request["id"];
                warn!(id = %id, "failed to send logsSubscribe");
            }
        }
        info!(sent, total = requests.len(), "subscribed to program logs");
    }

    fn on_frame(&self, frame: &InboundFrame) -> Option<JoinHandle<PipelineOutcome>> {
        match InboundMessage::classify(frame) {
            InboundMessage::SubscriptionAck { id, subscription } => {
                info!(id = %id, subscription = %subscription, "subscription confirmed");
                None
            }
            InboundMessage::RpcError { id, error } => {
                warn!(id = %id, error = %error, "rpc error");
                None
            }
            InboundMessage::LogEvent { logs, signature } => self.on_log_event(&logs, signature),
            InboundMessage::Unrecognized => {
                debug!(frame = ?frame, "unrecognized frame");
                None
            }
        }
    }

    fn on_log_event(
        &self,
        logs: &[String],
        signature: Option<String>,
    ) -> Option<JoinHandle<PipelineOutcome>> {
        if logs.is_empty() {
            return None;
        }
        let signature = signature.filter(|s| !s.is_empty())?;
        if !self.registry.matches(logs) {
            return None;
        }

        let Some(slot) = self.gate.try_acquire() else {
            info!(
                signature = %signature,
                in_flight = self.gate.in_flight(),
                capacity = self.gate.capacity(),
                "max concurrent pipelines reached, dropping match"
            );
            return None;
        };

        let ctx = self.ctx.clone();
        Some(tokio::spawn(async move {
            let outcome = process_signature(&ctx, &signature).await;
            slot.release();
            debug!(signature = %signature, outcome = ?outcome, "pipeline finished");
            outcome
        }))
    }
}
