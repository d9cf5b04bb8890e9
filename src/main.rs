use poolsnipe::admission::{AdmissionRuleEngine, RugCheckClient};
use poolsnipe::config::Config;
use poolsnipe::notify::{NoopNotifier, Notifier, TelegramNotifier};
use poolsnipe::onchain::{IdentifierResolver, RpcLedgerClient};
use poolsnipe::sniper::{
    ConcurrencyGate, DispatchExit, EventDispatcher, ExecutionAction, PipelineContext,
    PipelineSettings, SniperooClient,
};
use poolsnipe::store::{HistoryStore, MemoryHistoryStore, ValkeyHistoryStore};
use poolsnipe::ws::{ConnectionManager, ConnectionSettings, SubscriptionRegistry};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

const CONFIG_FILE: &str = "poolsnipe.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = if Path::new(CONFIG_FILE).exists() {
        Config::load(Path::new(CONFIG_FILE))?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("poolsnipe v{} starting", env!("CARGO_PKG_VERSION"));
    if !Path::new(CONFIG_FILE).exists() {
        info!("no {} found, using env-only config", CONFIG_FILE);
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return Err(e.into());
    }

    let timeout = config.http.timeout();

    // --- Token history ---
    let history = connect_history(&config).await;

    // --- Pipeline collaborators ---
    let ledger = Arc::new(RpcLedgerClient::new(config.rpc.https_url.clone(), timeout)?);
    let resolver = IdentifierResolver::new(
        ledger,
        config.pipeline.reference_mint.clone(),
        config.resolver.max_retries,
        Duration::from_millis(config.resolver.retry_delay_ms),
    );

    let reports = Arc::new(RugCheckClient::new(config.rugcheck.base_url.clone(), timeout)?);
    let engine = AdmissionRuleEngine::new(config.checks.clone(), reports, history);

    let mut settings = PipelineSettings::from_config(&config);
    if !config.has_sniperoo_credentials() && !settings.simulation_mode {
        warn!(
            "no Sniperoo credentials configured - forcing simulation mode \
             (set SNIPEROO_API_KEY and SNIPEROO_PUBKEY to buy)"
        );
        settings.simulation_mode = true;
    }
    let executor: Arc<dyn ExecutionAction> = Arc::new(SniperooClient::new(
        config.sniperoo.base_url.clone(),
        config.sniperoo.api_key.clone(),
        config.sniperoo.pubkey.clone(),
        timeout,
    )?);

    let notifier: Arc<dyn Notifier> = if config.has_telegram() {
        info!(chat_id = %config.telegram.chat_id, "telegram notifications enabled");
        Arc::new(TelegramNotifier::new(
            config.telegram.bot_token.clone(),
            config.telegram.chat_id.clone(),
            timeout,
        )?)
    } else {
        Arc::new(NoopNotifier)
    };

    info!(
        check_mode = %settings.check_mode,
        simulation = settings.simulation_mode,
        amount_sol = settings.amount_sol,
        auto_sell = settings.auto_sell,
        take_profit = settings.take_profit_pct,
        stop_loss = settings.stop_loss_pct,
        "pipeline configured"
    );

    let ctx = Arc::new(PipelineContext {
        resolver,
        engine,
        executor,
        notifier,
        settings,
    });

    let registry = SubscriptionRegistry::new(config.subscriptions.clone(), config.rpc.commitment.clone());
    if registry.enabled_count() == 0 {
        anyhow::bail!("no enabled subscriptions configured");
    }
    for sub in registry.enabled() {
        info!(id = %sub.id, name = %sub.name, program = %sub.program, "watching program");
    }

    let gate = ConcurrencyGate::new(config.pipeline.concurrent_transactions.max(1));

    // --- Shutdown signal ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutting down...");
        let _ = shutdown_tx.send(true);
    });

    let restart_delay = Duration::from_secs(config.pipeline.restart_delay_secs);

    // --- Stream loop: restart the connection whenever it gives up ---
    loop {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(
            ConnectionSettings::from_config(config.rpc.wss_url.clone(), &config.connection),
            event_tx,
        );
        let dispatcher = EventDispatcher::new(manager.clone(), registry.clone(), gate.clone(), ctx.clone());

        manager.connect();
        let exit = dispatcher.run(event_rx, shutdown_rx.clone()).await;
        manager.disconnect();

        match exit {
            DispatchExit::Shutdown => break,
            DispatchExit::RetriesExhausted => {
                warn!(
                    delay_secs = restart_delay.as_secs(),
                    "websocket gave up reconnecting, restarting stream"
                );
                let mut shutdown = shutdown_rx.clone();
                tokio::select! {
                    _ = tokio::time::sleep(restart_delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }

    info!(in_flight = gate.in_flight(), "stopped");
    Ok(())
}

/// Valkey when configured and reachable, otherwise process memory.
async fn connect_history(config: &Config) -> Arc<dyn HistoryStore> {
    if config.valkey.url.is_empty() {
        info!("no VALKEY_URL set, keeping token history in memory");
        return Arc::new(MemoryHistoryStore::new());
    }
    match ValkeyHistoryStore::connect(&config.valkey.url, &config.valkey.prefix).await {
        Ok(store) => {
            if let Err(e) = store.ping().await {
                error!(error = %e, "Valkey ping failed, keeping token history in memory");
                Arc::new(MemoryHistoryStore::new())
            } else {
                Arc::new(store)
            }
        }
        Err(e) => {
            warn!(
                error = %e,
                "failed to connect to Valkey, keeping token history in memory"
            );
            Arc::new(MemoryHistoryStore::new())
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
