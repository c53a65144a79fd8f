use anyhow::Context;
use hyperquote::datasource::{HyperliquidInfoSource, InfoSource};
use hyperquote::execution::ExecutionBackend;
use hyperquote::feed::{spawn_book_poller, MarketDataWriter, UserEventWriter};
use hyperquote::recorder::{NullRecorder, RecorderSink};
use hyperquote::{Config, Engine, MonitorStrategy, OrderLedger, PaperBackend, SnapshotStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if !config.paper_mode {
        eprintln!(
            "Configuration error: live trading needs a signed order transport, which this binary does not ship; set PAPER_MODE=true"
        );
        std::process::exit(1);
    }

    // Core state
    let store = Arc::new(SnapshotStore::new());
    let (fill_tx, fill_rx) = mpsc::unbounded_channel();
    let ledger = Arc::new(
        OrderLedger::with_pending_capacity(config.pending_fill_capacity).with_fill_notifier(fill_tx),
    );
    let recorder: Arc<dyn RecorderSink> = Arc::new(NullRecorder);

    // Feed writers and backend
    let events = Arc::new(UserEventWriter::new(ledger.clone(), recorder.clone()));
    let paper = Arc::new(PaperBackend::new(config.paper_config(), store.clone(), events));
    let writer = Arc::new(
        MarketDataWriter::new(store.clone(), recorder).with_listener(paper.clone()),
    );
    let backend: Arc<dyn ExecutionBackend> = paper;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let info: Arc<dyn InfoSource> = Arc::new(
        HyperliquidInfoSource::new(config.hyperliquid_api_url.clone())
            .with_max_elapsed(config.book_poll_interval()),
    );
    let poller = spawn_book_poller(
        info,
        writer,
        config.instruments.clone(),
        config.book_poll_interval(),
        shutdown_rx.clone(),
    );

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Cannot listen for interrupt: {}", e);
                // Keep the sender alive so the engine is not stopped by a
                // closed channel.
                std::future::pending::<()>().await;
            }
        }
    });

    let mut engine = Engine::new(
        config.engine_config(),
        config.instruments.clone(),
        store,
        ledger,
        backend,
        Box::new(MonitorStrategy::new()),
    )
    .with_fill_events(fill_rx);

    let report = engine
        .run(shutdown_rx)
        .await
        .context("engine stopped on an internal error")?;
    poller.await.context("book poller task failed")?;

    tracing::info!(
        "Stopped: {} cancel attempt(s), {} order(s) left working",
        report.cancel_attempts(),
        report.leftovers().len()
    );
    Ok(())
}
