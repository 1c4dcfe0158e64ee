//! Engine entry point: wires the store, stream, analyzer, worker pool and
//! API together and runs until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use riskflow::analyzer::GraphAnalyzer;
use riskflow::api::{self, ApiState};
use riskflow::stream::simulator::{SimulatorConfig, TransactionSimulator};
use riskflow::stream::MemoryStream;
use riskflow::{
    build_engine, AsnResolver, CollusionCache, EngineConfig, EngineMetrics, MemoryGraphStore,
    TxStream, WorkerPool,
};

#[derive(Parser, Debug)]
#[command(name = "riskflow-engine", version, about = "Real-time fraud scoring engine")]
struct Args {
    /// Feed the stream with synthetic traffic.
    #[arg(long)]
    simulate: bool,

    /// Transactions emitted by the simulator.
    #[arg(long, default_value_t = 1_000)]
    simulate_count: usize,

    /// Simulator throughput in transactions per second.
    #[arg(long, default_value_t = 100)]
    simulate_tps: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    riskflow::init();
    let args = Args::parse();

    let config = Arc::new(EngineConfig::from_env().context("loading configuration")?);
    info!(
        workers = config.worker_count,
        stream = %config.stream_key,
        analyzer_interval = config.analyzer_interval_secs,
        "starting {} v{}",
        riskflow::NAME,
        riskflow::VERSION,
    );

    let metrics = Arc::new(EngineMetrics::new());
    let store = Arc::new(MemoryGraphStore::new());
    let resolver = Arc::new(AsnResolver::open(&config.asn_db_path, &config.domestic_country));
    let collusion = Arc::new(CollusionCache::new());
    let stream: Arc<dyn TxStream> = Arc::new(MemoryStream::new(
        std::time::Duration::from_millis(config.visibility_timeout_ms),
    ));

    let engine = build_engine(
        store.clone(),
        resolver,
        collusion.clone(),
        metrics.clone(),
        config.clone(),
    )?;

    // Background analyzer on its own cadence.
    let analyzer = Arc::new(GraphAnalyzer::new(
        store.clone(),
        collusion.clone(),
        config.clone(),
        metrics.clone(),
    ));
    let analyzer_handle = analyzer.start();

    // Worker pool draining the stream.
    let pool = Arc::new(WorkerPool::new(engine.clone(), stream.clone()));
    pool.start().await;

    // Optional synthetic traffic.
    if args.simulate {
        let simulator = TransactionSimulator::new(SimulatorConfig {
            tps: args.simulate_tps,
            total_transactions: args.simulate_count,
            ..Default::default()
        });
        let sim_stream = stream.clone();
        tokio::spawn(async move {
            if let Err(err) = simulator.run(sim_stream).await {
                tracing::error!(%err, "simulator failed");
            }
        });
    }

    // HTTP / WS surface.
    let state = Arc::new(ApiState {
        engine: engine.clone(),
        store,
        stream,
        metrics,
        collusion,
        analyzer_status: analyzer.status_handle(),
        config: config.clone(),
    });
    let router = api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.api_bind)
        .await
        .with_context(|| format!("binding {}", config.api_bind))?;
    info!(bind = %config.api_bind, "API listening");

    tokio::select! {
        result = axum::serve(listener, router) => {
            result.context("API server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    pool.stop().await;
    analyzer.stop();
    analyzer_handle.abort();
    info!("engine stopped");
    Ok(())
}
