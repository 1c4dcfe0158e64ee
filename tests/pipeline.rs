//! Stream-to-alert pipeline tests: durable consumption, ACK semantics,
//! alert fan-out and the analyzer snapshot in the loop.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use riskflow::analyzer::GraphAnalyzer;
use riskflow::stream::simulator::{SimulatorConfig, TransactionSimulator};
use riskflow::types::{Channel, CredentialType, TransactionRecord, TxId};
use riskflow::{
    build_engine, AsnResolver, CollusionCache, EngineConfig, EngineMetrics, GraphStore,
    MemoryGraphStore, MemoryStream, RiskEngine, TxStream, WorkerPool,
};

struct Rig {
    store: Arc<MemoryGraphStore>,
    stream: Arc<MemoryStream>,
    engine: Arc<RiskEngine>,
    metrics: Arc<EngineMetrics>,
    pool: WorkerPool,
    group: String,
}

fn rig(worker_count: usize) -> Rig {
    let config = Arc::new(EngineConfig {
        worker_count,
        ..Default::default()
    });
    let group = config.consumer_group.clone();
    let metrics = Arc::new(EngineMetrics::new());
    let store = Arc::new(MemoryGraphStore::new());
    let stream = Arc::new(MemoryStream::default());
    let engine = build_engine(
        store.clone(),
        Arc::new(AsnResolver::disabled("IN")),
        Arc::new(CollusionCache::new()),
        metrics.clone(),
        config,
    )
    .unwrap();
    let pool = WorkerPool::new(engine.clone(), stream.clone());
    Rig {
        store,
        stream,
        engine,
        metrics,
        pool,
        group,
    }
}

fn record(tx: &str, sender: &str, amount: f64) -> TransactionRecord {
    TransactionRecord {
        tx_id: TxId(tx.to_string()),
        sender_id: sender.into(),
        receiver_id: "receiver".into(),
        amount,
        timestamp: Utc::now(),
        device_hash: format!("{sender}-phone").as_str().into(),
        device_os: Some("Android 14".into()),
        capability_mask: None,
        ip_address: None,
        sender_lat: None,
        sender_lon: None,
        channel: Channel::Upi,
        credential_type: CredentialType::Biometric,
        upi_id_sender: None,
        upi_id_receiver: None,
        extra: HashMap::new(),
    }
}

async fn drain(rig: &Rig) {
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let backlog = rig.stream.backlog(&rig.group).await.unwrap();
        let pending = rig.stream.pending_count(&rig.group).await.unwrap();
        if backlog == 0 && pending == 0 {
            return;
        }
    }
    panic!("stream did not drain");
}

#[tokio::test]
async fn round_trip_scores_land_in_the_store() {
    let rig = rig(4);
    for i in 0..30 {
        rig.stream
            .append(&record(&format!("t{i}"), &format!("acct-{}", i % 5), 250.0))
            .await
            .unwrap();
    }
    rig.pool.start().await;
    drain(&rig).await;
    rig.pool.stop().await;

    assert_eq!(rig.metrics.records_processed.load(Ordering::Relaxed), 30);
    let counts = rig.store.counts().await.unwrap();
    assert_eq!(counts.transactions, 30);

    // Every scored transaction carried its risk back onto the sender.
    let risks = rig.store.account_risks().await.unwrap();
    assert_eq!(risks.len(), 6); // 5 senders + receiver
}

#[tokio::test]
async fn alerts_reach_subscribers_for_risky_records() {
    let rig = rig(2);
    let mut alerts = rig.engine.alerts().subscribe();

    // A dormant account waking up on a six-account device farm with a
    // high MPIN transfer compounds past the MEDIUM threshold.
    for i in 0..5 {
        let mut old = record(&format!("old{i}"), "woken-mule", 100.0);
        old.timestamp = Utc::now() - chrono::Duration::days(45) - chrono::Duration::hours(i);
        rig.store.ingest_transaction(&old).await.unwrap();
    }
    for i in 0..6 {
        let mut seed = record(&format!("seed{i}"), &format!("farm-{i}"), 100.0);
        seed.device_hash = "farm-device".into();
        rig.store.ingest_transaction(&seed).await.unwrap();
    }
    // Batch pass flags the dormancy and device stats before the wake-up.
    let analyzer = GraphAnalyzer::new(
        rig.store.clone(),
        Arc::new(CollusionCache::new()),
        Arc::new(EngineConfig::default()),
        rig.metrics.clone(),
    );
    analyzer.run_once().await.unwrap();

    let mut hot = record("hot", "woken-mule", 15_000.0);
    hot.device_hash = "farm-device".into();
    hot.credential_type = CredentialType::Mpin;
    rig.stream.append(&hot).await.unwrap();

    rig.pool.start().await;
    let alert = tokio::time::timeout(Duration::from_secs(5), alerts.recv())
        .await
        .expect("no alert within timeout")
        .expect("broadcast closed");
    rig.pool.stop().await;

    assert_eq!(alert.tx_id, TxId("hot".to_string()));
    assert!(alert.risk_score >= 40.0, "risk was {}", alert.risk_score);
    assert!(alert.flags.iter().any(|f| f.contains("MULE SUSPECTED")));
    assert!(!alert.reason.is_empty());
}

#[tokio::test]
async fn unacked_records_redeliver_to_surviving_workers() {
    // Visibility timeout short enough to observe redelivery.
    let stream = MemoryStream::new(Duration::from_millis(50));
    let rec = record("sticky", "acct", 100.0);
    stream.append(&rec).await.unwrap();

    // A consumer takes the record and dies without ACK.
    let taken = stream.consume("g", "doomed", 10, 0).await.unwrap();
    assert_eq!(taken.len(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let redelivered = stream.consume("g", "survivor", 10, 0).await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].record.tx_id, rec.tx_id);
    stream.ack("g", &redelivered[0].id).await.unwrap();
    assert_eq!(stream.pending_count("g").await.unwrap(), 0);
}

#[tokio::test]
async fn simulator_traffic_flows_through_workers_and_analyzer() {
    let rig = rig(4);

    let simulator = TransactionSimulator::new(SimulatorConfig {
        tps: 500,
        total_transactions: 120,
        ..Default::default()
    });
    let stream_dyn: Arc<dyn TxStream> = rig.stream.clone();
    simulator.run(stream_dyn).await.unwrap();

    rig.pool.start().await;
    drain(&rig).await;
    rig.pool.stop().await;

    let analyzer = GraphAnalyzer::new(
        rig.store.clone(),
        Arc::new(CollusionCache::new()),
        Arc::new(EngineConfig::default()),
        rig.metrics.clone(),
    );
    let status = analyzer.run_once().await.unwrap();

    assert_eq!(rig.metrics.records_processed.load(Ordering::Relaxed), 120);
    assert!(status.projection_nodes > 0);
    assert!(status.accounts_refreshed > 0);
    assert_eq!(status.snapshot_seq, 1);
}
