//! End-to-end scoring scenarios against the embedded store, with the
//! batch analyzer in the loop where the scenario depends on pre-computed
//! graph properties.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use riskflow::analyzer::GraphAnalyzer;
use riskflow::types::{Channel, CredentialType, RiskLevel, TransactionRecord, TxId};
use riskflow::{
    build_engine, AsnResolver, CollusionCache, EngineConfig, EngineMetrics, GraphStore,
    MemoryGraphStore, RiskEngine,
};

struct Harness {
    store: Arc<MemoryGraphStore>,
    engine: Arc<RiskEngine>,
    analyzer: GraphAnalyzer,
}

fn harness() -> Harness {
    let config = Arc::new(EngineConfig::default());
    let metrics = Arc::new(EngineMetrics::new());
    let store = Arc::new(MemoryGraphStore::new());
    let collusion = Arc::new(CollusionCache::new());
    let engine = build_engine(
        store.clone(),
        Arc::new(AsnResolver::disabled("IN")),
        collusion.clone(),
        metrics.clone(),
        config.clone(),
    )
    .unwrap();
    let analyzer = GraphAnalyzer::new(store.clone(), collusion, config, metrics);
    Harness {
        store,
        engine,
        analyzer,
    }
}

fn record(
    tx: &str,
    sender: &str,
    receiver: &str,
    amount: f64,
    ts: DateTime<Utc>,
    device: &str,
) -> TransactionRecord {
    TransactionRecord {
        tx_id: TxId(tx.to_string()),
        sender_id: sender.into(),
        receiver_id: receiver.into(),
        amount,
        timestamp: ts,
        device_hash: device.into(),
        device_os: Some("Android 14".into()),
        capability_mask: Some("011001".into()),
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

fn now() -> DateTime<Utc> {
    // Fixed mid-day anchor near the wall clock so analyzer dormancy math
    // (which uses Utc::now) agrees with the records.
    Utc::now()
        .with_time(chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap())
        .unwrap()
}

// Scenario: routine payment from a mature sender scores LOW with no flags.
#[tokio::test]
async fn normal_transaction_is_low_risk() {
    let h = harness();
    let anchor = now();

    // Mature history: twenty mid-day payments around 500 over ten days.
    for i in 0..20i64 {
        let ts = anchor - Duration::days(10) + Duration::hours(i * 12);
        let rec = record(
            &format!("seed-{i}"),
            "steady",
            &format!("shop-{}", i % 4),
            480.0 + (i % 5) as f64 * 10.0,
            ts,
            "steady-phone",
        );
        h.store.ingest_transaction(&rec).await.unwrap();
    }
    h.analyzer.run_once().await.unwrap();

    let scored = h
        .engine
        .score(&record("tx-now", "steady", "shop-1", 500.0, anchor, "steady-phone"))
        .await
        .unwrap();

    assert_eq!(scored.risk_level, RiskLevel::Low);
    assert!(scored.risk_score < 40.0, "score was {}", scored.risk_score);
    assert!(
        scored.flags.is_empty(),
        "unexpected flags: {:?}",
        scored.flags
    );
    assert_eq!(scored.reason, "No significant risk indicators");
}

// Scenario: two transactions 1200 km apart within two minutes.
#[tokio::test]
async fn impossible_travel_is_flagged() {
    let h = harness();
    let anchor = now();

    let mut first = record("hop-1", "mover", "shop", 200.0, anchor, "phone");
    first.sender_lat = Some(19.0760);
    first.sender_lon = Some(72.8777);
    h.store.ingest_transaction(&first).await.unwrap();

    let mut second = record(
        "hop-2",
        "mover",
        "shop",
        200.0,
        anchor + Duration::minutes(2),
        "phone",
    );
    second.sender_lat = Some(28.7041);
    second.sender_lon = Some(77.1025);

    let scored = h.engine.score(&second).await.unwrap();
    assert!(scored.breakdown.behavioral >= 20.0);
    assert!(scored
        .flags
        .iter()
        .any(|f| f.contains("Impossible travel")));
    // A single strong behavioural signal alone stays LOW.
    assert_eq!(scored.risk_level, RiskLevel::Low);
}

// Scenario: dormant 45 days, amount 60x the profile mean.
#[tokio::test]
async fn dormant_reactivation_spikes_dead_score() {
    let h = harness();
    let anchor = now();

    for i in 0..5i64 {
        let ts = anchor - Duration::days(45) - Duration::hours(i * 6);
        let rec = record(
            &format!("old-{i}"),
            "sleeper",
            "friend",
            100.0,
            ts,
            "sleeper-phone",
        );
        h.store.ingest_transaction(&rec).await.unwrap();
    }
    // The batch pass flags dormancy before the wake-up transfer arrives.
    h.analyzer.run_once().await.unwrap();

    let scored = h
        .engine
        .score(&record(
            "wake",
            "sleeper",
            "stranger",
            6_000.0,
            anchor,
            "sleeper-phone",
        ))
        .await
        .unwrap();

    assert!(
        scored.breakdown.dead_account >= 75.0,
        "dead score was {}",
        scored.breakdown.dead_account
    );
    assert!(scored.flags.iter().any(|f| f.contains("First strike")));
    assert!(scored.flags.iter().any(|f| f.contains("Sleep-and-flash")));
    assert!(scored.flags.iter().any(|f| f.contains("MULE SUSPECTED")));
}

// Scenario: device shared by six accounts, hot user, high amount on MPIN.
#[tokio::test]
async fn device_farm_drives_device_score() {
    let h = harness();
    let anchor = now();

    for i in 0..5 {
        let rec = record(
            &format!("farm-{i}"),
            &format!("farm-user-{i}"),
            "sink",
            100.0,
            anchor - Duration::hours(2),
            "farm-device",
        );
        h.store.ingest_transaction(&rec).await.unwrap();
    }
    // One of the co-located users already carries high risk.
    h.store
        .persist_risk(&TxId("farm-0".into()), &"farm-user-0".into(), 82.0)
        .await
        .unwrap();

    let mut current = record("farm-now", "newcomer", "sink", 15_000.0, anchor, "farm-device");
    current.credential_type = CredentialType::Mpin;
    let scored = h.engine.score(&current).await.unwrap();

    assert!(
        scored.breakdown.device >= 77.0,
        "device score was {}",
        scored.breakdown.device
    );
    assert!(scored.flags.iter().any(|f| f.contains("Shared device")));
    assert!(scored
        .flags
        .iter()
        .any(|f| f.contains("New device + high amount + MPIN")));
}

// Scenario: four identical 9999 transfers to one receiver in 40 minutes.
#[tokio::test]
async fn structuring_raises_behavioral_score() {
    let h = harness();
    let anchor = now();

    let mut last = None;
    for i in 0..4i64 {
        let rec = record(
            &format!("slice-{i}"),
            "structurer",
            "collector",
            9_999.0,
            anchor + Duration::minutes(i * 10),
            "structurer-phone",
        );
        last = Some(h.engine.score(&rec).await.unwrap());
    }
    let scored = last.unwrap();
    assert!(
        scored.breakdown.behavioral >= 40.0,
        "behavioral was {}",
        scored.breakdown.behavioral
    );
    assert!(scored
        .flags
        .iter()
        .any(|f| f.contains("Identical transfers")));
    assert!(scored.flags.iter().any(|f| f.contains("Fixed-amount")));
}

// Scenario: sender inside a Louvain community of five with mean risk 70.
#[tokio::test]
async fn hot_cluster_membership_contributes_graph_score() {
    let h = harness();
    let anchor = now();

    // Dense five-account community.
    let members = ["m0", "m1", "m2", "m3", "m4"];
    let mut tx = 0;
    for (i, from) in members.iter().enumerate() {
        for to in members.iter().skip(i + 1) {
            let rec = record(
                &format!("mesh-{tx}"),
                from,
                to,
                500.0,
                anchor - Duration::hours(3),
                &format!("phone-{from}"),
            );
            h.store.ingest_transaction(&rec).await.unwrap();
            tx += 1;
        }
    }
    // Every member already scored hot.
    for (i, member) in members.iter().enumerate() {
        let any_tx = format!("mesh-{}", [0, 0, 4, 7, 9][i]);
        let _ = h
            .store
            .persist_risk(&TxId(any_tx), &(*member).into(), 70.0)
            .await;
    }
    h.analyzer.run_once().await.unwrap();

    let scored = h
        .engine
        .score(&record("probe", "m0", "m1", 500.0, anchor, "phone-m0"))
        .await
        .unwrap();

    // Community contribution alone is mean(70) x 0.30 = 21.
    assert!(
        scored.breakdown.graph >= 21.0,
        "graph score was {}",
        scored.breakdown.graph
    );
    assert!(scored.cluster_id.is_some());
    assert!(scored
        .flags
        .iter()
        .any(|f| f.contains("fraud cluster") || f.contains("high-risk cluster")));
}

// Law: replaying the identical record leaves graph state and score alone.
#[tokio::test]
async fn ingest_is_idempotent_end_to_end() {
    let h = harness();
    let anchor = now();
    let rec = record("dup", "alice", "bob", 750.0, anchor, "alice-phone");

    let first = h.engine.score(&rec).await.unwrap();
    let counts_before = h.store.counts().await.unwrap();
    let second = h.engine.score(&rec).await.unwrap();
    let counts_after = h.store.counts().await.unwrap();

    assert_eq!(counts_before.transactions, counts_after.transactions);
    assert_eq!(counts_before.transfer_edges, counts_after.transfer_edges);
    assert_eq!(first.risk_score, second.risk_score);
    assert_eq!(first.reason, second.reason);
}

// Invariant: breakdown is bounded and capping only reduces.
#[tokio::test]
async fn fused_score_is_bounded_by_weighted_sum() {
    let h = harness();
    let anchor = now();

    for i in 0..10i64 {
        let rec = record(
            &format!("burst-{i}"),
            "storm",
            "sink",
            9_999.0,
            anchor + Duration::seconds(i),
            "storm-phone",
        );
        let scored = h.engine.score(&rec).await.unwrap();
        let b = &scored.breakdown;
        for s in [b.graph, b.behavioral, b.device, b.dead_account, b.velocity] {
            assert!((0.0..=100.0).contains(&s));
        }
        let weighted = 0.30 * b.graph
            + 0.25 * b.behavioral
            + 0.20 * b.device
            + 0.15 * b.dead_account
            + 0.10 * b.velocity;
        assert!(scored.risk_score <= weighted + 0.01);
        assert!((0.0..=100.0).contains(&scored.risk_score));
    }
}
