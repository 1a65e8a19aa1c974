//! Ingest survives a process restart: snapshot/restore the index, hydrate
//! the graph mirror from SQLite, reopen the debate cache, and re-running
//! the same paper writes nothing new.

mod common;

use claimforge::adjudicate::{DebateCache, PairEngine};
use claimforge::graph::CausalGraph;
use claimforge::provider::CoreContext;
use claimforge::storage::SqliteStore;
use claimforge::stream::StreamOrchestrator;
use claimforge::{CalibrationLayer, ClaimIndex, CoreConfig};
use common::{claim, FixedExtractor, ScriptedAdjudicator, TableEmbedder};
use std::sync::Arc;

const PAPER: &[u8] = b"## Main\nBody ignored by the fixed extractor.\n";

fn fixture_claims() -> Vec<claimforge::Claim> {
    vec![
        claim("p1_1", "claim alpha", vec![1.0, 0.0, 0.0]),
        claim("p1_2", "claim beta", vec![0.8, 0.6, 0.0]),
    ]
}

struct Session {
    orchestrator: StreamOrchestrator,
    graph: Arc<CausalGraph>,
    index: ClaimIndex,
    cache: Arc<DebateCache>,
}

fn open_session(config: &CoreConfig, adjudicator: Arc<ScriptedAdjudicator>) -> Session {
    let embedder = Arc::new(TableEmbedder::new(3));
    let extractor = FixedExtractor::new(fixture_claims());
    let ctx = CoreContext::new(embedder.clone(), adjudicator.clone(), extractor);

    let index = ClaimIndex::new(embedder);
    if config.index_path().exists() {
        index.restore(config.index_path()).unwrap();
    }

    let cache = Arc::new(DebateCache::open(config.debate_cache_path()).unwrap());
    let engine = Arc::new(PairEngine::new(
        index.clone(),
        adjudicator,
        cache.clone(),
        Arc::new(CalibrationLayer::untrained()),
    ));

    let store = Arc::new(
        SqliteStore::open(config.graph_db_path(), config.event_log_path()).unwrap(),
    );
    let graph = Arc::new(CausalGraph::new(store));
    graph.hydrate().unwrap();

    let orchestrator =
        StreamOrchestrator::new(ctx, index.clone(), engine, graph.clone(), config);
    Session {
        orchestrator,
        graph,
        index,
        cache,
    }
}

#[tokio::test]
async fn restart_preserves_state_and_reingest_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CoreConfig::with_data_dir(dir.path());
    // Serialise adjudications so call counts are deterministic
    config.adjudication_concurrency = 1;

    let adjudicator = ScriptedAdjudicator::new(claimforge::Verdict::Refutes, 0.9, vec![]);

    // First session: ingest and snapshot
    let (edges_before, cache_before) = {
        let session = open_session(&config, adjudicator.clone());
        let stream = session
            .orchestrator
            .process_paper_stream(PAPER, "p1")
            .await
            .unwrap();
        let (claims, summary) = stream.collect().await.unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(summary.relationships_added, 1);

        session.index.snapshot(config.index_path()).unwrap();
        (session.graph.edge_count(), session.cache.len())
    };
    let calls_before = adjudicator.call_count();
    assert_eq!(calls_before, 1);

    // Second session: fresh process state over the same data dir
    let session = open_session(&config, adjudicator.clone());
    assert_eq!(session.index.len(), 2, "index restored from snapshot");
    assert_eq!(session.graph.node_count(), 2, "mirror hydrated from sqlite");
    assert_eq!(session.graph.edge_count(), edges_before);

    let stream = session
        .orchestrator
        .process_paper_stream(PAPER, "p1")
        .await
        .unwrap();
    let (claims, summary) = stream.collect().await.unwrap();

    assert_eq!(claims.len(), 2, "claims still yield on re-ingest");
    assert_eq!(summary.relationships_added, 0);
    assert_eq!(session.graph.edge_count(), edges_before);
    assert_eq!(session.cache.len(), cache_before);
    assert_eq!(
        adjudicator.call_count(),
        calls_before,
        "no adjudicator calls on re-ingest"
    );
}
