//! Matching pass end to end: load from SQLite, match, persist

mod helpers;

use brickmap_xr::config::EngineConfig;
use brickmap_xr::db;
use brickmap_xr::matching::MatchingPass;
use brickmap_xr::types::{Catalog, CompositionLine, MatchMethod};
use helpers::*;
use sqlx::SqlitePool;

async fn seed_s1(pool: &SqlitePool) {
    seed_members(pool, "S1", Catalog::Primary, &["f1", "f2"]).await;
    seed_members(pool, "S1", Catalog::Secondary, &["m1", "m2"]).await;
    let torso: Vec<CompositionLine> = ["3626", "973", "970c00"]
        .into_iter()
        .map(|part| CompositionLine::part(part, "1", 1))
        .collect();
    seed_composition(pool, Catalog::Primary, "f1", &torso).await;
    seed_composition(pool, Catalog::Secondary, "m1", &torso).await;
    seed_colors(pool, &[("1", "1")]).await;
}

#[tokio::test]
async fn test_s1_fingerprint_then_elimination_persisted() {
    let pool = memory_pool().await;
    seed_s1(&pool).await;
    let pass = MatchingPass::new(pool.clone(), &EngineConfig::default());

    let report = pass.run_matching_pass().await.unwrap();
    assert_eq!(report.exact_matches, 1);
    assert_eq!(report.elimination_matches, 1);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.persist_conflicts, 0);

    let mappings = db::mappings::load_all_mappings(&pool).await.unwrap();
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0].primary_id, "f1");
    assert_eq!(mappings[0].secondary_id, "m1");
    assert_eq!(mappings[0].confidence, 0.95);
    assert_eq!(mappings[0].method, MatchMethod::Exact);
    assert_eq!(mappings[1].primary_id, "f2");
    assert_eq!(mappings[1].secondary_id, "m2");
    assert_eq!(mappings[1].method, MatchMethod::Elimination);
}

#[tokio::test]
async fn test_second_run_adds_nothing() {
    let pool = memory_pool().await;
    seed_s1(&pool).await;
    let pass = MatchingPass::new(pool.clone(), &EngineConfig::default());

    let first = pass.run_matching_pass().await.unwrap();
    let again = pass.run_matching_pass().await.unwrap();

    assert_eq!(again.new_matches(), 0);
    assert_eq!(again.persisted, 0);
    assert_ne!(again.run_id, first.run_id);
    assert_eq!(db::mappings::load_all_mappings(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cascading_elimination_across_containers() {
    let pool = memory_pool().await;
    seed_members(&pool, "G", Catalog::Primary, &["a"]).await;
    seed_members(&pool, "G", Catalog::Secondary, &["m"]).await;
    seed_members(&pool, "H", Catalog::Primary, &["a", "b"]).await;
    seed_members(&pool, "H", Catalog::Secondary, &["m", "n"]).await;

    let report = MatchingPass::new(pool.clone(), &EngineConfig::default())
        .run_matching_pass()
        .await
        .unwrap();

    assert_eq!(report.elimination_matches, 2);
    assert!(report.elimination_passes >= 2);
    let mappings = db::mappings::load_all_mappings(&pool).await.unwrap();
    let pairs: Vec<(&str, &str)> = mappings
        .iter()
        .map(|m| (m.primary_id.as_str(), m.secondary_id.as_str()))
        .collect();
    assert_eq!(pairs, vec![("a", "m"), ("b", "n")]);
}

#[tokio::test]
async fn test_two_by_two_container_stays_unmatched() {
    let pool = memory_pool().await;
    seed_members(&pool, "K", Catalog::Primary, &["x", "y"]).await;
    seed_members(&pool, "K", Catalog::Secondary, &["p", "q"]).await;

    let report = MatchingPass::new(pool.clone(), &EngineConfig::default())
        .run_matching_pass()
        .await
        .unwrap();

    assert_eq!(report.new_matches(), 0);
    assert_eq!(report.unmatched, 2);
    assert!(db::mappings::load_all_mappings(&pool).await.unwrap().is_empty());
}
