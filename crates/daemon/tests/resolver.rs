mod common;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{hits, test_config, FakeExtractor, FakeFetcher, FakeProbe, FakeProvider};
use engine::timeline::secs_to_ticks;
use engine::{BindingState, Scene, SceneBuild, SceneStrategy, SourceTier};
use reeld::assign::ClipAssigner;
use reeld::context::ResolutionContext;
use reeld::errors::PipelineError;
use reeld::retrieval::local_backend::{LocalFile, LocalPool};
use reeld::retrieval::{AssetCandidate, AssetResolver, ResolveRequest, ResolverDeps};
use reeld::stock::StockProvider;

fn request(work_dir: &Path, segment_index: usize, query: &str, wanted: usize) -> ResolveRequest {
    ResolveRequest {
        segment_index,
        query: query.to_string(),
        text: String::new(),
        target_secs: 2.0,
        wanted,
        work_dir: work_dir.to_path_buf(),
    }
}

fn resolver(work_dir: &Path, provider: Arc<FakeProvider>, pool: LocalPool) -> AssetResolver {
    let config = test_config(work_dir);
    let provider: Arc<dyn StockProvider> = provider;
    AssetResolver::build(
        &config,
        ResolverDeps {
            providers: vec![provider],
            long_form: None,
            extractor: Arc::new(FakeExtractor::default()),
            fetcher: Arc::new(FakeFetcher::default()),
            local_pool: Arc::new(pool),
        },
    )
}

#[tokio::test]
async fn local_pool_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new("stock").with_hits("boxer gym", hits("stock", 5)));
    let pool = LocalPool::from_files(
        (0..4)
            .map(|i| LocalFile {
                path: PathBuf::from(format!("/footage/clip{i}.mp4")),
                uri: format!("local:{i}"),
                keywords: vec![format!("clip{i}")],
            })
            .collect(),
    );
    let resolver = resolver(dir.path(), provider.clone(), pool);
    let mut ctx = ResolutionContext::new(1);

    for segment in 0..3 {
        let found = resolver
            .resolve(&request(dir.path(), segment, "boxer gym", 3), &mut ctx)
            .await;
        assert!(!found.is_empty());
        assert!(found.iter().all(|c| c.source_tier == SourceTier::Local));
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn uris_are_not_reused_across_segments() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new("stock").with_hits("boxer gym", hits("stock", 4)));
    let resolver = resolver(dir.path(), provider, LocalPool::empty());
    let mut ctx = ResolutionContext::new(2);

    let first = resolver
        .resolve(&request(dir.path(), 0, "boxer gym", 2), &mut ctx)
        .await;
    let second = resolver
        .resolve(&request(dir.path(), 1, "boxer gym", 2), &mut ctx)
        .await;
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);

    let first_uris: HashSet<_> = first.iter().map(|c| c.uri.clone()).collect();
    assert!(second.iter().all(|c| !first_uris.contains(&c.uri)));
    assert!(first.iter().chain(&second).all(|c| c.path.is_file()));
    assert_eq!(first[0].path, dir.path().join("seg00_var0.mp4"));
}

#[tokio::test]
async fn empty_search_falls_back_to_mood_queries() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        FakeProvider::new("stock").with_hits("dark moody city night", hits("mood", 3)),
    );
    let resolver = resolver(dir.path(), provider, LocalPool::empty());
    let mut ctx = ResolutionContext::new(3);

    let found = resolver
        .resolve(&request(dir.path(), 0, "obscure philosophical idea", 3), &mut ctx)
        .await;
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|c| c.uri.starts_with("mood-")));
}

#[tokio::test]
async fn weak_query_is_replaced_before_searching() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        FakeProvider::new("stock").with_hits("man walking alone city night", hits("walk", 2)),
    );
    let resolver = resolver(dir.path(), provider, LocalPool::empty());
    let mut ctx = ResolutionContext::new(4);

    let found = resolver
        .resolve(&request(dir.path(), 0, "calm ocean sunset", 2), &mut ctx)
        .await;
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|c| c.uri.starts_with("walk-")));
}

#[tokio::test]
async fn short_hits_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new("stock").with_hits(
        "boxer gym",
        vec![common::direct_hit("short", 1.5), common::direct_hit("long", 8.0)],
    ));
    let resolver = resolver(dir.path(), provider, LocalPool::empty());
    let mut ctx = ResolutionContext::new(5);

    let found = resolver
        .resolve(&request(dir.path(), 0, "boxer gym", 1), &mut ctx)
        .await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uri, "long");
}

fn candidate(uri: &str, path: PathBuf) -> AssetCandidate {
    AssetCandidate {
        uri: uri.to_string(),
        source_tier: SourceTier::Search,
        category: None,
        path,
        score: 0,
    }
}

fn scored(uri: &str, category: &str, score: u32) -> AssetCandidate {
    AssetCandidate {
        category: Some(category.to_string()),
        score,
        ..candidate(uri, PathBuf::from(format!("/runs/{uri}.mp4")))
    }
}

fn two_segment_build() -> SceneBuild {
    let one = secs_to_ticks(1.0);
    SceneBuild {
        scenes: vec![
            Scene::for_segment(0, 2 * one, "first", 0),
            Scene::for_segment(2 * one, 4 * one, "second", 1),
            Scene::for_segment(4 * one, 5 * one, "third", 2),
        ],
        strategy: SceneStrategy::Aligned,
        unmatched_segments: Vec::new(),
        hook_end_ticks: None,
    }
}

#[tokio::test]
async fn unusable_segment_reuses_previous_asset() {
    let config = test_config(Path::new("/tmp"));
    let broken = PathBuf::from("/runs/seg01_var0.mp4");
    let probe = Arc::new(FakeProbe::new(10.0).with_broken(broken.clone()));
    let mut assigner = ClipAssigner::new(probe, &config.assign);

    let mut resolved = BTreeMap::new();
    resolved.insert(0, vec![candidate("a", PathBuf::from("/runs/seg00_var0.mp4"))]);
    resolved.insert(1, vec![candidate("b", broken)]);
    resolved.insert(2, Vec::new());

    let mut ctx = ResolutionContext::new(1);
    let plan = assigner
        .assign(&two_segment_build(), secs_to_ticks(5.0), &resolved, &mut ctx)
        .await
        .unwrap();

    plan.validate().unwrap();
    let states: Vec<_> = plan.bindings.iter().map(|b| b.state).collect();
    assert_eq!(
        states,
        vec![BindingState::Bound, BindingState::Degraded, BindingState::Degraded]
    );
    assert!(plan.bindings.iter().all(|b| b.asset_uri == "a"));
    assert_eq!(plan.degraded_count(), 2);
    assert!(plan.duplicate_assets().is_empty());
}

#[tokio::test]
async fn leading_failures_borrow_first_bound_asset() {
    let config = test_config(Path::new("/tmp"));
    let probe = Arc::new(FakeProbe::new(10.0));
    let mut assigner = ClipAssigner::new(probe, &config.assign);

    let mut resolved = BTreeMap::new();
    resolved.insert(0, Vec::new());
    resolved.insert(1, vec![candidate("b", PathBuf::from("/runs/seg01_var0.mp4"))]);
    resolved.insert(2, vec![candidate("c", PathBuf::from("/runs/seg02_var0.mp4"))]);

    let mut ctx = ResolutionContext::new(1);
    let plan = assigner
        .assign(&two_segment_build(), secs_to_ticks(5.0), &resolved, &mut ctx)
        .await
        .unwrap();

    assert_eq!(plan.bindings[0].asset_uri, "b");
    assert_eq!(plan.bindings[0].state, BindingState::Degraded);
    assert_eq!(plan.bindings[2].asset_uri, "c");
    plan.validate().unwrap();
}

#[tokio::test]
async fn nothing_bound_is_fatal() {
    let config = test_config(Path::new("/tmp"));
    let mut assigner = ClipAssigner::new(Arc::new(FakeProbe::new(10.0)), &config.assign);
    let resolved: BTreeMap<usize, Vec<AssetCandidate>> =
        (0..3).map(|i| (i, Vec::new())).collect();

    let mut ctx = ResolutionContext::new(1);
    let err = assigner
        .assign(&two_segment_build(), secs_to_ticks(5.0), &resolved, &mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoScenesResolvable));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn exhausted_pool_reshuffles_before_repeating() {
    let config = test_config(Path::new("/tmp"));
    let mut assigner = ClipAssigner::new(Arc::new(FakeProbe::new(10.0)), &config.assign);
    let one = secs_to_ticks(1.0);
    let build = SceneBuild {
        scenes: (0..5).map(|i| Scene::new(i * one, (i + 1) * one, "")).collect(),
        strategy: SceneStrategy::FixedInterval,
        unmatched_segments: vec![0],
        hook_end_ticks: None,
    };
    let mut resolved = BTreeMap::new();
    resolved.insert(
        0,
        vec![
            candidate("a", PathBuf::from("/runs/seg00_var0.mp4")),
            candidate("b", PathBuf::from("/runs/seg00_var1.mp4")),
        ],
    );

    let mut ctx = ResolutionContext::new(1);
    let plan = assigner
        .assign(&build, 5 * one, &resolved, &mut ctx)
        .await
        .unwrap();
    plan.validate().unwrap();

    let uris: Vec<_> = plan.bindings.iter().map(|b| b.asset_uri.as_str()).collect();
    assert_eq!(uris, ["a", "b", "a", "b", "a"]);
    assert_eq!(plan.reshuffle_events, 2);
    assert!(plan.bindings.iter().all(|b| b.state == BindingState::Bound));
}

#[tokio::test]
async fn long_asset_starts_at_a_random_point_and_subcuts_follow() {
    let config = test_config(Path::new("/tmp"));
    let clip_ticks = secs_to_ticks(600.0);
    let mut assigner = ClipAssigner::new(Arc::new(FakeProbe::new(600.0)), &config.assign);
    let one = secs_to_ticks(1.0);
    let mut first = Scene::for_segment(0, 2 * one, "long", 0);
    first.is_subcut = true;
    let mut second = Scene::for_segment(2 * one, 4 * one, "long", 0);
    second.is_subcut = true;
    let build = SceneBuild {
        scenes: vec![first, second, Scene::for_segment(4 * one, 6 * one, "next", 1)],
        strategy: SceneStrategy::Aligned,
        unmatched_segments: Vec::new(),
        hook_end_ticks: None,
    };
    let mut resolved = BTreeMap::new();
    resolved.insert(0, vec![candidate("gym_chalk", PathBuf::from("/footage/gym_chalk.mp4"))]);
    resolved.insert(1, vec![candidate("city_walk", PathBuf::from("/footage/city_walk.mov"))]);

    let mut ctx = ResolutionContext::new(3);
    let plan = assigner
        .assign(&build, 6 * one, &resolved, &mut ctx)
        .await
        .unwrap();
    plan.validate().unwrap();

    let b = &plan.bindings;
    assert!(b[0].in_ticks > 0 || b[2].in_ticks > 0);
    assert_eq!(b[1].in_ticks, b[0].out_ticks);
    assert!(b[1].out_ticks <= clip_ticks);
    assert!(b[2].out_ticks <= clip_ticks);
}

#[tokio::test]
async fn third_segment_in_a_row_switches_category() {
    let config = test_config(Path::new("/tmp"));
    assert_eq!(config.assign.max_consecutive_same_category, 2);
    let mut assigner = ClipAssigner::new(Arc::new(FakeProbe::new(10.0)), &config.assign);

    let mut resolved = BTreeMap::new();
    for idx in 0..3 {
        resolved.insert(
            idx,
            vec![
                scored(&format!("car{idx}"), "CARS", 30),
                scored(&format!("fight{idx}"), "COMBAT", 15),
            ],
        );
    }

    let mut ctx = ResolutionContext::new(1);
    let plan = assigner
        .assign(&two_segment_build(), secs_to_ticks(5.0), &resolved, &mut ctx)
        .await
        .unwrap();
    let uris: Vec<_> = plan.bindings.iter().map(|b| b.asset_uri.as_str()).collect();
    assert_eq!(uris, ["car0", "car1", "fight2"]);
}

#[tokio::test]
async fn strong_match_survives_the_variety_penalty() {
    let config = test_config(Path::new("/tmp"));
    let mut assigner = ClipAssigner::new(Arc::new(FakeProbe::new(10.0)), &config.assign);

    let mut resolved = BTreeMap::new();
    resolved.insert(0, vec![scored("car0", "CARS", 30)]);
    resolved.insert(1, vec![scored("car1", "CARS", 30)]);
    resolved.insert(2, vec![scored("car2", "CARS", 60), scored("fight2", "COMBAT", 15)]);

    let mut ctx = ResolutionContext::new(1);
    let plan = assigner
        .assign(&two_segment_build(), secs_to_ticks(5.0), &resolved, &mut ctx)
        .await
        .unwrap();
    assert_eq!(plan.bindings[2].asset_uri, "car2");
}

#[tokio::test]
async fn resolver_orders_candidates_by_relevance_to_the_text() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::new("stock").with_hits(
        "street scene",
        vec![
            common::direct_hit("yacht-deck", 8.0),
            common::direct_hit("sparring-partner", 8.0),
            common::direct_hit("plain-street", 8.0),
        ],
    ));
    let resolver = resolver(dir.path(), provider, LocalPool::empty());
    let mut ctx = ResolutionContext::new(6);

    let mut req = request(dir.path(), 0, "street scene", 3);
    req.text = "Sparring teaches you to take a punch.".into();
    let found = resolver.resolve(&req, &mut ctx).await;

    assert_eq!(found.len(), 3);
    assert_eq!(found[0].uri, "sparring-partner");
    assert_eq!(found[0].category.as_deref(), Some("COMBAT"));
    assert!(found[0].score > found[1].score);
    // Equal scores keep the order they were found in.
    assert_eq!(found[1].path, dir.path().join("seg00_var0.mp4"));
    assert_eq!(found[2].category, None);
}
