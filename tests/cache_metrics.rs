use std::collections::HashSet;
use std::fs;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;
use vellum::application::content::{ContentCaches, ContentManager, ContentOptions, ContentPorts};
use vellum::application::retry::RetryPolicy;
use vellum::application::widgets::BuiltinWidgets;
use vellum::cache::{CacheConfig, LocalCache, Namespace};
use vellum::domain::structure::{ContentNode, FILE_ICON};
use vellum::infra::fs::LocalSchemaSource;
use vellum::infra::memory::InMemoryContentStore;

#[tokio::test]
#[serial]
async fn cache_and_reload_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache: LocalCache<String> = LocalCache::with_limits(
        Namespace::Schema,
        Duration::from_secs(300),
        NonZeroUsize::new(1).expect("non-zero"),
    );
    cache.insert("first", "1".to_string());
    assert!(cache.get("first").is_some());
    assert!(cache.get("absent").is_none());
    cache.insert("second", "2".to_string());

    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("compiled");
    fs::create_dir_all(root.join("posts")).expect("root");
    fs::write(root.join("posts/broken.js"), "not a schema at all").expect("write");

    let store = Arc::new(InMemoryContentStore::with_nodes([ContentNode {
        id: "stale".into(),
        path: "/stale".into(),
        name: "stale".into(),
        icon: FILE_ICON.into(),
        order: 999,
        is_collection: false,
    }]));
    let manager = ContentManager::new(
        ContentOptions {
            root_dir: root,
            extensions: vec!["js".into()],
            default_language: "en".into(),
            lazy_dir: dir.path().join("lazy"),
            load_concurrency: NonZeroUsize::new(1).expect("non-zero"),
            retry: RetryPolicy::default(),
        },
        ContentPorts {
            source: Arc::new(LocalSchemaSource::new(["js"])),
            repo: store,
            widgets: Arc::new(BuiltinWidgets::new()),
        },
        ContentCaches::build(&CacheConfig::default(), None),
    );
    manager.initialize().await.expect("initialized");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "vellum_cache_hit_total",
        "vellum_cache_miss_total",
        "vellum_cache_evict_total",
        "vellum_reload_ms",
        "vellum_orphans_deleted_total",
        "vellum_schema_parse_failures_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
