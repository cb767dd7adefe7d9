//! Add, index, resolve, sync and remove through the library API.

use cachet::conflict::{ConflictResolver, FixedSelector};
use cachet::core::CachetError;
use cachet::scripts::{GroupBy, ScriptEntry};

use crate::common::TestEnv;

#[tokio::test]
async fn test_same_named_scripts_resolve_to_selected_repository() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("bin/deploy.sh", "echo alpha\n"), ("backup.sh", "")]);
    let beta = env.origin("beta", &[("deploy.sh", "echo beta\n")]);

    let registry = env.registry();
    registry.store().init().await.unwrap();
    registry.add(&alpha.url(), None, None).await.unwrap();
    registry.add(&beta.url(), None, None).await.unwrap();

    let indexer = env.indexer();
    let summary = indexer.discover(true).await.unwrap();
    assert!(!summary.skipped);
    assert_eq!(summary.entries, 3);

    let candidates = indexer.find_by_name("deploy").await.unwrap();
    assert_eq!(
        candidates,
        vec![
            ScriptEntry::new("deploy", "bin/deploy.sh", "alpha"),
            ScriptEntry::new("deploy", "deploy.sh", "beta"),
        ]
    );

    let mut selector = FixedSelector("2".to_string());
    let chosen = ConflictResolver::new().resolve(&candidates, &mut selector).unwrap();
    assert_eq!(chosen.repository, "beta");

    let alpha_entry = registry.get("alpha").await.unwrap();
    assert_eq!(alpha_entry.script_count, 2);
    assert_eq!(registry.get("beta").await.unwrap().script_count, 1);
}

#[tokio::test]
async fn test_remove_drops_only_that_repository_from_index() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "")]);
    let beta = env.origin("beta", &[("deploy.sh", ""), ("lint.sh", "")]);

    let registry = env.registry();
    registry.add(&alpha.url(), None, None).await.unwrap();
    registry.add(&beta.url(), None, None).await.unwrap();
    let indexer = env.indexer();
    indexer.discover(true).await.unwrap();

    let lock = registry.store().acquire_lock().await.unwrap();
    registry.remove_locked(&lock, "alpha").await.unwrap();
    indexer.forget_repository(&lock, "alpha").await.unwrap();
    lock.release();

    assert!(!registry.exists("alpha"));
    assert!(!registry.store().repo_dir("alpha").exists());
    let listing = indexer.list_all(GroupBy::Repository).await.unwrap();
    let keys: Vec<&str> = listing.groups.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["beta"]);
    assert_eq!(indexer.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_sync_picks_up_new_script_after_refresh() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "")]);
    let beta = env.origin("beta", &[("build.sh", "")]);

    let registry = env.registry();
    registry.add(&alpha.url(), None, None).await.unwrap();
    registry.add(&beta.url(), None, None).await.unwrap();
    let indexer = env.indexer();
    indexer.discover(true).await.unwrap();

    alpha.write_file("tools/release.sh", "echo release\n").unwrap();
    alpha.commit_all("Add release").unwrap();

    let lock = registry.store().acquire_lock().await.unwrap();
    let result = registry.sync_locked(&lock, "alpha", false).await.unwrap();
    indexer.refresh_repositories(&lock, &["alpha".to_string()]).await.unwrap();
    lock.release();

    assert!(result.updated);
    assert_eq!(result.commits, 1);
    assert_eq!(
        indexer.find_by_name("release").await.unwrap(),
        vec![ScriptEntry::new("release", "tools/release.sh", "alpha")]
    );
    assert_eq!(indexer.find_by_name("build").await.unwrap().len(), 1);
    assert_eq!(registry.get("alpha").await.unwrap().script_count, 2);
}

#[tokio::test]
async fn test_modified_repository_is_a_conflict_until_forced() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "echo v1\n")]);
    let registry = env.registry();
    let entry = registry.add(&alpha.url(), None, None).await.unwrap().entry;

    std::fs::write(entry.local_path.join("deploy.sh"), "echo local\n").unwrap();
    alpha.write_file("deploy.sh", "echo v2\n").unwrap();
    alpha.commit_all("v2").unwrap();

    let lock = registry.store().acquire_lock().await.unwrap();
    let err = registry.sync_locked(&lock, "alpha", false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CachetError>(),
        Some(CachetError::Conflict { .. })
    ));
    assert_eq!(
        std::fs::read_to_string(entry.local_path.join("deploy.sh")).unwrap(),
        "echo local\n"
    );

    let result = registry.sync_locked(&lock, "alpha", true).await.unwrap();
    lock.release();
    assert!(result.stashed);
    assert_eq!(
        std::fs::read_to_string(entry.local_path.join("deploy.sh")).unwrap(),
        "echo v2\n"
    );
}

#[tokio::test]
async fn test_index_missing_falls_back_to_scan_without_writing() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "")]);
    let registry = env.registry();
    registry.add(&alpha.url(), None, None).await.unwrap();

    let indexer = env.indexer();
    assert_eq!(indexer.find_by_name("deploy").await.unwrap().len(), 1);
    assert!(!registry.store().index_path().exists());
}

#[tokio::test]
async fn test_unknown_script_suggests_closest_name() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "")]);
    env.registry().add(&alpha.url(), None, None).await.unwrap();

    let err = env.indexer().require("deplyo").await.unwrap_err();
    match err.downcast_ref::<CachetError>() {
        Some(CachetError::NotFound {
            suggestion,
            ..
        }) => assert_eq!(suggestion.as_deref(), Some("deploy")),
        other => panic!("expected not found, got {other:?}"),
    }
}
