//! Cross-process behaviour of the cache lock.

use cachet::cache::CacheStore;
use predicates::prelude::*;

use crate::common::TestEnv;

fn lock_path(env: &TestEnv) -> std::path::PathBuf {
    CacheStore::new(env.cache_dir()).lock_path()
}

#[test]
fn test_live_holder_makes_mutation_time_out() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("a.sh", "")]);
    let lock = lock_path(&env);
    std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
    // This test process is alive for the whole command.
    std::fs::write(&lock, std::process::id().to_string()).unwrap();

    env.cachet()
        .env("CACHET_LOCK_TIMEOUT", "1")
        .args(["add", &tools.url()])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("lock"));

    assert!(lock.exists());
    assert!(!env.cache_dir().join("tools").exists());
}

#[test]
fn test_reads_do_not_wait_for_the_lock() {
    let env = TestEnv::new();
    let lock = lock_path(&env);
    std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
    std::fs::write(&lock, std::process::id().to_string()).unwrap();

    env.cachet()
        .env("CACHET_LOCK_TIMEOUT", "1")
        .args(["list"])
        .assert()
        .success();
}

#[cfg(unix)]
#[test]
fn test_dead_holder_is_reclaimed() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("a.sh", "")]);
    let lock = lock_path(&env);
    std::fs::create_dir_all(lock.parent().unwrap()).unwrap();

    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead = child.id();
    child.wait().unwrap();
    std::fs::write(&lock, format!("pid={dead}\n")).unwrap();

    env.cachet()
        .env("CACHET_LOCK_TIMEOUT", "5")
        .args(["add", &tools.url()])
        .assert()
        .success();
    assert!(!lock.exists());
}

#[tokio::test]
async fn test_concurrent_adds_all_land() {
    let env = TestEnv::new();
    let names = ["one", "two", "three", "four"];
    let urls: Vec<String> = names.iter().map(|n| env.origin(n, &[("run.sh", "")]).url()).collect();
    let registry = env.registry();
    registry.store().init().await.unwrap();

    let (a, b, c, d) = tokio::join!(
        registry.add(&urls[0], None, None),
        registry.add(&urls[1], None, None),
        registry.add(&urls[2], None, None),
        registry.add(&urls[3], None, None),
    );
    for outcome in [a, b, c, d] {
        outcome.unwrap();
    }

    assert_eq!(registry.names().await.unwrap(), vec!["four", "one", "three", "two"]);
    assert!(!registry.store().lock_path().exists());
}
