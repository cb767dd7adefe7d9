//! End-to-end runs of the `cachet` binary.

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn test_add_list_which_run() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("bin/greet.sh", "#!/bin/sh\necho \"hello $1\"\nexit 3\n")]);

    env.cachet()
        .args(["add", &tools.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added tools").and(predicate::str::contains("1 script")));

    env.cachet()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tools").and(predicate::str::contains("[main]")));

    env.cachet()
        .args(["which", "greet"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("greet.sh\n"));

    env.cachet()
        .args(["run", "greet", "--", "world"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("hello world"));
}

#[test]
fn test_list_scripts_as_json() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "")]);
    let beta = env.origin("beta", &[("deploy.sh", "")]);
    env.cachet().args(["add", &alpha.url()]).assert().success();
    env.cachet().args(["add", &beta.url()]).assert().success();

    let output = env.cachet().args(["list", "--scripts", "--format", "json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["group_by"], "script");
    let groups = json["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["key"], "deploy");
    let repos: Vec<&str> = groups[0]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["repository"].as_str().unwrap())
        .collect();
    assert_eq!(repos, vec!["alpha", "beta"]);
}

#[test]
fn test_which_with_pick_chooses_candidate() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "")]);
    let beta = env.origin("beta", &[("deploy.sh", "")]);
    env.cachet().args(["add", &alpha.url()]).assert().success();
    env.cachet().args(["add", &beta.url()]).assert().success();

    env.cachet()
        .args(["which", "deploy", "--pick", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("beta"));

    env.cachet()
        .args(["which", "deploy", "--pick", "5"])
        .assert()
        .code(2);

    env.cachet()
        .args(["which", "deploy", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha").and(predicate::str::contains("beta")));
}

#[test]
fn test_unknown_script_exits_not_found() {
    let env = TestEnv::new();
    env.cachet()
        .args(["which", "nothing"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_unknown_repository_exits_not_found_with_suggestion() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("a.sh", "")]);
    env.cachet().args(["add", &tools.url()]).assert().success();

    env.cachet()
        .args(["remove", "tool"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Did you mean repository 'tools'"));
}

#[test]
fn test_invalid_url_exits_validation() {
    let env = TestEnv::new();
    env.cachet().args(["add", "ftp://example.com/repo"]).assert().code(2);
    assert!(!env.cache_dir().join("repo").exists());
}

#[test]
fn test_duplicate_add_exits_conflict() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("a.sh", "")]);
    env.cachet().args(["add", &tools.url()]).assert().success();
    env.cachet()
        .args(["add", &tools.url()])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("--name"));
}

#[test]
fn test_update_with_local_changes_skips_and_exits_conflict() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("deploy.sh", "echo v1\n")]);
    let beta = env.origin("beta", &[("build.sh", "echo v1\n")]);
    env.cachet().args(["add", &alpha.url()]).assert().success();
    env.cachet().args(["add", &beta.url()]).assert().success();

    std::fs::write(env.cache_dir().join("alpha").join("deploy.sh"), "echo mine\n").unwrap();
    beta.write_file("build.sh", "echo v2\n").unwrap();
    beta.commit_all("v2").unwrap();

    env.cachet()
        .args(["update"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("alpha/deploy.sh"));

    assert_eq!(
        std::fs::read_to_string(env.cache_dir().join("alpha").join("deploy.sh")).unwrap(),
        "echo mine\n"
    );
    assert_eq!(
        std::fs::read_to_string(env.cache_dir().join("beta").join("build.sh")).unwrap(),
        "echo v2\n"
    );

    env.cachet().args(["update", "alpha", "--force"]).assert().success();
    assert_eq!(
        std::fs::read_to_string(env.cache_dir().join("alpha").join("deploy.sh")).unwrap(),
        "echo v1\n"
    );
}

#[test]
fn test_dry_run_add_changes_nothing() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("a.sh", "")]);
    env.cachet()
        .args(["--dry-run", "add", &tools.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("would clone"));
    assert!(!env.cache_dir().join("tools").exists());
}

#[test]
fn test_validate_reports_orphan_directory() {
    let env = TestEnv::new();
    env.cachet().args(["validate"]).assert().success();

    std::fs::create_dir_all(env.cache_dir().join("stray")).unwrap();
    env.cachet()
        .args(["validate"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("stray: orphaned directory"));
}

#[test]
fn test_remove_then_script_is_gone() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("a.sh", "")]);
    env.cachet().args(["add", &tools.url()]).assert().success();
    env.cachet().args(["which", "a"]).assert().success();

    env.cachet().args(["remove", "tools"]).assert().success();
    assert!(!env.cache_dir().join("tools").exists());
    env.cachet().args(["which", "a"]).assert().code(3);
}

#[test]
fn test_config_file_default_branch_is_used() {
    let env = TestEnv::new();
    let tools = cachet::test_utils::SourceRepo::create_on_branch(
        env.root(),
        "tools",
        "develop",
        &[("a.sh", "")],
    )
    .unwrap();
    env.write_config("default_branch = develop\n");

    env.cachet()
        .args(["add", &tools.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("develop"));
}

#[test]
fn test_malformed_config_line_warns_but_runs() {
    let env = TestEnv::new();
    env.write_config("this line has no equals sign\nauto_update = perhaps\n");

    env.cachet()
        .args(["list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning"));
}

#[test]
fn test_add_survives_index_write_failure() {
    let env = TestEnv::new();
    let tools = env.origin("tools", &[("deploy.sh", "")]);
    // A directory where the index file belongs makes every index write fail.
    std::fs::create_dir_all(env.cache_dir().join(".meta/script-index/blocked")).unwrap();

    env.cachet()
        .args(["add", &tools.url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added tools"))
        .stderr(predicate::str::contains("index --rebuild"));

    env.cachet()
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tools"));
}

#[test]
fn test_status_reports_each_repository() {
    let env = TestEnv::new();
    let alpha = env.origin("alpha", &[("a.sh", "")]);
    let beta = env.origin("beta", &[("b.sh", "")]);
    env.cachet().args(["add", &alpha.url()]).assert().success();
    env.cachet().args(["add", &beta.url()]).assert().success();
    std::fs::remove_dir_all(env.cache_dir().join("beta/.git")).unwrap();

    env.cachet()
        .args(["status"])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("alpha clean on main").and(predicate::str::contains("beta error:")));
}
