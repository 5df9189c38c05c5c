use std::sync::Arc;

use scriptdock::errors::StartError;
use scriptdock::registry::ProjectRegistry;
use scriptdock::supervisor::{InstallOutcome, RunKind, StartOutcome, StopOutcome};
use scriptdock_test_utils::builders::{test_settings, ProjectBuilder};
use scriptdock_test_utils::{init_tracing, spawn_supervisor, with_timeout};

#[tokio::test]
async fn bulk_start_reports_per_project_outcomes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    ProjectBuilder::new("good").write_to(dir.path());
    let registry = Arc::new(ProjectRegistry::discover(dir.path()).unwrap());
    let fx = spawn_supervisor(registry, test_settings(dir.path()));

    let outcomes = fx
        .handle
        .bulk_start(vec!["good".to_string(), "missing".to_string()])
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, "good");
    assert!(matches!(outcomes[0].1, StartOutcome::Started(_)));
    assert_eq!(outcomes[1].0, "missing");
    assert!(matches!(
        outcomes[1].1,
        StartOutcome::Failed(StartError::UnknownProject(_))
    ));

    // The failure did not abort the rest.
    assert_eq!(fx.launcher.launch_count("good"), 1);
}

#[tokio::test]
async fn bulk_stop_mixes_stopped_and_not_running() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    ProjectBuilder::new("a").write_to(dir.path());
    ProjectBuilder::new("b").write_to(dir.path());
    let registry = Arc::new(ProjectRegistry::discover(dir.path()).unwrap());
    let fx = spawn_supervisor(registry, test_settings(dir.path()));

    fx.handle.start("a".to_string()).await.unwrap();

    let outcomes = with_timeout(fx.handle.bulk_stop(vec!["a".to_string(), "b".to_string()]))
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            ("a".to_string(), StopOutcome::Stopped { forced: false }),
            ("b".to_string(), StopOutcome::NotRunning),
        ]
    );
}

#[tokio::test]
async fn bulk_started_item_can_be_cancelled_individually() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    ProjectBuilder::new("a").write_to(dir.path());
    ProjectBuilder::new("b").write_to(dir.path());
    let registry = Arc::new(ProjectRegistry::discover(dir.path()).unwrap());
    let fx = spawn_supervisor(registry, test_settings(dir.path()));

    fx.handle
        .bulk_start(vec!["a".to_string(), "b".to_string()])
        .await
        .unwrap();

    // Stop only one of the batch; the other keeps running.
    let outcome = with_timeout(fx.handle.stop("a".to_string())).await.unwrap();
    assert_eq!(outcome, StopOutcome::Stopped { forced: false });

    let running = fx.handle.running_ids().await.unwrap();
    assert_eq!(running, vec!["b".to_string()]);
}

#[tokio::test]
async fn concurrent_install_is_rejected_synchronously() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    ProjectBuilder::new("etl").with_manifest().write_to(dir.path());
    let registry = Arc::new(ProjectRegistry::discover(dir.path()).unwrap());
    let fx = spawn_supervisor(registry, test_settings(dir.path()));

    let first = fx.handle.install("etl".to_string()).await.unwrap();
    assert!(matches!(first, InstallOutcome::Started(_)));

    let second = fx.handle.install("etl".to_string()).await.unwrap();
    assert!(matches!(second, InstallOutcome::AlreadyInstalling));
}

#[tokio::test]
async fn install_does_not_occupy_the_script_slot() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    ProjectBuilder::new("etl").with_manifest().write_to(dir.path());
    let registry = Arc::new(ProjectRegistry::discover(dir.path()).unwrap());
    let fx = spawn_supervisor(registry, test_settings(dir.path()));

    fx.handle.install("etl".to_string()).await.unwrap();
    let start = fx.handle.start("etl".to_string()).await.unwrap();
    assert!(matches!(start, StartOutcome::Started(_)));

    let launches = fx.launcher.launches();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[0].kind, RunKind::Install);
    assert_eq!(launches[1].kind, RunKind::Script);
}

#[tokio::test]
async fn bulk_install_reports_missing_manifest_per_project() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    ProjectBuilder::new("with").with_manifest().write_to(dir.path());
    ProjectBuilder::new("without").write_to(dir.path());
    let registry = Arc::new(ProjectRegistry::discover(dir.path()).unwrap());
    let fx = spawn_supervisor(registry, test_settings(dir.path()));

    let outcomes = fx
        .handle
        .bulk_install(vec!["with".to_string(), "without".to_string()])
        .await
        .unwrap();

    assert!(matches!(outcomes[0].1, InstallOutcome::Started(_)));
    assert!(matches!(
        outcomes[1].1,
        InstallOutcome::Failed(StartError::Launch(_))
    ));
}
