//! Repository manager, refresh scheduler and template resolution over git.

#[macro_use]
mod common;

use std::sync::Arc;

use common::{Upstream, list_dir};
use tmplsync_core::Filesystem;
use tmplsync_git::{
    ManagerConfig, OpContext, RefreshConfig, RefreshScheduler, RepositoryManager, RetryConfig, SyncState,
    TemplateFsResolver,
};

fn manager_config(temp_root: &std::path::Path, sparse: bool) -> ManagerConfig {
    ManagerConfig {
        sparse,
        temp_dir: Some(temp_root.to_path_buf()),
        retry: RetryConfig::no_retry(),
        ..ManagerConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_checkout() {
    require_git!();
    let upstream = Upstream::new();
    let temp = tempfile::tempdir().unwrap();
    let ctx = OpContext::background();
    let manager = RepositoryManager::new(&ctx, manager_config(temp.path(), false), vec![])
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        let ctx = ctx.clone();
        let definition = upstream.definition("main");
        tasks.push(tokio::spawn(async move { manager.repository(&ctx, definition).await }));
    }
    let mut repos = Vec::new();
    for task in tasks {
        repos.push(task.await.unwrap().unwrap());
    }
    for repo in &repos[1..] {
        assert!(Arc::ptr_eq(&repos[0], repo));
    }

    // One base directory for the single checkout
    assert_eq!(list_dir(temp.path()).len(), 1);
    assert_eq!(
        manager.managed_repositories(),
        vec![format!("{}:main", upstream.url())]
    );

    drop(repos);
    manager.free().await;
    assert!(list_dir(temp.path()).is_empty());
}

#[tokio::test]
async fn update_reports_changes_and_failures() {
    require_git!();
    let upstream = Upstream::new();
    let other = Upstream::new();
    let temp = tempfile::tempdir().unwrap();
    let ctx = OpContext::background();

    let manager = RepositoryManager::new(
        &ctx,
        manager_config(temp.path(), false),
        vec![upstream.definition("main"), other.definition("main")],
    )
    .await
    .unwrap();
    assert_eq!(manager.managed_repositories().len(), 2);

    let outcomes = manager.update(&ctx).await.unwrap();
    assert!(outcomes.iter().all(|o| !o.result.changed));

    upstream.write("template1/v1/README.md", "changed");
    let new_hash = upstream.commit("change");
    let outcomes = manager.update(&ctx).await.unwrap();
    let changed: Vec<_> = outcomes.iter().filter(|o| o.result.changed).collect();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].result.new_hash, new_hash);
    assert_eq!(changed[0].repository, format!("{}:main", upstream.url()));

    // Upstream of the second repository disappears
    let other_url = other.url();
    drop(other);
    let err = manager.update(&ctx).await.unwrap_err();
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, format!("{other_url}:main"));
    assert!(err.to_string().contains("cannot fetch repository"));

    manager.free().await;
}

#[tokio::test]
async fn new_manager_reports_every_failed_default() {
    require_git!();
    let upstream = Upstream::new();
    let temp = tempfile::tempdir().unwrap();

    let err = RepositoryManager::new(
        &OpContext::background(),
        manager_config(temp.path(), false),
        vec![
            upstream.definition("main"),
            upstream.definition("missing-1"),
            upstream.definition("missing-2"),
        ],
    )
    .await
    .unwrap_err();

    assert_eq!(err.failures.len(), 2);
    assert!(err.failures.iter().all(|(_, e)| e.is_not_found()));
    // The successful checkout was freed again
    assert!(list_dir(temp.path()).is_empty());
}

#[tokio::test]
async fn scheduler_refresh_records_changes() {
    require_git!();
    let upstream = Upstream::new();
    let temp = tempfile::tempdir().unwrap();
    let ctx = OpContext::background();
    let manager = RepositoryManager::new(&ctx, manager_config(temp.path(), false), vec![upstream.definition("main")])
        .await
        .unwrap();

    let state = Arc::new(SyncState::new());
    let scheduler = RefreshScheduler::new(Arc::clone(&manager), Arc::clone(&state), RefreshConfig::default());

    upstream.write("_common/snippet.txt", "new common");
    upstream.commit("common");
    scheduler.refresh(&ctx).await.unwrap();
    scheduler.refresh(&ctx).await.unwrap();

    assert_eq!(state.changes(), 1);
    assert_eq!(state.updates(), 2);
    assert!(state.is_healthy());

    manager.free().await;
}

#[tokio::test]
async fn resolve_template_from_sparse_checkout() {
    require_git!();
    let upstream = Upstream::new();
    let temp = tempfile::tempdir().unwrap();
    let ctx = OpContext::background();
    let manager = RepositoryManager::new(&ctx, manager_config(temp.path(), true), vec![])
        .await
        .unwrap();
    let repo = manager.repository(&ctx, upstream.definition("main")).await.unwrap();
    assert!(repo.is_sparse());

    let resolved = TemplateFsResolver::new()
        .resolve(&ctx, repo.as_ref(), "template1", None)
        .await
        .unwrap();

    assert_eq!(resolved.template_id, "template1");
    assert_eq!(resolved.version, "2.0.0");
    assert_eq!(resolved.path, "template1/v2");
    assert_eq!(resolved.commit_hash, upstream.head());
    assert_eq!(resolved.fs.read_to_string("template1/v2/README.md").unwrap(), "template1 v2");
    assert_eq!(resolved.fs.read_to_string("_common/snippet.txt").unwrap(), "common");
    assert!(!resolved.fs.exists("template1/v1"));

    // Only the resolved paths were checked out
    let snapshot = repo.fs().unwrap();
    assert!(snapshot.is_dir("template1/v2"));
    assert!(!snapshot.exists("template1/v1"));
    assert!(!snapshot.exists("template2"));
    snapshot.release();

    // The copy outlives the repository
    manager.free().await;
    assert!(resolved.fs.is_file("template1/v2/README.md"));
}
