//! Subcommand implementations.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tmplsync_core::{Filesystem, LocalFs, copy_fs};
use tmplsync_git::template::MANIFEST_DIR;
use tmplsync_git::{
    OpContext, RefreshConfig, RefreshScheduler, Repository, RepositoryManager, SyncState, TemplateFsResolver,
};
use tracing::info;

use crate::cli::{CheckoutArgs, Cli, Command, GlobalArgs, TemplateArgs, WatchArgs};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub repository: String,
    pub commit_hash: String,
    pub sparse: bool,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub repository: String,
    pub template_id: String,
    pub version: String,
    pub path: String,
    pub commit_hash: String,
    pub files: Vec<String>,
}

/// Runs the parsed command, writing JSON results to `out`.
pub async fn run<W: Write>(cli: Cli, out: &mut W) -> anyhow::Result<()> {
    let ctx = OpContext::background();
    match cli.command {
        Command::Checkout(args) => checkout(&ctx, &cli.global, args, out).await,
        Command::Template(args) => template(&ctx, &cli.global, args, out).await,
        Command::Watch(args) => watch(&ctx, &cli.global, args).await,
    }
}

async fn checkout<W: Write>(ctx: &OpContext, global: &GlobalArgs, args: CheckoutArgs, out: &mut W) -> anyhow::Result<()> {
    let manager = RepositoryManager::new(ctx, global.manager_config(args.repository.sparse), vec![]).await?;

    let result = async {
        let repo = manager.repository(ctx, args.repository.definition()).await?;
        for path in &args.paths {
            repo.load(ctx, path)
                .await
                .with_context(|| format!("cannot load \"{path}\""))?;
        }
        let fs = repo.fs()?;
        let files = list_files(&*fs)?;
        fs.release();

        Ok::<_, anyhow::Error>(CheckoutSummary {
            repository: repo.to_string(),
            commit_hash: repo.commit_hash(),
            sparse: repo.is_sparse(),
            files,
        })
    }
    .await;

    manager.free().await;
    print_json(out, &result?)
}

async fn template<W: Write>(ctx: &OpContext, global: &GlobalArgs, args: TemplateArgs, out: &mut W) -> anyhow::Result<()> {
    let manager = RepositoryManager::new(ctx, global.manager_config(args.repository.sparse), vec![]).await?;

    let result = async {
        let repo = manager.repository(ctx, args.repository.definition()).await?;
        let resolved = TemplateFsResolver::new()
            .resolve(ctx, repo.as_ref(), &args.template, args.version.as_deref())
            .await?;

        if let Some(dir) = &args.out {
            std::fs::create_dir_all(dir).with_context(|| format!("cannot create \"{}\"", dir.display()))?;
            let target = LocalFs::new(dir)?;
            copy_fs(&resolved.fs, "", &target, "")?;
            info!("Template \"{}\" {} written to {}", resolved.template_id, resolved.version, dir.display());
        }

        Ok::<_, anyhow::Error>(TemplateSummary {
            repository: repo.to_string(),
            files: resolved.fs.walk_files("")?,
            template_id: resolved.template_id,
            version: resolved.version,
            path: resolved.path,
            commit_hash: resolved.commit_hash,
        })
    }
    .await;

    manager.free().await;
    print_json(out, &result?)
}

async fn watch(ctx: &OpContext, global: &GlobalArgs, args: WatchArgs) -> anyhow::Result<()> {
    let manager = RepositoryManager::new(ctx, global.manager_config(args.sparse), args.definitions()).await?;
    if args.sparse {
        for definition in args.definitions() {
            let repo = manager.repository(ctx, definition).await?;
            repo.load(ctx, MANIFEST_DIR).await?;
        }
    }

    let state = Arc::new(SyncState::new());
    let config = RefreshConfig {
        interval: Duration::from_secs(args.interval.max(1)),
        ..RefreshConfig::default()
    };
    let handle = RefreshScheduler::new(Arc::clone(&manager), Arc::clone(&state), config).start();
    info!(
        "Watching {} repositories, press Ctrl+C to stop",
        manager.managed_repositories().len()
    );

    tokio::signal::ctrl_c().await.context("cannot listen for Ctrl+C")?;
    handle.stop();
    info!(
        "Stopped after {} updates, {} changes observed",
        state.updates(),
        state.changes()
    );

    manager.free().await;
    Ok(())
}

/// Repository files without git internals.
fn list_files(fs: &dyn Filesystem) -> anyhow::Result<Vec<String>> {
    Ok(fs
        .walk_files("")?
        .into_iter()
        .filter(|path| path != ".git" && !path.starts_with(".git/"))
        .collect())
}

fn print_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
