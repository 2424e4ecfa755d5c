//! Command line definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tmplsync_core::{RepositoryType, TemplateRepositoryRef};
use tmplsync_git::{ManagerConfig, RetryConfig};

#[derive(Parser, Debug)]
#[command(
    name = "tmplsync",
    author,
    version,
    about = "Local cache of git-hosted template repositories",
    after_help = "Examples:\n  tmplsync checkout https://github.com/org/templates.git --sparse --path template1\n  tmplsync template https://github.com/org/templates.git --template template1 --out ./out\n  tmplsync watch https://github.com/org/templates.git --interval 60"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    #[arg(long, global = true, env = "TMPLSYNC_TEMP_DIR", help = "Parent directory of repository checkouts")]
    pub temp_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "TMPLSYNC_GIT_BINARY", default_value = "git", help = "Git executable")]
    pub git_binary: PathBuf,
    #[arg(
        long,
        global = true,
        env = "TMPLSYNC_CHECKOUT_TIMEOUT",
        default_value_t = 120,
        help = "Clone timeout in seconds"
    )]
    pub checkout_timeout: u64,
    #[arg(
        long,
        global = true,
        env = "TMPLSYNC_PULL_TIMEOUT",
        default_value_t = 30,
        help = "Pull and sparse load timeout in seconds"
    )]
    pub pull_timeout: u64,
}

impl GlobalArgs {
    /// Manager settings for the given checkout mode.
    pub fn manager_config(&self, sparse: bool) -> ManagerConfig {
        ManagerConfig {
            sparse,
            temp_dir: self.temp_dir.clone(),
            git_binary: self.git_binary.clone(),
            checkout_timeout: Duration::from_secs(self.checkout_timeout),
            pull_timeout: Duration::from_secs(self.pull_timeout),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Check out a repository and list its files")]
    Checkout(CheckoutArgs),
    #[command(about = "Resolve a template version and copy it out of the repository")]
    Template(TemplateArgs),
    #[command(about = "Keep repositories up to date until interrupted")]
    Watch(WatchArgs),
}

/// Which repository to open.
#[derive(Args, Debug, Clone)]
pub struct RepositoryArgs {
    #[arg(help = "Git URL, or a directory with --type dir")]
    pub url: String,
    #[arg(long = "ref", env = "TMPLSYNC_REF", default_value = "main", help = "Branch or tag")]
    pub reference: String,
    #[arg(long = "type", default_value = "git", help = "Repository type: git or dir")]
    pub repo_type: RepositoryType,
    #[arg(long, help = "Check out only the paths that are needed")]
    pub sparse: bool,
}

impl RepositoryArgs {
    pub fn definition(&self) -> TemplateRepositoryRef {
        definition(self.repo_type, &self.url, &self.reference)
    }
}

fn definition(repo_type: RepositoryType, url: &str, reference: &str) -> TemplateRepositoryRef {
    match repo_type {
        RepositoryType::Git => TemplateRepositoryRef::git("cli", url, reference),
        RepositoryType::Dir => TemplateRepositoryRef::dir("cli", url),
    }
}

#[derive(Args, Debug)]
pub struct CheckoutArgs {
    #[command(flatten)]
    pub repository: RepositoryArgs,
    #[arg(long = "path", help = "Path to load in sparse mode, repeatable")]
    pub paths: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub repository: RepositoryArgs,
    #[arg(long, help = "Template id from the repository manifest")]
    pub template: String,
    #[arg(long, help = "Template version, the highest stable one if omitted")]
    pub version: Option<String>,
    #[arg(long, help = "Directory to write the template to")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[arg(required = true, help = "Git URLs to keep up to date")]
    pub urls: Vec<String>,
    #[arg(long = "ref", env = "TMPLSYNC_REF", default_value = "main", help = "Branch or tag")]
    pub reference: String,
    #[arg(long, help = "Check out only the repository manifests")]
    pub sparse: bool,
    #[arg(long, env = "TMPLSYNC_INTERVAL", default_value_t = 30, help = "Update interval in seconds")]
    pub interval: u64,
}

impl WatchArgs {
    pub fn definitions(&self) -> Vec<TemplateRepositoryRef> {
        self.urls
            .iter()
            .map(|url| definition(RepositoryType::Git, url, &self.reference))
            .collect()
    }
}
