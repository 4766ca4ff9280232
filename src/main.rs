use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use registry_mirror::config::Config;
use registry_mirror::git::{CommitFilter, WorkingCopy};
use registry_mirror::lock::MirrorLock;
use registry_mirror::manifest::Manifest;
use registry_mirror::mirror::{CommitRef, MirrorStore, merge_manifest};
use registry_mirror::paths::PlatformPaths;
use registry_mirror::snapshot::CommandSnapshotProducer;
use registry_mirror::sync::{MirrorSync, SyncOptions};
use registry_mirror::web::{self, ApiState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long `merge` and `reindex` wait for a running sync to release the mirror
const WRITE_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Historical, content-addressed mirror of a component registry
#[derive(Parser, Debug)]
#[command(name = "registry-mirror", version, long_version = env!("MIRROR_LONG_VERSION"), about)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay pending upstream commits into the mirror
    Sync {
        /// Repository to clone or fetch from
        #[arg(long)]
        repo_url: Option<String>,
        /// Working copy location
        #[arg(long, value_name = "DIR")]
        repo_path: Option<PathBuf>,
        /// Mirror output root
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Forget recorded progress and replay every commit
        #[arg(long)]
        full: bool,
    },
    /// Merge a single manifest into the mirror and print the changelog
    Merge {
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,
        /// Directory the manifest's file paths are relative to
        #[arg(long, value_name = "DIR")]
        source_root: PathBuf,
        /// Commit id to attribute new versions to
        #[arg(long)]
        commit: String,
        /// ISO 8601 commit time (defaults to now)
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Rebuild index.json from the component documents
    Reindex {
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Serve the mirror over HTTP
    Serve {
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// Also save it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::new(cli.config.as_deref())?;

    match cli.command {
        Command::Sync {
            repo_url,
            repo_path,
            output,
            full,
        } => {
            if repo_url.is_some() {
                config.repository.url = repo_url;
            }
            if let Some(path) = repo_path {
                config.repository.path = path;
            }
            if let Some(output) = output {
                config.mirror.output_root = output;
            }
            config.validate()?;
            run_sync(config, full).await
        }
        Command::Merge {
            manifest,
            source_root,
            commit,
            timestamp,
            output,
        } => {
            let output = output.unwrap_or(config.mirror.output_root);
            let timestamp =
                timestamp.unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

            let outcome = tokio::task::spawn_blocking(move || {
                let manifest = Manifest::load(&manifest)?;
                let store = MirrorStore::new(output);
                let _lock =
                    MirrorLock::acquire_store(&PlatformPaths::lock_dir(), &store, WRITE_LOCK_TIMEOUT)?;
                merge_manifest(
                    &manifest,
                    &source_root,
                    &store,
                    &CommitRef::new(commit, timestamp),
                    None,
                )
            })
            .await
            .context("Merge task panicked")??;

            println!("{}", serde_json::to_string_pretty(&outcome.changelog)?);
            Ok(())
        }
        Command::Reindex { output } => {
            let store = MirrorStore::new(output.unwrap_or(config.mirror.output_root));
            let mirror = tokio::task::spawn_blocking(move || {
                let _lock =
                    MirrorLock::acquire_store(&PlatformPaths::lock_dir(), &store, WRITE_LOCK_TIMEOUT)?;
                store.rebuild_index()
            })
                .await
                .context("Reindex task panicked")??;
            println!("Indexed {} components", mirror.len());
            Ok(())
        }
        Command::Serve { bind, output } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(output) = output {
                config.mirror.output_root = output;
            }
            config.validate()?;

            let addr: SocketAddr = config
                .server
                .bind
                .parse()
                .with_context(|| format!("Invalid bind address '{}'", config.server.bind))?;
            let state = ApiState::new(
                MirrorStore::new(config.mirror.output_root),
                &config.server.public_url,
            );

            tokio::select! {
                result = web::serve(state, addr) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                    Ok(())
                }
            }
        }
        Command::Config { write } => {
            print!("{}", config.to_toml()?);
            if write {
                let path = cli
                    .config
                    .unwrap_or_else(PlatformPaths::default_config_path);
                config.save(&path)?;
            }
            Ok(())
        }
    }
}

async fn run_sync(config: Config, full: bool) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let repository = &config.repository;
        let working_copy = WorkingCopy::prepare(
            repository.url.as_deref(),
            &repository.path,
            repository.branch.as_deref(),
        )?;
        let max_commits = (repository.max_commits > 0).then_some(repository.max_commits);

        let sync = MirrorSync::new(
            working_copy.into_source(max_commits),
            CommandSnapshotProducer::from_config(&config.snapshot),
            CommitFilter::new(&repository.watch_paths)?,
            MirrorStore::new(&config.mirror.output_root),
            SyncOptions {
                state_path: config.mirror.state_path.clone(),
                lock_dir: PlatformPaths::lock_dir(),
                full,
                continue_on_error: config.mirror.continue_on_error,
            },
        );
        Ok(sync.run()?)
    })
    .await
    .context("Sync task panicked")??;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.commits_failed > 0 {
        bail!("{} commits failed to merge", report.commits_failed);
    }
    Ok(())
}
