//! Faultline - safe-commit mining CLI
//!
//! The `faultline` command mines git history around known catastrophic
//! changes.
//!
//! ## Commands
//!
//! - `window`: Fetch a commit window and print it as JSON
//! - `verify`: Check which catalog records can be fetched
//! - `collect`: Sample safe commits for every catalog record

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use faultline_core::{
    BatchCollector, Catalog, ComponentAwareSampler, FaultlineConfig, IdentifierOracle, Verifier,
};
use faultline_git::{CommitWindowFetcher, FetchConfig, GitRunner, HostedHistoryResolver};

#[derive(Parser)]
#[command(name = "faultline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mine safe commits around catastrophic changes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "FAULTLINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a target commit with its ancestors and descendants
    Window {
        /// Repository URL
        repo: String,

        /// Target commit id
        commit: String,

        /// Ancestors to fetch (default from config)
        #[arg(short = 'n', long)]
        ancestors: Option<usize>,

        /// Descendants to fetch (default from config)
        #[arg(short = 'm', long)]
        descendants: Option<usize>,
    },

    /// Verify that each record's fixing commit can be fetched
    Verify {
        /// Catastrophe catalog (JSON)
        catalog: PathBuf,

        /// Mark successful records as verified in the catalog file
        #[arg(long)]
        write: bool,
    },

    /// Collect safe commits for every record in a catalog
    Collect {
        /// Catastrophe catalog (JSON)
        catalog: PathBuf,

        /// Write the dataset report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Catastrophes processed at once (default from config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Sample records that have not been verified yet
        #[arg(long)]
        include_unverified: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    faultline_core::telemetry::init_tracing(cli.json, level);

    let config = FaultlineConfig::resolve(cli.config.as_deref())
        .context("Failed to load faultline configuration")?;

    let runner = GitRunner::new();
    let version = runner
        .ensure_available()
        .await
        .context("git is required: install git 2.31 or newer and make sure it is on PATH")?;
    info!(%version, "git available");

    let fetcher = build_fetcher(runner, &config)?;

    match cli.command {
        Commands::Window {
            repo,
            commit,
            ancestors,
            descendants,
        } => cmd_window(&fetcher, &config, &repo, &commit, ancestors, descendants).await,
        Commands::Verify { catalog, write } => cmd_verify(fetcher, &config, &catalog, write).await,
        Commands::Collect {
            catalog,
            output,
            concurrency,
            include_unverified,
        } => {
            cmd_collect(
                fetcher,
                config,
                &catalog,
                output.as_deref(),
                concurrency,
                include_unverified,
            )
            .await
        }
    }
}

fn build_fetcher(runner: GitRunner, config: &FaultlineConfig) -> Result<CommitWindowFetcher> {
    let resolver = HostedHistoryResolver::new(config.resolver.clone(), &config.timeouts)
        .context("Failed to build hosting-platform client")?;
    let mut fetcher = CommitWindowFetcher::new(runner, Arc::new(resolver), config.timeouts.clone())
        .with_reachability_bound(config.reachability_bound);
    if let Some(root) = &config.work_root {
        fetcher = fetcher.with_work_root(root.clone());
    }
    Ok(fetcher)
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    let catalog = Catalog::load(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    for rejected in catalog.rejected() {
        warn!(id = %rejected.id, reason = %rejected.reason, "catalog entry ignored");
    }
    Ok(catalog)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct WindowOutput<'a> {
    repo: &'a str,
    target: &'a str,
    ancestors: &'a [String],
    descendants: &'a [String],
}

async fn cmd_window(
    fetcher: &CommitWindowFetcher,
    config: &FaultlineConfig,
    repo: &str,
    commit: &str,
    ancestors: Option<usize>,
    descendants: Option<usize>,
) -> Result<()> {
    // A manual window request is not tied to a catalog record.
    let window_config = FetchConfig::new(
        ancestors.unwrap_or(config.window.ancestor_count),
        descendants.unwrap_or(config.window.descendant_count),
    )
    .with_verification_bypass(true);

    let fetch = fetcher
        .fetch_window(repo, commit, &window_config)
        .await
        .context("Failed to prepare a local repository")?;
    let window = fetch
        .window
        .with_context(|| format!("Failed to fetch window around {commit}"))?;

    print_json(&WindowOutput {
        repo,
        target: window.target(),
        ancestors: window.ancestors(),
        descendants: window.descendants(),
    })
}

async fn cmd_verify(
    fetcher: CommitWindowFetcher,
    config: &FaultlineConfig,
    path: &Path,
    write: bool,
) -> Result<()> {
    let mut catalog = load_catalog(path)?;
    let verifier = Verifier::new(fetcher).with_concurrency(config.batch.concurrency);
    let results = verifier.verify_all(catalog.records()).await;

    let succeeded = results.iter().filter(|r| r.success).count();
    info!(
        succeeded,
        failed = results.len() - succeeded,
        "verification finished"
    );

    if write {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        for result in results.iter().filter(|r| r.success) {
            if !catalog.mark_verified(&result.id, &result.notes(&today)) {
                warn!(id = %result.id, "record vanished from catalog before write-back");
            }
        }
        catalog.set_last_verified(&today);
        catalog
            .save(path)
            .with_context(|| format!("Failed to write catalog {}", path.display()))?;
        info!(path = %path.display(), "catalog updated");
    }

    print_json(&results)
}

async fn cmd_collect(
    fetcher: CommitWindowFetcher,
    mut config: FaultlineConfig,
    path: &Path,
    output: Option<&Path>,
    concurrency: Option<usize>,
    include_unverified: bool,
) -> Result<()> {
    let catalog = load_catalog(path)?;
    if catalog.records().is_empty() {
        bail!("catalog {} has no usable records", path.display());
    }

    if let Some(concurrency) = concurrency {
        config.batch.concurrency = concurrency;
    }
    if include_unverified {
        config.sampler.verification_bypass = true;
    }
    config.validate().context("Invalid run settings")?;

    let sampler = ComponentAwareSampler::new(IdentifierOracle::new(), fetcher, config.sampler);
    let collector = BatchCollector::new(sampler, config.batch);
    let report = collector.run(catalog.records()).await;

    info!(
        succeeded = report.succeeded(),
        skipped = report.skipped_count(),
        safe_commits = report.metadata.total_safe_commits,
        "collection finished"
    );

    match output {
        Some(out) => {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(out, json)
                .with_context(|| format!("Failed to write report {}", out.display()))?;
            println!("Wrote {} to {}", report.metadata.run_id, out.display());
            Ok(())
        }
        None => print_json(&report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_window_arguments_parse() {
        let cli = Cli::try_parse_from([
            "faultline",
            "--json",
            "window",
            "https://github.com/openssl/openssl.git",
            "96db9023b881d7cd9f379b0c154650d6c108e9a3",
            "-n",
            "5",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Window {
                ancestors,
                descendants,
                ..
            } => {
                assert_eq!(ancestors, Some(5));
                assert_eq!(descendants, None);
            }
            _ => panic!("expected window command"),
        }
    }

    #[test]
    fn test_collect_arguments_parse() {
        let cli = Cli::try_parse_from([
            "faultline",
            "collect",
            "catastrophes.json",
            "-o",
            "dataset.json",
            "--concurrency",
            "8",
            "--include-unverified",
        ])
        .unwrap();
        match cli.command {
            Commands::Collect {
                output,
                concurrency,
                include_unverified,
                ..
            } => {
                assert_eq!(output, Some(PathBuf::from("dataset.json")));
                assert_eq!(concurrency, Some(8));
                assert!(include_unverified);
            }
            _ => panic!("expected collect command"),
        }
    }

    #[test]
    fn test_load_catalog_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_catalog(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read catalog"));
    }
}
