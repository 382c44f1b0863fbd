use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use spec_monitor::fetch::HttpFetcher;
use spec_monitor::{runner, store, summary, Settings};

#[derive(Parser)]
#[command(name = "spec_monitor", about = "Watch vendor product pages for datasheet and spec changes")]
struct Cli {
    /// Config file (JSON, TOML or YAML)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create output directories and the baseline store
    Init,
    /// Verify targets against their baselines
    Check {
        /// Only the target with this name
        #[arg(short, long)]
        target: Option<String>,
        /// Max targets to check (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show stored baselines
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    let result = match cli.command {
        Commands::Init => {
            settings.layout().ensure_dirs()?;
            std::fs::create_dir_all(&settings.output.summary_dir)?;
            let mut repo = store::open(&settings.store.path)?;
            repo.flush()?;
            println!(
                "Ready: {} targets configured, store at {:?}",
                settings.targets.len(),
                settings.store.path
            );
            Ok(())
        }
        Commands::Check { target, limit } => {
            let mut targets: Vec<_> = match &target {
                Some(name) => settings
                    .targets
                    .iter()
                    .filter(|t| &t.name == name)
                    .cloned()
                    .collect(),
                None => settings.targets.clone(),
            };
            if let Some(n) = limit {
                targets.truncate(n);
            }
            if targets.is_empty() {
                println!("No targets to check. Add some to {:?}.", cli.config);
                return Ok(());
            }

            let layout = settings.layout();
            layout.ensure_dirs()?;
            std::fs::create_dir_all(&settings.output.summary_dir)?;
            let mut repo = store::open(&settings.store.path)?;
            let fetcher = HttpFetcher::new(settings.timeout(), &settings.http.user_agent)
                .context("Failed to build HTTP client")?;

            println!("Checking {} targets...", targets.len());
            let batch = runner::run_batch(
                Arc::new(fetcher),
                &layout,
                repo.as_mut(),
                &targets,
                settings.concurrency,
            )
            .await?;

            print!("{}", summary::render_table(&batch));

            let now = chrono::Local::now();
            let report_path = settings
                .output
                .summary_dir
                .join(format!("{}_summary.html", now.format("%Y-%m-%d_%H-%M-%S")));
            std::fs::write(&report_path, summary::render_summary(&batch, &now))
                .with_context(|| format!("Failed to write {:?}", report_path))?;
            info!("Summary written to {:?}", report_path);

            println!(
                "Done: {} checked ({} changed, {} failed).",
                batch.results.len(),
                batch.changed(),
                batch.failed()
            );
            Ok(())
        }
        Commands::Status => {
            let repo = store::open(&settings.store.path)?;
            let records = repo.load_all()?;
            if records.is_empty() {
                println!("No baselines stored yet. Run 'check' first.");
                return Ok(());
            }

            println!(
                "{:<24} | {:<10} | {:<10} | {:<25} | {}",
                "Target", "File", "Spec", "Last checked", "URL"
            );
            println!("{}", "-".repeat(110));
            for t in &settings.targets {
                let Some(r) = records.get(&t.url) else {
                    println!(
                        "{:<24} | {:<10} | {:<10} | {:<25} | {}",
                        summary::truncate(&t.name, 24),
                        "-",
                        "-",
                        "never",
                        t.url
                    );
                    continue;
                };
                println!(
                    "{:<24} | {:<10} | {:<10} | {:<25} | {}",
                    summary::truncate(&t.name, 24),
                    short(&r.file_hash),
                    short(&r.html_hash),
                    r.last_checked_at.format("%Y-%m-%d %H:%M:%S %:z"),
                    t.url
                );
            }

            let orphaned = records
                .keys()
                .filter(|url| !settings.targets.iter().any(|t| &t.url == *url))
                .count();
            if orphaned > 0 {
                println!("\n{} stored baselines have no configured target.", orphaned);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn short(hash: &str) -> String {
    hash.chars().take(8).collect()
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
