use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use url::Url;

use site_grader::fetch::budget::OutboundBudget;
use site_grader::fetch::HttpFetcher;
use site_grader::{CompositeReport, GradeError, Grader, Millis, Settings, StatusBand};

const BATCH_CONCURRENCY: usize = 4;

#[derive(Parser)]
#[command(name = "site_grader", about = "Grade a website across seven quality factors")]
struct Cli {
    /// Settings file (default: ./site_grader.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a single URL
    Grade {
        url: String,
        /// Print the JSON report instead of the summary table
        #[arg(long)]
        json: bool,
    },
    /// Grade many URLs, one JSON report per line
    Batch {
        /// File with one URL per line
        #[arg(long, conflicts_with = "sitemap", required_unless_present = "sitemap")]
        file: Option<PathBuf>,
        /// Sitemap (or sitemap index) listing the URLs
        #[arg(long)]
        sitemap: Option<String>,
        /// Max URLs to grade
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show factor weights and status bands
    Weights,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    let result = match cli.command {
        Commands::Grade { url, json } => {
            let grader = Grader::from_settings(&settings)?;
            let cancel = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let report = grader.grade_until(&url, cancel).await.with_context(|| format!("grading {}", url))?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                print_summary(&report);
            }
            Ok(())
        }
        Commands::Batch { file, sitemap, limit, output } => {
            let budget = Arc::new(OutboundBudget::new(&settings.budget));
            let urls = match (file, sitemap) {
                (Some(path), _) => read_url_list(&path, limit)?,
                (None, Some(sitemap)) => {
                    let fetcher = HttpFetcher::new(settings.fetch.clone(), Arc::clone(&budget))?;
                    let sitemap = Url::parse(&sitemap).with_context(|| format!("invalid sitemap URL {}", sitemap))?;
                    fetcher
                        .sitemap_pages(&sitemap, limit.unwrap_or(usize::MAX))
                        .await
                        .with_context(|| format!("reading sitemap {}", sitemap))?
                        .into_iter()
                        .map(String::from)
                        .collect()
                }
                (None, None) => bail!("batch needs --file or --sitemap"),
            };
            if urls.is_empty() {
                println!("No URLs to grade.");
                return Ok(());
            }

            let grader = Arc::new(Grader::with_budget(&settings, budget)?);
            let stats = grade_batch(grader, urls, output.as_deref()).await?;
            eprintln!("Done: {} graded ({} ok, {} failed).", stats.total, stats.ok, stats.failed);
            Ok(())
        }
        Commands::Weights => {
            let table = settings.weight_table()?;
            println!("{:<14} | {:>6}", "Factor", "Weight");
            println!("{}", "-".repeat(23));
            for (factor, weight) in table.iter() {
                println!("{:<14} | {:>5.1}%", factor, weight * 100.0);
            }
            println!("\nStatus bands:");
            for (band, min) in StatusBand::THRESHOLDS {
                println!("  {:<10} >= {}", band, min);
            }
            println!("  {:<10} <  {}", StatusBand::Poor, StatusBand::THRESHOLDS[2].1);
            Ok(())
        }
    };

    let elapsed = Millis::from(t0.elapsed());
    if elapsed >= Millis::from_millis(1_000) {
        eprintln!("\nDone in {}", format_elapsed(elapsed));
    }

    result
}

struct BatchStats {
    total: usize,
    ok: usize,
    failed: usize,
}

/// Grade URLs concurrently; reports are written as they arrive.
async fn grade_batch(grader: Arc<Grader>, urls: Vec<String>, output: Option<&Path>) -> anyhow::Result<BatchStats> {
    let total = urls.len();
    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let semaphore = Arc::new(Semaphore::new(BATCH_CONCURRENCY));
    let (tx, mut rx) =
        tokio::sync::mpsc::channel::<(String, Result<CompositeReport, GradeError>)>(BATCH_CONCURRENCY * 2);

    for url in urls {
        let grader = Arc::clone(&grader);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let result = grader.grade(&url).await;
            let _ = tx.send((url, result)).await;
        });
    }
    // rx closes once every task has sent
    drop(tx);

    let mut ok = 0usize;
    let mut failed = 0usize;
    while let Some((url, result)) = rx.recv().await {
        match result {
            Ok(report) => {
                writeln!(out, "{}", report.to_json()?)?;
                ok += 1;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "grading failed");
                failed += 1;
            }
        }
        pb.inc(1);
    }
    out.flush()?;

    pb.finish_and_clear();
    info!(total, ok, failed, "batch finished");
    Ok(BatchStats { total, ok, failed })
}

fn read_url_list(path: &Path, limit: Option<usize>) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .take(limit.unwrap_or(usize::MAX))
        .map(String::from)
        .collect())
}

fn print_summary(report: &CompositeReport) {
    println!("{}", report.url());
    println!(
        "Composite {:.1} ({}), confidence {:?}\n",
        report.composite_score(),
        report.status_band(),
        report.confidence()
    );
    println!("{:<14} | {:>6} | {:<18} | {:>8}", "Factor", "Score", "Confidence", "Findings");
    println!("{}", "-".repeat(56));
    for f in report.factors() {
        println!(
            "{:<14} | {:>6.1} | {:<18} | {:>8}",
            f.factor,
            f.score,
            format!("{:?}", f.confidence),
            f.findings.len()
        );
    }

    let mut any = false;
    for f in report.factors() {
        for finding in &f.findings {
            if !any {
                println!("\n--- Findings ---");
                any = true;
            }
            println!(
                "  [{:?}] {}: {} ({})",
                finding.severity,
                f.factor,
                clip(&finding.message, 90),
                finding.code
            );
        }
    }
}

/// Cut `s` to at most `max` characters, marking the cut.
fn clip(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", s[..cut].trim_end())),
        None => Cow::Borrowed(s),
    }
}

fn format_elapsed(elapsed: Millis) -> String {
    let secs = elapsed.as_millis() / 1000;
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, _) => format!("{:.1}s", elapsed.as_secs_f64()),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, s) => format!("{}h {}m {}s", h, m, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_marks_long_messages() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("exactly ten", 11), "exactly ten");
        assert_eq!(clip("grade the whole site", 9), "grade the...");
        assert_eq!(clip("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn elapsed_formats() {
        assert_eq!(format_elapsed(Millis::from_millis(1_300)), "1.3s");
        assert_eq!(format_elapsed(Millis::from_millis(61_000)), "1m 1s");
        assert_eq!(format_elapsed(Millis::from_millis(3_723_000)), "1h 2m 3s");
    }
}
