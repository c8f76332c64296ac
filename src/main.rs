mod dataset;
mod driver;
mod facilities;
mod markets;
mod transform;
mod unlock;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::dataset::DatasetStore;
use crate::driver::ChromeDriver;

#[derive(Parser)]
#[command(
    name = "dc_scraper",
    about = "Datacenter facility directory scraper via headless Chrome"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reshape a raw scraped dump into the normalized dataset schema
    Transform {
        /// Raw dump to read
        #[arg(short, long, default_value = "facilities_progress.json")]
        input: PathBuf,
        /// Normalized dataset to write (input is never mutated)
        #[arg(short, long, default_value = "facilities_progress_transformed.json")]
        output: PathBuf,
    },
    /// Scrape facility listings for every pending market (checkpoints after each)
    Markets {
        /// Dataset file, updated in place
        #[arg(short, long, default_value = "facilities_progress_transformed.json")]
        data: PathBuf,
    },
    /// Visit every facility page and enrich records with scraped fields
    Facilities {
        /// Dataset file to read
        #[arg(short, long, default_value = "facilities_progress_transformed.json")]
        data: PathBuf,
        /// Enriched dataset to write (single write at the end)
        #[arg(short, long, default_value = "facilities_progress_final.json")]
        output: PathBuf,
        /// Per-element wait in ms before a field is treated as absent
        #[arg(long, default_value = "50")]
        wait_ms: u64,
    },
    /// Markets + facilities in one pipeline
    Run {
        /// Dataset file, updated in place by the market phase
        #[arg(short, long, default_value = "facilities_progress_transformed.json")]
        data: PathBuf,
        /// Enriched dataset to write
        #[arg(short, long, default_value = "facilities_progress_final.json")]
        output: PathBuf,
        /// Per-element wait in ms before a field is treated as absent
        #[arg(long, default_value = "50")]
        wait_ms: u64,
    },
    /// Show dataset progress statistics
    Stats {
        /// Dataset file to read
        #[arg(short, long, default_value = "facilities_progress_transformed.json")]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Transform { input, output } => {
            let raw = dataset::load_raw(&input)?;
            let data = transform::transform(&raw);
            DatasetStore::new(&output).save(&data)?;
            println!(
                "Transformed {} markets ({} facilities) into {}",
                data.markets.len(),
                data.facility_count(),
                output.display()
            );
            Ok(())
        }
        Commands::Markets { data: path } => {
            let store = DatasetStore::new(&path);
            let mut data = store.load()?;
            let pending = data.pending_markets();
            if pending == 0 {
                println!(
                    "No pending markets ({} already completed). Nothing to scrape.",
                    data.markets.len()
                );
                return Ok(());
            }
            println!(
                "Scraping {} pending markets (checkpointing after each)...",
                pending
            );
            let driver = ChromeDriver::launch().await?;
            let outcome = markets::process_markets(&driver, &mut data, &store).await;
            close_driver(driver).await;
            let scraped = outcome?;
            println!("Done: {} markets scraped.", scraped);
            Ok(())
        }
        Commands::Facilities {
            data: path,
            output,
            wait_ms,
        } => {
            let store = DatasetStore::new(&path);
            let mut data = store.load()?;
            let total = data.facility_count();
            if total == 0 {
                println!("No facilities in {}. Run 'markets' first.", path.display());
                return Ok(());
            }
            println!("Enriching {} facilities...", total);
            let driver = ChromeDriver::launch().await?;
            let outcome =
                facilities::enrich_all(&driver, &mut data, Duration::from_millis(wait_ms)).await;
            close_driver(driver).await;
            let stats = outcome?;
            DatasetStore::new(&output).save(&data)?;
            println!(
                "Done: {} enriched, {} skipped (no URL). Saved to {}",
                stats.enriched,
                stats.skipped,
                output.display()
            );
            Ok(())
        }
        Commands::Run {
            data: path,
            output,
            wait_ms,
        } => {
            let store = DatasetStore::new(&path);
            let mut data = store.load()?;
            let driver = ChromeDriver::launch().await?;

            // Phase 1: markets (checkpointing to the data file)
            let t_markets = Instant::now();
            let pending = data.pending_markets();
            if pending == 0 {
                println!("No pending markets; skipping market phase.");
            } else {
                println!("Pipeline: scraping {} pending markets...", pending);
                match markets::process_markets(&driver, &mut data, &store).await {
                    Ok(scraped) => println!(
                        "Scraped {} markets in {:.1}s",
                        scraped,
                        t_markets.elapsed().as_secs_f64()
                    ),
                    Err(e) => {
                        close_driver(driver).await;
                        return Err(e);
                    }
                }
            }

            // Phase 2: facilities
            let t_enrich = Instant::now();
            let total = data.facility_count();
            if total == 0 {
                println!("Nothing to enrich (no facilities collected).");
                close_driver(driver).await;
                return Ok(());
            }
            println!("Enriching {} facilities...", total);
            let outcome =
                facilities::enrich_all(&driver, &mut data, Duration::from_millis(wait_ms)).await;
            close_driver(driver).await;
            let stats = outcome?;
            DatasetStore::new(&output).save(&data)?;
            println!(
                "Enriched {} facilities ({} skipped) in {:.1}s. Saved to {}",
                stats.enriched,
                stats.skipped,
                t_enrich.elapsed().as_secs_f64(),
                output.display()
            );
            Ok(())
        }
        Commands::Stats { data: path } => {
            let data = DatasetStore::new(&path).load()?;
            let s = data.stats();
            println!(
                "Markets:    {} ({} completed, {} pending)",
                s.markets,
                s.completed_markets,
                s.markets - s.completed_markets
            );
            println!(
                "Facilities: {} ({} with table info)",
                s.facilities, s.with_table_info
            );

            if !data.markets.is_empty() {
                println!();
                println!(
                    "{:>3} | {:<24} | {:<9} | {:>10} | {:>9}",
                    "#", "Market", "Status", "Facilities", "With info"
                );
                println!("{}", "-".repeat(68));
                for (i, market) in data.markets.values().enumerate() {
                    let with_info = market
                        .facilities
                        .values()
                        .filter(|f| !f.table_info.is_empty())
                        .count();
                    println!(
                        "{:>3} | {:<24} | {:<9} | {:>10} | {:>9}",
                        i + 1,
                        truncate(&market.name, 24),
                        if market.completed { "done" } else { "pending" },
                        market.facilities.len(),
                        with_info
                    );
                }
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

/// A failed browser shutdown should not eat the stage's own result.
async fn close_driver(driver: ChromeDriver) {
    if let Err(e) = driver.close().await {
        warn!("Browser shutdown failed: {:#}", e);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
