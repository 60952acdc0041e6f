mod config;
mod db;
mod enrich;
mod fetch;
mod model;
mod pipeline;
mod transcript;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};

use config::{ReportConfig, Rules};

#[derive(Parser)]
#[command(name = "rapport", about = "Chat transcript to intervention report pipeline")]
struct Cli {
    /// Config file (timezone, markers, exclusion list, clients)
    #[arg(short, long, default_value = "rapport.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the configured clients in the local store
    Init,
    /// Download transcript exports for unfetched clients
    Fetch {
        /// Max clients to fetch (default: all unfetched)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Run the pipeline over stored transcripts
    Process {
        /// Max transcripts to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Only keep messages on or after this day (reference timezone)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Only keep messages on or before this day (reference timezone)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Fetch + process in one pipeline
    Run {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show store statistics
    Stats,
    /// Interventions overview table
    Overview {
        /// Filter by client
        #[arg(long)]
        client: Option<String>,
        /// Filter by author name (substring)
        #[arg(short, long)]
        author: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
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
        Commands::Init => {
            let config = ReportConfig::load(&cli.config)?;
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let clients: Vec<(String, String)> = config
                .clients
                .iter()
                .map(|(name, url)| (name.clone(), url.clone()))
                .collect();
            let inserted = db::upsert_clients(&conn, &clients)?;
            println!("Registered {} new clients ({} configured)", inserted, clients.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let clients = db::fetch_unfetched(&conn, limit)?;
            if clients.is_empty() {
                println!("No unfetched clients. Run 'init' first or all transcripts are fetched.");
                return Ok(());
            }
            println!("Fetching {} transcripts...", clients.len());
            let stats = fetch::fetch_transcripts(&conn, clients).await?;
            println!("Done: {} fetched ({} ok, {} errors).", stats.total, stats.ok, stats.errors);
            Ok(())
        }
        Commands::Process { limit, from, to } => {
            let rules = load_rules(&cli)?;
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let transcripts = db::fetch_unprocessed(&conn, limit)?;
            if transcripts.is_empty() {
                println!("No unprocessed transcripts. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} transcripts...", transcripts.len());
            let counts = process_transcripts(&conn, &rules, &transcripts, range(&rules, from, to))?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let rules = load_rules(&cli)?;
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let clients = db::fetch_unfetched(&conn, limit)?;
            if clients.is_empty() {
                println!("No unfetched clients. Run 'init' first.");
                return Ok(());
            }

            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} transcripts...", clients.len());
            let stats = fetch::fetch_transcripts(&conn, clients).await?;
            println!(
                "Fetched {} transcripts ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetches failed).");
                return Ok(());
            }
            println!("Processing {} transcripts...", unprocessed.len());
            let counts = process_transcripts(&conn, &rules, &unprocessed, None)?;
            counts.print();
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Clients:       {}", s.clients);
            println!("Fetched:       {}", s.fetched);
            println!("Unfetched:     {}", s.unfetched);
            println!("Transcripts:   {}", s.transcripts);
            println!("Errors:        {}", s.errors);
            println!("Interventions: {}", s.interventions);
            println!("Team members:  {}", s.team_members);
            Ok(())
        }
        Commands::Overview { client, author, limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_overview(&conn, client.as_deref(), author.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No interventions found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<16} | {:<20} | {:<10} | {:<3} | {:<16} | {:>4} | {:<3}",
                "#", "Client", "Author", "Date", "Src", "Category", "Imgs", "B/A"
            );
            println!("{}", "-".repeat(95));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<16} | {:<20} | {:<10} | {:<3} | {:<16} | {:>4} | {:<3}",
                    i + 1,
                    truncate(&r.client, 16),
                    truncate(&r.author_name, 20),
                    r.display_date,
                    &r.date_source[..3.min(r.date_source.len())],
                    truncate(&r.category, 16),
                    r.image_count,
                    if r.has_before_after { "yes" } else { "" },
                );
            }
            println!("\n{} interventions", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

fn load_rules(cli: &Cli) -> Result<Rules> {
    let config = if cli.config.exists() {
        ReportConfig::load(&cli.config)?
    } else {
        ReportConfig::default()
    };
    config.rules().context("compiling configured patterns")
}

/// Convert an optional [from, to] day pair into an inclusive UTC window in
/// the reference timezone.
fn range(
    rules: &Rules,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let local = |date: NaiveDate, h: u32, m: u32, s: u32| -> DateTime<Utc> {
        date.and_hms_opt(h, m, s)
            .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
            .and_local_timezone(rules.timezone)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    };
    match (from, to) {
        (None, None) => None,
        (f, t) => Some((
            f.map(|d| local(d, 0, 0, 0)).unwrap_or(DateTime::<Utc>::MIN_UTC),
            t.map(|d| local(d, 23, 59, 59)).unwrap_or(DateTime::<Utc>::MAX_UTC),
        )),
    }
}

struct ProcessCounts {
    transcripts: usize,
    interventions: usize,
    images: usize,
    team_members: usize,
    parse_errors: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} interventions ({} images) and {} team members from {} transcripts ({} parse errors).",
            self.interventions, self.images, self.team_members, self.transcripts, self.parse_errors,
        );
    }
}

fn process_transcripts(
    conn: &rusqlite::Connection,
    rules: &Rules,
    transcripts: &[db::StoredTranscript],
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(transcripts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let mut counts = ProcessCounts {
        transcripts: transcripts.len(),
        interventions: 0,
        images: 0,
        team_members: 0,
        parse_errors: 0,
    };

    for chunk in transcripts.chunks(100) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|t| {
                let messages = transcript::parse_export(&t.raw_json)?;
                let messages = match window {
                    Some((from, to)) => transcript::filter_by_range(messages, from, to),
                    None => messages,
                };
                let mut out = pipeline::process(&messages, rules);
                enrich::enrich_all(&mut out.interventions, &enrich::Passthrough);
                Ok::<_, anyhow::Error>((t.id, t.client.clone(), out))
            })
            .collect();

        for result in results {
            match result {
                Ok((id, client, out)) => {
                    counts.interventions += out.interventions.len();
                    counts.images += out.interventions.iter().map(|i| i.images.len()).sum::<usize>();
                    counts.team_members += out.team.len();
                    db::save_processed(conn, id, &client, &out.interventions, &out.team)?;
                }
                Err(e) => {
                    counts.parse_errors += 1;
                    tracing::warn!("skipping transcript: {e}");
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}
