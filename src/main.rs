//! fluxfetch CLI
//!
//! Command-line interface for chunked InfluxDB downloads:
//! - Plan chunks and preview the Flux they produce
//! - Fetch ranges, optionally caching every chunk
//! - Update cached measurements up to now
//! - Read the cache back

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fluxfetch::cache::ChunkCache;
use fluxfetch::chunk::{plan, ChunkSpec};
use fluxfetch::config::{generate_default_config, Config, CredentialPrompt};
use fluxfetch::executor::InfluxClient;
use fluxfetch::fetch::{merge, FetchOptions, IncrementalUpdater, RangeFetcher, ResumeSource};
use fluxfetch::query::{build_query, FilterExtras, FilterSpec};
use fluxfetch::table::ResultSet;
use fluxfetch::time::TimeInput;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fluxfetch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chunked, resumable downloads from InfluxDB")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/fluxfetch/config.toml or ./fluxfetch.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Timezone for chunk boundaries and output, overriding the config
    #[arg(long, global = true)]
    pub timezone: Option<String>,

    /// Chunk unit (day, week, month), overriding the config
    #[arg(short, long, global = true)]
    pub unit: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the chunks a range splits into
    Plan {
        /// Range start (date or datetime)
        start: String,
        /// Range end, inclusive
        end: String,
    },

    /// Print the Flux query for each chunk
    Query {
        /// Measurement name
        measurement: String,
        start: String,
        end: String,
        /// Restrict to a field (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Tag filter in key=value format (repeatable)
        #[arg(short = 'T', long = "tag")]
        tags: Vec<String>,
    },

    /// Fetch a range for one or more measurements
    Fetch {
        /// Measurement names
        #[arg(required = true)]
        measurements: Vec<String>,
        #[arg(short, long)]
        start: String,
        #[arg(short, long)]
        end: String,
        #[arg(long = "field")]
        fields: Vec<String>,
        #[arg(short = 'T', long = "tag")]
        tags: Vec<String>,
        /// Don't write chunks to the cache
        #[arg(long)]
        no_save: bool,
    },

    /// Fetch everything newer than the cache
    Update {
        #[arg(required = true)]
        measurements: Vec<String>,
        /// End of the update (default: now)
        #[arg(short, long)]
        end: Option<String>,
        /// Start for measurements with no cached data (default: from config)
        #[arg(short, long)]
        start: Option<String>,
        #[arg(long = "field")]
        fields: Vec<String>,
        #[arg(short = 'T', long = "tag")]
        tags: Vec<String>,
        /// Resume from the cached rows and print them merged with the new ones
        #[arg(long)]
        merge: bool,
    },

    /// Load cached chunks
    Read {
        /// Only measurements starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Reads missing credentials from the terminal
struct StdinPrompt;

impl CredentialPrompt for StdinPrompt {
    fn prompt(&self, name: &str, secret: bool) -> Option<String> {
        let note = if secret { " (input is visible)" } else { "" };
        eprint!("InfluxDB {}{}: ", name, note);
        std::io::stderr().flush().ok()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(timezone) = &cli.timezone {
        config.fetch.timezone = timezone.clone();
    }
    if let Some(unit) = &cli.unit {
        config.fetch.chunk_unit = unit.parse()?;
    }

    init_logging(&config);

    match cli.command {
        Commands::Plan { start, end } => {
            let zone = config.fetch.zone()?;
            let chunks = plan(&start.into(), &end.into(), config.fetch.chunk_unit, zone)?;
            print_chunks(&chunks, &cli.format)?;
        }

        Commands::Query {
            measurement,
            start,
            end,
            fields,
            tags,
        } => {
            let filter = extras(fields, tags)?.for_measurement(&measurement);
            let queries = chunk_queries(&config, &filter, start.into(), end.into())?;
            for (i, (chunk, query)) in queries.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                println!("// chunk {} {}", i + 1, chunk);
                println!("{}", query);
            }
        }

        Commands::Fetch {
            measurements,
            start,
            end,
            fields,
            tags,
            no_save,
        } => {
            let mut options = config.fetch_options()?;
            if no_save {
                options.save = false;
            }
            let extras = extras(fields, tags)?;
            let fetcher = RangeFetcher::new(client(&config)?);

            let set = fetcher
                .fetch(&measurements, &start.into(), &end.into(), &extras, &options)
                .await?;
            print_result(&set, &cli.format)?;
        }

        Commands::Update {
            measurements,
            end,
            start,
            fields,
            tags,
            merge: merge_cached,
        } => {
            let options = config.fetch_options()?;
            let extras = extras(fields, tags)?;
            let default_start: TimeInput = start
                .unwrap_or_else(|| config.fetch.default_start.clone())
                .into();
            let end: Option<TimeInput> = end.map(Into::into);
            let updater = IncrementalUpdater::new(client(&config)?);

            if merge_cached {
                let prior = cached_rows(&options, &measurements)?;
                let fresh = updater
                    .update(
                        &measurements,
                        ResumeSource::Dataset(&prior),
                        end.as_ref(),
                        &default_start,
                        &extras,
                        &options,
                    )
                    .await?;
                print_result(&merge(prior, fresh), &cli.format)?;
            } else {
                let fresh = updater
                    .update(
                        &measurements,
                        ResumeSource::Cache(&options.output_dir),
                        end.as_ref(),
                        &default_start,
                        &extras,
                        &options,
                    )
                    .await?;
                print_result(&fresh, &cli.format)?;
            }
        }

        Commands::Read { prefix } => {
            let zone = config.fetch.zone()?;
            let cache = ChunkCache::new(config.fetch.cache_path());
            let set = cache.read_all(prefix.as_deref(), zone)?;

            if cli.format == "table" {
                print_summary(&set);
            } else {
                print_result(&set, &cli.format)?;
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            if let Some(path) = output {
                std::fs::write(&path, content)
                    .with_context(|| format!("Failed to write config to {:?}", path))?;
                println!("Config written to {:?}", path);
            } else {
                print!("{}", content);
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so csv/json output stays clean
fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("fluxfetch={}", config.logging.level).into());
    let json = config.logging.format == "json";

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn client(config: &Config) -> anyhow::Result<InfluxClient> {
    let prompt = StdinPrompt;
    let interactive = std::io::stdin().is_terminal();
    let settings = config.influx_settings(interactive.then_some(&prompt as &dyn CredentialPrompt))?;
    tracing::debug!(?settings, "Connecting");
    Ok(InfluxClient::new(settings)?)
}

/// Flux text for every chunk of a range, using the configured bucket
fn chunk_queries(
    config: &Config,
    filter: &FilterSpec,
    start: TimeInput,
    end: TimeInput,
) -> anyhow::Result<Vec<(ChunkSpec, String)>> {
    let options = config.fetch_options()?;
    let chunks = plan(&start, &end, options.unit, options.zone)?;
    Ok(chunks
        .into_iter()
        .map(|chunk| {
            let query = build_query(filter, &chunk, &options.bucket);
            (chunk, query)
        })
        .collect())
}

fn extras(fields: Vec<String>, tags: Vec<String>) -> anyhow::Result<FilterExtras> {
    let mut extras = FilterExtras::new();
    for field in fields {
        extras = extras.field(field);
    }
    for pair in tags {
        extras = match extras.tag_pair(&pair) {
            Some(extras) => extras,
            None => bail!("Invalid tag '{}', expected key=value", pair),
        };
    }
    Ok(extras)
}

/// Cached rows of the given measurements
fn cached_rows(options: &FetchOptions, measurements: &[String]) -> anyhow::Result<ResultSet> {
    let cache = ChunkCache::new(options.output_dir.clone());
    let mut prior = ResultSet::default();
    for entry in cache.entries()? {
        if measurements.contains(&entry.measurement) {
            prior.append(cache.read(&entry, options.zone)?);
        }
    }
    Ok(prior)
}

fn print_chunks(chunks: &[ChunkSpec], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            let items: Vec<serde_json::Value> = chunks
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "local_start": c.local_start.to_rfc3339(),
                        "local_end": c.local_end.to_rfc3339(),
                        "utc_start": c.utc_start,
                        "utc_end": c.utc_end,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        "csv" => {
            let mut out = csv::Writer::from_writer(std::io::stdout().lock());
            out.write_record(["local_start", "local_end", "utc_start", "utc_end"])?;
            for c in chunks {
                out.write_record([
                    c.local_start.to_rfc3339(),
                    c.local_end.to_rfc3339(),
                    c.utc_start.clone(),
                    c.utc_end.clone(),
                ])?;
            }
            out.flush()?;
        }
        _ => {
            if chunks.is_empty() {
                println!("No chunks: start is after end");
                return Ok(());
            }
            println!("{:<4} {:<26} {:<26}", "#", "Start", "End");
            println!("{}", "-".repeat(58));
            for (i, c) in chunks.iter().enumerate() {
                println!(
                    "{:<4} {:<26} {:<26}",
                    i + 1,
                    c.local_start.format("%Y-%m-%d %H:%M:%S %Z"),
                    c.local_end.format("%Y-%m-%d %H:%M:%S %Z")
                );
            }
            println!();
            println!("{} chunk(s)", chunks.len());
        }
    }
    Ok(())
}

fn print_result(set: &ResultSet, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&set.to_json())?),
        "csv" => set.write_csv(std::io::stdout().lock())?,
        _ => print_table(set),
    }
    Ok(())
}

fn print_table(set: &ResultSet) {
    if set.is_empty() {
        println!("No data for the selected range");
        return;
    }

    let columns = set.columns();
    let widths: Vec<usize> = columns
        .iter()
        .map(|c| {
            set.rows()
                .iter()
                .map(|r| r.cell(c).len())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", line(columns.clone()));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * (widths.len() - 1)));
    for row in set.rows() {
        println!("{}", line(columns.iter().map(|c| row.cell(c)).collect()));
    }
    println!();
    println!("{} row(s)", set.len());
}

fn print_summary(set: &ResultSet) {
    if set.is_empty() {
        println!("Cache is empty");
        return;
    }

    println!("{:<24} {:>10}  {:<25} {:<25}", "Measurement", "Rows", "First", "Last");
    println!("{}", "-".repeat(88));
    for measurement in set.measurements() {
        let rows: Vec<_> = set.for_measurement(&measurement).collect();
        let first = rows.iter().map(|r| r.datetime.clone()).min();
        let last = rows.iter().map(|r| r.datetime.clone()).max();
        println!(
            "{:<24} {:>10}  {:<25} {:<25}",
            measurement,
            rows.len(),
            first.map(|d| d.to_rfc3339()).unwrap_or_default(),
            last.map(|d| d.to_rfc3339()).unwrap_or_default()
        );
    }
}
