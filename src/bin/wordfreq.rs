use std::{collections::HashSet, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use word_count_mr::{
    mr::{Concurrency, Coordinator, FailurePolicy, MapReduceConfig},
    report,
    source::{load_text, FileSource, StdinSource, TextSource},
};

/// Count word frequencies of a text with a parallel map -> shuffle -> reduce pipeline
#[derive(Parser, Debug)]
#[command(name = "wordfreq")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Text file to read, standard input when omitted
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Only count these words (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    words: Option<Vec<String>>,

    /// Workers for both phases: a positive number or `unbounded`
    #[arg(short, long, default_value = "unbounded")]
    concurrency: Concurrency,

    /// Map workers, overrides --concurrency
    #[arg(long)]
    mappers: Option<Concurrency>,

    /// Reduce workers, overrides --concurrency
    #[arg(long)]
    reducers: Option<Concurrency>,

    /// Fail on the first failed task instead of reporting partial counts
    #[arg(long)]
    strict: bool,

    /// Treat `The` and `the` as the same word
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// How many of the most frequent words to show
    #[arg(short = 'n', long, default_value_t = 10)]
    top: usize,

    /// Print every count as JSON instead of a chart
    #[arg(long)]
    json: bool,

    /// Give up after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> MapReduceConfig {
        let policy = if self.strict {
            FailurePolicy::Strict
        } else {
            FailurePolicy::BestEffort
        };
        MapReduceConfig::new()
            .with_concurrency(self.concurrency)
            .with_mappers(self.mappers.unwrap_or(self.concurrency))
            .with_reducers(self.reducers.unwrap_or(self.concurrency))
            .with_failure_policy(policy)
            .with_case_fold(self.ignore_case)
    }

    fn source(&self) -> Box<dyn TextSource> {
        match &self.input {
            Some(path) => Box::new(FileSource::new(path)),
            None => Box::new(StdinSource),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_names(cli.verbose >= 2)
        .init();

    debug!("[Configuration] {:?}", cli);

    let text = load_text(cli.source().as_ref()).await?;
    let allowed: Option<HashSet<String>> = cli.words.clone().map(|w| w.into_iter().collect());

    let coordinator = Coordinator::new(cli.config());
    let freq = match cli.timeout_ms {
        Some(ms) => {
            coordinator
                .run_with_timeout(text, allowed, Duration::from_millis(ms))
                .await?
        }
        None => coordinator.run(&text, allowed.as_ref())?,
    };

    for failure in &freq.failures {
        warn!("[Result] Dropped: {}", failure);
    }

    if cli.json {
        println!("{}", report::to_json(&freq).context("failed to encode counts as JSON")?);
    } else {
        let ranked = report::top_n(&freq.counts, cli.top);
        print!("{}", report::render_bars(&ranked, 40));
        if !freq.is_complete() {
            println!(
                "(partial result, {} task(s) failed)",
                freq.failures.len()
            );
        }
    }

    Ok(())
}
