use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinSet;

use atom2rss::config::Config;
use atom2rss::convert::convert_with_indent;
use atom2rss::feed::export_to_file;
use atom2rss::session::{Completion, Session, SessionState};

#[derive(Parser, Debug)]
#[command(name = "atom2rss", about = "Convert an Atom feed into an RSS 2.0 document")]
struct Args {
    /// URL of the Atom feed. Without it, URLs are read from stdin, one per line.
    url: Option<String>,

    /// Convert a local Atom file instead of fetching a URL
    #[arg(long, value_name = "FILE", conflicts_with = "url")]
    input: Option<PathBuf>,

    /// Save the RSS document; `--save=FILE` picks the path, otherwise the configured output file
    #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
    save: Option<Option<PathBuf>>,

    /// Print only the RSS document, not the source feed
    #[arg(long)]
    no_source: bool,

    /// Config file path (defaults to ~/.config/atom2rss/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn save_path(&self, config: &Config) -> Option<PathBuf> {
        self.save
            .as_ref()
            .map(|p| p.clone().unwrap_or_else(|| config.output_file.clone()))
    }
}

fn print_previews(state: &SessionState, show_source: bool) {
    if show_source {
        println!("=== Feed Preview ===");
        println!("{}", state.source);
        println!();
    }
    println!("=== RSS Preview ===");
    println!("{}", state.rss);
}

fn report_failure(state: &SessionState) {
    eprintln!("Error while loading XML");
    if let Some(error) = &state.error {
        eprintln!("  {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match args.config.clone().or_else(|| Config::default_path().ok()) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    tracing::debug!(?config, "Effective configuration");

    let show_source = !args.no_source;

    if let Some(input) = &args.input {
        let source = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
        let rss = match convert_with_indent(&source, config.indent) {
            Ok(rss) => rss,
            Err(e) => {
                eprintln!("Error while loading XML");
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        };
        let state = SessionState {
            source,
            rss,
            ..SessionState::default()
        };
        print_previews(&state, show_source);
        if let Some(path) = args.save_path(&config) {
            export_to_file(&state.rss, &path).context("Failed to save RSS document")?;
            println!("Saved RSS to: {}", path.display());
        }
        return Ok(());
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("atom2rss/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let session = Arc::new(Session::new());

    match &args.url {
        Some(url) => {
            let state = match session.submit(&client, url, &config).await {
                Some(Completion::Applied(state)) => state,
                Some(Completion::Stale) => session.snapshot(),
                None => anyhow::bail!("Feed URL is empty"),
            };
            if state.error.is_some() {
                if !state.source.is_empty() && show_source {
                    println!("=== Feed Preview ===");
                    println!("{}", state.source);
                }
                report_failure(&state);
                std::process::exit(1);
            }
            print_previews(&state, show_source);
        }
        None => {
            run_interactive(&session, &client, Arc::new(config.clone()), show_source).await?;
        }
    }

    if let Some(path) = args.save_path(&config) {
        let state = session.snapshot();
        if state.rss.is_empty() {
            eprintln!("Nothing to save: no feed was converted");
            std::process::exit(1);
        }
        export_to_file(&state.rss, &path).context("Failed to save RSS document")?;
        println!("Saved RSS to: {}", path.display());
    }

    Ok(())
}

/// Reads URLs from stdin and converts each one concurrently. A result is
/// printed only if it is still the newest when it arrives.
async fn run_interactive(
    session: &Arc<Session>,
    client: &reqwest::Client,
    config: Arc<Config>,
    show_source: bool,
) -> Result<()> {
    eprintln!("Enter Atom feed URLs, one per line (Ctrl+D to finish):");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let session = Arc::clone(session);
        let client = client.clone();
        let config = Arc::clone(&config);

        tasks.spawn(async move {
            let completion = session.submit(&client, &line, &config).await;
            if let Some(Completion::Applied(state)) = completion {
                if state.error.is_some() {
                    report_failure(&state);
                } else {
                    print_previews(&state, show_source);
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Conversion task failed");
        }
    }

    Ok(())
}
