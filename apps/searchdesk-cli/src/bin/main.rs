use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use searchdesk_client::{
    share_link, HttpBackend, IdentityResolver, PipelineOptions, QueryPipeline, StreamingChannel, SubmitOutcome,
};
use searchdesk_core::config::{expand_path, Config, Settings};
use searchdesk_core::identity::CookieJar;
use searchdesk_core::traits::{Clipboard, CopyNotifier, LoadingIndicator, ResultRenderer, UsernamePrompt};
use searchdesk_core::types::KeywordMode;
use searchdesk_core::visibility::{Exporter, PlainTextRenderer};
use searchdesk_core::{AppState, SearchKind};

#[derive(Parser)]
#[command(name = "searchdesk", version, about = "Query a searchdesk backend from the terminal")]
struct Cli {
    /// Directory holding config.toml and config.<env>.toml
    #[arg(long, env = "SEARCHDESK_CONFIG_DIR", default_value = ".", global = true)]
    config_dir: String,

    /// Cookie header used to find the tracking token (`s_vi=...; s_fid=...`)
    #[arg(long, env = "SEARCHDESK_COOKIE", default_value = "", global = true)]
    cookie: String,

    /// Search only these asset types instead of the feed defaults
    #[arg(long = "asset-type", global = true)]
    asset_types: Vec<String>,

    /// Print the flattened export text instead of the result listing
    #[arg(long, global = true)]
    export: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List asset types grouped as the backend reports them
    AssetTypes,
    /// Search the selected asset types and print the results
    Search {
        query: String,
        #[command(flatten)]
        options: SearchOptions,
    },
    /// Stream a generated answer together with its sources
    Generate {
        query: String,
        #[arg(short)]
        k: Option<u32>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Show the username linked to the tracking token
    Whoami,
    /// Link a username to the tracking token
    Associate { username: String },
    /// Run a search, then vote on one of its results
    Vote {
        bucket: usize,
        result: usize,
        #[arg(allow_hyphen_values = true)]
        value: i32,
        query: String,
        #[command(flatten)]
        options: SearchOptions,
    },
    /// Print a shareable link for a query
    Link {
        query: String,
        #[arg(short)]
        k: Option<u32>,
        #[arg(long, default_value = "http://localhost:3000/")]
        base: String,
    },
}

#[derive(clap::Args)]
struct SearchOptions {
    /// Keyword search instead of semantic
    #[arg(long)]
    keyword: bool,
    #[arg(long)]
    field: Option<String>,
    #[arg(long)]
    mode: Option<KeywordMode>,
    #[arg(short)]
    k: Option<u32>,
}

/// Spinner on stderr while a backend call is running.
#[derive(Default)]
struct Spinner {
    bar: Mutex<Option<ProgressBar>>,
}

impl LoadingIndicator for Spinner {
    fn show(&self) {
        let Ok(mut slot) = self.bar.lock() else { return };
        if slot.is_some() {
            return;
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style);
        }
        bar.set_message("searching...");
        bar.enable_steady_tick(Duration::from_millis(100));
        *slot = Some(bar);
    }

    fn hide(&self) {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut slot| slot.take()) {
            bar.finish_and_clear();
        }
    }
}

struct HintPrompt;

impl UsernamePrompt for HintPrompt {
    fn prompt_for_username(&self) {
        eprintln!("No username is linked to this visitor. Run `searchdesk associate <username>` to set one.");
    }
}

/// The terminal has no clipboard; the exported text goes to stdout.
struct StdoutClipboard;

impl Clipboard for StdoutClipboard {
    fn copy(&mut self, text: &str) -> anyhow::Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }
}

struct StderrNotifier;

impl CopyNotifier for StderrNotifier {
    fn confirm_copied(&self, duration: Duration) {
        debug!(ms = duration.as_millis() as u64, "copy confirmation");
        eprintln!("Copied!");
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn print_results(state: &mut AppState, settings: &Settings, export: bool) -> anyhow::Result<()> {
    if export {
        let mut exporter = Exporter::new(PlainTextRenderer, StdoutClipboard, StderrNotifier, settings.export.options());
        exporter.export_all(&mut state.results)?;
        return Ok(());
    }
    if state.results.is_empty() {
        println!("No results.");
    }
    for (i, bucket) in state.results.iter().enumerate() {
        println!("[{i}] {}\n", PlainTextRenderer.render_bucket(bucket));
    }
    Ok(())
}

fn report(outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::EmptyQuery => eprintln!("Nothing to search for."),
        SubmitOutcome::NoAssetTypes => eprintln!("No asset types selected."),
        SubmitOutcome::Failed => eprintln!("The request failed; see the log for details."),
        SubmitOutcome::Completed => {}
    }
}

fn apply_search_options(state: &mut AppState, settings: &Settings, query: String, options: SearchOptions) {
    let kind = if options.keyword || options.field.is_some() || options.mode.is_some() {
        SearchKind::Keyword
    } else {
        SearchKind::Semantic
    };
    let mut input = settings.search.query_input(query, kind);
    if let Some(k) = options.k {
        input.limit = k;
    }
    if let Some(field) = options.field {
        input.keyword.field = field;
    }
    if let Some(mode) = options.mode {
        input.keyword.mode = mode;
    }
    state.input = input;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_dir = expand_path(&cli.config_dir);
    let config = Config::load_from(&config_dir, None)?;
    let settings = config.settings()?;
    info!(env = config.env_name(), backend = %settings.backend.base_url, "configuration loaded");

    let backend = Arc::new(HttpBackend::from_settings(&settings.backend)?);
    let indicator: Arc<dyn LoadingIndicator> = Arc::new(Spinner::default());
    let pipeline = QueryPipeline::new(Arc::clone(&backend), indicator, PipelineOptions::from_settings(&settings.search));
    let resolver = IdentityResolver::new(Arc::clone(&backend), settings.identity.clone());
    let cookies = CookieJar::parse(&cli.cookie);

    let mut state = AppState::default();
    match cli.command {
        Command::AssetTypes => {
            pipeline.load_asset_types(&mut state).await?;
            for group in state.registry.grouped_view() {
                println!("{} ({})", group.group, group.group_sort_order);
                for member in group.members {
                    let mark = if member.display { "x" } else { " " };
                    println!("  [{mark}] {} - {}", member.name, member.display_title);
                }
            }
        }
        Command::Search { query, options } => {
            pipeline.load_asset_types(&mut state).await?;
            state.registry = state.registry.with_selection(cli.asset_types.as_slice());
            state.identity = resolver.resolve(&cookies, &HintPrompt).await;
            apply_search_options(&mut state, &settings, query, options);
            let outcome = pipeline.submit(&mut state).await;
            pipeline.flush().await;
            report(outcome);
            print_results(&mut state, &settings, cli.export)?;
        }
        Command::Generate { query, k, model } => {
            pipeline.load_asset_types(&mut state).await?;
            state.registry = state.registry.with_selection(cli.asset_types.as_slice());
            state.identity = resolver.resolve(&cookies, &HintPrompt).await;
            let mut input = settings.search.query_input(query, SearchKind::Semantic);
            if let Some(k) = k {
                input.limit = k;
            }
            state.input = input;

            let mut options = PipelineOptions::from_settings(&settings.search);
            if let Some(model) = model {
                options.model_name = model;
            }
            let indicator: Arc<dyn LoadingIndicator> = Arc::new(Spinner::default());
            let pipeline = QueryPipeline::new(Arc::clone(&backend), indicator, options);
            let mut channel = StreamingChannel::new();
            let mut printed = 0usize;
            let outcome = pipeline
                .submit_generation(&mut state, &mut channel, |s| {
                    if s.generation.is_finalized() {
                        return;
                    }
                    if let Some(fresh) = s.generation.as_str().get(printed..) {
                        print!("{fresh}");
                        let _ = std::io::stdout().flush();
                        printed = s.generation.as_str().len();
                    }
                })
                .await;
            channel.close();
            pipeline.flush().await;
            match state.generation.as_str().get(printed..) {
                Some(rest) if printed > 0 => println!("{rest}\n"),
                _ => println!("{}\n", state.generation.as_str()),
            }
            report(outcome);
            print_results(&mut state, &settings, cli.export)?;
        }
        Command::Whoami => {
            let identity = resolver.resolve(&cookies, &HintPrompt).await;
            if identity.is_resolved() {
                println!("{} (token from {})", identity.username, identity.token_source);
            }
        }
        Command::Associate { username } => {
            let mut identity = resolver.resolve(&cookies, &HintPrompt).await;
            resolver.associate(&mut identity, &username).await?;
            if identity.has_token() {
                println!("Linked {} to the {} token", identity.username, identity.token_source);
            } else {
                println!("No tracking token; using {} for this session only", identity.username);
            }
        }
        Command::Vote { bucket, result, value, query, options } => {
            pipeline.load_asset_types(&mut state).await?;
            state.registry = state.registry.with_selection(cli.asset_types.as_slice());
            state.identity = resolver.resolve(&cookies, &HintPrompt).await;
            apply_search_options(&mut state, &settings, query, options);
            report(pipeline.submit(&mut state).await);
            let voted = pipeline.vote(&state, bucket, result, value).await;
            pipeline.flush().await;
            voted?;
            println!("Vote recorded.");
        }
        Command::Link { query, k, base } => {
            pipeline.load_asset_types(&mut state).await?;
            state.registry = state.registry.with_selection(cli.asset_types.as_slice());
            state.input = settings.search.query_input(query, SearchKind::Semantic);
            if let Some(k) = k {
                state.input.limit = k;
            }
            println!("{}", share_link(&base, &state)?);
        }
    }
    Ok(())
}
