use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use ripple::checkpoint::{CheckpointManager, Phase, RunState};
use ripple::classify::lexicon::LexiconClassifier;
use ripple::classify::traits::Classifier;
use ripple::config::{AdmissionPolicy, Config, MonitorSettings};
use ripple::monitor::tracker::{AdmissionRules, TweetMonitor};
use ripple::pipeline::{clusters, diffusion, feed, ingest::IngestionPipeline};
use ripple::social::http::HttpSocialClient;
use ripple::social::quota::QuotaScheduler;
use ripple::social::session::{RecoveryPolicy, Session};

/// Ripple: reshare-cascade monitor.
///
/// Samples the live stream, follows the posts that start getting reshared
/// until they go quiet, then measures how far each reshare wave travelled
/// through the follower graph.
#[derive(Parser)]
#[command(name = "ripple", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the stream and monitor qualifying posts (resumes from the checkpoint)
    Monitor {
        #[command(flatten)]
        options: MonitorOptions,
    },

    /// Write resharer-follower graphs for the external clustering tool
    Clusters,

    /// Compute cascade depths for every finished post
    Diffuse,

    /// Write the classifier feed from the finished run
    Feed,

    /// Show checkpoint status (phase, progress, most reshared posts)
    Status,

    /// Run monitoring, graph export and diffusion in order. The feed is a
    /// separate step once the clustering tool has processed the graphs.
    Run {
        #[command(flatten)]
        options: MonitorOptions,
    },
}

#[derive(Args)]
struct MonitorOptions {
    /// Monitoring cycles to run (default: 40)
    #[arg(long, default_value = "40")]
    cycles: u32,

    /// Posts to sample per cycle, 0 to stream until the window ends (default: 1000)
    #[arg(long, default_value = "1000")]
    sample_size: usize,

    /// Minimum reshare count for admission (default: 2)
    #[arg(long, default_value = "2")]
    min_reshares: u32,

    /// Maximum active posts, 0 for no limit (default: 150)
    #[arg(long, default_value = "150")]
    capacity: usize,

    /// Monitor the originals behind sampled reshares instead of dropping them
    #[arg(long)]
    expand_reshares: bool,

    /// Abort the sample on a stream error instead of restarting the listener
    #[arg(long)]
    no_stream_restart: bool,

    /// Discard any existing checkpoint and start over
    #[arg(long)]
    fresh: bool,
}

impl MonitorOptions {
    fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            max_cycles: self.cycles,
            sample_size: (self.sample_size > 0).then_some(self.sample_size),
            min_reshares: self.min_reshares,
            admission: if self.capacity > 0 {
                AdmissionPolicy::Capacity(self.capacity)
            } else {
                AdmissionPolicy::Unbounded
            },
            restart_on_stream_error: !self.no_stream_restart,
            expand_reshares: self.expand_reshares,
            ..MonitorSettings::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ripple=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let checkpoints = CheckpointManager::new(config.checkpoint_dir());

    match cli.command {
        Commands::Monitor { options } => {
            let mut state = resume(&checkpoints, options.fresh)?;
            let session = connect(&config)?;
            monitor(&config, session, &checkpoints, &mut state, options.settings()).await?;
        }

        Commands::Clusters => {
            let mut state = require_state(&checkpoints)?;
            let session = connect(&config)?;
            cluster_graphs(&config, &session, &checkpoints, &mut state).await?;
        }

        Commands::Diffuse => {
            let mut state = require_state(&checkpoints)?;
            let session = connect(&config)?;
            diffuse(&config, &session, &checkpoints, &mut state).await?;
        }

        Commands::Feed => {
            let mut state = require_state(&checkpoints)?;
            write_feed(&config, &checkpoints, &mut state)?;
        }

        Commands::Status => {
            let state = checkpoints.load()?;
            let location = checkpoints.state_path().display().to_string();
            ripple::output::terminal::display_status(state.as_ref(), &location);
        }

        Commands::Run { options } => {
            let mut state = resume(&checkpoints, options.fresh)?;
            let session = connect(&config)?;
            monitor(&config, session.clone(), &checkpoints, &mut state, options.settings()).await?;
            cluster_graphs(&config, &session, &checkpoints, &mut state).await?;
            diffuse(&config, &session, &checkpoints, &mut state).await?;
            println!(
                "\nNext: run the clustering tool on {}, then `ripple feed`.",
                config.clusters_dir().display()
            );
        }
    }

    Ok(())
}

/// Load the checkpoint, or start a new run.
fn resume(checkpoints: &CheckpointManager, fresh: bool) -> Result<RunState> {
    if fresh {
        checkpoints.clear()?;
    }
    match checkpoints.load()? {
        Some(state) => {
            println!(
                "Resuming from checkpoint ({}, progress {})",
                state.phase, state.progress
            );
            Ok(state)
        }
        None => Ok(RunState::new()),
    }
}

fn require_state(checkpoints: &CheckpointManager) -> Result<RunState> {
    checkpoints.load()?.with_context(|| {
        format!(
            "No checkpoint at {}. Run `ripple monitor` first.",
            checkpoints.state_path().display()
        )
    })
}

/// Build the HTTP client and wrap it in a session with the default quota plan.
fn connect(config: &Config) -> Result<Arc<Session>> {
    config.require_credentials()?;
    let client = HttpSocialClient::new(config)?;
    Ok(Arc::new(Session::new(
        Arc::new(client),
        QuotaScheduler::default(),
        RecoveryPolicy::default(),
    )))
}

/// Load both classifiers. A missing or broken model is fatal.
fn load_classifiers(config: &Config) -> Result<(Arc<dyn Classifier>, Arc<dyn Classifier>)> {
    config.require_classifiers()?;
    let (Some(sentiment_path), Some(topic_path)) = (&config.sentiment_model, &config.topic_model)
    else {
        anyhow::bail!("Classifier models are not configured");
    };
    let sentiment = LexiconClassifier::load(sentiment_path).context("Loading sentiment model")?;
    let topic = LexiconClassifier::load(topic_path).context("Loading topic model")?;
    Ok((Arc::new(sentiment), Arc::new(topic)))
}

async fn monitor(
    config: &Config,
    session: Arc<Session>,
    checkpoints: &CheckpointManager,
    state: &mut RunState,
    settings: MonitorSettings,
) -> Result<()> {
    if state.phase > Phase::Monitoring {
        println!("Monitoring already finished ({} posts).", state.store.dead_len());
        return Ok(());
    }

    let (sentiment, topic) = load_classifiers(config)?;
    let rules = AdmissionRules {
        min_reshares: settings.min_reshares,
        policy: settings.admission,
    };
    let monitor = TweetMonitor::new(session, sentiment, topic, rules);

    println!(
        "Monitoring for {} cycles (state in {})...",
        settings.max_cycles,
        config.state_dir.display()
    );
    let mut pipeline = IngestionPipeline::new(monitor, checkpoints.clone(), settings);
    pipeline.run(state).await?;

    state.advance(Phase::ClusterGraphs);
    checkpoints.save(state)?;

    println!("\n{}", "Monitoring complete.".bold());
    println!("  Posts monitored: {}", state.store.dead_len());
    Ok(())
}

async fn cluster_graphs(
    config: &Config,
    session: &Session,
    checkpoints: &CheckpointManager,
    state: &mut RunState,
) -> Result<()> {
    match state.phase {
        Phase::Monitoring => anyhow::bail!("Monitoring has not finished. Run `ripple monitor` first."),
        Phase::ClusterGraphs => {}
        _ => {
            println!("Follower graphs already written.");
            return Ok(());
        }
    }

    println!("Writing follower graphs for {} posts...", state.store.dead_len());
    let dir = config.clusters_dir();
    clusters::run_phase(session, state, checkpoints, &dir).await?;

    state.advance(Phase::Diffusion);
    checkpoints.save(state)?;
    println!(
        "  Graphs written to {}. Run the clustering tool on them before `ripple feed`.",
        dir.display()
    );
    Ok(())
}

async fn diffuse(
    config: &Config,
    session: &Session,
    checkpoints: &CheckpointManager,
    state: &mut RunState,
) -> Result<()> {
    match state.phase {
        Phase::Monitoring | Phase::ClusterGraphs => {
            anyhow::bail!("Earlier phases are unfinished ({}). Run them first.", state.phase)
        }
        Phase::Diffusion => {}
        Phase::Complete => {
            println!("Cascade depths already computed.");
            return Ok(());
        }
    }

    println!("Computing cascade depths for {} posts...", state.store.dead_len());
    diffusion::run_phase(session, state, checkpoints, &config.cascades_dir()).await?;

    state.advance(Phase::Complete);
    checkpoints.save(state)?;

    let deepest = state
        .store
        .dead()
        .iter()
        .filter_map(|p| p.cascade_depth())
        .max()
        .unwrap_or(0);
    println!("\n{}", "Diffusion complete.".bold());
    println!("  Deepest cascade: {deepest} generations");
    Ok(())
}

fn write_feed(config: &Config, checkpoints: &CheckpointManager, state: &mut RunState) -> Result<()> {
    if state.phase != Phase::Complete {
        anyhow::bail!(
            "The run is still in the {} phase. Finish it before writing the feed.",
            state.phase
        );
    }

    let clusters_dir = config.clusters_dir();
    let summary = clusters::collect_cluster_counts(state, &clusters_dir);
    checkpoints.save(state)?;
    info!(
        found = summary.found,
        missing = summary.missing,
        unreadable = summary.unreadable,
        "Cluster counts collected"
    );
    if summary.missing > 0 {
        println!(
            "{} {} reshared posts have no clustering output in {} (written as -1).",
            "Warning:".yellow().bold(),
            summary.missing,
            clusters_dir.display()
        );
    }

    let path = config.feed_path();
    let records = feed::write_feed(&path, state.store.dead())?;
    println!("Feed written: {} ({records} posts)", path.display());
    Ok(())
}
