use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::social::http::{DEFAULT_API_URL, DEFAULT_STREAM_URL};

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// REST API root (defaults to the public v1.1 endpoint)
    pub api_url: String,
    /// Line-delimited JSON sample stream
    pub stream_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// User-context bearer token
    pub user_token: String,
    /// Where checkpoints, edge lists and the feed file are written
    pub state_dir: PathBuf,
    pub sentiment_model: Option<PathBuf>,
    pub topic_model: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Nothing is validated here; commands call the `require_*` checks for
    /// whatever they actually need.
    pub fn load() -> Result<Self> {
        let state_dir = env::var("RIPPLE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_state_dir());

        Ok(Self {
            api_url: env::var("RIPPLE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            stream_url: env::var("RIPPLE_STREAM_URL")
                .unwrap_or_else(|_| DEFAULT_STREAM_URL.to_string()),
            consumer_key: env::var("RIPPLE_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: env::var("RIPPLE_CONSUMER_SECRET").unwrap_or_default(),
            user_token: env::var("RIPPLE_USER_TOKEN").unwrap_or_default(),
            state_dir,
            sentiment_model: env::var("RIPPLE_SENTIMENT_MODEL").ok().map(PathBuf::from),
            topic_model: env::var("RIPPLE_TOPIC_MODEL").ok().map(PathBuf::from),
        })
    }

    /// Check that both credential pools can be authenticated.
    /// Call this before any command that talks to the network.
    pub fn require_credentials(&self) -> Result<()> {
        if self.user_token.is_empty() {
            anyhow::bail!(
                "RIPPLE_USER_TOKEN not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        if self.consumer_key.is_empty() || self.consumer_secret.is_empty() {
            anyhow::bail!(
                "RIPPLE_CONSUMER_KEY / RIPPLE_CONSUMER_SECRET not set. The application\n\
                 credential pool needs both. See .env.example for details."
            );
        }
        Ok(())
    }

    /// Check that both classifier models are configured and present.
    /// Admission labels every post, so monitoring cannot start without them.
    pub fn require_classifiers(&self) -> Result<()> {
        for (var, path) in [
            ("RIPPLE_SENTIMENT_MODEL", &self.sentiment_model),
            ("RIPPLE_TOPIC_MODEL", &self.topic_model),
        ] {
            match path {
                None => anyhow::bail!(
                    "{var} not set. Point it at a lexicon JSON file in your .env file."
                ),
                Some(path) if !path.exists() => anyhow::bail!(
                    "Classifier model not found: {} (from {var})",
                    path.display()
                ),
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    pub fn cascades_dir(&self) -> PathBuf {
        self.state_dir.join("cascades")
    }

    pub fn clusters_dir(&self) -> PathBuf {
        self.state_dir.join("clusters")
    }

    pub fn feed_path(&self) -> PathBuf {
        self.state_dir.join("feed.txt")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ripple")
}

/// How newly qualifying posts are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Admit only while fewer than this many posts are active
    Capacity(usize),
    /// Admit every qualifying post
    Unbounded,
}

impl AdmissionPolicy {
    pub fn has_room(&self, active: usize) -> bool {
        match self {
            AdmissionPolicy::Capacity(max) => active < *max,
            AdmissionPolicy::Unbounded => true,
        }
    }
}

/// Monitoring tunables. Defaults match the remote service's 15-minute
/// windows; the CLI can override most of them.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Cycles to run before monitoring stops
    pub max_cycles: u32,
    /// Posts collected from the stream per cycle (None = until the window ends)
    pub sample_size: Option<usize>,
    /// Minimum reshare count for admission
    pub min_reshares: u32,
    pub admission: AdmissionPolicy,
    /// Replace a failed stream listener instead of aborting the cycle
    pub restart_on_stream_error: bool,
    pub max_stream_restarts: u32,
    /// Admit the originals behind sampled reshares instead of dropping them
    pub expand_reshares: bool,
    /// Cycle length; each cycle sleeps out whatever is left of it
    pub cycle_window: Duration,
    pub poll_interval: Duration,
    /// Pause after stopping the stream listener
    pub stream_settle: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_cycles: 40,
            sample_size: Some(1000),
            min_reshares: 2,
            admission: AdmissionPolicy::Capacity(150),
            restart_on_stream_error: true,
            max_stream_restarts: 20,
            expand_reshares: false,
            cycle_window: crate::social::quota::DEFAULT_WINDOW,
            poll_interval: Duration::from_secs(1),
            stream_settle: Duration::from_secs(2),
        }
    }
}
