// Checkpointing: durable snapshots of the store and phase progress.
//
// checkpoint.json is the resumable state. It is written to a temp file and
// renamed into place, so a crash mid-write leaves the previous snapshot
// intact. checkpoint.txt is a plain-text dump of every post, rewritten
// alongside it for humans.
//
// The JSON carries a schema version. A snapshot from another version, or
// one that does not parse, is refused rather than half-loaded.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::monitor::post::MonitoredPost;
use crate::monitor::store::MonitorStore;

/// Current checkpoint schema. Bump on any incompatible change.
pub const SCHEMA_VERSION: u32 = 1;

const STATE_FILE: &str = "checkpoint.json";
const DUMP_FILE: &str = "checkpoint.txt";

/// Which part of the run the checkpoint belongs to. Phases run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Monitoring,
    ClusterGraphs,
    Diffusion,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Monitoring => "monitoring",
            Phase::ClusterGraphs => "cluster_graphs",
            Phase::Diffusion => "diffusion",
            Phase::Complete => "complete",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to resume a run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub phase: Phase,
    /// Completed cycles while monitoring; processed dead posts afterwards
    pub progress: u64,
    pub store: MonitorStore,
    /// Post IDs sampled in the last cycle, awaiting admission
    pub pending_sample: Vec<u64>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Monitoring,
            progress: 0,
            store: MonitorStore::new(),
            pending_sample: Vec::new(),
        }
    }

    /// Move to the next phase with its progress counter at zero.
    pub fn advance(&mut self, phase: Phase) {
        self.phase = phase;
        self.progress = 0;
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

// Serialized form. Writing borrows the store; reading owns it.

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema_version: u32,
    phase: Phase,
    progress: u64,
    saved_at: DateTime<Utc>,
    active: &'a [MonitoredPost],
    dead: &'a [MonitoredPost],
    pending_sample: &'a [u64],
}

#[derive(Deserialize)]
struct Snapshot {
    phase: Phase,
    progress: u64,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
    active: Vec<MonitoredPost>,
    dead: Vec<MonitoredPost>,
    #[serde(default)]
    pending_sample: Vec<u64>,
}

#[derive(Deserialize)]
struct SchemaHeader {
    schema_version: u32,
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn dump_path(&self) -> PathBuf {
        self.dir.join(DUMP_FILE)
    }

    /// Load the last snapshot, or None if no run has been checkpointed yet.
    pub fn load(&self) -> Result<Option<RunState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
        decode(&raw)
            .with_context(|| format!("Malformed checkpoint {}", path.display()))
            .map(Some)
    }

    /// Write the snapshot and its text dump. Any failure here is fatal to
    /// the caller: continuing would risk losing monitoring state.
    pub fn save(&self, state: &RunState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))?;

        let json = encode(state)?;
        write_atomic(&self.state_path(), json.as_bytes())?;

        let dump = crate::output::render_store(&state.store);
        write_atomic(&self.dump_path(), dump.as_bytes())?;

        debug!(
            phase = %state.phase,
            progress = state.progress,
            active = state.store.active_len(),
            dead = state.store.dead_len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove any saved state so the next run starts fresh.
    pub fn clear(&self) -> Result<()> {
        for path in [self.state_path(), self.dump_path()] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        info!(dir = %self.dir.display(), "Checkpoint cleared");
        Ok(())
    }
}

fn encode(state: &RunState) -> Result<String> {
    let snapshot = SnapshotRef {
        schema_version: SCHEMA_VERSION,
        phase: state.phase,
        progress: state.progress,
        saved_at: Utc::now(),
        active: state.store.active(),
        dead: state.store.dead(),
        pending_sample: &state.pending_sample,
    };
    serde_json::to_string_pretty(&snapshot).context("Failed to serialize checkpoint")
}

fn decode(raw: &str) -> Result<RunState> {
    let header: SchemaHeader =
        serde_json::from_str(raw).context("Checkpoint has no readable schema_version")?;
    if header.schema_version != SCHEMA_VERSION {
        anyhow::bail!(
            "Checkpoint schema version {} is not supported (expected {})",
            header.schema_version,
            SCHEMA_VERSION
        );
    }
    let snapshot: Snapshot = serde_json::from_str(raw).context("Failed to parse checkpoint")?;
    Ok(RunState {
        phase: snapshot.phase,
        progress: snapshot.progress,
        store: MonitorStore::from_parts(snapshot.active, snapshot.dead),
        pending_sample: snapshot.pending_sample,
    })
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
