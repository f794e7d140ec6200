// MonitoredPost: one tracked post and its observation history.
//
// The facts captured at admission never change. The three history vectors
// grow by exactly one entry per cycle through add_observation(), which is
// also the only place the inactive-period counter moves.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::social::types::{Status, User};

/// Consecutive unchanged cycles after which a post is retired.
pub const PERIODS_TO_DIE: u32 = 4;

const POSITIVE_EMOTICONS: [&str; 6] = [":-)", ":)", ";)", ";-)", ":D", ":-D"];
const NEGATIVE_EMOTICONS: [&str; 5] = [":(", ":-(", "D:", "D-:", ";_;"];

/// Boolean text features extracted once, at admission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFeatures {
    /// Addressed to someone: has a mention and the text starts with '@'
    pub direct: bool,
    pub mention: bool,
    pub hashtag: bool,
    pub url: bool,
    pub exclamation: bool,
    pub question: bool,
    pub positive_emoticon: bool,
    pub negative_emoticon: bool,
}

impl PostFeatures {
    pub fn extract(status: &Status) -> Self {
        let text = status.text.as_str();
        let mention = !status.entities.user_mentions.is_empty();
        Self {
            direct: mention && text.starts_with('@'),
            mention,
            hashtag: !status.entities.hashtags.is_empty(),
            url: text.contains("http://") || text.contains("https://"),
            exclamation: text.contains('!'),
            question: text.contains('?'),
            positive_emoticon: POSITIVE_EMOTICONS.iter().any(|e| text.contains(e)),
            negative_emoticon: NEGATIVE_EMOTICONS.iter().any(|e| text.contains(e)),
        }
    }
}

/// A post under observation. Identity is the post ID alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredPost {
    pub id: u64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_id: u64,
    pub author_followers: u32,
    pub features: PostFeatures,
    pub sentiment: String,
    pub topic: String,
    pub monitoring_started: DateTime<Utc>,
    reshare_counts: Vec<u32>,
    likelihoods: Vec<f64>,
    combined: Vec<f64>,
    /// Distinct resharers seen across all samples, keyed by user ID
    resharers: BTreeMap<u64, User>,
    inactive_periods: u32,
    #[serde(default)]
    cascade_depth: Option<u32>,
    #[serde(default)]
    cluster_count: Option<i64>,
}

impl MonitoredPost {
    /// Capture a status's immutable facts. The caller takes the first
    /// observation before handing the post to the store.
    pub fn admit(status: &Status, sentiment: String, topic: String) -> Self {
        Self {
            id: status.id,
            text: status.text.clone(),
            created_at: status.created_at,
            author_id: status.user.id,
            author_followers: status.user.followers_count,
            features: PostFeatures::extract(status),
            sentiment,
            topic,
            monitoring_started: Utc::now(),
            reshare_counts: Vec::new(),
            likelihoods: Vec::new(),
            combined: Vec::new(),
            resharers: BTreeMap::new(),
            inactive_periods: 0,
            cascade_depth: None,
            cluster_count: None,
        }
    }

    /// Append one cycle's observation and recompute the inactive counter.
    ///
    /// Non-finite likelihoods are stored as 0 and finite ones are clamped to
    /// [0, 1], so the histories never carry NaN or infinity.
    pub fn add_observation(&mut self, count: u32, likelihood: f64) {
        let likelihood = normalize_likelihood(likelihood);
        let unchanged = self.reshare_counts.last() == Some(&count);

        self.reshare_counts.push(count);
        self.likelihoods.push(likelihood);
        self.combined.push(f64::from(count) * likelihood);

        if unchanged {
            self.inactive_periods += 1;
        } else {
            self.inactive_periods = 0;
        }
    }

    /// Merge newly sampled resharers into the distinct-resharer set.
    pub fn add_resharers(&mut self, users: impl IntoIterator<Item = User>) {
        for user in users {
            self.resharers.insert(user.id, user);
        }
    }

    /// Whether the post has gone quiet long enough to retire.
    pub fn is_exhausted(&self) -> bool {
        self.inactive_periods >= PERIODS_TO_DIE
    }

    pub fn reshare_counts(&self) -> &[u32] {
        &self.reshare_counts
    }

    pub fn likelihoods(&self) -> &[f64] {
        &self.likelihoods
    }

    pub fn combined(&self) -> &[f64] {
        &self.combined
    }

    pub fn history_len(&self) -> usize {
        self.reshare_counts.len()
    }

    /// The latest observed reshare count, or 0 before the first observation.
    pub fn last_reshare_count(&self) -> u32 {
        self.reshare_counts.last().copied().unwrap_or(0)
    }

    pub fn inactive_periods(&self) -> u32 {
        self.inactive_periods
    }

    pub fn resharers(&self) -> impl Iterator<Item = &User> {
        self.resharers.values()
    }

    pub fn resharer_count(&self) -> usize {
        self.resharers.len()
    }

    /// Resharer IDs in ascending order.
    pub fn resharer_ids(&self) -> Vec<u64> {
        self.resharers.keys().copied().collect()
    }

    pub fn cascade_depth(&self) -> Option<u32> {
        self.cascade_depth
    }

    pub(crate) fn set_cascade_depth(&mut self, depth: u32) {
        self.cascade_depth = Some(depth);
    }

    pub fn cluster_count(&self) -> Option<i64> {
        self.cluster_count
    }

    pub(crate) fn set_cluster_count(&mut self, count: i64) {
        self.cluster_count = Some(count);
    }
}

impl PartialEq for MonitoredPost {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MonitoredPost {}

impl Hash for MonitoredPost {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Estimate the chance that one timeline view turns into a reshare.
///
/// The denominator is the sampled resharers' combined follower count, plus
/// the author's followers when the sample covers every reshare of the post.
pub fn reshare_likelihood(status_reshares: u32, author_followers: u32, sampled: &[User]) -> f64 {
    if sampled.is_empty() {
        return 0.0;
    }
    let mut views: f64 = sampled.iter().map(|u| f64::from(u.followers_count)).sum();
    if status_reshares as usize == sampled.len() {
        views += f64::from(author_followers);
    }
    normalize_likelihood(sampled.len() as f64 / views)
}

fn normalize_likelihood(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
