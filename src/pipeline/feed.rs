// The classifier feed: one multi-line record per finished post.
//
// Line 1 is the scalar feature vector. The next eight lines are the
// per-cycle series, each followed by its first difference: reshare counts,
// likelihoods, estimated views, and views per reshare.

use std::fmt::Write as _;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::monitor::post::MonitoredPost;

/// Follower totals across the author and every known resharer.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowerStats {
    pub total: f64,
    /// total / (resharers + 1)
    pub average: f64,
    pub max: f64,
}

pub fn follower_stats(post: &MonitoredPost) -> FollowerStats {
    let author = f64::from(post.author_followers);
    let mut total = author;
    let mut max = author;
    for user in post.resharers() {
        let followers = f64::from(user.followers_count);
        total += followers;
        if followers > max {
            max = followers;
        }
    }
    FollowerStats {
        total,
        average: total / (post.resharer_count() + 1) as f64,
        max,
    }
}

/// The eight per-cycle rows of a feed record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRows {
    pub counts: Vec<f64>,
    pub count_delta: Vec<f64>,
    pub likelihood: Vec<f64>,
    pub likelihood_delta: Vec<f64>,
    pub views: Vec<f64>,
    pub views_delta: Vec<f64>,
    pub average: Vec<f64>,
    pub average_delta: Vec<f64>,
}

impl HistoryRows {
    fn rows(&self) -> [&[f64]; 8] {
        [
            self.counts.as_slice(),
            self.count_delta.as_slice(),
            self.likelihood.as_slice(),
            self.likelihood_delta.as_slice(),
            self.views.as_slice(),
            self.views_delta.as_slice(),
            self.average.as_slice(),
            self.average_delta.as_slice(),
        ]
    }
}

/// Derive the view estimates and deltas from a post's history.
///
/// The views added in a cycle are count / likelihood rounded down (0 when
/// the likelihood is 0), accumulated into a running total.
pub fn history_rows(post: &MonitoredPost) -> HistoryRows {
    let mut rows = HistoryRows::default();
    let (mut prev_count, mut prev_likelihood, mut prev_views, mut prev_average) =
        (0.0, 0.0, 0.0, 0.0);

    for (&count, &likelihood) in post.reshare_counts().iter().zip(post.likelihoods()) {
        let count = f64::from(count);
        let likelihood = if likelihood.is_infinite() { 0.0 } else { likelihood };

        let added_views = if likelihood > 0.0 {
            (count / likelihood).floor()
        } else {
            0.0
        };
        let views = prev_views + added_views;
        let average = if count == 0.0 { 0.0 } else { views / count };

        rows.counts.push(count);
        rows.count_delta.push(count - prev_count);
        rows.likelihood.push(likelihood);
        rows.likelihood_delta.push(likelihood - prev_likelihood);
        rows.views.push(views);
        rows.views_delta.push(added_views);
        rows.average.push(average);
        rows.average_delta.push(average - prev_average);

        prev_count = count;
        prev_likelihood = likelihood;
        prev_views = views;
        prev_average = average;
    }
    rows
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Render one post's record. Posts that were never reshared report 0
/// clusters whatever the clustering tool said.
pub fn render_record(post: &MonitoredPost) -> String {
    let f = &post.features;
    let stats = follower_stats(post);
    let clusters = if post.last_reshare_count() > 0 {
        post.cluster_count().unwrap_or(0)
    } else {
        0
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
        post.last_reshare_count(),
        clusters,
        post.cascade_depth().unwrap_or(0),
        post.author_followers,
        flag(f.direct),
        flag(f.mention),
        flag(f.exclamation),
        flag(f.hashtag),
        flag(f.negative_emoticon),
        flag(f.positive_emoticon),
        flag(f.question),
        flag(f.url),
        post.sentiment,
        post.topic,
        stats.total,
        stats.average,
        stats.max,
        post.history_len(),
    );

    let history = history_rows(post);
    for row in history.rows() {
        let line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "{line}");
    }
    out
}

/// Write the feed for `posts` to `path`. Returns the number of records.
pub fn write_feed(path: &Path, posts: &[MonitoredPost]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    for post in posts {
        out.write_all(render_record(post).as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), records = posts.len(), "Feed written");
    Ok(posts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::types::{Entities, Status, User};
    use chrono::Utc;

    fn post(author_followers: u32, history: &[(u32, f64)], resharers: &[u32]) -> MonitoredPost {
        let status = Status {
            id: 1,
            text: "Breaking: something happened!".to_string(),
            created_at: Utc::now(),
            lang: Some("en".to_string()),
            reshare_count: 2,
            user: User::new(100, "author", author_followers),
            entities: Entities::default(),
            reshared_status: None,
        };
        let mut post = MonitoredPost::admit(&status, "neg".into(), "Politics".into());
        post.add_resharers(
            resharers
                .iter()
                .enumerate()
                .map(|(i, &f)| User::new(i as u64 + 1, "r", f)),
        );
        for &(count, likelihood) in history {
            post.add_observation(count, likelihood);
        }
        post
    }

    #[test]
    fn test_follower_stats_include_author() {
        let stats = follower_stats(&post(100, &[], &[50, 300, 150]));
        assert_eq!(stats.total, 600.0);
        assert_eq!(stats.average, 150.0);
        assert_eq!(stats.max, 300.0);
    }

    #[test]
    fn test_follower_stats_without_resharers() {
        let stats = follower_stats(&post(80, &[], &[]));
        assert_eq!(stats, FollowerStats { total: 80.0, average: 80.0, max: 80.0 });
    }

    #[test]
    fn test_history_rows() {
        let rows = history_rows(&post(10, &[(2, 0.5), (5, 0.25), (5, 0.0)], &[]));
        assert_eq!(rows.counts, vec![2.0, 5.0, 5.0]);
        assert_eq!(rows.count_delta, vec![2.0, 3.0, 0.0]);
        assert_eq!(rows.likelihood, vec![0.5, 0.25, 0.0]);
        assert_eq!(rows.likelihood_delta, vec![0.5, -0.25, -0.25]);
        assert_eq!(rows.views_delta, vec![4.0, 20.0, 0.0]);
        assert_eq!(rows.views, vec![4.0, 24.0, 24.0]);
        assert_eq!(rows.average, vec![2.0, 4.8, 4.8]);
        assert_eq!(rows.average_delta.len(), 3);
        assert_eq!(rows.average_delta[0], 2.0);
    }

    #[test]
    fn test_zero_count_has_zero_average() {
        let rows = history_rows(&post(10, &[(0, 0.0)], &[]));
        assert_eq!(rows.average, vec![0.0]);
        assert_eq!(rows.views, vec![0.0]);
    }

    #[test]
    fn test_record_layout() {
        let record = render_record(&post(100, &[(2, 0.5), (3, 0.5)], &[50]));
        let lines: Vec<&str> = record.lines().collect();
        assert_eq!(lines.len(), 9);

        let header: Vec<&str> = lines[0].split(' ').collect();
        assert_eq!(header.len(), 18);
        assert_eq!(header[0], "3");
        assert_eq!(header[1], "0");
        assert_eq!(header[3], "100");
        assert_eq!(header[6], "true"); // exclamation
        assert_eq!(header[12], "neg");
        assert_eq!(header[13], "Politics");
        assert_eq!(header[14], "150");
        assert_eq!(header[15], "75");
        assert_eq!(header[16], "100");
        assert_eq!(header[17], "2");

        assert_eq!(lines[1], "2 3");
        assert_eq!(lines[2], "2 1");
    }

    #[test]
    fn test_write_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/feed.txt");
        let posts = vec![post(1, &[(2, 0.1)], &[]), post(2, &[(4, 0.2)], &[])];
        assert_eq!(write_feed(&path, &posts).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 18);
    }
}
