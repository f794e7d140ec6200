// Output formatting: terminal display and the plain-text store dump.

pub mod terminal;

use std::fmt::Write;

use crate::monitor::post::MonitoredPost;
use crate::monitor::store::MonitorStore;

/// Separator between the active and dead partitions in a text dump.
pub const DEAD_SEPARATOR: &str = "===========DEAD===========";

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Unlike byte slicing (`&text[..120]`), this respects UTF-8 character boundaries
/// and will never panic on multi-byte characters like emoji or accented letters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render one post's full state as a human-readable block.
pub fn render_post(post: &MonitoredPost) -> String {
    let f = &post.features;
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "id: {}", post.id);
    let _ = writeln!(out, "text: {}", post.text.replace('\n', " "));
    let _ = writeln!(out, "created: {}", post.created_at.to_rfc3339());
    let _ = writeln!(
        out,
        "author: {} ({} followers)",
        post.author_id, post.author_followers
    );
    let _ = writeln!(
        out,
        "features: direct={} mention={} hashtag={} url={} exclamation={} question={} pos_emoticon={} neg_emoticon={}",
        f.direct,
        f.mention,
        f.hashtag,
        f.url,
        f.exclamation,
        f.question,
        f.positive_emoticon,
        f.negative_emoticon
    );
    let _ = writeln!(out, "sentiment: {}  topic: {}", post.sentiment, post.topic);
    let _ = writeln!(out, "monitoring since: {}", post.monitoring_started.to_rfc3339());
    let _ = writeln!(out, "reshares: {}", join(post.reshare_counts()));
    let _ = writeln!(out, "likelihood: {}", join(post.likelihoods()));
    let _ = writeln!(out, "combined: {}", join(post.combined()));
    let _ = writeln!(out, "resharers: {}", post.resharer_count());
    let _ = writeln!(out, "inactive periods: {}", post.inactive_periods());
    let _ = writeln!(
        out,
        "cascade depth: {}",
        post.cascade_depth()
            .map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    let _ = writeln!(
        out,
        "clusters: {}",
        post.cluster_count()
            .map_or_else(|| "-".to_string(), |c| c.to_string())
    );
    out
}

/// Render the whole store: active posts, the separator, then dead posts.
pub fn render_store(store: &MonitorStore) -> String {
    let mut out = String::new();
    for post in store.active() {
        out.push_str(&render_post(post));
        out.push('\n');
    }
    out.push_str(DEAD_SEPARATOR);
    out.push_str("\n\n");
    for post in store.dead() {
        out.push_str(&render_post(post));
        out.push('\n');
    }
    out
}
