// Colored terminal output for cycle summaries and run status.
//
// This module handles all terminal-specific formatting. The pipeline and
// main.rs display functions delegate here.

use colored::Colorize;

use crate::checkpoint::{Phase, RunState};
use crate::monitor::post::MonitoredPost;
use crate::monitor::store::MonitorStore;
use crate::pipeline::ingest::CycleReport;

/// One line per cycle, plus a warning line when admission hit capacity.
pub fn display_cycle(report: &CycleReport, max_cycles: u64, store: &MonitorStore) {
    println!(
        "  {} {:>2}/{}  active {:>4}  dead {:>5}  +{} admitted  {} observed  {} retired  {} gone  {} queued",
        "Cycle".bold(),
        report.cycle,
        max_cycles,
        store.active_len(),
        store.dead_len(),
        report.admission.admitted.to_string().green(),
        report.refresh.observed,
        report.refresh.retired.to_string().yellow(),
        report.refresh.vanished.to_string().red(),
        report.sampled,
    );
    if report.admission.over_capacity > 0 {
        println!(
            "    {} {} qualifying posts skipped, active set is full",
            "~".yellow(),
            report.admission.over_capacity
        );
    }
}

/// Display the state of a checkpointed run.
pub fn display_status(state: Option<&RunState>, location: &str) {
    let Some(state) = state else {
        println!("Checkpoint: none at {location}");
        println!("\nRun `ripple monitor` (or `ripple run`) to start monitoring.");
        return;
    };

    println!("Checkpoint: {location}");
    println!("Phase: {}", colorize_phase(state.phase));
    match state.phase {
        Phase::Monitoring => println!("Cycles completed: {}", state.progress),
        Phase::ClusterGraphs | Phase::Diffusion => println!(
            "Posts processed: {}/{}",
            state.progress,
            state.store.dead_len()
        ),
        Phase::Complete => {}
    }
    println!(
        "Posts: {} active, {} dead, {} sampled awaiting admission",
        state.store.active_len(),
        state.store.dead_len(),
        state.pending_sample.len()
    );

    let mut top: Vec<&MonitoredPost> = state
        .store
        .active()
        .iter()
        .chain(state.store.dead())
        .collect();
    if top.is_empty() {
        return;
    }
    top.sort_by_key(|p| std::cmp::Reverse(p.last_reshare_count()));
    display_post_table(&top[..top.len().min(10)]);
}

/// Display a table of posts with their latest observation.
pub fn display_post_table(posts: &[&MonitoredPost]) {
    println!(
        "\n{}",
        format!("=== Most reshared ({} posts) ===", posts.len()).bold()
    );
    println!();
    println!(
        "  {:>20}  {:>8}  {:>6}  {:>5}  {:<22}  {}",
        "Post".dimmed(),
        "Reshares".dimmed(),
        "Cycles".dimmed(),
        "Depth".dimmed(),
        "Topic".dimmed(),
        "Text".dimmed(),
    );
    println!("  {}", "-".repeat(100).dimmed());

    for post in posts {
        let depth = post
            .cascade_depth()
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        let preview = super::truncate_chars(&post.text.replace('\n', " "), 40);
        println!(
            "  {:>20}  {:>8}  {:>6}  {:>5}  {:<22}  {}",
            post.id,
            post.last_reshare_count(),
            post.history_len(),
            depth,
            post.topic,
            preview.dimmed(),
        );
    }
    println!();
}

/// Colorize a phase name.
fn colorize_phase(phase: Phase) -> colored::ColoredString {
    match phase {
        Phase::Monitoring => phase.as_str().yellow(),
        Phase::ClusterGraphs | Phase::Diffusion => phase.as_str().bright_blue(),
        Phase::Complete => phase.as_str().green().bold(),
    }
}
