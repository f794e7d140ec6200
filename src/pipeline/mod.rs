// Run phases: the monitoring cycles, then the two per-post graph passes
// over the dead partition, then the classifier feed.

pub mod clusters;
pub mod diffusion;
pub mod edges;
pub mod feed;
pub mod ingest;
