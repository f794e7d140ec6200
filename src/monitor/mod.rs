// Post monitoring: the tracked-post model, the active/dead store, and the
// per-cycle admission and refresh logic.

pub mod post;
pub mod store;
pub mod tracker;
