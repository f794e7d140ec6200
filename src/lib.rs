// Ripple: reshare-cascade monitor
//
// This is the library root. Each module corresponds to a major subsystem:
// remote access and quota scheduling (social), tracked-post state (monitor),
// the run phases (pipeline), and durable progress (checkpoint).

pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod monitor;
pub mod output;
pub mod pipeline;
pub mod social;
