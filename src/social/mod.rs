// Social network access: the capability trait, its HTTP client, and the
// quota and recovery logic wrapped around every remote call.
//
// Each submodule handles one concern: `quota` decides which credential pool
// pays for a call and `session` owns the reconnect path. The acquisition
// loops (`followers`, `resharers`, `stream`) are built on top of them.

pub mod client;
pub mod error;
pub mod followers;
pub mod http;
pub mod quota;
pub mod resharers;
pub mod session;
pub mod stream;
pub mod types;
