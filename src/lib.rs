//! Email triage: classify an email as productive or not and draft a reply.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod reply;
pub mod server;
pub mod worker;
