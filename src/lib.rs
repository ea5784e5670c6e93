//! ytaudio gateway: a chat bot front end that turns video links into MP3
//! replies, gated by an admin approval list.
//!
//! Library crate used by the `ytaudio` binary and the integration tests in `tests/`.

pub mod approval;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod media;
pub mod models;
pub mod notification;
pub mod pipeline;
pub mod server;
pub mod transcode;
pub mod transport;
