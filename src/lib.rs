//! recon-worker library
//!
//! Worker processes that wrap external reconnaissance tools (port
//! scanner, HTTP prober, crawler, screenshot tool, cloud-resource
//! exporter, URL de-duplicator) behind one supervised request/response
//! protocol:
//! - Envelope types and length-prefixed framing for the supervisor channel
//! - A lifecycle loop (ready signal, sequential request handling, signal
//!   and disconnect handling)
//! - Bounded external-command execution and per-request file staging
//! - One worker implementation per tool, translating its output format

pub mod config;
pub mod error;
pub mod exec;
pub mod runtime;
pub mod staging;
pub mod transport;
pub mod workers;
