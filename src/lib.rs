#![warn(rust_2018_idioms)]
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_possible_truncation, // Frame lengths are bounded by MaxMessageSize
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. ListenerError in listener module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod domain;
pub mod listener;
pub mod parser;
pub mod peer;
pub mod pipeline;
pub mod sink;

pub use app::{App, ServiceConfig};
pub use domain::{FieldValue, IngestError, LogEntry, PeerIdentity};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
