//! Preprocessor Core Library
//!
//! This crate provides the core functionality of the tick-data preprocessor:
//! - Built-in defaults and flat JSON config documents
//! - Four-tier configuration merge with provenance
//! - Non-default config persistence, locally or to a remote endpoint
//! - Pluggable transformation strategies
//! - CSV table I/O and run orchestration
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌────────────┐
//! │  Defaults  │──▶│   Merge    │──▶│   Plugin   │──▶│  Persist   │
//! │ + sources  │   │ (4 tiers)  │   │  process   │   │ (non-dflt) │
//! └────────────┘   └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use preprocessor_core::{Defaults, Invocation, pipeline};
//!
//! let file_config = pipeline::source_file_config(&invocation)?;
//! let session = pipeline::prepare(Defaults::builtin(), file_config, &invocation)?;
//! let report = pipeline::run(&session)?;
//! pipeline::persist(&session, &report)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod merge;
pub mod persistence;
pub mod pipeline;
pub mod plugins;
pub mod remote;
pub mod stats;
pub mod table;

pub use config::{ConfigDocument, Defaults};
pub use error::{Error, Result};
pub use merge::{ConfigOrigin, EffectiveConfig, FlagSpec, Invocation, TokenSplit};
pub use pipeline::{Session, prepare, persist, run};
pub use plugins::Plugin;
pub use table::Table;
