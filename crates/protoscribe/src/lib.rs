//! # protoscribe
//!
//! A library bridging compiled Protocol Buffer descriptors and canonical
//! `.proto` source text.
//!
//! This crate provides the core functionality for:
//! - Recovering every option on a schema element, including custom option
//!   extensions that survive only as unrecognized wire bytes
//! - Re-emitting a resolved descriptor set as source-faithful proto3 text,
//!   with original ordering, comments, and option layout
//! - Building descriptors programmatically through a mutable element tree
//!   that synthesizes consistent source locations
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`source`]: Resolved descriptor set handling
//! - [`print`]: Source-faithful `.proto` printing
//! - [`options`]: Option reflection and simplification
//! - [`location`]: Source location trees keyed by descriptor paths
//! - [`element`]: Programmatic descriptor building
//! - [`wire`]: Protobuf wire format parsing
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protoscribe::{MemorySink, PrintOptions, PrintSource, Printer};
//! use std::fs;
//!
//! // A FileDescriptorSet produced by a proto compiler front end.
//! let data = fs::read("./descriptors.binpb")?;
//!
//! let source = PrintSource::from_bytes(data.into())?;
//! let options = PrintOptions::default();
//! let mut sink = MemorySink::new();
//! Printer::new(&source, &options).print_files(&mut sink)?;
//!
//! for (path, text) in sink.files() {
//!     println!("// {}\n{}", path, String::from_utf8_lossy(text));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! The [`FileSink`] trait decides where printed files land; [`MemorySink`]
//! and [`DirSink`] cover the common cases. Option simplification depth is
//! a per-extension policy through [`SimplifyPolicy`].

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod element;
pub mod error;
pub mod location;
pub mod options;
pub mod print;
pub mod source;
pub mod wire;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export primary types for convenience
pub use element::{ElementId, ElementPayload, ElementTree};
pub use error::{Error, Result};
pub use options::{OptionDefinition, OptionValue, SimplifyPolicy};
pub use print::{DirSink, FileSink, MemorySink, PrintOptions, Printer};
pub use source::PrintSource;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
/// Used for `reserved X to max` ranges
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
