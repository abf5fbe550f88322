//! Error types for the protoscribe library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate,
//! with detailed error variants for different failure modes.
//!
//! All failures are deterministic structural errors, never transient faults:
//! nothing in this crate retries. The [`Error::InFile`] and [`Error::InElement`]
//! wrappers carry enough context (file path, element full name) to locate the
//! offending schema element.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protoscribe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all protoscribe operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// File uses a syntax other than proto3
    #[error("unsupported proto syntax: '{syntax}'")]
    UnsupportedSyntax {
        /// The unsupported syntax string
        syntax: String,
    },

    /// An option field number has no matching entry in the extension registry
    #[error("extension {number} on '{message}' not found in registry")]
    ExtensionNotFound {
        /// Full name of the options message being extended
        message: String,
        /// The unresolved extension field number
        number: u32,
    },

    /// An extension option is not a length-delimited message
    #[error("extension {number} on '{message}' has unsupported wire type {wire_type}")]
    UnsupportedWireType {
        /// Full name of the options message being extended
        message: String,
        /// The extension field number
        number: u32,
        /// The offending wire type
        wire_type: u8,
    },

    /// A descriptor-tree node of a kind this operation does not handle
    #[error("unknown element kind '{kind}' under '{context}'")]
    UnknownElementKind {
        /// Human-readable kind name
        kind: String,
        /// Full name of the enclosing element
        context: String,
    },

    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Invalid field number in wire data
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// Failed to parse a descriptor message
    #[error("failed to parse descriptor: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to build a resolved descriptor pool
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// Failure while processing a specific file
    #[error("in file '{path}': {source}")]
    InFile {
        /// Logical path of the file being processed
        path: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Failure while processing a specific schema element
    #[error("in element '{name}': {source}")]
    InElement {
        /// Full dotted name of the element
        name: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps this error with the logical path of the file being processed
    pub fn in_file(self, path: impl Into<String>) -> Self {
        Self::InFile {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Wraps this error with the full name of the element being processed
    pub fn in_element(self, name: impl Into<String>) -> Self {
        Self::InElement {
            name: name.into(),
            source: Box::new(self),
        }
    }
}
