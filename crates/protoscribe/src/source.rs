//! Resolved descriptor set handle.
//!
//! Printing needs the same descriptor set in three forms at once: the
//! typed `prost-types` structs to walk, a `prost-reflect` pool to resolve
//! type and extension names, and the original encoded bytes to recover
//! custom option extensions the typed structs drop. [`PrintSource`] binds
//! all three, plus the extension registry scanned from the set.

use bytes::Bytes;
use prost::Message;
use prost_reflect::DescriptorPool;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::options::ExtensionRegistry;
use crate::wire;

// FileDescriptorSet.file
const SET_FILE: u32 = 1;

/// A fully resolved descriptor set ready for printing.
///
/// The set must contain every transitive dependency; an external compiler
/// front end produces it, this crate never parses `.proto` text.
#[derive(Debug)]
pub struct PrintSource {
    set_bytes: Bytes,
    set: FileDescriptorSet,
    pool: DescriptorPool,
    registry: ExtensionRegistry,
    source_files: Option<Vec<String>>,
}

impl PrintSource {
    /// Build from the encoded bytes of a `FileDescriptorSet`.
    pub fn from_bytes(set_bytes: Bytes) -> Result<PrintSource> {
        let set = FileDescriptorSet::decode(set_bytes.clone())?;
        let pool = DescriptorPool::decode(set_bytes.clone())
            .map_err(|err| Error::descriptor_build(err.to_string()))?;
        let registry = ExtensionRegistry::from_set(&pool, &set);
        debug!(
            files = set.file.len(),
            extensions = registry.len(),
            "loaded descriptor set"
        );
        Ok(PrintSource {
            set_bytes,
            set,
            pool,
            registry,
            source_files: None,
        })
    }

    /// Build from an in-memory `FileDescriptorSet`, re-encoding it so raw
    /// option bytes stay available.
    pub fn from_set(set: &FileDescriptorSet) -> Result<PrintSource> {
        PrintSource::from_bytes(Bytes::from(set.encode_to_vec()))
    }

    /// Mark which file paths are primary sources. Files outside this list
    /// are treated as dependencies and skipped when printing. Without it,
    /// every file in the set counts as a source.
    pub fn with_source_files(mut self, files: Vec<String>) -> PrintSource {
        self.source_files = Some(files);
        self
    }

    /// The typed descriptor set.
    pub fn set(&self) -> &FileDescriptorSet {
        &self.set
    }

    /// The reflection pool over the whole set.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Extensions declared anywhere in the set.
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// True when the named file counts as a primary source.
    pub fn is_source_file(&self, name: &str) -> bool {
        match &self.source_files {
            Some(files) => files.iter().any(|f| f == name),
            None => true,
        }
    }

    /// The files of the set with their set indexes, in set order.
    pub fn files(&self) -> impl Iterator<Item = (usize, &FileDescriptorProto)> {
        self.set.file.iter().enumerate()
    }

    /// The original encoded bytes of the file at a set index.
    ///
    /// These bytes still carry the custom option extensions that decoding
    /// into typed structs discards.
    pub fn raw_file_bytes(&self, index: usize) -> Result<&[u8]> {
        wire::nth_len_field(&self.set_bytes, SET_FILE, index)?.ok_or_else(|| {
            Error::internal(format!("descriptor set has no file at index {}", index))
        })
    }
}
