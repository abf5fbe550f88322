//! Source-faithful `.proto` printing.
//!
//! Each file of a resolved set is re-emitted as proto3 source text,
//! ordered by original source position where `SourceCodeInfo` is present
//! and by declaration order otherwise, with comments and option layout
//! reconstructed from the same metadata. Output for a file is buffered in
//! full and only handed to the sink once the whole file printed cleanly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::location::{path, ElementKind, LocationEntry, LocationTree};
use crate::options::{OptionContext, SimplifyPolicy, TypedOptions};
use crate::source::PrintSource;
use crate::wire;

mod elements;

/// Where printed files go, keyed by their logical proto path.
pub trait FileSink {
    /// Store one complete printed file.
    fn put_file(&mut self, proto_path: &str, data: &[u8]) -> Result<()>;
}

/// In-memory sink, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// The collected files, sorted by path.
    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    /// One file's text, if it was written.
    pub fn text(&self, proto_path: &str) -> Option<&str> {
        self.files
            .get(proto_path)
            .and_then(|data| std::str::from_utf8(data).ok())
    }
}

impl FileSink for MemorySink {
    fn put_file(&mut self, proto_path: &str, data: &[u8]) -> Result<()> {
        self.files.insert(proto_path.to_string(), data.to_vec());
        Ok(())
    }
}

/// Sink writing files under a root directory, creating parents as needed.
#[derive(Debug)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    /// Write under the given root.
    pub fn new(root: impl Into<PathBuf>) -> DirSink {
        DirSink { root: root.into() }
    }
}

impl FileSink for DirSink {
    fn put_file(&mut self, proto_path: &str, data: &[u8]) -> Result<()> {
        let relative = Path::new(proto_path);
        let escapes = relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        });
        if escapes {
            return Err(Error::PathTraversal {
                path: proto_path.into(),
            });
        }
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, data).map_err(|source| Error::FileWrite {
            path: target.clone(),
            source,
        })
    }
}

/// Output selection and formatting policy for one print run.
#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    /// Explicit allow-list of file paths; `None` prints every source file
    pub only_files: Option<Vec<String>>,
    /// Files subtracted from the selection
    pub ignore_files: Vec<String>,
    /// When set, only files whose package starts with one of these
    pub package_prefixes: Option<Vec<String>>,
    /// Option simplification policy
    pub simplify: SimplifyPolicy,
}

impl PrintOptions {
    fn selects(&self, name: &str, package: &str) -> bool {
        if let Some(only) = &self.only_files {
            if !only.iter().any(|f| f == name) {
                return false;
            }
        }
        if self.ignore_files.iter().any(|f| f == name) {
            return false;
        }
        if let Some(prefixes) = &self.package_prefixes {
            if !prefixes.iter().any(|p| package.starts_with(p.as_str())) {
                return false;
            }
        }
        true
    }
}

/// Prints the source files of a resolved set.
pub struct Printer<'a> {
    source: &'a PrintSource,
    options: &'a PrintOptions,
}

impl<'a> Printer<'a> {
    /// A printer over a resolved set.
    pub fn new(source: &'a PrintSource, options: &'a PrintOptions) -> Printer<'a> {
        Printer { source, options }
    }

    /// Print every selected file into the sink.
    ///
    /// A file that is not proto3 is skipped with a warning rather than
    /// aborting the remaining files; any other failure stops the run.
    pub fn print_files(&self, sink: &mut dyn FileSink) -> Result<()> {
        for (index, file) in self.source.files() {
            let name = file.name();
            if !self.source.is_source_file(name) {
                continue;
            }
            if !self.options.selects(name, file.package()) {
                continue;
            }
            match self.print_file(index) {
                Ok(text) => {
                    debug!(file = name, bytes = text.len(), "printed file");
                    sink.put_file(name, text.as_bytes())?;
                }
                Err(Error::UnsupportedSyntax { syntax }) => {
                    warn!(file = name, syntax, "skipping non-proto3 file");
                }
                Err(err) => return Err(err.in_file(name)),
            }
        }
        Ok(())
    }

    /// Print a single file of the set by its set index.
    pub fn print_file(&self, index: usize) -> Result<String> {
        let file = self
            .source
            .set()
            .file
            .get(index)
            .ok_or_else(|| Error::internal(format!("no file at index {}", index)))?;
        if file.syntax() != "proto3" {
            return Err(Error::UnsupportedSyntax {
                syntax: file.syntax().to_string(),
            });
        }

        let raw = self.source.raw_file_bytes(index)?;
        let tree = match &file.source_code_info {
            Some(info) => LocationTree::build(info),
            None => LocationTree::new(),
        };
        let ctx = FileContext {
            source: self.source,
            file,
            raw,
            tree,
            policy: &self.options.simplify,
        };
        ctx.print()
    }
}

pub(crate) struct FileContext<'a> {
    pub(crate) source: &'a PrintSource,
    pub(crate) file: &'a prost_types::FileDescriptorProto,
    pub(crate) raw: &'a [u8],
    pub(crate) tree: LocationTree,
    pub(crate) policy: &'a SimplifyPolicy,
}

impl FileContext<'_> {
    pub(crate) fn option_ctx(&self) -> OptionContext<'_> {
        OptionContext {
            registry: self.source.registry(),
            tree: &self.tree,
            policy: self.policy,
        }
    }

    fn print(&self) -> Result<String> {
        let mut buf = PrintBuffer::new();
        self.print_header(&mut buf)?;
        elements::print_file_body(self, &mut buf)?;
        Ok(buf.finish())
    }

    fn print_header(&self, buf: &mut PrintBuffer) -> Result<()> {
        let root = self.tree.root();
        let syntax_entry = self
            .tree
            .single_child(root, path::FILE_SYNTAX)
            .and_then(|node| self.tree.entry(node));
        print_leading_comments(buf, syntax_entry);
        buf.p("syntax = \"proto3\";");

        if !self.file.package().is_empty() {
            buf.gap();
            buf.p(&format!("package {};", self.file.package()));
        }

        if !self.file.dependency.is_empty() {
            buf.gap();
            for (index, dependency) in self.file.dependency.iter().enumerate() {
                let index = index as i32;
                let modifier = if self.file.public_dependency.contains(&index) {
                    "public "
                } else if self.file.weak_dependency.contains(&index) {
                    "weak "
                } else {
                    ""
                };
                buf.p(&format!("import {}\"{}\";", modifier, dependency));
            }
        }

        let raw_options = wire::concat_len_fields(self.raw, path::FILE_OPTIONS as u32)?;
        let file_options = crate::options::options_for(
            &self.option_ctx(),
            Some(root),
            ElementKind::File,
            None,
            TypedOptions::File(self.file.options.as_ref()),
            &raw_options,
        )?;
        if !file_options.is_empty() {
            buf.gap();
            for option in &file_options {
                elements::print_option_statement(buf, option);
            }
        }
        Ok(())
    }
}

/// Indented line buffer with deferred blank lines.
///
/// A gap becomes a blank line only when another line follows it, so the
/// output never ends in stray blank lines.
pub(crate) struct PrintBuffer {
    out: String,
    depth: usize,
    pending_gap: bool,
}

impl PrintBuffer {
    pub(crate) fn new() -> PrintBuffer {
        PrintBuffer {
            out: String::new(),
            depth: 0,
            pending_gap: false,
        }
    }

    pub(crate) fn p(&mut self, line: &str) {
        if self.pending_gap && !self.out.is_empty() {
            self.out.push('\n');
        }
        self.pending_gap = false;
        if !line.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str("  ");
            }
            self.out.push_str(line);
        }
        self.out.push('\n');
    }

    pub(crate) fn gap(&mut self) {
        self.pending_gap = true;
    }

    pub(crate) fn indent(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn outdent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Split a comment block into `//` lines, preserving the conventional
/// leading space protoc keeps in comment text.
pub(crate) fn comment_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines
        .into_iter()
        .map(|line| format!("//{}", line).trim_end().to_string())
        .collect()
}

/// Detached comment blocks, then the leading comment, above an element.
pub(crate) fn print_leading_comments(buf: &mut PrintBuffer, entry: Option<&LocationEntry>) {
    let Some(entry) = entry else {
        return;
    };
    for block in &entry.leading_detached_comments {
        for line in comment_lines(block) {
            buf.p(&line);
        }
        buf.gap();
    }
    if let Some(leading) = &entry.leading_comments {
        for line in comment_lines(leading) {
            buf.p(&line);
        }
    }
}

/// A trailing comment of exactly one line becomes an inline ` //` suffix.
pub(crate) fn inline_trailing_comment(entry: Option<&LocationEntry>) -> Option<String> {
    let trailing = entry?.trailing_comments.as_ref()?;
    match comment_lines(trailing).as_slice() {
        [single] => Some(format!(" {}", single)),
        _ => None,
    }
}

/// A multi-line trailing comment renders as standalone lines after the
/// element, followed by a forced gap.
pub(crate) fn print_trailing_block(buf: &mut PrintBuffer, entry: Option<&LocationEntry>) {
    let Some(trailing) = entry.and_then(|e| e.trailing_comments.as_ref()) else {
        return;
    };
    let lines = comment_lines(trailing);
    if lines.len() < 2 {
        return;
    }
    for line in lines {
        buf.p(&line);
    }
    buf.gap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_defers_gaps() {
        let mut buf = PrintBuffer::new();
        buf.gap();
        buf.p("first");
        buf.gap();
        buf.gap();
        buf.p("second");
        buf.gap();
        assert_eq!(buf.finish(), "first\n\nsecond\n");
    }

    #[test]
    fn test_buffer_indents() {
        let mut buf = PrintBuffer::new();
        buf.p("message Foo {");
        buf.indent();
        buf.p("string name = 1;");
        buf.outdent();
        buf.p("}");
        assert_eq!(buf.finish(), "message Foo {\n  string name = 1;\n}\n");
    }

    #[test]
    fn test_comment_lines() {
        assert_eq!(comment_lines(" one line\n"), vec!["// one line"]);
        assert_eq!(
            comment_lines(" first\n second\n"),
            vec!["// first", "// second"]
        );
        assert_eq!(comment_lines(""), Vec::<String>::new());
    }

    #[test]
    fn test_inline_trailing_only_for_single_line() {
        let entry = LocationEntry {
            trailing_comments: Some(" note\n".to_string()),
            ..Default::default()
        };
        assert_eq!(
            inline_trailing_comment(Some(&entry)),
            Some(" // note".to_string())
        );

        let multi = LocationEntry {
            trailing_comments: Some(" a\n b\n".to_string()),
            ..Default::default()
        };
        assert_eq!(inline_trailing_comment(Some(&multi)), None);
    }

    #[test]
    fn test_print_golden_file() {
        use pretty_assertions::assert_eq;

        let source = fixture_source();
        let options = PrintOptions {
            simplify: SimplifyPolicy::new().with_override("test.annotations.http", 0),
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();

        let expected = "\
syntax = \"proto3\";

package test.v1;

import \"test/annotations/annotations.proto\";

service FooService {
  rpc GetFoo(GetFooRequest) returns (GetFooResponse) {
    option (test.annotations.http) = {
      get: \"/foo\"
    };
  }
}

// GetFooRequest asks for a foo.
message GetFooRequest {
  string name = 1; // the foo name
  repeated int32 counts = 2;
}

message GetFooResponse {
  Status status = 1;
  map<string, string> labels = 2;
}

enum Status {
  STATUS_UNSPECIFIED = 0;
  STATUS_OK = 1;
}
";
        assert_eq!(sink.text("test/v1/test.proto").unwrap(), expected);
    }

    #[test]
    fn test_print_extend_block() {
        use pretty_assertions::assert_eq;

        let source = fixture_source();
        let options = PrintOptions::default();
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();

        let expected = "\
syntax = \"proto3\";

package test.annotations;

import \"google/protobuf/descriptor.proto\";

extend google.protobuf.MethodOptions {
  HttpRule http = 72295728;
  HttpRule http_extra = 72295729;
}

extend google.protobuf.OneofOptions {
  HttpRule note = 72295730;
}

message HttpRule {
  string get = 1;
  string post = 2;
  string body = 3;
}
";
        let text = sink.text("test/annotations/annotations.proto").unwrap();
        assert_eq!(text, expected);
        // The method extensions are declared apart in the fixture; they
        // still regroup into a single block, in declaration order.
        assert_eq!(text.matches("extend google.protobuf.MethodOptions").count(), 1);
    }

    #[test]
    fn test_print_oneof_with_custom_option() {
        use pretty_assertions::assert_eq;

        let source = fixture_source();
        let options = PrintOptions::default();
        let expected = "\
syntax = \"proto3\";

package test.v1;

import \"test/annotations/annotations.proto\";

message Choice {
  oneof kind {
    option (test.annotations.note).get = \"/kind\";
    string a = 1;
    int32 b = 2;
  }
}
";
        assert_eq!(
            single_file_text(&source, &options, "test/v1/choice.proto"),
            expected
        );
    }

    #[test]
    fn test_empty_bodies_collapse() {
        let file = prost_types::FileDescriptorProto {
            name: Some("test/v1/shell.proto".to_string()),
            package: Some("test.v1".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![prost_types::DescriptorProto {
                name: Some("Empty".to_string()),
                ..Default::default()
            }],
            service: vec![prost_types::ServiceDescriptorProto {
                name: Some("Idle".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let set = prost_types::FileDescriptorSet { file: vec![file] };
        let source = PrintSource::from_set(&set).unwrap();
        let text = single_file_text(&source, &PrintOptions::default(), "test/v1/shell.proto");
        assert_eq!(
            text,
            "syntax = \"proto3\";\n\npackage test.v1;\n\nservice Idle {}\n\nmessage Empty {}\n"
        );
    }

    #[test]
    fn test_print_file_index_out_of_range() {
        let source = fixture_source();
        let options = PrintOptions::default();
        let err = Printer::new(&source, &options).print_file(999).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_print_empty_file() {
        let source = fixture_source();
        let options = PrintOptions::default();
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();

        assert_eq!(
            sink.text("test/v1/empty.proto").unwrap(),
            "syntax = \"proto3\";\n\npackage test.v1;\n"
        );
    }

    #[test]
    fn test_simplified_option_collapses_to_sub_path() {
        let source = fixture_source();
        // Default policy: depth 5, no override for the fixture extension.
        let options = PrintOptions::default();
        let text = single_file_text(&source, &options, "test/v1/test.proto");
        assert!(text.contains("option (test.annotations.http).get = \"/foo\";"));
        assert!(!text.contains("get: \"/foo\""));
    }

    #[test]
    fn test_non_proto3_dependency_is_skipped() {
        // No source-file filter: the proto2 descriptor.proto dependency is
        // skipped rather than failing the run.
        let source = PrintSource::from_bytes(crate::testutil::test_set_bytes()).unwrap();
        let options = PrintOptions::default();
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();

        assert_eq!(sink.files().len(), 4);
        assert!(!sink.files().contains_key("google/protobuf/descriptor.proto"));
    }

    #[test]
    fn test_file_selection() {
        let source = fixture_source();
        let options = PrintOptions {
            only_files: Some(vec!["test/v1/empty.proto".to_string()]),
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();
        assert_eq!(sink.files().len(), 1);

        let options = PrintOptions {
            package_prefixes: Some(vec!["test.v1".to_string()]),
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();
        assert!(sink.files().keys().all(|path| path.starts_with("test/v1/")));

        let options = PrintOptions {
            ignore_files: vec!["test/v1/empty.proto".to_string()],
            ..Default::default()
        };
        let mut sink = MemorySink::new();
        Printer::new(&source, &options).print_files(&mut sink).unwrap();
        assert!(!sink.files().contains_key("test/v1/empty.proto"));
    }

    #[test]
    fn test_printing_is_deterministic() {
        let source = fixture_source();
        let options = PrintOptions::default();
        let first = single_file_text(&source, &options, "test/v1/test.proto");
        let second = single_file_text(&source, &options, "test/v1/test.proto");
        assert_eq!(first, second);
    }

    fn fixture_source() -> PrintSource {
        PrintSource::from_bytes(crate::testutil::test_set_bytes())
            .unwrap()
            .with_source_files(vec![
                "test/annotations/annotations.proto".to_string(),
                "test/v1/choice.proto".to_string(),
                "test/v1/empty.proto".to_string(),
                "test/v1/test.proto".to_string(),
            ])
    }

    fn single_file_text(source: &PrintSource, options: &PrintOptions, path: &str) -> String {
        let mut sink = MemorySink::new();
        Printer::new(source, options).print_files(&mut sink).unwrap();
        sink.text(path).unwrap().to_string()
    }

    #[test]
    fn test_dir_sink_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirSink::new(dir.path());
        let err = sink.put_file("../escape.proto", b"x").unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }));

        sink.put_file("a/b/c.proto", b"syntax").unwrap();
        assert_eq!(fs::read(dir.path().join("a/b/c.proto")).unwrap(), b"syntax");
    }
}
