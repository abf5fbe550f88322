//! Source location tree built from `SourceCodeInfo`.
//!
//! A `FileDescriptorProto` carries its source locations as a flat list of
//! entries keyed by numeric paths into the descriptor message itself. This
//! module folds that list into a tree addressed by `(field number, index)`
//! pairs so the printer and option model can ask for the span of one
//! element without scanning the whole list, and the descriptor builder can
//! assemble the same structure in reverse when synthesizing locations.

use std::collections::BTreeMap;

use prost_types::source_code_info::Location;
use prost_types::SourceCodeInfo;

/// Field numbers of `FileDescriptorProto` and its nested types.
///
/// These encode the wire layout of descriptor.proto itself and are fixed
/// for all time; they cannot be discovered through reflection because they
/// describe the reflection types.
pub mod path {
    /// `FileDescriptorProto.name`
    pub const FILE_NAME: i32 = 1;
    /// `FileDescriptorProto.package`
    pub const FILE_PACKAGE: i32 = 2;
    /// `FileDescriptorProto.dependency`
    pub const FILE_DEPENDENCY: i32 = 3;
    /// `FileDescriptorProto.message_type`
    pub const FILE_MESSAGE: i32 = 4;
    /// `FileDescriptorProto.enum_type`
    pub const FILE_ENUM: i32 = 5;
    /// `FileDescriptorProto.service`
    pub const FILE_SERVICE: i32 = 6;
    /// `FileDescriptorProto.extension`
    pub const FILE_EXTENSION: i32 = 7;
    /// `FileDescriptorProto.options`
    pub const FILE_OPTIONS: i32 = 8;
    /// `FileDescriptorProto.public_dependency`
    pub const FILE_PUBLIC_DEPENDENCY: i32 = 10;
    /// `FileDescriptorProto.syntax`
    pub const FILE_SYNTAX: i32 = 12;
    /// `FileDescriptorProto.edition`
    pub const FILE_EDITION: i32 = 14;

    /// `DescriptorProto.field`
    pub const MESSAGE_FIELD: i32 = 2;
    /// `DescriptorProto.nested_type`
    pub const MESSAGE_NESTED: i32 = 3;
    /// `DescriptorProto.enum_type`
    pub const MESSAGE_ENUM: i32 = 4;
    /// `DescriptorProto.extension`
    pub const MESSAGE_EXTENSION: i32 = 6;
    /// `DescriptorProto.options`
    pub const MESSAGE_OPTIONS: i32 = 7;
    /// `DescriptorProto.oneof_decl`
    pub const MESSAGE_ONEOF: i32 = 8;
    /// `DescriptorProto.reserved_range`
    pub const MESSAGE_RESERVED_RANGE: i32 = 9;
    /// `DescriptorProto.reserved_name`
    pub const MESSAGE_RESERVED_NAME: i32 = 10;

    /// `FieldDescriptorProto.options`
    pub const FIELD_OPTIONS: i32 = 8;

    /// `EnumDescriptorProto.value`
    pub const ENUM_VALUE: i32 = 2;
    /// `EnumDescriptorProto.options`
    pub const ENUM_OPTIONS: i32 = 3;

    /// `EnumValueDescriptorProto.options`
    pub const ENUM_VALUE_OPTIONS: i32 = 3;

    /// `ServiceDescriptorProto.method`
    pub const SERVICE_METHOD: i32 = 2;
    /// `ServiceDescriptorProto.options`
    pub const SERVICE_OPTIONS: i32 = 3;

    /// `MethodDescriptorProto.options`
    pub const METHOD_OPTIONS: i32 = 4;

    /// `OneofDescriptorProto.options`
    pub const ONEOF_OPTIONS: i32 = 2;
}

/// The kinds of descriptor element that can carry options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// A `.proto` file
    File,
    /// A message declaration
    Message,
    /// A field declaration
    Field,
    /// A oneof declaration
    Oneof,
    /// An enum declaration
    Enum,
    /// An enum value declaration
    EnumValue,
    /// A service declaration
    Service,
    /// An rpc method declaration
    Method,
}

impl ElementKind {
    /// Field number of the `options` sub-message within this kind's
    /// descriptor. The numbers differ per kind and are load-bearing for
    /// locating options in source.
    pub fn options_field(self) -> i32 {
        match self {
            ElementKind::File => path::FILE_OPTIONS,
            ElementKind::Message => path::MESSAGE_OPTIONS,
            ElementKind::Field => path::FIELD_OPTIONS,
            ElementKind::Oneof => path::ONEOF_OPTIONS,
            ElementKind::Enum => path::ENUM_OPTIONS,
            ElementKind::EnumValue => path::ENUM_VALUE_OPTIONS,
            ElementKind::Service => path::SERVICE_OPTIONS,
            ElementKind::Method => path::METHOD_OPTIONS,
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementKind::File => "file",
            ElementKind::Message => "message",
            ElementKind::Field => "field",
            ElementKind::Oneof => "oneof",
            ElementKind::Enum => "enum",
            ElementKind::EnumValue => "enum value",
            ElementKind::Service => "service",
            ElementKind::Method => "method",
        };
        f.write_str(name)
    }
}

/// A line/column source span, zero-based as in `SourceCodeInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start line
    pub start_line: i32,
    /// Start column
    pub start_col: i32,
    /// End line
    pub end_line: i32,
    /// End column
    pub end_col: i32,
}

impl Span {
    /// Decode the 3- or 4-element span list used on the wire. A 3-element
    /// span means start and end are on the same line.
    pub fn from_raw(raw: &[i32]) -> Option<Span> {
        match raw {
            [line, start_col, end_col] => Some(Span {
                start_line: *line,
                start_col: *start_col,
                end_line: *line,
                end_col: *end_col,
            }),
            [start_line, start_col, end_line, end_col] => Some(Span {
                start_line: *start_line,
                start_col: *start_col,
                end_line: *end_line,
                end_col: *end_col,
            }),
            _ => None,
        }
    }

    /// Encode back into the compact wire representation.
    pub fn to_raw(self) -> Vec<i32> {
        if self.start_line == self.end_line {
            vec![self.start_line, self.start_col, self.end_col]
        } else {
            vec![self.start_line, self.start_col, self.end_line, self.end_col]
        }
    }

    /// True when the span starts and ends on one line.
    pub fn single_line(self) -> bool {
        self.start_line == self.end_line
    }
}

/// Comments and span attached to one location entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationEntry {
    /// Source span, absent for synthesized placeholder nodes
    pub span: Option<Span>,
    /// Comment block directly above the element
    pub leading_comments: Option<String>,
    /// Comment on or after the element's line
    pub trailing_comments: Option<String>,
    /// Comment blocks above the element separated by blank lines
    pub leading_detached_comments: Vec<String>,
}

impl LocationEntry {
    fn from_location(loc: &Location) -> LocationEntry {
        LocationEntry {
            span: Span::from_raw(&loc.span),
            leading_comments: loc.leading_comments.clone(),
            trailing_comments: loc.trailing_comments.clone(),
            leading_detached_comments: loc.leading_detached_comments.clone(),
        }
    }
}

/// Opaque handle to a node in a [`LocationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocId(usize);

#[derive(Debug, Default)]
struct LocationNode {
    // field number -> index -> child, for even-length path segments
    children: BTreeMap<i32, BTreeMap<i32, LocId>>,
    // field number -> child, for a trailing odd path segment
    singles: BTreeMap<i32, LocId>,
    entries: Vec<LocationEntry>,
}

/// Tree of source locations for one file.
///
/// Built once per printed file from the flat `SourceCodeInfo` list, or
/// assembled incrementally by the descriptor builder and exported back to
/// the flat form.
#[derive(Debug)]
pub struct LocationTree {
    nodes: Vec<LocationNode>,
}

impl LocationTree {
    /// An empty tree with only a root node.
    pub fn new() -> LocationTree {
        LocationTree {
            nodes: vec![LocationNode::default()],
        }
    }

    /// Fold a file's flat location list into a tree.
    ///
    /// Zero-length paths attach to the root. Paths walk down in
    /// `(field, index)` pairs; a trailing odd segment attaches under the
    /// field number alone (scalar fields have no index).
    pub fn build(info: &SourceCodeInfo) -> LocationTree {
        let mut tree = LocationTree::new();
        for loc in &info.location {
            let node = tree.node_for_path(&loc.path);
            tree.nodes[node.0].entries.push(LocationEntry::from_location(loc));
        }
        tree
    }

    /// The file-level root node.
    pub fn root(&self) -> LocId {
        LocId(0)
    }

    fn node_for_path(&mut self, loc_path: &[i32]) -> LocId {
        let mut current = self.root();
        let mut chunks = loc_path.chunks_exact(2);
        for pair in &mut chunks {
            current = self.ensure_child(current, pair[0], pair[1]);
        }
        if let [field] = chunks.remainder() {
            current = self.ensure_single(current, *field);
        }
        current
    }

    fn new_node(&mut self) -> LocId {
        self.nodes.push(LocationNode::default());
        LocId(self.nodes.len() - 1)
    }

    /// Child node for a repeated field occurrence, created on demand.
    pub fn ensure_child(&mut self, parent: LocId, field: i32, index: i32) -> LocId {
        if let Some(&existing) = self.nodes[parent.0]
            .children
            .get(&field)
            .and_then(|by_index| by_index.get(&index))
        {
            return existing;
        }
        let child = self.new_node();
        self.nodes[parent.0]
            .children
            .entry(field)
            .or_default()
            .insert(index, child);
        child
    }

    /// Child node for a scalar field, created on demand.
    pub fn ensure_single(&mut self, parent: LocId, field: i32) -> LocId {
        if let Some(&existing) = self.nodes[parent.0].singles.get(&field) {
            return existing;
        }
        let child = self.new_node();
        self.nodes[parent.0].singles.insert(field, child);
        child
    }

    /// Child node for a repeated field occurrence, if one was recorded.
    pub fn type_child(&self, parent: LocId, field: i32, index: i32) -> Option<LocId> {
        self.nodes[parent.0]
            .children
            .get(&field)?
            .get(&index)
            .copied()
    }

    /// Child node for a scalar field, if one was recorded.
    pub fn single_child(&self, parent: LocId, field: i32) -> Option<LocId> {
        self.nodes[parent.0].singles.get(&field).copied()
    }

    /// The entry attached directly to a node, when there is exactly one.
    pub fn entry(&self, node: LocId) -> Option<&LocationEntry> {
        match self.nodes[node.0].entries.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    /// Attach an entry to a node (write path).
    pub fn attach(&mut self, node: LocId, entry: LocationEntry) {
        self.nodes[node.0].entries.push(entry);
    }

    /// The span of a node's own entry.
    pub fn span(&self, node: LocId) -> Option<Span> {
        self.entry(node).and_then(|entry| entry.span)
    }

    /// Locate the source entry for one option on an element.
    ///
    /// The option's path ends in the pair `(options field number, option
    /// field number)`, so it sits directly under the element node; any
    /// sub-field locations of a message-valued option hang below it.
    /// Returns the entry only when exactly one entry exists in that
    /// subtree; zero or several matches mean the option cannot be placed
    /// by source position and falls back to declaration order.
    pub fn option_entry(
        &self,
        element: LocId,
        element_kind: ElementKind,
        option_number: i32,
    ) -> Option<&LocationEntry> {
        let option_node = self.type_child(element, element_kind.options_field(), option_number)?;
        let mut found = None;
        for entry in self.subtree_entries(option_node) {
            if found.is_some() {
                return None;
            }
            found = Some(entry);
        }
        found
    }

    fn subtree_entries(&self, node: LocId) -> Vec<&LocationEntry> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let data = &self.nodes[current.0];
            out.extend(data.entries.iter());
            stack.extend(data.singles.values().copied());
            for by_index in data.children.values() {
                stack.extend(by_index.values().copied());
            }
        }
        out
    }

    /// Flatten back into `SourceCodeInfo`, sorted by start line then start
    /// column (write path).
    pub fn export(&self) -> SourceCodeInfo {
        let mut locations = Vec::new();
        self.collect(self.root(), &mut Vec::new(), &mut locations);
        locations.sort_by_key(|loc| {
            let span = Span::from_raw(&loc.span);
            (
                span.map_or(i32::MAX, |s| s.start_line),
                span.map_or(i32::MAX, |s| s.start_col),
            )
        });
        SourceCodeInfo {
            location: locations,
        }
    }

    fn collect(&self, node: LocId, prefix: &mut Vec<i32>, out: &mut Vec<Location>) {
        let data = &self.nodes[node.0];
        for entry in &data.entries {
            out.push(Location {
                path: prefix.clone(),
                span: entry.span.map(Span::to_raw).unwrap_or_default(),
                leading_comments: entry.leading_comments.clone(),
                trailing_comments: entry.trailing_comments.clone(),
                leading_detached_comments: entry.leading_detached_comments.clone(),
            });
        }
        for (&field, child) in &data.singles {
            prefix.push(field);
            self.collect(*child, prefix, out);
            prefix.pop();
        }
        for (&field, by_index) in &data.children {
            for (&index, child) in by_index {
                prefix.push(field);
                prefix.push(index);
                self.collect(*child, prefix, out);
                prefix.pop();
                prefix.pop();
            }
        }
    }
}

impl Default for LocationTree {
    fn default() -> Self {
        LocationTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(path: &[i32], span: &[i32]) -> Location {
        Location {
            path: path.to_vec(),
            span: span.to_vec(),
            ..Default::default()
        }
    }

    fn info(locations: Vec<Location>) -> SourceCodeInfo {
        SourceCodeInfo {
            location: locations,
        }
    }

    #[test]
    fn test_span_from_raw() {
        let short = Span::from_raw(&[4, 0, 20]).unwrap();
        assert_eq!(short.start_line, 4);
        assert_eq!(short.end_line, 4);
        assert!(short.single_line());

        let long = Span::from_raw(&[4, 0, 9, 1]).unwrap();
        assert_eq!(long.end_line, 9);
        assert!(!long.single_line());

        assert!(Span::from_raw(&[]).is_none());
    }

    #[test]
    fn test_build_and_lookup() {
        let tree = LocationTree::build(&info(vec![
            loc(&[], &[0, 0, 20, 1]),
            loc(&[path::FILE_SYNTAX], &[0, 0, 18]),
            loc(&[path::FILE_MESSAGE, 0], &[4, 0, 9, 1]),
            loc(&[path::FILE_MESSAGE, 0, path::MESSAGE_FIELD, 1], &[6, 2, 24]),
        ]));

        let message = tree.type_child(tree.root(), path::FILE_MESSAGE, 0).unwrap();
        assert_eq!(tree.span(message).unwrap().start_line, 4);

        let field = tree.type_child(message, path::MESSAGE_FIELD, 1).unwrap();
        assert!(tree.span(field).unwrap().single_line());

        assert!(tree.type_child(tree.root(), path::FILE_ENUM, 0).is_none());
        assert!(tree.single_child(tree.root(), path::FILE_SYNTAX).is_some());
    }

    #[test]
    fn test_option_entry_on_method() {
        // Option at service 0, method 0, options (field 4), extension 1001.
        let tree = LocationTree::build(&info(vec![loc(
            &[path::FILE_SERVICE, 0, path::SERVICE_METHOD, 0, path::METHOD_OPTIONS, 1001],
            &[12, 4, 40],
        )]));

        let service = tree.type_child(tree.root(), path::FILE_SERVICE, 0).unwrap();
        let method = tree.type_child(service, path::SERVICE_METHOD, 0).unwrap();
        let entry = tree
            .option_entry(method, ElementKind::Method, 1001)
            .unwrap();
        assert_eq!(entry.span.unwrap().start_line, 12);
    }

    #[test]
    fn test_option_entry_ambiguous() {
        // Two entries inside the same option subtree: no usable location.
        let tree = LocationTree::build(&info(vec![
            loc(&[path::FILE_MESSAGE, 0, path::MESSAGE_OPTIONS, 1001], &[3, 2, 30]),
            loc(&[path::FILE_MESSAGE, 0, path::MESSAGE_OPTIONS, 1001, 2], &[3, 10, 28]),
        ]));

        let message = tree.type_child(tree.root(), path::FILE_MESSAGE, 0).unwrap();
        assert!(tree.option_entry(message, ElementKind::Message, 1001).is_none());
        assert!(tree.option_entry(message, ElementKind::Message, 1002).is_none());
    }

    #[test]
    fn test_write_path_export_sorted() {
        let mut tree = LocationTree::new();
        let root = tree.root();
        let second = tree.ensure_child(root, path::FILE_MESSAGE, 1);
        tree.attach(
            second,
            LocationEntry {
                span: Span::from_raw(&[20, 0, 25, 1]),
                ..Default::default()
            },
        );
        let first = tree.ensure_child(root, path::FILE_MESSAGE, 0);
        tree.attach(
            first,
            LocationEntry {
                span: Span::from_raw(&[10, 0, 15, 1]),
                ..Default::default()
            },
        );

        let exported = tree.export();
        assert_eq!(exported.location.len(), 2);
        assert_eq!(exported.location[0].span[0], 10);
        assert_eq!(exported.location[0].path, vec![path::FILE_MESSAGE, 0]);
        assert_eq!(exported.location[1].span[0], 20);
    }
}
