//! Programmatic descriptor building.
//!
//! A mutable tree of schema elements, each exclusively owned by its
//! parent, that can be assembled or rearranged and then emitted as a
//! `FileDescriptorProto` with synthesized `SourceCodeInfo`. Elements live
//! in an arena addressed by stable ids; moving an element between parents
//! rewrites child lists, never the arena.

use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};

use crate::error::{Error, Result};
use crate::location::{path, LocationEntry, LocationTree, LocId, Span};

mod walk;

// Synthesized locations leave room above for the syntax/package/import
// header block.
const BODY_START_LINE: i32 = 10;

/// Stable handle to one element in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementId(usize);

/// Kind-specific descriptor payload of an element.
///
/// Child lists inside the payloads stay empty; children are tree edges
/// and are folded back in by [`ElementTree::to_descriptor`].
#[derive(Debug, Clone)]
pub enum ElementPayload {
    /// The file root
    File,
    /// A message shell (no fields, nested types, or oneofs)
    Message(DescriptorProto),
    /// A field
    Field(FieldDescriptorProto),
    /// An enum shell (no values)
    Enum(EnumDescriptorProto),
    /// An enum value
    EnumValue(EnumValueDescriptorProto),
    /// A oneof shell (member fields are children)
    Oneof(OneofDescriptorProto),
    /// A service shell (no methods)
    Service(ServiceDescriptorProto),
    /// An rpc method
    Method(MethodDescriptorProto),
}

impl ElementPayload {
    fn kind_name(&self) -> &'static str {
        match self {
            ElementPayload::File => "file",
            ElementPayload::Message(_) => "message",
            ElementPayload::Field(_) => "field",
            ElementPayload::Enum(_) => "enum",
            ElementPayload::EnumValue(_) => "value",
            ElementPayload::Oneof(_) => "oneof",
            ElementPayload::Service(_) => "service",
            ElementPayload::Method(_) => "method",
        }
    }

    fn name(&self) -> &str {
        match self {
            ElementPayload::File => "",
            ElementPayload::Message(m) => m.name(),
            ElementPayload::Field(f) => f.name(),
            ElementPayload::Enum(e) => e.name(),
            ElementPayload::EnumValue(v) => v.name(),
            ElementPayload::Oneof(o) => o.name(),
            ElementPayload::Service(s) => s.name(),
            ElementPayload::Method(m) => m.name(),
        }
    }
}

/// Comment text carried along with an element.
#[derive(Debug, Clone, Default)]
pub struct ElementSource {
    /// Comment block directly above the element
    pub leading_comments: Option<String>,
    /// Comment on or after the element's line
    pub trailing_comments: Option<String>,
    /// Detached comment blocks above the element
    pub leading_detached_comments: Vec<String>,
}

#[derive(Debug)]
struct ElementNode {
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    payload: ElementPayload,
    source: ElementSource,
}

/// Mutable element tree for one file.
#[derive(Debug)]
pub struct ElementTree {
    nodes: Vec<ElementNode>,
    file_name: String,
    package: String,
    dependencies: Vec<String>,
}

impl ElementTree {
    /// An empty proto3 file.
    pub fn new(file_name: impl Into<String>, package: impl Into<String>) -> ElementTree {
        ElementTree {
            nodes: vec![ElementNode {
                parent: None,
                children: Vec::new(),
                payload: ElementPayload::File,
                source: ElementSource::default(),
            }],
            file_name: file_name.into(),
            package: package.into(),
            dependencies: Vec::new(),
        }
    }

    /// The file root.
    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    /// Record an import path. Duplicates are kept out.
    pub fn add_import(&mut self, dependency: impl Into<String>) {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }

    /// The element's payload.
    pub fn payload(&self, id: ElementId) -> &ElementPayload {
        &self.nodes[id.0].payload
    }

    /// The element's comment text, mutable for callers annotating as they
    /// build.
    pub fn source_mut(&mut self, id: ElementId) -> &mut ElementSource {
        &mut self.nodes[id.0].source
    }

    /// Child ids in order.
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        &self.nodes[id.0].children
    }

    fn insert(
        &mut self,
        parent: ElementId,
        payload: ElementPayload,
        source: ElementSource,
    ) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(ElementNode {
            parent: Some(parent),
            children: Vec::new(),
            payload,
            source,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn expect_container(&self, id: ElementId, operation: &str) -> Result<()> {
        match self.nodes[id.0].payload {
            ElementPayload::Message(_) | ElementPayload::File => Ok(()),
            ref other => Err(Error::UnknownElementKind {
                kind: other.kind_name().to_string(),
                context: operation.to_string(),
            }),
        }
    }

    fn expect_message(&self, id: ElementId, operation: &str) -> Result<()> {
        match self.nodes[id.0].payload {
            ElementPayload::Message(_) => Ok(()),
            ref other => Err(Error::UnknownElementKind {
                kind: other.kind_name().to_string(),
                context: operation.to_string(),
            }),
        }
    }

    /// Add a message under the file root or another message. Child lists
    /// inside the given descriptor become child elements.
    pub fn add_message(&mut self, parent: ElementId, message: DescriptorProto) -> Result<ElementId> {
        self.expect_container(parent, "add_message")?;
        Ok(self.import_message(parent, &message, None, &LocationTree::new()))
    }

    /// Add a field to a message or oneof.
    pub fn add_field_descriptor(
        &mut self,
        parent: ElementId,
        field: FieldDescriptorProto,
    ) -> Result<ElementId> {
        match self.nodes[parent.0].payload {
            ElementPayload::Message(_) | ElementPayload::Oneof(_) => {}
            ref other => {
                return Err(Error::UnknownElementKind {
                    kind: other.kind_name().to_string(),
                    context: "add_field_descriptor".to_string(),
                })
            }
        }
        Ok(self.insert(parent, ElementPayload::Field(field), ElementSource::default()))
    }

    /// Add an enum under the file root or a message.
    pub fn add_enum(&mut self, parent: ElementId, enum_type: EnumDescriptorProto) -> Result<ElementId> {
        self.expect_container(parent, "add_enum")?;
        Ok(self.import_enum(parent, &enum_type, None, &LocationTree::new()))
    }

    /// Add a service at the file level.
    pub fn add_service(&mut self, service: ServiceDescriptorProto) -> ElementId {
        let root = self.root();
        self.import_service(root, &service, None, &LocationTree::new())
    }

    fn detach(&mut self, id: ElementId) -> Result<()> {
        let parent = self.nodes[id.0].parent.ok_or_else(|| {
            Error::internal("cannot detach the file root".to_string())
        })?;
        let children = &mut self.nodes[parent.0].children;
        let before = children.len();
        children.retain(|child| *child != id);
        if before - children.len() != 1 {
            return Err(Error::internal(format!(
                "element {:?} not attached exactly once to its parent",
                id
            )));
        }
        self.nodes[id.0].parent = None;
        Ok(())
    }

    /// Move a field into a message, clearing its number so the message's
    /// renumbering pass applies on emit.
    pub fn adopt_field(&mut self, message: ElementId, field: ElementId) -> Result<()> {
        self.expect_message(message, "adopt_field")?;
        let ElementPayload::Field(payload) = &mut self.nodes[field.0].payload else {
            return Err(Error::UnknownElementKind {
                kind: self.nodes[field.0].payload.kind_name().to_string(),
                context: "adopt_field".to_string(),
            });
        };
        payload.number = None;
        if self.nodes[field.0].parent.is_some() {
            self.detach(field)?;
        }
        self.nodes[field.0].parent = Some(message);
        self.nodes[message.0].children.push(field);
        Ok(())
    }

    /// Detach a field from a message by name, returning its id for reuse.
    pub fn remove_field(&mut self, message: ElementId, name: &str) -> Result<ElementId> {
        self.expect_message(message, "remove_field")?;
        let target = self.nodes[message.0]
            .children
            .iter()
            .copied()
            .find(|child| {
                matches!(&self.nodes[child.0].payload, ElementPayload::Field(f) if f.name() == name)
            })
            .ok_or_else(|| {
                Error::descriptor_build(format!("no field named {:?} to remove", name))
            })?;
        self.detach(target)?;
        Ok(target)
    }

    /// Find a message by dotted name relative to the file, recursing into
    /// nested messages.
    pub fn message_by_name(&self, name: &str) -> Option<ElementId> {
        let mut current = self.root();
        for segment in name.split('.') {
            current = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|child| {
                    matches!(&self.nodes[child.0].payload, ElementPayload::Message(m) if m.name() == segment)
                })?;
        }
        Some(current)
    }

    /// Indented kind/name outline of the tree. Synthetic oneofs never
    /// appear here; they exist only in emitted descriptors.
    pub fn debug_string(&self) -> String {
        let mut out = String::new();
        self.debug_node(self.root(), 0, &mut out);
        out
    }

    fn debug_node(&self, id: ElementId, depth: usize, out: &mut String) {
        let node = &self.nodes[id.0];
        if !matches!(node.payload, ElementPayload::File) {
            for _ in 0..depth {
                out.push_str("  ");
            }
            out.push_str(node.payload.kind_name());
            out.push(' ');
            out.push_str(node.payload.name());
            out.push('\n');
        }
        let child_depth = if matches!(node.payload, ElementPayload::File) {
            depth
        } else {
            depth + 1
        };
        for child in &node.children {
            self.debug_node(*child, child_depth, out);
        }
    }

    /// Emit the file descriptor with synthesized source locations.
    pub fn to_descriptor(&self) -> Result<FileDescriptorProto> {
        let mut file = FileDescriptorProto {
            name: Some(self.file_name.clone()),
            package: Some(self.package.clone()),
            dependency: self.dependencies.clone(),
            syntax: Some("proto3".to_string()),
            ..Default::default()
        };

        let mut locs = LocationTree::new();
        let mut line = BODY_START_LINE;
        let root_loc = locs.root();
        let mut message_index = 0;
        let mut enum_index = 0;
        let mut service_index = 0;
        for child in &self.nodes[self.root().0].children {
            match &self.nodes[child.0].payload {
                ElementPayload::Message(_) => {
                    let message = self.emit_message(
                        *child,
                        &mut locs,
                        root_loc,
                        path::FILE_MESSAGE,
                        message_index,
                        &mut line,
                    )?;
                    file.message_type.push(message);
                    message_index += 1;
                }
                ElementPayload::Enum(_) => {
                    let enum_type = self.emit_enum(
                        *child,
                        &mut locs,
                        root_loc,
                        path::FILE_ENUM,
                        enum_index,
                        &mut line,
                    )?;
                    file.enum_type.push(enum_type);
                    enum_index += 1;
                }
                ElementPayload::Service(_) => {
                    let service =
                        self.emit_service(*child, &mut locs, root_loc, service_index, &mut line)?;
                    file.service.push(service);
                    service_index += 1;
                }
                other => {
                    return Err(Error::UnknownElementKind {
                        kind: other.kind_name().to_string(),
                        context: "file level".to_string(),
                    })
                }
            }
            // Blank line between top-level declarations.
            line += 1;
        }

        file.source_code_info = Some(locs.export());
        Ok(file)
    }

    fn attach_entry(
        &self,
        locs: &mut LocationTree,
        loc: LocId,
        id: ElementId,
        start_line: i32,
        end_line: i32,
    ) {
        let source = &self.nodes[id.0].source;
        locs.attach(
            loc,
            LocationEntry {
                span: Some(Span {
                    start_line,
                    start_col: 0,
                    end_line,
                    end_col: 1,
                }),
                leading_comments: source.leading_comments.clone(),
                trailing_comments: source.trailing_comments.clone(),
                leading_detached_comments: source.leading_detached_comments.clone(),
            },
        );
    }

    fn emit_message(
        &self,
        id: ElementId,
        locs: &mut LocationTree,
        parent_loc: LocId,
        parent_field: i32,
        index: i32,
        line: &mut i32,
    ) -> Result<DescriptorProto> {
        let ElementPayload::Message(shell) = &self.nodes[id.0].payload else {
            return Err(Error::internal("emit_message on a non-message".to_string()));
        };
        let loc = locs.ensure_child(parent_loc, parent_field, index);
        let start_line = *line;
        *line += 1;

        let mut message = shell.clone();
        message.field.clear();
        message.nested_type.clear();
        message.enum_type.clear();
        message.oneof_decl.clear();

        let mut nested_index = 0;
        let mut enum_index = 0;
        for child in &self.nodes[id.0].children {
            match &self.nodes[child.0].payload {
                ElementPayload::Field(_) => {
                    let field_index = message.field.len() as i32;
                    let field = self.emit_field(*child, locs, loc, field_index, line, None)?;
                    message.field.push(field);
                }
                ElementPayload::Oneof(oneof_shell) => {
                    let oneof_index = message.oneof_decl.len() as i32;
                    let oneof_loc = locs.ensure_child(loc, path::MESSAGE_ONEOF, oneof_index);
                    let oneof_start = *line;
                    *line += 1;
                    for member in &self.nodes[child.0].children {
                        let field_index = message.field.len() as i32;
                        let field = self.emit_field(
                            *member,
                            locs,
                            loc,
                            field_index,
                            line,
                            Some(oneof_index),
                        )?;
                        message.field.push(field);
                    }
                    let oneof_end = *line;
                    *line += 1;
                    self.attach_entry(locs, oneof_loc, *child, oneof_start, oneof_end);
                    message.oneof_decl.push(oneof_shell.clone());
                }
                ElementPayload::Message(_) => {
                    let nested = self.emit_message(
                        *child,
                        locs,
                        loc,
                        path::MESSAGE_NESTED,
                        nested_index,
                        line,
                    )?;
                    message.nested_type.push(nested);
                    nested_index += 1;
                }
                ElementPayload::Enum(_) => {
                    let nested = self.emit_enum(
                        *child,
                        locs,
                        loc,
                        path::MESSAGE_ENUM,
                        enum_index,
                        line,
                    )?;
                    message.enum_type.push(nested);
                    enum_index += 1;
                }
                other => {
                    return Err(Error::UnknownElementKind {
                        kind: other.kind_name().to_string(),
                        context: format!("message {}", message.name()),
                    })
                }
            }
        }

        renumber_fields(&mut message);
        synthesize_optional_oneofs(&mut message);

        let end_line = *line;
        *line += 1;
        self.attach_entry(locs, loc, id, start_line, end_line);
        Ok(message)
    }

    fn emit_field(
        &self,
        id: ElementId,
        locs: &mut LocationTree,
        message_loc: LocId,
        field_index: i32,
        line: &mut i32,
        oneof_index: Option<i32>,
    ) -> Result<FieldDescriptorProto> {
        let ElementPayload::Field(shell) = &self.nodes[id.0].payload else {
            return Err(Error::UnknownElementKind {
                kind: self.nodes[id.0].payload.kind_name().to_string(),
                context: "oneof member".to_string(),
            });
        };
        let mut field = shell.clone();
        field.oneof_index = oneof_index;
        let loc = locs.ensure_child(message_loc, path::MESSAGE_FIELD, field_index);
        self.attach_entry(locs, loc, id, *line, *line);
        *line += 1;
        Ok(field)
    }

    fn emit_enum(
        &self,
        id: ElementId,
        locs: &mut LocationTree,
        parent_loc: LocId,
        parent_field: i32,
        index: i32,
        line: &mut i32,
    ) -> Result<EnumDescriptorProto> {
        let ElementPayload::Enum(shell) = &self.nodes[id.0].payload else {
            return Err(Error::internal("emit_enum on a non-enum".to_string()));
        };
        let loc = locs.ensure_child(parent_loc, parent_field, index);
        let start_line = *line;
        *line += 1;

        let mut enum_type = shell.clone();
        enum_type.value.clear();
        for child in &self.nodes[id.0].children {
            let ElementPayload::EnumValue(value) = &self.nodes[child.0].payload else {
                return Err(Error::UnknownElementKind {
                    kind: self.nodes[child.0].payload.kind_name().to_string(),
                    context: format!("enum {}", enum_type.name()),
                });
            };
            let value_index = enum_type.value.len() as i32;
            let value_loc = locs.ensure_child(loc, path::ENUM_VALUE, value_index);
            self.attach_entry(locs, value_loc, *child, *line, *line);
            *line += 1;
            enum_type.value.push(value.clone());
        }

        let end_line = *line;
        *line += 1;
        self.attach_entry(locs, loc, id, start_line, end_line);
        Ok(enum_type)
    }

    fn emit_service(
        &self,
        id: ElementId,
        locs: &mut LocationTree,
        root_loc: LocId,
        index: i32,
        line: &mut i32,
    ) -> Result<ServiceDescriptorProto> {
        let ElementPayload::Service(shell) = &self.nodes[id.0].payload else {
            return Err(Error::internal("emit_service on a non-service".to_string()));
        };
        let loc = locs.ensure_child(root_loc, path::FILE_SERVICE, index);
        let start_line = *line;
        *line += 1;

        let mut service = shell.clone();
        service.method.clear();
        for child in &self.nodes[id.0].children {
            let ElementPayload::Method(method) = &self.nodes[child.0].payload else {
                return Err(Error::UnknownElementKind {
                    kind: self.nodes[child.0].payload.kind_name().to_string(),
                    context: format!("service {}", service.name()),
                });
            };
            let method_index = service.method.len() as i32;
            let method_loc = locs.ensure_child(loc, path::SERVICE_METHOD, method_index);
            self.attach_entry(locs, method_loc, *child, *line, *line);
            *line += 1;
            service.method.push(method.clone());
        }

        let end_line = *line;
        *line += 1;
        self.attach_entry(locs, loc, id, start_line, end_line);
        Ok(service)
    }
}

// A message with any unnumbered or colliding field gets every field
// renumbered sequentially from 1 in current order; partial numbering is
// never preserved.
fn renumber_fields(message: &mut DescriptorProto) {
    let mut seen = Vec::with_capacity(message.field.len());
    let mut renumber = false;
    for field in &message.field {
        match field.number {
            Some(number) if number > 0 && !seen.contains(&number) => seen.push(number),
            _ => {
                renumber = true;
                break;
            }
        }
    }
    if !renumber {
        return;
    }
    for (index, field) in message.field.iter_mut().enumerate() {
        field.number = Some(index as i32 + 1);
    }
}

// Explicit-optional fields are backed by a single-field oneof named
// `_<field>` in the emitted descriptor only.
fn synthesize_optional_oneofs(message: &mut DescriptorProto) {
    for field in &mut message.field {
        if field.proto3_optional() && field.oneof_index.is_none() {
            let index = message.oneof_decl.len() as i32;
            message.oneof_decl.push(OneofDescriptorProto {
                name: Some(format!("_{}", field.name())),
                ..Default::default()
            });
            field.oneof_index = Some(index);
        }
    }
}
