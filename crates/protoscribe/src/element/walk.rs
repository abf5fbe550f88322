//! Importing existing descriptors into an element tree.
//!
//! The inverse of [`ElementTree::to_descriptor`]: a parsed file becomes a
//! mutable tree, with comments pulled from its `SourceCodeInfo`. Synthetic
//! proto3-optional oneofs are dropped on the way in; `to_descriptor`
//! recreates them.

use prost_types::{DescriptorProto, EnumDescriptorProto, FileDescriptorProto, ServiceDescriptorProto};

use crate::error::{Error, Result};
use crate::location::{path, LocId, LocationTree};

use super::{ElementId, ElementPayload, ElementSource, ElementTree};

fn source_from(locs: &LocationTree, loc: Option<LocId>) -> ElementSource {
    let Some(entry) = loc.and_then(|l| locs.entry(l)) else {
        return ElementSource::default();
    };
    ElementSource {
        leading_comments: entry.leading_comments.clone(),
        trailing_comments: entry.trailing_comments.clone(),
        leading_detached_comments: entry.leading_detached_comments.clone(),
    }
}

impl ElementTree {
    /// Build a tree from a parsed proto3 file.
    pub fn from_file(file: &FileDescriptorProto) -> Result<ElementTree> {
        if file.syntax() != "proto3" {
            return Err(Error::UnsupportedSyntax {
                syntax: file.syntax().to_string(),
            });
        }
        let mut tree = ElementTree::new(file.name(), file.package());
        for dependency in &file.dependency {
            tree.add_import(dependency.clone());
        }
        let locs = match &file.source_code_info {
            Some(info) => LocationTree::build(info),
            None => LocationTree::new(),
        };
        let root = tree.root();
        let root_loc = locs.root();
        for (index, message) in file.message_type.iter().enumerate() {
            let loc = locs.type_child(root_loc, path::FILE_MESSAGE, index as i32);
            tree.import_message(root, message, loc, &locs);
        }
        for (index, enum_type) in file.enum_type.iter().enumerate() {
            let loc = locs.type_child(root_loc, path::FILE_ENUM, index as i32);
            tree.import_enum(root, enum_type, loc, &locs);
        }
        for (index, service) in file.service.iter().enumerate() {
            let loc = locs.type_child(root_loc, path::FILE_SERVICE, index as i32);
            tree.import_service(root, service, loc, &locs);
        }
        Ok(tree)
    }

    pub(crate) fn import_message(
        &mut self,
        parent: ElementId,
        message: &DescriptorProto,
        loc: Option<LocId>,
        locs: &LocationTree,
    ) -> ElementId {
        let mut shell = message.clone();
        shell.field.clear();
        shell.nested_type.clear();
        shell.enum_type.clear();
        shell.oneof_decl.clear();
        let id = self.insert(parent, ElementPayload::Message(shell), source_from(locs, loc));

        // A oneof node is created at its first member field's position;
        // synthetic optional-backing oneofs never enter the tree.
        let mut oneof_nodes: Vec<Option<ElementId>> = vec![None; message.oneof_decl.len()];
        for (index, field) in message.field.iter().enumerate() {
            let field_loc =
                loc.and_then(|l| locs.type_child(l, path::MESSAGE_FIELD, index as i32));
            let mut field = field.clone();
            let field_parent = match field.oneof_index {
                Some(oneof_index) if !field.proto3_optional() => {
                    let oneof_index = oneof_index as usize;
                    *oneof_nodes[oneof_index].get_or_insert_with(|| {
                        let oneof_loc = loc.and_then(|l| {
                            locs.type_child(l, path::MESSAGE_ONEOF, oneof_index as i32)
                        });
                        self.insert(
                            id,
                            ElementPayload::Oneof(message.oneof_decl[oneof_index].clone()),
                            source_from(locs, oneof_loc),
                        )
                    })
                }
                _ => id,
            };
            field.oneof_index = None;
            self.insert(
                field_parent,
                ElementPayload::Field(field),
                source_from(locs, field_loc),
            );
        }
        for (index, nested) in message.nested_type.iter().enumerate() {
            let nested_loc =
                loc.and_then(|l| locs.type_child(l, path::MESSAGE_NESTED, index as i32));
            self.import_message(id, nested, nested_loc, locs);
        }
        for (index, enum_type) in message.enum_type.iter().enumerate() {
            let enum_loc = loc.and_then(|l| locs.type_child(l, path::MESSAGE_ENUM, index as i32));
            self.import_enum(id, enum_type, enum_loc, locs);
        }
        id
    }

    pub(crate) fn import_enum(
        &mut self,
        parent: ElementId,
        enum_type: &EnumDescriptorProto,
        loc: Option<LocId>,
        locs: &LocationTree,
    ) -> ElementId {
        let mut shell = enum_type.clone();
        shell.value.clear();
        let id = self.insert(parent, ElementPayload::Enum(shell), source_from(locs, loc));
        for (index, value) in enum_type.value.iter().enumerate() {
            let value_loc = loc.and_then(|l| locs.type_child(l, path::ENUM_VALUE, index as i32));
            self.insert(
                id,
                ElementPayload::EnumValue(value.clone()),
                source_from(locs, value_loc),
            );
        }
        id
    }

    pub(crate) fn import_service(
        &mut self,
        parent: ElementId,
        service: &ServiceDescriptorProto,
        loc: Option<LocId>,
        locs: &LocationTree,
    ) -> ElementId {
        let mut shell = service.clone();
        shell.method.clear();
        let id = self.insert(parent, ElementPayload::Service(shell), source_from(locs, loc));
        for (index, method) in service.method.iter().enumerate() {
            let method_loc =
                loc.and_then(|l| locs.type_child(l, path::SERVICE_METHOD, index as i32));
            self.insert(
                id,
                ElementPayload::Method(method.clone()),
                source_from(locs, method_loc),
            );
        }
        id
    }
}
