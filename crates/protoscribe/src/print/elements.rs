//! Rendering of individual schema elements.
//!
//! Every level (file, message, service, enum) collects its children into
//! one ordered sequence, sorted by source start line when known and by a
//! fixed type precedence otherwise, then emits them with blank lines
//! reconstructing the grouping of the original file.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};

use crate::error::{Error, Result};
use crate::location::{path, ElementKind, LocId, Span};
use crate::options::{options_for, OptionDefinition, OptionValue, TypedOptions};
use crate::wire;

use super::{
    inline_trailing_comment, print_leading_comments, print_trailing_block, FileContext,
    PrintBuffer,
};

// Sentinel for "reserved to max": field numbers are exclusive-end, enum
// reserved ranges inclusive-end.
const MAX_FIELD_RANGE_END: i32 = 536_870_912;
const MAX_ENUM_RANGE_END: i32 = i32::MAX;

enum Member<'a> {
    Service(usize, &'a ServiceDescriptorProto),
    Message(usize, &'a DescriptorProto),
    Enum(usize, &'a EnumDescriptorProto),
    Field(usize, &'a FieldDescriptorProto),
    Oneof(usize, &'a OneofDescriptorProto, Vec<(usize, &'a FieldDescriptorProto)>),
}

struct Ordered<'a> {
    member: Member<'a>,
    type_order: u8,
    decl_index: usize,
    span: Option<Span>,
    loc: Option<LocId>,
    is_block: bool,
}

fn sort_members(items: &mut [Ordered<'_>]) {
    items.sort_by_key(|item| {
        (
            item.span.is_none(),
            item.span.map_or(i32::MAX, |s| s.start_line),
            item.type_order,
            item.decl_index,
        )
    });
}

// With known spans the original spacing wins; otherwise block-shaped
// declarations and type changes get a separating blank line.
fn needs_gap(prev: Option<&Ordered<'_>>, next: &Ordered<'_>, leading: bool) -> bool {
    let Some(prev) = prev else {
        return leading;
    };
    match (prev.span, next.span) {
        (Some(a), Some(b)) => b.start_line > a.end_line + 1 || prev.type_order != next.type_order,
        _ => prev.is_block || next.is_block || prev.type_order != next.type_order,
    }
}

fn raw_child<'a>(raw: &'a [u8], field: i32, index: usize) -> Result<&'a [u8]> {
    Ok(wire::nth_len_field(raw, field as u32, index)?.unwrap_or(&[]))
}

fn scoped(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Shorten a fully qualified type reference relative to the referencing
/// scope. Same-package references drop the shared package-and-nesting
/// prefix; cross-package references stay fully qualified.
pub(crate) fn relative_type_name(type_name: &str, package: &str, scope: &str) -> String {
    let full = type_name.trim_start_matches('.');
    if package.is_empty() || !full.starts_with(&format!("{}.", package)) {
        return full.to_string();
    }
    let full_parts: Vec<&str> = full.split('.').collect();
    let scope_parts: Vec<&str> = scope.split('.').collect();
    let mut common = 0;
    while common < scope_parts.len()
        && common + 1 < full_parts.len()
        && scope_parts[common] == full_parts[common]
    {
        common += 1;
    }
    full_parts[common..].join(".")
}

fn scalar_keyword(ty: Type) -> Option<&'static str> {
    match ty {
        Type::Double => Some("double"),
        Type::Float => Some("float"),
        Type::Int64 => Some("int64"),
        Type::Uint64 => Some("uint64"),
        Type::Int32 => Some("int32"),
        Type::Fixed64 => Some("fixed64"),
        Type::Fixed32 => Some("fixed32"),
        Type::Bool => Some("bool"),
        Type::String => Some("string"),
        Type::Bytes => Some("bytes"),
        Type::Uint32 => Some("uint32"),
        Type::Sfixed32 => Some("sfixed32"),
        Type::Sfixed64 => Some("sfixed64"),
        Type::Sint32 => Some("sint32"),
        Type::Sint64 => Some("sint64"),
        Type::Group | Type::Message | Type::Enum => None,
    }
}

fn field_type(ctx: &FileContext<'_>, field: &FieldDescriptorProto, scope: &str) -> Result<String> {
    match field.r#type() {
        Type::Message | Type::Enum => Ok(relative_type_name(
            field.type_name(),
            ctx.file.package(),
            scope,
        )),
        Type::Group => Err(Error::UnknownElementKind {
            kind: "group".to_string(),
            context: field.name().to_string(),
        }),
        other => match scalar_keyword(other) {
            Some(keyword) => Ok(keyword.to_string()),
            None => Err(Error::UnknownElementKind {
                kind: format!("{:?}", other),
                context: field.name().to_string(),
            }),
        },
    }
}

fn map_entry<'a>(
    container: Option<&'a DescriptorProto>,
    field: &FieldDescriptorProto,
) -> Option<&'a DescriptorProto> {
    if field.label() != Label::Repeated || field.r#type() != Type::Message {
        return None;
    }
    let container = container?;
    let entry_name = field.type_name().rsplit('.').next()?;
    container
        .nested_type
        .iter()
        .find(|nested| {
            nested.name() == entry_name
                && nested
                    .options
                    .as_ref()
                    .is_some_and(|options| options.map_entry())
        })
}

pub(crate) fn print_file_body(ctx: &FileContext<'_>, buf: &mut PrintBuffer) -> Result<()> {
    let root = ctx.tree.root();
    print_extend_blocks(
        ctx,
        buf,
        &ctx.file.extension,
        ctx.raw,
        path::FILE_EXTENSION,
        Some(root),
        ctx.file.package(),
    )?;

    let mut items = Vec::new();
    for (index, service) in ctx.file.service.iter().enumerate() {
        let loc = ctx.tree.type_child(root, path::FILE_SERVICE, index as i32);
        items.push(Ordered {
            member: Member::Service(index, service),
            type_order: 0,
            decl_index: index,
            span: loc.and_then(|l| ctx.tree.span(l)),
            loc,
            is_block: true,
        });
    }
    for (index, message) in ctx.file.message_type.iter().enumerate() {
        let loc = ctx.tree.type_child(root, path::FILE_MESSAGE, index as i32);
        items.push(Ordered {
            member: Member::Message(index, message),
            type_order: 1,
            decl_index: index,
            span: loc.and_then(|l| ctx.tree.span(l)),
            loc,
            is_block: true,
        });
    }
    for (index, enum_type) in ctx.file.enum_type.iter().enumerate() {
        let loc = ctx.tree.type_child(root, path::FILE_ENUM, index as i32);
        items.push(Ordered {
            member: Member::Enum(index, enum_type),
            type_order: 2,
            decl_index: index,
            span: loc.and_then(|l| ctx.tree.span(l)),
            loc,
            is_block: true,
        });
    }
    sort_members(&mut items);

    let mut prev: Option<&Ordered<'_>> = None;
    for item in &items {
        if needs_gap(prev, item, true) {
            buf.gap();
        }
        match &item.member {
            Member::Service(index, service) => {
                let raw = raw_child(ctx.raw, path::FILE_SERVICE, *index)?;
                print_service(ctx, buf, service, raw, item.loc)
                    .map_err(|err| err.in_element(service.name()))?;
            }
            Member::Message(index, message) => {
                let raw = raw_child(ctx.raw, path::FILE_MESSAGE, *index)?;
                print_message(ctx, buf, message, raw, item.loc, ctx.file.package())
                    .map_err(|err| err.in_element(message.name()))?;
            }
            Member::Enum(index, enum_type) => {
                let raw = raw_child(ctx.raw, path::FILE_ENUM, *index)?;
                print_enum(ctx, buf, enum_type, raw, item.loc)
                    .map_err(|err| err.in_element(enum_type.name()))?;
            }
            _ => {}
        }
        prev = Some(item);
    }
    Ok(())
}

fn print_message(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    message: &DescriptorProto,
    raw: &[u8],
    loc: Option<LocId>,
    scope: &str,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    let inner_scope = scoped(scope, message.name());

    let raw_options = wire::concat_len_fields(raw, path::MESSAGE_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::Message,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::Message(message.options.as_ref()),
        &raw_options,
    )?;

    let mut items = Vec::new();
    let mut printed_oneofs = vec![false; message.oneof_decl.len()];
    for (index, field) in message.field.iter().enumerate() {
        let synthetic = field.proto3_optional();
        match field.oneof_index {
            Some(oneof_index) if !synthetic => {
                let oneof_index = oneof_index as usize;
                if printed_oneofs[oneof_index] {
                    continue;
                }
                printed_oneofs[oneof_index] = true;
                let members: Vec<_> = message
                    .field
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| {
                        f.oneof_index == Some(oneof_index as i32) && !f.proto3_optional()
                    })
                    .collect();
                let loc = loc.and_then(|l| {
                    ctx.tree.type_child(l, path::MESSAGE_ONEOF, oneof_index as i32)
                });
                items.push(Ordered {
                    member: Member::Oneof(
                        oneof_index,
                        &message.oneof_decl[oneof_index],
                        members,
                    ),
                    type_order: 0,
                    decl_index: index,
                    span: loc.and_then(|l| ctx.tree.span(l)),
                    loc,
                    is_block: true,
                });
            }
            _ => {
                let field_loc =
                    loc.and_then(|l| ctx.tree.type_child(l, path::MESSAGE_FIELD, index as i32));
                items.push(Ordered {
                    member: Member::Field(index, field),
                    type_order: 0,
                    decl_index: index,
                    span: field_loc.and_then(|l| ctx.tree.span(l)),
                    loc: field_loc,
                    is_block: false,
                });
            }
        }
    }
    for (index, nested) in message.nested_type.iter().enumerate() {
        if nested.options.as_ref().is_some_and(|o| o.map_entry()) {
            continue;
        }
        let nested_loc =
            loc.and_then(|l| ctx.tree.type_child(l, path::MESSAGE_NESTED, index as i32));
        items.push(Ordered {
            member: Member::Message(index, nested),
            type_order: 1,
            decl_index: index,
            span: nested_loc.and_then(|l| ctx.tree.span(l)),
            loc: nested_loc,
            is_block: true,
        });
    }
    for (index, enum_type) in message.enum_type.iter().enumerate() {
        let enum_loc =
            loc.and_then(|l| ctx.tree.type_child(l, path::MESSAGE_ENUM, index as i32));
        items.push(Ordered {
            member: Member::Enum(index, enum_type),
            type_order: 2,
            decl_index: index,
            span: enum_loc.and_then(|l| ctx.tree.span(l)),
            loc: enum_loc,
            is_block: true,
        });
    }
    sort_members(&mut items);

    print_leading_comments(buf, entry);
    let has_body = !items.is_empty()
        || !options.is_empty()
        || !message.extension.is_empty()
        || !message.reserved_range.is_empty()
        || !message.reserved_name.is_empty();
    if !has_body {
        let trailing = inline_trailing_comment(entry).unwrap_or_default();
        buf.p(&format!("message {} {{}}{}", message.name(), trailing));
        print_trailing_block(buf, entry);
        return Ok(());
    }
    buf.p(&format!("message {} {{", message.name()));
    buf.indent();
    print_message_reserved(buf, message);
    print_extend_blocks(
        ctx,
        buf,
        &message.extension,
        raw,
        path::MESSAGE_EXTENSION,
        loc,
        &inner_scope,
    )?;
    for option in &options {
        print_option_statement(buf, option);
    }

    let mut prev: Option<&Ordered<'_>> = None;
    for item in &items {
        if needs_gap(prev, item, false) {
            buf.gap();
        }
        match &item.member {
            Member::Field(index, field) => {
                let field_raw = raw_child(raw, path::MESSAGE_FIELD, *index)?;
                print_field(ctx, buf, Some(message), field, field_raw, item.loc, &inner_scope, false)
                    .map_err(|err| err.in_element(field.name()))?;
            }
            Member::Oneof(index, oneof, members) => {
                print_oneof(
                    ctx,
                    buf,
                    message,
                    *index,
                    oneof,
                    members,
                    raw,
                    loc,
                    item.loc,
                    &inner_scope,
                )
                .map_err(|err| err.in_element(oneof.name()))?;
            }
            Member::Message(index, nested) => {
                let nested_raw = raw_child(raw, path::MESSAGE_NESTED, *index)?;
                print_message(ctx, buf, nested, nested_raw, item.loc, &inner_scope)
                    .map_err(|err| err.in_element(nested.name()))?;
            }
            Member::Enum(index, enum_type) => {
                let enum_raw = raw_child(raw, path::MESSAGE_ENUM, *index)?;
                print_enum(ctx, buf, enum_type, enum_raw, item.loc)
                    .map_err(|err| err.in_element(enum_type.name()))?;
            }
            Member::Service(..) => {}
        }
        prev = Some(item);
    }

    buf.outdent();
    close_block(buf, entry);
    Ok(())
}

// Single-line trailing comments attach to the closing brace; longer ones
// become standalone lines after the block.
fn close_block(buf: &mut PrintBuffer, entry: Option<&crate::location::LocationEntry>) {
    match inline_trailing_comment(entry) {
        Some(trailing) => buf.p(&format!("}}{}", trailing)),
        None => {
            buf.p("}");
            print_trailing_block(buf, entry);
        }
    }
}

fn print_message_reserved(buf: &mut PrintBuffer, message: &DescriptorProto) {
    if !message.reserved_range.is_empty() {
        let ranges: Vec<String> = message
            .reserved_range
            .iter()
            .map(|range| {
                let start = range.start();
                let end = range.end();
                if end == start + 1 {
                    start.to_string()
                } else if end >= MAX_FIELD_RANGE_END {
                    format!("{} to max", start)
                } else {
                    format!("{} to {}", start, end - 1)
                }
            })
            .collect();
        buf.p(&format!("reserved {};", ranges.join(", ")));
    }
    if !message.reserved_name.is_empty() {
        let names: Vec<String> = message
            .reserved_name
            .iter()
            .map(|name| format!("\"{}\"", name))
            .collect();
        buf.p(&format!("reserved {};", names.join(", ")));
    }
}

fn print_enum_reserved(buf: &mut PrintBuffer, enum_type: &EnumDescriptorProto) {
    if !enum_type.reserved_range.is_empty() {
        let ranges: Vec<String> = enum_type
            .reserved_range
            .iter()
            .map(|range| {
                let start = range.start();
                let end = range.end();
                if end == start {
                    start.to_string()
                } else if end >= MAX_ENUM_RANGE_END {
                    format!("{} to max", start)
                } else {
                    format!("{} to {}", start, end)
                }
            })
            .collect();
        buf.p(&format!("reserved {};", ranges.join(", ")));
    }
    if !enum_type.reserved_name.is_empty() {
        let names: Vec<String> = enum_type
            .reserved_name
            .iter()
            .map(|name| format!("\"{}\"", name))
            .collect();
        buf.p(&format!("reserved {};", names.join(", ")));
    }
}

#[allow(clippy::too_many_arguments)]
fn print_field(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    container: Option<&DescriptorProto>,
    field: &FieldDescriptorProto,
    raw: &[u8],
    loc: Option<LocId>,
    scope: &str,
    in_oneof: bool,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    print_leading_comments(buf, entry);

    let mut decl = String::new();
    let map = map_entry(container, field);
    if !in_oneof {
        if field.proto3_optional() {
            decl.push_str("optional ");
        } else if field.label() == Label::Repeated && map.is_none() {
            decl.push_str("repeated ");
        }
    }
    match map {
        Some(entry_type) => {
            let key = entry_type
                .field
                .iter()
                .find(|f| f.number() == 1)
                .map(|f| field_type(ctx, f, scope))
                .transpose()?
                .unwrap_or_else(|| "string".to_string());
            let value = entry_type
                .field
                .iter()
                .find(|f| f.number() == 2)
                .map(|f| field_type(ctx, f, scope))
                .transpose()?
                .unwrap_or_else(|| "string".to_string());
            decl.push_str(&format!("map<{}, {}> ", key, value));
        }
        None => {
            decl.push_str(&field_type(ctx, field, scope)?);
            decl.push(' ');
        }
    }
    decl.push_str(&format!("{} = {}", field.name(), field.number()));

    let raw_options = wire::concat_len_fields(raw, path::FIELD_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::Field,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::Field(field.options.as_ref()),
        &raw_options,
    )?;
    print_statement_with_options(buf, &decl, &options, entry);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn print_oneof(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    message: &DescriptorProto,
    oneof_index: usize,
    oneof: &OneofDescriptorProto,
    members: &[(usize, &FieldDescriptorProto)],
    message_raw: &[u8],
    message_loc: Option<LocId>,
    loc: Option<LocId>,
    scope: &str,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    print_leading_comments(buf, entry);
    buf.p(&format!("oneof {} {{", oneof.name()));
    buf.indent();

    let oneof_raw = raw_child(message_raw, path::MESSAGE_ONEOF, oneof_index)?;
    let raw_options = wire::concat_len_fields(oneof_raw, path::ONEOF_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::Oneof,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::Oneof(oneof.options.as_ref()),
        &raw_options,
    )?;
    for option in &options {
        print_option_statement(buf, option);
    }

    for (index, field) in members {
        let field_raw = raw_child(message_raw, path::MESSAGE_FIELD, *index)?;
        // Member fields record their locations under the message, not the
        // oneof declaration.
        let field_loc = message_loc
            .and_then(|l| ctx.tree.type_child(l, path::MESSAGE_FIELD, *index as i32));
        print_field(ctx, buf, Some(message), field, field_raw, field_loc, scope, true)
            .map_err(|err| err.in_element(field.name()))?;
    }
    buf.outdent();
    close_block(buf, entry);
    Ok(())
}

fn print_enum(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    enum_type: &EnumDescriptorProto,
    raw: &[u8],
    loc: Option<LocId>,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    let raw_options = wire::concat_len_fields(raw, path::ENUM_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::Enum,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::Enum(enum_type.options.as_ref()),
        &raw_options,
    )?;

    print_leading_comments(buf, entry);
    if enum_type.value.is_empty()
        && options.is_empty()
        && enum_type.reserved_range.is_empty()
        && enum_type.reserved_name.is_empty()
    {
        let trailing = inline_trailing_comment(entry).unwrap_or_default();
        buf.p(&format!("enum {} {{}}{}", enum_type.name(), trailing));
        print_trailing_block(buf, entry);
        return Ok(());
    }
    buf.p(&format!("enum {} {{", enum_type.name()));
    buf.indent();
    print_enum_reserved(buf, enum_type);
    for option in &options {
        print_option_statement(buf, option);
    }

    for (index, value) in enum_type.value.iter().enumerate() {
        let value_raw = raw_child(raw, path::ENUM_VALUE, index)?;
        let value_loc = loc.and_then(|l| ctx.tree.type_child(l, path::ENUM_VALUE, index as i32));
        print_enum_value(ctx, buf, value, value_raw, value_loc)
            .map_err(|err| err.in_element(value.name()))?;
    }

    buf.outdent();
    close_block(buf, entry);
    Ok(())
}

fn print_enum_value(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    value: &EnumValueDescriptorProto,
    raw: &[u8],
    loc: Option<LocId>,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    print_leading_comments(buf, entry);
    let decl = format!("{} = {}", value.name(), value.number());
    let raw_options = wire::concat_len_fields(raw, path::ENUM_VALUE_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::EnumValue,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::EnumValue(value.options.as_ref()),
        &raw_options,
    )?;
    print_statement_with_options(buf, &decl, &options, entry);
    Ok(())
}

fn print_service(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    service: &ServiceDescriptorProto,
    raw: &[u8],
    loc: Option<LocId>,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    let raw_options = wire::concat_len_fields(raw, path::SERVICE_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::Service,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::Service(service.options.as_ref()),
        &raw_options,
    )?;

    print_leading_comments(buf, entry);
    if service.method.is_empty() && options.is_empty() {
        let trailing = inline_trailing_comment(entry).unwrap_or_default();
        buf.p(&format!("service {} {{}}{}", service.name(), trailing));
        print_trailing_block(buf, entry);
        return Ok(());
    }
    buf.p(&format!("service {} {{", service.name()));
    buf.indent();
    for option in &options {
        print_option_statement(buf, option);
    }

    for (index, method) in service.method.iter().enumerate() {
        let method_raw = raw_child(raw, path::SERVICE_METHOD, index)?;
        let method_loc =
            loc.and_then(|l| ctx.tree.type_child(l, path::SERVICE_METHOD, index as i32));
        print_method(ctx, buf, method, method_raw, method_loc)
            .map_err(|err| err.in_element(method.name()))?;
    }

    buf.outdent();
    close_block(buf, entry);
    Ok(())
}

fn print_method(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    method: &MethodDescriptorProto,
    raw: &[u8],
    loc: Option<LocId>,
) -> Result<()> {
    let entry = loc.and_then(|l| ctx.tree.entry(l));
    print_leading_comments(buf, entry);

    let package = ctx.file.package();
    let input = relative_type_name(method.input_type(), package, package);
    let output = relative_type_name(method.output_type(), package, package);
    let client_stream = if method.client_streaming() { "stream " } else { "" };
    let server_stream = if method.server_streaming() { "stream " } else { "" };
    let signature = format!(
        "rpc {}({}{}) returns ({}{})",
        method.name(),
        client_stream,
        input,
        server_stream,
        output
    );

    let raw_options = wire::concat_len_fields(raw, path::METHOD_OPTIONS as u32)?;
    let options = options_for(
        &ctx.option_ctx(),
        loc,
        ElementKind::Method,
        entry.and_then(|e| e.span).map(|s| s.start_line),
        TypedOptions::Method(method.options.as_ref()),
        &raw_options,
    )?;
    if options.is_empty() {
        let trailing = inline_trailing_comment(entry).unwrap_or_default();
        buf.p(&format!("{} {{}}{}", signature, trailing));
        print_trailing_block(buf, entry);
        return Ok(());
    }

    buf.p(&format!("{} {{", signature));
    buf.indent();
    for option in &options {
        print_option_statement(buf, option);
    }
    buf.outdent();
    close_block(buf, entry);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn print_extend_blocks(
    ctx: &FileContext<'_>,
    buf: &mut PrintBuffer,
    extensions: &[FieldDescriptorProto],
    parent_raw: &[u8],
    extension_field: i32,
    parent_loc: Option<LocId>,
    scope: &str,
) -> Result<()> {
    if extensions.is_empty() {
        return Ok(());
    }
    // Group by containing type, in declaration order of first occurrence.
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (index, ext) in extensions.iter().enumerate() {
        match groups.iter_mut().find(|(extendee, _)| *extendee == ext.extendee()) {
            Some((_, indexes)) => indexes.push(index),
            None => groups.push((ext.extendee(), vec![index])),
        }
    }

    for (extendee, indexes) in groups {
        buf.gap();
        buf.p(&format!(
            "extend {} {{",
            relative_type_name(extendee, ctx.file.package(), scope)
        ));
        buf.indent();
        for index in indexes {
            let field = &extensions[index];
            let field_raw = raw_child(parent_raw, extension_field, index)?;
            let field_loc = parent_loc
                .and_then(|l| ctx.tree.type_child(l, extension_field, index as i32));
            print_field(ctx, buf, None, field, field_raw, field_loc, scope, false)
                .map_err(|err| err.in_element(field.name()))?;
        }
        buf.outdent();
        buf.p("}");
        buf.gap();
    }
    Ok(())
}

fn inline_value(option: &OptionDefinition) -> Option<String> {
    if option.source.is_some_and(|source| !source.single_line) {
        return None;
    }
    option.value.inline()
}

/// A freestanding `option name = value;` statement, inline when the value
/// has a one-line form and the source wrote it on one line.
pub(crate) fn print_option_statement(buf: &mut PrintBuffer, option: &OptionDefinition) {
    let name = option.full_type();
    match inline_value(option) {
        Some(inline) => buf.p(&format!("option {} = {};", name, inline)),
        None => print_option_block(buf, &format!("option {} = ", name), &option.value, ";"),
    }
}

// Statement line plus `[...]` option list, inline for exactly one
// inline-capable option, one option per line otherwise.
fn print_statement_with_options(
    buf: &mut PrintBuffer,
    decl: &str,
    options: &[OptionDefinition],
    entry: Option<&crate::location::LocationEntry>,
) {
    let trailing = inline_trailing_comment(entry).unwrap_or_default();
    match options {
        [] => buf.p(&format!("{};{}", decl, trailing)),
        // A lone option stays inline only when it was written on the
        // declaration's own line; a located block form stays a block.
        [single]
            if inline_value(single).is_some()
                && single.source.map_or(true, |source| source.inline_with_parent) =>
        {
            let inline = inline_value(single).unwrap_or_default();
            buf.p(&format!(
                "{} [{} = {}];{}",
                decl,
                single.full_type(),
                inline,
                trailing
            ));
        }
        _ => {
            buf.p(&format!("{} [", decl));
            buf.indent();
            for (index, option) in options.iter().enumerate() {
                let comma = if index + 1 == options.len() { "" } else { "," };
                match inline_value(option) {
                    Some(inline) => {
                        buf.p(&format!("{} = {}{}", option.full_type(), inline, comma))
                    }
                    None => print_option_block(
                        buf,
                        &format!("{} = ", option.full_type()),
                        &option.value,
                        comma,
                    ),
                }
            }
            buf.outdent();
            buf.p(&format!("];{}", trailing));
        }
    }
    if trailing.is_empty() {
        print_trailing_block(buf, entry);
    }
}

// Multi-line value rendering, text-format style: message fields one per
// line without separators, array elements comma-separated.
fn print_option_block(buf: &mut PrintBuffer, prefix: &str, value: &OptionValue, terminator: &str) {
    match value {
        OptionValue::Scalar(text) => buf.p(&format!("{}{}{}", prefix, text, terminator)),
        OptionValue::Message(fields) => {
            buf.p(&format!("{}{{", prefix));
            buf.indent();
            for (name, field_value) in fields {
                match field_value.inline() {
                    Some(inline) => buf.p(&format!("{}: {}", name, inline)),
                    None => print_option_block(buf, &format!("{}: ", name), field_value, ""),
                }
            }
            buf.outdent();
            buf.p(&format!("}}{}", terminator));
        }
        OptionValue::Array(items) => {
            buf.p(&format!("{}[", prefix));
            buf.indent();
            for (index, item) in items.iter().enumerate() {
                let comma = if index + 1 == items.len() { "" } else { "," };
                match item.inline() {
                    Some(inline) => buf.p(&format!("{}{}", inline, comma)),
                    None => print_option_block(buf, "", item, comma),
                }
            }
            buf.outdent();
            buf.p(&format!("]{}", terminator));
        }
    }
}
