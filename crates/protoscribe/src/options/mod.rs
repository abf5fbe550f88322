//! Option resolution for schema elements.
//!
//! Options on a descriptor element come from two places: fields of the
//! element's typed options message, and custom option extensions that the
//! typed structs cannot represent. The latter survive only as raw wire
//! bytes, so this module decodes them against an extension registry built
//! from the resolved file set, then merges both kinds into one ordered
//! option list carrying source placement information.

use std::collections::HashMap;

use prost_reflect::{DescriptorPool, DynamicMessage, ExtensionDescriptor, Kind};
use prost_types::{DescriptorProto, FileDescriptorSet};
use tracing::trace;

use crate::error::{Error, Result};
use crate::location::{ElementKind, LocId, LocationTree};
use crate::wire::{self, WireType};

pub mod value;

pub use value::OptionValue;

/// Field numbers below this are reserved for descriptor.proto's own option
/// fields; custom option extensions always number 1000 and above.
pub const MIN_CUSTOM_OPTION_NUMBER: u32 = 1000;

/// Extension fields of the resolved file set, keyed by the full name of
/// the options message they extend and their field number.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    by_target: HashMap<(String, u32), ExtensionDescriptor>,
}

impl ExtensionRegistry {
    /// Scan every file in the set, including dependencies, for declared
    /// extension fields.
    pub fn from_set(pool: &DescriptorPool, set: &FileDescriptorSet) -> ExtensionRegistry {
        let mut registry = ExtensionRegistry::default();
        for file in &set.file {
            let package = file.package();
            for ext in &file.extension {
                registry.register(pool, &scoped_name(package, ext.name()));
            }
            for message in &file.message_type {
                registry.scan_message(pool, &scoped_name(package, message.name()), message);
            }
        }
        registry
    }

    fn scan_message(&mut self, pool: &DescriptorPool, full_name: &str, message: &DescriptorProto) {
        for ext in &message.extension {
            self.register(pool, &scoped_name(full_name, ext.name()));
        }
        for nested in &message.nested_type {
            self.scan_message(pool, &scoped_name(full_name, nested.name()), nested);
        }
    }

    fn register(&mut self, pool: &DescriptorPool, full_name: &str) {
        if let Some(ext) = pool.get_extension_by_name(full_name) {
            let key = (
                ext.containing_message().full_name().to_string(),
                ext.number(),
            );
            self.by_target.insert(key, ext);
        }
    }

    /// Look up an extension by the options type it extends and its number.
    pub fn get(&self, containing: &str, number: u32) -> Option<&ExtensionDescriptor> {
        self.by_target.get(&(containing.to_string(), number))
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    /// True when no extensions were found in the set.
    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

fn scoped_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Decode custom option extensions from an options message's raw bytes.
///
/// Built-in option fields (numbers below 1000) are skipped; they are
/// already visible through the typed options structs. Everything else must
/// be a length-delimited message-typed extension known to the registry.
/// Repeated occurrences of one extension merge, matching wire semantics
/// for split sub-messages.
pub fn decode_extensions(
    registry: &ExtensionRegistry,
    options_type: &str,
    raw: &[u8],
) -> Result<Vec<(ExtensionDescriptor, DynamicMessage)>> {
    let mut payloads: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut position = 0;

    while position < raw.len() {
        let (field, consumed) = wire::read_field(&raw[position..])?;
        position += consumed;
        if field.number < MIN_CUSTOM_OPTION_NUMBER {
            continue;
        }
        if field.wire_type != WireType::Len {
            return Err(Error::UnsupportedWireType {
                message: options_type.to_string(),
                number: field.number,
                wire_type: field.wire_type as u8,
            });
        }
        match payloads.iter_mut().find(|(number, _)| *number == field.number) {
            Some((_, bytes)) => bytes.extend_from_slice(field.value),
            None => payloads.push((field.number, field.value.to_vec())),
        }
    }

    let mut out = Vec::with_capacity(payloads.len());
    for (number, bytes) in payloads {
        let ext = registry
            .get(options_type, number)
            .ok_or_else(|| Error::ExtensionNotFound {
                message: options_type.to_string(),
                number,
            })?;
        let Kind::Message(payload_type) = ext.kind() else {
            return Err(Error::UnsupportedWireType {
                message: options_type.to_string(),
                number,
                wire_type: WireType::Len as u8,
            });
        };
        trace!(extension = ext.full_name(), number, "decoded custom option");
        let message = DynamicMessage::decode(payload_type, bytes.as_slice())?;
        out.push((ext.clone(), message));
    }
    Ok(out)
}

/// Where an option's root field descriptor comes from.
#[derive(Debug, Clone)]
pub enum OptionRoot {
    /// A field of the standard options message
    Builtin {
        /// Field name as written in source
        name: &'static str,
        /// Field number within the options message
        number: i32,
    },
    /// A custom option extension
    Extension(ExtensionDescriptor),
}

impl OptionRoot {
    fn number(&self) -> i32 {
        match self {
            OptionRoot::Builtin { number, .. } => *number,
            OptionRoot::Extension(ext) => ext.number() as i32,
        }
    }
}

/// Source placement of one option, when its span could be resolved.
#[derive(Debug, Clone, Copy)]
pub struct OptionSourceInfo {
    /// Zero-based start line of the option in source
    pub start_line: i32,
    /// Option's span starts and ends on one line
    pub single_line: bool,
    /// Option sits on the same line its owning element starts on
    pub inline_with_parent: bool,
}

/// One resolved option on a schema element.
#[derive(Debug, Clone)]
pub struct OptionDefinition {
    /// Root field or extension the option is set through
    pub root: OptionRoot,
    /// Singular-message fields simplification has descended through
    pub sub_path: Vec<String>,
    /// Current value after simplification
    pub value: OptionValue,
    /// Source placement, absent when no unique location exists
    pub source: Option<OptionSourceInfo>,
    pub(crate) declaration_index: usize,
}

impl OptionDefinition {
    /// The option name as written in `.proto` source, extensions in
    /// parentheses, simplified sub-path appended.
    pub fn full_type(&self) -> String {
        let mut out = match &self.root {
            OptionRoot::Builtin { name, .. } => (*name).to_string(),
            OptionRoot::Extension(ext) => format!("({})", ext.full_name()),
        };
        for segment in &self.sub_path {
            out.push('.');
            out.push_str(segment);
        }
        out
    }

    /// Collapse chains of single-populated-field messages into the option
    /// name, up to `max_depth` segments.
    ///
    /// Never descends into a list or map value, and stops as soon as more
    /// than one field is populated.
    pub fn simplify(&mut self, max_depth: usize) {
        while self.sub_path.len() < max_depth {
            let OptionValue::Message(fields) = &self.value else {
                return;
            };
            let [(name, inner)] = fields.as_slice() else {
                return;
            };
            if matches!(inner, OptionValue::Array(_)) {
                return;
            }
            let name = name.clone();
            let inner = inner.clone();
            self.sub_path.push(name);
            self.value = inner;
        }
    }
}

/// Per-extension simplification depth policy.
///
/// Some option types are conventionally always written as a full brace
/// block; registering them with depth 0 keeps them that way even when
/// only one field is set.
#[derive(Debug, Clone)]
pub struct SimplifyPolicy {
    default_depth: usize,
    overrides: HashMap<String, usize>,
}

impl SimplifyPolicy {
    /// Default depth of 5 with no per-extension overrides.
    pub fn new() -> SimplifyPolicy {
        SimplifyPolicy {
            default_depth: 5,
            overrides: HashMap::new(),
        }
    }

    /// Change the default depth.
    pub fn with_default_depth(mut self, depth: usize) -> SimplifyPolicy {
        self.default_depth = depth;
        self
    }

    /// Pin a specific extension, by full name, to a depth.
    pub fn with_override(mut self, extension: impl Into<String>, depth: usize) -> SimplifyPolicy {
        self.overrides.insert(extension.into(), depth);
        self
    }

    /// Depth to apply for an option with the given root.
    pub fn depth_for(&self, root: &OptionRoot) -> usize {
        match root {
            OptionRoot::Builtin { .. } => 0,
            OptionRoot::Extension(ext) => self
                .overrides
                .get(ext.full_name())
                .copied()
                .unwrap_or(self.default_depth),
        }
    }
}

impl Default for SimplifyPolicy {
    /// The conventional policy: depth 5, HTTP binding annotations always
    /// printed as a block.
    fn default() -> SimplifyPolicy {
        SimplifyPolicy::new().with_override("google.api.http", 0)
    }
}

/// The typed options message of one element, with its built-in fields.
#[derive(Debug, Clone, Copy)]
pub enum TypedOptions<'a> {
    /// `FileOptions`
    File(Option<&'a prost_types::FileOptions>),
    /// `MessageOptions`
    Message(Option<&'a prost_types::MessageOptions>),
    /// `FieldOptions`
    Field(Option<&'a prost_types::FieldOptions>),
    /// `OneofOptions`
    Oneof(Option<&'a prost_types::OneofOptions>),
    /// `EnumOptions`
    Enum(Option<&'a prost_types::EnumOptions>),
    /// `EnumValueOptions`
    EnumValue(Option<&'a prost_types::EnumValueOptions>),
    /// `ServiceOptions`
    Service(Option<&'a prost_types::ServiceOptions>),
    /// `MethodOptions`
    Method(Option<&'a prost_types::MethodOptions>),
}

impl TypedOptions<'_> {
    /// Full name of the options message type, used for registry lookups
    /// and error context.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedOptions::File(_) => "google.protobuf.FileOptions",
            TypedOptions::Message(_) => "google.protobuf.MessageOptions",
            TypedOptions::Field(_) => "google.protobuf.FieldOptions",
            TypedOptions::Oneof(_) => "google.protobuf.OneofOptions",
            TypedOptions::Enum(_) => "google.protobuf.EnumOptions",
            TypedOptions::EnumValue(_) => "google.protobuf.EnumValueOptions",
            TypedOptions::Service(_) => "google.protobuf.ServiceOptions",
            TypedOptions::Method(_) => "google.protobuf.MethodOptions",
        }
    }

    fn builtins(&self) -> Vec<(OptionRoot, OptionValue)> {
        let mut out = BuiltinList::default();
        match self {
            TypedOptions::File(Some(opts)) => {
                out.string("java_package", 1, opts.java_package.as_deref());
                out.string("java_outer_classname", 8, opts.java_outer_classname.as_deref());
                out.enum_name(
                    "optimize_for",
                    9,
                    opts.optimize_for.map(|_| opts.optimize_for().as_str_name()),
                );
                out.bool("java_multiple_files", 10, opts.java_multiple_files);
                out.string("go_package", 11, opts.go_package.as_deref());
                out.bool("deprecated", 23, opts.deprecated);
                out.bool("cc_enable_arenas", 31, opts.cc_enable_arenas);
                out.string("objc_class_prefix", 36, opts.objc_class_prefix.as_deref());
                out.string("csharp_namespace", 37, opts.csharp_namespace.as_deref());
                out.string("php_namespace", 41, opts.php_namespace.as_deref());
                out.string("ruby_package", 45, opts.ruby_package.as_deref());
            }
            TypedOptions::Message(Some(opts)) => {
                out.bool("deprecated", 3, opts.deprecated);
            }
            TypedOptions::Field(Some(opts)) => {
                out.bool("packed", 2, opts.packed);
                out.bool("deprecated", 3, opts.deprecated);
            }
            TypedOptions::Enum(Some(opts)) => {
                out.bool("allow_alias", 2, opts.allow_alias);
                out.bool("deprecated", 3, opts.deprecated);
            }
            TypedOptions::EnumValue(Some(opts)) => {
                out.bool("deprecated", 1, opts.deprecated);
            }
            TypedOptions::Service(Some(opts)) => {
                out.bool("deprecated", 33, opts.deprecated);
            }
            TypedOptions::Method(Some(opts)) => {
                out.bool("deprecated", 33, opts.deprecated);
                out.enum_name(
                    "idempotency_level",
                    34,
                    opts.idempotency_level
                        .map(|_| opts.idempotency_level().as_str_name()),
                );
            }
            TypedOptions::Oneof(_) => {}
            _ => {}
        }
        out.items
    }
}

#[derive(Default)]
struct BuiltinList {
    items: Vec<(OptionRoot, OptionValue)>,
}

impl BuiltinList {
    fn push(&mut self, name: &'static str, number: i32, value: OptionValue) {
        self.items.push((OptionRoot::Builtin { name, number }, value));
    }

    fn bool(&mut self, name: &'static str, number: i32, value: Option<bool>) {
        if let Some(v) = value {
            self.push(name, number, OptionValue::Scalar(v.to_string()));
        }
    }

    fn string(&mut self, name: &'static str, number: i32, value: Option<&str>) {
        if let Some(v) = value {
            self.push(name, number, OptionValue::Scalar(value::quote_string(v)));
        }
    }

    fn enum_name(&mut self, name: &'static str, number: i32, value: Option<&'static str>) {
        if let Some(v) = value {
            self.push(name, number, OptionValue::Scalar(v.to_string()));
        }
    }
}

/// Shared inputs for option resolution across one file print.
pub struct OptionContext<'a> {
    /// Extension registry for the whole resolved set
    pub registry: &'a ExtensionRegistry,
    /// Location tree of the file being printed
    pub tree: &'a LocationTree,
    /// Simplification policy
    pub policy: &'a SimplifyPolicy,
}

/// Resolve the full ordered option list for one element.
///
/// `element` is the element's own location node; `element_start_line` its
/// span start, both absent when the file carries no source info. `raw`
/// holds the element's options sub-message bytes from the original
/// descriptor encoding, the only place custom extensions survive.
pub fn options_for(
    ctx: &OptionContext<'_>,
    element: Option<LocId>,
    element_kind: ElementKind,
    element_start_line: Option<i32>,
    typed: TypedOptions<'_>,
    raw: &[u8],
) -> Result<Vec<OptionDefinition>> {
    let mut roots = typed.builtins();
    for (ext, message) in decode_extensions(ctx.registry, typed.type_name(), raw)? {
        let fields = OptionValue::message_fields(&message)?;
        roots.push((OptionRoot::Extension(ext), OptionValue::Message(fields)));
    }

    let mut options = Vec::with_capacity(roots.len());
    for (declaration_index, (root, value)) in roots.into_iter().enumerate() {
        let source = element.and_then(|node| {
            let entry = ctx.tree.option_entry(node, element_kind, root.number())?;
            let span = entry.span?;
            Some(OptionSourceInfo {
                start_line: span.start_line,
                single_line: span.single_line(),
                inline_with_parent: span.single_line()
                    && element_start_line == Some(span.start_line),
            })
        });
        let mut option = OptionDefinition {
            root,
            sub_path: Vec::new(),
            value,
            source,
            declaration_index,
        };
        option.simplify(ctx.policy.depth_for(&option.root));
        options.push(option);
    }

    options.sort_by_key(|option| {
        (
            option.source.is_none(),
            option.source.map_or(i32::MAX, |s| s.start_line),
            option.declaration_index,
        )
    });
    Ok(options)
}
