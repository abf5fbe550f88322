//! Shared descriptor fixtures.
//!
//! The fixture set mirrors what a proto compiler front end would hand
//! over: a minimal slice of descriptor.proto, an annotations file
//! declaring a custom method option, and a proto3 file using it, complete
//! with `SourceCodeInfo`. Custom option bytes cannot be expressed through
//! the typed structs, so [`test_set_bytes`] splices them in by hand.

use bytes::Bytes;
use prost::Message;
use prost_types::descriptor_proto::ExtensionRange;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, MethodDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto, SourceCodeInfo,
};

/// Extension number of `test.annotations.http`.
pub(crate) const HTTP_EXT_NUMBER: u32 = 72_295_728;
/// Extension number of `test.annotations.http_extra`.
pub(crate) const HTTP_EXTRA_EXT_NUMBER: u32 = 72_295_729;
/// Extension number of `test.annotations.note`.
pub(crate) const NOTE_EXT_NUMBER: u32 = 72_295_730;

pub(crate) fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

pub(crate) fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, Type::Message)
    }
}

fn location(path: &[i32], span: &[i32]) -> Location {
    Location {
        path: path.to_vec(),
        span: span.to_vec(),
        ..Default::default()
    }
}

// Just enough of descriptor.proto for option extensions to resolve.
// Left proto2 (no syntax), like the real file.
pub(crate) fn descriptor_file() -> FileDescriptorProto {
    let options_range = ExtensionRange {
        start: Some(1000),
        end: Some(536_870_912),
        ..Default::default()
    };
    FileDescriptorProto {
        name: Some("google/protobuf/descriptor.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("MethodOptions".to_string()),
                extension_range: vec![options_range.clone()],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("MessageOptions".to_string()),
                extension_range: vec![options_range.clone()],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("OneofOptions".to_string()),
                extension_range: vec![options_range],
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

pub(crate) fn annotations_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("test/annotations/annotations.proto".to_string()),
        package: Some("test.annotations".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["google/protobuf/descriptor.proto".to_string()],
        message_type: vec![DescriptorProto {
            name: Some("HttpRule".to_string()),
            field: vec![
                field("get", 1, Type::String),
                field("post", 2, Type::String),
                field("body", 3, Type::String),
            ],
            ..Default::default()
        }],
        // The two method extensions are deliberately separated by the
        // oneof extension; printing regroups them into one extend block.
        extension: vec![
            FieldDescriptorProto {
                extendee: Some(".google.protobuf.MethodOptions".to_string()),
                ..message_field("http", HTTP_EXT_NUMBER as i32, ".test.annotations.HttpRule")
            },
            FieldDescriptorProto {
                extendee: Some(".google.protobuf.OneofOptions".to_string()),
                ..message_field("note", NOTE_EXT_NUMBER as i32, ".test.annotations.HttpRule")
            },
            FieldDescriptorProto {
                extendee: Some(".google.protobuf.MethodOptions".to_string()),
                ..message_field(
                    "http_extra",
                    HTTP_EXTRA_EXT_NUMBER as i32,
                    ".test.annotations.HttpRule",
                )
            },
        ],
        ..Default::default()
    }
}

/// A file whose oneof carries `option (test.annotations.note)`; the
/// option bytes are spliced in by [`test_set_bytes`].
pub(crate) fn choice_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("test/v1/choice.proto".to_string()),
        package: Some("test.v1".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["test/annotations/annotations.proto".to_string()],
        message_type: vec![DescriptorProto {
            name: Some("Choice".to_string()),
            field: vec![
                FieldDescriptorProto {
                    oneof_index: Some(0),
                    ..field("a", 1, Type::String)
                },
                FieldDescriptorProto {
                    oneof_index: Some(0),
                    ..field("b", 2, Type::Int32)
                },
            ],
            oneof_decl: vec![OneofDescriptorProto {
                name: Some("kind".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn empty_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("test/v1/empty.proto".to_string()),
        package: Some("test.v1".to_string()),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// The main fixture file, with source locations matching this layout:
///
/// ```proto
///  0  syntax = "proto3";
///  2  package test.v1;
///  4  import "test/annotations/annotations.proto";
///  6  service FooService {
///  7    rpc GetFoo(GetFooRequest) returns (GetFooResponse) {
///  8      option (test.annotations.http) = {
///  9        get: "/foo"
/// 10      };
/// 11    }
/// 12  }
/// 14  // GetFooRequest asks for a foo.
/// 15  message GetFooRequest {
/// 16    string name = 1; // the foo name
/// 17    repeated int32 counts = 2;
/// 18  }
/// 20  message GetFooResponse {
/// 21    Status status = 1;
/// 22    map<string, string> labels = 2;
/// 23  }
/// 25  enum Status {
/// 26    STATUS_UNSPECIFIED = 0;
/// 27    STATUS_OK = 1;
/// 28  }
/// ```
pub(crate) fn test_file() -> FileDescriptorProto {
    let labels_entry = DescriptorProto {
        name: Some("LabelsEntry".to_string()),
        field: vec![field("key", 1, Type::String), field("value", 2, Type::String)],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    let request = DescriptorProto {
        name: Some("GetFooRequest".to_string()),
        field: vec![
            field("name", 1, Type::String),
            FieldDescriptorProto {
                label: Some(Label::Repeated as i32),
                ..field("counts", 2, Type::Int32)
            },
        ],
        ..Default::default()
    };
    let response = DescriptorProto {
        name: Some("GetFooResponse".to_string()),
        field: vec![
            FieldDescriptorProto {
                type_name: Some(".test.v1.Status".to_string()),
                ..field("status", 1, Type::Enum)
            },
            FieldDescriptorProto {
                label: Some(Label::Repeated as i32),
                ..message_field("labels", 2, ".test.v1.GetFooResponse.LabelsEntry")
            },
        ],
        nested_type: vec![labels_entry],
        ..Default::default()
    };
    let status = EnumDescriptorProto {
        name: Some("Status".to_string()),
        value: vec![
            EnumValueDescriptorProto {
                name: Some("STATUS_UNSPECIFIED".to_string()),
                number: Some(0),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("STATUS_OK".to_string()),
                number: Some(1),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let service = ServiceDescriptorProto {
        name: Some("FooService".to_string()),
        method: vec![MethodDescriptorProto {
            name: Some("GetFoo".to_string()),
            input_type: Some(".test.v1.GetFooRequest".to_string()),
            output_type: Some(".test.v1.GetFooResponse".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };

    let http_number = HTTP_EXT_NUMBER as i32;
    let mut locations = vec![
        location(&[12], &[0, 0, 18]),
        location(&[6, 0], &[6, 0, 12, 1]),
        location(&[6, 0, 2, 0], &[7, 2, 11, 3]),
        location(&[6, 0, 2, 0, 4, http_number], &[8, 4, 10, 6]),
        location(&[4, 0], &[15, 0, 18, 1]),
        location(&[4, 0, 2, 0], &[16, 2, 18]),
        location(&[4, 0, 2, 1], &[17, 2, 28]),
        location(&[4, 1], &[20, 0, 23, 1]),
        location(&[4, 1, 2, 0], &[21, 2, 19]),
        location(&[4, 1, 2, 1], &[22, 2, 31]),
        location(&[5, 0], &[25, 0, 28, 1]),
        location(&[5, 0, 2, 0], &[26, 2, 25]),
        location(&[5, 0, 2, 1], &[27, 2, 16]),
    ];
    locations[4].leading_comments = Some(" GetFooRequest asks for a foo.\n".to_string());
    locations[5].trailing_comments = Some(" the foo name\n".to_string());

    FileDescriptorProto {
        name: Some("test/v1/test.proto".to_string()),
        package: Some("test.v1".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec!["test/annotations/annotations.proto".to_string()],
        message_type: vec![request, response],
        enum_type: vec![status],
        service: vec![service],
        source_code_info: Some(SourceCodeInfo {
            location: locations,
        }),
        ..Default::default()
    }
}

/// The typed fixture set, without the custom option (typed structs
/// cannot carry it).
pub(crate) fn test_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![
            descriptor_file(),
            annotations_file(),
            empty_file(),
            test_file(),
            choice_file(),
        ],
    }
}

pub(crate) fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub(crate) fn encode_len_field(field: u32, payload: &[u8], out: &mut Vec<u8>) {
    encode_varint(((field as u64) << 3) | 2, out);
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

pub(crate) fn encode_string_field(field: u32, value: &str, out: &mut Vec<u8>) {
    encode_len_field(field, value.as_bytes(), out);
}

/// The encoded fixture set with `option (test.annotations.http) =
/// { get: "/foo" }` spliced onto `FooService.GetFoo`.
pub(crate) fn test_set_bytes() -> Bytes {
    let mut out = Vec::new();
    for file in test_set().file {
        let bytes = match file.name() {
            "test/v1/test.proto" => encode_test_file_with_http_option(&file),
            "test/v1/choice.proto" => encode_choice_file_with_oneof_option(&file),
            _ => file.encode_to_vec(),
        };
        // FileDescriptorSet.file
        encode_len_field(1, &bytes, &mut out);
    }
    Bytes::from(out)
}

fn encode_choice_file_with_oneof_option(file: &FileDescriptorProto) -> Vec<u8> {
    let mut file = file.clone();
    let message = file.message_type.pop().expect("fixture has one message");
    let mut bytes = file.encode_to_vec();

    // HttpRule { get: "/kind" }
    let mut rule = Vec::new();
    encode_string_field(1, "/kind", &mut rule);
    // OneofOptions with the extension set
    let mut oneof_options = Vec::new();
    encode_len_field(NOTE_EXT_NUMBER, &rule, &mut oneof_options);
    // OneofDescriptorProto { name, options }
    let mut oneof_bytes = Vec::new();
    encode_string_field(1, message.oneof_decl[0].name(), &mut oneof_bytes);
    encode_len_field(2, &oneof_options, &mut oneof_bytes);
    // DescriptorProto { name, field*, oneof_decl }
    let mut message_bytes = Vec::new();
    encode_string_field(1, message.name(), &mut message_bytes);
    for field in &message.field {
        encode_len_field(2, &field.encode_to_vec(), &mut message_bytes);
    }
    encode_len_field(8, &oneof_bytes, &mut message_bytes);
    // FileDescriptorProto.message_type
    encode_len_field(4, &message_bytes, &mut bytes);
    bytes
}

fn encode_test_file_with_http_option(file: &FileDescriptorProto) -> Vec<u8> {
    let mut file = file.clone();
    let service = file.service.pop().expect("fixture has one service");
    let mut bytes = file.encode_to_vec();

    // HttpRule { get: "/foo" }
    let mut http_rule = Vec::new();
    encode_string_field(1, "/foo", &mut http_rule);
    // MethodOptions with the extension set
    let mut method_options = Vec::new();
    encode_len_field(HTTP_EXT_NUMBER, &http_rule, &mut method_options);
    // MethodDescriptorProto.options
    let mut method_bytes = service.method[0].encode_to_vec();
    encode_len_field(4, &method_options, &mut method_bytes);
    // ServiceDescriptorProto { name, method }
    let mut service_bytes = Vec::new();
    encode_string_field(1, service.name(), &mut service_bytes);
    encode_len_field(2, &method_bytes, &mut service_bytes);
    // FileDescriptorProto.service
    encode_len_field(6, &service_bytes, &mut bytes);
    bytes
}
