//! Class file decoding.

use crate::{
    codec::{
        annotations::{
            read_annotations, read_element_value, read_parameter_annotations, read_type_annotations,
        },
        code::{read_code, MethodContext},
        pool::{ConstantPool, RawBootstrap},
        ReadOptions,
    },
    file::parser::Parser,
    model::{
        AccessFlags, Annotations, ClassFile, EnclosingMethod, Field, InnerClass, Method,
        Parameter, RawAttribute, RecordComponent,
    },
    Result,
};

const MAGIC: u32 = 0xCAFE_BABE;

/// An attribute whose payload has not been decoded yet.
struct PendingAttribute<'a> {
    name: String,
    data: &'a [u8],
}

struct PendingMember<'a> {
    access: AccessFlags,
    name: String,
    desc: String,
    attributes: Vec<PendingAttribute<'a>>,
}

fn read_attributes<'a>(
    parser: &mut Parser<'a>,
    pool: &ConstantPool,
) -> Result<Vec<PendingAttribute<'a>>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be()?)?.to_string();
        let len = parser.read_be::<u32>()? as usize;
        attributes.push(PendingAttribute {
            name,
            data: parser.read_bytes(len)?,
        });
    }
    Ok(attributes)
}

fn read_members<'a>(
    parser: &mut Parser<'a>,
    pool: &ConstantPool,
) -> Result<Vec<PendingMember<'a>>> {
    let count = parser.read_be::<u16>()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let access = AccessFlags::from_bits_retain(parser.read_be()?);
        let name = pool.utf8(parser.read_be()?)?.to_string();
        let desc = pool.utf8(parser.read_be()?)?.to_string();
        members.push(PendingMember {
            access,
            name,
            desc,
            attributes: read_attributes(parser, pool)?,
        });
    }
    Ok(members)
}

fn read_bootstrap_methods(data: &[u8]) -> Result<Vec<RawBootstrap>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut methods = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let handle = parser.read_be::<u16>()?;
        let arg_count = parser.read_be::<u16>()?;
        let args = (0..arg_count)
            .map(|_| parser.read_be::<u16>())
            .collect::<Result<Vec<_>>>()?;
        methods.push(RawBootstrap { handle, args });
    }
    Ok(methods)
}

fn class_list(data: &[u8], pool: &ConstantPool) -> Result<Vec<String>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    (0..count)
        .map(|_| Ok(pool.class(parser.read_be()?)?.to_string()))
        .collect()
}

/// Decodes the annotation attributes shared by classes, members and record components.
/// Returns `false` if `attribute` is not one of them.
fn read_annotation_attribute(
    attribute: &PendingAttribute<'_>,
    pool: &ConstantPool,
    annotations: &mut Annotations,
) -> Result<bool> {
    let mut parser = Parser::new(attribute.data);
    match attribute.name.as_str() {
        "RuntimeVisibleAnnotations" => annotations.visible = read_annotations(&mut parser, pool)?,
        "RuntimeInvisibleAnnotations" => {
            annotations.invisible = read_annotations(&mut parser, pool)?;
        }
        "RuntimeVisibleTypeAnnotations" => {
            annotations.visible_type = read_type_annotations(&mut parser, pool)?;
        }
        "RuntimeInvisibleTypeAnnotations" => {
            annotations.invisible_type = read_type_annotations(&mut parser, pool)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn raw(attribute: &PendingAttribute<'_>) -> RawAttribute {
    RawAttribute {
        name: attribute.name.clone(),
        data: attribute.data.to_vec(),
    }
}

fn decode_field(member: &PendingMember<'_>, pool: &ConstantPool) -> Result<Field> {
    let mut field = Field::new(member.access, member.name.as_str(), member.desc.as_str());
    for attribute in &member.attributes {
        if read_annotation_attribute(attribute, pool, &mut field.annotations)? {
            continue;
        }
        let mut parser = Parser::new(attribute.data);
        match attribute.name.as_str() {
            "ConstantValue" => field.value = Some(pool.constant(parser.read_be()?)?),
            "Signature" => field.signature = Some(pool.utf8(parser.read_be()?)?.to_string()),
            _ => field.attributes.push(raw(attribute)),
        }
    }
    Ok(field)
}

fn decode_method(
    member: &PendingMember<'_>,
    owner: &str,
    pool: &ConstantPool,
    options: ReadOptions,
) -> Result<Method> {
    let mut method = Method::new(member.access, member.name.as_str(), member.desc.as_str());
    for attribute in &member.attributes {
        if read_annotation_attribute(attribute, pool, &mut method.annotations)? {
            continue;
        }
        let mut parser = Parser::new(attribute.data);
        match attribute.name.as_str() {
            "Code" => {
                if !options.skip_code {
                    let context = MethodContext {
                        owner,
                        name: &member.name,
                        desc: &member.desc,
                        is_static: member.access.is_static(),
                    };
                    method.code = Some(read_code(attribute.data, pool, &context, options)?);
                }
            }
            "Exceptions" => method.exceptions = class_list(attribute.data, pool)?,
            "Signature" => method.signature = Some(pool.utf8(parser.read_be()?)?.to_string()),
            "MethodParameters" => {
                if !options.skip_debug {
                    let count = parser.read_be::<u8>()?;
                    for _ in 0..count {
                        let name = pool.utf8_opt(parser.read_be()?)?;
                        let access = AccessFlags::from_bits_retain(parser.read_be()?);
                        method.parameters.push(Parameter { name, access });
                    }
                }
            }
            "RuntimeVisibleParameterAnnotations" => {
                method.visible_parameter_annotations =
                    Some(read_parameter_annotations(&mut parser, pool)?);
            }
            "RuntimeInvisibleParameterAnnotations" => {
                method.invisible_parameter_annotations =
                    Some(read_parameter_annotations(&mut parser, pool)?);
            }
            "AnnotationDefault" => {
                method.annotation_default = Some(read_element_value(&mut parser, pool, 0)?);
            }
            _ => method.attributes.push(raw(attribute)),
        }
    }
    Ok(method)
}

fn decode_record(data: &[u8], pool: &ConstantPool) -> Result<Vec<RecordComponent>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut components = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be()?)?.to_string();
        let desc = pool.utf8(parser.read_be()?)?.to_string();
        let mut component = RecordComponent {
            name,
            desc,
            signature: None,
            annotations: Annotations::default(),
            attributes: Vec::new(),
        };
        for attribute in read_attributes(&mut parser, pool)? {
            if read_annotation_attribute(&attribute, pool, &mut component.annotations)? {
                continue;
            }
            match attribute.name.as_str() {
                "Signature" => {
                    let index = Parser::new(attribute.data).read_be()?;
                    component.signature = Some(pool.utf8(index)?.to_string());
                }
                _ => component.attributes.push(raw(&attribute)),
            }
        }
        components.push(component);
    }
    Ok(components)
}

/// Decodes a class file.
pub(crate) fn read(data: &[u8], options: ReadOptions) -> Result<ClassFile> {
    let mut parser = Parser::new(data);
    if parser.read_be::<u32>()? != MAGIC {
        return Err(malformed_error!("Missing class file magic"));
    }
    let minor_version = parser.read_be::<u16>()?;
    let major_version = parser.read_be::<u16>()?;

    let mut pool = ConstantPool::parse(&mut parser)?;

    let access = AccessFlags::from_bits_retain(parser.read_be()?);
    let this_index = parser.read_be::<u16>()?;
    let super_index = parser.read_be::<u16>()?;
    let interface_count = parser.read_be::<u16>()?;
    let interface_indices = (0..interface_count)
        .map(|_| parser.read_be::<u16>())
        .collect::<Result<Vec<_>>>()?;

    // Everything referring to the pool is collected first so the bootstrap table, which
    // follows the members, is known before any invokedynamic is decoded
    let (raw_fields, raw_methods, raw_attributes) = {
        let mut scan = parser.clone();
        skip_members(&mut scan)?;
        skip_members(&mut scan)?;
        if let Some(bootstrap) = find_bootstrap(&mut scan, &pool)? {
            pool.set_bootstrap(bootstrap);
        }

        let fields = read_members(&mut parser, &pool)?;
        let methods = read_members(&mut parser, &pool)?;
        let attributes = read_attributes(&mut parser, &pool)?;
        (fields, methods, attributes)
    };

    let mut class = ClassFile::new(pool.class(this_index)?, None);
    class.minor_version = minor_version;
    class.major_version = major_version;
    class.access = access;
    class.super_name = pool.class_opt(super_index)?;
    class.interfaces = interface_indices
        .into_iter()
        .map(|index| Ok(pool.class(index)?.to_string()))
        .collect::<Result<Vec<_>>>()?;

    class.fields = raw_fields
        .iter()
        .map(|member| decode_field(member, &pool))
        .collect::<Result<Vec<_>>>()?;
    let owner = class.name.clone();
    class.methods = raw_methods
        .iter()
        .map(|member| decode_method(member, &owner, &pool, options))
        .collect::<Result<Vec<_>>>()?;

    for attribute in &raw_attributes {
        if read_annotation_attribute(attribute, &pool, &mut class.annotations)? {
            continue;
        }
        let mut parser = Parser::new(attribute.data);
        match attribute.name.as_str() {
            "BootstrapMethods" => {}
            "SourceFile" => {
                if !options.skip_debug {
                    class.source_file = Some(pool.utf8(parser.read_be()?)?.to_string());
                }
            }
            "SourceDebugExtension" => {
                if !options.skip_debug {
                    class.source_debug = Some(attribute.data.to_vec());
                }
            }
            "Signature" => class.signature = Some(pool.utf8(parser.read_be()?)?.to_string()),
            "InnerClasses" => {
                let count = parser.read_be::<u16>()?;
                for _ in 0..count {
                    let inner = pool.class(parser.read_be()?)?.to_string();
                    let outer = pool.class_opt(parser.read_be()?)?;
                    let inner_name = pool.utf8_opt(parser.read_be()?)?;
                    let access = AccessFlags::from_bits_retain(parser.read_be()?);
                    class.inner_classes.push(InnerClass {
                        inner,
                        outer,
                        inner_name,
                        access,
                    });
                }
            }
            "EnclosingMethod" => {
                let owner = pool.class(parser.read_be()?)?.to_string();
                let nat = parser.read_be::<u16>()?;
                let method = if nat == 0 {
                    None
                } else {
                    let (name, desc) = pool.name_and_type(nat)?;
                    Some((name.to_string(), desc.to_string()))
                };
                class.enclosing_method = Some(EnclosingMethod { owner, method });
            }
            "NestHost" => class.nest_host = Some(pool.class(parser.read_be()?)?.to_string()),
            "NestMembers" => class.nest_members = class_list(attribute.data, &pool)?,
            "PermittedSubclasses" => {
                class.permitted_subclasses = class_list(attribute.data, &pool)?;
            }
            "Record" => class.record_components = Some(decode_record(attribute.data, &pool)?),
            _ => class.attributes.push(raw(attribute)),
        }
    }

    if class.needs_source_pool() {
        class.set_source_pool(pool.share());
    }
    Ok(class)
}

/// Skips over a field or method table.
fn skip_members(parser: &mut Parser<'_>) -> Result<()> {
    let count = parser.read_be::<u16>()?;
    for _ in 0..count {
        parser.advance_by(6)?;
        skip_attributes(parser)?;
    }
    Ok(())
}

fn skip_attributes(parser: &mut Parser<'_>) -> Result<()> {
    let count = parser.read_be::<u16>()?;
    for _ in 0..count {
        parser.advance_by(2)?;
        let len = parser.read_be::<u32>()? as usize;
        parser.advance_by(len)?;
    }
    Ok(())
}

fn find_bootstrap(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Option<Vec<RawBootstrap>>> {
    let count = parser.read_be::<u16>()?;
    for _ in 0..count {
        let name = pool.utf8(parser.read_be()?)?;
        let len = parser.read_be::<u32>()? as usize;
        let data = parser.read_bytes(len)?;
        if name == "BootstrapMethods" {
            return read_bootstrap_methods(data).map(Some);
        }
    }
    Ok(None)
}
