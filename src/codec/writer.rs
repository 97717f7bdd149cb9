//! Class file encoding.

use crate::{
    codec::{
        annotations::{
            write_annotations, write_element_value, write_parameter_annotations,
            write_type_annotations,
        },
        assemble::assemble,
        code::MethodContext,
        pool::PoolBuilder,
    },
    file::io::push_be,
    model::{Annotations, ClassFile, Constant, Field, Method, RawAttribute, RecordComponent},
    Result,
};

const MAGIC: u32 = 0xCAFE_BABE;

/// Attributes of one structure, collected before the count is known.
#[derive(Default)]
struct AttributeTable {
    entries: Vec<(u16, Vec<u8>)>,
}

impl AttributeTable {
    fn add(&mut self, pool: &mut PoolBuilder, name: &str, data: Vec<u8>) -> Result<()> {
        let name = pool.utf8(name)?;
        self.entries.push((name, data));
        Ok(())
    }

    fn add_index(&mut self, pool: &mut PoolBuilder, name: &str, index: u16) -> Result<()> {
        let mut data = Vec::with_capacity(2);
        push_be(&mut data, index);
        self.add(pool, name, data)
    }

    fn add_annotations(&mut self, pool: &mut PoolBuilder, annotations: &Annotations) -> Result<()> {
        if !annotations.visible.is_empty() {
            let data = write_annotations(pool, &annotations.visible)?;
            self.add(pool, "RuntimeVisibleAnnotations", data)?;
        }
        if !annotations.invisible.is_empty() {
            let data = write_annotations(pool, &annotations.invisible)?;
            self.add(pool, "RuntimeInvisibleAnnotations", data)?;
        }
        if !annotations.visible_type.is_empty() {
            let data = write_type_annotations(pool, &annotations.visible_type)?;
            self.add(pool, "RuntimeVisibleTypeAnnotations", data)?;
        }
        if !annotations.invisible_type.is_empty() {
            let data = write_type_annotations(pool, &annotations.invisible_type)?;
            self.add(pool, "RuntimeInvisibleTypeAnnotations", data)?;
        }
        Ok(())
    }

    fn add_raw(&mut self, pool: &mut PoolBuilder, attributes: &[RawAttribute]) -> Result<()> {
        for attribute in attributes {
            self.add(pool, &attribute.name, attribute.data.clone())?;
        }
        Ok(())
    }

    fn write(self, out: &mut Vec<u8>) {
        push_be(out, self.entries.len() as u16);
        for (name, data) in self.entries {
            push_be(out, name);
            push_be(out, data.len() as u32);
            out.extend(data);
        }
    }
}

fn class_list(pool: &mut PoolBuilder, names: &[String]) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(2 + names.len() * 2);
    push_be(&mut data, names.len() as u16);
    for name in names {
        push_be(&mut data, pool.class(name)?);
    }
    Ok(data)
}

fn write_field(out: &mut Vec<u8>, pool: &mut PoolBuilder, field: &Field) -> Result<()> {
    push_be(out, field.access.bits());
    push_be(out, pool.utf8(&field.name)?);
    push_be(out, pool.utf8(&field.desc)?);

    let mut attributes = AttributeTable::default();
    if let Some(value) = &field.value {
        let index = match value {
            Constant::Int(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)
            | Constant::String(_) => pool.constant(value)?,
            other => {
                return Err(malformed_error!(
                    "Field {} can not be initialized with {:?}",
                    field.name,
                    other
                ))
            }
        };
        attributes.add_index(pool, "ConstantValue", index)?;
    }
    if let Some(signature) = &field.signature {
        let index = pool.utf8(signature)?;
        attributes.add_index(pool, "Signature", index)?;
    }
    attributes.add_annotations(pool, &field.annotations)?;
    attributes.add_raw(pool, &field.attributes)?;
    attributes.write(out);
    Ok(())
}

fn write_method(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    class: &ClassFile,
    method: &Method,
) -> Result<()> {
    push_be(out, method.access.bits());
    push_be(out, pool.utf8(&method.name)?);
    push_be(out, pool.utf8(&method.desc)?);

    let mut attributes = AttributeTable::default();
    if let Some(code) = &method.code {
        let context = MethodContext {
            owner: &class.name,
            name: &method.name,
            desc: &method.desc,
            is_static: method.access.is_static(),
        };
        let data = assemble(code, &context, pool, class.major_version)?;
        attributes.add(pool, "Code", data)?;
    }
    if !method.exceptions.is_empty() {
        let data = class_list(pool, &method.exceptions)?;
        attributes.add(pool, "Exceptions", data)?;
    }
    if let Some(signature) = &method.signature {
        let index = pool.utf8(signature)?;
        attributes.add_index(pool, "Signature", index)?;
    }
    if !method.parameters.is_empty() {
        let mut data = vec![method.parameters.len() as u8];
        for parameter in &method.parameters {
            let name = match &parameter.name {
                Some(name) => pool.utf8(name)?,
                None => 0,
            };
            push_be(&mut data, name);
            push_be(&mut data, parameter.access.bits());
        }
        attributes.add(pool, "MethodParameters", data)?;
    }
    attributes.add_annotations(pool, &method.annotations)?;
    if let Some(parameters) = &method.visible_parameter_annotations {
        let data = write_parameter_annotations(pool, parameters)?;
        attributes.add(pool, "RuntimeVisibleParameterAnnotations", data)?;
    }
    if let Some(parameters) = &method.invisible_parameter_annotations {
        let data = write_parameter_annotations(pool, parameters)?;
        attributes.add(pool, "RuntimeInvisibleParameterAnnotations", data)?;
    }
    if let Some(value) = &method.annotation_default {
        let mut data = Vec::new();
        write_element_value(&mut data, pool, value)?;
        attributes.add(pool, "AnnotationDefault", data)?;
    }
    attributes.add_raw(pool, &method.attributes)?;
    attributes.write(out);
    Ok(())
}

fn record_payload(pool: &mut PoolBuilder, components: &[RecordComponent]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    push_be(&mut data, components.len() as u16);
    for component in components {
        push_be(&mut data, pool.utf8(&component.name)?);
        push_be(&mut data, pool.utf8(&component.desc)?);
        let mut attributes = AttributeTable::default();
        if let Some(signature) = &component.signature {
            let index = pool.utf8(signature)?;
            attributes.add_index(pool, "Signature", index)?;
        }
        attributes.add_annotations(pool, &component.annotations)?;
        attributes.add_raw(pool, &component.attributes)?;
        attributes.write(&mut data);
    }
    Ok(data)
}

/// Encodes a class file.
pub(crate) fn write(class: &ClassFile) -> Result<Vec<u8>> {
    let mut pool = match &class.source_pool {
        Some(source) => PoolBuilder::seeded(source),
        None => PoolBuilder::new(),
    };

    let mut body = Vec::new();
    push_be(&mut body, class.access.bits());
    push_be(&mut body, pool.class(&class.name)?);
    let super_index = match &class.super_name {
        Some(name) => pool.class(name)?,
        None => 0,
    };
    push_be(&mut body, super_index);
    push_be(&mut body, class.interfaces.len() as u16);
    for interface in &class.interfaces {
        push_be(&mut body, pool.class(interface)?);
    }

    push_be(&mut body, class.fields.len() as u16);
    for field in &class.fields {
        write_field(&mut body, &mut pool, field)?;
    }
    push_be(&mut body, class.methods.len() as u16);
    for method in &class.methods {
        write_method(&mut body, &mut pool, class, method)?;
    }

    let mut attributes = AttributeTable::default();
    if let Some(source_file) = &class.source_file {
        let index = pool.utf8(source_file)?;
        attributes.add_index(&mut pool, "SourceFile", index)?;
    }
    if let Some(debug) = &class.source_debug {
        attributes.add(&mut pool, "SourceDebugExtension", debug.clone())?;
    }
    if let Some(signature) = &class.signature {
        let index = pool.utf8(signature)?;
        attributes.add_index(&mut pool, "Signature", index)?;
    }
    if !class.inner_classes.is_empty() {
        let mut data = Vec::new();
        push_be(&mut data, class.inner_classes.len() as u16);
        for inner in &class.inner_classes {
            push_be(&mut data, pool.class(&inner.inner)?);
            let outer = match &inner.outer {
                Some(outer) => pool.class(outer)?,
                None => 0,
            };
            push_be(&mut data, outer);
            let name = match &inner.inner_name {
                Some(name) => pool.utf8(name)?,
                None => 0,
            };
            push_be(&mut data, name);
            push_be(&mut data, inner.access.bits());
        }
        attributes.add(&mut pool, "InnerClasses", data)?;
    }
    if let Some(enclosing) = &class.enclosing_method {
        let mut data = Vec::new();
        push_be(&mut data, pool.class(&enclosing.owner)?);
        let nat = match &enclosing.method {
            Some((name, desc)) => pool.name_and_type(name, desc)?,
            None => 0,
        };
        push_be(&mut data, nat);
        attributes.add(&mut pool, "EnclosingMethod", data)?;
    }
    if let Some(host) = &class.nest_host {
        let index = pool.class(host)?;
        attributes.add_index(&mut pool, "NestHost", index)?;
    }
    if !class.nest_members.is_empty() {
        let data = class_list(&mut pool, &class.nest_members)?;
        attributes.add(&mut pool, "NestMembers", data)?;
    }
    if !class.permitted_subclasses.is_empty() {
        let data = class_list(&mut pool, &class.permitted_subclasses)?;
        attributes.add(&mut pool, "PermittedSubclasses", data)?;
    }
    if let Some(components) = &class.record_components {
        let data = record_payload(&mut pool, components)?;
        attributes.add(&mut pool, "Record", data)?;
    }
    attributes.add_annotations(&mut pool, &class.annotations)?;
    attributes.add_raw(&mut pool, &class.attributes)?;
    if pool.has_bootstrap() {
        // Interning the attribute name never adds bootstrap entries
        let data = pool.bootstrap_payload();
        attributes.add(&mut pool, "BootstrapMethods", data)?;
    }
    attributes.write(&mut body);

    let mut out = Vec::with_capacity(body.len() + 1024);
    push_be(&mut out, MAGIC);
    push_be(&mut out, class.minor_version);
    push_be(&mut out, class.major_version);
    pool.write(&mut out)?;
    out.extend(body);
    Ok(out)
}

