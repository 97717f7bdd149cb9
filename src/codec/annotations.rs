//! Annotation attributes: element values, type annotations and parameter annotations.

use crate::{
    codec::pool::{ConstantPool, PoolBuilder},
    file::{io::push_be, parser::Parser},
    model::{Annotation, Constant, ElementValue, TypeAnnotation},
    Result,
};

/// Nesting limit for annotations inside annotations and arrays.
const MAX_NESTING: usize = 64;

fn int_value(pool: &ConstantPool, index: u16) -> Result<i32> {
    match pool.constant(index)? {
        Constant::Int(value) => Ok(value),
        other => Err(malformed_error!(
            "Expected Integer element value, found {:?}",
            other
        )),
    }
}

pub(crate) fn read_annotations(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let count = parser.read_be::<u16>()?;
    (0..count)
        .map(|_| read_annotation(parser, pool, 0))
        .collect()
}

pub(crate) fn read_parameter_annotations(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Vec<Annotation>>> {
    let count = parser.read_be::<u8>()?;
    (0..count)
        .map(|_| read_annotations(parser, pool))
        .collect()
}

pub(crate) fn read_type_annotations(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
) -> Result<Vec<TypeAnnotation>> {
    let count = parser.read_be::<u16>()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let start = parser.pos();
        let target_type = parser.read_be::<u8>()?;
        let info_len = match target_type {
            0x00 | 0x01 | 0x16 => 1,
            0x10 | 0x11 | 0x12 | 0x17 => 2,
            0x13..=0x15 => 0,
            _ => {
                return Err(malformed_error!(
                    "Type annotation target {:#04x} is not valid outside of code",
                    target_type
                ))
            }
        };
        parser.advance_by(info_len)?;
        let target = parser_window(parser, start)?;

        let path_start = parser.pos();
        let path_len = parser.read_be::<u8>()?;
        parser.advance_by(usize::from(path_len) * 2)?;
        let path = parser_window(parser, path_start)?;

        annotations.push(TypeAnnotation {
            target,
            path,
            annotation: read_annotation(parser, pool, 0)?,
        });
    }
    Ok(annotations)
}

/// Returns the bytes consumed since `start`.
fn parser_window(parser: &mut Parser<'_>, start: usize) -> Result<Vec<u8>> {
    let end = parser.pos();
    parser.seek(start)?;
    let bytes = parser.read_bytes(end - start)?.to_vec();
    Ok(bytes)
}

fn read_annotation(parser: &mut Parser<'_>, pool: &ConstantPool, depth: usize) -> Result<Annotation> {
    if depth > MAX_NESTING {
        return Err(crate::Error::RecursionLimit(MAX_NESTING));
    }
    let desc = pool.utf8(parser.read_be()?)?.to_string();
    let count = parser.read_be::<u16>()?;
    let mut values = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be()?)?.to_string();
        values.push((name, read_element_value(parser, pool, depth + 1)?));
    }
    Ok(Annotation { desc, values })
}

pub(crate) fn read_element_value(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<ElementValue> {
    if depth > MAX_NESTING {
        return Err(crate::Error::RecursionLimit(MAX_NESTING));
    }
    let tag = parser.read_be::<u8>()?;
    Ok(match tag {
        b'B' => ElementValue::Byte(int_value(pool, parser.read_be()?)? as i8),
        b'C' => ElementValue::Char(int_value(pool, parser.read_be()?)? as u16),
        b'S' => ElementValue::Short(int_value(pool, parser.read_be()?)? as i16),
        b'I' => ElementValue::Int(int_value(pool, parser.read_be()?)?),
        b'Z' => ElementValue::Boolean(int_value(pool, parser.read_be()?)? != 0),
        b'J' => match pool.constant(parser.read_be()?)? {
            Constant::Long(value) => ElementValue::Long(value),
            other => return Err(malformed_error!("Expected Long element value, found {:?}", other)),
        },
        b'F' => match pool.constant(parser.read_be()?)? {
            Constant::Float(value) => ElementValue::Float(value),
            other => return Err(malformed_error!("Expected Float element value, found {:?}", other)),
        },
        b'D' => match pool.constant(parser.read_be()?)? {
            Constant::Double(value) => ElementValue::Double(value),
            other => {
                return Err(malformed_error!(
                    "Expected Double element value, found {:?}",
                    other
                ))
            }
        },
        b's' => ElementValue::String(pool.utf8(parser.read_be()?)?.to_string()),
        b'e' => ElementValue::Enum {
            desc: pool.utf8(parser.read_be()?)?.to_string(),
            name: pool.utf8(parser.read_be()?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(parser.read_be()?)?.to_string()),
        b'@' => ElementValue::Annotation(read_annotation(parser, pool, depth + 1)?),
        b'[' => {
            let count = parser.read_be::<u16>()?;
            ElementValue::Array(
                (0..count)
                    .map(|_| read_element_value(parser, pool, depth + 1))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        _ => return Err(malformed_error!("Invalid element value tag {:#04x}", tag)),
    })
}

pub(crate) fn write_annotations(pool: &mut PoolBuilder, annotations: &[Annotation]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    push_be(&mut out, annotations.len() as u16);
    for annotation in annotations {
        write_annotation(&mut out, pool, annotation)?;
    }
    Ok(out)
}

pub(crate) fn write_parameter_annotations(
    pool: &mut PoolBuilder,
    parameters: &[Vec<Annotation>],
) -> Result<Vec<u8>> {
    let mut out = vec![parameters.len() as u8];
    for annotations in parameters {
        out.extend(write_annotations(pool, annotations)?);
    }
    Ok(out)
}

pub(crate) fn write_type_annotations(
    pool: &mut PoolBuilder,
    annotations: &[TypeAnnotation],
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    push_be(&mut out, annotations.len() as u16);
    for annotation in annotations {
        out.extend_from_slice(&annotation.target);
        out.extend_from_slice(&annotation.path);
        write_annotation(&mut out, pool, &annotation.annotation)?;
    }
    Ok(out)
}

fn write_annotation(out: &mut Vec<u8>, pool: &mut PoolBuilder, annotation: &Annotation) -> Result<()> {
    push_be(out, pool.utf8(&annotation.desc)?);
    push_be(out, annotation.values.len() as u16);
    for (name, value) in &annotation.values {
        push_be(out, pool.utf8(name)?);
        write_element_value(out, pool, value)?;
    }
    Ok(())
}

pub(crate) fn write_element_value(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    value: &ElementValue,
) -> Result<()> {
    match value {
        ElementValue::Byte(v) => {
            out.push(b'B');
            push_be(out, pool.integer(i32::from(*v))?);
        }
        ElementValue::Char(v) => {
            out.push(b'C');
            push_be(out, pool.integer(i32::from(*v))?);
        }
        ElementValue::Short(v) => {
            out.push(b'S');
            push_be(out, pool.integer(i32::from(*v))?);
        }
        ElementValue::Int(v) => {
            out.push(b'I');
            push_be(out, pool.integer(*v)?);
        }
        ElementValue::Boolean(v) => {
            out.push(b'Z');
            push_be(out, pool.integer(i32::from(*v))?);
        }
        ElementValue::Long(v) => {
            out.push(b'J');
            push_be(out, pool.long(*v)?);
        }
        ElementValue::Float(v) => {
            out.push(b'F');
            push_be(out, pool.float(*v)?);
        }
        ElementValue::Double(v) => {
            out.push(b'D');
            push_be(out, pool.double(*v)?);
        }
        ElementValue::String(v) => {
            out.push(b's');
            push_be(out, pool.utf8(v)?);
        }
        ElementValue::Enum { desc, name } => {
            out.push(b'e');
            push_be(out, pool.utf8(desc)?);
            push_be(out, pool.utf8(name)?);
        }
        ElementValue::Class(desc) => {
            out.push(b'c');
            push_be(out, pool.utf8(desc)?);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(out, pool, annotation)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            push_be(out, values.len() as u16);
            for value in values {
                write_element_value(out, pool, value)?;
            }
        }
    }
    Ok(())
}
