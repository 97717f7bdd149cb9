//! Encoding of an instruction list into a `Code` attribute.
//!
//! Instruction sizes depend on offsets (switch padding) and offsets depend on sizes (wide
//! jumps), so the layout is computed to a fixed point before any byte is emitted: all
//! `goto`/`jsr` start short and are promoted to `goto_w`/`jsr_w` once their displacement
//! does not fit 16 bits.

use std::collections::{HashMap, HashSet};

use crate::{
    codec::{code::MethodContext, pool::PoolBuilder, stack},
    file::io::push_be,
    model::{opcodes::*, Code, Insn, Label, VerificationType},
    Error, Result,
};

/// Pool index an instruction refers to, interned before layout.
fn intern_operand(pool: &mut PoolBuilder, insn: &Insn) -> Result<u16> {
    match insn {
        Insn::Ldc(constant) => pool.constant(constant),
        Insn::Type { desc, .. } | Insn::MultiANewArray { desc, .. } => pool.class(desc),
        Insn::Field {
            owner, name, desc, ..
        } => pool.field_ref(owner, name, desc),
        Insn::Method {
            owner,
            name,
            desc,
            interface,
            ..
        } => pool.method_ref(owner, name, desc, *interface),
        Insn::InvokeDynamic {
            name,
            desc,
            bsm,
            args,
        } => pool.invoke_dynamic(name, desc, bsm, args),
        _ => Ok(0),
    }
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Encoded size of a node at `offset`.
fn insn_size(insn: &Insn, offset: usize, index: u16, wide_jump: bool) -> usize {
    match insn {
        Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame { .. } => 0,
        Insn::Simple(_) => 1,
        Insn::Int { opcode, .. } => {
            if *opcode == SIPUSH {
                3
            } else {
                2
            }
        }
        Insn::Var { opcode, var } => {
            if *var <= 3 && *opcode != RET {
                1
            } else if *var <= 255 {
                2
            } else {
                4
            }
        }
        Insn::Ldc(constant) => {
            if constant.is_wide() || index > 255 {
                3
            } else {
                2
            }
        }
        Insn::Type { .. } | Insn::Field { .. } => 3,
        Insn::Method { opcode, .. } => {
            if *opcode == INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Insn::InvokeDynamic { .. } => 5,
        Insn::Jump { .. } => {
            if wide_jump {
                5
            } else {
                3
            }
        }
        Insn::Iinc { var, incr } => {
            if *var <= 255 && i8::try_from(*incr).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::TableSwitch { targets, .. } => 1 + switch_padding(offset) + 12 + 4 * targets.len(),
        Insn::LookupSwitch { keys, .. } => 1 + switch_padding(offset) + 8 + 8 * keys.len(),
        Insn::MultiANewArray { .. } => 4,
    }
}

struct Layout {
    offsets: Vec<usize>,
    labels: HashMap<Label, usize>,
    code_len: usize,
}

fn compute_layout(insns: &[Insn], operands: &[u16], wide: &HashSet<usize>) -> Layout {
    let mut offsets = Vec::with_capacity(insns.len());
    let mut labels = HashMap::new();
    let mut offset = 0;
    for (index, insn) in insns.iter().enumerate() {
        offsets.push(offset);
        if let Insn::Label(label) = insn {
            labels.insert(*label, offset);
        }
        offset += insn_size(insn, offset, operands[index], wide.contains(&index));
    }
    Layout {
        offsets,
        labels,
        code_len: offset,
    }
}

/// Checks that every label is placed once and every referenced label is placed.
fn validate_labels(code: &Code, method: &str) -> Result<()> {
    let mut placed = HashSet::new();
    for label in code.instructions.placed_labels() {
        if !placed.insert(label) {
            return Err(Error::DuplicateLabel {
                method: method.to_string(),
            });
        }
    }

    let referenced = code
        .instructions
        .iter()
        .flat_map(Insn::referenced_labels)
        .chain(
            code.try_catch_blocks
                .iter()
                .flat_map(|b| [b.start, b.end, b.handler]),
        )
        .chain(code.local_variables.iter().flat_map(|l| [l.start, l.end]));
    for label in referenced {
        if !placed.contains(&label) {
            return Err(Error::DanglingLabel {
                method: method.to_string(),
            });
        }
    }
    Ok(())
}

fn write_verification_type(
    out: &mut Vec<u8>,
    pool: &mut PoolBuilder,
    labels: &HashMap<Label, usize>,
    ty: &VerificationType,
) -> Result<()> {
    match ty {
        VerificationType::Top => out.push(0),
        VerificationType::Integer => out.push(1),
        VerificationType::Float => out.push(2),
        VerificationType::Double => out.push(3),
        VerificationType::Long => out.push(4),
        VerificationType::Null => out.push(5),
        VerificationType::UninitializedThis => out.push(6),
        VerificationType::Object(name) => {
            out.push(7);
            push_be(out, pool.class(name)?);
        }
        VerificationType::Uninitialized(label) => {
            out.push(8);
            let offset = labels
                .get(label)
                .ok_or_else(|| malformed_error!("Uninitialized type refers to an unplaced label"))?;
            push_be(out, *offset as u16);
        }
    }
    Ok(())
}

/// Encodes the attribute payload of a method body.
pub(crate) fn assemble(
    code: &Code,
    method: &MethodContext<'_>,
    pool: &mut PoolBuilder,
    major_version: u16,
) -> Result<Vec<u8>> {
    let method_name = format!("{}.{}{}", method.owner, method.name, method.desc);
    validate_labels(code, &method_name)?;

    let insns: &[Insn] = &code.instructions;
    let operands = insns
        .iter()
        .map(|insn| intern_operand(pool, insn))
        .collect::<Result<Vec<_>>>()?;

    let mut wide: HashSet<usize> = HashSet::new();
    let layout = loop {
        let layout = compute_layout(insns, &operands, &wide);
        let mut promoted = false;
        for (index, insn) in insns.iter().enumerate() {
            if let Insn::Jump { opcode, target } = insn {
                if wide.contains(&index) {
                    continue;
                }
                let delta = layout.labels[target] as i64 - layout.offsets[index] as i64;
                if i16::try_from(delta).is_err() {
                    if *opcode == GOTO || *opcode == JSR {
                        wide.insert(index);
                        promoted = true;
                    } else {
                        return Err(Error::BranchOutOfRange {
                            method: method_name,
                        });
                    }
                }
            }
        }
        if !promoted {
            break layout;
        }
    };

    if layout.code_len == 0 {
        return Err(malformed_error!("Method {} has an empty body", method_name));
    }
    if layout.code_len > usize::from(u16::MAX) {
        return Err(Error::CodeTooLarge {
            method: method_name,
            size: layout.code_len,
        });
    }

    let bytecode = emit(insns, &operands, &wide, &layout)?;

    let (computed_stack, computed_locals) = stack::compute_maxs(code, method.desc, method.is_static)?;
    let mut out = Vec::with_capacity(bytecode.len() + 64);
    push_be(&mut out, code.max_stack.max(computed_stack));
    push_be(&mut out, code.max_locals.max(computed_locals));
    push_be(&mut out, bytecode.len() as u32);
    out.extend_from_slice(&bytecode);

    let label = |label: &Label| layout.labels[label];
    let handlers: Vec<_> = code
        .try_catch_blocks
        .iter()
        .filter(|block| label(&block.start) < label(&block.end))
        .collect();
    push_be(&mut out, handlers.len() as u16);
    for block in handlers {
        push_be(&mut out, label(&block.start) as u16);
        push_be(&mut out, label(&block.end) as u16);
        push_be(&mut out, label(&block.handler) as u16);
        let catch_type = match &block.catch_type {
            Some(name) => pool.class(name)?,
            None => 0,
        };
        push_be(&mut out, catch_type);
    }

    let mut attributes: Vec<(&str, Vec<u8>)> = Vec::new();

    let lines: Vec<(usize, u16)> = insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::LineNumber { line, start } => Some((label(start), *line)),
            _ => None,
        })
        .filter(|(offset, _)| *offset < layout.code_len)
        .collect();
    if !lines.is_empty() {
        let mut data = Vec::new();
        push_be(&mut data, lines.len() as u16);
        for (offset, line) in lines {
            push_be(&mut data, offset as u16);
            push_be(&mut data, line);
        }
        attributes.push(("LineNumberTable", data));
    }

    if !code.local_variables.is_empty() {
        let mut table = Vec::new();
        let mut types = Vec::new();
        let mut type_count = 0u16;
        for local in &code.local_variables {
            let start = label(&local.start);
            let length = label(&local.end).saturating_sub(start);
            push_be(&mut table, start as u16);
            push_be(&mut table, length as u16);
            push_be(&mut table, pool.utf8(&local.name)?);
            push_be(&mut table, pool.utf8(&local.desc)?);
            push_be(&mut table, local.index);
            if let Some(signature) = &local.signature {
                push_be(&mut types, start as u16);
                push_be(&mut types, length as u16);
                push_be(&mut types, pool.utf8(&local.name)?);
                push_be(&mut types, pool.utf8(signature)?);
                push_be(&mut types, local.index);
                type_count += 1;
            }
        }
        let mut data = Vec::new();
        push_be(&mut data, code.local_variables.len() as u16);
        data.extend(table);
        attributes.push(("LocalVariableTable", data));
        if type_count > 0 {
            let mut data = Vec::new();
            push_be(&mut data, type_count);
            data.extend(types);
            attributes.push(("LocalVariableTypeTable", data));
        }
    }

    if major_version >= 50 {
        // The last frame placed at an offset describes it
        let mut frames: Vec<(usize, &Vec<VerificationType>, &Vec<VerificationType>)> = Vec::new();
        for (index, insn) in insns.iter().enumerate() {
            if let Insn::Frame { locals, stack } = insn {
                let offset = layout.offsets[index];
                if offset >= layout.code_len {
                    continue;
                }
                match frames.last_mut() {
                    Some(last) if last.0 == offset => *last = (offset, locals, stack),
                    _ => frames.push((offset, locals, stack)),
                }
            }
        }
        if !frames.is_empty() {
            let mut data = Vec::new();
            push_be(&mut data, frames.len() as u16);
            let mut previous: Option<usize> = None;
            for (offset, locals, stack) in frames {
                let delta = match previous {
                    None => offset,
                    Some(previous) => offset - previous - 1,
                };
                previous = Some(offset);
                data.push(255);
                push_be(&mut data, delta as u16);
                push_be(&mut data, locals.len() as u16);
                for ty in locals {
                    write_verification_type(&mut data, pool, &layout.labels, ty)?;
                }
                push_be(&mut data, stack.len() as u16);
                for ty in stack {
                    write_verification_type(&mut data, pool, &layout.labels, ty)?;
                }
            }
            attributes.push(("StackMapTable", data));
        }
    }

    push_be(&mut out, attributes.len() as u16);
    for (name, data) in attributes {
        push_be(&mut out, pool.utf8(name)?);
        push_be(&mut out, data.len() as u32);
        out.extend(data);
    }
    Ok(out)
}

fn emit(insns: &[Insn], operands: &[u16], wide: &HashSet<usize>, layout: &Layout) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(layout.code_len);
    for (index, insn) in insns.iter().enumerate() {
        let offset = layout.offsets[index];
        let relative = |label: &Label| layout.labels[label] as i64 - offset as i64;
        match insn {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame { .. } => {}
            Insn::Simple(opcode) => out.push(*opcode),
            Insn::Int { opcode, operand } => {
                out.push(*opcode);
                if *opcode == SIPUSH {
                    push_be(&mut out, *operand as i16);
                } else {
                    out.push(*operand as u8);
                }
            }
            Insn::Var { opcode, var } => {
                if *var <= 3 && *opcode != RET {
                    let short = if *opcode >= ISTORE {
                        ISTORE_0 + (*opcode - ISTORE) * 4
                    } else {
                        ILOAD_0 + (*opcode - ILOAD) * 4
                    };
                    out.push(short + *var as u8);
                } else if *var <= 255 {
                    out.push(*opcode);
                    out.push(*var as u8);
                } else {
                    out.push(WIDE);
                    out.push(*opcode);
                    push_be(&mut out, *var);
                }
            }
            Insn::Ldc(constant) => {
                let index = operands[index];
                if constant.is_wide() {
                    out.push(LDC2_W);
                    push_be(&mut out, index);
                } else if index > 255 {
                    out.push(LDC_W);
                    push_be(&mut out, index);
                } else {
                    out.push(LDC);
                    out.push(index as u8);
                }
            }
            Insn::Type { opcode, .. } | Insn::Field { opcode, .. } => {
                out.push(*opcode);
                push_be(&mut out, operands[index]);
            }
            Insn::Method { opcode, desc, .. } => {
                out.push(*opcode);
                push_be(&mut out, operands[index]);
                if *opcode == INVOKEINTERFACE {
                    let count = crate::model::descriptor::arg_slots(desc)? + 1;
                    out.push(count as u8);
                    out.push(0);
                }
            }
            Insn::InvokeDynamic { .. } => {
                out.push(INVOKEDYNAMIC);
                push_be(&mut out, operands[index]);
                push_be(&mut out, 0u16);
            }
            Insn::Jump { opcode, target } => {
                let delta = relative(target);
                if wide.contains(&index) {
                    out.push(if *opcode == JSR { JSR_W } else { GOTO_W });
                    push_be(&mut out, delta as i32);
                } else {
                    out.push(*opcode);
                    push_be(&mut out, delta as i16);
                }
            }
            Insn::Iinc { var, incr } => {
                if *var <= 255 && i8::try_from(*incr).is_ok() {
                    out.push(IINC);
                    out.push(*var as u8);
                    out.push(*incr as u8);
                } else {
                    out.push(WIDE);
                    out.push(IINC);
                    push_be(&mut out, *var);
                    push_be(&mut out, *incr);
                }
            }
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                if i64::from(*high) - i64::from(*low) + 1 != targets.len() as i64 {
                    return Err(malformed_error!(
                        "tableswitch range {}..={} has {} targets",
                        low,
                        high,
                        targets.len()
                    ));
                }
                out.push(TABLESWITCH);
                out.resize(out.len() + switch_padding(offset), 0);
                push_be(&mut out, relative(default) as i32);
                push_be(&mut out, *low);
                push_be(&mut out, *high);
                for target in targets {
                    push_be(&mut out, relative(target) as i32);
                }
            }
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            } => {
                if keys.len() != targets.len() {
                    return Err(malformed_error!(
                        "lookupswitch has {} keys and {} targets",
                        keys.len(),
                        targets.len()
                    ));
                }
                out.push(LOOKUPSWITCH);
                out.resize(out.len() + switch_padding(offset), 0);
                push_be(&mut out, relative(default) as i32);
                push_be(&mut out, keys.len() as i32);
                for (key, target) in keys.iter().zip(targets) {
                    push_be(&mut out, *key);
                    push_be(&mut out, relative(target) as i32);
                }
            }
            Insn::MultiANewArray { dims, .. } => {
                out.push(MULTIANEWARRAY);
                push_be(&mut out, operands[index]);
                out.push(*dims);
            }
        }
    }
    Ok(out)
}
