//! Decoding of the `Code` attribute into an instruction list.
//!
//! Decoding runs in two steps. The bytecode is first decoded instruction by instruction,
//! creating a [`Label`] for every offset something refers to. The exception table, line
//! numbers, local variables and stack map frames are then decoded against the same offset
//! map, and everything is merged into one [`InsnList`] with the markers placed in front of
//! the instruction at their offset.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    codec::{pool::ConstantPool, ReadOptions},
    file::parser::Parser,
    model::{
        descriptor, opcodes::*, Code, Insn, InsnList, Label, LocalVariable, TryCatchBlock,
        VerificationType,
    },
    Result,
};

/// The method a code attribute belongs to.
pub(crate) struct MethodContext<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub desc: &'a str,
    pub is_static: bool,
}

/// Labels created on demand for byte offsets.
struct OffsetLabels {
    code_len: usize,
    labels: BTreeMap<usize, Label>,
}

impl OffsetLabels {
    fn at(&mut self, offset: i64) -> Result<Label> {
        let offset = usize::try_from(offset)
            .ok()
            .filter(|&offset| offset <= self.code_len)
            .ok_or_else(|| malformed_error!("Code offset {} outside of the method body", offset))?;
        Ok(*self.labels.entry(offset).or_insert_with(Label::new))
    }
}

struct StackMapFrame {
    offset: usize,
    locals: Vec<VerificationType>,
    stack: Vec<VerificationType>,
}

pub(crate) fn read_code(
    data: &[u8],
    pool: &ConstantPool,
    method: &MethodContext<'_>,
    options: ReadOptions,
) -> Result<Code> {
    let mut parser = Parser::new(data);
    let max_stack = parser.read_be::<u16>()?;
    let max_locals = parser.read_be::<u16>()?;
    let code_len = parser.read_be::<u32>()? as usize;
    if code_len == 0 || code_len > usize::from(u16::MAX) {
        return Err(malformed_error!(
            "Invalid code length {} in {}.{}{}",
            code_len,
            method.owner,
            method.name,
            method.desc
        ));
    }
    let bytecode = parser.read_bytes(code_len)?;

    let mut labels = OffsetLabels {
        code_len,
        labels: BTreeMap::new(),
    };
    let decoded = decode_instructions(bytecode, pool, &mut labels)?;

    let mut try_catch_blocks = Vec::new();
    let handler_count = parser.read_be::<u16>()?;
    for _ in 0..handler_count {
        let start = parser.read_be::<u16>()?;
        let end = parser.read_be::<u16>()?;
        let handler = parser.read_be::<u16>()?;
        let catch_type = pool.class_opt(parser.read_be()?)?;
        try_catch_blocks.push(TryCatchBlock {
            start: labels.at(i64::from(start))?,
            end: labels.at(i64::from(end))?,
            handler: labels.at(i64::from(handler))?,
            catch_type,
        });
    }

    let mut lines: Vec<(usize, u16)> = Vec::new();
    let mut local_variables = Vec::new();
    let mut local_types: Vec<(u16, u16, u16, String)> = Vec::new();
    let mut raw_locals: Vec<(u16, u16, u16)> = Vec::new();
    let mut frames = Vec::new();

    let attr_count = parser.read_be::<u16>()?;
    for _ in 0..attr_count {
        let name = pool.utf8(parser.read_be()?)?;
        let len = parser.read_be::<u32>()? as usize;
        match name {
            "LineNumberTable" if !options.skip_debug => parser.sub(len, |p| {
                let count = p.read_be::<u16>()?;
                for _ in 0..count {
                    let start = p.read_be::<u16>()?;
                    let line = p.read_be::<u16>()?;
                    labels.at(i64::from(start))?;
                    lines.push((usize::from(start), line));
                }
                Ok(())
            })?,
            "LocalVariableTable" if !options.skip_debug => parser.sub(len, |p| {
                let count = p.read_be::<u16>()?;
                for _ in 0..count {
                    let start = p.read_be::<u16>()?;
                    let length = p.read_be::<u16>()?;
                    let name = pool.utf8(p.read_be()?)?.to_string();
                    let desc = pool.utf8(p.read_be()?)?.to_string();
                    let index = p.read_be::<u16>()?;
                    local_variables.push(LocalVariable {
                        name,
                        desc,
                        signature: None,
                        start: labels.at(i64::from(start))?,
                        end: labels.at(i64::from(start) + i64::from(length))?,
                        index,
                    });
                    raw_locals.push((start, length, index));
                }
                Ok(())
            })?,
            "LocalVariableTypeTable" if !options.skip_debug => parser.sub(len, |p| {
                let count = p.read_be::<u16>()?;
                for _ in 0..count {
                    let start = p.read_be::<u16>()?;
                    let length = p.read_be::<u16>()?;
                    p.read_be::<u16>()?;
                    let signature = pool.utf8(p.read_be()?)?.to_string();
                    let index = p.read_be::<u16>()?;
                    local_types.push((start, length, index, signature));
                }
                Ok(())
            })?,
            "StackMapTable" => {
                frames = parser.sub(len, |p| read_stack_map(p, pool, method, &mut labels))?;
            }
            // Debug tables when skipped, code type annotations and unknown attributes
            _ => parser.advance_by(len)?,
        }
    }

    for (start, length, index, signature) in local_types {
        if let Some(position) = raw_locals
            .iter()
            .position(|&raw| raw == (start, length, index))
        {
            local_variables[position].signature = Some(signature);
        }
    }

    let instructions = merge(decoded, labels, lines, frames)?;
    Ok(Code {
        max_stack,
        max_locals,
        instructions,
        try_catch_blocks,
        local_variables,
    })
}

/// Places the markers in front of the instructions at their offsets.
fn merge(
    decoded: Vec<(usize, Insn)>,
    labels: OffsetLabels,
    lines: Vec<(usize, u16)>,
    frames: Vec<StackMapFrame>,
) -> Result<InsnList> {
    let boundaries: BTreeSet<usize> = decoded
        .iter()
        .map(|(offset, _)| *offset)
        .chain(std::iter::once(labels.code_len))
        .collect();
    if let Some(offset) = labels.labels.keys().find(|&&o| !boundaries.contains(&o)) {
        return Err(malformed_error!(
            "Code offset {} is not an instruction boundary",
            offset
        ));
    }
    if let Some(frame) = frames.iter().find(|f| !boundaries.contains(&f.offset)) {
        return Err(malformed_error!(
            "Stack map frame at {} is not on an instruction boundary",
            frame.offset
        ));
    }

    let mut markers: BTreeMap<usize, Vec<Insn>> = BTreeMap::new();
    for (&offset, &label) in &labels.labels {
        markers.entry(offset).or_default().push(Insn::Label(label));
    }
    for (offset, line) in lines {
        if let Some(&start) = labels.labels.get(&offset) {
            markers
                .entry(offset)
                .or_default()
                .push(Insn::LineNumber { line, start });
        }
    }
    for frame in frames {
        markers.entry(frame.offset).or_default().push(Insn::Frame {
            locals: frame.locals,
            stack: frame.stack,
        });
    }

    let mut list = InsnList::new();
    for (offset, insn) in decoded {
        if let Some(nodes) = markers.remove(&offset) {
            nodes.into_iter().for_each(|node| list.push(node));
        }
        list.push(insn);
    }
    for nodes in markers.into_values() {
        nodes.into_iter().for_each(|node| list.push(node));
    }
    Ok(list)
}

fn decode_instructions(
    bytecode: &[u8],
    pool: &ConstantPool,
    labels: &mut OffsetLabels,
) -> Result<Vec<(usize, Insn)>> {
    let mut parser = Parser::new(bytecode);
    let mut decoded = Vec::new();

    while parser.has_more_data() {
        let pc = parser.pos();
        let base = pc as i64;
        let opcode = parser.read_be::<u8>()?;
        let insn = match opcode {
            NOP..=DCONST_1 => Insn::Simple(opcode),
            BIPUSH => Insn::Int {
                opcode,
                operand: i32::from(parser.read_be::<i8>()?),
            },
            SIPUSH => Insn::Int {
                opcode,
                operand: i32::from(parser.read_be::<i16>()?),
            },
            LDC => Insn::Ldc(pool.constant(u16::from(parser.read_be::<u8>()?))?),
            LDC_W | LDC2_W => Insn::Ldc(pool.constant(parser.read_be()?)?),
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                opcode,
                var: u16::from(parser.read_be::<u8>()?),
            },
            ILOAD_0..=ALOAD_3 => {
                let n = opcode - ILOAD_0;
                Insn::Var {
                    opcode: ILOAD + n / 4,
                    var: u16::from(n % 4),
                }
            }
            ISTORE_0..=ASTORE_3 => {
                let n = opcode - ISTORE_0;
                Insn::Var {
                    opcode: ISTORE + n / 4,
                    var: u16::from(n % 4),
                }
            }
            IALOAD..=SALOAD | IASTORE..=LXOR | I2L..=DCMPG => Insn::Simple(opcode),
            IRETURN..=RETURN | ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => {
                Insn::Simple(opcode)
            }
            IINC => Insn::Iinc {
                var: u16::from(parser.read_be::<u8>()?),
                incr: i16::from(parser.read_be::<i8>()?),
            },
            IFEQ..=JSR | IFNULL | IFNONNULL => Insn::Jump {
                opcode,
                target: labels.at(base + i64::from(parser.read_be::<i16>()?))?,
            },
            GOTO_W | JSR_W => Insn::Jump {
                opcode: if opcode == GOTO_W { GOTO } else { JSR },
                target: labels.at(base + i64::from(parser.read_be::<i32>()?))?,
            },
            TABLESWITCH => {
                parser.align(4)?;
                let default = labels.at(base + i64::from(parser.read_be::<i32>()?))?;
                let low = parser.read_be::<i32>()?;
                let high = parser.read_be::<i32>()?;
                if high < low {
                    return Err(malformed_error!(
                        "tableswitch at {} has high {} below low {}",
                        pc,
                        high,
                        low
                    ));
                }
                let count = (i64::from(high) - i64::from(low) + 1) as usize;
                if count * 4 > parser.len() {
                    return Err(out_of_bounds_error!());
                }
                let targets = (0..count)
                    .map(|_| labels.at(base + i64::from(parser.read_be::<i32>()?)))
                    .collect::<Result<Vec<_>>>()?;
                Insn::TableSwitch {
                    low,
                    high,
                    default,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                parser.align(4)?;
                let default = labels.at(base + i64::from(parser.read_be::<i32>()?))?;
                let pairs = parser.read_be::<i32>()?;
                let pairs = usize::try_from(pairs)
                    .ok()
                    .filter(|&n| n * 8 <= parser.len())
                    .ok_or_else(|| malformed_error!("lookupswitch at {} has {} pairs", pc, pairs))?;
                let mut keys = Vec::with_capacity(pairs);
                let mut targets = Vec::with_capacity(pairs);
                for _ in 0..pairs {
                    keys.push(parser.read_be::<i32>()?);
                    targets.push(labels.at(base + i64::from(parser.read_be::<i32>()?))?);
                }
                Insn::LookupSwitch {
                    default,
                    keys,
                    targets,
                }
            }
            GETSTATIC..=PUTFIELD => {
                let (owner, name, desc, _) = pool.member_ref(parser.read_be()?)?;
                Insn::Field {
                    opcode,
                    owner,
                    name,
                    desc,
                }
            }
            INVOKEVIRTUAL..=INVOKEINTERFACE => {
                let (owner, name, desc, interface) = pool.member_ref(parser.read_be()?)?;
                if opcode == INVOKEINTERFACE {
                    parser.advance_by(2)?;
                }
                Insn::Method {
                    opcode,
                    owner,
                    name,
                    desc,
                    interface,
                }
            }
            INVOKEDYNAMIC => {
                let (name, desc, bsm, args) = pool.invoke_dynamic(parser.read_be()?)?;
                parser.advance_by(2)?;
                Insn::InvokeDynamic {
                    name,
                    desc,
                    bsm,
                    args,
                }
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
                opcode,
                desc: pool.class(parser.read_be()?)?.to_string(),
            },
            NEWARRAY => Insn::Int {
                opcode,
                operand: i32::from(parser.read_be::<u8>()?),
            },
            WIDE => {
                let widened = parser.read_be::<u8>()?;
                match widened {
                    IINC => Insn::Iinc {
                        var: parser.read_be()?,
                        incr: parser.read_be()?,
                    },
                    ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                        opcode: widened,
                        var: parser.read_be()?,
                    },
                    _ => {
                        return Err(malformed_error!(
                            "wide prefix before opcode {:#04x} at {}",
                            widened,
                            pc
                        ))
                    }
                }
            }
            MULTIANEWARRAY => Insn::MultiANewArray {
                desc: pool.class(parser.read_be()?)?.to_string(),
                dims: parser.read_be()?,
            },
            _ => return Err(malformed_error!("Invalid opcode {:#04x} at {}", opcode, pc)),
        };
        decoded.push((pc, insn));
    }

    Ok(decoded)
}

/// Computes the frame implied by the method descriptor at the start of the method.
pub(crate) fn initial_locals(method: &MethodContext<'_>) -> Result<Vec<VerificationType>> {
    let mut locals = Vec::new();
    if !method.is_static {
        if method.name == "<init>" && method.owner != "java/lang/Object" {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(method.owner.to_string()));
        }
    }
    let (args, _) = descriptor::split_method(method.desc)?;
    for arg in args {
        locals.push(match arg.as_bytes()[0] {
            b'Z' | b'B' | b'C' | b'S' | b'I' => VerificationType::Integer,
            b'F' => VerificationType::Float,
            b'J' => VerificationType::Long,
            b'D' => VerificationType::Double,
            b'L' => VerificationType::Object(arg[1..arg.len() - 1].to_string()),
            _ => VerificationType::Object(arg.to_string()),
        });
    }
    Ok(locals)
}

fn read_verification_type(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    labels: &mut OffsetLabels,
) -> Result<VerificationType> {
    let tag = parser.read_be::<u8>()?;
    Ok(match tag {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(pool.class(parser.read_be()?)?.to_string()),
        8 => VerificationType::Uninitialized(labels.at(i64::from(parser.read_be::<u16>()?))?),
        _ => return Err(malformed_error!("Invalid verification type tag {}", tag)),
    })
}

fn read_types(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    labels: &mut OffsetLabels,
    count: usize,
) -> Result<Vec<VerificationType>> {
    (0..count)
        .map(|_| read_verification_type(parser, pool, labels))
        .collect()
}

/// Expands the compressed frames into full frames.
fn read_stack_map(
    parser: &mut Parser<'_>,
    pool: &ConstantPool,
    method: &MethodContext<'_>,
    labels: &mut OffsetLabels,
) -> Result<Vec<StackMapFrame>> {
    let count = parser.read_be::<u16>()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut locals = initial_locals(method)?;
    let mut offset: Option<usize> = None;

    for _ in 0..count {
        let frame_type = parser.read_be::<u8>()?;
        let (delta, stack) = match frame_type {
            0..=63 => (usize::from(frame_type), Vec::new()),
            64..=127 => (
                usize::from(frame_type - 64),
                read_types(parser, pool, labels, 1)?,
            ),
            247 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                (delta, read_types(parser, pool, labels, 1)?)
            }
            248..=250 => {
                let chop = usize::from(251 - frame_type);
                if chop > locals.len() {
                    return Err(malformed_error!("chop_frame removes {} of {} locals", chop, locals.len()));
                }
                locals.truncate(locals.len() - chop);
                (usize::from(parser.read_be::<u16>()?), Vec::new())
            }
            251 => (usize::from(parser.read_be::<u16>()?), Vec::new()),
            252..=254 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                let added = read_types(parser, pool, labels, usize::from(frame_type - 251))?;
                locals.extend(added);
                (delta, Vec::new())
            }
            255 => {
                let delta = usize::from(parser.read_be::<u16>()?);
                let local_count = usize::from(parser.read_be::<u16>()?);
                locals = read_types(parser, pool, labels, local_count)?;
                let stack_count = usize::from(parser.read_be::<u16>()?);
                (delta, read_types(parser, pool, labels, stack_count)?)
            }
            _ => return Err(malformed_error!("Reserved stack map frame type {}", frame_type)),
        };

        let at = match offset {
            None => delta,
            Some(previous) => previous + delta + 1,
        };
        offset = Some(at);
        frames.push(StackMapFrame {
            offset: at,
            locals: locals.clone(),
            stack,
        });
    }

    Ok(frames)
}
