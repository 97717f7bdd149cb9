//! Operand stack depth and local slot analysis for the code writer.

use std::collections::HashMap;

use crate::{
    model::{descriptor, opcodes::*, Code, Insn, Label},
    Result,
};

/// Net stack effect of an instruction, in slots.
fn stack_delta(insn: &Insn) -> Result<i32> {
    Ok(match insn {
        Insn::Simple(opcode) => simple_delta(*opcode),
        Insn::Int { opcode, .. } => {
            if *opcode == NEWARRAY {
                0
            } else {
                1
            }
        }
        Insn::Var { opcode, .. } => match *opcode {
            LLOAD | DLOAD => 2,
            ILOAD | FLOAD | ALOAD => 1,
            LSTORE | DSTORE => -2,
            ISTORE | FSTORE | ASTORE => -1,
            _ => 0,
        },
        Insn::Type { opcode, .. } => i32::from(*opcode == NEW),
        Insn::Field { opcode, desc, .. } => {
            let size = i32::from(descriptor::slots(desc));
            match *opcode {
                GETSTATIC => size,
                PUTSTATIC => -size,
                GETFIELD => size - 1,
                _ => -size - 1,
            }
        }
        Insn::Method { opcode, desc, .. } => {
            let receiver = i32::from(*opcode != INVOKESTATIC);
            i32::from(descriptor::return_slots(desc)?)
                - i32::from(descriptor::arg_slots(desc)?)
                - receiver
        }
        Insn::InvokeDynamic { desc, .. } => {
            i32::from(descriptor::return_slots(desc)?) - i32::from(descriptor::arg_slots(desc)?)
        }
        Insn::Jump { opcode, .. } => match *opcode {
            GOTO | JSR => 0,
            IF_ICMPEQ..=IF_ACMPNE => -2,
            _ => -1,
        },
        Insn::Ldc(constant) => {
            if constant.is_wide() {
                2
            } else {
                1
            }
        }
        Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => -1,
        Insn::MultiANewArray { dims, .. } => 1 - i32::from(*dims),
        Insn::Iinc { .. } | Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame { .. } => 0,
    })
}

fn simple_delta(opcode: u8) -> i32 {
    match opcode {
        ACONST_NULL..=ICONST_5 | FCONST_0..=FCONST_2 => 1,
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => 2,
        LALOAD | DALOAD => 0,
        IALOAD..=SALOAD => -1,
        LASTORE | DASTORE => -4,
        IASTORE..=SASTORE => -3,
        POP => -1,
        POP2 => -2,
        DUP | DUP_X1 | DUP_X2 => 1,
        DUP2 | DUP2_X1 | DUP2_X2 => 2,
        // add, sub, mul, div, rem in int, long, float, double order
        0x60..=0x73 => {
            if (opcode - 0x60) % 2 == 1 {
                -2
            } else {
                -1
            }
        }
        // shifts take an int count
        0x78..=0x7D => -1,
        // and, or, xor
        0x7E..=0x83 => {
            if (opcode - 0x7E) % 2 == 1 {
                -2
            } else {
                -1
            }
        }
        // i2l, i2d, f2l, f2d
        0x85 | 0x87 | 0x8C | 0x8D => 1,
        // l2i, l2f, d2i, d2f
        0x88 | 0x89 | 0x8E | 0x90 => -1,
        LCMP | 0x97 | DCMPG => -3,
        0x95 | 0x96 => -1,
        IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => -1,
        LRETURN | DRETURN => -2,
        _ => 0,
    }
}

/// Local slots written or read by an instruction, counted from zero.
fn local_extent(insn: &Insn) -> u32 {
    match insn {
        Insn::Var { opcode, var } => {
            let size = if matches!(*opcode, LLOAD | DLOAD | LSTORE | DSTORE) {
                2
            } else {
                1
            };
            u32::from(*var) + size
        }
        Insn::Iinc { var, .. } => u32::from(*var) + 1,
        _ => 0,
    }
}

/// Computes `max_stack` by walking every reachable path, and `max_locals` from the
/// descriptor, the variable instructions and the local variable table.
pub(crate) fn compute_maxs(code: &Code, desc: &str, is_static: bool) -> Result<(u16, u16)> {
    let insns: Vec<&Insn> = code.instructions.iter().collect();

    // A label resolves to the first real instruction at or after its position
    let mut label_targets: HashMap<Label, usize> = HashMap::new();
    let mut pending = Vec::new();
    for (index, insn) in insns.iter().enumerate() {
        match insn {
            Insn::Label(label) => pending.push(*label),
            _ if insn.is_marker() => {}
            _ => {
                for label in pending.drain(..) {
                    label_targets.insert(label, index);
                }
            }
        }
    }
    for label in pending {
        label_targets.insert(label, insns.len());
    }

    let mut depth: Vec<Option<i32>> = vec![None; insns.len() + 1];
    let mut worklist: Vec<usize> = Vec::new();
    let mut max_stack: i32 = 0;

    let enqueue = |index: usize, value: i32, depth: &mut Vec<Option<i32>>, worklist: &mut Vec<usize>| {
        if index < depth.len() && depth[index].is_none() {
            depth[index] = Some(value);
            worklist.push(index);
        }
    };

    enqueue(0, 0, &mut depth, &mut worklist);
    for block in &code.try_catch_blocks {
        if let Some(&handler) = label_targets.get(&block.handler) {
            max_stack = max_stack.max(1);
            enqueue(handler, 1, &mut depth, &mut worklist);
        }
    }

    while let Some(start) = worklist.pop() {
        let mut index = start;
        let mut current = depth[start].unwrap_or(0);
        while index < insns.len() {
            let insn = insns[index];
            if insn.is_marker() {
                index += 1;
                if index < depth.len() && depth[index].is_none() {
                    depth[index] = Some(current);
                }
                continue;
            }

            current = (current + stack_delta(insn)?).max(0);
            max_stack = max_stack.max(current);

            match insn {
                Insn::Jump { opcode, target } => {
                    let target = label_targets.get(target).copied().unwrap_or(insns.len());
                    let at_target = if *opcode == JSR { current + 1 } else { current };
                    max_stack = max_stack.max(at_target);
                    enqueue(target, at_target, &mut depth, &mut worklist);
                }
                Insn::TableSwitch {
                    default, targets, ..
                }
                | Insn::LookupSwitch {
                    default, targets, ..
                } => {
                    for label in std::iter::once(default).chain(targets.iter()) {
                        let target = label_targets.get(label).copied().unwrap_or(insns.len());
                        enqueue(target, current, &mut depth, &mut worklist);
                    }
                }
                _ => {}
            }

            if insn.is_terminal() {
                break;
            }
            index += 1;
            match depth.get(index) {
                Some(Some(_)) => break,
                Some(None) => depth[index] = Some(current),
                None => break,
            }
        }
    }

    let mut max_locals = u32::from(descriptor::arg_slots(desc)?) + u32::from(!is_static);
    for insn in &code.instructions {
        max_locals = max_locals.max(local_extent(insn));
    }
    for local in &code.local_variables {
        max_locals = max_locals.max(u32::from(local.index) + u32::from(descriptor::slots(&local.desc)));
    }

    let clamp = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
    Ok((clamp(max_stack as u32), clamp(max_locals)))
}
