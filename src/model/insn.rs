//! Instruction sequences with label indirection.
//!
//! Branch targets, exception handler bounds, line numbers, local variable ranges and
//! uninitialized frame types refer to [`Label`] identities instead of byte offsets. A label
//! is placed by inserting an [`Insn::Label`] marker into the [`InsnList`]; offsets only exist
//! while the class writer lays out the code. Inserting or removing instructions therefore
//! never invalidates a reference.

use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU32, Ordering},
};

use crate::model::{opcodes, Constant, Handle};

static NEXT_LABEL: AtomicU32 = AtomicU32::new(1);

/// An opaque position marker inside an instruction list.
///
/// Every label is unique for the lifetime of the process, so labels of different methods
/// never alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    /// Creates a fresh label.
    #[must_use]
    pub fn new() -> Self {
        Label(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the process-unique id.
    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl Default for Label {
    fn default() -> Self {
        Label::new()
    }
}

/// A verification type of a stack map frame entry.
///
/// `Long` and `Double` occupy one entry but two local slots, as in the `StackMapTable`
/// attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// Unusable slot
    Top,
    /// `int`, `short`, `char`, `byte` or `boolean`
    Integer,
    /// `float`
    Float,
    /// `long`
    Long,
    /// `double`
    Double,
    /// The `null` reference
    Null,
    /// `this` before the super constructor ran
    UninitializedThis,
    /// An initialized reference; internal name or array descriptor
    Object(String),
    /// Result of the `new` instruction placed right after the label
    Uninitialized(Label),
}

/// One node of an instruction list.
///
/// `Label`, `LineNumber` and `Frame` are markers that take no space in the encoded code;
/// every other variant is a real instruction. Operands are stored in their most general form:
/// `iload_1` is `Var { opcode: ILOAD, var: 1 }`, `goto_w` is `Jump { opcode: GOTO, .. }`
/// and `ldc_w`/`ldc2_w` are `Ldc`.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Places a label at this position
    Label(Label),
    /// Source line of the code starting at `start`
    LineNumber {
        /// Line in the source file
        line: u16,
        /// Label of the first instruction of the line
        start: Label,
    },
    /// Stack map frame describing the state before the next instruction
    Frame {
        /// Local variable types
        locals: Vec<VerificationType>,
        /// Operand stack types, bottom first
        stack: Vec<VerificationType>,
    },
    /// An instruction without operands
    Simple(u8),
    /// `bipush`, `sipush` or `newarray`
    Int {
        /// The opcode
        opcode: u8,
        /// The immediate value, or the element type for `newarray`
        operand: i32,
    },
    /// Local variable loads and stores, and `ret`
    Var {
        /// The general-form opcode
        opcode: u8,
        /// Local variable slot
        var: u16,
    },
    /// `new`, `anewarray`, `checkcast` and `instanceof`
    Type {
        /// The opcode
        opcode: u8,
        /// Internal name, or array descriptor
        desc: String,
    },
    /// Field access
    Field {
        /// The opcode
        opcode: u8,
        /// Internal name of the referenced class
        owner: String,
        /// Field name
        name: String,
        /// Field descriptor
        desc: String,
    },
    /// Method invocation other than `invokedynamic`
    Method {
        /// The opcode
        opcode: u8,
        /// Internal name of the referenced class
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        desc: String,
        /// `true` if the owner is an interface
        interface: bool,
    },
    /// `invokedynamic`
    InvokeDynamic {
        /// Name passed to the bootstrap method
        name: String,
        /// Call site descriptor
        desc: String,
        /// Bootstrap method
        bsm: Handle,
        /// Static bootstrap arguments
        args: Vec<Constant>,
    },
    /// Conditional and unconditional branches
    Jump {
        /// The opcode, `goto`/`jsr` for the wide forms as well
        opcode: u8,
        /// Branch target
        target: Label,
    },
    /// `ldc`, `ldc_w` and `ldc2_w`
    Ldc(Constant),
    /// `iinc`
    Iinc {
        /// Local variable slot
        var: u16,
        /// Signed increment
        incr: i16,
    },
    /// `tableswitch`
    TableSwitch {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Target when no key matches
        default: Label,
        /// One target per key in `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target when no key matches
        default: Label,
        /// Sorted keys
        keys: Vec<i32>,
        /// One target per key
        targets: Vec<Label>,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array descriptor
        desc: String,
        /// Number of dimensions to allocate
        dims: u8,
    },
}

impl Insn {
    /// Returns the opcode, or `None` for markers.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame { .. } => None,
            Insn::Simple(opcode)
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. } => Some(*opcode),
            Insn::InvokeDynamic { .. } => Some(opcodes::INVOKEDYNAMIC),
            Insn::Ldc(_) => Some(opcodes::LDC),
            Insn::Iinc { .. } => Some(opcodes::IINC),
            Insn::TableSwitch { .. } => Some(opcodes::TABLESWITCH),
            Insn::LookupSwitch { .. } => Some(opcodes::LOOKUPSWITCH),
            Insn::MultiANewArray { .. } => Some(opcodes::MULTIANEWARRAY),
        }
    }

    /// Returns `true` for labels, line numbers and frames.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        self.opcode().is_none()
    }

    /// Returns the smallest instruction pushing the int `value`: `iconst_<n>`, `bipush`,
    /// `sipush` or `ldc`.
    #[must_use]
    pub fn int_push(value: i32) -> Insn {
        match value {
            -1..=5 => Insn::Simple((i32::from(opcodes::ICONST_0) + value) as u8),
            -128..=127 => Insn::Int {
                opcode: opcodes::BIPUSH,
                operand: value,
            },
            -32768..=32767 => Insn::Int {
                opcode: opcodes::SIPUSH,
                operand: value,
            },
            _ => Insn::Ldc(Constant::Int(value)),
        }
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Insn::Simple(opcode) => {
                (opcodes::IRETURN..=opcodes::RETURN).contains(opcode) || *opcode == opcodes::ATHROW
            }
            Insn::Jump { opcode, .. } => *opcode == opcodes::GOTO,
            Insn::Var { opcode, .. } => *opcode == opcodes::RET,
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => true,
            _ => false,
        }
    }

    /// Returns every label this node refers to, without the label it places.
    #[must_use]
    pub fn referenced_labels(&self) -> Vec<Label> {
        match self {
            Insn::LineNumber { start, .. } => vec![*start],
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Insn::Frame { locals, stack } => locals
                .iter()
                .chain(stack.iter())
                .filter_map(|ty| match ty {
                    VerificationType::Uninitialized(label) => Some(*label),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An ordered, editable instruction sequence.
///
/// Dereferences to `[Insn]` for reading and in-place edits; the structural edits passes need
/// (`insert`, `remove`, `splice`) are provided directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsnList {
    insns: Vec<Insn>,
}

impl InsnList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        InsnList { insns: Vec::new() }
    }

    /// Appends a node.
    pub fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    /// Inserts a node before `index`.
    pub fn insert(&mut self, index: usize, insn: Insn) {
        self.insns.insert(index, insn);
    }

    /// Removes and returns the node at `index`.
    pub fn remove(&mut self, index: usize) -> Insn {
        self.insns.remove(index)
    }

    /// Replaces the node at `index` with `replacement`, which may hold any number of nodes.
    pub fn splice(&mut self, index: usize, replacement: Vec<Insn>) {
        self.insns.splice(index..=index, replacement);
    }

    /// Appends all nodes of `other`.
    pub fn append(&mut self, other: InsnList) {
        self.insns.extend(other.insns);
    }

    /// Iterates over the real instructions, skipping markers.
    pub fn real(&self) -> impl Iterator<Item = &Insn> {
        self.insns.iter().filter(|insn| !insn.is_marker())
    }

    /// Returns the labels placed in this list, in order.
    #[must_use]
    pub fn placed_labels(&self) -> Vec<Label> {
        self.insns
            .iter()
            .filter_map(|insn| match insn {
                Insn::Label(label) => Some(*label),
                _ => None,
            })
            .collect()
    }

    /// Consumes the list and returns the nodes.
    #[must_use]
    pub fn into_vec(self) -> Vec<Insn> {
        self.insns
    }
}

impl Deref for InsnList {
    type Target = [Insn];

    fn deref(&self) -> &Self::Target {
        &self.insns
    }
}

impl DerefMut for InsnList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.insns
    }
}

impl From<Vec<Insn>> for InsnList {
    fn from(insns: Vec<Insn>) -> Self {
        InsnList { insns }
    }
}

impl FromIterator<Insn> for InsnList {
    fn from_iter<T: IntoIterator<Item = Insn>>(iter: T) -> Self {
        InsnList {
            insns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for InsnList {
    type Item = Insn;
    type IntoIter = std::vec::IntoIter<Insn>;

    fn into_iter(self) -> Self::IntoIter {
        self.insns.into_iter()
    }
}

impl<'a> IntoIterator for &'a InsnList {
    type Item = &'a Insn;
    type IntoIter = std::slice::Iter<'a, Insn>;

    fn into_iter(self) -> Self::IntoIter {
        self.insns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::opcodes::*;

    #[test]
    fn labels_are_unique() {
        let a = Label::new();
        let b = Label::new();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn int_push_picks_smallest_form() {
        assert_eq!(Insn::int_push(-1), Insn::Simple(ICONST_M1));
        assert_eq!(Insn::int_push(5), Insn::Simple(ICONST_5));
        assert_eq!(
            Insn::int_push(6),
            Insn::Int {
                opcode: BIPUSH,
                operand: 6
            }
        );
        assert_eq!(
            Insn::int_push(-129),
            Insn::Int {
                opcode: SIPUSH,
                operand: -129
            }
        );
        assert_eq!(Insn::int_push(40_000), Insn::Ldc(Constant::Int(40_000)));
    }

    #[test]
    fn splice_keeps_labels() {
        let start = Label::new();
        let mut list: InsnList = vec![
            Insn::Label(start),
            Insn::Ldc(Constant::String("x".into())),
            Insn::Simple(ARETURN),
        ]
        .into();
        list.splice(1, vec![Insn::int_push(0), Insn::Simple(NOP)]);
        assert_eq!(list.len(), 4);
        assert_eq!(list.placed_labels(), vec![start]);
        assert_eq!(list.real().count(), 3);
        assert!(list[3].is_terminal());
    }

    #[test]
    fn referenced_labels_of_switch() {
        let (d, a, b) = (Label::new(), Label::new(), Label::new());
        let insn = Insn::TableSwitch {
            low: 0,
            high: 1,
            default: d,
            targets: vec![a, b],
        };
        assert_eq!(insn.referenced_labels(), vec![d, a, b]);
        assert!(insn.is_terminal());
        assert_eq!(insn.opcode(), Some(TABLESWITCH));
    }
}
