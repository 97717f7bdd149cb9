//! Instruction sequence patterns.

use crate::{model::Insn, query::Query};

/// A sequence of queries matched one to one against the real instructions of a body.
///
/// Labels, line numbers and frames are skipped before matching, so a pattern describes the
/// semantic shape of a body regardless of how much debug information it carries.
///
/// # Examples
///
/// ```rust
/// use classveil::model::{builder::CodeBuilder, opcodes::*};
/// use classveil::query::{InsnPattern, Query, QueryKey};
///
/// let mut code = CodeBuilder::new();
/// code.line(4).aload(0).getfield("p/A", "x", "I").ireturn();
/// let body = code.build();
///
/// let getter = InsnPattern::new()
///     .then(Query::new().with(QueryKey::Opcode, ALOAD).with(QueryKey::Var, 0u16))
///     .then(Query::new().with(QueryKey::Opcode, GETFIELD).with(QueryKey::Name, "x"))
///     .then(Query::new().with(QueryKey::Opcode, IRETURN));
/// assert!(getter.matches(&body.instructions));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsnPattern {
    steps: Vec<Query>,
}

impl InsnPattern {
    /// Creates an empty pattern, which only matches bodies without real instructions.
    #[must_use]
    pub fn new() -> Self {
        InsnPattern::default()
    }

    /// Appends the query for the next real instruction.
    #[must_use]
    pub fn then(mut self, step: Query) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of real instructions the pattern describes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the pattern has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns `true` if the real instructions of `insns` match the steps exactly, with the
    /// same count.
    #[must_use]
    pub fn matches(&self, insns: &[Insn]) -> bool {
        let mut real = insns.iter().filter(|insn| !insn.is_marker());
        for step in &self.steps {
            match real.next() {
                Some(insn) if step.matches(insn) => {}
                _ => return false,
            }
        }
        real.next().is_none()
    }

    /// Returns the index of the first real instruction of every occurrence of the pattern as
    /// a run of consecutive real instructions.
    #[must_use]
    pub fn find(&self, insns: &[Insn]) -> Vec<usize> {
        let real: Vec<usize> = insns
            .iter()
            .enumerate()
            .filter(|(_, insn)| !insn.is_marker())
            .map(|(index, _)| index)
            .collect();
        if self.steps.is_empty() || real.len() < self.steps.len() {
            return Vec::new();
        }

        real.windows(self.steps.len())
            .filter(|window| {
                window
                    .iter()
                    .zip(&self.steps)
                    .all(|(&index, step)| step.matches(&insns[index]))
            })
            .map(|window| window[0])
            .collect()
    }
}
