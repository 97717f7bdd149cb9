use crate::{
    codec::{read_class, write_class, ReadOptions},
    model::LoadSet,
    obfuscate::{PassContext, Transform},
    Result,
};

/// Drops source file names, line numbers, local variable tables and parameter names.
///
/// Each class is written and read back with [`ReadOptions::without_debug`], so the reader
/// decides what counts as debug information and the label bookkeeping is rebuilt from
/// scratch.
#[derive(Debug, Default)]
pub struct DebugInfoStripper;

impl DebugInfoStripper {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        DebugInfoStripper
    }
}

impl Transform for DebugInfoStripper {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn description(&self) -> &'static str {
        "Removes debugging information"
    }

    fn apply(&mut self, set: &mut LoadSet, _ctx: &mut PassContext<'_>) -> Result<usize> {
        set.try_for_each_class(|class| {
            let bytes = write_class(class)?;
            *class = read_class(&bytes, ReadOptions::without_debug())?;
            Ok(())
        })?;
        log::info!("Stripped debug information from {} classes", set.len());
        Ok(set.len())
    }
}
