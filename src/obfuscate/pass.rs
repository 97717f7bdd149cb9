//! The pass trait and the context passes run in.

use rand::rngs::StdRng;

use crate::{
    hierarchy::Hierarchy, model::LoadSet, naming::NameGenerator, ExternalSymbolIndex, Result,
};

/// State shared by the passes of one run.
///
/// The name generator is reset by each pass before use; the random source is shared so a
/// seeded run makes the same choices in every pass.
pub struct PassContext<'a> {
    /// Library classes outside the load set
    pub index: &'a ExternalSymbolIndex,
    /// Generator for new names
    pub names: &'a mut dyn NameGenerator,
    /// Source of every random choice
    pub rng: &'a mut StdRng,
    /// Fail on ancestors that can not be resolved
    pub strict_hierarchy: bool,
}

impl<'a> PassContext<'a> {
    /// Builds the inheritance view of `set` for this run.
    #[must_use]
    pub fn hierarchy<'s>(&self, set: &'s LoadSet) -> Hierarchy<'s>
    where
        'a: 's,
    {
        Hierarchy::build(set, self.index, self.strict_hierarchy)
    }
}

/// One rewrite of the load set.
///
/// All passes must be `Send` so a pipeline can be moved to a worker thread. A pass receives
/// exclusive access to the load set and may rename, add or remove classes; the pipeline
/// re-keys the set afterwards.
pub trait Transform: Send {
    /// Unique name for logging and error reports.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the pass and returns the number of changes it made.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass meets a shape it can not rewrite safely. The load set
    /// must not be written after an error.
    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize>;
}
