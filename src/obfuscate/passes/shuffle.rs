//! Member shuffling.
//!
//! Randomizes the order of every collection whose order carries no meaning: fields, methods,
//! interfaces, inner class records, nest members, permitted subclasses, raw attributes and
//! annotations on classes and members, and declared exceptions, parameter records and local
//! variable records of methods.
//!
//! Exception handler lists are never touched, since the first matching handler wins. Record
//! components follow the canonical constructor, and parameter annotations follow the
//! descriptor, so both stay as they are. Interfaces and declared exceptions are only
//! shuffled when no type annotation refers to them by index.

use rand::{rngs::StdRng, seq::SliceRandom};

use crate::{
    model::{Annotations, ClassFile, LoadSet, Method},
    obfuscate::{PassContext, Transform},
    Result,
};

fn shuffle_annotations(annotations: &mut Annotations, rng: &mut StdRng) {
    annotations.visible.shuffle(rng);
    annotations.invisible.shuffle(rng);
    annotations.visible_type.shuffle(rng);
    annotations.invisible_type.shuffle(rng);
}

fn shuffle_method(method: &mut Method, rng: &mut StdRng) {
    if method.annotations.visible_type.is_empty() && method.annotations.invisible_type.is_empty()
    {
        method.exceptions.shuffle(rng);
    }
    method.parameters.shuffle(rng);
    method.attributes.shuffle(rng);
    shuffle_annotations(&mut method.annotations, rng);
    if let Some(code) = method.code.as_mut() {
        code.local_variables.shuffle(rng);
    }
}

fn shuffle_class(class: &mut ClassFile, rng: &mut StdRng) {
    if class.annotations.visible_type.is_empty() && class.annotations.invisible_type.is_empty() {
        class.interfaces.shuffle(rng);
    }
    class.inner_classes.shuffle(rng);
    class.nest_members.shuffle(rng);
    class.permitted_subclasses.shuffle(rng);
    class.attributes.shuffle(rng);
    shuffle_annotations(&mut class.annotations, rng);

    class.fields.shuffle(rng);
    for field in &mut class.fields {
        field.attributes.shuffle(rng);
        shuffle_annotations(&mut field.annotations, rng);
    }

    class.methods.shuffle(rng);
    for method in &mut class.methods {
        shuffle_method(method, rng);
    }
}

/// Shuffles member and attribute order.
#[derive(Debug, Default)]
pub struct MemberShuffler;

impl MemberShuffler {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        MemberShuffler
    }
}

impl Transform for MemberShuffler {
    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn description(&self) -> &'static str {
        "Randomizes the order of members and attributes"
    }

    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize> {
        for class in set.classes_mut() {
            shuffle_class(class, ctx.rng);
        }
        log::info!("Shuffled members of {} classes", set.len());
        Ok(set.len())
    }
}
