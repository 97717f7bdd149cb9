use crate::{
    model::{AccessFlags, LoadSet},
    obfuscate::{PassContext, Transform},
    Result,
};

/// Makes every class, field and method public.
///
/// Renamed classes may land in another package than the code using them, so package and
/// protected access would no longer hold. All flags other than the visibility bits are
/// kept; module descriptors are skipped.
#[derive(Debug, Default)]
pub struct AccessWidener;

impl AccessWidener {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        AccessWidener
    }
}

fn widen(access: &mut AccessFlags) -> usize {
    let widened = access.widened();
    if widened == *access {
        0
    } else {
        *access = widened;
        1
    }
}

impl Transform for AccessWidener {
    fn name(&self) -> &'static str {
        "access"
    }

    fn description(&self) -> &'static str {
        "Makes classes, fields and methods public"
    }

    fn apply(&mut self, set: &mut LoadSet, _ctx: &mut PassContext<'_>) -> Result<usize> {
        let mut changed = 0;
        for class in set.classes_mut() {
            if class.access.contains(AccessFlags::MODULE) {
                continue;
            }
            changed += widen(&mut class.access);
            for inner in &mut class.inner_classes {
                widen(&mut inner.access);
            }
            for field in &mut class.fields {
                changed += widen(&mut field.access);
            }
            for method in &mut class.methods {
                changed += widen(&mut method.access);
            }
        }
        log::info!("Widened access of {changed} declarations");
        Ok(changed)
    }
}
