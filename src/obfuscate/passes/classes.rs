use std::collections::HashSet;

use rand::seq::SliceRandom;

use crate::{
    archive::manifest_attribute,
    model::{AccessFlags, LoadSet},
    obfuscate::{config::ClassRenameConfig, PassContext, Transform},
    remap::{Mapping, Remapper},
    Result,
};

/// Renames classes to generated names inside the target package.
///
/// Classes on the skip list, the manifest `Main-Class`, `package-info` and module
/// descriptors keep their names. A generated name is never one already used by a class of
/// the load set or the library path.
pub struct ClassRenamer {
    config: ClassRenameConfig,
}

impl ClassRenamer {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: ClassRenameConfig) -> Self {
        Self { config }
    }

    fn kept(&self, set: &LoadSet) -> HashSet<String> {
        let mut kept: HashSet<String> = self.config.skipped().into_iter().collect();
        if self.config.keep_main_class {
            if let Some(main) = manifest_attribute(set, "Main-Class") {
                kept.insert(main.replace('.', "/"));
            }
        }
        kept
    }
}

impl Transform for ClassRenamer {
    fn name(&self) -> &'static str {
        "classes"
    }

    fn description(&self) -> &'static str {
        "Renames classes and moves them to the target package"
    }

    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize> {
        ctx.names.reset();
        let kept = self.kept(set);
        let package = self.config.package();

        let mut candidates = set.class_names();
        candidates.shuffle(&mut *ctx.rng);

        let mut taken: HashSet<String> = candidates.iter().cloned().collect();
        let mut mapping = Mapping::new();
        for name in &candidates {
            let is_module = set
                .class(name)
                .is_some_and(|class| class.access.contains(AccessFlags::MODULE));
            if kept.contains(name) || name.ends_with("package-info") || is_module {
                log::debug!("Keeping class {name}");
                continue;
            }

            let new = loop {
                let simple = ctx.names.next_name();
                let candidate = if package.is_empty() {
                    simple
                } else {
                    format!("{package}/{simple}")
                };
                if !taken.contains(&candidate) && !ctx.index.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(new.clone());
            mapping.map_class(name, &new);
        }

        Remapper::new(&mapping).apply(set)?;
        log::info!("Renamed {} classes", mapping.len());
        Ok(mapping.len())
    }
}
