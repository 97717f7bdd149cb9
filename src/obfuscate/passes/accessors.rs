//! Accessor inlining.
//!
//! A method whose body is exactly `[aload_0] get<field|static> C.f return` or
//! `[aload_0] <x>load put<field|static> C.f return` is removed, and every invocation of it
//! is replaced by the field instruction it wraps. The stack effect of the call and of the
//! field access are identical, so no surrounding code needs to change.
//!
//! An accessor is left alone when inlining could change behavior:
//!
//! - it overrides or is overridden (not top level, or redeclared inside its closure)
//! - it is `synchronized` or its body has exception handlers
//! - a method handle refers to it
//! - the wrapped field is not accessible from one of the calling classes
//! - it is a setter of a `final` field

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    hierarchy::{Hierarchy, MemberKey},
    model::{
        opcodes::{self, *},
        package_of, AccessFlags, ClassFile, Constant, Field, Handle, Insn, LoadSet, Method,
    },
    obfuscate::{PassContext, Transform},
    query::{InsnPattern, Query, QueryKey},
    Result,
};

type MethodRef = (String, String, String);

#[derive(Debug)]
struct Accessor {
    owner: String,
    name: String,
    desc: String,
    field: String,
    field_desc: String,
    is_static: bool,
    is_setter: bool,
}

impl Accessor {
    fn field_insn(&self) -> Insn {
        let opcode = match (self.is_setter, self.is_static) {
            (false, false) => GETFIELD,
            (false, true) => GETSTATIC,
            (true, false) => PUTFIELD,
            (true, true) => PUTSTATIC,
        };
        Insn::Field {
            opcode,
            owner: self.owner.clone(),
            name: self.field.clone(),
            desc: self.field_desc.clone(),
        }
    }
}

fn receiver() -> Query {
    Query::new()
        .with(QueryKey::Opcode, ALOAD)
        .with(QueryKey::Var, 0u16)
}

fn field_access(opcode: u8, owner: &str, field: &Field) -> Query {
    Query::new()
        .with(QueryKey::Opcode, opcode)
        .with(QueryKey::Owner, owner)
        .with(QueryKey::Name, &field.name)
        .with(QueryKey::Desc, &field.desc)
}

fn getter_pattern(owner: &str, field: &Field, is_static: bool) -> InsnPattern {
    let mut pattern = InsnPattern::new();
    if !is_static {
        pattern = pattern.then(receiver());
    }
    let opcode = if is_static { GETSTATIC } else { GETFIELD };
    pattern
        .then(field_access(opcode, owner, field))
        .then(Query::new().with(QueryKey::Opcode, opcodes::return_for(&field.desc)))
}

fn setter_pattern(owner: &str, field: &Field, is_static: bool) -> InsnPattern {
    let mut pattern = InsnPattern::new();
    if !is_static {
        pattern = pattern.then(receiver());
    }
    let (slot, opcode) = if is_static {
        (0u16, PUTSTATIC)
    } else {
        (1u16, PUTFIELD)
    };
    pattern
        .then(
            Query::new()
                .with(QueryKey::Opcode, opcodes::load_for(&field.desc))
                .with(QueryKey::Var, slot),
        )
        .then(field_access(opcode, owner, field))
        .then(Query::new().with(QueryKey::Opcode, RETURN))
}

/// Matches `method` against the getter and setter shapes of every field of `class`.
fn match_accessor(class: &ClassFile, method: &Method) -> Option<Accessor> {
    if method.is_initializer() || method.access.contains(AccessFlags::SYNCHRONIZED) {
        return None;
    }
    let code = method.code.as_ref()?;
    if !code.try_catch_blocks.is_empty() {
        return None;
    }
    let is_static = method.access.is_static();

    class
        .fields
        .iter()
        .filter(|field| field.access.is_static() == is_static)
        .find_map(|field| {
            let is_setter = if method.desc == format!("(){}", field.desc) {
                if !getter_pattern(&class.name, field, is_static).matches(&code.instructions) {
                    return None;
                }
                false
            } else if method.desc == format!("({})V", field.desc) {
                if field.access.contains(AccessFlags::FINAL)
                    || !setter_pattern(&class.name, field, is_static).matches(&code.instructions)
                {
                    return None;
                }
                true
            } else {
                return None;
            };
            Some(Accessor {
                owner: class.name.clone(),
                name: method.name.clone(),
                desc: method.desc.clone(),
                field: field.name.clone(),
                field_desc: field.desc.clone(),
                is_static,
                is_setter,
            })
        })
}

fn collect_handle(handle: &Handle, targets: &mut HashSet<MethodRef>) {
    if !handle.kind.is_field() {
        targets.insert((
            handle.owner.clone(),
            handle.name.clone(),
            handle.desc.clone(),
        ));
    }
}

fn collect_constant(constant: &Constant, targets: &mut HashSet<MethodRef>) {
    match constant {
        Constant::MethodHandle(handle) => collect_handle(handle, targets),
        Constant::Dynamic(dynamic) => {
            collect_handle(&dynamic.bsm, targets);
            for arg in &dynamic.args {
                collect_constant(arg, targets);
            }
        }
        _ => {}
    }
}

/// Every method a method handle of the load set points at.
fn handle_targets(set: &LoadSet) -> HashSet<MethodRef> {
    let mut targets = HashSet::new();
    let bodies = set
        .classes()
        .flat_map(|class| class.methods.iter())
        .filter_map(|method| method.code.as_ref());
    for code in bodies {
        for insn in code.instructions.iter() {
            match insn {
                Insn::Ldc(constant) => collect_constant(constant, &mut targets),
                Insn::InvokeDynamic { bsm, args, .. } => {
                    collect_handle(bsm, &mut targets);
                    for arg in args {
                        collect_constant(arg, &mut targets);
                    }
                }
                _ => {}
            }
        }
    }
    targets
}

/// Classes calling each method reference of the load set, in name order.
fn call_sites(set: &LoadSet) -> HashMap<MethodRef, BTreeSet<String>> {
    let mut callers: HashMap<MethodRef, BTreeSet<String>> = HashMap::new();
    for class in set.classes() {
        let bodies = class.methods.iter().filter_map(|method| method.code.as_ref());
        for insn in bodies.flat_map(|code| code.instructions.iter()) {
            if let Insn::Method {
                owner, name, desc, ..
            } = insn
            {
                callers
                    .entry((owner.clone(), name.clone(), desc.clone()))
                    .or_default()
                    .insert(class.name.clone());
            }
        }
    }
    callers
}

/// Returns `true` if code in `caller` may access `field` of `owner` directly.
fn is_accessible(caller: &str, owner: &ClassFile, field: &Field) -> bool {
    if caller == owner.name {
        return true;
    }
    if field.access.is_private() {
        return false;
    }
    let same_package = package_of(caller) == owner.package();
    (owner.access.is_public() || same_package) && (field.access.is_public() || same_package)
}

/// Replaces trivial getters and setters by direct field access.
#[derive(Debug, Default)]
pub struct AccessorInliner;

impl AccessorInliner {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        AccessorInliner
    }

    fn closure_if_inlinable(
        hierarchy: &Hierarchy<'_>,
        handles: &HashSet<MethodRef>,
        callers: &HashMap<MethodRef, BTreeSet<String>>,
        accessor: &Accessor,
    ) -> Result<Option<Vec<String>>> {
        let key = MemberKey::Method(&accessor.name, &accessor.desc);
        if !hierarchy.is_top_level(&accessor.owner, key)? {
            return Ok(None);
        }
        let closure = hierarchy.closure(&accessor.owner);
        let overridden = closure
            .iter()
            .filter(|class| **class != accessor.owner)
            .any(|class| hierarchy.class(class).is_some_and(|c| key.declared_by(c)));
        if overridden || hierarchy.conflicts(&closure, key)? {
            return Ok(None);
        }

        let method_ref = |class: &str| {
            (
                class.to_string(),
                accessor.name.clone(),
                accessor.desc.clone(),
            )
        };
        let referenced = closure
            .iter()
            .any(|class| handles.contains(&method_ref(*class)));
        if referenced {
            log::debug!(
                "Keeping accessor {}.{}{} referenced by a method handle",
                accessor.owner,
                accessor.name,
                accessor.desc
            );
            return Ok(None);
        }

        let Some(owner) = hierarchy.class(&accessor.owner) else {
            return Ok(None);
        };
        let Some(field) = owner.field(&accessor.field) else {
            return Ok(None);
        };

        let calling: BTreeSet<&str> = closure
            .iter()
            .filter_map(|class| callers.get(&method_ref(*class)))
            .flatten()
            .map(String::as_str)
            .collect();
        if let Some(caller) = calling
            .into_iter()
            .find(|caller| !is_accessible(caller, owner, field))
        {
            log::debug!(
                "Keeping accessor {}.{}{}, field is not accessible from {}",
                accessor.owner,
                accessor.name,
                accessor.desc,
                caller
            );
            return Ok(None);
        }

        Ok(Some(closure.into_iter().map(str::to_string).collect()))
    }
}

impl Transform for AccessorInliner {
    fn name(&self) -> &'static str {
        "accessors"
    }

    fn description(&self) -> &'static str {
        "Replaces calls to trivial getters and setters with field access"
    }

    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize> {
        let mut inlined = Vec::new();
        let mut replacements: HashMap<MethodRef, Insn> = HashMap::new();
        {
            let hierarchy = ctx.hierarchy(set);
            let handles = handle_targets(set);
            let callers = call_sites(set);
            for class in set.classes() {
                for method in &class.methods {
                    let Some(accessor) = match_accessor(class, method) else {
                        continue;
                    };
                    let Some(closure) =
                        Self::closure_if_inlinable(&hierarchy, &handles, &callers, &accessor)?
                    else {
                        continue;
                    };
                    let insn = accessor.field_insn();
                    for owner in closure {
                        replacements.insert(
                            (owner, accessor.name.clone(), accessor.desc.clone()),
                            insn.clone(),
                        );
                    }
                    inlined.push(accessor);
                }
            }
        }

        for accessor in &inlined {
            if let Some(class) = set.class_mut(&accessor.owner) {
                class.remove_method(&accessor.name, &accessor.desc);
            }
            log::debug!(
                "Inlined {} {}.{}{} as field {}",
                if accessor.is_setter { "setter" } else { "getter" },
                accessor.owner,
                accessor.name,
                accessor.desc,
                accessor.field
            );
        }

        if !replacements.is_empty() {
            set.try_for_each_class(|class| {
                let bodies = class.methods.iter_mut().filter_map(|m| m.code.as_mut());
                for code in bodies {
                    for insn in code.instructions.iter_mut() {
                        let Insn::Method {
                            owner, name, desc, ..
                        } = insn
                        else {
                            continue;
                        };
                        let key = (owner.clone(), name.clone(), desc.clone());
                        if let Some(replacement) = replacements.get(&key) {
                            *insn = replacement.clone();
                        }
                    }
                }
                Ok(())
            })?;
        }

        log::info!("Inlined {} accessors", inlined.len());
        Ok(inlined.len())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        model::{builder::ClassBuilder, HandleKind},
        naming::LexicographicNames,
        test::{context, eval::Machine, jdk_index},
    };

    fn run(set: &mut LoadSet) -> usize {
        let index = jdk_index();
        let mut names = LexicographicNames::new();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = context(&index, &mut names, &mut rng);
        AccessorInliner::new().apply(set, &mut ctx).unwrap()
    }

    fn point() -> ClassFile {
        ClassBuilder::new("p/Point")
            .field(AccessFlags::PRIVATE, "x", "I")
            .field(AccessFlags::PRIVATE | AccessFlags::STATIC, "count", "J")
            .field(AccessFlags::PUBLIC | AccessFlags::FINAL, "id", "Ljava/lang/String;")
            .default_constructor()
            .method(AccessFlags::PUBLIC, "getX", "()I", |code| {
                code.line(3).aload(0).getfield("p/Point", "x", "I").ireturn();
            })
            .method(AccessFlags::PUBLIC, "setX", "(I)V", |code| {
                code.aload(0).iload(1).putfield("p/Point", "x", "I").vreturn();
            })
            .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "setCount", "(J)V", |code| {
                code.var(LLOAD, 0).putstatic("p/Point", "count", "J").vreturn();
            })
            .method(AccessFlags::PUBLIC, "setId", "(Ljava/lang/String;)V", |code| {
                code.aload(0)
                    .aload(1)
                    .putfield("p/Point", "id", "Ljava/lang/String;")
                    .vreturn();
            })
            .method(AccessFlags::PUBLIC, "twice", "()I", |code| {
                code.aload(0)
                    .invokevirtual("p/Point", "getX", "()I")
                    .aload(0)
                    .invokevirtual("p/Point", "getX", "()I")
                    .op(IADD)
                    .ireturn();
            })
            .build()
    }

    #[test]
    fn getters_and_setters_inside_one_class() {
        let mut set = LoadSet::new();
        set.insert_class(point());
        assert_eq!(run(&mut set), 3);

        let class = set.class("p/Point").unwrap();
        assert!(class.method("getX", "()I").is_none());
        assert!(class.method("setX", "(I)V").is_none());
        assert!(class.method("setCount", "(J)V").is_none());
        assert!(class.method("setId", "(Ljava/lang/String;)V").is_some());

        let twice = class.method("twice", "()I").unwrap().code.as_ref().unwrap();
        let reads = twice
            .instructions
            .real()
            .filter(|insn| matches!(insn, Insn::Field { opcode: GETFIELD, name, .. } if name == "x"))
            .count();
        assert_eq!(reads, 2);
    }

    #[test]
    fn private_field_blocks_foreign_callers() {
        let mut set = LoadSet::new();
        set.insert_class(point());
        set.insert_class(
            ClassBuilder::new("p/User")
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "read", "(Lp/Point;)I", |code| {
                    code.aload(0).invokevirtual("p/Point", "getX", "()I").ireturn();
                })
                .build(),
        );
        run(&mut set);
        assert!(set.class("p/Point").unwrap().method("getX", "()I").is_some());
        assert!(set.class("p/Point").unwrap().method("setX", "(I)V").is_none());
    }

    #[test]
    fn overridden_synchronized_and_handle_targets_are_kept() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("p/Base")
                .field(AccessFlags::PUBLIC, "a", "I")
                .field(AccessFlags::PUBLIC, "b", "I")
                .field(AccessFlags::PUBLIC, "c", "I")
                .method(AccessFlags::PUBLIC, "getA", "()I", |code| {
                    code.aload(0).getfield("p/Base", "a", "I").ireturn();
                })
                .method(AccessFlags::PUBLIC | AccessFlags::SYNCHRONIZED, "getB", "()I", |code| {
                    code.aload(0).getfield("p/Base", "b", "I").ireturn();
                })
                .method(AccessFlags::PUBLIC, "getC", "()I", |code| {
                    code.aload(0).getfield("p/Base", "c", "I").ireturn();
                })
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Sub")
                .extends("p/Base")
                .method(AccessFlags::PUBLIC, "getA", "()I", |code| {
                    code.iconst(7).ireturn();
                })
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "ref", "()V", |code| {
                    code.ldc(Constant::MethodHandle(Handle {
                        kind: HandleKind::InvokeVirtual,
                        owner: "p/Sub".into(),
                        name: "getC".into(),
                        desc: "()I".into(),
                        interface: false,
                    }))
                    .pop()
                    .vreturn();
                })
                .build(),
        );
        assert_eq!(run(&mut set), 0);
    }

    #[test]
    fn calls_through_subtypes_are_rewritten() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("p/Base")
                .field(AccessFlags::PROTECTED | AccessFlags::STATIC, "shared", "Ljava/lang/Object;")
                .method(
                    AccessFlags::PUBLIC | AccessFlags::STATIC,
                    "shared",
                    "()Ljava/lang/Object;",
                    |code| {
                        code.getstatic("p/Base", "shared", "Ljava/lang/Object;").areturn();
                    },
                )
                .build(),
        );
        set.insert_class(
            ClassBuilder::new("p/Sub")
                .extends("p/Base")
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "use", "()V", |code| {
                    code.invokestatic("p/Sub", "shared", "()Ljava/lang/Object;")
                        .pop()
                        .vreturn();
                })
                .build(),
        );
        assert_eq!(run(&mut set), 1);

        let code = set.class("p/Sub").unwrap().methods[0].code.as_ref().unwrap();
        assert_eq!(
            code.instructions[0],
            Insn::Field {
                opcode: GETSTATIC,
                owner: "p/Base".into(),
                name: "shared".into(),
                desc: "Ljava/lang/Object;".into(),
            }
        );
    }

    #[test]
    fn callers_through_any_subtype_are_checked() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("p/Base")
                .field(AccessFlags::STATIC, "shared", "I")
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "shared", "()I", |code| {
                    code.getstatic("p/Base", "shared", "I").ireturn();
                })
                .build(),
        );
        set.insert_class(ClassBuilder::new("p/Sub").extends("p/Base").build());
        for name in ["p/Near", "p/Other"] {
            set.insert_class(
                ClassBuilder::new(name)
                    .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "use", "()I", |code| {
                        code.invokestatic("p/Base", "shared", "()I").ireturn();
                    })
                    .build(),
            );
        }
        set.insert_class(
            ClassBuilder::new("q/Far")
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "use", "()I", |code| {
                    code.invokestatic("p/Sub", "shared", "()I").ireturn();
                })
                .build(),
        );

        assert_eq!(run(&mut set), 0);
        assert!(set.class("p/Base").unwrap().method("shared", "()I").is_some());

        set.remove_class("q/Far");
        assert_eq!(run(&mut set), 1);
        assert!(set.class("p/Base").unwrap().method("shared", "()I").is_none());
    }

    #[test]
    fn inlined_program_computes_the_same_values() {
        let counter = || {
            ClassBuilder::new("p/Counter")
                .field(AccessFlags::PRIVATE, "value", "I")
                .default_constructor()
                .method(AccessFlags::PUBLIC, "getValue", "()I", |code| {
                    code.aload(0).getfield("p/Counter", "value", "I").ireturn();
                })
                .method(AccessFlags::PUBLIC, "setValue", "(I)V", |code| {
                    code.aload(0).iload(1).putfield("p/Counter", "value", "I").vreturn();
                })
                .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", "(I)I", |code| {
                    code.new_object("p/Counter")
                        .dup()
                        .invokespecial("p/Counter", "<init>", "()V")
                        .astore(1)
                        .aload(1)
                        .iload(0)
                        .invokevirtual("p/Counter", "setValue", "(I)V")
                        .aload(1)
                        .invokevirtual("p/Counter", "getValue", "()I")
                        .aload(1)
                        .invokevirtual("p/Counter", "getValue", "()I")
                        .op(IADD)
                        .ireturn();
                })
                .build()
        };

        let mut before = LoadSet::new();
        before.insert_class(counter());
        let expected: Vec<i32> = [0, 5, -21]
            .iter()
            .map(|&arg| Machine::new(&before).call_int("p/Counter", "run", "(I)I", vec![arg]))
            .collect();
        assert_eq!(expected, vec![0, 10, -42]);

        let mut after = LoadSet::new();
        after.insert_class(counter());
        assert_eq!(run(&mut after), 2);
        let class = after.class("p/Counter").unwrap();
        assert!(class.method("getValue", "()I").is_none());
        assert!(class.method("setValue", "(I)V").is_none());

        let actual: Vec<i32> = [0, 5, -21]
            .iter()
            .map(|&arg| Machine::new(&after).call_int("p/Counter", "run", "(I)I", vec![arg]))
            .collect();
        assert_eq!(actual, expected);
    }
}
