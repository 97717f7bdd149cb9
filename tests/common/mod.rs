//! Fixtures shared by the integration tests: a stub JDK index, a small sample program and
//! reference checks over transformed load sets.

#![allow(dead_code)]

use classveil::{
    hierarchy::Hierarchy,
    model::{builder::ClassBuilder, opcodes::*, AccessFlags, ClassFile, Insn, LoadSet},
    ExternalSymbolIndex,
};

const PUBLIC: AccessFlags = AccessFlags::PUBLIC;

fn stub(name: &str, super_name: Option<&str>, methods: &[(&str, &str)]) -> ClassFile {
    let mut class = ClassBuilder::new(name);
    if let Some(parent) = super_name {
        class = class.extends(parent);
    }
    for (method, desc) in methods {
        class = class.abstract_method(PUBLIC, method, desc);
    }
    let mut class = class.build();
    if super_name.is_none() {
        class.super_name = None;
    }
    class
}

/// The JDK classes the sample program refers to.
pub fn jdk() -> ExternalSymbolIndex {
    let comparable = ClassBuilder::interface("java/lang/Comparable")
        .abstract_method(PUBLIC | AccessFlags::ABSTRACT, "compareTo", "(Ljava/lang/Object;)I")
        .build();
    let runnable = ClassBuilder::interface("java/lang/Runnable")
        .abstract_method(PUBLIC | AccessFlags::ABSTRACT, "run", "()V")
        .build();

    ExternalSymbolIndex::from_classes(vec![
        stub(
            "java/lang/Object",
            None,
            &[
                ("<init>", "()V"),
                ("toString", "()Ljava/lang/String;"),
                ("hashCode", "()I"),
                ("equals", "(Ljava/lang/Object;)Z"),
            ],
        ),
        stub(
            "java/lang/String",
            Some("java/lang/Object"),
            &[("length", "()I"), ("<init>", "([BLjava/nio/charset/Charset;)V")],
        ),
        stub("java/lang/Exception", Some("java/lang/Object"), &[("<init>", "()V")]),
        ClassBuilder::new("java/util/Base64")
            .abstract_method(
                PUBLIC | AccessFlags::STATIC,
                "getDecoder",
                "()Ljava/util/Base64$Decoder;",
            )
            .build(),
        stub(
            "java/util/Base64$Decoder",
            Some("java/lang/Object"),
            &[("decode", "(Ljava/lang/String;)[B")],
        ),
        ClassBuilder::new("java/nio/charset/StandardCharsets")
            .field(
                PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                "UTF_8",
                "Ljava/nio/charset/Charset;",
            )
            .build(),
        comparable,
        runnable,
    ])
}

/// A small program exercising overriding, library interfaces, accessors and strings.
pub fn program() -> LoadSet {
    let mut set = LoadSet::new();

    set.insert_class(
        ClassBuilder::new("app/Main")
            .source_file("Main.java")
            .default_constructor()
            .method(
                PUBLIC | AccessFlags::STATIC,
                "main",
                "([Ljava/lang/String;)V",
                |code| {
                    let start = code.new_label();
                    code.mark(start)
                        .line(3)
                        .new_object("app/shapes/Square")
                        .dup()
                        .iconst(4)
                        .invokespecial("app/shapes/Square", "<init>", "(I)V")
                        .astore(1)
                        .aload(1)
                        .invokevirtual("app/shapes/Shape", "area", "()I")
                        .pop()
                        .aload(1)
                        .invokevirtual("app/shapes/Square", "getSide", "()I")
                        .pop()
                        .ldc_str("done")
                        .invokevirtual("java/lang/String", "length", "()I")
                        .pop()
                        .new_object("app/Worker")
                        .dup()
                        .invokespecial("app/Worker", "<init>", "()V")
                        .invokeinterface("java/lang/Runnable", "run", "()V")
                        .vreturn();
                    let end = code.new_label();
                    code.mark(end)
                        .local("args", "[Ljava/lang/String;", start, end, 0)
                        .local("square", "Lapp/shapes/Square;", start, end, 1);
                },
            )
            .build(),
    );

    set.insert_class(
        ClassBuilder::new("app/shapes/Shape")
            .access(PUBLIC | AccessFlags::ABSTRACT | AccessFlags::SUPER)
            .field(AccessFlags::PROTECTED, "label", "Ljava/lang/String;")
            .method(AccessFlags::PROTECTED, "<init>", "()V", |code| {
                code.aload(0)
                    .invokespecial("java/lang/Object", "<init>", "()V")
                    .aload(0)
                    .ldc_str("shape")
                    .putfield("app/shapes/Shape", "label", "Ljava/lang/String;")
                    .vreturn();
            })
            .abstract_method(PUBLIC | AccessFlags::ABSTRACT, "area", "()I")
            .method(PUBLIC, "toString", "()Ljava/lang/String;", |code| {
                code.aload(0)
                    .getfield("app/shapes/Shape", "label", "Ljava/lang/String;")
                    .areturn();
            })
            .build(),
    );

    set.insert_class(
        ClassBuilder::new("app/shapes/Square")
            .extends("app/shapes/Shape")
            .implements("java/lang/Comparable")
            .field(AccessFlags::PRIVATE, "side", "I")
            .method(PUBLIC, "<init>", "(I)V", |code| {
                code.aload(0)
                    .invokespecial("app/shapes/Shape", "<init>", "()V")
                    .aload(0)
                    .iload(1)
                    .putfield("app/shapes/Square", "side", "I")
                    .vreturn();
            })
            .method(PUBLIC, "getSide", "()I", |code| {
                code.aload(0).getfield("app/shapes/Square", "side", "I").ireturn();
            })
            .method(PUBLIC, "area", "()I", |code| {
                code.aload(0)
                    .invokevirtual("app/shapes/Square", "getSide", "()I")
                    .aload(0)
                    .invokevirtual("app/shapes/Square", "getSide", "()I")
                    .op(IMUL)
                    .ireturn();
            })
            .method(PUBLIC, "compareTo", "(Ljava/lang/Object;)I", |code| {
                code.iconst(0).ireturn();
            })
            .build(),
    );

    set.insert_class(
        ClassBuilder::new("app/Worker")
            .implements("java/lang/Runnable")
            .field(PUBLIC | AccessFlags::STATIC, "runs", "I")
            .default_constructor()
            .method(PUBLIC, "run", "()V", |code| {
                code.getstatic("app/Worker", "runs", "I")
                    .iconst(1)
                    .op(IADD)
                    .putstatic("app/Worker", "runs", "I")
                    .vreturn();
            })
            .method(PUBLIC, "describe", "()Ljava/lang/String;", |code| {
                code.ldc_str("worker").areturn();
            })
            .build(),
    );

    set
}

/// Resolves a method through `owner` and its ancestors.
fn resolves_method(hierarchy: &Hierarchy<'_>, owner: &str, name: &str, desc: &str) -> bool {
    if owner.starts_with('[') {
        return true;
    }
    let Some(class) = hierarchy.class(owner) else {
        return false;
    };
    if class.method(name, desc).is_some() {
        return true;
    }
    hierarchy
        .ancestors(owner)
        .unwrap()
        .iter()
        .any(|ancestor| ancestor.method(name, desc).is_some())
}

fn resolves_field(hierarchy: &Hierarchy<'_>, owner: &str, name: &str) -> bool {
    let Some(class) = hierarchy.class(owner) else {
        return false;
    };
    class.field(name).is_some()
        || hierarchy
            .ancestors(owner)
            .unwrap()
            .iter()
            .any(|ancestor| ancestor.field(name).is_some())
}

/// Returns every member reference in `set` that does not resolve, as `owner.name desc`.
pub fn dangling_references(set: &LoadSet, index: &ExternalSymbolIndex) -> Vec<String> {
    let hierarchy = Hierarchy::build(set, index, true);
    let mut dangling = Vec::new();
    for class in set.classes() {
        for method in &class.methods {
            let Some(code) = &method.code else {
                continue;
            };
            for insn in code.instructions.real() {
                match insn {
                    Insn::Method {
                        owner, name, desc, ..
                    } if !resolves_method(&hierarchy, owner, name, desc) => {
                        dangling.push(format!("{owner}.{name}{desc} in {}", class.name));
                    }
                    Insn::Field {
                        owner, name, desc, ..
                    } if !resolves_field(&hierarchy, owner, name) => {
                        dangling.push(format!("{owner}.{name} {desc} in {}", class.name));
                    }
                    Insn::Type { desc, .. }
                        if !desc.starts_with('[') && hierarchy.class(desc).is_none() =>
                    {
                        dangling.push(format!("{desc} in {}", class.name));
                    }
                    _ => {}
                }
            }
        }
    }
    dangling
}

/// Returns the classes declaring `name` with `desc`.
pub fn classes_declaring<'s>(set: &'s LoadSet, name: &str, desc: &str) -> Vec<&'s ClassFile> {
    set.classes()
        .filter(|class| class.method(name, desc).is_some())
        .collect()
}
