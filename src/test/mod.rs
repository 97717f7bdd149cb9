//! Shared fixtures for unit tests.

pub(crate) mod eval;

use rand::rngs::StdRng;

use crate::{
    model::{builder::ClassBuilder, AccessFlags, ClassFile},
    naming::NameGenerator,
    obfuscate::PassContext,
    ExternalSymbolIndex,
};

const PUBLIC: AccessFlags = AccessFlags::PUBLIC;

// Helper function to declare bodiless public methods on a stub
fn declare(mut class: ClassBuilder, access: AccessFlags, methods: &[(&str, &str)]) -> ClassBuilder {
    for (name, desc) in methods {
        class = class.abstract_method(access, name, desc);
    }
    class
}

// Helper function to create a library interface
fn interface(name: &str, methods: &[(&str, &str)]) -> ClassFile {
    declare(
        ClassBuilder::interface(name),
        PUBLIC | AccessFlags::ABSTRACT,
        methods,
    )
    .build()
}

fn object() -> ClassFile {
    let mut object = ClassFile::new("java/lang/Object", None);
    object.methods = declare(
        ClassBuilder::new("java/lang/Object"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("toString", "()Ljava/lang/String;"),
            ("hashCode", "()I"),
            ("equals", "(Ljava/lang/Object;)Z"),
            ("getClass", "()Ljava/lang/Class;"),
            ("clone", "()Ljava/lang/Object;"),
            ("finalize", "()V"),
            ("notify", "()V"),
            ("notifyAll", "()V"),
            ("wait", "()V"),
            ("wait", "(J)V"),
        ],
    )
    .build()
    .methods;
    object
}

fn throwables() -> Vec<ClassFile> {
    let throwable = declare(
        ClassBuilder::new("java/lang/Throwable").implements("java/io/Serializable"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("<init>", "(Ljava/lang/String;)V"),
            ("getMessage", "()Ljava/lang/String;"),
            ("printStackTrace", "()V"),
        ],
    )
    .build();
    let exception = declare(
        ClassBuilder::new("java/lang/Exception").extends("java/lang/Throwable"),
        PUBLIC,
        &[("<init>", "()V"), ("<init>", "(Ljava/lang/String;)V")],
    )
    .build();
    let runtime = declare(
        ClassBuilder::new("java/lang/RuntimeException").extends("java/lang/Exception"),
        PUBLIC,
        &[("<init>", "()V"), ("<init>", "(Ljava/lang/String;)V")],
    )
    .build();
    vec![throwable, exception, runtime]
}

/// A library index holding the JDK classes unit tests refer to.
pub(crate) fn jdk_index() -> ExternalSymbolIndex {
    let mut classes = vec![
        object(),
        ClassBuilder::new("java/lang/Class")
            .access(PUBLIC | AccessFlags::FINAL)
            .build(),
        declare(
            ClassBuilder::new("java/lang/String")
                .access(PUBLIC | AccessFlags::FINAL)
                .implements("java/io/Serializable")
                .implements("java/lang/Comparable")
                .implements("java/lang/CharSequence"),
            PUBLIC,
            &[
                ("<init>", "([BLjava/nio/charset/Charset;)V"),
                ("length", "()I"),
                ("charAt", "(I)C"),
                ("equals", "(Ljava/lang/Object;)Z"),
                ("hashCode", "()I"),
                ("toString", "()Ljava/lang/String;"),
                ("compareTo", "(Ljava/lang/String;)I"),
                ("compareTo", "(Ljava/lang/Object;)I"),
            ],
        )
        .build(),
        declare(
            ClassBuilder::new("java/lang/Enum")
                .access(PUBLIC | AccessFlags::ABSTRACT)
                .implements("java/lang/Comparable")
                .implements("java/io/Serializable"),
            PUBLIC,
            &[
                ("name", "()Ljava/lang/String;"),
                ("ordinal", "()I"),
                ("compareTo", "(Ljava/lang/Enum;)I"),
            ],
        )
        .abstract_method(
            PUBLIC | AccessFlags::STATIC,
            "valueOf",
            "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
        )
        .build(),
        declare(
            ClassBuilder::new("java/lang/Record").access(PUBLIC | AccessFlags::ABSTRACT),
            PUBLIC | AccessFlags::ABSTRACT,
            &[
                ("equals", "(Ljava/lang/Object;)Z"),
                ("hashCode", "()I"),
                ("toString", "()Ljava/lang/String;"),
            ],
        )
        .build(),
        interface("java/lang/Runnable", &[("run", "()V")]),
        interface("java/lang/Comparable", &[("compareTo", "(Ljava/lang/Object;)I")]),
        interface("java/io/Serializable", &[]),
        interface(
            "java/lang/CharSequence",
            &[
                ("length", "()I"),
                ("charAt", "(I)C"),
                ("toString", "()Ljava/lang/String;"),
            ],
        ),
        interface(
            "java/lang/annotation/Annotation",
            &[
                ("annotationType", "()Ljava/lang/Class;"),
                ("equals", "(Ljava/lang/Object;)Z"),
                ("hashCode", "()I"),
                ("toString", "()Ljava/lang/String;"),
            ],
        ),
        interface("java/util/function/Supplier", &[("get", "()Ljava/lang/Object;")]),
        ClassBuilder::new("java/lang/invoke/LambdaMetafactory")
            .abstract_method(
                PUBLIC | AccessFlags::STATIC,
                "metafactory",
                "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
                 Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;\
                 Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)\
                 Ljava/lang/invoke/CallSite;",
            )
            .build(),
        ClassBuilder::new("java/util/Base64")
            .abstract_method(
                PUBLIC | AccessFlags::STATIC,
                "getDecoder",
                "()Ljava/util/Base64$Decoder;",
            )
            .build(),
        ClassBuilder::new("java/util/Base64$Decoder")
            .abstract_method(PUBLIC, "decode", "(Ljava/lang/String;)[B")
            .build(),
        ClassBuilder::new("java/nio/charset/StandardCharsets")
            .access(PUBLIC | AccessFlags::FINAL)
            .field(
                PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL,
                "UTF_8",
                "Ljava/nio/charset/Charset;",
            )
            .build(),
    ];
    classes.extend(throwables());
    ExternalSymbolIndex::from_classes(classes)
}

/// A strict pass context over `index`.
pub(crate) fn context<'a>(
    index: &'a ExternalSymbolIndex,
    names: &'a mut dyn NameGenerator,
    rng: &'a mut StdRng,
) -> PassContext<'a> {
    PassContext {
        index,
        names,
        rng,
        strict_hierarchy: true,
    }
}
