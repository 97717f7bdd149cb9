//! Class file reading and writing.
//!
//! [`read_class`] decodes a class file into a [`ClassFile`] and [`write_class`] encodes one
//! back. The writer rebuilds the constant pool from scratch, computes `max_stack` and
//! `max_locals`, lays out branches and switches, and emits the stack map frames carried by
//! [`crate::model::Insn::Frame`] markers as full frames.
//!
//! Attributes the codec does not interpret are kept as [`crate::model::RawAttribute`]s. Their
//! payload may hold constant pool indices, so a class that carries any keeps the pool it was
//! read with and the writer extends that pool instead of starting empty.
//!
//! # Examples
//!
//! ```rust
//! use classveil::codec::{read_class, write_class, ReadOptions};
//! use classveil::model::builder::ClassBuilder;
//!
//! let class = ClassBuilder::new("demo/Hello").default_constructor().build();
//! let bytes = write_class(&class)?;
//! let decoded = read_class(&bytes, ReadOptions::default())?;
//! assert_eq!(decoded.name, "demo/Hello");
//! assert_eq!(decoded.methods.len(), 1);
//! # Ok::<(), classveil::Error>(())
//! ```

mod annotations;
mod assemble;
mod code;
pub(crate) mod pool;
mod reader;
mod stack;
mod writer;

use crate::{model::ClassFile, Result};

/// What to skip while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Drop `SourceFile`, `SourceDebugExtension`, `LineNumberTable`, `LocalVariableTable`,
    /// `LocalVariableTypeTable` and `MethodParameters`
    pub skip_debug: bool,
    /// Leave every method without a body
    pub skip_code: bool,
}

impl ReadOptions {
    /// Options for reading only the declarations of library classes.
    #[must_use]
    pub fn declarations_only() -> Self {
        ReadOptions {
            skip_debug: true,
            skip_code: true,
        }
    }

    /// Options dropping debug information but keeping code.
    #[must_use]
    pub fn without_debug() -> Self {
        ReadOptions {
            skip_debug: true,
            skip_code: false,
        }
    }
}

/// Decodes a class file.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for invalid input, and
/// [`crate::Error::RecursionLimit`] for pathological nesting of annotations or dynamic
/// constants.
pub fn read_class(data: &[u8], options: ReadOptions) -> Result<ClassFile> {
    reader::read(data, options)
}

/// Encodes a class file.
///
/// # Errors
/// Returns [`crate::Error::DanglingLabel`] or [`crate::Error::DuplicateLabel`] for inconsistent
/// instruction lists, [`crate::Error::BranchOutOfRange`] if a conditional branch can not
/// reach its target, [`crate::Error::CodeTooLarge`] if a method body exceeds 65535 bytes and
/// [`crate::Error::PoolOverflow`] if the constant pool exceeds 65535 entries.
pub fn write_class(class: &ClassFile) -> Result<Vec<u8>> {
    writer::write(class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{
            builder::{ClassBuilder, CodeBuilder},
            opcodes::*,
            AccessFlags, Annotation, Constant, ElementValue, Handle, HandleKind, InnerClass, Insn,
            Label, Method, RawAttribute, VerificationType,
        },
        Error,
    };

    fn round_trip(class: &ClassFile) -> ClassFile {
        let bytes = write_class(class).unwrap();
        read_class(&bytes, ReadOptions::default()).unwrap()
    }

    fn real(class: &ClassFile, name: &str) -> Vec<Insn> {
        class
            .methods
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.code.as_ref())
            .unwrap()
            .instructions
            .real()
            .cloned()
            .collect()
    }

    #[test]
    fn declarations_survive() {
        let mut class = ClassBuilder::new("p/Sample")
            .implements("java/lang/Runnable")
            .source_file("Sample.java")
            .field(AccessFlags::PRIVATE | AccessFlags::STATIC, "count", "I")
            .abstract_method(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "run", "()V")
            .build();
        class.fields[0].value = Some(Constant::Int(42));
        class.signature = Some("Ljava/lang/Object;Ljava/lang/Runnable;".into());
        class.inner_classes.push(InnerClass {
            inner: "p/Sample$Inner".into(),
            outer: Some("p/Sample".into()),
            inner_name: Some("Inner".into()),
            access: AccessFlags::PUBLIC | AccessFlags::STATIC,
        });
        class.nest_members.push("p/Sample$Inner".into());
        let mut annotation = Annotation::new("Lp/Marker;");
        annotation
            .values
            .push(("value".into(), ElementValue::String("x".into())));
        class.annotations.visible.push(annotation);
        class.methods[0].exceptions.push("java/io/IOException".into());

        let read = round_trip(&class);
        assert_eq!(read.name, "p/Sample");
        assert_eq!(read.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(read.interfaces, vec!["java/lang/Runnable"]);
        assert_eq!(read.source_file.as_deref(), Some("Sample.java"));
        assert_eq!(read.fields, class.fields);
        assert_eq!(read.methods, class.methods);
        assert_eq!(read.inner_classes, class.inner_classes);
        assert_eq!(read.nest_members, class.nest_members);
        assert_eq!(read.annotations, class.annotations);
        assert_eq!(read.signature, class.signature);
        assert!(read.source_pool.is_none());
    }

    #[test]
    fn code_normalized_forms() {
        let class = ClassBuilder::new("p/Code")
            .method(AccessFlags::PUBLIC | AccessFlags::STATIC, "f", "(IJ)J", |code| {
                code.iload(0)
                    .var(ISTORE, 300)
                    .iinc(300, 1000)
                    .var(LLOAD, 1)
                    .ldc(Constant::Long(7))
                    .op(0x61)
                    .op(LRETURN);
            })
            .build();

        let read = round_trip(&class);
        let insns = real(&read, "f");
        assert_eq!(
            insns,
            vec![
                Insn::Var { opcode: ILOAD, var: 0 },
                Insn::Var { opcode: ISTORE, var: 300 },
                Insn::Iinc { var: 300, incr: 1000 },
                Insn::Var { opcode: LLOAD, var: 1 },
                Insn::Ldc(Constant::Long(7)),
                Insn::Simple(0x61),
                Insn::Simple(LRETURN),
            ]
        );
        let code = read.methods[0].code.as_ref().unwrap();
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.max_locals, 301);
    }

    #[test]
    fn switches_and_handlers() {
        let mut code = CodeBuilder::default();
        let (a, b, dflt, start, end, handler) = (
            code.new_label(),
            code.new_label(),
            code.new_label(),
            code.new_label(),
            code.new_label(),
            code.new_label(),
        );
        code.mark(start)
            .iload(0)
            .insn(Insn::TableSwitch {
                low: 1,
                high: 2,
                default: dflt,
                targets: vec![a, b],
            })
            .mark(a)
            .iload(0)
            .insn(Insn::LookupSwitch {
                default: dflt,
                keys: vec![-5, 100_000],
                targets: vec![b, dflt],
            })
            .mark(b)
            .iconst(1)
            .ireturn()
            .mark(end)
            .mark(dflt)
            .iconst(0)
            .ireturn()
            .mark(handler)
            .pop()
            .iconst(-1)
            .ireturn()
            .try_catch(start, end, handler, None);
        let class = ClassBuilder::new("p/Switch")
            .with_method({
                let mut method = Method::new(AccessFlags::STATIC, "s", "(I)I");
                method.code = Some(code.build());
                method
            })
            .build();

        let read = round_trip(&class);
        let code = read.methods[0].code.as_ref().unwrap();
        assert_eq!(code.try_catch_blocks.len(), 1);
        assert_eq!(code.try_catch_blocks[0].catch_type, None);
        let switch = code
            .instructions
            .iter()
            .find(|i| matches!(i, Insn::LookupSwitch { .. }))
            .unwrap();
        if let Insn::LookupSwitch { keys, targets, .. } = switch {
            assert_eq!(keys, &vec![-5, 100_000]);
            assert_eq!(targets.len(), 2);
        }
        // written again, the bytes are stable
        assert_eq!(write_class(&read).unwrap(), write_class(&round_trip(&read)).unwrap());
    }

    #[test]
    fn long_goto_is_widened() {
        let mut code = CodeBuilder::default();
        let target = code.new_label();
        code.jump(GOTO, target);
        for _ in 0..17_000 {
            code.iconst(1).pop();
        }
        code.mark(target).vreturn();
        let class = ClassBuilder::new("p/Long")
            .with_method({
                let mut method = Method::new(AccessFlags::STATIC, "l", "()V");
                method.code = Some(code.build());
                method
            })
            .build();

        let read = round_trip(&class);
        let insns = real(&read, "l");
        assert_eq!(insns.len(), 34_002);
        assert!(matches!(insns[0], Insn::Jump { opcode: GOTO, .. }));
        assert!(matches!(insns[34_001], Insn::Simple(RETURN)));
    }

    #[test]
    fn long_conditional_is_rejected() {
        let mut code = CodeBuilder::default();
        let target = code.new_label();
        code.iconst(0).jump(IFEQ, target);
        for _ in 0..17_000 {
            code.iconst(1).pop();
        }
        code.mark(target).vreturn();
        let class = ClassBuilder::new("p/Cond")
            .with_method({
                let mut method = Method::new(AccessFlags::STATIC, "c", "()V");
                method.code = Some(code.build());
                method
            })
            .build();
        assert!(matches!(
            write_class(&class),
            Err(Error::BranchOutOfRange { .. })
        ));
    }

    #[test]
    fn dangling_label() {
        let class = ClassBuilder::new("p/Dangling")
            .method(AccessFlags::STATIC, "d", "()V", |code| {
                code.jump(GOTO, Label::new());
            })
            .build();
        assert!(matches!(write_class(&class), Err(Error::DanglingLabel { .. })));
    }

    #[test]
    fn frames_and_invokedynamic() {
        let bsm = Handle {
            kind: HandleKind::InvokeStatic,
            owner: "java/lang/invoke/LambdaMetafactory".into(),
            name: "metafactory".into(),
            desc: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".into(),
            interface: false,
        };
        let mut code = CodeBuilder::default();
        let skip = code.new_label();
        code.iload(0)
            .jump(IFEQ, skip)
            .insn(Insn::InvokeDynamic {
                name: "run".into(),
                desc: "()Ljava/lang/Runnable;".into(),
                bsm: bsm.clone(),
                args: vec![
                    Constant::MethodType("()V".into()),
                    Constant::MethodHandle(Handle {
                        kind: HandleKind::InvokeStatic,
                        owner: "p/Indy".into(),
                        name: "lambda$0".into(),
                        desc: "()V".into(),
                        interface: false,
                    }),
                    Constant::MethodType("()V".into()),
                ],
            })
            .pop()
            .mark(skip)
            .insn(Insn::Frame {
                locals: vec![VerificationType::Integer],
                stack: Vec::new(),
            })
            .vreturn();
        let class = ClassBuilder::new("p/Indy")
            .with_method({
                let mut method = Method::new(AccessFlags::STATIC, "i", "(I)V");
                method.code = Some(code.build());
                method
            })
            .build();

        let read = round_trip(&class);
        let code = read.methods[0].code.as_ref().unwrap();
        let indy = code
            .instructions
            .iter()
            .find_map(|insn| match insn {
                Insn::InvokeDynamic { bsm, args, .. } => Some((bsm.clone(), args.len())),
                _ => None,
            })
            .unwrap();
        assert_eq!(indy, (bsm, 3));
        let frames: Vec<_> = code
            .instructions
            .iter()
            .filter(|insn| matches!(insn, Insn::Frame { .. }))
            .collect();
        assert_eq!(
            frames,
            vec![&Insn::Frame {
                locals: vec![VerificationType::Integer],
                stack: Vec::new(),
            }]
        );
    }

    #[test]
    fn debug_info_skipped() {
        let class = ClassBuilder::new("p/Debug")
            .source_file("Debug.java")
            .method(AccessFlags::STATIC, "m", "(I)V", |code| {
                let (start, end) = (code.new_label(), code.new_label());
                code.mark(start)
                    .line(10)
                    .vreturn()
                    .mark(end)
                    .local("x", "I", start, end, 0);
            })
            .build();
        let bytes = write_class(&class).unwrap();

        let full = read_class(&bytes, ReadOptions::default()).unwrap();
        let code = full.methods[0].code.as_ref().unwrap();
        assert_eq!(code.local_variables.len(), 1);
        assert!(code
            .instructions
            .iter()
            .any(|i| matches!(i, Insn::LineNumber { line: 10, .. })));

        let stripped = read_class(&bytes, ReadOptions::without_debug()).unwrap();
        let code = stripped.methods[0].code.as_ref().unwrap();
        assert!(stripped.source_file.is_none());
        assert!(code.local_variables.is_empty());
        assert!(!code
            .instructions
            .iter()
            .any(|i| matches!(i, Insn::LineNumber { .. })));

        let declarations = read_class(&bytes, ReadOptions::declarations_only()).unwrap();
        assert!(declarations.methods[0].code.is_none());
    }

    #[test]
    fn raw_attributes_keep_pool() {
        let mut class = ClassBuilder::new("p/Raw").build();
        class.attributes.push(RawAttribute {
            name: "Custom".into(),
            data: vec![0, 1],
        });
        let read = round_trip(&class);
        assert!(read.source_pool.is_some());
        assert_eq!(read.attributes, class.attributes);

        // A second pass reuses the original indices
        let again = round_trip(&read);
        assert_eq!(again.attributes, class.attributes);
    }

    #[test]
    fn rejects_garbage() {
        assert!(read_class(&[0xCA, 0xFE, 0xBA], ReadOptions::default()).is_err());
        assert!(read_class(&[0, 0, 0, 0, 0, 0, 0, 52], ReadOptions::default()).is_err());
        let mut bytes = write_class(&ClassBuilder::new("p/T").build()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(read_class(&bytes, ReadOptions::default()).is_err());
    }
}
