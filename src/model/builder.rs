//! Fluent construction of classes and method bodies.
//!
//! [`CodeBuilder`] appends instructions in their general form and hands out labels;
//! [`ClassBuilder`] assembles a [`ClassFile`] from fields and methods. Maximum stack and
//! locals are left at zero, the class writer computes them.
//!
//! # Examples
//!
//! ```rust
//! use classveil::model::{builder::ClassBuilder, AccessFlags};
//!
//! let class = ClassBuilder::new("demo/Point")
//!     .field(AccessFlags::PRIVATE, "x", "I")
//!     .method(AccessFlags::PUBLIC, "getX", "()I", |code| {
//!         code.aload(0).getfield("demo/Point", "x", "I").ireturn();
//!     })
//!     .build();
//!
//! assert_eq!(class.methods.len(), 1);
//! assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
//! ```

use crate::model::{
    opcodes::*, AccessFlags, ClassFile, Code, Constant, Field, Insn, InsnList, Label,
    LocalVariable, Method, TryCatchBlock,
};

/// Appends instructions to a method body.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    insns: Vec<Insn>,
    try_catch_blocks: Vec<TryCatchBlock>,
    local_variables: Vec<LocalVariable>,
}

impl CodeBuilder {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        CodeBuilder::default()
    }

    /// Appends any node.
    pub fn insn(&mut self, insn: Insn) -> &mut Self {
        self.insns.push(insn);
        self
    }

    /// Appends all nodes of an existing list.
    pub fn append(&mut self, insns: InsnList) -> &mut Self {
        self.insns.extend(insns);
        self
    }

    /// Creates a label without placing it.
    pub fn new_label(&mut self) -> Label {
        Label::new()
    }

    /// Places `label` at the current position.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.insn(Insn::Label(label))
    }

    /// Places a fresh label followed by a line number marker.
    pub fn line(&mut self, line: u16) -> &mut Self {
        let start = Label::new();
        self.mark(start).insn(Insn::LineNumber { line, start })
    }

    /// Appends an instruction without operands.
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.insn(Insn::Simple(opcode))
    }

    /// Pushes an int with the smallest suitable instruction.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.insn(Insn::int_push(value))
    }

    /// `ldc` of a string.
    pub fn ldc_str(&mut self, value: impl Into<String>) -> &mut Self {
        self.insn(Insn::Ldc(Constant::String(value.into())))
    }

    /// `ldc` of any constant.
    pub fn ldc(&mut self, value: Constant) -> &mut Self {
        self.insn(Insn::Ldc(value))
    }

    /// Appends a local variable instruction.
    pub fn var(&mut self, opcode: u8, var: u16) -> &mut Self {
        self.insn(Insn::Var { opcode, var })
    }

    /// `iload`
    pub fn iload(&mut self, var: u16) -> &mut Self {
        self.var(ILOAD, var)
    }

    /// `aload`
    pub fn aload(&mut self, var: u16) -> &mut Self {
        self.var(ALOAD, var)
    }

    /// `istore`
    pub fn istore(&mut self, var: u16) -> &mut Self {
        self.var(ISTORE, var)
    }

    /// `astore`
    pub fn astore(&mut self, var: u16) -> &mut Self {
        self.var(ASTORE, var)
    }

    /// `iinc`
    pub fn iinc(&mut self, var: u16, incr: i16) -> &mut Self {
        self.insn(Insn::Iinc { var, incr })
    }

    fn field_insn(&mut self, opcode: u8, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.insn(Insn::Field {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        })
    }

    /// `getfield`
    pub fn getfield(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.field_insn(GETFIELD, owner, name, desc)
    }

    /// `putfield`
    pub fn putfield(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.field_insn(PUTFIELD, owner, name, desc)
    }

    /// `getstatic`
    pub fn getstatic(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.field_insn(GETSTATIC, owner, name, desc)
    }

    /// `putstatic`
    pub fn putstatic(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.field_insn(PUTSTATIC, owner, name, desc)
    }

    fn method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        desc: &str,
        interface: bool,
    ) -> &mut Self {
        self.insn(Insn::Method {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            interface,
        })
    }

    /// `invokevirtual`
    pub fn invokevirtual(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.method_insn(INVOKEVIRTUAL, owner, name, desc, false)
    }

    /// `invokespecial`
    pub fn invokespecial(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.method_insn(INVOKESPECIAL, owner, name, desc, false)
    }

    /// `invokestatic` on a class
    pub fn invokestatic(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.method_insn(INVOKESTATIC, owner, name, desc, false)
    }

    /// `invokeinterface`
    pub fn invokeinterface(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.method_insn(INVOKEINTERFACE, owner, name, desc, true)
    }

    /// Appends a type instruction (`new`, `anewarray`, `checkcast`, `instanceof`).
    pub fn type_insn(&mut self, opcode: u8, desc: &str) -> &mut Self {
        self.insn(Insn::Type {
            opcode,
            desc: desc.to_string(),
        })
    }

    /// `new`
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.type_insn(NEW, class)
    }

    /// `anewarray`
    pub fn anewarray(&mut self, class: &str) -> &mut Self {
        self.type_insn(ANEWARRAY, class)
    }

    /// Appends a branch to `target`.
    pub fn jump(&mut self, opcode: u8, target: Label) -> &mut Self {
        self.insn(Insn::Jump { opcode, target })
    }

    /// `dup`
    pub fn dup(&mut self) -> &mut Self {
        self.op(DUP)
    }

    /// `pop`
    pub fn pop(&mut self) -> &mut Self {
        self.op(POP)
    }

    /// `aastore`
    pub fn aastore(&mut self) -> &mut Self {
        self.op(AASTORE)
    }

    /// `aaload`
    pub fn aaload(&mut self) -> &mut Self {
        self.op(AALOAD)
    }

    /// `ireturn`
    pub fn ireturn(&mut self) -> &mut Self {
        self.op(IRETURN)
    }

    /// `areturn`
    pub fn areturn(&mut self) -> &mut Self {
        self.op(ARETURN)
    }

    /// `return`
    pub fn vreturn(&mut self) -> &mut Self {
        self.op(RETURN)
    }

    /// `athrow`
    pub fn athrow(&mut self) -> &mut Self {
        self.op(ATHROW)
    }

    /// Registers an exception handler region.
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    /// Registers a local variable table entry.
    pub fn local(&mut self, name: &str, desc: &str, start: Label, end: Label, index: u16) -> &mut Self {
        self.local_variables.push(LocalVariable {
            name: name.to_string(),
            desc: desc.to_string(),
            signature: None,
            start,
            end,
            index,
        });
        self
    }

    /// Finishes the body.
    #[must_use]
    pub fn build(self) -> Code {
        Code {
            max_stack: 0,
            max_locals: 0,
            instructions: InsnList::from(self.insns),
            try_catch_blocks: self.try_catch_blocks,
            local_variables: self.local_variables,
        }
    }
}

/// Assembles a [`ClassFile`].
#[derive(Debug)]
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Starts a public class extending `java/lang/Object`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            class: ClassFile::new(name, Some("java/lang/Object")),
        }
    }

    /// Starts a public interface.
    #[must_use]
    pub fn interface(name: &str) -> Self {
        let mut class = ClassFile::new(name, Some("java/lang/Object"));
        class.access = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        ClassBuilder { class }
    }

    /// Replaces the access flags.
    #[must_use]
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.class.access = access;
        self
    }

    /// Sets the major version.
    #[must_use]
    pub fn version(mut self, major: u16) -> Self {
        self.class.major_version = major;
        self
    }

    /// Sets the superclass.
    #[must_use]
    pub fn extends(mut self, super_name: &str) -> Self {
        self.class.super_name = Some(super_name.to_string());
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.class.interfaces.push(interface.to_string());
        self
    }

    /// Sets the `SourceFile` attribute.
    #[must_use]
    pub fn source_file(mut self, file: &str) -> Self {
        self.class.source_file = Some(file.to_string());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, access: AccessFlags, name: &str, desc: &str) -> Self {
        self.class.fields.push(Field::new(access, name, desc));
        self
    }

    /// Adds a method with a body produced by `body`.
    #[must_use]
    pub fn method(
        mut self,
        access: AccessFlags,
        name: &str,
        desc: &str,
        body: impl FnOnce(&mut CodeBuilder),
    ) -> Self {
        let mut code = CodeBuilder::new();
        body(&mut code);
        let mut method = Method::new(access, name, desc);
        method.code = Some(code.build());
        self.class.methods.push(method);
        self
    }

    /// Adds a method without body.
    #[must_use]
    pub fn abstract_method(mut self, access: AccessFlags, name: &str, desc: &str) -> Self {
        self.class.methods.push(Method::new(access, name, desc));
        self
    }

    /// Adds a public no-argument constructor calling the superclass constructor.
    #[must_use]
    pub fn default_constructor(self) -> Self {
        let super_name = self
            .class
            .super_name
            .clone()
            .unwrap_or_else(|| "java/lang/Object".to_string());
        self.method(AccessFlags::PUBLIC, "<init>", "()V", |code| {
            code.aload(0)
                .invokespecial(&super_name, "<init>", "()V")
                .vreturn();
        })
    }

    /// Adds a prepared method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.class.methods.push(method);
        self
    }

    /// Finishes the class.
    #[must_use]
    pub fn build(self) -> ClassFile {
        self.class
    }
}
