//! Applying renames to every reference in a load set.
//!
//! The renaming passes only decide *what* gets a new name; they record their decisions in a
//! [`Mapping`] and hand it to a [`Remapper`], which rewrites every place a class, field or
//! method name can occur:
//!
//! - declarations, superclass, interfaces and the nest, inner class and enclosing method
//!   attributes
//! - descriptors and generic signatures, including type arguments and inner class suffixes
//! - instruction operands, constants, method handles, bootstrap arguments and frames
//! - annotations, local variables and handler types
//! - `META-INF/services` descriptors and the manifest `Main-Class`
//! - the versioned classes of multi-release jars, which are decoded, remapped and moved to
//!   their new entry names
//!
//! Member lookups always use the *old* owner and descriptor, so one mapping built against the
//! original names describes the whole rename.

use std::collections::HashMap;

use crate::{
    archive::{
        load_error, manifest_attribute, replace_manifest_attribute, versioned_class,
        CLASS_SUFFIX,
    },
    codec::{read_class, write_class, ReadOptions},
    model::{
        descriptor, Annotation, Annotations, ClassFile, Code, Constant, ElementValue, Handle,
        Insn, LoadSet, Method, VerificationType,
    },
    Result,
};

const SERVICES: &str = "META-INF/services/";
const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Old-to-new names of classes, fields and methods.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    classes: HashMap<String, String>,
    fields: HashMap<String, HashMap<String, String>>,
    methods: HashMap<String, HashMap<String, String>>,
}

impl Mapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Mapping::default()
    }

    /// Records a class rename. Returns `false` for an identity rename, which is dropped.
    pub fn map_class(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return false;
        }
        log::debug!("class {old} -> {new}");
        self.classes.insert(old.to_string(), new.to_string());
        true
    }

    /// Records a field rename. Returns `false` for an identity rename, which is dropped.
    pub fn map_field(&mut self, owner: &str, name: &str, new: &str) -> bool {
        if name == new {
            return false;
        }
        log::debug!("field {owner}.{name} -> {new}");
        self.fields
            .entry(owner.to_string())
            .or_default()
            .insert(name.to_string(), new.to_string());
        true
    }

    /// Records a method rename. Returns `false` for an identity rename, which is dropped.
    pub fn map_method(&mut self, owner: &str, name: &str, desc: &str, new: &str) -> bool {
        if name == new {
            return false;
        }
        log::debug!("method {owner}.{name}{desc} -> {new}");
        self.methods
            .entry(owner.to_string())
            .or_default()
            .insert(format!("{name}{desc}"), new.to_string());
        true
    }

    /// New name of a class, if renamed.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }

    /// New name of a field, if renamed.
    #[must_use]
    pub fn field(&self, owner: &str, name: &str) -> Option<&str> {
        self.fields.get(owner)?.get(name).map(String::as_str)
    }

    /// New name of a method, if renamed.
    #[must_use]
    pub fn method(&self, owner: &str, name: &str, desc: &str) -> Option<&str> {
        self.methods
            .get(owner)?
            .get(&format!("{name}{desc}"))
            .map(String::as_str)
    }

    /// Number of recorded renames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
            + self.fields.values().map(HashMap::len).sum::<usize>()
            + self.methods.values().map(HashMap::len).sum::<usize>()
    }

    /// Returns `true` if nothing is renamed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rewrites references according to a [`Mapping`].
#[derive(Debug, Clone, Copy)]
pub struct Remapper<'m> {
    mapping: &'m Mapping,
}

impl<'m> Remapper<'m> {
    /// Creates a remapper for `mapping`.
    #[must_use]
    pub fn new(mapping: &'m Mapping) -> Self {
        Remapper { mapping }
    }

    /// Rewrites every class, re-keys the load set and updates resources naming classes.
    ///
    /// # Errors
    /// Returns [`crate::Error::NameCollision`] if two classes end up with the same name, and
    /// [`crate::Error::Load`] for a versioned class that can not be decoded.
    pub fn apply(&self, set: &mut LoadSet) -> Result<()> {
        if self.mapping.is_empty() {
            return Ok(());
        }
        set.try_for_each_class(|class| {
            self.class(class);
            Ok(())
        })?;
        set.rekey()?;
        self.resources(set);
        self.versioned_classes(set)
    }

    /// Remaps the `META-INF/versions/<n>/` copies of classes and moves them to their new
    /// entry names.
    ///
    /// # Errors
    /// Returns [`crate::Error::Load`] naming an entry that can not be decoded.
    pub fn versioned_classes(&self, set: &mut LoadSet) -> Result<()> {
        let entries: Vec<String> = set
            .resources()
            .map(|(path, _)| path)
            .filter(|path| versioned_class(path).is_some())
            .map(str::to_string)
            .collect();

        let mut remapped = Vec::with_capacity(entries.len());
        for path in entries {
            let Some(data) = set.remove_resource(&path) else {
                continue;
            };
            let Some((version, _)) = versioned_class(&path) else {
                continue;
            };
            let mut class =
                read_class(&data, ReadOptions::default()).map_err(|e| load_error(&path, e))?;
            self.class(&mut class);
            let target = format!("{version}{}{CLASS_SUFFIX}", class.name);
            if target != path {
                log::debug!("Versioned class {path} -> {target}");
            }
            remapped.push((target, write_class(&class)?));
        }
        for (target, data) in remapped {
            set.insert_resource(target, data);
        }
        Ok(())
    }

    /// Maps an internal name or an array descriptor.
    #[must_use]
    pub fn class_name(&self, name: &str) -> String {
        if name.starts_with('[') {
            return self.desc(name);
        }
        self.mapping.class(name).unwrap_or(name).to_string()
    }

    /// Maps every class named in a field or method descriptor.
    #[must_use]
    pub fn desc(&self, desc: &str) -> String {
        if !desc.contains('L') {
            return desc.to_string();
        }
        let mut out = String::with_capacity(desc.len());
        let mut rest = desc;
        while let Some(start) = rest.find('L') {
            out.push_str(&rest[..=start]);
            rest = &rest[start + 1..];
            let Some(end) = rest.find(';') else {
                out.push_str(rest);
                return out;
            };
            out.push_str(&self.class_name(&rest[..end]));
            rest = &rest[end..];
        }
        out.push_str(rest);
        out
    }

    /// Maps every class named in a generic signature. Unparseable signatures are kept.
    #[must_use]
    pub fn signature(&self, signature: &str) -> String {
        let mut parser = SignatureRemapper {
            remapper: self,
            input: signature.as_bytes(),
            pos: 0,
            out: String::with_capacity(signature.len()),
        };
        match parser.run() {
            Some(()) => parser.out,
            None => {
                log::debug!("Keeping unparseable signature {signature}");
                signature.to_string()
            }
        }
    }

    fn method_name(&self, owner: &str, name: &str, desc: &str) -> Option<String> {
        self.mapping.method(owner, name, desc).map(str::to_string)
    }

    fn field_name(&self, owner: &str, name: &str) -> Option<String> {
        self.mapping.field(owner, name).map(str::to_string)
    }

    /// Maps a method handle.
    #[must_use]
    pub fn handle(&self, handle: &Handle) -> Handle {
        let name = if handle.kind.is_field() {
            self.field_name(&handle.owner, &handle.name)
        } else {
            self.method_name(&handle.owner, &handle.name, &handle.desc)
        };
        Handle {
            kind: handle.kind,
            owner: self.class_name(&handle.owner),
            name: name.unwrap_or_else(|| handle.name.clone()),
            desc: self.desc(&handle.desc),
            interface: handle.interface,
        }
    }

    /// Maps a loadable constant.
    #[must_use]
    pub fn constant(&self, constant: &Constant) -> Constant {
        match constant {
            Constant::Class(name) => Constant::Class(self.class_name(name)),
            Constant::MethodType(desc) => Constant::MethodType(self.desc(desc)),
            Constant::MethodHandle(handle) => Constant::MethodHandle(self.handle(handle)),
            Constant::Dynamic(dynamic) => {
                let mut dynamic = dynamic.clone();
                dynamic.desc = self.desc(&dynamic.desc);
                dynamic.bsm = self.handle(&dynamic.bsm);
                dynamic.args = dynamic.args.iter().map(|arg| self.constant(arg)).collect();
                Constant::Dynamic(dynamic)
            }
            other => other.clone(),
        }
    }

    fn verification_type(&self, ty: &mut VerificationType) {
        if let VerificationType::Object(name) = ty {
            *name = self.class_name(name);
        }
    }

    /// Maps the operands of one instruction in place.
    pub fn insn(&self, insn: &mut Insn) {
        match insn {
            Insn::Type { desc, .. } => *desc = self.class_name(desc),
            Insn::Field {
                owner, name, desc, ..
            } => {
                if let Some(new) = self.field_name(owner, name) {
                    *name = new;
                }
                *owner = self.class_name(owner);
                *desc = self.desc(desc);
            }
            Insn::Method {
                owner, name, desc, ..
            } => {
                if let Some(new) = self.method_name(owner, name, desc) {
                    *name = new;
                }
                *owner = self.class_name(owner);
                *desc = self.desc(desc);
            }
            Insn::InvokeDynamic {
                name,
                desc,
                bsm,
                args,
            } => {
                if let Some(new) = self.lambda_name(name, desc, bsm, args) {
                    *name = new;
                }
                *desc = self.desc(desc);
                *bsm = self.handle(bsm);
                for arg in args.iter_mut() {
                    *arg = self.constant(arg);
                }
            }
            Insn::Ldc(constant) => *constant = self.constant(constant),
            Insn::MultiANewArray { desc, .. } => *desc = self.desc(desc),
            Insn::Frame { locals, stack } => {
                for ty in locals.iter_mut().chain(stack.iter_mut()) {
                    self.verification_type(ty);
                }
            }
            _ => {}
        }
    }

    /// The implemented method of a lambda call site follows renames of the functional
    /// interface method.
    fn lambda_name(&self, name: &str, desc: &str, bsm: &Handle, args: &[Constant]) -> Option<String> {
        if bsm.owner != LAMBDA_METAFACTORY {
            return None;
        }
        let (_, ret) = descriptor::split_method(desc).ok()?;
        let interface = descriptor::object_name(ret)?;
        let Some(Constant::MethodType(sam)) = args.first() else {
            return None;
        };
        self.method_name(interface, name, sam)
    }

    fn annotation(&self, annotation: &mut Annotation) {
        annotation.desc = self.desc(&annotation.desc);
        for (_, value) in &mut annotation.values {
            self.element_value(value);
        }
    }

    fn annotations(&self, annotations: &mut Annotations) {
        for annotation in annotations.iter_mut() {
            self.annotation(annotation);
        }
    }

    fn element_value(&self, value: &mut ElementValue) {
        match value {
            // constants resolve through `Enum.name()`, which keeps the declared name
            ElementValue::Enum { desc, .. } => *desc = self.desc(desc),
            ElementValue::Class(desc) => *desc = self.desc(desc),
            ElementValue::Annotation(annotation) => self.annotation(annotation),
            ElementValue::Array(values) => {
                for value in values {
                    self.element_value(value);
                }
            }
            _ => {}
        }
    }

    fn code(&self, code: &mut Code) {
        for insn in code.instructions.iter_mut() {
            self.insn(insn);
        }
        for block in &mut code.try_catch_blocks {
            if let Some(catch_type) = &mut block.catch_type {
                *catch_type = self.class_name(catch_type);
            }
        }
        for local in &mut code.local_variables {
            local.desc = self.desc(&local.desc);
            if let Some(signature) = &mut local.signature {
                *signature = self.signature(signature);
            }
        }
    }

    fn method(&self, owner: &str, method: &mut Method) {
        if let Some(new) = self.method_name(owner, &method.name, &method.desc) {
            method.name = new;
        }
        method.desc = self.desc(&method.desc);
        if let Some(signature) = &mut method.signature {
            *signature = self.signature(signature);
        }
        for exception in &mut method.exceptions {
            *exception = self.class_name(exception);
        }
        if let Some(code) = &mut method.code {
            self.code(code);
        }
        for parameters in [
            &mut method.visible_parameter_annotations,
            &mut method.invisible_parameter_annotations,
        ]
        .into_iter()
        .flatten()
        {
            for annotation in parameters.iter_mut().flatten() {
                self.annotation(annotation);
            }
        }
        if let Some(value) = &mut method.annotation_default {
            self.element_value(value);
        }
        self.annotations(&mut method.annotations);
    }

    /// Simple name of a renamed nested class, the part after the last `/` and `$`.
    fn simple_name(name: &str) -> &str {
        let simple = name.rsplit('/').next().unwrap_or(name);
        simple.rsplit('$').next().unwrap_or(simple)
    }

    /// Maps every reference in `class`, including its own name.
    pub fn class(&self, class: &mut ClassFile) {
        let owner = class.name.clone();

        for field in &mut class.fields {
            if let Some(new) = self.field_name(&owner, &field.name) {
                field.name = new;
            }
            field.desc = self.desc(&field.desc);
            if let Some(signature) = &mut field.signature {
                *signature = self.signature(signature);
            }
            self.annotations(&mut field.annotations);
        }
        for method in &mut class.methods {
            self.method(&owner, method);
        }
        if let Some(components) = &mut class.record_components {
            for component in components {
                if let Some(new) = self.field_name(&owner, &component.name) {
                    component.name = new;
                }
                component.desc = self.desc(&component.desc);
                if let Some(signature) = &mut component.signature {
                    *signature = self.signature(signature);
                }
                self.annotations(&mut component.annotations);
            }
        }

        class.name = self.class_name(&class.name);
        if let Some(super_name) = &mut class.super_name {
            *super_name = self.class_name(super_name);
        }
        for interface in &mut class.interfaces {
            *interface = self.class_name(interface);
        }
        if let Some(signature) = &mut class.signature {
            *signature = self.signature(signature);
        }
        for inner in &mut class.inner_classes {
            if let Some(new) = self.mapping.class(&inner.inner) {
                if let Some(inner_name) = &mut inner.inner_name {
                    *inner_name = Self::simple_name(new).to_string();
                }
            }
            inner.inner = self.class_name(&inner.inner);
            if let Some(outer) = &mut inner.outer {
                *outer = self.class_name(outer);
            }
        }
        if let Some(enclosing) = &mut class.enclosing_method {
            if let Some((name, desc)) = &mut enclosing.method {
                if let Some(new) = self.method_name(&enclosing.owner, name, desc) {
                    *name = new;
                }
                *desc = self.desc(desc);
            }
            enclosing.owner = self.class_name(&enclosing.owner);
        }
        if let Some(host) = &mut class.nest_host {
            *host = self.class_name(host);
        }
        for member in class
            .nest_members
            .iter_mut()
            .chain(class.permitted_subclasses.iter_mut())
        {
            *member = self.class_name(member);
        }
        self.annotations(&mut class.annotations);
    }

    fn binary_name(&self, binary: &str) -> String {
        self.class_name(&binary.replace('.', "/")).replace('/', ".")
    }

    /// Renames service descriptors and their provider entries, and the manifest
    /// `Main-Class`.
    pub fn resources(&self, set: &mut LoadSet) {
        let services: Vec<String> = set
            .resources()
            .map(|(path, _)| path)
            .filter(|path| path.starts_with(SERVICES) && path.len() > SERVICES.len())
            .map(str::to_string)
            .collect();
        for path in services {
            let Some(data) = set.remove_resource(&path) else {
                continue;
            };
            let service = self.binary_name(&path[SERVICES.len()..]);
            let text = String::from_utf8_lossy(&data);
            let mut rewritten = String::with_capacity(text.len());
            for line in text.split_inclusive('\n') {
                let content = line.split('#').next().unwrap_or("").trim();
                if content.is_empty() {
                    rewritten.push_str(line);
                } else {
                    rewritten.push_str(&line.replacen(content, &self.binary_name(content), 1));
                }
            }
            set.insert_resource(format!("{SERVICES}{service}"), rewritten.into_bytes());
        }

        if let Some(main) = manifest_attribute(set, "Main-Class") {
            let mapped = self.binary_name(&main);
            if mapped != main {
                log::debug!("Main-Class {main} -> {mapped}");
                replace_manifest_attribute(set, "Main-Class", &mapped);
            }
        }
    }
}

/// Recursive descent over the generic signature grammar (JVMS 4.7.9.1).
struct SignatureRemapper<'r, 's> {
    remapper: &'r Remapper<'r>,
    input: &'s [u8],
    pos: usize,
    out: String,
}

impl SignatureRemapper<'_, '_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn copy(&mut self) -> Option<()> {
        let byte = self.bump()?;
        self.out.push(char::from(byte));
        Some(())
    }

    /// Reads up to, not including, any byte of `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Option<&str> {
        let start = self.pos;
        while !stops.contains(&self.peek()?) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos]).ok()
    }

    fn run(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.copy()?;
            while self.peek()? != b'>' {
                let name = self.identifier(b":")?.to_string();
                self.out.push_str(&name);
                while self.peek() == Some(b':') {
                    self.copy()?;
                    if matches!(self.peek()?, b'L' | b'[' | b'T') {
                        self.type_signature()?;
                    }
                }
            }
            self.copy()?;
        }
        while let Some(byte) = self.peek() {
            match byte {
                b'(' | b')' | b'^' => self.copy()?,
                _ => self.type_signature()?,
            }
        }
        Some(())
    }

    fn type_signature(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => self.copy(),
            b'[' => {
                self.copy()?;
                self.type_signature()
            }
            b'T' => {
                let name = self.identifier(b";")?.to_string();
                self.out.push_str(&name);
                self.copy()
            }
            b'L' => self.class_type(),
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.copy()?;
        let mut old = self.identifier(b"<.;")?.to_string();
        let mut new = self.remapper.class_name(&old);
        self.out.push_str(&new);
        loop {
            match self.peek()? {
                b'<' => {
                    self.copy()?;
                    while self.peek()? != b'>' {
                        match self.peek()? {
                            b'*' => self.copy()?,
                            b'+' | b'-' => {
                                self.copy()?;
                                self.type_signature()?;
                            }
                            _ => self.type_signature()?,
                        }
                    }
                    self.copy()?;
                }
                b'.' => {
                    self.copy()?;
                    let inner = self.identifier(b"<.;")?.to_string();
                    old = format!("{old}${inner}");
                    let mapped = self.remapper.class_name(&old);
                    let suffix = match mapped.strip_prefix(&format!("{new}$")) {
                        Some(rest) => rest.to_string(),
                        None if mapped == old => inner,
                        None => Remapper::simple_name(&mapped).to_string(),
                    };
                    self.out.push_str(&suffix);
                    new = mapped;
                }
                b';' => return self.copy(),
                _ => return None,
            }
        }
    }
}
