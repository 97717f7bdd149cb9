//! The constant pool, as read and as rebuilt.

use std::{collections::HashMap, sync::Arc};

use crate::{
    file::{io::push_be, mutf8, parser::Parser},
    model::{Constant, ConstantDynamic, Handle, HandleKind},
    Error, Result,
};

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;
const CONSTANT_METHOD_HANDLE: u8 = 15;
const CONSTANT_METHOD_TYPE: u8 = 16;
const CONSTANT_DYNAMIC: u8 = 17;
const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

/// Nesting limit for dynamic constants whose bootstrap arguments are dynamic constants.
const MAX_DYNAMIC_DEPTH: usize = 32;

/// A raw constant pool entry. Floating point values are kept as bits so entries can be
/// hashed for interning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, nat: u16 },
    MethodRef { class: u16, nat: u16 },
    InterfaceMethodRef { class: u16, nat: u16 },
    NameAndType { name: u16, desc: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bsm: u16, nat: u16 },
    InvokeDynamic { bsm: u16, nat: u16 },
    Module(u16),
    Package(u16),
}

impl PoolEntry {
    fn is_wide(&self) -> bool {
        matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
    }
}

/// The entries of a constant pool as read, index 0 and the second slots of wide entries
/// being `None`.
pub(crate) type SourcePool = Arc<[Option<PoolEntry>]>;

/// A `BootstrapMethods` entry as read.
#[derive(Debug, Clone)]
pub(crate) struct RawBootstrap {
    pub handle: u16,
    pub args: Vec<u16>,
}

/// Read access to a decoded constant pool.
pub(crate) struct ConstantPool {
    entries: Vec<Option<PoolEntry>>,
    bootstrap: Vec<RawBootstrap>,
}

impl ConstantPool {
    /// Parses the `constant_pool_count` and all entries.
    pub fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let count = usize::from(parser.read_be::<u16>()?);
        if count == 0 {
            return Err(malformed_error!("Constant pool count of zero"));
        }

        let mut entries: Vec<Option<PoolEntry>> = Vec::with_capacity(count);
        entries.push(None);
        while entries.len() < count {
            let tag = parser.read_be::<u8>()?;
            let entry = match tag {
                CONSTANT_UTF8 => PoolEntry::Utf8(parser.read_mutf8()?),
                CONSTANT_INTEGER => PoolEntry::Integer(parser.read_be()?),
                CONSTANT_FLOAT => PoolEntry::Float(parser.read_be()?),
                CONSTANT_LONG => PoolEntry::Long(parser.read_be()?),
                CONSTANT_DOUBLE => PoolEntry::Double(parser.read_be()?),
                CONSTANT_CLASS => PoolEntry::Class(parser.read_be()?),
                CONSTANT_STRING => PoolEntry::String(parser.read_be()?),
                CONSTANT_FIELDREF => PoolEntry::FieldRef {
                    class: parser.read_be()?,
                    nat: parser.read_be()?,
                },
                CONSTANT_METHODREF => PoolEntry::MethodRef {
                    class: parser.read_be()?,
                    nat: parser.read_be()?,
                },
                CONSTANT_INTERFACE_METHODREF => PoolEntry::InterfaceMethodRef {
                    class: parser.read_be()?,
                    nat: parser.read_be()?,
                },
                CONSTANT_NAME_AND_TYPE => PoolEntry::NameAndType {
                    name: parser.read_be()?,
                    desc: parser.read_be()?,
                },
                CONSTANT_METHOD_HANDLE => PoolEntry::MethodHandle {
                    kind: parser.read_be()?,
                    reference: parser.read_be()?,
                },
                CONSTANT_METHOD_TYPE => PoolEntry::MethodType(parser.read_be()?),
                CONSTANT_DYNAMIC => PoolEntry::Dynamic {
                    bsm: parser.read_be()?,
                    nat: parser.read_be()?,
                },
                CONSTANT_INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
                    bsm: parser.read_be()?,
                    nat: parser.read_be()?,
                },
                CONSTANT_MODULE => PoolEntry::Module(parser.read_be()?),
                CONSTANT_PACKAGE => PoolEntry::Package(parser.read_be()?),
                _ => {
                    return Err(malformed_error!(
                        "Unknown constant pool tag {} at index {}",
                        tag,
                        entries.len()
                    ))
                }
            };
            let wide = entry.is_wide();
            entries.push(Some(entry));
            if wide {
                entries.push(None);
            }
        }

        if entries.len() != count {
            return Err(malformed_error!("Wide constant overruns the constant pool"));
        }

        Ok(ConstantPool {
            entries,
            bootstrap: Vec::new(),
        })
    }

    /// Installs the decoded `BootstrapMethods` table.
    pub fn set_bootstrap(&mut self, bootstrap: Vec<RawBootstrap>) {
        self.bootstrap = bootstrap;
    }

    /// Returns a shareable copy of the entries.
    pub fn share(&self) -> SourcePool {
        Arc::from(self.entries.clone())
    }

    fn entry(&self, index: u16) -> Result<&PoolEntry> {
        self.entries
            .get(usize::from(index))
            .and_then(Option::as_ref)
            .ok_or_else(|| malformed_error!("Invalid constant pool index {}", index))
    }

    /// Resolves a `CONSTANT_Utf8`.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            PoolEntry::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Expected Utf8 at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a `CONSTANT_Class` to its internal name.
    pub fn class(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            PoolEntry::Class(name) => self.utf8(*name),
            other => Err(malformed_error!(
                "Expected Class at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves an optional `CONSTANT_Class`, where index 0 means absent.
    pub fn class_opt(&self, index: u16) -> Result<Option<String>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class(index).map(|name| Some(name.to_string()))
        }
    }

    /// Resolves an optional `CONSTANT_Utf8`, where index 0 means absent.
    pub fn utf8_opt(&self, index: u16) -> Result<Option<String>> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index).map(|value| Some(value.to_string()))
        }
    }

    /// Resolves a `CONSTANT_NameAndType` to name and descriptor.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.entry(index)? {
            PoolEntry::NameAndType { name, desc } => Ok((self.utf8(*name)?, self.utf8(*desc)?)),
            other => Err(malformed_error!(
                "Expected NameAndType at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a field or method reference to owner, name, descriptor and interface flag.
    pub fn member_ref(&self, index: u16) -> Result<(String, String, String, bool)> {
        let (class, nat, interface) = match self.entry(index)? {
            PoolEntry::FieldRef { class, nat } | PoolEntry::MethodRef { class, nat } => {
                (*class, *nat, false)
            }
            PoolEntry::InterfaceMethodRef { class, nat } => (*class, *nat, true),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at index {}, found {:?}",
                    index,
                    other
                ))
            }
        };
        let owner = self.class(class)?;
        let (name, desc) = self.name_and_type(nat)?;
        Ok((
            owner.to_string(),
            name.to_string(),
            desc.to_string(),
            interface,
        ))
    }

    /// Resolves a `CONSTANT_MethodHandle`.
    pub fn handle(&self, index: u16) -> Result<Handle> {
        match self.entry(index)? {
            PoolEntry::MethodHandle { kind, reference } => {
                let kind = HandleKind::from_u8(*kind)
                    .ok_or_else(|| malformed_error!("Invalid method handle kind {}", kind))?;
                let (owner, name, desc, interface) = self.member_ref(*reference)?;
                Ok(Handle {
                    kind,
                    owner,
                    name,
                    desc,
                    interface,
                })
            }
            other => Err(malformed_error!(
                "Expected MethodHandle at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a bootstrap method table entry to handle and arguments.
    pub fn bootstrap(&self, index: u16, depth: usize) -> Result<(Handle, Vec<Constant>)> {
        let raw = self
            .bootstrap
            .get(usize::from(index))
            .ok_or_else(|| malformed_error!("Invalid bootstrap method index {}", index))?;
        let handle = self.handle(raw.handle)?;
        let args = raw
            .args
            .iter()
            .map(|&arg| self.constant_at_depth(arg, depth + 1))
            .collect::<Result<Vec<_>>>()?;
        Ok((handle, args))
    }

    /// Resolves an `invokedynamic` operand to name, descriptor, bootstrap handle and arguments.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(String, String, Handle, Vec<Constant>)> {
        match self.entry(index)? {
            PoolEntry::InvokeDynamic { bsm, nat } => {
                let (name, desc) = self.name_and_type(*nat)?;
                let (handle, args) = self.bootstrap(*bsm, 0)?;
                Ok((name.to_string(), desc.to_string(), handle, args))
            }
            other => Err(malformed_error!(
                "Expected InvokeDynamic at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a loadable constant.
    pub fn constant(&self, index: u16) -> Result<Constant> {
        self.constant_at_depth(index, 0)
    }

    fn constant_at_depth(&self, index: u16, depth: usize) -> Result<Constant> {
        if depth > MAX_DYNAMIC_DEPTH {
            return Err(Error::RecursionLimit(MAX_DYNAMIC_DEPTH));
        }
        Ok(match self.entry(index)? {
            PoolEntry::Integer(value) => Constant::Int(*value),
            PoolEntry::Float(bits) => Constant::Float(f32::from_bits(*bits)),
            PoolEntry::Long(value) => Constant::Long(*value),
            PoolEntry::Double(bits) => Constant::Double(f64::from_bits(*bits)),
            PoolEntry::String(value) => Constant::String(self.utf8(*value)?.to_string()),
            PoolEntry::Class(name) => Constant::Class(self.utf8(*name)?.to_string()),
            PoolEntry::MethodType(desc) => Constant::MethodType(self.utf8(*desc)?.to_string()),
            PoolEntry::MethodHandle { .. } => Constant::MethodHandle(self.handle(index)?),
            PoolEntry::Dynamic { bsm, nat } => {
                let (name, desc) = self.name_and_type(*nat)?;
                let (handle, args) = self.bootstrap(*bsm, depth)?;
                Constant::Dynamic(Box::new(ConstantDynamic {
                    name: name.to_string(),
                    desc: desc.to_string(),
                    bsm: handle,
                    args,
                }))
            }
            other => {
                return Err(malformed_error!(
                    "Entry {} is not loadable: {:?}",
                    index,
                    other
                ))
            }
        })
    }
}

/// Builds the constant pool of a class being written, interning every entry once.
pub(crate) struct PoolBuilder {
    entries: Vec<Option<PoolEntry>>,
    lookup: HashMap<PoolEntry, u16>,
    bootstrap: Vec<(u16, Vec<u16>)>,
    bootstrap_lookup: HashMap<(u16, Vec<u16>), u16>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        PoolBuilder {
            entries: vec![None],
            lookup: HashMap::new(),
            bootstrap: Vec::new(),
            bootstrap_lookup: HashMap::new(),
        }
    }

    /// Starts from the pool a class was read with, keeping every index valid for
    /// attributes that are copied verbatim.
    pub fn seeded(source: &[Option<PoolEntry>]) -> Self {
        let mut builder = PoolBuilder {
            entries: source.to_vec(),
            lookup: HashMap::new(),
            bootstrap: Vec::new(),
            bootstrap_lookup: HashMap::new(),
        };
        if builder.entries.is_empty() {
            builder.entries.push(None);
        }
        for (index, entry) in builder.entries.iter_mut().enumerate() {
            match entry {
                // The bootstrap table is rebuilt, so these would point into a stale one
                Some(PoolEntry::Dynamic { .. } | PoolEntry::InvokeDynamic { .. }) => {
                    *entry = Some(PoolEntry::Utf8(String::new()));
                }
                Some(entry) => {
                    if let Ok(index) = u16::try_from(index) {
                        builder.lookup.entry(entry.clone()).or_insert(index);
                    }
                }
                None => {}
            }
        }
        builder
    }

    fn add(&mut self, entry: PoolEntry) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&entry) {
            return Ok(index);
        }
        let index = u16::try_from(self.entries.len()).map_err(|_| Error::PoolOverflow)?;
        let wide = entry.is_wide();
        let slots = if wide { 2 } else { 1 };
        if self.entries.len() + slots > usize::from(u16::MAX) {
            return Err(Error::PoolOverflow);
        }
        self.lookup.insert(entry.clone(), index);
        self.entries.push(Some(entry));
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }

    pub fn utf8(&mut self, value: &str) -> Result<u16> {
        if mutf8::encoded_len(value) > usize::from(u16::MAX) {
            return Err(malformed_error!(
                "String constant of {} bytes exceeds the Utf8 limit",
                mutf8::encoded_len(value)
            ));
        }
        self.add(PoolEntry::Utf8(value.to_string()))
    }

    pub fn class(&mut self, name: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        self.add(PoolEntry::Class(name))
    }

    pub fn string(&mut self, value: &str) -> Result<u16> {
        let value = self.utf8(value)?;
        self.add(PoolEntry::String(value))
    }

    pub fn name_and_type(&mut self, name: &str, desc: &str) -> Result<u16> {
        let name = self.utf8(name)?;
        let desc = self.utf8(desc)?;
        self.add(PoolEntry::NameAndType { name, desc })
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, desc: &str) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, desc)?;
        self.add(PoolEntry::FieldRef { class, nat })
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, desc: &str, interface: bool) -> Result<u16> {
        let class = self.class(owner)?;
        let nat = self.name_and_type(name, desc)?;
        if interface {
            self.add(PoolEntry::InterfaceMethodRef { class, nat })
        } else {
            self.add(PoolEntry::MethodRef { class, nat })
        }
    }

    pub fn integer(&mut self, value: i32) -> Result<u16> {
        self.add(PoolEntry::Integer(value))
    }

    pub fn long(&mut self, value: i64) -> Result<u16> {
        self.add(PoolEntry::Long(value))
    }

    pub fn float(&mut self, value: f32) -> Result<u16> {
        self.add(PoolEntry::Float(value.to_bits()))
    }

    pub fn double(&mut self, value: f64) -> Result<u16> {
        self.add(PoolEntry::Double(value.to_bits()))
    }

    pub fn handle(&mut self, handle: &Handle) -> Result<u16> {
        let reference = if handle.kind.is_field() {
            self.field_ref(&handle.owner, &handle.name, &handle.desc)?
        } else {
            self.method_ref(&handle.owner, &handle.name, &handle.desc, handle.interface)?
        };
        self.add(PoolEntry::MethodHandle {
            kind: handle.kind as u8,
            reference,
        })
    }

    pub fn bootstrap(&mut self, handle: &Handle, args: &[Constant]) -> Result<u16> {
        let handle = self.handle(handle)?;
        let args = args
            .iter()
            .map(|arg| self.constant(arg))
            .collect::<Result<Vec<_>>>()?;
        let key = (handle, args);
        if let Some(&index) = self.bootstrap_lookup.get(&key) {
            return Ok(index);
        }
        let index = u16::try_from(self.bootstrap.len()).map_err(|_| Error::PoolOverflow)?;
        self.bootstrap_lookup.insert(key.clone(), index);
        self.bootstrap.push(key);
        Ok(index)
    }

    pub fn invoke_dynamic(
        &mut self,
        name: &str,
        desc: &str,
        bsm: &Handle,
        args: &[Constant],
    ) -> Result<u16> {
        let bsm = self.bootstrap(bsm, args)?;
        let nat = self.name_and_type(name, desc)?;
        self.add(PoolEntry::InvokeDynamic { bsm, nat })
    }

    /// Interns a loadable constant.
    pub fn constant(&mut self, constant: &Constant) -> Result<u16> {
        match constant {
            Constant::Int(value) => self.integer(*value),
            Constant::Float(value) => self.float(*value),
            Constant::Long(value) => self.long(*value),
            Constant::Double(value) => self.double(*value),
            Constant::String(value) => self.string(value),
            Constant::Class(name) => self.class(name),
            Constant::MethodType(desc) => {
                let desc = self.utf8(desc)?;
                self.add(PoolEntry::MethodType(desc))
            }
            Constant::MethodHandle(handle) => self.handle(handle),
            Constant::Dynamic(dynamic) => {
                let bsm = self.bootstrap(&dynamic.bsm, &dynamic.args)?;
                let nat = self.name_and_type(&dynamic.name, &dynamic.desc)?;
                self.add(PoolEntry::Dynamic { bsm, nat })
            }
        }
    }

    /// Returns `true` if the class needs a `BootstrapMethods` attribute.
    pub fn has_bootstrap(&self) -> bool {
        !self.bootstrap.is_empty()
    }

    /// Encodes the `BootstrapMethods` attribute payload.
    pub fn bootstrap_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_be(&mut out, self.bootstrap.len() as u16);
        for (handle, args) in &self.bootstrap {
            push_be(&mut out, *handle);
            push_be(&mut out, args.len() as u16);
            for arg in args {
                push_be(&mut out, *arg);
            }
        }
        out
    }

    /// Encodes `constant_pool_count` and all entries.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(self.entries.len()).map_err(|_| Error::PoolOverflow)?;
        push_be(out, count);
        for entry in self.entries.iter().flatten() {
            match entry {
                PoolEntry::Utf8(value) => {
                    out.push(CONSTANT_UTF8);
                    let bytes = mutf8::encode(value);
                    push_be(out, bytes.len() as u16);
                    out.extend_from_slice(&bytes);
                }
                PoolEntry::Integer(value) => {
                    out.push(CONSTANT_INTEGER);
                    push_be(out, *value);
                }
                PoolEntry::Float(bits) => {
                    out.push(CONSTANT_FLOAT);
                    push_be(out, *bits);
                }
                PoolEntry::Long(value) => {
                    out.push(CONSTANT_LONG);
                    push_be(out, *value);
                }
                PoolEntry::Double(bits) => {
                    out.push(CONSTANT_DOUBLE);
                    push_be(out, *bits);
                }
                PoolEntry::Class(name) => {
                    out.push(CONSTANT_CLASS);
                    push_be(out, *name);
                }
                PoolEntry::String(value) => {
                    out.push(CONSTANT_STRING);
                    push_be(out, *value);
                }
                PoolEntry::FieldRef { class, nat } => {
                    out.push(CONSTANT_FIELDREF);
                    push_be(out, *class);
                    push_be(out, *nat);
                }
                PoolEntry::MethodRef { class, nat } => {
                    out.push(CONSTANT_METHODREF);
                    push_be(out, *class);
                    push_be(out, *nat);
                }
                PoolEntry::InterfaceMethodRef { class, nat } => {
                    out.push(CONSTANT_INTERFACE_METHODREF);
                    push_be(out, *class);
                    push_be(out, *nat);
                }
                PoolEntry::NameAndType { name, desc } => {
                    out.push(CONSTANT_NAME_AND_TYPE);
                    push_be(out, *name);
                    push_be(out, *desc);
                }
                PoolEntry::MethodHandle { kind, reference } => {
                    out.push(CONSTANT_METHOD_HANDLE);
                    out.push(*kind);
                    push_be(out, *reference);
                }
                PoolEntry::MethodType(desc) => {
                    out.push(CONSTANT_METHOD_TYPE);
                    push_be(out, *desc);
                }
                PoolEntry::Dynamic { bsm, nat } => {
                    out.push(CONSTANT_DYNAMIC);
                    push_be(out, *bsm);
                    push_be(out, *nat);
                }
                PoolEntry::InvokeDynamic { bsm, nat } => {
                    out.push(CONSTANT_INVOKE_DYNAMIC);
                    push_be(out, *bsm);
                    push_be(out, *nat);
                }
                PoolEntry::Module(name) => {
                    out.push(CONSTANT_MODULE);
                    push_be(out, *name);
                }
                PoolEntry::Package(name) => {
                    out.push(CONSTANT_PACKAGE);
                    push_be(out, *name);
                }
            }
        }
        Ok(())
    }
}
