//! String relocation.
//!
//! Every distinct string literal loaded by `ldc` moves into a static `String[]` of one
//! randomly chosen host class. Each load becomes `push <index>; invokestatic
//! Host.unscramble(I)Ljava/lang/String;`, and the host's static initializer fills the
//! table before running its original body. With encoding enabled the table holds Base64
//! text that `unscramble` decodes through `java.util.Base64`.
//!
//! Classes with a versioned copy in a multi-release jar never host the table, since that
//! copy replaces them on newer runtimes.

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::seq::SliceRandom;

use crate::{
    archive::versioned_class,
    model::{
        opcodes::*, AccessFlags, ClassFile, Code, Constant, Field, Insn, InsnList, LoadSet,
        Method,
    },
    obfuscate::{config::StringConfig, PassContext, Transform},
    Error, Result,
};

/// Strings stored by one population method, keeping it well below the code size limit.
const CHUNK: usize = 4096;

const STRING: &str = "java/lang/String";
const TABLE_DESC: &str = "[Ljava/lang/String;";
const UNSCRAMBLE_DESC: &str = "(I)Ljava/lang/String;";

/// Members synthesized in the host class.
#[derive(Debug, Clone)]
struct Table {
    host: String,
    field: String,
    method: String,
}

impl Table {
    fn load(&self) -> Insn {
        Insn::Field {
            opcode: GETSTATIC,
            owner: self.host.clone(),
            name: self.field.clone(),
            desc: TABLE_DESC.to_string(),
        }
    }

    fn call(&self) -> Insn {
        Insn::Method {
            opcode: INVOKESTATIC,
            owner: self.host.clone(),
            name: self.method.clone(),
            desc: UNSCRAMBLE_DESC.to_string(),
            interface: false,
        }
    }
}

/// Picks a member name not yet used by `taken`.
fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|name| !taken(name))
        .unwrap_or_else(|| base.to_string())
}

/// Moves string literals into a lookup table.
pub struct StringRelocator {
    config: StringConfig,
}

impl StringRelocator {
    /// Creates the pass.
    #[must_use]
    pub fn new(config: StringConfig) -> Self {
        Self { config }
    }

    /// Returns every distinct string loaded by `ldc`, in load set order.
    fn collect(set: &LoadSet) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut strings = Vec::new();
        let bodies = set
            .classes()
            .flat_map(|class| class.methods.iter())
            .filter_map(|method| method.code.as_ref());
        for code in bodies {
            for insn in code.instructions.iter() {
                if let Insn::Ldc(Constant::String(value)) = insn {
                    if seen.insert(value.as_str()) {
                        strings.push(value.clone());
                    }
                }
            }
        }
        strings
    }

    /// Chooses a random class that can take the table.
    fn choose_host(&self, set: &LoadSet, ctx: &mut PassContext<'_>) -> Result<Option<String>> {
        let versioned: HashSet<&str> = set
            .resources()
            .filter_map(|(path, _)| versioned_class(path))
            .map(|(_, name)| name)
            .collect();
        let mut hosts: Vec<&ClassFile> = set
            .classes()
            .filter(|class| !class.is_interface() && !class.access.contains(AccessFlags::MODULE))
            .filter(|class| !versioned.contains(class.name.as_str()))
            .collect();
        hosts.shuffle(&mut *ctx.rng);

        for class in hosts {
            let broken = class
                .method("<clinit>", "()V")
                .is_some_and(|clinit| clinit.code.is_none());
            if !broken {
                return Ok(Some(class.name.clone()));
            }
            let message = format!("Static initializer of '{}' has no code", class.name);
            if !self.config.lenient {
                return Err(Error::Error(message));
            }
            log::warn!("{message}, trying another host");
        }

        if self.config.lenient {
            log::warn!("No class can host the string table, keeping literals");
            Ok(None)
        } else {
            Err(Error::Error(
                "No class can host the string table".to_string(),
            ))
        }
    }

    fn unscramble_body(table: &Table, encoded: bool) -> Code {
        let mut insns = Vec::new();
        if encoded {
            insns.extend([
                Insn::Type {
                    opcode: NEW,
                    desc: STRING.to_string(),
                },
                Insn::Simple(DUP),
                Insn::Method {
                    opcode: INVOKESTATIC,
                    owner: "java/util/Base64".to_string(),
                    name: "getDecoder".to_string(),
                    desc: "()Ljava/util/Base64$Decoder;".to_string(),
                    interface: false,
                },
                table.load(),
                Insn::Var {
                    opcode: ILOAD,
                    var: 0,
                },
                Insn::Simple(AALOAD),
                Insn::Method {
                    opcode: INVOKEVIRTUAL,
                    owner: "java/util/Base64$Decoder".to_string(),
                    name: "decode".to_string(),
                    desc: "(Ljava/lang/String;)[B".to_string(),
                    interface: false,
                },
                Insn::Field {
                    opcode: GETSTATIC,
                    owner: "java/nio/charset/StandardCharsets".to_string(),
                    name: "UTF_8".to_string(),
                    desc: "Ljava/nio/charset/Charset;".to_string(),
                },
                Insn::Method {
                    opcode: INVOKESPECIAL,
                    owner: STRING.to_string(),
                    name: "<init>".to_string(),
                    desc: "([BLjava/nio/charset/Charset;)V".to_string(),
                    interface: false,
                },
            ]);
        } else {
            insns.extend([
                table.load(),
                Insn::Var {
                    opcode: ILOAD,
                    var: 0,
                },
                Insn::Simple(AALOAD),
            ]);
        }
        insns.push(Insn::Simple(ARETURN));
        Code {
            max_stack: 0,
            max_locals: 1,
            instructions: InsnList::from(insns),
            try_catch_blocks: Vec::new(),
            local_variables: Vec::new(),
        }
    }

    /// Stores `values[offset..]` into the table.
    fn populate(table: &Table, values: &[String], offset: usize) -> Vec<Insn> {
        let mut insns = Vec::with_capacity(values.len() * 4);
        for (i, value) in values.iter().enumerate() {
            let index = (offset + i) as i32;
            insns.push(table.load());
            insns.push(Insn::int_push(index));
            insns.push(Insn::Ldc(Constant::String(value.clone())));
            insns.push(Insn::Simple(AASTORE));
        }
        insns
    }

    /// Adds the table, `unscramble`, any population helpers and the merged initializer.
    fn install(host: &mut ClassFile, table: &Table, values: &[String], encoded: bool) {
        host.access |= AccessFlags::PUBLIC;
        for inner in host.inner_classes.iter_mut().filter(|i| i.inner == host.name) {
            inner.access = inner.access.widened();
        }

        host.fields.push(Field::new(
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            table.field.as_str(),
            TABLE_DESC,
        ));

        let mut unscramble = Method::new(
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            table.method.as_str(),
            UNSCRAMBLE_DESC,
        );
        unscramble.code = Some(Self::unscramble_body(table, encoded));
        host.methods.push(unscramble);

        let mut prefix = vec![
            Insn::int_push(values.len() as i32),
            Insn::Type {
                opcode: ANEWARRAY,
                desc: STRING.to_string(),
            },
            Insn::Field {
                opcode: PUTSTATIC,
                owner: table.host.clone(),
                name: table.field.clone(),
                desc: TABLE_DESC.to_string(),
            },
        ];
        if values.len() <= CHUNK {
            prefix.extend(Self::populate(table, values, 0));
        } else {
            for (n, chunk) in values.chunks(CHUNK).enumerate() {
                let name = unique_name(&format!("populate{n}"), |name| {
                    host.method(name, "()V").is_some()
                });
                let mut insns = Self::populate(table, chunk, n * CHUNK);
                insns.push(Insn::Simple(RETURN));

                let mut helper =
                    Method::new(AccessFlags::PRIVATE | AccessFlags::STATIC, name.as_str(), "()V");
                helper.code = Some(Code {
                    max_stack: 0,
                    max_locals: 0,
                    instructions: InsnList::from(insns),
                    try_catch_blocks: Vec::new(),
                    local_variables: Vec::new(),
                });
                host.methods.push(helper);
                prefix.push(Insn::Method {
                    opcode: INVOKESTATIC,
                    owner: table.host.clone(),
                    name,
                    desc: "()V".to_string(),
                    interface: false,
                });
            }
        }

        let clinit = match host.remove_method("<clinit>", "()V") {
            Some(mut original) => {
                if let Some(code) = original.code.as_mut() {
                    let body = std::mem::take(&mut code.instructions);
                    let mut merged = InsnList::from(prefix);
                    merged.append(body);
                    code.instructions = merged;
                }
                original
            }
            None => {
                prefix.push(Insn::Simple(RETURN));
                let mut clinit = Method::new(AccessFlags::STATIC, "<clinit>", "()V");
                clinit.code = Some(Code {
                    max_stack: 0,
                    max_locals: 0,
                    instructions: InsnList::from(prefix),
                    try_catch_blocks: Vec::new(),
                    local_variables: Vec::new(),
                });
                clinit
            }
        };
        host.methods.push(clinit);
    }
}

impl Transform for StringRelocator {
    fn name(&self) -> &'static str {
        "strings"
    }

    fn description(&self) -> &'static str {
        "Moves string literals into a table decoded at runtime"
    }

    fn apply(&mut self, set: &mut LoadSet, ctx: &mut PassContext<'_>) -> Result<usize> {
        let mut strings = Self::collect(set);
        if strings.is_empty() {
            return Ok(0);
        }
        strings.shuffle(&mut *ctx.rng);

        let Some(host) = self.choose_host(set, ctx)? else {
            return Ok(0);
        };
        let table = {
            let Some(class) = set.class(&host) else {
                return Ok(0);
            };
            Table {
                field: unique_name("string_store", |name| class.field(name).is_some()),
                method: unique_name("unscramble", |name| {
                    class.method(name, UNSCRAMBLE_DESC).is_some()
                }),
                host: host.clone(),
            }
        };
        let encoded = self.config.encode && set.classes().all(|class| class.major_version >= 52);

        let indices: HashMap<&str, usize> = strings
            .iter()
            .enumerate()
            .map(|(index, value)| (value.as_str(), index))
            .collect();
        for (index, value) in strings.iter().enumerate() {
            log::debug!("Relocated string {value:?} to {}[{index}]", table.field);
        }

        set.try_for_each_class(|class| {
            let bodies = class.methods.iter_mut().filter_map(|m| m.code.as_mut());
            for code in bodies {
                let sites: Vec<(usize, usize)> = code
                    .instructions
                    .iter()
                    .enumerate()
                    .filter_map(|(position, insn)| match insn {
                        Insn::Ldc(Constant::String(value)) => {
                            indices.get(value.as_str()).map(|index| (position, *index))
                        }
                        _ => None,
                    })
                    .collect();
                for (position, index) in sites.into_iter().rev() {
                    code.instructions
                        .splice(position, vec![Insn::int_push(index as i32), table.call()]);
                }
            }
            Ok(())
        })?;

        let values: Vec<String> = if encoded {
            strings.iter().map(|value| STANDARD.encode(value)).collect()
        } else {
            strings.clone()
        };
        if let Some(class) = set.class_mut(&host) {
            Self::install(class, &table, &values, encoded);
        }

        log::info!(
            "Relocated {} strings into {}{}",
            strings.len(),
            host,
            if encoded { " (Base64)" } else { "" }
        );
        Ok(strings.len())
    }
}
