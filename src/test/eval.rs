//! A small interpreter for the instruction subset produced by the pass tests.
//!
//! It runs static initializers on first use, follows virtual dispatch through the load set
//! and implements the handful of JDK methods synthesized code calls (`Base64`, the
//! `String(byte[], Charset)` constructor and the throwable constructors).

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::model::{descriptor, opcodes::*, Code, Constant, Insn, Label, LoadSet, Method};

const STEP_LIMIT: usize = 5_000_000;

const LIBRARY_SUPERS: &[(&str, &str)] = &[
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/Throwable", "java/lang/Object"),
];

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Int(i32),
    Long(i64),
    Null,
    Str(String),
    Bytes(Vec<u8>),
    Ref(usize),
    Decoder,
    Charset,
}

#[derive(Debug, Clone)]
enum Object {
    Instance {
        class: String,
        fields: HashMap<String, Value>,
    },
    Array(Vec<Value>),
    Str(String),
}

enum Flow {
    Return(Option<Value>),
    Throw(Value),
}

enum Native {
    Returned(Option<Value>),
    Missing,
}

fn default_value(desc: &str) -> Value {
    match desc.as_bytes().first() {
        Some(b'J') => Value::Long(0),
        Some(b'L' | b'[') => Value::Null,
        _ => Value::Int(0),
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, String> {
    stack.pop().ok_or_else(|| "stack underflow".to_string())
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i32, String> {
    match pop(stack)? {
        Value::Int(value) => Ok(value),
        other => Err(format!("expected int, found {other:?}")),
    }
}

fn load(locals: &[Value], var: u16) -> Result<Value, String> {
    locals
        .get(usize::from(var))
        .cloned()
        .ok_or_else(|| format!("local {var} is unset"))
}

fn store(locals: &mut Vec<Value>, var: u16, value: Value) {
    let var = usize::from(var);
    if locals.len() <= var {
        locals.resize(var + 1, Value::Null);
    }
    locals[var] = value;
}

/// Interprets methods of one load set.
pub(crate) struct Machine<'s> {
    set: &'s LoadSet,
    heap: Vec<Object>,
    statics: HashMap<(String, String), Value>,
    initialized: HashSet<String>,
    steps: usize,
}

impl<'s> Machine<'s> {
    pub(crate) fn new(set: &'s LoadSet) -> Self {
        Machine {
            set,
            heap: Vec::new(),
            statics: HashMap::new(),
            initialized: HashSet::new(),
            steps: 0,
        }
    }

    /// Calls a static method.
    pub(crate) fn invoke(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let mut stack = args;
        self.call(INVOKESTATIC, owner, name, desc, &mut stack)?;
        Ok(stack.pop())
    }

    /// Calls an instance method on `receiver`.
    pub(crate) fn invoke_virtual(
        &mut self,
        receiver: Value,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let owner = self.class_of(&receiver)?;
        let mut stack = vec![receiver];
        stack.extend(args);
        self.call(INVOKEVIRTUAL, &owner, name, desc, &mut stack)?;
        Ok(stack.pop())
    }

    /// Creates an instance through its no-argument constructor.
    pub(crate) fn instantiate(&mut self, class: &str) -> Result<Value, String> {
        self.ensure_init(class)?;
        let instance = self.allocate(class);
        let mut stack = vec![instance.clone()];
        self.call(INVOKESPECIAL, class, "<init>", "()V", &mut stack)?;
        Ok(instance)
    }

    /// Calls a static method taking ints and returning a string.
    pub(crate) fn call_string(&mut self, owner: &str, name: &str, desc: &str, args: Vec<i32>) -> String {
        let value = self
            .invoke(owner, name, desc, args.into_iter().map(Value::Int).collect())
            .unwrap()
            .expect("method returned nothing");
        self.string(&value).expect("not a string")
    }

    /// Calls a static method taking and returning ints.
    pub(crate) fn call_int(&mut self, owner: &str, name: &str, desc: &str, args: Vec<i32>) -> i32 {
        match self
            .invoke(owner, name, desc, args.into_iter().map(Value::Int).collect())
            .unwrap()
        {
            Some(Value::Int(value)) => value,
            other => panic!("expected int, found {other:?}"),
        }
    }

    /// Resolves a string value or a constructed string object.
    pub(crate) fn string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Str(value) => Some(value.clone()),
            Value::Ref(index) => match self.heap.get(*index) {
                Some(Object::Str(value)) => Some(value.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Reads a static field without triggering initialization.
    pub(crate) fn static_field(&self, owner: &str, name: &str) -> Option<&Value> {
        self.statics.get(&(owner.to_string(), name.to_string()))
    }

    fn allocate(&mut self, class: &str) -> Value {
        self.heap.push(Object::Instance {
            class: class.to_string(),
            fields: HashMap::new(),
        });
        Value::Ref(self.heap.len() - 1)
    }

    fn class_of(&self, value: &Value) -> Result<String, String> {
        match value {
            Value::Ref(index) => match self.heap.get(*index) {
                Some(Object::Instance { class, .. }) => Ok(class.clone()),
                Some(Object::Str(_)) => Ok("java/lang/String".to_string()),
                Some(Object::Array(_)) => Ok("java/lang/Object".to_string()),
                None => Err(format!("dangling reference {index}")),
            },
            Value::Str(_) => Ok("java/lang/String".to_string()),
            other => Err(format!("{other:?} is not an object")),
        }
    }

    fn super_of(&self, name: &str) -> Option<String> {
        match self.set.class(name) {
            Some(class) => class.super_name.clone(),
            None => LIBRARY_SUPERS
                .iter()
                .find(|(class, _)| *class == name)
                .map(|(_, parent)| parent.to_string()),
        }
    }

    fn is_a(&self, class: &str, target: &str) -> bool {
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if name == target {
                return true;
            }
            current = self.super_of(&name);
        }
        false
    }

    fn find_method(&self, class: &str, name: &str, desc: &str) -> Option<&'s Method> {
        let set = self.set;
        let mut current = set.class(class);
        while let Some(found) = current {
            if let Some(method) = found.method(name, desc) {
                return Some(method);
            }
            current = found.super_name.as_deref().and_then(|parent| set.class(parent));
        }
        None
    }

    fn ensure_init(&mut self, class: &str) -> Result<(), String> {
        let set = self.set;
        let Some(unit) = set.class(class) else {
            return Ok(());
        };
        if !self.initialized.insert(class.to_string()) {
            return Ok(());
        }
        if let Some(parent) = unit.super_name.as_deref() {
            self.ensure_init(parent)?;
        }
        if let Some(clinit) = unit.method("<clinit>", "()V") {
            if let Flow::Throw(exception) = self.execute(clinit, Vec::new())? {
                return Err(format!("initializer of {class} threw {exception:?}"));
            }
        }
        Ok(())
    }

    fn native(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Native, String> {
        let result = match (owner, name, desc) {
            ("java/util/Base64", "getDecoder", _) => Some(Value::Decoder),
            ("java/util/Base64$Decoder", "decode", "(Ljava/lang/String;)[B") => {
                let text = args.first().and_then(|arg| self.string(arg)).ok_or("decode")?;
                let bytes = STANDARD.decode(text).map_err(|e| e.to_string())?;
                Some(Value::Bytes(bytes))
            }
            ("java/lang/String", "<init>", "([BLjava/nio/charset/Charset;)V") => {
                let (Some(Value::Ref(index)), Some(Value::Bytes(bytes))) = (receiver, args.first())
                else {
                    return Err("bad String constructor call".to_string());
                };
                let text = String::from_utf8(bytes.clone()).map_err(|e| e.to_string())?;
                self.heap[*index] = Object::Str(text);
                None
            }
            ("java/lang/String", "length", "()I") => {
                let text = receiver.and_then(|r| self.string(r)).ok_or("length")?;
                Some(Value::Int(text.encode_utf16().count() as i32))
            }
            ("java/lang/String", "equals", "(Ljava/lang/Object;)Z") => {
                let left = receiver.and_then(|r| self.string(r));
                let right = args.first().and_then(|a| self.string(a));
                Some(Value::Int(i32::from(left.is_some() && left == right)))
            }
            ("java/lang/Object", "<init>", "()V") => None,
            (owner, "<init>", _) if LIBRARY_SUPERS.iter().any(|(class, _)| *class == owner) => {
                None
            }
            _ => return Ok(Native::Missing),
        };
        Ok(Native::Returned(result))
    }

    /// Performs an invocation instruction on `stack`; returns a thrown exception.
    fn call(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        desc: &str,
        stack: &mut Vec<Value>,
    ) -> Result<Option<Value>, String> {
        let (params, ret) = descriptor::split_method(desc).map_err(|e| e.to_string())?;
        let mut args = Vec::with_capacity(params.len());
        for _ in &params {
            args.push(pop(stack)?);
        }
        args.reverse();
        let receiver = if opcode == INVOKESTATIC {
            None
        } else {
            Some(pop(stack)?)
        };

        if let Native::Returned(result) = self.native(owner, name, desc, receiver.as_ref(), &args)? {
            if ret != "V" {
                stack.push(result.ok_or("native returned nothing")?);
            }
            return Ok(None);
        }

        if opcode == INVOKESTATIC {
            self.ensure_init(owner)?;
        }
        let target = match (&receiver, opcode) {
            (Some(value), INVOKEVIRTUAL | INVOKEINTERFACE) => self.class_of(value)?,
            _ => owner.to_string(),
        };
        let method = self
            .find_method(&target, name, desc)
            .or_else(|| self.find_method(owner, name, desc))
            .ok_or_else(|| format!("unresolved {owner}.{name}{desc}"))?;

        let mut slots: Vec<Value> = receiver.into_iter().collect();
        for (arg, param) in args.into_iter().zip(&params) {
            slots.push(arg);
            if descriptor::slots(param) == 2 {
                slots.push(Value::Null);
            }
        }
        match self.execute(method, slots)? {
            Flow::Return(value) => {
                stack.extend(value);
                Ok(None)
            }
            Flow::Throw(exception) => Ok(Some(exception)),
        }
    }

    fn handler(
        &self,
        code: &Code,
        labels: &HashMap<Label, usize>,
        at: usize,
        exception: &Value,
    ) -> Option<usize> {
        let class = self.class_of(exception).ok()?;
        code.try_catch_blocks.iter().find_map(|block| {
            let start = *labels.get(&block.start)?;
            let end = *labels.get(&block.end)?;
            let caught = block
                .catch_type
                .as_deref()
                .is_none_or(|catch| self.is_a(&class, catch));
            (start <= at && at < end && caught).then(|| labels.get(&block.handler).copied())?
        })
    }

    fn array(&mut self, value: Value) -> Result<&mut Vec<Value>, String> {
        match value {
            Value::Ref(index) => match self.heap.get_mut(index) {
                Some(Object::Array(values)) => Ok(values),
                _ => Err(format!("{index} is not an array")),
            },
            other => Err(format!("{other:?} is not an array")),
        }
    }

    fn instance_fields(&mut self, value: Value) -> Result<&mut HashMap<String, Value>, String> {
        match value {
            Value::Ref(index) => match self.heap.get_mut(index) {
                Some(Object::Instance { fields, .. }) => Ok(fields),
                _ => Err(format!("{index} is not an instance")),
            },
            other => Err(format!("{other:?} is not an instance")),
        }
    }

    fn execute(&mut self, method: &'s Method, args: Vec<Value>) -> Result<Flow, String> {
        let code = method
            .code
            .as_ref()
            .ok_or_else(|| format!("{} has no code", method.name))?;
        let insns = &code.instructions;
        let labels: HashMap<Label, usize> = insns
            .iter()
            .enumerate()
            .filter_map(|(index, insn)| match insn {
                Insn::Label(label) => Some((*label, index)),
                _ => None,
            })
            .collect();
        let target = |label: &Label| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| format!("label {label:?} is not placed"))
        };

        let mut locals = args;
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;
        loop {
            self.steps += 1;
            if self.steps > STEP_LIMIT {
                return Err("step limit exceeded".to_string());
            }
            let insn = insns
                .get(pc)
                .ok_or_else(|| format!("{} runs past its end", method.name))?;
            let at = pc;
            pc += 1;

            let thrown = match insn {
                Insn::Label(_) | Insn::LineNumber { .. } | Insn::Frame { .. } => None,
                Insn::Simple(opcode) => match *opcode {
                    NOP => None,
                    ACONST_NULL => {
                        stack.push(Value::Null);
                        None
                    }
                    ICONST_M1..=ICONST_5 => {
                        stack.push(Value::Int(i32::from(*opcode) - i32::from(ICONST_0)));
                        None
                    }
                    LCONST_0 | LCONST_1 => {
                        stack.push(Value::Long(i64::from(*opcode - LCONST_0)));
                        None
                    }
                    IADD | ISUB | IMUL => {
                        let right = pop_int(&mut stack)?;
                        let left = pop_int(&mut stack)?;
                        stack.push(Value::Int(match *opcode {
                            IADD => left.wrapping_add(right),
                            ISUB => left.wrapping_sub(right),
                            _ => left.wrapping_mul(right),
                        }));
                        None
                    }
                    DUP => {
                        let top = stack.last().cloned().ok_or("stack underflow")?;
                        stack.push(top);
                        None
                    }
                    POP => {
                        pop(&mut stack)?;
                        None
                    }
                    AALOAD | IALOAD => {
                        let index = pop_int(&mut stack)?;
                        let array = pop(&mut stack)?;
                        let value = self
                            .array(array)?
                            .get(index as usize)
                            .cloned()
                            .ok_or_else(|| format!("index {index} out of bounds"))?;
                        stack.push(value);
                        None
                    }
                    AASTORE | IASTORE => {
                        let value = pop(&mut stack)?;
                        let index = pop_int(&mut stack)?;
                        let array = pop(&mut stack)?;
                        let slot = self
                            .array(array)?
                            .get_mut(index as usize)
                            .ok_or_else(|| format!("index {index} out of bounds"))?;
                        *slot = value;
                        None
                    }
                    ARRAYLENGTH => {
                        let array = pop(&mut stack)?;
                        let length = self.array(array)?.len();
                        stack.push(Value::Int(length as i32));
                        None
                    }
                    IRETURN | LRETURN | ARETURN => {
                        return Ok(Flow::Return(Some(pop(&mut stack)?)));
                    }
                    RETURN => return Ok(Flow::Return(None)),
                    ATHROW => Some(pop(&mut stack)?),
                    other => return Err(format!("unsupported opcode {other:#04x}")),
                },
                Insn::Int { opcode, operand } => {
                    if *opcode == NEWARRAY {
                        let length = pop_int(&mut stack)?;
                        self.heap
                            .push(Object::Array(vec![Value::Int(0); length as usize]));
                        stack.push(Value::Ref(self.heap.len() - 1));
                    } else {
                        stack.push(Value::Int(*operand));
                    }
                    None
                }
                Insn::Var { opcode, var } => {
                    match *opcode {
                        ILOAD | LLOAD | ALOAD => stack.push(load(&locals, *var)?),
                        ISTORE | LSTORE | ASTORE => {
                            let value = pop(&mut stack)?;
                            store(&mut locals, *var, value);
                        }
                        other => return Err(format!("unsupported variable opcode {other:#04x}")),
                    }
                    None
                }
                Insn::Iinc { var, incr } => {
                    let Value::Int(value) = load(&locals, *var)? else {
                        return Err(format!("iinc on non-int local {var}"));
                    };
                    store(&mut locals, *var, Value::Int(value + i32::from(*incr)));
                    None
                }
                Insn::Type { opcode, desc } => {
                    match *opcode {
                        NEW => {
                            self.ensure_init(desc)?;
                            let instance = self.allocate(desc);
                            stack.push(instance);
                        }
                        ANEWARRAY => {
                            let length = pop_int(&mut stack)?;
                            self.heap
                                .push(Object::Array(vec![Value::Null; length as usize]));
                            stack.push(Value::Ref(self.heap.len() - 1));
                        }
                        CHECKCAST => {}
                        INSTANCEOF => {
                            let value = pop(&mut stack)?;
                            let is = value != Value::Null
                                && self.class_of(&value).is_ok_and(|class| self.is_a(&class, desc));
                            stack.push(Value::Int(i32::from(is)));
                        }
                        other => return Err(format!("unsupported type opcode {other:#04x}")),
                    }
                    None
                }
                Insn::Field {
                    opcode,
                    owner,
                    name,
                    desc,
                } => {
                    match *opcode {
                        GETSTATIC if owner == "java/nio/charset/StandardCharsets" => {
                            stack.push(Value::Charset);
                        }
                        GETSTATIC => {
                            self.ensure_init(owner)?;
                            let value = self
                                .statics
                                .get(&(owner.clone(), name.clone()))
                                .cloned()
                                .unwrap_or_else(|| default_value(desc));
                            stack.push(value);
                        }
                        PUTSTATIC => {
                            self.ensure_init(owner)?;
                            let value = pop(&mut stack)?;
                            self.statics.insert((owner.clone(), name.clone()), value);
                        }
                        GETFIELD => {
                            let instance = pop(&mut stack)?;
                            let value = self
                                .instance_fields(instance)?
                                .get(name)
                                .cloned()
                                .unwrap_or_else(|| default_value(desc));
                            stack.push(value);
                        }
                        _ => {
                            let value = pop(&mut stack)?;
                            let instance = pop(&mut stack)?;
                            self.instance_fields(instance)?.insert(name.clone(), value);
                        }
                    }
                    None
                }
                Insn::Method {
                    opcode,
                    owner,
                    name,
                    desc,
                    ..
                } => self.call(*opcode, owner, name, desc, &mut stack)?,
                Insn::Jump {
                    opcode,
                    target: label,
                } => {
                    let taken = match *opcode {
                        GOTO => true,
                        IFEQ..=IFLE => {
                            let value = pop_int(&mut stack)?;
                            match *opcode {
                                IFEQ => value == 0,
                                IFNE => value != 0,
                                IFLT => value < 0,
                                IFGE => value >= 0,
                                IFGT => value > 0,
                                _ => value <= 0,
                            }
                        }
                        IF_ICMPEQ..=IF_ICMPLE => {
                            let right = pop_int(&mut stack)?;
                            let left = pop_int(&mut stack)?;
                            match *opcode {
                                IF_ICMPEQ => left == right,
                                IF_ICMPNE => left != right,
                                IF_ICMPLT => left < right,
                                IF_ICMPGE => left >= right,
                                IF_ICMPGT => left > right,
                                _ => left <= right,
                            }
                        }
                        IF_ACMPEQ | IF_ACMPNE => {
                            let right = pop(&mut stack)?;
                            let left = pop(&mut stack)?;
                            (left == right) == (*opcode == IF_ACMPEQ)
                        }
                        IFNULL | IFNONNULL => {
                            let value = pop(&mut stack)?;
                            (value == Value::Null) == (*opcode == IFNULL)
                        }
                        other => return Err(format!("unsupported jump {other:#04x}")),
                    };
                    if taken {
                        pc = target(label)?;
                    }
                    None
                }
                Insn::Ldc(constant) => {
                    stack.push(match constant {
                        Constant::Int(value) => Value::Int(*value),
                        Constant::Long(value) => Value::Long(*value),
                        Constant::String(value) => Value::Str(value.clone()),
                        other => return Err(format!("unsupported constant {other:?}")),
                    });
                    None
                }
                other => return Err(format!("unsupported instruction {other:?}")),
            };

            if let Some(exception) = thrown {
                match self.handler(code, &labels, at, &exception) {
                    Some(handler) => {
                        stack.clear();
                        stack.push(exception);
                        pc = handler;
                    }
                    None => return Ok(Flow::Throw(exception)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{builder::ClassBuilder, AccessFlags};

    #[test]
    fn loops_fields_and_exceptions() {
        let mut set = LoadSet::new();
        set.insert_class(
            ClassBuilder::new("t/Calc")
                .field(AccessFlags::STATIC, "base", "I")
                .method(AccessFlags::STATIC, "<clinit>", "()V", |code| {
                    code.iconst(10).putstatic("t/Calc", "base", "I").vreturn();
                })
                .method(AccessFlags::STATIC, "sum", "(I)I", |code| {
                    let (head, done) = (code.new_label(), code.new_label());
                    code.getstatic("t/Calc", "base", "I")
                        .istore(1)
                        .mark(head)
                        .iload(0)
                        .jump(IFEQ, done)
                        .iload(1)
                        .iload(0)
                        .op(IADD)
                        .istore(1)
                        .iinc(0, -1)
                        .jump(GOTO, head)
                        .mark(done)
                        .iload(1)
                        .ireturn();
                })
                .method(AccessFlags::STATIC, "guarded", "()I", |code| {
                    let (start, end, handler) = (code.new_label(), code.new_label(), code.new_label());
                    code.mark(start)
                        .new_object("java/lang/RuntimeException")
                        .dup()
                        .invokespecial("java/lang/RuntimeException", "<init>", "()V")
                        .athrow()
                        .mark(end)
                        .mark(handler)
                        .pop()
                        .iconst(3)
                        .ireturn()
                        .try_catch(start, end, handler, Some("java/lang/Exception"));
                })
                .build(),
        );

        let mut machine = Machine::new(&set);
        assert_eq!(machine.call_int("t/Calc", "sum", "(I)I", vec![4]), 20);
        assert_eq!(machine.call_int("t/Calc", "guarded", "()I", vec![]), 3);
        assert_eq!(machine.static_field("t/Calc", "base"), Some(&Value::Int(10)));
    }
}
