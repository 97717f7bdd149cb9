//! Declarative matching over program model nodes.
//!
//! Every node kind of the model (classes, fields, methods, instructions, handler regions and
//! local variables) answers [`Queryable::query`] for a closed set of [`QueryKey`]s. A
//! [`Query`] is a list of key/expectation pairs that holds for a node when every pair
//! holds, which lets passes describe instruction shapes as data instead of writing one
//! conditional per opcode family.
//!
//! # Key Components
//!
//! - [`QueryKey`] - The attribute names every node kind understands
//! - [`QueryValue`] - The uniform value type attributes are reported in
//! - [`Query`] - A conjunction of expectations
//! - [`InsnPattern`] - A sequence of queries matched against the real instructions of a body
//!
//! # Examples
//!
//! ```rust
//! use classveil::model::{opcodes::*, Insn};
//! use classveil::query::{matches, Query, QueryKey};
//!
//! let insn = Insn::Var { opcode: ALOAD, var: 0 };
//! let receiver = Query::new()
//!     .with(QueryKey::Opcode, ALOAD)
//!     .with(QueryKey::Var, 0);
//! assert!(matches(&insn, &receiver));
//!
//! let returns = Query::new().any_of(QueryKey::Opcode, [IRETURN, ARETURN]);
//! assert!(!matches(&insn, &returns));
//! ```

mod pattern;

pub use pattern::InsnPattern;

use strum::{Display, EnumIter, EnumString};

use crate::model::{
    ClassFile, Constant, Field, Insn, LocalVariable, Method, TryCatchBlock, VerificationType,
};

/// The attributes a node can be queried for.
///
/// Keys a node kind does not carry answer `None`, as do optional attributes that are unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QueryKey {
    /// Node kind such as `class`, `method` or `field_insn`
    Kind,
    /// Access flag bits
    Access,
    /// Name of a class, member, local variable or referenced member
    Name,
    /// Descriptor of a member, variable or reference, or the operand type of a type instruction
    Desc,
    /// Generic signature
    Signature,
    /// Owner of a referenced member, or the bootstrap owner of `invokedynamic`
    Owner,
    /// Superclass of a class
    SuperName,
    /// Implemented interfaces of a class
    Interfaces,
    /// Major version of a class
    Version,
    /// `SourceFile` of a class
    SourceFile,
    /// Constant initializer of a field
    Value,
    /// Declared exceptions of a method
    Exceptions,
    /// Recorded stack depth of a method body
    MaxStack,
    /// Recorded local slots of a method body
    MaxLocals,
    /// Instruction opcode, absent for markers
    Opcode,
    /// Local slot of a variable instruction, `iinc` or local variable entry
    Var,
    /// Immediate operand of `bipush`, `sipush` and `newarray`
    Operand,
    /// Increment of `iinc`
    Incr,
    /// Operand of `ldc`
    Constant,
    /// Interface flag of a method reference
    Interface,
    /// Dimensions of `multianewarray`
    Dims,
    /// Line of a line number marker
    Line,
    /// Keys of a switch
    Keys,
    /// Caught class of a handler region
    CatchType,
    /// Local types of a frame
    Locals,
    /// Stack types of a frame
    Stack,
}

/// The value of a queried attribute.
///
/// Lists compare element-wise, so `[a, b]` only equals `[a, b]`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Integers of any width and flag bits
    Int(i64),
    /// Booleans
    Bool(bool),
    /// Names, descriptors and kinds
    Str(String),
    /// Loadable constants
    Constant(Constant),
    /// Ordered collections
    List(Vec<QueryValue>),
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<u8> for QueryValue {
    fn from(value: u8) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<u16> for QueryValue {
    fn from(value: u16) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<i16> for QueryValue {
    fn from(value: i16) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        QueryValue::Str(value.clone())
    }
}

impl From<Constant> for QueryValue {
    fn from(value: Constant) -> Self {
        QueryValue::Constant(value)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        QueryValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// What a [`Query`] expects of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    /// The attribute is present and equal
    Eq(QueryValue),
    /// The attribute is present and equal to one of the values
    AnyOf(Vec<QueryValue>),
    /// The attribute is absent
    Absent,
}

impl Expect {
    /// Checks an attribute value against the expectation.
    #[must_use]
    pub fn accepts(&self, actual: Option<&QueryValue>) -> bool {
        match (self, actual) {
            (Expect::Eq(expected), Some(actual)) => expected == actual,
            (Expect::AnyOf(candidates), Some(actual)) => candidates.iter().any(|c| c == actual),
            (Expect::Absent, None) => true,
            _ => false,
        }
    }
}

/// A conjunction of attribute expectations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<(QueryKey, Expect)>,
}

impl Query {
    /// Creates a query that matches every node.
    #[must_use]
    pub fn new() -> Self {
        Query::default()
    }

    /// Requires `key` to equal `value`.
    #[must_use]
    pub fn with(mut self, key: QueryKey, value: impl Into<QueryValue>) -> Self {
        self.conditions.push((key, Expect::Eq(value.into())));
        self
    }

    /// Requires `key` to equal one of `values`.
    #[must_use]
    pub fn any_of<V, I>(mut self, key: QueryKey, values: I) -> Self
    where
        V: Into<QueryValue>,
        I: IntoIterator<Item = V>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push((key, Expect::AnyOf(values)));
        self
    }

    /// Requires `key` to be absent.
    #[must_use]
    pub fn absent(mut self, key: QueryKey) -> Self {
        self.conditions.push((key, Expect::Absent));
        self
    }

    /// Returns the expectations in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[(QueryKey, Expect)] {
        &self.conditions
    }

    /// Returns `true` if every expectation holds for `node`.
    pub fn matches<N: Queryable + ?Sized>(&self, node: &N) -> bool {
        self.conditions
            .iter()
            .all(|(key, expect)| expect.accepts(node.query(*key).as_ref()))
    }
}

/// A node that reports its attributes by [`QueryKey`].
pub trait Queryable {
    /// Returns the attribute named by `key`, or `None` if the node has no such attribute.
    fn query(&self, key: QueryKey) -> Option<QueryValue>;
}

/// Returns the attribute named by `key` of any node.
pub fn query<N: Queryable + ?Sized>(node: &N, key: QueryKey) -> Option<QueryValue> {
    node.query(key)
}

/// Returns `true` if `node` satisfies every expectation of `query`.
pub fn matches<N: Queryable + ?Sized>(node: &N, query: &Query) -> bool {
    query.matches(node)
}

fn list<'a>(items: impl Iterator<Item = &'a String>) -> QueryValue {
    QueryValue::List(items.map(QueryValue::from).collect())
}

fn frame_types(types: &[VerificationType]) -> QueryValue {
    QueryValue::List(
        types
            .iter()
            .map(|ty| QueryValue::Str(format!("{ty:?}")))
            .collect(),
    )
}

impl Queryable for ClassFile {
    fn query(&self, key: QueryKey) -> Option<QueryValue> {
        match key {
            QueryKey::Kind => Some("class".into()),
            QueryKey::Access => Some(self.access.bits().into()),
            QueryKey::Name => Some((&self.name).into()),
            QueryKey::Signature => self.signature.as_ref().map(Into::into),
            QueryKey::SuperName => self.super_name.as_ref().map(Into::into),
            QueryKey::Interfaces => Some(list(self.interfaces.iter())),
            QueryKey::Version => Some(self.major_version.into()),
            QueryKey::SourceFile => self.source_file.as_ref().map(Into::into),
            _ => None,
        }
    }
}

impl Queryable for Field {
    fn query(&self, key: QueryKey) -> Option<QueryValue> {
        match key {
            QueryKey::Kind => Some("field".into()),
            QueryKey::Access => Some(self.access.bits().into()),
            QueryKey::Name => Some((&self.name).into()),
            QueryKey::Desc => Some((&self.desc).into()),
            QueryKey::Signature => self.signature.as_ref().map(Into::into),
            QueryKey::Value => self.value.clone().map(Into::into),
            _ => None,
        }
    }
}

impl Queryable for Method {
    fn query(&self, key: QueryKey) -> Option<QueryValue> {
        match key {
            QueryKey::Kind => Some("method".into()),
            QueryKey::Access => Some(self.access.bits().into()),
            QueryKey::Name => Some((&self.name).into()),
            QueryKey::Desc => Some((&self.desc).into()),
            QueryKey::Signature => self.signature.as_ref().map(Into::into),
            QueryKey::Exceptions => Some(list(self.exceptions.iter())),
            QueryKey::MaxStack => self.code.as_ref().map(|c| c.max_stack.into()),
            QueryKey::MaxLocals => self.code.as_ref().map(|c| c.max_locals.into()),
            _ => None,
        }
    }
}

impl Queryable for TryCatchBlock {
    fn query(&self, key: QueryKey) -> Option<QueryValue> {
        match key {
            QueryKey::Kind => Some("try_catch".into()),
            QueryKey::CatchType => self.catch_type.as_ref().map(Into::into),
            _ => None,
        }
    }
}

impl Queryable for LocalVariable {
    fn query(&self, key: QueryKey) -> Option<QueryValue> {
        match key {
            QueryKey::Kind => Some("local".into()),
            QueryKey::Name => Some((&self.name).into()),
            QueryKey::Desc => Some((&self.desc).into()),
            QueryKey::Signature => self.signature.as_ref().map(Into::into),
            QueryKey::Var => Some(self.index.into()),
            _ => None,
        }
    }
}

impl Queryable for Insn {
    fn query(&self, key: QueryKey) -> Option<QueryValue> {
        if key == QueryKey::Opcode {
            return self.opcode().map(Into::into);
        }

        match (self, key) {
            (Insn::Label(_), QueryKey::Kind) => Some("label".into()),
            (Insn::LineNumber { .. }, QueryKey::Kind) => Some("line".into()),
            (Insn::LineNumber { line, .. }, QueryKey::Line) => Some((*line).into()),
            (Insn::Frame { .. }, QueryKey::Kind) => Some("frame".into()),
            (Insn::Frame { locals, .. }, QueryKey::Locals) => Some(frame_types(locals)),
            (Insn::Frame { stack, .. }, QueryKey::Stack) => Some(frame_types(stack)),
            (Insn::Simple(_), QueryKey::Kind) => Some("insn".into()),
            (Insn::Int { .. }, QueryKey::Kind) => Some("int_insn".into()),
            (Insn::Int { operand, .. }, QueryKey::Operand) => Some((*operand).into()),
            (Insn::Var { .. }, QueryKey::Kind) => Some("var_insn".into()),
            (Insn::Var { var, .. }, QueryKey::Var) => Some((*var).into()),
            (Insn::Type { .. }, QueryKey::Kind) => Some("type_insn".into()),
            (Insn::Type { desc, .. }, QueryKey::Desc) => Some(desc.into()),
            (Insn::Field { .. }, QueryKey::Kind) => Some("field_insn".into()),
            (Insn::Field { owner, .. }, QueryKey::Owner) => Some(owner.into()),
            (Insn::Field { name, .. }, QueryKey::Name) => Some(name.into()),
            (Insn::Field { desc, .. }, QueryKey::Desc) => Some(desc.into()),
            (Insn::Method { .. }, QueryKey::Kind) => Some("method_insn".into()),
            (Insn::Method { owner, .. }, QueryKey::Owner) => Some(owner.into()),
            (Insn::Method { name, .. }, QueryKey::Name) => Some(name.into()),
            (Insn::Method { desc, .. }, QueryKey::Desc) => Some(desc.into()),
            (Insn::Method { interface, .. }, QueryKey::Interface) => Some((*interface).into()),
            (Insn::InvokeDynamic { .. }, QueryKey::Kind) => Some("invoke_dynamic_insn".into()),
            (Insn::InvokeDynamic { name, .. }, QueryKey::Name) => Some(name.into()),
            (Insn::InvokeDynamic { desc, .. }, QueryKey::Desc) => Some(desc.into()),
            (Insn::InvokeDynamic { bsm, .. }, QueryKey::Owner) => Some((&bsm.owner).into()),
            (Insn::Jump { .. }, QueryKey::Kind) => Some("jump_insn".into()),
            (Insn::Ldc(_), QueryKey::Kind) => Some("ldc_insn".into()),
            (Insn::Ldc(constant), QueryKey::Constant) => Some(constant.clone().into()),
            (Insn::Iinc { .. }, QueryKey::Kind) => Some("iinc_insn".into()),
            (Insn::Iinc { var, .. }, QueryKey::Var) => Some((*var).into()),
            (Insn::Iinc { incr, .. }, QueryKey::Incr) => Some((*incr).into()),
            (Insn::TableSwitch { .. }, QueryKey::Kind) => Some("table_switch_insn".into()),
            (Insn::TableSwitch { low, high, .. }, QueryKey::Keys) => {
                Some(QueryValue::List((*low..=*high).map(Into::into).collect()))
            }
            (Insn::LookupSwitch { .. }, QueryKey::Kind) => Some("lookup_switch_insn".into()),
            (Insn::LookupSwitch { keys, .. }, QueryKey::Keys) => Some(keys.clone().into()),
            (Insn::MultiANewArray { .. }, QueryKey::Kind) => Some("multi_anew_array_insn".into()),
            (Insn::MultiANewArray { desc, .. }, QueryKey::Desc) => Some(desc.into()),
            (Insn::MultiANewArray { dims, .. }, QueryKey::Dims) => Some((*dims).into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::model::{opcodes::*, AccessFlags, Label};

    #[test]
    fn instruction_attributes() {
        let insn = Insn::Field {
            opcode: GETFIELD,
            owner: "p/A".into(),
            name: "x".into(),
            desc: "I".into(),
        };
        assert_eq!(query(&insn, QueryKey::Opcode), Some(QueryValue::Int(0xB4)));
        assert_eq!(query(&insn, QueryKey::Owner), Some("p/A".into()));
        assert_eq!(query(&insn, QueryKey::Kind), Some("field_insn".into()));
        assert_eq!(query(&insn, QueryKey::Var), None);

        let label = Insn::Label(Label::new());
        assert_eq!(query(&label, QueryKey::Opcode), None);
        assert!(matches(&label, &Query::new().absent(QueryKey::Opcode)));
    }

    #[test]
    fn conjunction_and_any_of() {
        let insn = Insn::Var {
            opcode: ILOAD,
            var: 1,
        };
        let q = Query::new()
            .any_of(QueryKey::Opcode, [ILOAD, LLOAD, ALOAD])
            .with(QueryKey::Var, 1u16);
        assert!(matches(&insn, &q));
        assert!(!matches(&insn, &q.clone().with(QueryKey::Name, "x")));
        assert!(Query::new().matches(&insn));
    }

    #[test]
    fn list_equality_is_element_wise() {
        let class = crate::model::builder::ClassBuilder::new("p/C")
            .implements("p/I")
            .implements("p/J")
            .build();
        let both = Query::new().with(QueryKey::Interfaces, vec!["p/I", "p/J"]);
        let swapped = Query::new().with(QueryKey::Interfaces, vec!["p/J", "p/I"]);
        assert!(matches(&class, &both));
        assert!(!matches(&class, &swapped));
    }

    #[test]
    fn members_and_constants() {
        let mut field = Field::new(AccessFlags::STATIC, "MAX", "I");
        field.value = Some(Constant::Int(3));
        assert!(matches(
            &field,
            &Query::new()
                .with(QueryKey::Value, Constant::Int(3))
                .with(QueryKey::Access, AccessFlags::STATIC.bits())
        ));

        let ldc = Insn::Ldc(Constant::String("hi".into()));
        let q = Query::new().with(QueryKey::Constant, Constant::String("hi".into()));
        assert!(matches(&ldc, &q));

        let method = Method::new(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, "run", "()V");
        assert_eq!(query(&method, QueryKey::MaxStack), None);
        assert!(matches(&method, &Query::new().absent(QueryKey::Signature)));
    }

    #[test]
    fn keys_parse_from_names() {
        assert_eq!(QueryKey::from_str("super_name").unwrap(), QueryKey::SuperName);
        assert_eq!(QueryKey::MaxLocals.to_string(), "max_locals");
        assert!(QueryKey::from_str("nope").is_err());
    }
}
