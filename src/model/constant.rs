//! Loadable constants: the operands of `ldc`, bootstrap arguments and field initial values.

use strum::{Display, EnumIter};

/// The reference kind of a method handle (JVMS table 5.4.3.5-A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum HandleKind {
    /// `getfield`
    GetField = 1,
    /// `getstatic`
    GetStatic = 2,
    /// `putfield`
    PutField = 3,
    /// `putstatic`
    PutStatic = 4,
    /// `invokevirtual`
    InvokeVirtual = 5,
    /// `invokestatic`
    InvokeStatic = 6,
    /// `invokespecial`
    InvokeSpecial = 7,
    /// `new` followed by `invokespecial <init>`
    NewInvokeSpecial = 8,
    /// `invokeinterface`
    InvokeInterface = 9,
}

impl HandleKind {
    /// Maps the raw `reference_kind` byte.
    #[must_use]
    pub fn from_u8(kind: u8) -> Option<HandleKind> {
        Some(match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }

    /// Returns `true` for the four field access kinds.
    #[must_use]
    pub fn is_field(self) -> bool {
        (self as u8) <= 4
    }
}

/// A symbolic method handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// What the handle does with its target
    pub kind: HandleKind,
    /// Internal name of the class declaring the target
    pub owner: String,
    /// Target member name
    pub name: String,
    /// Target member descriptor
    pub desc: String,
    /// `true` if the owner is an interface
    pub interface: bool,
}

/// A dynamically-computed constant (`CONSTANT_Dynamic`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
    /// Name passed to the bootstrap method
    pub name: String,
    /// Field descriptor of the produced value
    pub desc: String,
    /// Bootstrap method
    pub bsm: Handle,
    /// Static bootstrap arguments
    pub args: Vec<Constant>,
}

/// A loadable constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `CONSTANT_Integer`
    Int(i32),
    /// `CONSTANT_Float`
    Float(f32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double`
    Double(f64),
    /// `CONSTANT_String`
    String(String),
    /// `CONSTANT_Class`: an internal name, or a descriptor for array types
    Class(String),
    /// `CONSTANT_MethodType`: a method descriptor
    MethodType(String),
    /// `CONSTANT_MethodHandle`
    MethodHandle(Handle),
    /// `CONSTANT_Dynamic`
    Dynamic(Box<ConstantDynamic>),
}

impl Constant {
    /// Returns `true` for constants that occupy two stack slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        match self {
            Constant::Long(_) | Constant::Double(_) => true,
            Constant::Dynamic(dynamic) => matches!(dynamic.desc.as_str(), "J" | "D"),
            _ => false,
        }
    }

    /// Returns the string payload of a `CONSTANT_String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn handle_kind_round_trip() {
        for kind in HandleKind::iter() {
            assert_eq!(HandleKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(HandleKind::from_u8(0), None);
        assert_eq!(HandleKind::from_u8(10), None);
        assert!(HandleKind::PutStatic.is_field());
        assert!(!HandleKind::InvokeVirtual.is_field());
    }

    #[test]
    fn wide_constants() {
        assert!(Constant::Long(1).is_wide());
        assert!(Constant::Double(1.0).is_wide());
        assert!(!Constant::Int(1).is_wide());
        assert!(!Constant::String("x".into()).is_wide());
    }
}
