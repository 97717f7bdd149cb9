use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Access and property flags of classes, fields, methods, inner class records and
    /// method parameters.
    ///
    /// Several bits carry a different meaning depending on where they appear
    /// (`SUPER`/`SYNCHRONIZED`, `VOLATILE`/`BRIDGE`, `TRANSIENT`/`VARARGS`,
    /// `MODULE`/`MANDATED`), so they are declared under both names.
    pub struct AccessFlags: u16 {
        /// Accessible from outside the package
        const PUBLIC = 0x0001;
        /// Accessible only within the declaring class and its nestmates
        const PRIVATE = 0x0002;
        /// Accessible within subclasses and the package
        const PROTECTED = 0x0004;
        /// Member belongs to the class rather than an instance
        const STATIC = 0x0008;
        /// No subclassing, overriding or reassignment
        const FINAL = 0x0010;
        /// Class: treat superclass methods specially on invokespecial
        const SUPER = 0x0020;
        /// Method: invocation is wrapped by a monitor
        const SYNCHRONIZED = 0x0020;
        /// Field: not cached
        const VOLATILE = 0x0040;
        /// Method: bridge generated by the compiler
        const BRIDGE = 0x0040;
        /// Field: not serialized
        const TRANSIENT = 0x0080;
        /// Method: variable arity
        const VARARGS = 0x0080;
        /// Method: implemented in native code
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// No implementation provided
        const ABSTRACT = 0x0400;
        /// Method: strict floating point
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Class is an annotation interface
        const ANNOTATION = 0x2000;
        /// Class or field is an enum or enum constant
        const ENUM = 0x4000;
        /// Class is a module descriptor
        const MODULE = 0x8000;
        /// Parameter: implicitly declared
        const MANDATED = 0x8000;
    }
}

impl AccessFlags {
    /// Returns `true` if `STATIC` is set.
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    /// Returns `true` if `INTERFACE` is set.
    #[must_use]
    pub fn is_interface(self) -> bool {
        self.contains(AccessFlags::INTERFACE)
    }

    /// Returns `true` if `PRIVATE` is set.
    #[must_use]
    pub fn is_private(self) -> bool {
        self.contains(AccessFlags::PRIVATE)
    }

    /// Returns `true` if `PUBLIC` is set.
    #[must_use]
    pub fn is_public(self) -> bool {
        self.contains(AccessFlags::PUBLIC)
    }

    /// Returns the flags with `PUBLIC` set and `PRIVATE`/`PROTECTED` cleared.
    #[must_use]
    pub fn widened(self) -> AccessFlags {
        (self - (AccessFlags::PRIVATE | AccessFlags::PROTECTED)) | AccessFlags::PUBLIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_keeps_other_flags() {
        let flags = AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL;
        let widened = flags.widened();
        assert!(widened.is_public());
        assert!(!widened.is_private());
        assert!(widened.is_static());
        assert!(widened.contains(AccessFlags::FINAL));
        assert_eq!(AccessFlags::PROTECTED.widened(), AccessFlags::PUBLIC);
    }

    #[test]
    fn raw_round_trip() {
        let flags = AccessFlags::from_bits_retain(0x4031);
        assert!(flags.contains(AccessFlags::ENUM));
        assert!(flags.contains(AccessFlags::SUPER));
        assert_eq!(flags.bits(), 0x4031);
    }
}
