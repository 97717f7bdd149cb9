//! Compilation units and their members.

use crate::{
    codec::pool::SourcePool,
    model::{AccessFlags, Annotation, Annotations, Constant, ElementValue, InsnList, Label},
};

/// An attribute the codec does not interpret, kept byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute payload without the name index and length
    pub data: Vec<u8>,
}

/// An entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
    /// Internal name of the nested class
    pub inner: String,
    /// Internal name of the enclosing class, absent for local and anonymous classes
    pub outer: Option<String>,
    /// Simple name, absent for anonymous classes
    pub inner_name: Option<String>,
    /// Access flags as declared in source
    pub access: AccessFlags,
}

/// The `EnclosingMethod` attribute of a local or anonymous class.
#[derive(Debug, Clone, PartialEq)]
pub struct EnclosingMethod {
    /// Internal name of the innermost enclosing class
    pub owner: String,
    /// Name and descriptor of the enclosing method, absent for initializer blocks
    pub method: Option<(String, String)>,
}

/// A component of a record class.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
    /// Component name
    pub name: String,
    /// Field descriptor
    pub desc: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Annotations on the component
    pub annotations: Annotations,
    /// Uninterpreted attributes
    pub attributes: Vec<RawAttribute>,
}

/// An exception handler region.
#[derive(Debug, Clone, PartialEq)]
pub struct TryCatchBlock {
    /// First covered instruction
    pub start: Label,
    /// End of the covered range (exclusive)
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Internal name of the caught class, `None` catches everything
    pub catch_type: Option<String>,
}

/// An entry of the local variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    /// Variable name
    pub name: String,
    /// Field descriptor
    pub desc: String,
    /// Generic signature from `LocalVariableTypeTable`
    pub signature: Option<String>,
    /// Start of the live range
    pub start: Label,
    /// End of the live range (exclusive)
    pub end: Label,
    /// Local variable slot
    pub index: u16,
}

/// An entry of the `MethodParameters` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name, absent for unnamed parameters
    pub name: Option<String>,
    /// `FINAL`, `SYNTHETIC` or `MANDATED`
    pub access: AccessFlags,
}

/// The body of a method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Code {
    /// Operand stack depth as read; the writer never emits less than it computes
    pub max_stack: u16,
    /// Local slots as read; the writer never emits less than it computes
    pub max_locals: u16,
    /// The instructions with their label, line number and frame markers
    pub instructions: InsnList,
    /// Exception handlers in priority order
    pub try_catch_blocks: Vec<TryCatchBlock>,
    /// Local variable names and types
    pub local_variables: Vec<LocalVariable>,
}

/// A field of a compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub desc: String,
    /// Generic signature
    pub signature: Option<String>,
    /// `ConstantValue` initializer of static fields
    pub value: Option<Constant>,
    /// Annotations on the field
    pub annotations: Annotations,
    /// Uninterpreted attributes
    pub attributes: Vec<RawAttribute>,
}

impl Field {
    /// Creates a field without attributes.
    #[must_use]
    pub fn new(access: AccessFlags, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Field {
            access,
            name: name.into(),
            desc: desc.into(),
            signature: None,
            value: None,
            annotations: Annotations::default(),
            attributes: Vec::new(),
        }
    }
}

/// A method of a compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// Access flags
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub desc: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Internal names from the `Exceptions` attribute
    pub exceptions: Vec<String>,
    /// Body, absent for abstract and native methods
    pub code: Option<Code>,
    /// `MethodParameters` entries
    pub parameters: Vec<Parameter>,
    /// `RuntimeVisibleParameterAnnotations`, one list per parameter
    pub visible_parameter_annotations: Option<Vec<Vec<Annotation>>>,
    /// `RuntimeInvisibleParameterAnnotations`, one list per parameter
    pub invisible_parameter_annotations: Option<Vec<Vec<Annotation>>>,
    /// `AnnotationDefault` of annotation interface elements
    pub annotation_default: Option<ElementValue>,
    /// Annotations on the method
    pub annotations: Annotations,
    /// Uninterpreted attributes
    pub attributes: Vec<RawAttribute>,
}

impl Method {
    /// Creates a method without body or attributes.
    #[must_use]
    pub fn new(access: AccessFlags, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Method {
            access,
            name: name.into(),
            desc: desc.into(),
            signature: None,
            exceptions: Vec::new(),
            code: None,
            parameters: Vec::new(),
            visible_parameter_annotations: None,
            invisible_parameter_annotations: None,
            annotation_default: None,
            annotations: Annotations::default(),
            attributes: Vec::new(),
        }
    }

    /// Returns `true` for instance and static initializers.
    #[must_use]
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

/// One class or interface: the unit of loading, rewriting and writing.
///
/// Other classes are referenced by internal name only (slash separated, such as
/// `java/lang/Object`); the [`crate::LoadSet`] resolves names to units.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version, 52 for Java 8
    pub major_version: u16,
    /// Access flags
    pub access: AccessFlags,
    /// Internal name
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Internal names of the directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Generic signature
    pub signature: Option<String>,
    /// `SourceFile` attribute
    pub source_file: Option<String>,
    /// `SourceDebugExtension` attribute
    pub source_debug: Option<Vec<u8>>,
    /// `InnerClasses` attribute
    pub inner_classes: Vec<InnerClass>,
    /// `EnclosingMethod` attribute
    pub enclosing_method: Option<EnclosingMethod>,
    /// `NestHost` attribute
    pub nest_host: Option<String>,
    /// `NestMembers` attribute
    pub nest_members: Vec<String>,
    /// `PermittedSubclasses` attribute
    pub permitted_subclasses: Vec<String>,
    /// `Record` attribute
    pub record_components: Option<Vec<RecordComponent>>,
    /// Annotations on the class
    pub annotations: Annotations,
    /// Uninterpreted attributes
    pub attributes: Vec<RawAttribute>,
    /// Fields in declaration order
    pub fields: Vec<Field>,
    /// Methods in declaration order
    pub methods: Vec<Method>,
    /// The constant pool the class was read with, kept when uninterpreted attributes may
    /// refer to it
    pub(crate) source_pool: Option<SourcePool>,
}

impl ClassFile {
    /// Creates an empty public class targeting Java 8.
    #[must_use]
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        ClassFile {
            minor_version: 0,
            major_version: 52,
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            signature: None,
            source_file: None,
            source_debug: None,
            inner_classes: Vec::new(),
            enclosing_method: None,
            nest_host: None,
            nest_members: Vec::new(),
            permitted_subclasses: Vec::new(),
            record_components: None,
            annotations: Annotations::default(),
            attributes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_pool: None,
        }
    }

    /// Returns `true` if this is an interface or annotation interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    /// Returns the package part of the name, empty for the default package.
    #[must_use]
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Iterates over the superclass followed by the interfaces.
    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }

    /// Finds a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, desc: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    /// Finds a method by name and descriptor for modification.
    pub fn method_mut(&mut self, name: &str, desc: &str) -> Option<&mut Method> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.desc == desc)
    }

    /// Removes a method by name and descriptor and returns it.
    pub fn remove_method(&mut self, name: &str, desc: &str) -> Option<Method> {
        let index = self
            .methods
            .iter()
            .position(|m| m.name == name && m.desc == desc)?;
        Some(self.methods.remove(index))
    }

    /// Returns `true` if a raw attribute with a payload requires the original constant pool.
    #[must_use]
    pub(crate) fn needs_source_pool(&self) -> bool {
        let has_payload = |attrs: &[RawAttribute]| attrs.iter().any(|a| !a.data.is_empty());
        has_payload(&self.attributes)
            || self.fields.iter().any(|f| has_payload(&f.attributes))
            || self.methods.iter().any(|m| has_payload(&m.attributes))
            || self
                .record_components
                .iter()
                .flatten()
                .any(|c| has_payload(&c.attributes))
    }

    /// Drops the retained constant pool if no raw attribute needs it any more.
    pub(crate) fn release_source_pool(&mut self) {
        if !self.needs_source_pool() {
            self.source_pool = None;
        }
    }

    /// Sets the constant pool raw attributes were read against.
    pub(crate) fn set_source_pool(&mut self, pool: SourcePool) {
        self.source_pool = Some(pool);
    }
}

/// Returns the package part of an internal name, empty for the default package.
#[must_use]
pub fn package_of(name: &str) -> &str {
    name.rfind('/').map_or("", |i| &name[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packages() {
        assert_eq!(package_of("java/lang/Object"), "java/lang");
        assert_eq!(package_of("Main"), "");
        let class = ClassFile::new("a/b/C", Some("java/lang/Object"));
        assert_eq!(class.package(), "a/b");
        assert_eq!(class.supertypes().collect::<Vec<_>>(), vec!["java/lang/Object"]);
    }

    #[test]
    fn member_lookup() {
        let mut class = ClassFile::new("C", Some("java/lang/Object"));
        class
            .methods
            .push(Method::new(AccessFlags::PUBLIC, "f", "()V"));
        class
            .methods
            .push(Method::new(AccessFlags::PUBLIC, "f", "(I)V"));
        class.fields.push(Field::new(AccessFlags::PRIVATE, "x", "I"));

        assert!(class.method("f", "(I)V").is_some());
        assert!(class.method("f", "(J)V").is_none());
        assert!(class.field("x").is_some());
        assert!(class.remove_method("f", "()V").is_some());
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn source_pool_only_for_payloads() {
        let mut class = ClassFile::new("C", None);
        class.attributes.push(RawAttribute {
            name: "Deprecated".into(),
            data: Vec::new(),
        });
        assert!(!class.needs_source_pool());
        class.attributes.push(RawAttribute {
            name: "Custom".into(),
            data: vec![0, 1],
        });
        assert!(class.needs_source_pool());
    }
}
