//! Annotations and their element values.

/// A single annotation instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub desc: String,
    /// Element name/value pairs in declaration order
    pub values: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// Creates an annotation without element values.
    #[must_use]
    pub fn new(desc: impl Into<String>) -> Self {
        Annotation {
            desc: desc.into(),
            values: Vec::new(),
        }
    }
}

/// The value of an annotation element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// `B`
    Byte(i8),
    /// `C`
    Char(u16),
    /// `D`
    Double(f64),
    /// `F`
    Float(f32),
    /// `I`
    Int(i32),
    /// `J`
    Long(i64),
    /// `S`
    Short(i16),
    /// `Z`
    Boolean(bool),
    /// `s`
    String(String),
    /// `e`: enum constant
    Enum {
        /// Field descriptor of the enum class
        desc: String,
        /// Constant name
        name: String,
    },
    /// `c`: a return descriptor such as `Ljava/lang/String;` or `V`
    Class(String),
    /// `@`: nested annotation
    Annotation(Annotation),
    /// `[`
    Array(Vec<ElementValue>),
}

/// A type annotation on a class, field, method or record component.
///
/// The target and type path are kept in their encoded form; they only contain indices into
/// the type parameter, supertype, parameter and throws lists, never constant pool indices.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    /// `target_type` followed by `target_info`
    pub target: Vec<u8>,
    /// `type_path` including its length byte
    pub path: Vec<u8>,
    /// The annotation itself
    pub annotation: Annotation,
}

/// The four annotation attributes a class, field, method or record component can carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    /// `RuntimeVisibleAnnotations`
    pub visible: Vec<Annotation>,
    /// `RuntimeInvisibleAnnotations`
    pub invisible: Vec<Annotation>,
    /// `RuntimeVisibleTypeAnnotations`
    pub visible_type: Vec<TypeAnnotation>,
    /// `RuntimeInvisibleTypeAnnotations`
    pub invisible_type: Vec<TypeAnnotation>,
}

impl Annotations {
    /// Returns `true` if no annotation of any kind is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
            && self.invisible.is_empty()
            && self.visible_type.is_empty()
            && self.invisible_type.is_empty()
    }

    /// Iterates over every annotation, including those wrapped by type annotations.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.visible
            .iter()
            .chain(self.invisible.iter())
            .chain(self.visible_type.iter().map(|t| &t.annotation))
            .chain(self.invisible_type.iter().map(|t| &t.annotation))
    }

    /// Iterates mutably over every annotation, including those wrapped by type annotations.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Annotation> {
        self.visible
            .iter_mut()
            .chain(self.invisible.iter_mut())
            .chain(self.visible_type.iter_mut().map(|t| &mut t.annotation))
            .chain(self.invisible_type.iter_mut().map(|t| &mut t.annotation))
    }
}
