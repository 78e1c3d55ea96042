use std::any::{Any, TypeId};
use std::fmt;

use crate::error::ValueError;
use crate::value::{AnyBox, Scalar, downcast, downcast_mut, unbox};

/// Borrow a field of a type-erased object. `None` when the object is not of the owning type.
pub type ReadFn = for<'a> fn(&'a dyn Any) -> Option<&'a dyn Any>;
/// Mutably borrow a field of a type-erased object.
pub type WriteFn = for<'a> fn(&'a mut dyn Any) -> Option<&'a mut dyn Any>;
pub type CloneFn = fn(&dyn Any) -> Result<AnyBox, ValueError>;
/// Overwrite a slot with a boxed value of the same type.
pub type AssignFn = fn(&mut dyn Any, AnyBox) -> Result<(), ValueError>;
pub type ConstructFn = fn() -> Result<AnyBox, ValueError>;
/// Lazy descriptor reference. Keeps self-referencing types describable.
pub type DescribeFn = fn() -> TypeDescriptor;

pub type UnwrapFn = for<'a> fn(&'a dyn Any) -> Result<Option<&'a dyn Any>, ValueError>;
pub type WrapFn = fn(AnyBox) -> Result<AnyBox, ValueError>;
pub type ElementsFn = for<'a> fn(&'a dyn Any) -> Result<Vec<&'a dyn Any>, ValueError>;
pub type BuildFn = fn(Vec<AnyBox>) -> Result<AnyBox, ValueError>;
pub type EntriesFn =
    for<'a> fn(&'a dyn Any) -> Result<Vec<(&'a dyn Any, &'a dyn Any)>, ValueError>;
pub type BuildEntriesFn = fn(Vec<(AnyBox, AnyBox)>) -> Result<AnyBox, ValueError>;

/// Type-metadata provider.
///
/// Implemented for primitives and standard containers in this crate, and for
/// user structs via `#[derive(Mappable)]`.
pub trait Mappable: Any + Clone + Send + Sync {
    fn descriptor() -> TypeDescriptor;
}

/// Structural classification used in diagnostics and cache snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Primitive,
    Optional,
    Boxed,
    Sequence,
    Associative,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Char,
    /// `String`. Never treated as a sequence.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    /// `Option<T>`: may be absent.
    Optional,
    /// `Box<T>`: always present.
    Boxed,
}

/// Destination container kind. Selects the reconstruction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    /// `[T; N]`, `Box<[T]>`.
    Array,
    /// `Vec<T>`.
    List,
    /// `LinkedList<T>`.
    Linked,
    /// `HashSet<T>`, `BTreeSet<T>`: building de-duplicates.
    Set,
    /// `Stack<T>`: enumerates top-first, builds by pushing in order.
    Stack,
    /// `VecDeque<T>`: enumerates and builds in enqueue order.
    Queue,
    /// `Arc<[T]>`: built over an intermediate `Vec`.
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociativeKind {
    Hash,
    Ordered,
}

#[derive(Clone, Copy)]
pub struct PrimitiveDescriptor {
    pub kind: PrimitiveKind,
    pub to_scalar: fn(&dyn Any) -> Result<Scalar, ValueError>,
    pub from_scalar: fn(Scalar) -> Result<AnyBox, ValueError>,
}

#[derive(Clone, Copy)]
pub struct WrapperDescriptor {
    pub kind: WrapperKind,
    pub inner: DescribeFn,
    /// `Ok(None)` only for an absent optional.
    pub get: UnwrapFn,
    pub wrap: WrapFn,
}

#[derive(Clone, Copy)]
pub struct SequenceDescriptor {
    pub kind: SequenceKind,
    pub element: DescribeFn,
    /// Elements in enumeration order.
    pub elements: ElementsFn,
    /// Rebuild from elements in insertion order.
    pub build: BuildFn,
}

#[derive(Clone, Copy)]
pub struct AssociativeDescriptor {
    pub kind: AssociativeKind,
    pub key: DescribeFn,
    pub value: DescribeFn,
    pub entries: EntriesFn,
    pub build: BuildEntriesFn,
}

/// A single field of an object.
///
/// `read`/`write` are `None` when the field is not readable/writable by the mapper.
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: DescribeFn,
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
}

impl FieldDescriptor {
    pub fn new<T: Mappable>(
        name: &'static str,
        read: Option<ReadFn>,
        write: Option<WriteFn>,
    ) -> Self {
        Self {
            name,
            ty: T::descriptor,
            read,
            write,
        }
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        (self.ty)()
    }

    pub fn is_readable(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }
}

#[derive(Clone, Default)]
pub struct ObjectDescriptor {
    /// Declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone)]
pub enum Shape {
    Primitive(PrimitiveDescriptor),
    Wrapper(WrapperDescriptor),
    Sequence(SequenceDescriptor),
    Associative(AssociativeDescriptor),
    Object(ObjectDescriptor),
}

/// Runtime description of a `Mappable` type.
///
/// The `clone`/`assign`/`construct` functions always operate on values of
/// exactly `type_id`; they fail with `TypeMismatch` otherwise.
#[derive(Clone)]
pub struct TypeDescriptor {
    type_id: TypeId,
    name: &'static str,
    shape: Shape,
    clone: CloneFn,
    assign: AssignFn,
    construct: Option<ConstructFn>,
}

impl TypeDescriptor {
    fn with_shape<T: Mappable>(shape: Shape, construct: Option<ConstructFn>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape,
            clone: clone_erased::<T>,
            assign: assign_erased::<T>,
            construct,
        }
    }

    pub fn of<T: Mappable>() -> Self {
        T::descriptor()
    }

    pub fn primitive<T: Mappable + Default>(primitive: PrimitiveDescriptor) -> Self {
        Self::with_shape::<T>(Shape::Primitive(primitive), Some(construct_default::<T>))
    }

    pub fn wrapper<T: Mappable>(
        wrapper: WrapperDescriptor,
        construct: Option<ConstructFn>,
    ) -> Self {
        Self::with_shape::<T>(Shape::Wrapper(wrapper), construct)
    }

    pub fn sequence<T: Mappable>(
        sequence: SequenceDescriptor,
        construct: Option<ConstructFn>,
    ) -> Self {
        Self::with_shape::<T>(Shape::Sequence(sequence), construct)
    }

    pub fn associative<T: Mappable + Default>(associative: AssociativeDescriptor) -> Self {
        Self::with_shape::<T>(Shape::Associative(associative), Some(construct_default::<T>))
    }

    /// `construct` is `None` for objects without a no-argument constructor;
    /// such types can be mapped from, never into.
    pub fn object<T: Mappable>(
        fields: Vec<FieldDescriptor>,
        construct: Option<ConstructFn>,
    ) -> Self {
        Self::with_shape::<T>(Shape::Object(ObjectDescriptor { fields }), construct)
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_kind(&self) -> ShapeKind {
        match &self.shape {
            Shape::Primitive(_) => ShapeKind::Primitive,
            Shape::Wrapper(w) if w.kind == WrapperKind::Optional => ShapeKind::Optional,
            Shape::Wrapper(_) => ShapeKind::Boxed,
            Shape::Sequence(_) => ShapeKind::Sequence,
            Shape::Associative(_) => ShapeKind::Associative,
            Shape::Object(_) => ShapeKind::Object,
        }
    }

    pub fn is_same(&self, other: &TypeDescriptor) -> bool {
        self.type_id == other.type_id
    }

    pub fn is_optional(&self) -> bool {
        self.shape_kind() == ShapeKind::Optional
    }

    /// Sequence or associative.
    pub fn is_collection(&self) -> bool {
        matches!(self.shape, Shape::Sequence(_) | Shape::Associative(_))
    }

    pub fn wrapper_descriptor(&self) -> Option<&WrapperDescriptor> {
        match &self.shape {
            Shape::Wrapper(w) => Some(w),
            _ => None,
        }
    }

    /// The type with every `Option`/`Box` layer stripped.
    pub fn core(&self) -> TypeDescriptor {
        let mut current = self.clone();
        while let Shape::Wrapper(w) = &current.shape {
            current = (w.inner)();
        }
        current
    }

    pub fn clone_value(&self, value: &dyn Any) -> Result<AnyBox, ValueError> {
        (self.clone)(value)
    }

    pub fn clone_fn(&self) -> CloneFn {
        self.clone
    }

    pub fn assign_fn(&self) -> AssignFn {
        self.assign
    }

    pub fn construct_fn(&self) -> Option<ConstructFn> {
        self.construct
    }

    pub fn is_constructible(&self) -> bool {
        self.construct.is_some()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape_kind())
            .field("constructible", &self.is_constructible())
            .finish()
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

fn clone_erased<T: Mappable>(value: &dyn Any) -> Result<AnyBox, ValueError> {
    Ok(Box::new(downcast::<T>(value)?.clone()))
}

fn assign_erased<T: Mappable>(slot: &mut dyn Any, value: AnyBox) -> Result<(), ValueError> {
    let value = unbox::<T>(value)?;
    *downcast_mut::<T>(slot)? = value;
    Ok(())
}

/// `ConstructFn` for any `Default` type. Used by `#[derive(Mappable)]`.
pub fn construct_default<T: Default + Any>() -> Result<AnyBox, ValueError> {
    Ok(Box::new(T::default()))
}
