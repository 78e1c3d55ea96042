//! Type-pair planning.
//!
//! Classifies a (source, destination) descriptor pair and builds a
//! [`MappingPlan`] from type metadata only. Priority order:
//!
//! 1. identical types → clone
//! 2. `Option`/`Box` on either side → null-guarded wrapper plan
//! 3. associative ↔ associative (exact key type), mismatch is a config error
//! 4. sequence ↔ sequence, mismatch is a config error
//! 5. primitive ↔ primitive → scalar conversion
//! 6. object ↔ object → per-field plan
//!
//! Object pairs already being planned higher up the stack become
//! [`MappingPlan::Recursive`] so self-referencing types plan in finite time.

use std::fmt;

use shapemap_api::descriptor::{
    AssignFn, AssociativeDescriptor, CloneFn, ConstructFn, ObjectDescriptor, PrimitiveDescriptor,
    ReadFn, SequenceDescriptor, SequenceKind, Shape, TypeDescriptor, UnwrapFn, WrapFn,
    WrapperDescriptor, WrapperKind, WriteFn,
};

use crate::error::MapError;
use crate::key::TypePairKey;

/// Transient plan for one type pair. Discarded once compiled.
pub enum MappingPlan {
    /// Identical types: clone the whole value.
    Clone(CloneFn),
    Convert(ConvertPlan),
    Wrapper(Box<WrapperPlan>),
    Sequence(Box<SequencePlan>),
    Associative(Box<AssociativePlan>),
    Object(ObjectPlan),
    /// Back-reference to an object pair that encloses this node.
    Recursive(TypePairKey),
}

impl MappingPlan {
    pub fn shape_name(&self) -> &'static str {
        match self {
            MappingPlan::Clone(_) => "clone",
            MappingPlan::Convert(_) => "convert",
            MappingPlan::Wrapper(_) => "wrapper",
            MappingPlan::Sequence(_) => "sequence",
            MappingPlan::Associative(_) => "associative",
            MappingPlan::Object(_) => "object",
            MappingPlan::Recursive(_) => "recursive",
        }
    }
}

impl fmt::Debug for MappingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingPlan::Object(object) => f
                .debug_struct("Object")
                .field(
                    "fields",
                    &object.fields.iter().map(|field| field.name).collect::<Vec<_>>(),
                )
                .finish(),
            MappingPlan::Recursive(key) => f.debug_tuple("Recursive").field(key).finish(),
            other => f.write_str(other.shape_name()),
        }
    }
}

pub struct ConvertPlan {
    pub source: PrimitiveDescriptor,
    pub target: PrimitiveDescriptor,
}

pub struct WrapperPlan {
    pub key: TypePairKey,
    /// Unwrap step, when the source is `Option`/`Box`.
    pub unwrap: Option<UnwrapFn>,
    /// Wrap step, when the destination is `Option`/`Box`.
    pub wrap: Option<WrapFn>,
    /// Produces the destination for an absent source.
    pub on_absent: Option<ConstructFn>,
    pub inner: MappingPlan,
}

/// Per-element (or per-value) strategy.
pub enum ElementPlan {
    /// Identical element types: clone, no nested routine.
    Direct(CloneFn),
    Mapped(MappingPlan),
}

pub struct SequencePlan {
    pub source: SequenceDescriptor,
    pub target: SequenceDescriptor,
    pub element: ElementPlan,
    /// The source enumerates top-first (stack); reverse before rebuilding so
    /// a stack destination pops in the same order.
    pub reverse_source: bool,
}

pub struct AssociativePlan {
    pub source: AssociativeDescriptor,
    pub target: AssociativeDescriptor,
    pub key_clone: CloneFn,
    pub value: ElementPlan,
}

pub struct ObjectPlan {
    pub key: TypePairKey,
    pub construct: ConstructFn,
    pub fields: Vec<FieldPlan>,
}

pub struct FieldPlan {
    pub name: &'static str,
    pub write: WriteFn,
    pub assign: AssignFn,
    pub action: FieldAction,
}

pub enum FieldAction {
    /// Identical field types. `guard` skips an absent `Option` source.
    Copy {
        read: ReadFn,
        clone: CloneFn,
        guard: Option<UnwrapFn>,
    },
    /// Nested plan, null-guarded.
    Map {
        read: ReadFn,
        guard: Option<UnwrapFn>,
        plan: MappingPlan,
    },
    /// Destination-only `Option<T>` of a constructible object: set to
    /// `Some(T::default())` when still `None`.
    ConstructMissing {
        get: UnwrapFn,
        wrap: WrapFn,
        construct: ConstructFn,
    },
}

/// Plan the mapping from `source` to `target`.
///
/// With `allow_recursion == false` only fields whose types match (modulo
/// `Option`/`Box`) are planned; nested objects and differing collections are
/// skipped.
pub fn plan(
    source: &TypeDescriptor,
    target: &TypeDescriptor,
    allow_recursion: bool,
) -> Result<MappingPlan, MapError> {
    Planner::new(allow_recursion).plan_pair(source, target)
}

pub struct Planner {
    allow_recursion: bool,
    /// Object pairs currently being planned.
    in_progress: Vec<TypePairKey>,
}

impl Planner {
    pub fn new(allow_recursion: bool) -> Self {
        Self {
            allow_recursion,
            in_progress: Vec::new(),
        }
    }

    pub fn plan_pair(
        &mut self,
        source: &TypeDescriptor,
        target: &TypeDescriptor,
    ) -> Result<MappingPlan, MapError> {
        let key = TypePairKey::new(source, target);
        if source.is_same(target) {
            return Ok(MappingPlan::Clone(target.clone_fn()));
        }

        match (source.shape(), target.shape()) {
            (Shape::Wrapper(_), _) | (_, Shape::Wrapper(_)) => {
                self.plan_wrapper(key, source, target)
            }
            (Shape::Associative(s), Shape::Associative(d)) => self.plan_associative(key, s, d),
            (Shape::Associative(_), _) | (_, Shape::Associative(_)) => {
                Err(MapError::Configuration(format!(
                    "cannot map {key}: only one side is associative"
                )))
            }
            (Shape::Sequence(s), Shape::Sequence(d)) => self.plan_sequence(s, d),
            (Shape::Sequence(_), _) | (_, Shape::Sequence(_)) => {
                Err(MapError::Configuration(format!(
                    "cannot map {key}: only one side is a sequence"
                )))
            }
            (Shape::Primitive(s), Shape::Primitive(d)) => Ok(MappingPlan::Convert(ConvertPlan {
                source: *s,
                target: *d,
            })),
            (Shape::Object(s), Shape::Object(d)) => self.plan_object(key, s, target, d),
            _ => Err(MapError::Configuration(format!(
                "cannot map {key}: {:?} and {:?} shapes are incompatible",
                source.shape_kind(),
                target.shape_kind()
            ))),
        }
    }

    fn plan_wrapper(
        &mut self,
        key: TypePairKey,
        source: &TypeDescriptor,
        target: &TypeDescriptor,
    ) -> Result<MappingPlan, MapError> {
        let source_wrapper = source.wrapper_descriptor().copied();
        let target_wrapper = target.wrapper_descriptor().copied();

        let inner_source = source_wrapper.map_or_else(|| source.clone(), |w| (w.inner)());
        let inner_target = target_wrapper.map_or_else(|| target.clone(), |w| (w.inner)());
        let inner = self.plan_pair(&inner_source, &inner_target)?;

        Ok(MappingPlan::Wrapper(Box::new(WrapperPlan {
            key,
            unwrap: source_wrapper.map(|w| w.get),
            wrap: target_wrapper.map(|w| w.wrap),
            on_absent: target.construct_fn(),
            inner,
        })))
    }

    fn element_plan(
        &mut self,
        source: &TypeDescriptor,
        target: &TypeDescriptor,
    ) -> Result<ElementPlan, MapError> {
        if source.is_same(target) {
            Ok(ElementPlan::Direct(target.clone_fn()))
        } else {
            Ok(ElementPlan::Mapped(self.plan_pair(source, target)?))
        }
    }

    fn plan_associative(
        &mut self,
        key: TypePairKey,
        source: &AssociativeDescriptor,
        target: &AssociativeDescriptor,
    ) -> Result<MappingPlan, MapError> {
        let source_key = (source.key)();
        let target_key = (target.key)();
        if !source_key.is_same(&target_key) {
            return Err(MapError::Configuration(format!(
                "cannot map {key}: key types differ ({} vs {})",
                source_key.name(),
                target_key.name()
            )));
        }
        let value = self.element_plan(&(source.value)(), &(target.value)())?;
        Ok(MappingPlan::Associative(Box::new(AssociativePlan {
            source: *source,
            target: *target,
            key_clone: target_key.clone_fn(),
            value,
        })))
    }

    fn plan_sequence(
        &mut self,
        source: &SequenceDescriptor,
        target: &SequenceDescriptor,
    ) -> Result<MappingPlan, MapError> {
        let element = self.element_plan(&(source.element)(), &(target.element)())?;
        Ok(MappingPlan::Sequence(Box::new(SequencePlan {
            source: *source,
            target: *target,
            element,
            reverse_source: source.kind == SequenceKind::Stack
                && target.kind == SequenceKind::Stack,
        })))
    }

    fn plan_object(
        &mut self,
        key: TypePairKey,
        source: &ObjectDescriptor,
        target_type: &TypeDescriptor,
        target: &ObjectDescriptor,
    ) -> Result<MappingPlan, MapError> {
        if self.in_progress.contains(&key) {
            tracing::debug!(pair = %key, "recursive type pair, deferring to enclosing routine");
            return Ok(MappingPlan::Recursive(key));
        }
        let construct = target_type.construct_fn().ok_or_else(|| {
            MapError::Configuration(format!(
                "cannot map {key}: {} has no no-argument constructor",
                target_type.name()
            ))
        })?;

        self.in_progress.push(key);
        let fields = self.plan_fields(key, source, target);
        self.in_progress.pop();

        Ok(MappingPlan::Object(ObjectPlan {
            key,
            construct,
            fields: fields?,
        }))
    }

    fn plan_fields(
        &mut self,
        key: TypePairKey,
        source: &ObjectDescriptor,
        target: &ObjectDescriptor,
    ) -> Result<Vec<FieldPlan>, MapError> {
        let mut fields = Vec::new();
        for target_field in &target.fields {
            let Some(write) = target_field.write else {
                continue;
            };
            let target_type = target_field.descriptor();

            let readable = source
                .field(target_field.name)
                .and_then(|f| f.read.map(|read| (f.descriptor(), read)));
            let action = match readable {
                Some((source_type, read)) => self
                    .plan_field(read, &source_type, &target_type)
                    .map_err(|e| e.with_context(format!("{key}, field '{}'", target_field.name)))?,
                _ => construct_missing(&target_type),
            };

            match action {
                Some(action) => fields.push(FieldPlan {
                    name: target_field.name,
                    write,
                    assign: target_type.assign_fn(),
                    action,
                }),
                None => tracing::debug!(
                    pair = %key,
                    field = target_field.name,
                    "skipping field: no compatible conversion"
                ),
            }
        }
        Ok(fields)
    }

    fn plan_field(
        &mut self,
        read: ReadFn,
        source: &TypeDescriptor,
        target: &TypeDescriptor,
    ) -> Result<Option<FieldAction>, MapError> {
        let guard = source
            .wrapper_descriptor()
            .filter(|w| w.kind == WrapperKind::Optional)
            .map(|w| w.get);

        if source.is_same(target) {
            return Ok(Some(FieldAction::Copy {
                read,
                clone: target.clone_fn(),
                guard,
            }));
        }

        let source_core = source.core();
        let target_core = target.core();
        let nested = if source_core.is_same(&target_core) {
            true
        } else if !self.allow_recursion {
            false
        } else {
            let both_collections = source_core.is_collection() && target_core.is_collection();
            let both_objects = matches!(
                (source_core.shape(), target_core.shape()),
                (Shape::Object(_), Shape::Object(_))
            );
            both_collections || both_objects
        };

        if !nested {
            return Ok(None);
        }
        Ok(Some(FieldAction::Map {
            read,
            guard,
            plan: self.plan_pair(source, target)?,
        }))
    }
}

fn construct_missing(target: &TypeDescriptor) -> Option<FieldAction> {
    let wrapper: &WrapperDescriptor = target.wrapper_descriptor()?;
    if wrapper.kind != WrapperKind::Optional {
        return None;
    }
    let inner = (wrapper.inner)();
    // Scalars keep their `None`; nested `Option`s are left absent.
    if matches!(inner.shape(), Shape::Primitive(_)) || inner.is_optional() {
        return None;
    }
    Some(FieldAction::ConstructMissing {
        get: wrapper.get,
        wrap: wrapper.wrap,
        construct: inner.construct_fn()?,
    })
}
