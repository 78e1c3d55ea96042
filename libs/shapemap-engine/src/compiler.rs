//! Plan compilation.
//!
//! A [`MappingPlan`] becomes a tree of `Arc<dyn Fn>` steps. All descriptor
//! lookups, name matching and shape decisions happen here, once; the
//! resulting routine only moves values.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use shapemap_api::descriptor::CloneFn;
use shapemap_api::error::ValueError;
use shapemap_api::value::{AnyBox, unbox};

use crate::error::MapError;
use crate::key::TypePairKey;
use crate::planner::{
    AssociativePlan, ElementPlan, FieldAction, FieldPlan, MappingPlan, ObjectPlan, SequencePlan,
    WrapperPlan,
};

pub type StepFn = dyn Fn(&dyn Any) -> Result<AnyBox, MapError> + Send + Sync;
type Step = Arc<StepFn>;
type FieldStep = Box<dyn Fn(&dyn Any, &mut dyn Any) -> Result<(), MapError> + Send + Sync>;

/// Write-once back-reference used by recursive type pairs.
type RecursionSlot = Arc<OnceLock<Weak<StepFn>>>;

/// Directly callable mapping routine for one type pair.
///
/// Holds no mutable state; safe to invoke from many threads at once.
pub struct CompiledRoutine {
    key: TypePairKey,
    step: Step,
}

impl fmt::Debug for CompiledRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoutine").field("key", &self.key).finish()
    }
}

impl CompiledRoutine {
    pub fn key(&self) -> TypePairKey {
        self.key
    }

    /// Map a type-erased source value.
    pub fn invoke_erased(&self, source: &dyn Any) -> Result<AnyBox, MapError> {
        (self.step)(source)
    }

    pub fn invoke<S: Any, D: Any>(&self, source: &S) -> Result<D, MapError> {
        if self.key.source_id() != TypeId::of::<S>() || self.key.target_id() != TypeId::of::<D>() {
            return Err(MapError::Configuration(format!(
                "routine for {} cannot map {} -> {}",
                self.key,
                std::any::type_name::<S>(),
                std::any::type_name::<D>()
            )));
        }
        Ok(unbox::<D>((self.step)(source)?)?)
    }
}

/// Compile `plan` into a routine for `key`.
pub fn compile(key: TypePairKey, plan: MappingPlan) -> CompiledRoutine {
    let mut compiler = Compiler::default();
    let step = compiler.step(plan);
    CompiledRoutine { key, step }
}

#[derive(Default)]
struct Compiler {
    slots: HashMap<TypePairKey, RecursionSlot>,
}

/// Element strategy after compilation. `Direct` never calls a nested routine.
enum ElementStep {
    Direct(CloneFn),
    Mapped(Step),
}

impl ElementStep {
    fn apply(&self, value: &dyn Any) -> Result<AnyBox, MapError> {
        match self {
            ElementStep::Direct(clone) => Ok(clone(value)?),
            ElementStep::Mapped(step) => step(value),
        }
    }
}

fn inaccessible(field: &str) -> MapError {
    MapError::Value(ValueError::type_mismatch(format!(
        "field '{field}' is not accessible on the given value"
    )))
}

impl Compiler {
    fn slot(&mut self, key: TypePairKey) -> RecursionSlot {
        self.slots.entry(key).or_default().clone()
    }

    fn step(&mut self, plan: MappingPlan) -> Step {
        match plan {
            MappingPlan::Clone(clone) => {
                Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
                    Ok(clone(source)?)
                })
            }
            MappingPlan::Convert(plan) => {
                let to_scalar = plan.source.to_scalar;
                let from_scalar = plan.target.from_scalar;
                Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
                    Ok(from_scalar(to_scalar(source)?)?)
                })
            }
            MappingPlan::Wrapper(plan) => self.wrapper_step(*plan),
            MappingPlan::Sequence(plan) => self.sequence_step(*plan),
            MappingPlan::Associative(plan) => self.associative_step(*plan),
            MappingPlan::Object(plan) => self.object_step(plan),
            MappingPlan::Recursive(key) => {
                let slot = self.slot(key);
                Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
                    let step = slot
                        .get()
                        .and_then(Weak::upgrade)
                        .ok_or_else(|| MapError::DanglingRecursion(key.to_string()))?;
                    step(source)
                })
            }
        }
    }

    fn element_step(&mut self, plan: ElementPlan) -> ElementStep {
        match plan {
            ElementPlan::Direct(clone) => ElementStep::Direct(clone),
            ElementPlan::Mapped(plan) => ElementStep::Mapped(self.step(plan)),
        }
    }

    fn wrapper_step(&mut self, plan: WrapperPlan) -> Step {
        let WrapperPlan {
            key,
            unwrap,
            wrap,
            on_absent,
            inner,
        } = plan;
        let inner = self.step(inner);

        Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
            let value = match unwrap {
                Some(get) => get(source)?,
                None => Some(source),
            };
            let Some(value) = value else {
                let construct = on_absent.ok_or_else(|| {
                    ValueError::construct(format!(
                        "absent value cannot be mapped into {}",
                        key.target_name()
                    ))
                })?;
                return Ok(construct()?);
            };
            let mapped = inner(value)?;
            match wrap {
                Some(wrap) => Ok(wrap(mapped)?),
                None => Ok(mapped),
            }
        })
    }

    fn sequence_step(&mut self, plan: SequencePlan) -> Step {
        let elements = plan.source.elements;
        let build = plan.target.build;
        let reverse = plan.reverse_source;
        let element = self.element_step(plan.element);

        Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
            let mut items = elements(source)?;
            if reverse {
                items.reverse();
            }
            let mapped = items
                .into_iter()
                .map(|item| element.apply(item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(build(mapped)?)
        })
    }

    fn associative_step(&mut self, plan: AssociativePlan) -> Step {
        let entries = plan.source.entries;
        let build = plan.target.build;
        let key_clone = plan.key_clone;
        let value = self.element_step(plan.value);

        Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
            let mapped = entries(source)?
                .into_iter()
                .map(|(k, v)| -> Result<(AnyBox, AnyBox), MapError> {
                    Ok((key_clone(k)?, value.apply(v)?))
                })
                .collect::<Result<Vec<_>, MapError>>()?;
            Ok(build(mapped)?)
        })
    }

    fn object_step(&mut self, plan: ObjectPlan) -> Step {
        let ObjectPlan {
            key,
            construct,
            fields,
        } = plan;
        let fields: Vec<FieldStep> = fields
            .into_iter()
            .map(|field| self.field_step(field))
            .collect();

        let step: Step = Arc::new(move |source: &dyn Any| -> Result<AnyBox, MapError> {
            let mut target = construct()?;
            for field in &fields {
                field(source, &mut *target)?;
            }
            Ok(target)
        });

        // Resolve back-references emitted while planning this pair's fields.
        if let Some(slot) = self.slots.get(&key) {
            let _ = slot.set(Arc::downgrade(&step));
        }
        step
    }

    fn field_step(&mut self, field: FieldPlan) -> FieldStep {
        let FieldPlan {
            name,
            write,
            assign,
            action,
        } = field;

        match action {
            FieldAction::Copy { read, clone, guard } => {
                Box::new(move |source: &dyn Any, target: &mut dyn Any| -> Result<(), MapError> {
                    let value = read(source).ok_or_else(|| inaccessible(name))?;
                    if let Some(get) = guard {
                        if get(value)?.is_none() {
                            return Ok(());
                        }
                    }
                    let copied = clone(value)?;
                    let slot = write(target).ok_or_else(|| inaccessible(name))?;
                    assign(slot, copied)?;
                    Ok(())
                })
            }
            FieldAction::Map { read, guard, plan } => {
                let step = self.step(plan);
                Box::new(move |source: &dyn Any, target: &mut dyn Any| -> Result<(), MapError> {
                    let value = read(source).ok_or_else(|| inaccessible(name))?;
                    if let Some(get) = guard {
                        if get(value)?.is_none() {
                            return Ok(());
                        }
                    }
                    let mapped = step(value)
                        .map_err(|e| e.with_context(format!("field '{name}'")))?;
                    let slot = write(target).ok_or_else(|| inaccessible(name))?;
                    assign(slot, mapped)?;
                    Ok(())
                })
            }
            FieldAction::ConstructMissing {
                get,
                wrap,
                construct,
            } => Box::new(move |_source: &dyn Any, target: &mut dyn Any| -> Result<(), MapError> {
                let slot = write(target).ok_or_else(|| inaccessible(name))?;
                if get(&*slot)?.is_some() {
                    return Ok(());
                }
                let value = wrap(construct()?)?;
                assign(slot, value)?;
                Ok(())
            }),
        }
    }
}
