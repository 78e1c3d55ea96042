use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use crate::descriptor::{
    AssociativeDescriptor, AssociativeKind, ConstructFn, Mappable, SequenceDescriptor,
    SequenceKind, TypeDescriptor, WrapperDescriptor, WrapperKind, construct_default,
};
use crate::error::ValueError;
use crate::stack::Stack;
use crate::value::{AnyBox, downcast, unbox};

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

fn option_get<T: Any>(value: &dyn Any) -> Result<Option<&dyn Any>, ValueError> {
    Ok(downcast::<Option<T>>(value)?.as_ref().map(|v| v as &dyn Any))
}

fn option_wrap<T: Any>(value: AnyBox) -> Result<AnyBox, ValueError> {
    Ok(Box::new(Some(unbox::<T>(value)?)))
}

fn boxed_get<T: Any>(value: &dyn Any) -> Result<Option<&dyn Any>, ValueError> {
    Ok(Some(downcast::<Box<T>>(value)?.as_ref() as &dyn Any))
}

fn boxed_wrap<T: Any>(value: AnyBox) -> Result<AnyBox, ValueError> {
    Ok(Box::new(Box::new(unbox::<T>(value)?)))
}

fn construct_boxed<T: Mappable>() -> Result<AnyBox, ValueError> {
    let construct = T::descriptor().construct_fn().ok_or_else(|| {
        ValueError::construct(format!("{} has no no-argument constructor", type_name::<T>()))
    })?;
    boxed_wrap::<T>(construct()?)
}

impl<T: Mappable> Mappable for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::wrapper::<Self>(
            WrapperDescriptor {
                kind: WrapperKind::Optional,
                inner: T::descriptor,
                get: option_get::<T>,
                wrap: option_wrap::<T>,
            },
            Some(construct_default::<Self>),
        )
    }
}

impl<T: Mappable> Mappable for Box<T> {
    fn descriptor() -> TypeDescriptor {
        let construct = T::descriptor()
            .construct_fn()
            .map(|_| construct_boxed::<T> as ConstructFn);
        TypeDescriptor::wrapper::<Self>(
            WrapperDescriptor {
                kind: WrapperKind::Boxed,
                inner: T::descriptor,
                get: boxed_get::<T>,
                wrap: boxed_wrap::<T>,
            },
            construct,
        )
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

fn iter_elements<C, T>(value: &dyn Any) -> Result<Vec<&dyn Any>, ValueError>
where
    C: Any,
    T: Any,
    for<'b> &'b C: IntoIterator<Item = &'b T>,
{
    Ok(downcast::<C>(value)?
        .into_iter()
        .map(|e| e as &dyn Any)
        .collect())
}

fn slice_elements<C, T>(value: &dyn Any) -> Result<Vec<&dyn Any>, ValueError>
where
    C: AsRef<[T]> + Any,
    T: Any,
{
    Ok(downcast::<C>(value)?
        .as_ref()
        .iter()
        .map(|e| e as &dyn Any)
        .collect())
}

fn collect_elements<C, T>(items: Vec<AnyBox>) -> Result<AnyBox, ValueError>
where
    C: FromIterator<T> + Any,
    T: Any,
{
    let collected = items.into_iter().map(unbox::<T>).collect::<Result<C, _>>()?;
    Ok(Box::new(collected))
}

fn collect_array<T: Any, const N: usize>(items: Vec<AnyBox>) -> Result<AnyBox, ValueError> {
    let len = items.len();
    let values = items.into_iter().map(unbox::<T>).collect::<Result<Vec<T>, _>>()?;
    let array: [T; N] = values.try_into().map_err(|_| {
        ValueError::construct(format!(
            "{} needs exactly {N} elements, got {len}",
            type_name::<[T; N]>()
        ))
    })?;
    Ok(Box::new(array))
}

fn construct_shared_slice<T: Any + Send + Sync>() -> Result<AnyBox, ValueError> {
    Ok(Box::new(Arc::<[T]>::from(Vec::new())))
}

macro_rules! impl_sequence {
    ($kind:expr, $container:ty, [$($bound:tt)*]) => {
        impl<T: Mappable $($bound)*> Mappable for $container {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::sequence::<Self>(
                    SequenceDescriptor {
                        kind: $kind,
                        element: T::descriptor,
                        elements: iter_elements::<Self, T>,
                        build: collect_elements::<Self, T>,
                    },
                    Some(construct_default::<Self>),
                )
            }
        }
    };
}

impl_sequence!(SequenceKind::List, Vec<T>, []);
impl_sequence!(SequenceKind::Linked, LinkedList<T>, []);
impl_sequence!(SequenceKind::Queue, VecDeque<T>, []);
impl_sequence!(SequenceKind::Stack, Stack<T>, []);
impl_sequence!(SequenceKind::Set, HashSet<T>, [+ Eq + Hash]);
impl_sequence!(SequenceKind::Set, BTreeSet<T>, [+ Ord]);

impl<T: Mappable> Mappable for Box<[T]> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::sequence::<Self>(
            SequenceDescriptor {
                kind: SequenceKind::Array,
                element: T::descriptor,
                elements: slice_elements::<Self, T>,
                build: collect_elements::<Self, T>,
            },
            Some(construct_default::<Self>),
        )
    }
}

impl<T: Mappable> Mappable for Arc<[T]> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::sequence::<Self>(
            SequenceDescriptor {
                kind: SequenceKind::ReadOnly,
                element: T::descriptor,
                elements: slice_elements::<Self, T>,
                build: collect_elements::<Self, T>,
            },
            Some(construct_shared_slice::<T>),
        )
    }
}

impl<T: Mappable, const N: usize> Mappable for [T; N] {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::sequence::<Self>(
            SequenceDescriptor {
                kind: SequenceKind::Array,
                element: T::descriptor,
                elements: slice_elements::<Self, T>,
                build: collect_array::<T, N>,
            },
            None,
        )
    }
}

// ---------------------------------------------------------------------------
// Associative
// ---------------------------------------------------------------------------

fn map_entries<C, K, V>(value: &dyn Any) -> Result<Vec<(&dyn Any, &dyn Any)>, ValueError>
where
    C: Any,
    K: Any,
    V: Any,
    for<'b> &'b C: IntoIterator<Item = (&'b K, &'b V)>,
{
    Ok(downcast::<C>(value)?
        .into_iter()
        .map(|(k, v)| (k as &dyn Any, v as &dyn Any))
        .collect())
}

fn collect_entries<C, K, V>(items: Vec<(AnyBox, AnyBox)>) -> Result<AnyBox, ValueError>
where
    C: FromIterator<(K, V)> + Any,
    K: Any,
    V: Any,
{
    let collected = items
        .into_iter()
        .map(|(k, v)| -> Result<(K, V), ValueError> { Ok((unbox::<K>(k)?, unbox::<V>(v)?)) })
        .collect::<Result<C, ValueError>>()?;
    Ok(Box::new(collected))
}

impl<K: Mappable + Eq + Hash, V: Mappable> Mappable for HashMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::associative::<Self>(AssociativeDescriptor {
            kind: AssociativeKind::Hash,
            key: K::descriptor,
            value: V::descriptor,
            entries: map_entries::<Self, K, V>,
            build: collect_entries::<Self, K, V>,
        })
    }
}

impl<K: Mappable + Ord, V: Mappable> Mappable for BTreeMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::associative::<Self>(AssociativeDescriptor {
            kind: AssociativeKind::Ordered,
            key: K::descriptor,
            value: V::descriptor,
            entries: map_entries::<Self, K, V>,
            build: collect_entries::<Self, K, V>,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Shape, ShapeKind};

    fn sequence_of<T: Mappable>() -> SequenceDescriptor {
        match T::descriptor().shape() {
            Shape::Sequence(seq) => *seq,
            _ => panic!("{} is not a sequence", type_name::<T>()),
        }
    }

    fn boxed_ints(values: &[i32]) -> Vec<AnyBox> {
        values.iter().map(|v| Box::new(*v) as AnyBox).collect()
    }

    #[test]
    fn text_is_primitive_not_sequence() {
        assert_eq!(String::descriptor().shape_kind(), ShapeKind::Primitive);
        assert_eq!(Vec::<u8>::descriptor().shape_kind(), ShapeKind::Sequence);
    }

    #[test]
    fn set_build_deduplicates() {
        let seq = sequence_of::<HashSet<i32>>();
        assert_eq!(seq.kind, SequenceKind::Set);
        let built = (seq.build)(boxed_ints(&[1, 2, 2, 3])).unwrap();
        let set = unbox::<HashSet<i32>>(built).unwrap();
        assert_eq!(set, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn stack_enumerates_top_first() {
        let seq = sequence_of::<Stack<i32>>();
        let stack: Stack<i32> = [1, 2, 3].into_iter().collect();
        let elements = (seq.elements)(&stack).unwrap();
        let seen: Vec<i32> = elements
            .into_iter()
            .map(|e| *e.downcast_ref::<i32>().unwrap())
            .collect();
        assert_eq!(seen, vec![3, 2, 1]);
    }

    #[test]
    fn array_build_checks_length() {
        let seq = sequence_of::<[i32; 2]>();
        let ok = (seq.build)(boxed_ints(&[4, 5])).unwrap();
        assert_eq!(unbox::<[i32; 2]>(ok).unwrap(), [4, 5]);
        let err = (seq.build)(boxed_ints(&[4, 5, 6])).unwrap_err();
        assert_eq!(err.kind, crate::error::ValueErrorKind::Construct);
    }

    #[test]
    fn read_only_slice_has_empty_default() {
        let desc = Arc::<[i32]>::descriptor();
        let construct = desc.construct_fn().unwrap();
        let empty = unbox::<Arc<[i32]>>(construct().unwrap()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn option_wrapper_reports_absence() {
        let desc = Option::<String>::descriptor();
        let wrapper = desc.wrapper_descriptor().copied().unwrap();
        assert!((wrapper.get)(&None::<String>).unwrap().is_none());
        let some = Some("x".to_string());
        let inner = (wrapper.get)(&some).unwrap().unwrap();
        assert_eq!(inner.downcast_ref::<String>().unwrap(), "x");
        let wrapped = (wrapper.wrap)(Box::new("y".to_string())).unwrap();
        assert_eq!(unbox::<Option<String>>(wrapped).unwrap(), Some("y".to_string()));
    }

    #[test]
    fn core_strips_nested_wrappers() {
        let desc = Option::<Box<u32>>::descriptor();
        assert!(desc.core().is_same(&u32::descriptor()));
    }

    #[test]
    fn map_entries_round_trip_through_build() {
        let desc = BTreeMap::<String, i32>::descriptor();
        let Shape::Associative(assoc) = desc.shape() else {
            panic!("BTreeMap must be associative");
        };
        let source = BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
        let entries = (assoc.entries)(&source).unwrap();
        assert_eq!(entries.len(), 2);
        let rebuilt = entries
            .into_iter()
            .map(|(k, v)| {
                (
                    String::descriptor().clone_value(k).unwrap(),
                    i32::descriptor().clone_value(v).unwrap(),
                )
            })
            .collect();
        let map = unbox::<BTreeMap<String, i32>>((assoc.build)(rebuilt).unwrap()).unwrap();
        assert_eq!(map, source);
    }
}
