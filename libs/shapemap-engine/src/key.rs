use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::ser::SerializeStruct;

use shapemap_api::descriptor::{Mappable, TypeDescriptor};

/// Identity of a cache entry: the ordered (source, destination) type pair.
///
/// Equality and hashing use the two `TypeId`s only; names are carried for
/// logs and snapshots.
#[derive(Clone, Copy)]
pub struct TypePairKey {
    source: TypeId,
    target: TypeId,
    source_name: &'static str,
    target_name: &'static str,
}

impl TypePairKey {
    pub fn of<S: Mappable, D: Mappable>() -> Self {
        Self {
            source: TypeId::of::<S>(),
            target: TypeId::of::<D>(),
            source_name: std::any::type_name::<S>(),
            target_name: std::any::type_name::<D>(),
        }
    }

    pub fn new(source: &TypeDescriptor, target: &TypeDescriptor) -> Self {
        Self {
            source: source.type_id(),
            target: target.type_id(),
            source_name: source.name(),
            target_name: target.name(),
        }
    }

    pub fn source_id(&self) -> TypeId {
        self.source
    }

    pub fn target_id(&self) -> TypeId {
        self.target
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    pub fn target_name(&self) -> &'static str {
        self.target_name
    }
}

impl PartialEq for TypePairKey {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}

impl Eq for TypePairKey {}

impl Hash for TypePairKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
    }
}

impl fmt::Debug for TypePairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypePairKey")
            .field("source", &self.source_name)
            .field("target", &self.target_name)
            .finish()
    }
}

impl fmt::Display for TypePairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_name, self.target_name)
    }
}

impl serde::Serialize for TypePairKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TypePairKey", 2)?;
        state.serialize_field("source", self.source_name)?;
        state.serialize_field("target", self.target_name)?;
        state.end()
    }
}
