pub mod containers;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod stack;
pub mod value;

pub use shapemap_api_derive::Mappable;

pub use converter::Primitive;
pub use descriptor::{
    FieldDescriptor, Mappable, Shape, ShapeKind, TypeDescriptor, construct_default,
};
pub use error::{ValueError, ValueErrorKind};
pub use stack::Stack;
pub use value::{AnyBox, Scalar};
