use std::any::Any;

use crate::descriptor::{Mappable, PrimitiveDescriptor, PrimitiveKind, TypeDescriptor};
use crate::error::ValueError;
use crate::value::{AnyBox, Scalar, downcast};

/// Primitive value with a scalar conversion path.
///
/// Principle: identical types are copied as-is, a conversion only runs when a
/// mapping pairs two different primitives (e.g. `i32` values into `String` values).
pub trait Primitive: Mappable + Default {
    const KIND: PrimitiveKind;

    fn to_scalar(&self) -> Scalar;

    fn from_scalar(scalar: Scalar) -> Result<Self, ValueError>;

    /// Descriptor for a primitive type. `Mappable::descriptor` of every
    /// primitive delegates here.
    fn primitive_descriptor() -> TypeDescriptor {
        TypeDescriptor::primitive::<Self>(PrimitiveDescriptor {
            kind: Self::KIND,
            to_scalar: erased_to_scalar::<Self>,
            from_scalar: erased_from_scalar::<Self>,
        })
    }
}

fn erased_to_scalar<T: Primitive>(value: &dyn Any) -> Result<Scalar, ValueError> {
    Ok(downcast::<T>(value)?.to_scalar())
}

fn erased_from_scalar<T: Primitive>(scalar: Scalar) -> Result<AnyBox, ValueError> {
    Ok(Box::new(T::from_scalar(scalar)?))
}

fn unsupported<T>(scalar: &Scalar) -> ValueError {
    ValueError::conversion(format!(
        "cannot convert {} '{scalar}' to {}",
        scalar.kind_name(),
        std::any::type_name::<T>()
    ))
}

fn out_of_range<T>(scalar: &Scalar) -> ValueError {
    ValueError::conversion(format!(
        "{} '{scalar}' is out of range for {}",
        scalar.kind_name(),
        std::any::type_name::<T>()
    ))
}

fn integer_from_scalar<T>(scalar: Scalar) -> Result<T, ValueError>
where
    T: TryFrom<i128> + std::str::FromStr,
{
    let wide = match &scalar {
        Scalar::Int(v) => *v,
        Scalar::Bool(v) => i128::from(*v),
        Scalar::Char(c) => i128::from(u32::from(*c)),
        // Float → integer only when nothing is lost.
        Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            if *f < i128::MIN as f64 || *f > i128::MAX as f64 {
                return Err(out_of_range::<T>(&scalar));
            }
            *f as i128
        }
        Scalar::Float(_) => return Err(unsupported::<T>(&scalar)),
        Scalar::Text(s) => return s.trim().parse::<T>().map_err(|_| unsupported::<T>(&scalar)),
    };
    T::try_from(wide).map_err(|_| out_of_range::<T>(&scalar))
}

macro_rules! impl_integer {
    ($kind:expr => $($ty:ty),*) => {$(
        impl Primitive for $ty {
            const KIND: PrimitiveKind = $kind;

            fn to_scalar(&self) -> Scalar {
                Scalar::Int(*self as i128)
            }

            fn from_scalar(scalar: Scalar) -> Result<Self, ValueError> {
                integer_from_scalar::<$ty>(scalar)
            }
        }

        impl Mappable for $ty {
            fn descriptor() -> TypeDescriptor {
                <$ty as Primitive>::primitive_descriptor()
            }
        }
    )*};
}

impl_integer!(PrimitiveKind::Signed => i8, i16, i32, i64, isize);
impl_integer!(PrimitiveKind::Unsigned => u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($ty:ty),*) => {$(
        impl Primitive for $ty {
            const KIND: PrimitiveKind = PrimitiveKind::Float;

            fn to_scalar(&self) -> Scalar {
                Scalar::Float(*self as f64)
            }

            fn from_scalar(scalar: Scalar) -> Result<Self, ValueError> {
                match scalar {
                    Scalar::Float(v) => Ok(v as $ty),
                    Scalar::Int(v) => Ok(v as $ty),
                    Scalar::Bool(v) => Ok(if v { 1.0 } else { 0.0 }),
                    Scalar::Text(ref s) => s
                        .trim()
                        .parse::<$ty>()
                        .map_err(|_| unsupported::<$ty>(&scalar)),
                    Scalar::Char(_) => Err(unsupported::<$ty>(&scalar)),
                }
            }
        }

        impl Mappable for $ty {
            fn descriptor() -> TypeDescriptor {
                <$ty as Primitive>::primitive_descriptor()
            }
        }
    )*};
}

impl_float!(f32, f64);

impl Primitive for bool {
    const KIND: PrimitiveKind = PrimitiveKind::Bool;

    fn to_scalar(&self) -> Scalar {
        Scalar::Bool(*self)
    }

    fn from_scalar(scalar: Scalar) -> Result<Self, ValueError> {
        match scalar {
            Scalar::Bool(v) => Ok(v),
            Scalar::Int(v) => Ok(v != 0),
            Scalar::Float(v) => Ok(v != 0.0),
            Scalar::Text(ref s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    Err(unsupported::<bool>(&scalar))
                }
            }
            Scalar::Char(_) => Err(unsupported::<bool>(&scalar)),
        }
    }
}

impl Mappable for bool {
    fn descriptor() -> TypeDescriptor {
        <bool as Primitive>::primitive_descriptor()
    }
}

impl Primitive for char {
    const KIND: PrimitiveKind = PrimitiveKind::Char;

    fn to_scalar(&self) -> Scalar {
        Scalar::Char(*self)
    }

    fn from_scalar(scalar: Scalar) -> Result<Self, ValueError> {
        match scalar {
            Scalar::Char(c) => Ok(c),
            Scalar::Int(v) => u32::try_from(v)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| out_of_range::<char>(&scalar)),
            Scalar::Text(ref s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(unsupported::<char>(&scalar)),
                }
            }
            Scalar::Bool(_) | Scalar::Float(_) => Err(unsupported::<char>(&scalar)),
        }
    }
}

impl Mappable for char {
    fn descriptor() -> TypeDescriptor {
        <char as Primitive>::primitive_descriptor()
    }
}

impl Primitive for String {
    const KIND: PrimitiveKind = PrimitiveKind::Text;

    fn to_scalar(&self) -> Scalar {
        Scalar::Text(self.clone())
    }

    fn from_scalar(scalar: Scalar) -> Result<Self, ValueError> {
        match scalar {
            Scalar::Text(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

impl Mappable for String {
    fn descriptor() -> TypeDescriptor {
        <String as Primitive>::primitive_descriptor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValueErrorKind;

    #[test]
    fn integers_render_as_text() {
        assert_eq!(String::from_scalar(1_i32.to_scalar()).unwrap(), "1");
        assert_eq!(String::from_scalar((-42_i64).to_scalar()).unwrap(), "-42");
        assert_eq!(String::from_scalar('x'.to_scalar()).unwrap(), "x");
    }

    #[test]
    fn text_parses_into_numbers() {
        assert_eq!(i32::from_scalar(Scalar::Text(" 17 ".into())).unwrap(), 17);
        assert_eq!(f64::from_scalar(Scalar::Text("2.5".into())).unwrap(), 2.5);
        let err = u8::from_scalar(Scalar::Text("abc".into())).unwrap_err();
        assert_eq!(err.kind, ValueErrorKind::Conversion);
    }

    #[test]
    fn integer_narrowing_is_range_checked() {
        assert_eq!(u8::from_scalar(Scalar::Int(255)).unwrap(), 255);
        let err = u8::from_scalar(Scalar::Int(256)).unwrap_err();
        assert!(err.message.contains("out of range"));
        assert!(u32::from_scalar(Scalar::Int(-1)).is_err());
    }

    #[test]
    fn float_to_integer_requires_integral_value() {
        assert_eq!(i64::from_scalar(Scalar::Float(3.0)).unwrap(), 3);
        assert!(i64::from_scalar(Scalar::Float(3.5)).is_err());
        assert!(i64::from_scalar(Scalar::Float(f64::NAN)).is_err());
    }

    #[test]
    fn bool_conversions() {
        assert!(bool::from_scalar(Scalar::Text("TRUE".into())).unwrap());
        assert!(!bool::from_scalar(Scalar::Int(0)).unwrap());
        assert_eq!(i32::from_scalar(true.to_scalar()).unwrap(), 1);
    }

    #[test]
    fn char_requires_single_character_text() {
        assert_eq!(char::from_scalar(Scalar::Text("z".into())).unwrap(), 'z');
        assert!(char::from_scalar(Scalar::Text("zz".into())).is_err());
        assert_eq!(char::from_scalar(Scalar::Int(65)).unwrap(), 'A');
        assert_eq!(u32::from_scalar('A'.to_scalar()).unwrap(), 65);
    }

    #[test]
    fn primitive_descriptor_round_trips_through_erased_fns() {
        let desc = <u16 as Mappable>::descriptor();
        let crate::descriptor::Shape::Primitive(p) = desc.shape() else {
            panic!("u16 must be primitive");
        };
        assert_eq!(p.kind, PrimitiveKind::Unsigned);
        let scalar = (p.to_scalar)(&7_u16).unwrap();
        let back = (p.from_scalar)(scalar).unwrap();
        assert_eq!(*back.downcast::<u16>().unwrap(), 7);
    }
}
