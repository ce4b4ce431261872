//! Element types understood by the engine.
//!
//! [`SortKey`] is sealed: it is implemented for the ten supported numeric types
//! plus `usize`, which the engine needs for permutation and segment-id
//! buffers. [`SortElement`] narrows that to the ten types a caller may hand
//! in, each tagged with its [`DType`].

use std::cmp::Ordering;
use std::fmt;

use crate::dispatch::SortArray;

/// Anything that may live in a backend buffer.
#[cfg(feature = "cuda")]
pub trait DeviceElement: gpu_sort_kernels::KernelElement {}
#[cfg(feature = "cuda")]
impl<T: gpu_sort_kernels::KernelElement> DeviceElement for T {}

/// Anything that may live in a backend buffer.
#[cfg(not(feature = "cuda"))]
pub trait DeviceElement: gpu_sort_kernels::CudaType {}
#[cfg(not(feature = "cuda"))]
impl<T: gpu_sort_kernels::CudaType> DeviceElement for T {}

mod sealed {
    pub trait Sealed {}
}

/// A type with the engine's ascending total order.
///
/// Integers use their natural order. Floats order NaN after every number and
/// treat all NaNs as equal, so a stable sort keeps NaNs in input order;
/// `-0.0` and `0.0` compare equal.
pub trait SortKey: DeviceElement + fmt::Debug + PartialOrd + sealed::Sealed {
    fn sort_cmp(&self, other: &Self) -> Ordering;
}

macro_rules! impl_int_key {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}
            impl SortKey for $ty {
                #[inline]
                fn sort_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

macro_rules! impl_float_key {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}
            impl SortKey for $ty {
                #[inline]
                fn sort_cmp(&self, other: &Self) -> Ordering {
                    match self.partial_cmp(other) {
                        Some(ord) => ord,
                        None => self.is_nan().cmp(&other.is_nan()),
                    }
                }
            }
        )*
    };
}

impl_int_key!(i8, i16, i32, i64, u8, u16, u32, u64, usize);
impl_float_key!(f32, f64);

/// Runtime tag for the supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Int8 => "i8",
            DType::Int16 => "i16",
            DType::Int32 => "i32",
            DType::Int64 => "i64",
            DType::UInt8 => "u8",
            DType::UInt16 => "u16",
            DType::UInt32 => "u32",
            DType::UInt64 => "u64",
            DType::Float32 => "f32",
            DType::Float64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A caller-visible element type.
pub trait SortElement: SortKey {
    const DTYPE: DType;

    /// Wrap a host vector in the matching [`SortArray`] variant.
    fn into_array(values: Vec<Self>) -> SortArray;

    /// Borrow the vector if `array` holds this element type.
    fn from_array(array: &SortArray) -> Option<&Vec<Self>>;

    /// Mutably borrow the vector if `array` holds this element type.
    fn from_array_mut(array: &mut SortArray) -> Option<&mut Vec<Self>>;
}

macro_rules! impl_sort_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl SortElement for $ty {
                const DTYPE: DType = DType::$variant;

                fn into_array(values: Vec<Self>) -> SortArray {
                    SortArray::$variant(values)
                }

                fn from_array(array: &SortArray) -> Option<&Vec<Self>> {
                    match array {
                        SortArray::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn from_array_mut(array: &mut SortArray) -> Option<&mut Vec<Self>> {
                    match array {
                        SortArray::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_sort_element! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_order_puts_nan_last() {
        let mut v = vec![f64::NAN, 1.0, -3.5, f64::INFINITY, 0.0];
        v.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(&v[..4], &[-3.5, 0.0, 1.0, f64::INFINITY]);
        assert!(v[4].is_nan());
    }

    #[test]
    fn nans_and_signed_zeros_tie() {
        assert_eq!(f32::NAN.sort_cmp(&f32::NAN), Ordering::Equal);
        assert_eq!((-0.0f32).sort_cmp(&0.0), Ordering::Equal);
        assert_eq!(f32::NEG_INFINITY.sort_cmp(&f32::NAN), Ordering::Less);
    }

    #[test]
    fn ints_use_natural_order() {
        assert_eq!((-1i8).sort_cmp(&1), Ordering::Less);
        assert_eq!(u64::MAX.sort_cmp(&0), Ordering::Greater);
        assert_eq!(7usize.sort_cmp(&7), Ordering::Equal);
    }

    #[test]
    fn dtype_metadata() {
        assert_eq!(<i16 as SortElement>::DTYPE, DType::Int16);
        assert_eq!(DType::UInt8.to_string(), "u8");
    }

    #[test]
    fn arrays_round_trip_through_element_trait() {
        let mut array = u32::into_array(vec![3, 1, 2]);
        assert_eq!(array.dtype(), DType::UInt32);
        assert!(i32::from_array(&array).is_none());
        u32::from_array_mut(&mut array).unwrap().push(9);
        assert_eq!(u32::from_array(&array).unwrap(), &vec![3, 1, 2, 9]);
    }
}
