//! Little-endian reads of primitive values out of an instruction stream.
//!
//! CIL encodes every multi-byte operand (branch displacements, metadata tokens, immediate
//! constants) in little-endian order. [`CilIO`] abstracts over the primitive types the decoder
//! needs and [`read_le_at`] performs a bounds-checked read with cursor advance.

use crate::{Error::OutOfBounds, Result};

/// Trait for type-specific safe reading of primitive values from byte slices.
///
/// Each implementation names the fixed-size byte array it is decoded from, so the generic
/// readers can slice the input once and convert without intermediate copies.
pub trait CilIO: Sized {
    /// Byte array representation of the type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order from a data buffer at a
/// specific offset, advancing the offset past the value.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}
