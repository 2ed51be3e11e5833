//! `Encode` and `Decode` implementations for primitives and std containers.
//!
//! All integers are little-endian fixed width. Sequences carry a `u32`
//! element count. Strings carry a `u32` byte length (including the NUL
//! terminator) followed by the bytes and exactly one trailing NUL; a string
//! that runs to the end of its declared length without a terminator fails to
//! decode.

use std::io::Write;

use anyhow::{bail, ensure};

use crate::{Bounded, Decode, Encode};

/// The byte bound applied to strings without an explicit [`Bounded`] wrapper.
const DEFAULT_MAX_STRING_SIZE: usize = 4096;

// ==== Primitives ==== //

impl Encode for bool {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_all(&[u8::from(*self)])?)
    }

    fn encode_slice(slice: &[bool], mut w: impl Write) -> anyhow::Result<()> {
        // SAFETY: bool has the same layout as u8.
        let bytes: &[u8] = unsafe { std::mem::transmute(slice) };
        Ok(w.write_all(bytes)?)
    }
}

impl Decode<'_> for bool {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        let n = u8::decode(r)?;
        ensure!(n <= 1, "decoded boolean is not 0 or 1 (got {n})");
        Ok(n == 1)
    }
}

macro_rules! impl_int {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
                Ok(w.write_all(&self.to_le_bytes())?)
            }
        }

        impl Decode<'_> for $ty {
            fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
                const N: usize = std::mem::size_of::<$ty>();

                ensure!(
                    r.len() >= N,
                    concat!("not enough data to decode `", stringify!($ty), "`")
                );

                let (bytes, rest) = r.split_at(N);
                *r = rest;
                Ok(<$ty>::from_le_bytes(bytes.try_into().unwrap()))
            }
        }
    };
}

impl_int!(u16);
impl_int!(i16);
impl_int!(u32);
impl_int!(i32);
impl_int!(u64);
impl_int!(i64);

impl Encode for u8 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_all(&[*self])?)
    }

    fn encode_slice(slice: &[u8], mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_all(slice)?)
    }
}

impl Decode<'_> for u8 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        ensure!(!r.is_empty(), "not enough data to decode `u8`");

        let (byte, rest) = r.split_at(1);
        *r = rest;
        Ok(byte[0])
    }
}

impl Encode for i8 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_all(&[*self as u8])?)
    }
}

impl Decode<'_> for i8 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(u8::decode(r)? as i8)
    }
}

impl Encode for f32 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_all(&self.to_le_bytes())?)
    }
}

impl Decode<'_> for f32 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(f32::from_bits(u32::decode(r)?))
    }
}

impl Encode for f64 {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        Ok(w.write_all(&self.to_le_bytes())?)
    }
}

impl Decode<'_> for f64 {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(f64::from_bits(u64::decode(r)?))
    }
}

// ==== References ==== //

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        (**self).encode(w)
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.as_ref().encode(w)
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Box<T> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        T::decode(r).map(Box::new)
    }
}

// ==== Option ==== //

/// `Option<T>` is a `u8` presence flag followed by the payload if present.
impl<T: Encode> Encode for Option<T> {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        match self {
            Some(t) => {
                true.encode(&mut w)?;
                t.encode(w)
            }
            None => false.encode(w),
        }
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Option<T> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(if bool::decode(r)? {
            Some(T::decode(r)?)
        } else {
            None
        })
    }
}

// ==== Fixed-length arrays ==== //

/// Fixed-length arrays are encoded and decoded without a length prefix.
impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        T::encode_slice(self, w)
    }
}

impl<'a, T: Decode<'a>, const N: usize> Decode<'a> for [T; N] {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let mut elems = Vec::with_capacity(N);

        for _ in 0..N {
            elems.push(T::decode(r)?);
        }

        elems
            .try_into()
            .map_err(|_| unreachable!("exactly N elements were decoded"))
    }
}

// ==== Sequences ==== //

impl<T: Encode> Encode for [T] {
    fn encode(&self, mut w: impl Write) -> anyhow::Result<()> {
        let len = self.len();
        ensure!(
            u32::try_from(len).is_ok(),
            "length of {} slice exceeds u32::MAX (got {len})",
            std::any::type_name::<T>()
        );

        (len as u32).encode(&mut w)?;

        T::encode_slice(self, w)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.as_slice().encode(w)
    }
}

impl<'a, T: Decode<'a>> Decode<'a> for Vec<T> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let len = u32::decode(r)? as usize;

        // Avoid allocating huge buffers for hostile length prefixes. Each
        // element is at least one byte on the wire.
        ensure!(
            len <= r.len(),
            "sequence length of {len} exceeds remaining data ({} bytes)",
            r.len()
        );

        let mut vec = Vec::with_capacity(len.min(4096));

        for _ in 0..len {
            vec.push(T::decode(r)?);
        }

        Ok(vec)
    }
}

impl<T: Encode, const MAX: usize> Encode for Bounded<Vec<T>, MAX> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        let len = self.0.len();
        ensure!(
            len <= MAX,
            "sequence length exceeds maximum (expected <= {MAX}, got {len})"
        );

        self.0.encode(w)
    }
}

impl<'a, T: Decode<'a>, const MAX: usize> Decode<'a> for Bounded<Vec<T>, MAX> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        let mut peek = *r;
        let len = u32::decode(&mut peek)? as usize;

        ensure!(
            len <= MAX,
            "sequence length exceeds maximum (expected <= {MAX}, got {len})"
        );

        Ok(Bounded(Vec::decode(r)?))
    }
}

// ==== Strings ==== //

fn encode_str(s: &str, max: usize, mut w: impl Write) -> anyhow::Result<()> {
    let len = s.len() + 1;

    ensure!(
        len <= max,
        "string length exceeds maximum (expected <= {max} bytes with terminator, got {len})"
    );
    ensure!(
        !s.as_bytes().contains(&0),
        "string contains an interior NUL byte"
    );

    (len as u32).encode(&mut w)?;
    w.write_all(s.as_bytes())?;
    Ok(w.write_all(&[0])?)
}

fn decode_str<'a>(r: &mut &'a [u8], max: usize) -> anyhow::Result<&'a str> {
    let len = u32::decode(r)? as usize;

    ensure!(len >= 1, "string is missing its NUL terminator");
    ensure!(
        len <= max,
        "string length exceeds maximum (expected <= {max} bytes, got {len})"
    );
    ensure!(
        len <= r.len(),
        "not enough data remaining to decode string of {len} bytes"
    );

    let (bytes, rest) = r.split_at(len);

    // The declared length must cover the content plus exactly one trailing
    // NUL. A string that runs to the end without a terminator, or that hides
    // one early, is a protocol violation.
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) if pos == len - 1 => {}
        Some(_) => bail!("string contains an interior NUL byte"),
        None => bail!("string is not NUL-terminated within its declared length"),
    }

    let s = std::str::from_utf8(&bytes[..len - 1])?;
    *r = rest;
    Ok(s)
}

impl Encode for str {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        encode_str(self, DEFAULT_MAX_STRING_SIZE, w)
    }
}

impl<'a> Decode<'a> for &'a str {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        decode_str(r, DEFAULT_MAX_STRING_SIZE)
    }
}

impl Encode for String {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        self.as_str().encode(w)
    }
}

impl Decode<'_> for String {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(<&str>::decode(r)?.into())
    }
}

impl<const MAX: usize> Encode for Bounded<&'_ str, MAX> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        encode_str(self.0, MAX, w)
    }
}

impl<'a, const MAX: usize> Decode<'a> for Bounded<&'a str, MAX> {
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self> {
        Ok(Bounded(decode_str(r, MAX)?))
    }
}

impl<const MAX: usize> Encode for Bounded<String, MAX> {
    fn encode(&self, w: impl Write) -> anyhow::Result<()> {
        encode_str(self.0.as_str(), MAX, w)
    }
}

impl<const MAX: usize> Decode<'_> for Bounded<String, MAX> {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Bounded(decode_str(r, MAX)?.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T>(value: T)
    where
        T: Encode + for<'a> Decode<'a> + PartialEq + std::fmt::Debug,
    {
        let mut buf = vec![];
        value.encode(&mut buf).unwrap();

        let mut r = &buf[..];
        let decoded = T::decode(&mut r).unwrap();

        assert_eq!(value, decoded);
        assert!(r.is_empty(), "{} bytes left over", r.len());
    }

    #[test]
    fn primitives_round_trip() {
        round_trip(true);
        round_trip(0xAAu8);
        round_trip(-5i8);
        round_trip(0xBEEFu16);
        round_trip(-12345i16);
        round_trip(0xDEADBEEFu32);
        round_trip(i32::MIN);
        round_trip(u64::MAX);
        round_trip(1.5f32);
        round_trip(-0.25f64);
    }

    #[test]
    fn integers_are_little_endian() {
        let mut buf = vec![];
        0x11223344u32.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn containers_round_trip() {
        round_trip(Some(7u32));
        round_trip(Option::<u32>::None);
        round_trip([1u16, 2, 3]);
        round_trip(vec![10u32, 20, 30]);
        round_trip(String::from("imp"));
        round_trip(Bounded::<String, 16>(String::from("cacodemon")));
    }

    #[test]
    fn string_wire_format() {
        let mut buf = vec![];
        "abc".encode(&mut buf).unwrap();

        // u32 length (content + NUL), bytes, NUL.
        assert_eq!(buf, [4, 0, 0, 0, b'a', b'b', b'c', 0]);
    }

    #[test]
    fn string_missing_terminator_rejected() {
        // Length claims 3 bytes but none of them is a NUL.
        let buf = [3u8, 0, 0, 0, b'a', b'b', b'c'];
        let mut r = &buf[..];
        assert!(<&str>::decode(&mut r).is_err());
    }

    #[test]
    fn string_interior_nul_rejected() {
        let buf = [4u8, 0, 0, 0, b'a', 0, b'c', 0];
        let mut r = &buf[..];
        assert!(<&str>::decode(&mut r).is_err());
    }

    #[test]
    fn bounded_string_limit_enforced() {
        let mut buf = vec![];
        assert!(Bounded::<&str, 4>("abcd").encode(&mut buf).is_err());

        let mut buf = vec![];
        Bounded::<&str, 8>("abcd").encode(&mut buf).unwrap();

        let mut r = &buf[..];
        assert!(Bounded::<&str, 4>::decode(&mut r).is_err());
    }

    #[test]
    fn hostile_sequence_length_rejected() {
        let buf = [0xFFu8, 0xFF, 0xFF, 0xFF, 1, 2, 3];
        let mut r = &buf[..];
        assert!(Vec::<u8>::decode(&mut r).is_err());
    }
}
