//! Encoding and decoding for values stored in the tree.

use crate::error::{Result, TreeError};

/// Trait implemented by value types that can be stored in the tree.
///
/// Values are totally ordered through [`Ord`] and serialized through the
/// codec methods; the on-disk representation does not have to preserve
/// ordering because comparisons always happen on decoded values.
pub trait Datum: Ord + Clone {
    /// Encode `self` into `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode a value from its encoded representation.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Datum for i64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| TreeError::Corruption("i64 value length mismatch".into()))?;
        Ok(i64::from_be_bytes(arr))
    }
}

impl Datum for i32 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| TreeError::Corruption("i32 value length mismatch".into()))?;
        Ok(i32::from_be_bytes(arr))
    }
}

impl Datum for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| TreeError::Corruption("u64 value length mismatch".into()))?;
        Ok(u64::from_be_bytes(arr))
    }
}

impl Datum for String {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| TreeError::Corruption("string value is not valid UTF-8".into()))
    }
}

impl Datum for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}
