// SPDX-License-Identifier: CEPL-1.0
//! Headerless scalar arrays.

use crate::dataset::voxel_count;
use crate::{Dataset, Endian, ImportError, ScalarType};
use std::fs;
use std::path::Path;

macro_rules! widen {
    ($bytes:expr, $t:ty, $endian:expr) => {{
        const N: usize = std::mem::size_of::<$t>();
        let endian = $endian;
        $bytes
            .chunks_exact(N)
            .map(|c| {
                let mut buf = [0u8; N];
                buf.copy_from_slice(c);
                let v = match endian {
                    Endian::Little => <$t>::from_le_bytes(buf),
                    Endian::Big => <$t>::from_be_bytes(buf),
                };
                v as f32
            })
            .collect::<Vec<f32>>()
    }};
}

/// Widen a packed element stream to f32.
pub fn decode(bytes: &[u8], scalar: ScalarType, endian: Endian) -> Result<Vec<f32>, ImportError> {
    if bytes.len() % scalar.size() != 0 {
        return Err(ImportError::malformed(
            "raw data",
            format!(
                "{} bytes is not a multiple of the {} element size",
                bytes.len(),
                scalar.name()
            ),
        ));
    }
    let out = match scalar {
        ScalarType::Int8 => widen!(bytes, i8, endian),
        ScalarType::Int16 => widen!(bytes, i16, endian),
        ScalarType::Int32 => widen!(bytes, i32, endian),
        ScalarType::Int64 => widen!(bytes, i64, endian),
        ScalarType::UInt8 => widen!(bytes, u8, endian),
        ScalarType::UInt16 => widen!(bytes, u16, endian),
        ScalarType::UInt32 => widen!(bytes, u32, endian),
        ScalarType::UInt64 => widen!(bytes, u64, endian),
        ScalarType::Float32 => widen!(bytes, f32, endian),
        ScalarType::Float64 => widen!(bytes, f64, endian),
    };
    Ok(out)
}

/// Build a dataset from an in-memory raw array, checking its size against
/// the declared dimensions.
pub fn parse(
    bytes: &[u8],
    dimensions: [u32; 3],
    scalar: ScalarType,
    endian: Endian,
) -> Result<Dataset, ImportError> {
    let voxels = voxel_count(dimensions)?;
    let expected = voxels.checked_mul(scalar.size()).ok_or_else(|| {
        ImportError::malformed("raw data", format!("dimensions {dimensions:?} overflow"))
    })?;
    if bytes.len() != expected {
        return Err(ImportError::InconsistentDimensions {
            context: format!(
                "raw {} volume {}x{}x{} (bytes)",
                scalar.name(),
                dimensions[0],
                dimensions[1],
                dimensions[2]
            ),
            expected,
            actual: bytes.len(),
        });
    }
    Dataset::new(dimensions, decode(bytes, scalar, endian)?)
}

pub fn read(
    path: &Path,
    dimensions: [u32; 3],
    scalar: ScalarType,
    endian: Endian,
) -> Result<Dataset, ImportError> {
    let bytes = fs::read(path).map_err(|e| ImportError::io(path, e))?;
    parse(&bytes, dimensions, scalar, endian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn widens_signed_bytes() {
        let v = decode(&[0x80, 0xff, 0x01], ScalarType::Int8, Endian::Little).unwrap();
        assert_eq!(v, vec![-128.0, -1.0, 1.0]);
    }

    #[test]
    fn honours_endianness() {
        let le = decode(&[0x01, 0x02], ScalarType::UInt16, Endian::Little).unwrap();
        let be = decode(&[0x01, 0x02], ScalarType::UInt16, Endian::Big).unwrap();
        assert_eq!(le, vec![513.0]);
        assert_eq!(be, vec![258.0]);
    }

    #[test]
    fn narrows_doubles() {
        let bytes = 0.1f64.to_le_bytes();
        let v = decode(&bytes, ScalarType::Float64, Endian::Little).unwrap();
        assert_relative_eq!(v[0], 0.1f32);
    }

    #[test]
    fn rejects_ragged_tail() {
        assert!(decode(&[0, 0, 0], ScalarType::UInt16, Endian::Little).is_err());
    }

    #[test]
    fn declared_size_must_match() {
        let bytes = [0u8; 7];
        let err = parse(&bytes, [2, 2, 2], ScalarType::UInt8, Endian::Little).unwrap_err();
        assert!(matches!(
            err,
            ImportError::InconsistentDimensions {
                expected: 8,
                actual: 7,
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_io_failure() {
        let err = read(
            Path::new("/definitely/not/here.raw"),
            [1, 1, 1],
            ScalarType::UInt8,
            Endian::Little,
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }

    proptest! {
        #[test]
        fn int32_values_survive(values in proptest::collection::vec(-1_000_000i32..1_000_000, 1..64)) {
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
            let out = decode(&bytes, ScalarType::Int32, Endian::Big).unwrap();
            let want: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            prop_assert_eq!(out, want);
        }
    }
}
