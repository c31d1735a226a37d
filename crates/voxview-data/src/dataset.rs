// SPDX-License-Identifier: CEPL-1.0
use crate::ImportError;

/// A scalar 3D grid, x fastest. Density bounds are computed once at
/// construction and feed normalisation on the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    dimensions: [u32; 3],
    data: Vec<f32>,
    min: f32,
    max: f32,
}

impl Dataset {
    pub fn new(dimensions: [u32; 3], data: Vec<f32>) -> Result<Self, ImportError> {
        let expected = voxel_count(dimensions)?;
        if expected == 0 {
            return Err(ImportError::malformed(
                "dataset",
                format!("zero-sized dimensions {dimensions:?}"),
            ));
        }
        if data.len() != expected {
            return Err(ImportError::InconsistentDimensions {
                context: format!("dataset {}x{}x{}", dimensions[0], dimensions[1], dimensions[2]),
                expected,
                actual: data.len(),
            });
        }

        let (min, max) = data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let (min, max) = if min > max { (0.0, 0.0) } else { (min, max) };

        Ok(Self {
            dimensions,
            data,
            min,
            max,
        })
    }

    /// 1x1x1 zero volume bound before anything is imported.
    pub fn placeholder() -> Self {
        Self {
            dimensions: [1, 1, 1],
            data: vec![0.0],
            min: 0.0,
            max: 1.0,
        }
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat offset of voxel (i, j, k).
    #[inline]
    pub fn index(&self, i: u32, j: u32, k: u32) -> usize {
        let [x, y, _] = self.dimensions;
        k as usize * x as usize * y as usize + j as usize * x as usize + i as usize
    }

    pub fn get(&self, i: u32, j: u32, k: u32) -> Option<f32> {
        let [x, y, z] = self.dimensions;
        if i >= x || j >= y || k >= z {
            return None;
        }
        self.data.get(self.index(i, j, k)).copied()
    }
}

pub(crate) fn voxel_count(dimensions: [u32; 3]) -> Result<usize, ImportError> {
    dimensions
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
        .ok_or_else(|| {
            ImportError::malformed("dataset", format!("dimensions {dimensions:?} overflow"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn computes_bounds() {
        let d = Dataset::new([2, 2, 2], (0..8).map(|v| v as f32).collect()).unwrap();
        assert_eq!(d.min(), 0.0);
        assert_eq!(d.max(), 7.0);
        assert_eq!(d.dimensions(), [2, 2, 2]);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Dataset::new([2, 2, 2], vec![0.0; 7]).unwrap_err();
        match err {
            ImportError::InconsistentDimensions {
                expected, actual, ..
            } => {
                assert_eq!(expected, 8);
                assert_eq!(actual, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_dimension() {
        assert!(Dataset::new([0, 4, 4], vec![]).is_err());
    }

    #[test]
    fn bounds_skip_non_finite() {
        let d = Dataset::new([3, 1, 1], vec![f32::NAN, -2.0, 5.0]).unwrap();
        assert_eq!((d.min(), d.max()), (-2.0, 5.0));
    }

    #[test]
    fn placeholder_is_unit_volume() {
        let p = Dataset::placeholder();
        assert_eq!(p.dimensions(), [1, 1, 1]);
        assert_eq!(p.data(), &[0.0]);
        assert_eq!((p.min(), p.max()), (0.0, 1.0));
    }

    #[test]
    fn out_of_range_lookup_is_none() {
        let d = Dataset::new([2, 1, 1], vec![1.0, 2.0]).unwrap();
        assert_eq!(d.get(1, 0, 0), Some(2.0));
        assert_eq!(d.get(2, 0, 0), None);
    }

    proptest! {
        #[test]
        fn index_is_x_fastest(x in 1u32..6, y in 1u32..6, z in 1u32..6) {
            let n = (x * y * z) as usize;
            let d = Dataset::new([x, y, z], (0..n).map(|v| v as f32).collect()).unwrap();
            for k in 0..z {
                for j in 0..y {
                    for i in 0..x {
                        let flat = (k * x * y + j * x + i) as usize;
                        prop_assert_eq!(d.index(i, j, k), flat);
                        prop_assert_eq!(d.get(i, j, k), Some(flat as f32));
                    }
                }
            }
        }
    }
}
