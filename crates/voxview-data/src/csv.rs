// SPDX-License-Identifier: CEPL-1.0
//! Comma-separated 2D slices. Each file is one z layer; rows are y and
//! columns are x.

use crate::{Dataset, ImportError};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

pub fn parse_slice(text: &str) -> Result<Slice, ImportError> {
    let mut width = None;
    let mut height = 0u32;
    let mut values = Vec::new();

    for (row, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let before = values.len();
        for cell in line.split(',') {
            let cell = cell.trim();
            let v = cell.parse::<f32>().map_err(|_| {
                ImportError::malformed("csv value", format!("'{cell}' on line {}", row + 1))
            })?;
            values.push(v);
        }
        let cols = (values.len() - before) as u32;
        match width {
            None => width = Some(cols),
            Some(w) if w != cols => {
                return Err(ImportError::InconsistentDimensions {
                    context: format!("csv row {}", row + 1),
                    expected: w as usize,
                    actual: cols as usize,
                })
            }
            Some(_) => {}
        }
        height += 1;
    }

    let width = width.ok_or_else(|| ImportError::malformed("csv slice", "no rows"))?;
    Ok(Slice {
        width,
        height,
        values,
    })
}

/// Stack several slices into one volume. All slices must agree on width and
/// height.
pub fn stack(slices: Vec<Slice>) -> Result<Dataset, ImportError> {
    let first = slices
        .first()
        .ok_or_else(|| ImportError::malformed("csv stack", "no slices"))?;
    let (width, height) = (first.width, first.height);
    let depth = slices.len() as u32;

    let mut data = Vec::with_capacity(width as usize * height as usize * slices.len());
    for (z, s) in slices.into_iter().enumerate() {
        if s.width != width {
            return Err(ImportError::InconsistentDimensions {
                context: format!("csv slice {z} width"),
                expected: width as usize,
                actual: s.width as usize,
            });
        }
        if s.height != height {
            return Err(ImportError::InconsistentDimensions {
                context: format!("csv slice {z} height"),
                expected: height as usize,
                actual: s.height as usize,
            });
        }
        data.extend(s.values);
    }
    Dataset::new([width, height, depth], data)
}

pub fn read_slice(path: &Path) -> Result<Slice, ImportError> {
    let text = fs::read_to_string(path).map_err(|e| ImportError::io(path, e))?;
    parse_slice(&text)
}

pub fn read(paths: &[PathBuf]) -> Result<Dataset, ImportError> {
    let slices = paths
        .iter()
        .map(|p| read_slice(p))
        .collect::<Result<Vec<_>, _>>()?;
    stack(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_columns() {
        let s = parse_slice("1, 2, 3\n4,5,6\n\n").unwrap();
        assert_eq!((s.width, s.height), (3, 2));
        assert_eq!(s.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn ragged_row_is_inconsistent() {
        let err = parse_slice("1,2,3\n4,5\n").unwrap_err();
        assert!(matches!(
            err,
            ImportError::InconsistentDimensions {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn bad_number_is_malformed() {
        assert!(matches!(
            parse_slice("1,x\n").unwrap_err(),
            ImportError::Malformed { .. }
        ));
    }

    #[test]
    fn stacks_slices_along_z() {
        let a = parse_slice("0,1\n2,3").unwrap();
        let b = parse_slice("4,5\n6,7").unwrap();
        let d = stack(vec![a, b]).unwrap();
        assert_eq!(d.dimensions(), [2, 2, 2]);
        assert_eq!(d.get(1, 1, 1), Some(7.0));
        assert_eq!(d.get(0, 1, 0), Some(2.0));
    }

    #[test]
    fn mismatched_slice_heights_fail() {
        let a = parse_slice("0,1\n2,3").unwrap();
        let b = parse_slice("4,5").unwrap();
        assert!(matches!(
            stack(vec![a, b]).unwrap_err(),
            ImportError::InconsistentDimensions { .. }
        ));
    }
}
