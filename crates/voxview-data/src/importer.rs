// SPDX-License-Identifier: CEPL-1.0
use crate::{csv, nrrd, raw, DataFormat, Dataset, ImportError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Read one file in the given format.
pub fn import(path: &Path, format: &DataFormat) -> Result<Dataset, ImportError> {
    let dataset = match *format {
        DataFormat::Nrrd => nrrd::read(path)?,
        DataFormat::Raw {
            dimensions,
            scalar_type,
            endian,
        } => raw::read(path, dimensions, scalar_type, endian)?,
        DataFormat::Csv => csv::read(&[path.to_path_buf()])?,
    };
    log_import(&[path], format, &dataset);
    Ok(dataset)
}

/// Read a stack of CSV slices, one file per z layer, in the given order.
pub fn import_slices(paths: &[PathBuf]) -> Result<Dataset, ImportError> {
    let dataset = csv::read(paths)?;
    let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    log_import(&refs, &DataFormat::Csv, &dataset);
    Ok(dataset)
}

fn log_import(paths: &[&Path], format: &DataFormat, d: &Dataset) {
    let [x, y, z] = d.dimensions();
    let source = match paths {
        [one] => one.display().to_string(),
        many => format!("{} files", many.len()),
    };
    info!(
        "imported {} ({}): {}x{}x{}, density {}..{}",
        source,
        format.name(),
        x,
        y,
        z,
        d.min(),
        d.max()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endian, ScalarType};
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("voxview-import-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn raw_with_metadata() {
        let dir = scratch("raw");
        let path = dir.join("v.raw");
        let bytes: Vec<u8> = (0..8u16).flat_map(|v| v.to_le_bytes()).collect();
        fs::write(&path, bytes).unwrap();

        let fmt = DataFormat::Raw {
            dimensions: [2, 2, 2],
            scalar_type: ScalarType::UInt16,
            endian: Endian::Little,
        };
        let d = import(&path, &fmt).unwrap();
        assert_eq!(d.data(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_slices_in_order() {
        let dir = scratch("csv");
        let a = dir.join("z0.csv");
        let b = dir.join("z1.csv");
        fs::write(&a, "1,2\n").unwrap();
        fs::write(&b, "3,4\n").unwrap();

        let d = import_slices(&[a, b]).unwrap();
        assert_eq!(d.dimensions(), [2, 1, 2]);
        assert_eq!(d.data(), &[1.0, 2.0, 3.0, 4.0]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_reports_io() {
        let err = import(Path::new("/no/such/volume.nrrd"), &DataFormat::Nrrd).unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}
