// SPDX-License-Identifier: CEPL-1.0
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use voxview_data::{DataFormat, Endian, ImportError, ScalarType};

use crate::config::DEFAULT_CONFIG;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Volume to open. Several CSV files are stacked as z-slices.
    pub inputs: Vec<PathBuf>,

    /// Input format; guessed from the extension when omitted
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Raw volume size as X,Y,Z
    #[arg(long, value_parser = parse_dims)]
    pub dims: Option<[u32; 3]>,

    /// Raw element type: int8..int64, uint8..uint64, float32, float64
    #[arg(long, default_value = "uint8")]
    pub scalar_type: ScalarType,

    /// Raw byte order: little | big
    #[arg(long, default_value = "little")]
    pub endian: Endian,

    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Nrrd,
    Raw,
    Csv,
}

fn parse_dims(s: &str) -> Result<[u32; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected X,Y,Z, got '{s}'"));
    };
    let mut dims = [0u32; 3];
    for (d, p) in dims.iter_mut().zip([x, y, z]) {
        *d = p
            .parse()
            .map_err(|e| format!("bad dimension '{p}': {e}"))?;
    }
    Ok(dims)
}

impl Args {
    /// Format for `path`, preferring the command line over the extension.
    pub fn format_for(&self, path: &Path) -> Result<DataFormat, ImportError> {
        match self.format {
            Some(FormatArg::Nrrd) => Ok(DataFormat::Nrrd),
            Some(FormatArg::Csv) => Ok(DataFormat::Csv),
            Some(FormatArg::Raw) => self.raw_format(),
            None if self.dims.is_some() => self.raw_format(),
            None => DataFormat::detect(path),
        }
    }

    fn raw_format(&self) -> Result<DataFormat, ImportError> {
        let dimensions = self.dims.ok_or_else(|| {
            ImportError::UnsupportedFormat("raw data needs --dims X,Y,Z".into())
        })?;
        Ok(DataFormat::Raw {
            dimensions,
            scalar_type: self.scalar_type,
            endian: self.endian,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("voxview").chain(cmd.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let a = args(&[]);
        assert!(a.inputs.is_empty());
        assert_eq!(a.config, PathBuf::from("voxview.toml"));
        assert_eq!(a.scalar_type, ScalarType::UInt8);
        assert_eq!(a.endian, Endian::Little);
    }

    #[test]
    fn raw_metadata_from_flags() {
        let a = args(&[
            "skull.raw",
            "--dims",
            "256, 256,113",
            "--scalar-type",
            "uint16",
            "--endian",
            "big",
        ]);
        assert_eq!(
            a.format_for(&a.inputs[0]).unwrap(),
            DataFormat::Raw {
                dimensions: [256, 256, 113],
                scalar_type: ScalarType::UInt16,
                endian: Endian::Big,
            }
        );
    }

    #[test]
    fn raw_without_dims_is_unsupported() {
        let a = args(&["vol.bin", "--format", "raw"]);
        assert!(matches!(
            a.format_for(&a.inputs[0]),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn extension_used_when_no_flag() {
        let a = args(&["head.nhdr", "s0.csv"]);
        assert_eq!(a.format_for(&a.inputs[0]).unwrap(), DataFormat::Nrrd);
        assert_eq!(a.format_for(&a.inputs[1]).unwrap(), DataFormat::Csv);
    }

    #[test]
    fn explicit_format_wins() {
        let a = args(&["data.txt", "--format", "csv"]);
        assert_eq!(a.format_for(&a.inputs[0]).unwrap(), DataFormat::Csv);
    }

    #[test]
    fn bad_dims_rejected() {
        assert!(parse_dims("1,2").is_err());
        assert!(parse_dims("1,2,x").is_err());
        assert_eq!(parse_dims("4,5,6").unwrap(), [4, 5, 6]);
        let r = Args::try_parse_from(["voxview", "--dims", "3,3"]);
        assert!(r.is_err());
    }
}
