// SPDX-License-Identifier: CEPL-1.0
use crate::ImportError;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// On-disk element type. Everything is widened to f32 on import.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
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

impl ScalarType {
    pub fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Int8 => "int8",
            ScalarType::Int16 => "int16",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt8 => "uint8",
            ScalarType::UInt16 => "uint16",
            ScalarType::UInt32 => "uint32",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
        }
    }

    /// Every spelling NRRD allows for the `type` field.
    pub fn from_nrrd(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        let t = match s.as_str() {
            "signed char" | "int8" | "int8_t" => ScalarType::Int8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::UInt8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ScalarType::Int16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ScalarType::UInt16
            }
            "int" | "signed int" | "int32" | "int32_t" => ScalarType::Int32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarType::UInt32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => ScalarType::Int64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => ScalarType::UInt64,
            "float" => ScalarType::Float32,
            "double" => ScalarType::Float64,
            _ => return None,
        };
        Some(t)
    }
}

impl FromStr for ScalarType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = match s.trim().to_ascii_lowercase().as_str() {
            "int8" | "i8" => ScalarType::Int8,
            "int16" | "i16" => ScalarType::Int16,
            "int32" | "i32" => ScalarType::Int32,
            "int64" | "i64" => ScalarType::Int64,
            "uint8" | "u8" => ScalarType::UInt8,
            "uint16" | "u16" => ScalarType::UInt16,
            "uint32" | "u32" => ScalarType::UInt32,
            "uint64" | "u64" => ScalarType::UInt64,
            "float32" | "f32" | "float" => ScalarType::Float32,
            "float64" | "f64" | "double" => ScalarType::Float64,
            other => return Err(format!("unknown scalar type '{other}'")),
        };
        Ok(t)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl FromStr for Endian {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(Endian::Little),
            "big" | "be" => Ok(Endian::Big),
            other => Err(format!("unknown endianness '{other}'")),
        }
    }
}

/// Closed set of importable formats. Raw data carries its own metadata since
/// the file has none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    Nrrd,
    Raw {
        dimensions: [u32; 3],
        scalar_type: ScalarType,
        endian: Endian,
    },
    Csv,
}

impl DataFormat {
    /// Guess the format from the file extension. Raw files cannot be
    /// detected because their layout lives outside the file.
    pub fn detect(path: &Path) -> Result<Self, ImportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                ImportError::UnsupportedFormat(format!(
                    "cannot determine format of {}",
                    path.display()
                ))
            })?;
        match ext.as_str() {
            "nrrd" | "nhdr" => Ok(DataFormat::Nrrd),
            "csv" => Ok(DataFormat::Csv),
            "raw" => Err(ImportError::UnsupportedFormat(
                "raw data needs explicit dimensions and scalar type".into(),
            )),
            other => Err(ImportError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataFormat::Nrrd => "nrrd",
            DataFormat::Raw { .. } => "raw",
            DataFormat::Csv => "csv",
        }
    }
}
