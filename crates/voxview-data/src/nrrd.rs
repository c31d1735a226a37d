// SPDX-License-Identifier: CEPL-1.0
//! NRRD reader: attached (`.nrrd`) and detached (`.nhdr`) headers with raw
//! or ascii encoding. Only three-dimensional scalar volumes are accepted.

use crate::dataset::voxel_count;
use crate::{raw, Dataset, Endian, ImportError, ScalarType};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Ascii,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub scalar_type: ScalarType,
    pub dimensions: [u32; 3],
    pub endian: Endian,
    pub encoding: Encoding,
    /// `-1` means "the data is the last N bytes of the file".
    pub byte_skip: i64,
    pub line_skip: usize,
    pub data_file: Option<PathBuf>,
}

/// Split the header from an attached payload. Returns the header text and
/// the byte offset where data begins (end of input for detached headers).
fn split_header(bytes: &[u8]) -> Result<(&str, usize), ImportError> {
    if !bytes.starts_with(b"NRRD000") {
        return Err(ImportError::malformed("nrrd header", "missing NRRD magic"));
    }
    let mut end = bytes.len();
    let mut data_start = bytes.len();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\n' {
            if bytes[i + 1] == b'\n' {
                end = i;
                data_start = i + 2;
                break;
            }
            if bytes[i + 1] == b'\r' && bytes.get(i + 2) == Some(&b'\n') {
                end = i;
                data_start = i + 3;
                break;
            }
        }
        i += 1;
    }
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|e| ImportError::malformed("nrrd header", e.to_string()))?;
    Ok((text, data_start))
}

pub fn parse_header(text: &str) -> Result<Header, ImportError> {
    let mut scalar_type = None;
    let mut dimension = None;
    let mut sizes = None;
    let mut endian = None;
    let mut encoding = Encoding::Raw;
    let mut byte_skip = 0i64;
    let mut line_skip = 0usize;
    let mut data_file = None;

    for line in text.lines().skip(1) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // key:=value pairs carry no layout information
        if line.contains(":=") {
            continue;
        }
        let Some((field, value)) = line.split_once(": ") else {
            return Err(ImportError::malformed(
                "nrrd header",
                format!("unrecognised line '{line}'"),
            ));
        };
        let value = value.trim();
        match field.trim().to_ascii_lowercase().as_str() {
            "type" => {
                scalar_type = Some(ScalarType::from_nrrd(value).ok_or_else(|| {
                    ImportError::UnsupportedFormat(format!("nrrd type '{value}'"))
                })?)
            }
            "dimension" => dimension = Some(parse_num::<u32>("dimension", value)?),
            "sizes" => {
                sizes = Some(
                    value
                        .split_whitespace()
                        .map(|s| parse_num::<u32>("sizes", s))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
            "endian" => {
                endian = Some(match value.to_ascii_lowercase().as_str() {
                    "little" => Endian::Little,
                    "big" => Endian::Big,
                    other => {
                        return Err(ImportError::malformed(
                            "nrrd header",
                            format!("endian '{other}'"),
                        ))
                    }
                })
            }
            "encoding" => {
                encoding = match value.to_ascii_lowercase().as_str() {
                    "raw" => Encoding::Raw,
                    "ascii" | "text" | "txt" => Encoding::Ascii,
                    other => {
                        return Err(ImportError::UnsupportedFormat(format!(
                            "nrrd encoding '{other}'"
                        )))
                    }
                }
            }
            "byte skip" | "byteskip" => byte_skip = parse_num::<i64>("byte skip", value)?,
            "line skip" | "lineskip" => line_skip = parse_num::<usize>("line skip", value)?,
            "data file" | "datafile" => {
                if value.starts_with("LIST") || value.split_whitespace().count() > 1 {
                    return Err(ImportError::UnsupportedFormat(
                        "nrrd multi-file data".into(),
                    ));
                }
                data_file = Some(PathBuf::from(value));
            }
            _ => {}
        }
    }

    let scalar_type =
        scalar_type.ok_or_else(|| ImportError::malformed("nrrd header", "missing 'type'"))?;
    let dimension =
        dimension.ok_or_else(|| ImportError::malformed("nrrd header", "missing 'dimension'"))?;
    if dimension != 3 {
        return Err(ImportError::UnsupportedFormat(format!(
            "{dimension}-dimensional nrrd (only 3 supported)"
        )));
    }
    let sizes = sizes.ok_or_else(|| ImportError::malformed("nrrd header", "missing 'sizes'"))?;
    if sizes.len() != 3 {
        return Err(ImportError::InconsistentDimensions {
            context: "nrrd sizes".into(),
            expected: 3,
            actual: sizes.len(),
        });
    }
    if byte_skip < -1 {
        return Err(ImportError::malformed(
            "nrrd header",
            format!("byte skip {byte_skip}"),
        ));
    }
    if byte_skip == -1 && encoding != Encoding::Raw {
        return Err(ImportError::malformed(
            "nrrd header",
            "byte skip -1 requires raw encoding",
        ));
    }
    if endian.is_none() && encoding == Encoding::Raw && scalar_type.size() > 1 {
        tracing::warn!("nrrd header has no 'endian' field, assuming little");
    }

    Ok(Header {
        scalar_type,
        dimensions: [sizes[0], sizes[1], sizes[2]],
        endian: endian.unwrap_or_default(),
        encoding,
        byte_skip,
        line_skip,
        data_file,
    })
}

fn parse_num<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ImportError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ImportError::malformed("nrrd header", format!("{field} '{value}'")))
}

/// Decode the payload described by `header`.
pub fn decode_payload(header: &Header, payload: &[u8]) -> Result<Dataset, ImportError> {
    let voxels = voxel_count(header.dimensions)?;

    let mut payload = payload;
    for _ in 0..header.line_skip {
        match payload.iter().position(|&b| b == b'\n') {
            Some(nl) => payload = &payload[nl + 1..],
            None => payload = &[],
        }
    }

    match header.encoding {
        Encoding::Raw => {
            let want = voxels.checked_mul(header.scalar_type.size()).ok_or_else(|| {
                ImportError::malformed(
                    "nrrd header",
                    format!("sizes {:?} overflow", header.dimensions),
                )
            })?;
            let body = if header.byte_skip == -1 {
                payload
                    .len()
                    .checked_sub(want)
                    .map(|start| &payload[start..])
            } else {
                let skip = header.byte_skip as usize;
                payload.get(skip..).map(|rest| &rest[..want.min(rest.len())])
            };
            let body = body.unwrap_or(&[]);
            if body.len() != want {
                return Err(ImportError::InconsistentDimensions {
                    context: "nrrd raw payload (bytes)".into(),
                    expected: want,
                    actual: body.len(),
                });
            }
            Dataset::new(
                header.dimensions,
                raw::decode(body, header.scalar_type, header.endian)?,
            )
        }
        Encoding::Ascii => {
            let skip = (header.byte_skip.max(0) as usize).min(payload.len());
            let text = std::str::from_utf8(&payload[skip..])
                .map_err(|e| ImportError::malformed("nrrd ascii payload", e.to_string()))?;
            let data = text
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<f64>().map(|v| v as f32).map_err(|_| {
                        ImportError::malformed("nrrd ascii payload", format!("value '{s}'"))
                    })
                })
                .collect::<Result<Vec<f32>, _>>()?;
            if data.len() != voxels {
                return Err(ImportError::InconsistentDimensions {
                    context: "nrrd ascii payload (values)".into(),
                    expected: voxels,
                    actual: data.len(),
                });
            }
            Dataset::new(header.dimensions, data)
        }
    }
}

/// Parse a complete NRRD byte stream. `base_dir` resolves relative
/// `data file` references of detached headers.
pub fn parse(bytes: &[u8], base_dir: Option<&Path>) -> Result<Dataset, ImportError> {
    let (text, data_start) = split_header(bytes)?;
    let header = parse_header(text)?;

    match &header.data_file {
        Some(file) => {
            let path = match base_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            let payload = fs::read(&path).map_err(|e| ImportError::io(&path, e))?;
            decode_payload(&header, &payload)
        }
        None => decode_payload(&header, &bytes[data_start.min(bytes.len())..]),
    }
}

pub fn read(path: &Path) -> Result<Dataset, ImportError> {
    let bytes = fs::read(path).map_err(|e| ImportError::io(path, e))?;
    parse(&bytes, path.parent())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut v = header.as_bytes().to_vec();
        v.extend_from_slice(b"\n\n");
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn reads_raw_uchar_volume() {
        let bytes = attached(
            "NRRD0004\n# comment\ntype: unsigned char\ndimension: 3\nsizes: 2 2 2\nencoding: raw",
            &[0, 1, 2, 3, 4, 5, 6, 7],
        );
        let d = parse(&bytes, None).unwrap();
        assert_eq!(d.dimensions(), [2, 2, 2]);
        assert_eq!(d.data(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!((d.min(), d.max()), (0.0, 7.0));
    }

    #[test]
    fn reads_big_endian_shorts() {
        let payload: Vec<u8> = [-1i16, 300].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = attached(
            "NRRD0005\ntype: short\ndimension: 3\nsizes: 2 1 1\nendian: big\nencoding: raw\nspace:=whatever",
            &payload,
        );
        let d = parse(&bytes, None).unwrap();
        assert_eq!(d.data(), &[-1.0, 300.0]);
    }

    #[test]
    fn reads_ascii_floats() {
        let bytes = attached(
            "NRRD0004\ntype: float\ndimension: 3\nsizes: 3 1 1\nencoding: ascii",
            b"0.5 1.5\n-2\n",
        );
        let d = parse(&bytes, None).unwrap();
        assert_eq!(d.data(), &[0.5, 1.5, -2.0]);
    }

    #[test]
    fn negative_byte_skip_takes_tail() {
        let bytes = attached(
            "NRRD0004\ntype: uchar\ndimension: 3\nsizes: 1 1 2\nencoding: raw\nbyte skip: -1",
            &[9, 9, 9, 4, 5],
        );
        let d = parse(&bytes, None).unwrap();
        assert_eq!(d.data(), &[4.0, 5.0]);
    }

    #[test]
    fn rejects_two_dimensional() {
        let bytes = attached(
            "NRRD0004\ntype: uchar\ndimension: 2\nsizes: 2 2\nencoding: raw",
            &[0, 0, 0, 0],
        );
        assert!(matches!(
            parse(&bytes, None).unwrap_err(),
            ImportError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn rejects_compressed_encoding() {
        let bytes = attached(
            "NRRD0004\ntype: uchar\ndimension: 3\nsizes: 1 1 1\nencoding: gzip",
            &[0],
        );
        assert!(matches!(
            parse(&bytes, None).unwrap_err(),
            ImportError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn short_payload_is_inconsistent() {
        let bytes = attached(
            "NRRD0004\ntype: uchar\ndimension: 3\nsizes: 2 2 2\nencoding: raw",
            &[0, 1, 2],
        );
        assert!(matches!(
            parse(&bytes, None).unwrap_err(),
            ImportError::InconsistentDimensions {
                expected: 8,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn huge_sizes_are_malformed_not_a_panic() {
        let bytes = attached(
            "NRRD0004\ntype: double\ndimension: 3\nsizes: 4294967295 4294967295 1\nencoding: raw\nendian: little",
            &[],
        );
        assert!(matches!(
            parse(&bytes, None).unwrap_err(),
            ImportError::Malformed { .. }
        ));
    }

    #[test]
    fn missing_magic_is_malformed() {
        assert!(matches!(
            parse(b"P6\n2 2\n255\n", None).unwrap_err(),
            ImportError::Malformed { .. }
        ));
    }

    #[test]
    fn detached_header_reads_data_file() {
        let dir = std::env::temp_dir().join(format!("voxview-nrrd-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("vol.raw"), [1u8, 2, 3, 4]).unwrap();
        let header = "NRRD0004\ntype: uint8\ndimension: 3\nsizes: 2 2 1\nencoding: raw\ndata file: vol.raw\n";
        fs::write(dir.join("vol.nhdr"), header).unwrap();

        let d = read(&dir.join("vol.nhdr")).unwrap();
        assert_eq!(d.data(), &[1.0, 2.0, 3.0, 4.0]);
        let _ = fs::remove_dir_all(&dir);
    }
}
