// SPDX-License-Identifier: CEPL-1.0
//! Volume datasets, the file formats they are read from, and the
//! transfer-function gradient that colours them.

pub mod csv;
pub mod dataset;
pub mod error;
pub mod format;
pub mod gradient;
pub mod importer;
pub mod nrrd;
pub mod raw;

pub use dataset::Dataset;
pub use error::ImportError;
pub use format::{DataFormat, Endian, ScalarType};
pub use gradient::{
    AlphaMarker, ColorMarker, Gradient, GradientError, Marker, TransferFunction,
    TRANSFER_FUNCTION_RESOLUTION,
};
pub use importer::{import, import_slices};
