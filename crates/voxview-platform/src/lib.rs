// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub mod input;

pub use input::{InputMapper, UserIntent};
pub use winit;
