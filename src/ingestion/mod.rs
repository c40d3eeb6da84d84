//! Decoding of landed object bodies.
//!
//! Most callers should use [`decode_object`] (from [`unified`]), which runs the decoder selected
//! by [`LandingFormat::classify`]. Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]
//! - [`xml`]

pub mod csv;
pub mod json;
pub mod unified;
pub mod xml;

pub use json::{JsonFrames, wrap_brackets_if_needed};
pub use unified::{Decoded, INBOUND_PREFIX_LEN, LandingFormat, decode_object};
pub use xml::XmlDocument;
