//! Unified decode entrypoint.
//!
//! [`LandingFormat::classify`] picks a decode strategy from the object key, and [`decode_object`]
//! runs it. Keys with any other extension are not decoded at all; the pipeline treats them as a
//! skipped run rather than an error.

use std::fmt;

use crate::error::{LandingError, LandingResult};
use crate::types::DataSet;

use super::json::JsonFrames;
use super::xml::XmlDocument;
use super::{csv, json, xml};

/// Number of leading key characters holding the inbound prefix (`inbound/`).
pub const INBOUND_PREFIX_LEN: usize = 8;

/// Supported landing formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array, bare object, or NDJSON.
    Json,
    /// A single XML document.
    Xml,
}

impl LandingFormat {
    /// Classify an object key by its suffix (case-sensitive, exact match).
    pub fn classify(key: &str) -> Option<Self> {
        if key.ends_with(".csv") {
            Some(Self::Csv)
        } else if key.ends_with(".json") {
            Some(Self::Json)
        } else if key.ends_with(".xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }

    /// The suffix this format is recognized by, dot included.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Csv => ".csv",
            Self::Json => ".json",
            Self::Xml => ".xml",
        }
    }

    /// Table name derived from the key: the inbound prefix and the suffix stripped.
    ///
    /// `inbound/sales/jan.csv` yields `sales/jan`. Returns `None` when nothing is left.
    pub fn default_table_name(&self, key: &str) -> Option<String> {
        let chars: Vec<char> = key.chars().collect();
        let end = chars.len().checked_sub(self.suffix().len())?;
        if end <= INBOUND_PREFIX_LEN {
            return None;
        }
        Some(chars[INBOUND_PREFIX_LEN..end].iter().collect())
    }
}

impl fmt::Display for LandingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Xml => "XML",
        };
        f.write_str(name)
    }
}

/// Output of one decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// One row batch.
    Csv(DataSet),
    /// Raw and normalized frames; only the normalized frame is loaded.
    Json(JsonFrames),
    /// One JSON record streamed to the warehouse as-is.
    Xml(XmlDocument),
}

impl Decoded {
    /// Rows the load will carry.
    pub fn loaded_rows(&self) -> usize {
        match self {
            Self::Csv(ds) => ds.row_count(),
            Self::Json(frames) => frames.normalized.row_count(),
            Self::Xml(_) => 1,
        }
    }
}

/// Decode an object body with the strategy selected for `format`.
///
/// `header` only affects CSV.
pub fn decode_object(format: LandingFormat, body: &[u8], header: bool) -> LandingResult<Decoded> {
    let text = std::str::from_utf8(body)
        .map_err(|e| LandingError::malformed(format!("object body is not valid UTF-8: {e}")))?;
    match format {
        LandingFormat::Csv => csv::decode_csv(text, header).map(Decoded::Csv),
        LandingFormat::Json => json::decode_json(text).map(Decoded::Json),
        LandingFormat::Xml => xml::decode_xml(text).map(Decoded::Xml),
    }
}
