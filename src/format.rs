//! Format catalog for remote conversion.
//!
//! Workers and the gateway agree on a fixed, ordered list of formats; the
//! position of a format in that list is its wire code. Both ends decode
//! purely by integer position, so the list is append-only: reordering or
//! removing an entry breaks every deployed worker. All lookups are
//! table-driven and fail with a typed error outside the supported set, never
//! with a silent default.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use crate::types::{CourierError, Result};

/// A document format that can appear on the conversion wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Doc,
    Dot,
    Docx,
    Docm,
    Dotx,
    Dotm,
    Rtf,
    Xls,
    Xlt,
    Xlsx,
    Xlsm,
    Xltx,
    Xltm,
    Ppt,
    Pps,
    Pot,
    Pptx,
    Pptm,
    Ppsx,
    Ppsm,
    Potx,
    Potm,
    Pdf,
    Bmp,
    Gif,
    Png,
    Jpeg,
    Tiff,
}

/// The agreed wire ordering. Position in this list is the protocol code.
/// Append only; never reorder or remove entries.
pub const WIRE_FORMATS: [Format; 28] = [
    // Word formats
    Format::Doc,
    Format::Dot,
    Format::Docx,
    Format::Docm,
    Format::Dotx,
    Format::Dotm,
    Format::Rtf,
    // Excel formats
    Format::Xls,
    Format::Xlt,
    Format::Xlsx,
    Format::Xlsm,
    Format::Xltx,
    Format::Xltm,
    // Powerpoint formats
    Format::Ppt,
    Format::Pps,
    Format::Pot,
    Format::Pptx,
    Format::Pptm,
    Format::Ppsx,
    Format::Ppsm,
    Format::Potx,
    Format::Potm,
    // PDF and scanned formats
    Format::Pdf,
    Format::Bmp,
    Format::Gif,
    Format::Png,
    Format::Jpeg,
    Format::Tiff,
];

/// Formats that can only be converted by running OCR on the worker.
pub const OCR_FORMATS: [Format; 6] = [
    Format::Pdf,
    Format::Bmp,
    Format::Gif,
    Format::Png,
    Format::Jpeg,
    Format::Tiff,
];

static CODE_BY_FORMAT: LazyLock<HashMap<Format, i32>> = LazyLock::new(|| {
    WIRE_FORMATS
        .iter()
        .enumerate()
        .map(|(code, format)| (*format, code as i32))
        .collect()
});

static FORMAT_BY_EXTENSION: LazyLock<HashMap<&'static str, Format>> =
    LazyLock::new(|| WIRE_FORMATS.iter().map(|f| (f.extension(), *f)).collect());

/// Default conversion target for each delegated format.
///
/// The pure targets (docx, xlsx, pptx) never trigger delegation and have no
/// entry. Every other family member converts to the modern editable format
/// of its family; scanned formats go through OCR to docx.
static DEFAULT_OUTPUT: LazyLock<HashMap<Format, Format>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    for f in [
        Format::Doc,
        Format::Dot,
        Format::Docm,
        Format::Dotx,
        Format::Dotm,
        Format::Rtf,
    ] {
        map.insert(f, Format::Docx);
    }

    for f in [
        Format::Xls,
        Format::Xlt,
        Format::Xlsm,
        Format::Xltx,
        Format::Xltm,
    ] {
        map.insert(f, Format::Xlsx);
    }

    for f in [
        Format::Ppt,
        Format::Pps,
        Format::Pot,
        Format::Pptm,
        Format::Ppsx,
        Format::Ppsm,
        Format::Potx,
        Format::Potm,
    ] {
        map.insert(f, Format::Pptx);
    }

    for f in OCR_FORMATS {
        map.insert(f, Format::Docx);
    }

    map
});

/// Wire code of a format.
pub fn code_of(format: Format) -> Result<i32> {
    CODE_BY_FORMAT
        .get(&format)
        .copied()
        .ok_or_else(|| CourierError::UnsupportedFormat(format.to_string()))
}

/// Format for a wire code received from a worker.
pub fn format_of(code: i32) -> Result<Format> {
    usize::try_from(code)
        .ok()
        .and_then(|index| WIRE_FORMATS.get(index))
        .copied()
        .ok_or_else(|| CourierError::UnsupportedFormat(format!("code {code}")))
}

/// Check the catalog tables against each other at startup so a new format
/// cannot be half-registered: every wire entry must be unique and round-trip
/// through its code, and every delegated format must have a default target
/// that is itself on the wire.
pub fn verify_catalog() -> Result<()> {
    let mut seen = HashSet::new();
    for (index, format) in WIRE_FORMATS.iter().enumerate() {
        if !seen.insert(*format) {
            return Err(CourierError::Catalog(format!(
                "{format} appears more than once in the wire list"
            )));
        }
        let code = code_of(*format)?;
        if code != index as i32 || format_of(code)? != *format {
            return Err(CourierError::Catalog(format!(
                "{format} does not round-trip through code {code}"
            )));
        }
    }

    for format in WIRE_FORMATS {
        let is_target = matches!(format, Format::Docx | Format::Xlsx | Format::Pptx);
        match format.default_output() {
            None if !is_target => {
                return Err(CourierError::Catalog(format!(
                    "{format} has no default output format"
                )));
            }
            Some(target) => {
                code_of(target)?;
            }
            None => {}
        }
    }

    Ok(())
}

impl Format {
    /// File extension of the format, lowercase and without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Doc => "doc",
            Format::Dot => "dot",
            Format::Docx => "docx",
            Format::Docm => "docm",
            Format::Dotx => "dotx",
            Format::Dotm => "dotm",
            Format::Rtf => "rtf",
            Format::Xls => "xls",
            Format::Xlt => "xlt",
            Format::Xlsx => "xlsx",
            Format::Xlsm => "xlsm",
            Format::Xltx => "xltx",
            Format::Xltm => "xltm",
            Format::Ppt => "ppt",
            Format::Pps => "pps",
            Format::Pot => "pot",
            Format::Pptx => "pptx",
            Format::Pptm => "pptm",
            Format::Ppsx => "ppsx",
            Format::Ppsm => "ppsm",
            Format::Potx => "potx",
            Format::Potm => "potm",
            Format::Pdf => "pdf",
            Format::Bmp => "bmp",
            Format::Gif => "gif",
            Format::Png => "png",
            Format::Jpeg => "jpeg",
            Format::Tiff => "tiff",
        }
    }

    /// Parse a file extension, tolerating a leading dot and mixed case.
    pub fn from_extension(extension: &str) -> Result<Format> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        // Abbreviated spellings still common in the wild.
        let name = match normalized.as_str() {
            "jpg" => "jpeg",
            "tif" => "tiff",
            other => other,
        };
        FORMAT_BY_EXTENSION
            .get(name)
            .copied()
            .ok_or_else(|| CourierError::UnsupportedFormat(extension.to_string()))
    }

    /// Format of a file, judged by its extension.
    pub fn from_path(path: &Path) -> Result<Format> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(extension) => Self::from_extension(extension),
            None => Err(CourierError::UnsupportedFormat(
                path.display().to_string(),
            )),
        }
    }

    /// Whether converting from this format needs an OCR-capable worker.
    pub fn requires_ocr(self) -> bool {
        OCR_FORMATS.contains(&self)
    }

    /// Default conversion target when the caller does not name one.
    pub fn default_output(self) -> Option<Format> {
        DEFAULT_OUTPUT.get(&self).copied()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
