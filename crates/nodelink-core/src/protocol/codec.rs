//! Inbound payload decoding
//!
//! A payload that is valid UTF-8 without control characters (other than
//! whitespace) is text; text carrying the listing markers is a filename listing
//! of the form `name|meta;name|meta;EOF`. Anything else is binary.
//!
//! Classification says nothing about where the bytes belong. File chunks are
//! arbitrary data and often happen to be valid UTF-8 (`DE AD` is U+07AD), so
//! the session keeps every non-listing payload on the file-transfer
//! characteristic as file data regardless of how it classifies here.

use serde::{Deserialize, Serialize};

/// Entry that closes a filename listing
pub const LISTING_TERMINATOR: &str = "EOF";

const ENTRY_SEPARATOR: char = ';';
const METADATA_SEPARATOR: char = '|';

// ----------------------------------------------------------------------------
// Filename Listing
// ----------------------------------------------------------------------------

/// Filenames parsed from a listing response, in the order the node sent them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameListing {
    filenames: Vec<String>,
}

impl FilenameListing {
    /// True when `text` carries all three listing markers
    pub fn is_listing(text: &str) -> bool {
        text.contains(METADATA_SEPARATOR)
            && text.contains(ENTRY_SEPARATOR)
            && text.contains(LISTING_TERMINATOR)
    }

    /// Parse a listing, or `None` if `text` is plain text
    pub fn parse(text: &str) -> Option<Self> {
        if !Self::is_listing(text) {
            return None;
        }

        let filenames = text
            .split(ENTRY_SEPARATOR)
            .map(str::trim)
            .filter(|entry| *entry != LISTING_TERMINATOR)
            .filter_map(|entry| {
                let name = entry
                    .split_once(METADATA_SEPARATOR)
                    .map_or(entry, |(name, _)| name)
                    .trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect();

        Some(Self { filenames })
    }

    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    /// First non-empty filename, used to prefill a transfer request
    pub fn first(&self) -> Option<&str> {
        self.filenames.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn into_filenames(self) -> Vec<String> {
        self.filenames
    }
}

// ----------------------------------------------------------------------------
// Payload Classification
// ----------------------------------------------------------------------------

/// Classified notification payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Text(String),
    Listing {
        text: String,
        listing: FilenameListing,
    },
    Binary(Vec<u8>),
}

/// Classify a raw notification payload
pub fn decode(payload: &[u8]) -> InboundPayload {
    match std::str::from_utf8(payload) {
        Ok(text) if is_printable(text) => match FilenameListing::parse(text) {
            Some(listing) => InboundPayload::Listing {
                text: text.to_string(),
                listing,
            },
            None => InboundPayload::Text(text.to_string()),
        },
        _ => InboundPayload::Binary(payload.to_vec()),
    }
}

// Single bytes such as 0x01 are valid UTF-8 but belong to file data
fn is_printable(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
}

/// Uppercase hex rendering of `bytes` with no separators
pub fn hex_projection(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}
