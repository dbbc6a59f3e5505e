//! Inline citation micro-format parsing and grounding helpers.
//!
//! The model embeds citations inline in its prose as
//! `[[{"ref": "...", "doc": "...", "loc": "..."}]]`. Parsing happens on
//! demand (a click on a citation marker), and malformed markers degrade to
//! "no citation available" rather than an error.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sources with no meaningful page or paragraph location. A citation whose
/// `doc` contains one of these (lowercased) has its location suppressed.
const GENERIC_SOURCE_MARKERS: &[&str] = &["google search", "general knowledge", "general authority"];

/// A structured citation recovered from model text. Derived per click,
/// never stored on the message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Human-readable citation string.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Source document name, or a generic marker such as "Google Search".
    pub doc: String,
    /// Page or paragraph location. May be empty.
    #[serde(default)]
    pub loc: String,
}

impl Citation {
    /// The location to display, or `None` when it is empty or the source is
    /// generic and has no meaningful location.
    #[must_use]
    pub fn display_location(&self) -> Option<&str> {
        if self.loc.is_empty() || self.is_generic_source() {
            None
        } else {
            Some(&self.loc)
        }
    }

    /// Whether the source is a generic marker rather than a document.
    #[must_use]
    pub fn is_generic_source(&self) -> bool {
        let doc = self.doc.to_lowercase();
        GENERIC_SOURCE_MARKERS
            .iter()
            .any(|marker| doc.contains(marker))
    }
}

/// Pattern-based citation extractor.
pub struct CitationExtractor {
    pattern: Regex,
}

impl CitationExtractor {
    /// Create a new extractor.
    ///
    /// # Errors
    /// Returns an error if the micro-format pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"\[\[\{.*?\}\]\]")?,
        })
    }

    /// Parse the first micro-format occurrence in `text`.
    ///
    /// Returns `None` when no marker is present or the marker is malformed.
    #[must_use]
    pub fn parse_first(&self, text: &str) -> Option<Citation> {
        self.pattern
            .find_iter(text)
            .find_map(|m| parse_marker(m.as_str()))
    }

    /// Parse every well-formed micro-format occurrence in `text`, in order.
    #[must_use]
    pub fn parse_all(&self, text: &str) -> Vec<Citation> {
        self.pattern
            .find_iter(text)
            .filter_map(|m| parse_marker(m.as_str()))
            .collect()
    }

    /// Strip citation markers from `text`, leaving the prose readable.
    #[must_use]
    pub fn strip(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }
}

/// Decode one `[[{...}]]` marker into a citation.
fn parse_marker(marker: &str) -> Option<Citation> {
    // Drop the enclosing double brackets, keep the JSON object.
    let inner = marker.get(2..marker.len().checked_sub(2)?)?;
    serde_json::from_str::<Citation>(inner).ok()
}
