//! The ICAP `Encapsulated` header.
//!
//! An ICAP message body is a concatenation of sections: the encapsulated HTTP
//! request head, the encapsulated HTTP response head, and at most one body.
//! The `Encapsulated` header lists those sections with their byte offsets inside
//! the ICAP body, e.g. `req-hdr=0, res-hdr=137, res-body=296`.
//!
//! Head sections are plain bytes and their length is the distance to the next
//! offset. The final section is either a body (sent chunked) or `null-body`,
//! whose offset is the total length of the heads.

use std::fmt;
use std::ops::Range;

use crate::ensure;
use crate::protocol::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    ReqHdr,
    ResHdr,
    ReqBody,
    ResBody,
    OptBody,
    NullBody,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::ReqHdr => "req-hdr",
            Section::ResHdr => "res-hdr",
            Section::ReqBody => "req-body",
            Section::ResBody => "res-body",
            Section::OptBody => "opt-body",
            Section::NullBody => "null-body",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let section = match name.to_ascii_lowercase().as_str() {
            "req-hdr" => Section::ReqHdr,
            "res-hdr" => Section::ResHdr,
            "req-body" => Section::ReqBody,
            "res-body" => Section::ResBody,
            "opt-body" => Section::OptBody,
            "null-body" => Section::NullBody,
            _ => return None,
        };
        Some(section)
    }

    /// Sections that carry a chunked body
    #[inline]
    pub fn is_body(&self) -> bool {
        matches!(self, Section::ReqBody | Section::ResBody | Section::OptBody)
    }

    /// Sections that carry an encapsulated HTTP head
    #[inline]
    pub fn is_head(&self) -> bool {
        matches!(self, Section::ReqHdr | Section::ResHdr)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `Encapsulated` header: `(section, offset)` pairs in wire order.
///
/// The default value has no sections, which is what a request without the
/// header (typically `OPTIONS`) looks like: no heads and no body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encapsulated {
    entries: Vec<(Section, usize)>,
}

impl Encapsulated {
    /// Parses and validates an `Encapsulated` header value.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidEncapsulated`] if:
    /// - the value is empty or not ASCII
    /// - an entry is not `name=offset`, or the name is unknown
    /// - a section appears twice
    /// - offsets are decreasing, or the first offset is not 0
    /// - the last entry is not a body or `null-body`, or a body is not last
    pub fn parse(value: &[u8]) -> Result<Self, ParseError> {
        let value = std::str::from_utf8(value).map_err(|_| ParseError::invalid_encapsulated("value is not ascii"))?;
        ensure!(!value.trim().is_empty(), ParseError::invalid_encapsulated("value is empty"));

        let mut entries: Vec<(Section, usize)> = Vec::with_capacity(3);
        for part in value.split(',') {
            let part = part.trim();
            let (name, offset) =
                part.split_once('=').ok_or_else(|| ParseError::invalid_encapsulated(format!("entry {part:?} is not name=offset")))?;

            let section = Section::from_name(name.trim())
                .ok_or_else(|| ParseError::invalid_encapsulated(format!("unknown section {:?}", name.trim())))?;
            let offset = offset
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::invalid_encapsulated(format!("offset {:?} is not a number", offset.trim())))?;

            ensure!(
                entries.iter().all(|(s, _)| *s != section),
                ParseError::invalid_encapsulated(format!("section {section} appears twice"))
            );

            if let Some((last_section, last_offset)) = entries.last() {
                ensure!(
                    !last_section.is_body() && *last_section != Section::NullBody,
                    ParseError::invalid_encapsulated(format!("{last_section} must be the last section"))
                );
                ensure!(
                    offset >= *last_offset,
                    ParseError::invalid_encapsulated(format!("offset {offset} of {section} is before {last_offset}"))
                );
            } else {
                ensure!(offset == 0, ParseError::invalid_encapsulated(format!("first offset must be 0, got {offset}")));
            }

            entries.push((section, offset));
        }

        if let Some((last, _)) = entries.last() {
            ensure!(
                last.is_body() || *last == Section::NullBody,
                ParseError::invalid_encapsulated(format!("last section {last} must be a body or null-body"))
            );
        }

        Ok(Self { entries })
    }

    /// Layout of an outgoing message: an optional head section at offset 0, then
    /// the body section, or `null-body` when `body` is `None`.
    pub fn for_message(head: Option<Section>, head_len: usize, body: Option<Section>) -> Self {
        let mut entries = Vec::with_capacity(2);
        let body_offset = match head {
            Some(section) => {
                entries.push((section, 0));
                head_len
            }
            None => 0,
        };
        entries.push((body.unwrap_or(Section::NullBody), body_offset));
        Self { entries }
    }

    pub fn entries(&self) -> &[(Section, usize)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offset(&self, section: Section) -> Option<usize> {
        self.entries.iter().find(|(s, _)| *s == section).map(|(_, offset)| *offset)
    }

    /// The section the chunked body belongs to, if the message has one
    pub fn body_section(&self) -> Option<Section> {
        self.entries.last().map(|(section, _)| *section).filter(Section::is_body)
    }

    #[inline]
    pub fn has_body(&self) -> bool {
        self.body_section().is_some()
    }

    /// Total length of the encapsulated HTTP heads that precede the body.
    pub fn head_len(&self) -> usize {
        self.entries.last().map_or(0, |(_, offset)| *offset)
    }

    /// Byte ranges of the head sections, relative to the start of the ICAP body.
    pub fn head_ranges(&self) -> impl Iterator<Item = (Section, Range<usize>)> + '_ {
        self.entries.windows(2).filter(|pair| pair[0].0.is_head()).map(|pair| (pair[0].0, pair[0].1..pair[1].1))
    }
}

impl fmt::Display for Encapsulated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (section, offset)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{section}={offset}")?;
        }
        Ok(())
    }
}
