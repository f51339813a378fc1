use bytes::BytesMut;
use http::{HeaderName, HeaderValue};

use crate::headers::{HeaderValues, KnownHeader};
use crate::protocol::HeaderError;
use crate::utils::ensure;

/// A header map with a dedicated slot per [`KnownHeader`] and an overflow list for every other
/// name.
///
/// Bit `i` of the presence mask is set exactly when slot `i` holds at least one value.
/// Unknown names are compared ignoring ASCII case, kept in insertion order and written with
/// the spelling they were first set with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDictionary {
    bits: u64,
    known: [HeaderValues; KnownHeader::COUNT],
    unknown: Vec<(Box<str>, HeaderValues)>,
    content_length: Option<u64>,
    read_only: bool,
}

impl Default for HeaderDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderDictionary {
    pub fn new() -> Self {
        Self {
            bits: 0,
            known: std::array::from_fn(|_| HeaderValues::Empty),
            unknown: Vec::new(),
            content_length: None,
            read_only: false,
        }
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0 && self.unknown.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn contains_known(&self, header: KnownHeader) -> bool {
        self.bits & header.bit() != 0
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValues> {
        match KnownHeader::from_bytes(name.as_bytes()) {
            Some(header) => self.get_known(header),
            None => self.unknown_position(name).map(|i| &self.unknown[i].1),
        }
    }

    pub fn get_known(&self, header: KnownHeader) -> Option<&HeaderValues> {
        self.contains_known(header).then(|| &self.known[header.index()])
    }

    /// The first value of `header`.
    pub fn first_known(&self, header: KnownHeader) -> Option<&HeaderValue> {
        self.get_known(header).and_then(HeaderValues::first)
    }

    /// The Content-Length parsed when it was set.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Replaces every value of `name`.
    pub fn set(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        match KnownHeader::from_bytes(name.as_bytes()) {
            Some(header) => self.set_known(header, value),
            None => {
                ensure!(!self.read_only, HeaderError::ReadOnly);
                match self.unknown_position(name) {
                    Some(i) => self.unknown[i].1 = HeaderValues::One(value),
                    None => self.unknown.push((parse_name(name)?, HeaderValues::One(value))),
                }
                Ok(())
            }
        }
    }

    pub fn set_known(&mut self, header: KnownHeader, value: HeaderValue) -> Result<(), HeaderError> {
        ensure!(!self.read_only, HeaderError::ReadOnly);
        if header == KnownHeader::ContentLength {
            self.content_length = Some(parse_content_length(value.as_bytes()).ok_or_else(|| invalid_length(&value))?);
        }
        self.known[header.index()] = HeaderValues::One(value);
        self.bits |= header.bit();
        Ok(())
    }

    /// Adds `name` only when it is not present yet.
    pub fn try_add(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        ensure!(!self.contains(name), HeaderError::duplicate_key(name));
        self.set(name, value)
    }

    /// Adds another value for `name`.
    pub fn append(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        match KnownHeader::from_bytes(name.as_bytes()) {
            Some(header) => self.append_known(header, value),
            None => {
                ensure!(!self.read_only, HeaderError::ReadOnly);
                match self.unknown_position(name) {
                    Some(i) => self.unknown[i].1.push(value),
                    None => self.unknown.push((parse_name(name)?, HeaderValues::One(value))),
                }
                Ok(())
            }
        }
    }

    pub fn append_known(&mut self, header: KnownHeader, value: HeaderValue) -> Result<(), HeaderError> {
        if !self.contains_known(header) {
            return self.set_known(header, value);
        }
        ensure!(!self.read_only, HeaderError::ReadOnly);
        ensure!(header != KnownHeader::ContentLength, HeaderError::duplicate_key(header));
        self.known[header.index()].push(value);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Option<HeaderValues>, HeaderError> {
        if let Some(header) = KnownHeader::from_bytes(name.as_bytes()) {
            return self.remove_known(header);
        }
        ensure!(!self.read_only, HeaderError::ReadOnly);
        Ok(self.unknown_position(name).map(|i| self.unknown.remove(i).1))
    }

    pub fn remove_known(&mut self, header: KnownHeader) -> Result<Option<HeaderValues>, HeaderError> {
        ensure!(!self.read_only, HeaderError::ReadOnly);
        if !self.contains_known(header) {
            return Ok(None);
        }
        self.bits &= !header.bit();
        if header == KnownHeader::ContentLength {
            self.content_length = None;
        }
        Ok(Some(std::mem::take(&mut self.known[header.index()])))
    }

    pub fn clear(&mut self) -> Result<(), HeaderError> {
        ensure!(!self.read_only, HeaderError::ReadOnly);
        self.reset();
        Ok(())
    }

    /// Empties the dictionary for the next request, keeping its allocations.
    pub(crate) fn reset(&mut self) {
        let mut bits = self.bits;
        while bits != 0 {
            let i = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            self.known[i] = HeaderValues::Empty;
        }
        self.bits = 0;
        self.unknown.clear();
        self.content_length = None;
        self.read_only = false;
    }

    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Known headers in declaration order, then unknown ones in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValues)> {
        self.known_iter()
            .map(|(header, values)| (header.as_str(), values))
            .chain(self.unknown.iter().map(|(name, values)| (&**name, values)))
    }

    pub(crate) fn known_iter(&self) -> impl Iterator<Item = (KnownHeader, &HeaderValues)> {
        let mut bits = self.bits;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let i = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            KnownHeader::from_index(i).map(|header| (header, &self.known[i]))
        })
    }

    pub(crate) fn unknown_iter(&self) -> impl Iterator<Item = (&str, &HeaderValues)> {
        self.unknown.iter().map(|(name, values)| (&**name, values))
    }

    /// Writes one `name: value\r\n` line per value.
    pub fn encode(&self, dst: &mut BytesMut) {
        for (name, values) in self.iter() {
            encode_values(name, values, dst);
        }
    }

    fn unknown_position(&self, name: &str) -> Option<usize> {
        self.unknown.iter().position(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

pub(crate) fn encode_values(name: &str, values: &HeaderValues, dst: &mut BytesMut) {
    for value in values {
        dst.reserve(name.len() + value.len() + 4);
        dst.extend_from_slice(name.as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }
}

fn parse_name(name: &str) -> Result<Box<str>, HeaderError> {
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(_) => Ok(name.into()),
        Err(_) => Err(HeaderError::invalid_name(name)),
    }
}

fn invalid_length(value: &HeaderValue) -> HeaderError {
    HeaderError::invalid_content_length(String::from_utf8_lossy(value.as_bytes()))
}

/// Parses a Content-Length value: one or more ASCII digits fitting in a `u64`.
pub(crate) fn parse_content_length(value: &[u8]) -> Option<u64> {
    if value.is_empty() {
        return None;
    }
    value.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
    })
}
