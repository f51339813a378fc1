use std::ops::Deref;

use bytes::{Bytes, BytesMut};
use http::HeaderValue;

use crate::headers::dictionary::encode_values;
use crate::headers::{HeaderDictionary, HeaderValues, KnownHeader};
use crate::protocol::HeaderError;

/// Headers that may carry a pre-encoded `Name: value\r\n` line.
const RAW_HEADERS: [KnownHeader; 5] = [
    KnownHeader::Connection,
    KnownHeader::Date,
    KnownHeader::ContentLength,
    KnownHeader::Server,
    KnownHeader::TransferEncoding,
];

fn raw_slot(header: KnownHeader) -> Option<usize> {
    RAW_HEADERS.iter().position(|&h| h == header)
}

/// The headers of the response being produced.
///
/// Reading goes through [`Deref`] to the [`HeaderDictionary`]. Every mutation goes through
/// this type so that a plain set drops the cached raw line of that header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    dict: HeaderDictionary,
    raw: [Option<Bytes>; RAW_HEADERS.len()],
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        self.dict.set(name, value)?;
        self.invalidate(name);
        Ok(())
    }

    pub fn set_known(&mut self, header: KnownHeader, value: HeaderValue) -> Result<(), HeaderError> {
        self.dict.set_known(header, value)?;
        self.invalidate_known(header);
        Ok(())
    }

    pub fn try_add(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        self.dict.try_add(name, value)?;
        self.invalidate(name);
        Ok(())
    }

    pub fn append(&mut self, name: &str, value: HeaderValue) -> Result<(), HeaderError> {
        self.dict.append(name, value)?;
        self.invalidate(name);
        Ok(())
    }

    pub fn append_known(&mut self, header: KnownHeader, value: HeaderValue) -> Result<(), HeaderError> {
        self.dict.append_known(header, value)?;
        self.invalidate_known(header);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Option<HeaderValues>, HeaderError> {
        let removed = self.dict.remove(name)?;
        self.invalidate(name);
        Ok(removed)
    }

    pub fn remove_known(&mut self, header: KnownHeader) -> Result<Option<HeaderValues>, HeaderError> {
        let removed = self.dict.remove_known(header)?;
        self.invalidate_known(header);
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<(), HeaderError> {
        self.dict.clear()?;
        self.raw = Default::default();
        Ok(())
    }

    /// Sets `header` together with its complete encoded line, written verbatim by
    /// [`ResponseHeaders::encode`] until the header is set again.
    ///
    /// Headers without a raw slot are set normally.
    pub fn set_raw(&mut self, header: KnownHeader, value: HeaderValue, raw: Bytes) -> Result<(), HeaderError> {
        self.dict.set_known(header, value)?;
        if let Some(slot) = raw_slot(header) {
            self.raw[slot] = Some(raw);
        }
        Ok(())
    }

    pub fn raw(&self, header: KnownHeader) -> Option<&Bytes> {
        raw_slot(header).and_then(|slot| self.raw[slot].as_ref())
    }

    /// Freezes the headers once they start going out.
    pub(crate) fn set_read_only(&mut self) {
        self.dict.set_read_only();
    }

    pub(crate) fn reset(&mut self) {
        self.dict.reset();
        self.raw = Default::default();
    }

    /// Serializes every header, using the cached raw line where there is one.
    pub fn encode(&self, dst: &mut BytesMut) {
        for (header, values) in self.dict.known_iter() {
            match self.raw(header) {
                Some(raw) => dst.extend_from_slice(raw),
                None => encode_values(header.as_str(), values, dst),
            }
        }
        for (name, values) in self.dict.unknown_iter() {
            encode_values(name, values, dst);
        }
    }

    fn invalidate(&mut self, name: &str) {
        if let Some(header) = KnownHeader::from_bytes(name.as_bytes()) {
            self.invalidate_known(header);
        }
    }

    fn invalidate_known(&mut self, header: KnownHeader) {
        if let Some(slot) = raw_slot(header) {
            self.raw[slot] = None;
        }
    }
}

impl Deref for ResponseHeaders {
    type Target = HeaderDictionary;

    fn deref(&self) -> &Self::Target {
        &self.dict
    }
}
