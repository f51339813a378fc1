use std::ops::{Deref, DerefMut};

use http::HeaderValue;

use crate::headers::dictionary::parse_content_length;
use crate::headers::{HeaderDictionary, KnownHeader};
use crate::protocol::{BadRequest, RequestRejectionReason};
use crate::utils::ensure;

/// The headers of the request being processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    dict: HeaderDictionary,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header line as it came off the wire.
    pub(crate) fn append_from_wire(&mut self, name: &[u8], value: &[u8]) -> Result<(), BadRequest> {
        let header_value = HeaderValue::from_bytes(value)
            .map_err(|_| BadRequest::with_detail(RequestRejectionReason::InvalidCharactersInHeaderValue, value))?;

        match KnownHeader::from_bytes(name) {
            Some(KnownHeader::ContentLength) => {
                ensure!(
                    !self.dict.contains_known(KnownHeader::ContentLength),
                    BadRequest::new(RequestRejectionReason::MultipleContentLengths)
                );
                ensure!(
                    parse_content_length(value).is_some(),
                    BadRequest::with_detail(RequestRejectionReason::InvalidContentLength, value)
                );
                self.dict.set_known(KnownHeader::ContentLength, header_value).map_err(invalid_header)
            }
            Some(header) => self.dict.append_known(header, header_value).map_err(invalid_header),
            None => {
                let name = std::str::from_utf8(name)
                    .map_err(|_| BadRequest::with_detail(RequestRejectionReason::InvalidCharactersInHeaderName, name))?;
                self.dict
                    .append(name, header_value)
                    .map_err(|_| BadRequest::with_detail(RequestRejectionReason::InvalidCharactersInHeaderName, name.as_bytes()))
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.dict.reset();
    }
}

fn invalid_header<E>(_: E) -> BadRequest {
    BadRequest::new(RequestRejectionReason::InvalidRequestHeader)
}

impl Deref for RequestHeaders {
    type Target = HeaderDictionary;

    fn deref(&self) -> &Self::Target {
        &self.dict
    }
}

impl DerefMut for RequestHeaders {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dict
    }
}
