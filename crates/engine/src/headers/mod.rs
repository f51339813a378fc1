//! Header storage for requests and responses.
//!
//! A [`HeaderDictionary`] keeps about sixty common header names in fixed slots indexed by
//! [`KnownHeader`] and tracks which are present with a bitmask. Known names are recognized by
//! length and a masked word compare (see `lookup`), so the common case never hashes. Anything
//! else goes to an overflow list. [`ResponseHeaders`] adds pre-encoded lines for the headers
//! the server writes on every response.

mod dictionary;
mod known;
mod lookup;
mod request;
mod response;
mod tokens;
mod values;

pub use dictionary::HeaderDictionary;
pub use known::KnownHeader;
pub use request::RequestHeaders;
pub use response::ResponseHeaders;
pub use tokens::{ConnectionOptions, final_coding_is_chunked};
pub use values::HeaderValues;
