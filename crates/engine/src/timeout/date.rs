//! The current HTTP date, formatted once per heartbeat instead of once per response.

use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderValue;
use tokio::time::Instant;
use tracing::warn;

use crate::timeout::HeartbeatHandler;

/// The formatted date as a header value and as a complete `Date: ...\r\n` line.
#[derive(Debug, Clone)]
pub struct DateValues {
    pub value: HeaderValue,
    pub raw: Bytes,
}

#[derive(Debug)]
pub struct DateCache {
    current: ArcSwap<DateValues>,
}

impl Default for DateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DateCache {
    pub fn new() -> Self {
        let values = format_now().unwrap_or_else(|| DateValues {
            value: HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"),
            raw: Bytes::from_static(b"Date: Thu, 01 Jan 1970 00:00:00 GMT\r\n"),
        });
        Self { current: ArcSwap::from_pointee(values) }
    }

    pub fn get(&self) -> Arc<DateValues> {
        self.current.load_full()
    }

    pub fn refresh(&self) {
        match format_now() {
            Some(values) => self.current.store(Arc::new(values)),
            None => warn!("failed to format the current date"),
        }
    }
}

impl HeartbeatHandler for DateCache {
    fn on_heartbeat(&self, _now: Instant) {
        self.refresh();
    }
}

fn format_now() -> Option<DateValues> {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);

    let mut raw = BytesMut::with_capacity(buf.len() + 8);
    raw.put_slice(b"Date: ");
    raw.put_slice(&buf);
    raw.put_slice(b"\r\n");
    let raw = raw.freeze();

    let value = HeaderValue::from_maybe_shared(raw.slice(6..raw.len() - 2)).ok()?;
    Some(DateValues { value, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_line_wraps_the_value() {
        let cache = DateCache::new();
        let date = cache.get();
        let value = date.value.to_str().unwrap();
        assert!(value.ends_with(" GMT"));
        assert_eq!(value.len(), 29);
        assert_eq!(date.raw, Bytes::from(format!("Date: {value}\r\n")));

        cache.refresh();
        assert_eq!(cache.get().raw.len(), date.raw.len());
    }
}
