//! The closed set of header names with dedicated slots in a [`HeaderDictionary`].
//!
//! [`HeaderDictionary`]: crate::headers::HeaderDictionary

macro_rules! known_headers {
    ($($variant:ident => $name:literal,)+) => {
        /// A header with a dedicated slot. The declaration order is the order headers are
        /// serialized in.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum KnownHeader {
            $($variant,)+
        }

        impl KnownHeader {
            pub const ALL: &'static [KnownHeader] = &[$(KnownHeader::$variant,)+];

            pub const COUNT: usize = Self::ALL.len();

            /// The canonical wire name.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(KnownHeader::$variant => $name,)+
                }
            }
        }
    };
}

known_headers! {
    Connection => "Connection",
    Date => "Date",
    ContentType => "Content-Type",
    Server => "Server",
    ContentLength => "Content-Length",
    TransferEncoding => "Transfer-Encoding",
    CacheControl => "Cache-Control",
    KeepAlive => "Keep-Alive",
    Pragma => "Pragma",
    Trailer => "Trailer",
    Upgrade => "Upgrade",
    Via => "Via",
    Warning => "Warning",
    Allow => "Allow",
    ContentEncoding => "Content-Encoding",
    ContentLanguage => "Content-Language",
    ContentLocation => "Content-Location",
    ContentRange => "Content-Range",
    Expires => "Expires",
    LastModified => "Last-Modified",
    Accept => "Accept",
    AcceptCharset => "Accept-Charset",
    AcceptEncoding => "Accept-Encoding",
    AcceptLanguage => "Accept-Language",
    Authorization => "Authorization",
    Cookie => "Cookie",
    Expect => "Expect",
    From => "From",
    Host => "Host",
    IfMatch => "If-Match",
    IfModifiedSince => "If-Modified-Since",
    IfNoneMatch => "If-None-Match",
    IfRange => "If-Range",
    IfUnmodifiedSince => "If-Unmodified-Since",
    MaxForwards => "Max-Forwards",
    ProxyAuthorization => "Proxy-Authorization",
    Referer => "Referer",
    Range => "Range",
    Te => "TE",
    UserAgent => "User-Agent",
    Origin => "Origin",
    UpgradeInsecureRequests => "Upgrade-Insecure-Requests",
    AcceptRanges => "Accept-Ranges",
    Age => "Age",
    ETag => "ETag",
    Location => "Location",
    ProxyAuthenticate => "Proxy-Authenticate",
    RetryAfter => "Retry-After",
    SetCookie => "Set-Cookie",
    Vary => "Vary",
    WwwAuthenticate => "WWW-Authenticate",
    AccessControlAllowCredentials => "Access-Control-Allow-Credentials",
    AccessControlAllowHeaders => "Access-Control-Allow-Headers",
    AccessControlAllowMethods => "Access-Control-Allow-Methods",
    AccessControlAllowOrigin => "Access-Control-Allow-Origin",
    AccessControlExposeHeaders => "Access-Control-Expose-Headers",
    AccessControlMaxAge => "Access-Control-Max-Age",
}

const _: () = assert!(KnownHeader::COUNT <= 64, "known headers must fit the presence bitmask");

impl KnownHeader {
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub(crate) const fn bit(self) -> u64 {
        1 << self.index()
    }

    /// The header at `index` in declaration order.
    pub fn from_index(index: usize) -> Option<KnownHeader> {
        Self::ALL.get(index).copied()
    }

    /// Looks `name` up ignoring ASCII case.
    #[inline]
    pub fn from_bytes(name: &[u8]) -> Option<KnownHeader> {
        crate::headers::lookup::lookup(name)
    }
}

impl std::fmt::Display for KnownHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
