use http::Method;

use crate::codec::HttpVersion;
use crate::headers::RequestHeaders;

/// The shape of the request target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetForm {
    /// `/path?query`
    #[default]
    Origin,
    /// `http://host/path?query`
    Absolute,
    /// `host:port`, CONNECT only.
    Authority,
    /// `*`, OPTIONS only.
    Asterisk,
}

/// The parsed head of the request being processed. Reset in place between requests on one
/// connection.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub version: HttpVersion,
    pub target_form: TargetForm,
    /// The target exactly as sent.
    pub raw_target: String,
    /// The decoded, normalized path after removing the path base.
    pub path: String,
    /// The configured path base when the path started with it, empty otherwise.
    pub path_base: String,
    /// The query without its `?`.
    pub query: String,
    /// The authority of an absolute-form or authority-form target.
    pub authority: Option<String>,
    pub headers: RequestHeaders,
}

impl Default for RequestHead {
    fn default() -> Self {
        Self {
            method: Method::GET,
            version: HttpVersion::Http11,
            target_form: TargetForm::Origin,
            raw_target: String::new(),
            path: String::new(),
            path_base: String::new(),
            query: String::new(),
            authority: None,
            headers: RequestHeaders::new(),
        }
    }
}

impl RequestHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self) {
        self.method = Method::GET;
        self.version = HttpVersion::Http11;
        self.target_form = TargetForm::Origin;
        self.raw_target.clear();
        self.path.clear();
        self.path_base.clear();
        self.query.clear();
        self.authority = None;
        self.headers.reset();
    }
}
