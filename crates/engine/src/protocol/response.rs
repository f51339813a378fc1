use http::StatusCode;

use crate::headers::ResponseHeaders;

#[derive(Debug, Clone, Default)]
pub struct ResponseHead {
    pub status: StatusCode,
    /// Overrides the canonical reason phrase of `status`.
    pub reason: Option<String>,
    pub headers: ResponseHeaders,
}

impl ResponseHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reason_phrase(&self) -> &str {
        self.reason.as_deref().or_else(|| self.status.canonical_reason()).unwrap_or("")
    }

    /// Statuses whose responses never carry a body.
    pub fn is_body_forbidden(&self) -> bool {
        let status = self.status;
        status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::RESET_CONTENT
            || status == StatusCode::NOT_MODIFIED
    }

    pub(crate) fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.headers.reset();
    }
}
