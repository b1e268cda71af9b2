//! Uniform response envelope and pagination.
//!
//! Routing lives outside this crate; handlers map service results through
//! [`respond`] and friends.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::documents::{Page, Query};
use crate::error::{ApiError, ErrorKind};
use crate::ratelimit::retry_after_secs;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// Offset pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPageRequest")]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

#[derive(Deserialize)]
struct RawPageRequest {
    #[serde(default)]
    page: u32,
    #[serde(default, alias = "perPage", alias = "limit")]
    per_page: u32,
}

impl From<RawPageRequest> for PageRequest {
    fn from(raw: RawPageRequest) -> Self {
        PageRequest::new(raw.page, raw.per_page)
    }
}

impl PageRequest {
    /// Zero page means the first page; zero size means the default size.
    pub fn new(page: u32, per_page: u32) -> Self {
        let per_page = match per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        };
        Self {
            page: page.max(1),
            per_page,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }

    /// Applies limit and offset to `query`.
    pub fn apply(&self, query: Query) -> Query {
        query.limit(self.per_page as usize).offset(self.offset())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_PER_PAGE)
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub total_pages: usize,
}

impl Meta {
    pub fn new(page: PageRequest, total: usize) -> Self {
        let per_page = page.per_page() as usize;
        Self {
            page: page.page(),
            per_page: page.per_page(),
            total,
            total_pages: total.div_ceil(per_page),
        }
    }
}

/// Response envelope: `{success, data | error, reason, meta?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            reason: None,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Error envelope. Upstream failures get a generic message so internal
    /// detail stays in the log.
    pub fn error<E: ApiError + ?Sized>(err: &E) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::UpstreamUnavailable => "service temporarily unavailable".to_string(),
            _ => err.to_string(),
        };
        Self {
            success: false,
            data: None,
            error: Some(message),
            reason: Some(err.reason()),
            meta: None,
        }
    }
}

/// Maps a service result to `(status, envelope)`.
pub fn respond<T, E: ApiError>(result: Result<T, E>) -> (u16, ApiResponse<T>) {
    match result {
        Ok(data) => (200, ApiResponse::ok(data)),
        Err(e) => failure(&e),
    }
}

/// Like [`respond`] but answers 201 on success.
pub fn respond_created<T, E: ApiError>(result: Result<T, E>) -> (u16, ApiResponse<T>) {
    match result {
        Ok(data) => (201, ApiResponse::ok(data)),
        Err(e) => failure(&e),
    }
}

/// Maps a page of results, attaching pagination metadata.
pub fn respond_page<T, E: ApiError>(
    result: Result<Page<T>, E>,
    page: PageRequest,
) -> (u16, ApiResponse<Vec<T>>) {
    match result {
        Ok(p) => (200, ApiResponse::ok(p.items).with_meta(Meta::new(page, p.total))),
        Err(e) => failure(&e),
    }
}

pub fn failure<T, E: ApiError + ?Sized>(err: &E) -> (u16, ApiResponse<T>) {
    let kind = err.kind();
    if kind == ErrorKind::UpstreamUnavailable {
        error!(reason = err.reason(), error = %err, "Upstream failure");
    }
    (kind.status_code(), ApiResponse::error(err))
}

/// Extra headers for an error response, e.g. `Retry-After`.
pub fn error_headers<E: ApiError + ?Sized>(err: &E) -> Vec<(&'static str, String)> {
    err.retry_after()
        .map(|d| vec![("Retry-After", retry_after_secs(d).to_string())])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{Admission, RateLimitExceeded, Tier};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("secret connection string leaked")]
    struct Upstream;

    impl ApiError for Upstream {
        fn kind(&self) -> ErrorKind {
            ErrorKind::UpstreamUnavailable
        }

        fn reason(&self) -> &'static str {
            "store_unavailable"
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("order o-1 not found")]
    struct Missing;

    impl ApiError for Missing {
        fn kind(&self) -> ErrorKind {
            ErrorKind::NotFound
        }

        fn reason(&self) -> &'static str {
            "not_found"
        }
    }

    // ==================== Pagination tests ====================

    #[test]
    fn test_page_request_defaults_and_limits() {
        assert_eq!(PageRequest::default(), PageRequest::new(1, 20));
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 20));
        assert_eq!(PageRequest::new(2, 500).per_page(), 100);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_page_request_from_query_json() {
        let page: PageRequest = serde_json::from_value(json!({"page": 2, "perPage": 10})).unwrap();
        assert_eq!(page, PageRequest::new(2, 10));

        let page: PageRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(page, PageRequest::default());
    }

    #[test]
    fn test_meta_total_pages() {
        let meta = Meta::new(PageRequest::new(1, 20), 41);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(Meta::new(PageRequest::new(1, 20), 0).total_pages, 0);
    }

    // ==================== Envelope tests ====================

    #[test]
    fn test_success_envelope() {
        let (status, body) = respond::<_, Missing>(Ok(json!({"id": "o-1"})));
        assert_eq!(status, 200);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"success": true, "data": {"id": "o-1"}})
        );
    }

    #[test]
    fn test_page_envelope_has_camel_case_meta() {
        let page = Page {
            items: vec![1, 2],
            total: 25,
        };
        let (status, body) = respond_page::<_, Missing>(Ok(page), PageRequest::new(2, 2));
        assert_eq!(status, 200);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "success": true,
                "data": [1, 2],
                "meta": {"page": 2, "perPage": 2, "total": 25, "totalPages": 13}
            })
        );
    }

    #[test]
    fn test_error_envelope_carries_reason() {
        let (status, body) = respond::<(), _>(Err(Missing));
        assert_eq!(status, 404);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"success": false, "error": "order o-1 not found", "reason": "not_found"})
        );
    }

    #[test]
    fn test_upstream_error_hides_detail() {
        let (status, body) = respond::<(), _>(Err(Upstream));
        assert_eq!(status, 502);
        assert_eq!(body.reason, Some("store_unavailable"));
        assert!(!body.error.unwrap().contains("secret"));
    }

    #[test]
    fn test_rate_limited_headers() {
        let err = RateLimitExceeded {
            tier: Tier::Auth,
            admission: Admission::deny(20, Duration::from_millis(1500)),
            retry_after: Duration::from_millis(1500),
        };
        let (status, _) = failure::<(), _>(&err);
        assert_eq!(status, 429);
        assert_eq!(error_headers(&err), vec![("Retry-After", "2".to_string())]);
        assert!(error_headers(&Missing).is_empty());
    }

    #[test]
    fn test_created_status() {
        let (status, _) = respond_created::<_, Missing>(Ok(1));
        assert_eq!(status, 201);
    }
}
