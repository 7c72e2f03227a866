//! Range request helpers.
//!
//! Pure functions deciding how a resumed request is sent and how its
//! response is written. No I/O.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, ETAG, HeaderMap, LAST_MODIFIED};

use crate::error::{HttpError, HttpResult};

/// How the response body relates to the bytes already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStart {
    /// Append after `offset` existing bytes.
    Append(u64),
    /// Discard what is on disk and write from zero.
    Restart,
    /// The server has nothing past `offset`; the file is complete.
    AlreadyComplete,
}

/// `Range` header value for a transfer resuming at `offset`.
pub fn range_header(offset: u64) -> Option<String> {
    (offset > 0).then(|| format!("bytes={offset}-"))
}

/// Validator identifying the representation: entity tag, else last-modified.
pub fn validator(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .or_else(|| headers.get(LAST_MODIFIED))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Start byte of a `Content-Range: bytes <start>-<end>/<total>` header.
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes ")?;
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

/// Decide how to write a response to a request resuming at `offset`.
pub fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    offset: u64,
    url: &str,
) -> HttpResult<BodyStart> {
    match status {
        StatusCode::PARTIAL_CONTENT => match content_range_start(headers) {
            Some(0) => Ok(BodyStart::Restart),
            Some(start) if start == offset => Ok(BodyStart::Append(offset)),
            // Without a Content-Range the body is assumed to continue at offset.
            None if offset > 0 => Ok(BodyStart::Append(offset)),
            None => Ok(BodyStart::Restart),
            Some(start) => Err(HttpError::ContentRange {
                expected: offset,
                actual: start,
                url: url.to_string(),
            }),
        },
        // The server ignored the range (or the validator no longer matched).
        s if s.is_success() => Ok(BodyStart::Restart),
        StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => Ok(BodyStart::AlreadyComplete),
        s => Err(HttpError::Status {
            status: s.as_u16(),
            url: url.to_string(),
        }),
    }
}
