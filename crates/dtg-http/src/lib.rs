//! Range-capable HTTP transport for dtg.
//!
//! Implements `TransportPort` over `reqwest`. Each fetch streams one task's
//! content to its destination file:
//!
//! - A resumed fetch sends `Range: bytes=<offset>-` plus `If-Range` with the
//!   checkpoint's validator. A `206` is appended to the partial file; a `200`
//!   means the resource changed and the file is rewritten from zero.
//! - Suspension keeps the partial file and returns a checkpoint with the
//!   bytes on disk and the server's `ETag` (or `Last-Modified`).
//! - Abort deletes the partial file.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dtg_core::{DownloaderConfig, TransportPort};
//! use dtg_http::{HttpTransport, HttpTransportConfig};
//!
//! # fn example() -> Result<(), dtg_core::TransportError> {
//! let transport: Arc<dyn TransportPort> =
//!     Arc::new(HttpTransport::new(&HttpTransportConfig::new().with_token("secret"))?);
//! let session = transport.open_session(&DownloaderConfig::new("item-1").session_identifier)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod config;
mod error;
mod range;
mod session;
mod transport;

// ============================================================================
// Public API
// ============================================================================

pub use config::HttpTransportConfig;
pub use session::HttpSession;
pub use transport::HttpTransport;

// Silence unused dev-dependency warnings
#[cfg(test)]
use url as _;
#[cfg(test)]
use wiremock as _;
