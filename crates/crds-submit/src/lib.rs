//! crds-submit — scripted access to the CRDS web submission site.
//!
//! The site is a Django application built for browsers: state changes need
//! a CSRF token scraped from a form or a cookie, and errors come back as
//! HTML banners. [`Session`] wraps that into login, form posts, lock checks
//! and chunked file upload.

pub mod classify;
pub mod cookies;
pub mod csrf;
pub mod document;
pub mod error;
pub mod runner;
pub mod session;
pub mod transport;
pub mod types;
pub mod upload;

pub use document::{DocumentQuery, HtmlDocument};
pub use error::{SubmitError, SubmitResult, TransportError};
pub use runner::PendingRequest;
pub use session::{ConfirmAction, Session, SessionConfig};
pub use transport::{HttpClient, Transport};
pub use types::*;
pub use upload::{UploadState, UPLOAD_CHUNK_SIZE};
