//! Direct-URL downloads streamed to disk.
//!
//! - [`HttpClient`] abstracts the transport; [`ReqwestClient`] is the production one
//! - [`Fetcher`] writes the body chunk by chunk, reports [`Progress`] and removes
//!   the partial file when anything goes wrong

mod error;
mod fetcher;
mod http;
mod progress;

pub use error::{FetchError, Result};
pub use fetcher::{FALLBACK_FILE_NAME, Fetcher, file_name_from_url};
pub use http::{BoxStream, HttpBody, HttpClient};
pub use progress::{FetchOptions, FetchPhase, Progress, ProgressCallback};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
