use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::Result;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// An opened GET response: the declared length and the body still to be read.
pub struct HttpBody {
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

/// Asynchronous HTTP client abstraction.
///
/// Implementations follow redirects, apply their own connect timeout and turn
/// non-success statuses into [`FetchError::HttpStatus`](crate::FetchError::HttpStatus).
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpBody>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;
    use crate::error::FetchError;

    /// Production HTTP client implementation using reqwest.
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Only the connect phase is bounded; large bodies may take as long as they need.
        pub fn new(connect_timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(FetchError::network)?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        async fn get(&self, url: &str) -> Result<HttpBody> {
            let response = self.client.get(url).send().await.map_err(FetchError::network)?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_length = response.content_length();
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(FetchError::network));
            Ok(HttpBody {
                content_length,
                stream: Box::pin(stream),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
