use reqwest::StatusCode;
use url::Url;

/// Upper bound for response bodies quoted in error messages.
const BODY_EXCERPT_LEN: usize = 512;

/// The provider could not be reached or answered with something unusable.
#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with {status}: {body}")]
    Status { url: Url, status: StatusCode, body: String },
    #[error("cannot decode response from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: serde_json::Error,
    },
    /// The listing kept advertising further pages past the limit. A partial
    /// listing could hide the application, so it is not returned.
    #[error("{url} is page {pages} of the listing and still links to a next page, giving up")]
    TooManyPages { url: Url, pages: usize },
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
    #[error("cannot set up the http client: {0}")]
    Setup(String),
}

impl RemoteError {
    pub(crate) fn status(url: Url, status: StatusCode, body: &str) -> Self {
        let body = match body.char_indices().nth(BODY_EXCERPT_LEN) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::Status { url, status, body }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The listing was fetched but contains no application with that name. This
    /// is a configuration problem rather than an outage.
    #[error("cannot find application with name: {name}")]
    NotFound { name: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
