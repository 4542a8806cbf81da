use axum::{
    http::StatusCode,
    response::{
        IntoResponse,
        Response,
    },
};
use newrelic_client::ClientError;

/// Why a scrape produced no samples.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("cannot build metric: {0}")]
    Metric(#[from] prometheus::Error),
}

impl ScrapeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScrapeError::Client(err) if err.is_not_found())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Encoding the metrics failed: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("The metrics are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Gathering the metrics did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self, "scrape request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
