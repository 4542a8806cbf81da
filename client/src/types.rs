use serde::{
    Deserialize,
    Serialize,
};

/// Body of `GET applications.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationList {
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// An APM application as reported by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub language: String,
    /// `green`, `orange`, `red`, `gray` or `unknown`.
    #[serde(default)]
    pub health_status: String,
    /// Applications that never reported data come without a summary.
    #[serde(default)]
    pub application_summary: ApplicationSummary,
    #[serde(default)]
    pub end_user_summary: EndUserSummary,
}

/// Point-in-time health indicators of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSummary {
    /// Average response time in milliseconds.
    pub response_time: f64,
    /// Requests per minute.
    pub throughput: f64,
    pub error_rate: f64,
    pub apdex_target: f64,
    pub apdex_score: f64,
    pub host_count: f64,
    pub instance_count: f64,
}

/// Browser (real user monitoring) view of the same application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndUserSummary {
    pub response_time: f64,
    pub throughput: f64,
    pub apdex_target: f64,
    pub apdex_score: f64,
}

/// Parameters of a deployment marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub revision: String,
    #[serde(default)]
    pub changelog: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user: String,
}

/// Request envelope for `POST applications/{id}/deployments.json`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeploymentInput<'a> {
    pub deployment: &'a Deployment,
}
