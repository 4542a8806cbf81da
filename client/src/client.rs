use crate::{
    error::{
        ClientError,
        RemoteError,
    },
    types::{
        Application,
        ApplicationList,
        Deployment,
        DeploymentInput,
    },
};
use reqwest::{
    blocking::{
        Client,
        RequestBuilder,
        Response,
    },
    header::{
        HeaderMap,
        HeaderValue,
        CONTENT_TYPE,
        LINK,
    },
    Method,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
};
use std::{
    fmt,
    time::Duration,
};
use tracing::{
    debug,
    instrument,
    warn,
};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.newrelic.com/v2/";

const API_KEY_HEADER: &str = "X-Api-Key";

/// Guards against `next` links that never end.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Source of application records. [`NewRelicClient`] is the real one, tests
/// substitute their own.
pub trait ApplicationSource: Send {
    /// Every application visible to the API key, in provider order.
    fn list_applications(&self) -> Result<Vec<Application>, RemoteError>;

    /// First application whose name matches exactly.
    fn find_application_by_name(&self, name: &str) -> Result<Application, ClientError> {
        self.list_applications()?
            .into_iter()
            .find(|app| app.name == name)
            .ok_or_else(|| ClientError::NotFound { name: name.to_string() })
    }
}

/// The REST API key. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn header_value(&self) -> Result<HeaderValue, RemoteError> {
        let mut value = HeaderValue::from_str(self.0.trim())
            .map_err(|_| RemoteError::Setup("the api key contains characters not allowed in a header".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

#[derive(Debug)]
pub struct NewRelicClientBuilder {
    api_key: ApiKey,
    base_url: Option<Url>,
    timeout: Duration,
    connect_timeout: Duration,
    max_pages: usize,
}

impl NewRelicClientBuilder {
    /// Defaults to [`DEFAULT_BASE_URL`].
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Total time allowed for a single request, body included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capped at the request timeout.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Listings longer than this fail with [`RemoteError::TooManyPages`].
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn build(self) -> Result<NewRelicClient, RemoteError> {
        let mut base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL)?,
        };
        // `Url::join` drops the last segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout.min(self.timeout))
            .build()
            .map_err(|err| RemoteError::Setup(err.to_string()))?;

        Ok(NewRelicClient {
            http,
            api_key: self.api_key.header_value()?,
            base_url,
            max_pages: self.max_pages,
        })
    }
}

/// Blocking client for the New Relic REST API v2. No caching, no retries:
/// every call is a fresh round trip.
#[derive(Clone)]
pub struct NewRelicClient {
    http: Client,
    api_key: HeaderValue,
    base_url: Url,
    max_pages: usize,
}

impl fmt::Debug for NewRelicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewRelicClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl NewRelicClient {
    pub fn builder(api_key: ApiKey) -> NewRelicClientBuilder {
        NewRelicClientBuilder {
            api_key,
            base_url: None,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Attaches a deployment marker to the application's timeline.
    #[instrument(skip(self, deployment), fields(revision = %deployment.revision))]
    pub fn record_deployment(&self, application_id: i64, deployment: &Deployment) -> Result<(), RemoteError> {
        let url = self
            .base_url
            .join(&format!("applications/{application_id}/deployments.json"))?;
        let request = self
            .request(Method::POST, url.clone())
            .json(&DeploymentInput { deployment });
        let response = send(request, &url)?;
        debug!(status = %response.status(), "recorded deployment");
        Ok(())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, self.api_key.clone())
            .header(CONTENT_TYPE, "application/json")
    }
}

impl ApplicationSource for NewRelicClient {
    #[instrument(skip(self))]
    fn list_applications(&self) -> Result<Vec<Application>, RemoteError> {
        let mut applications = Vec::new();
        let mut next = Some(self.base_url.join("applications.json")?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            let response = send(self.request(Method::GET, url.clone()), &url)?;
            next = next_page(response.headers(), &url).filter(|next| *next != url);
            let page: ApplicationList = decode(response, &url)?;
            applications.extend(page.applications);

            if next.is_some() && pages >= self.max_pages {
                warn!(pages, "giving up on the application listing, too many pages");
                return Err(RemoteError::TooManyPages { url, pages });
            }
        }

        debug!(pages, count = applications.len(), "listed applications");
        Ok(applications)
    }
}

fn send(request: RequestBuilder, url: &Url) -> Result<Response, RemoteError> {
    debug!(%url, "sending request");
    let response = request.send().map_err(|source| RemoteError::Transport {
        url: url.clone(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(RemoteError::status(url.clone(), status, &body));
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T, RemoteError> {
    let body = response.text().map_err(|source| RemoteError::Transport {
        url: url.clone(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| RemoteError::Decode {
        url: url.clone(),
        source,
    })
}

/// Target of the `rel="next"` entry of an RFC 8288 `Link` header, resolved
/// against the url of the current page.
fn next_page(headers: &HeaderMap, current: &Url) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let mut parts = link.split(';');
            let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
            let is_next = parts.any(|param| {
                let param = param.trim();
                param == r#"rel="next""# || param == "rel=next"
            });
            is_next.then(|| current.join(target).ok()).flatten()
        })
}
