//! reqwest bindings for the control plane and object store.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sxflow_resource::TransformRequest;
use url::Url;

use crate::{
    BoxStream, ControlPlane, ObjectStore, RemoteError, RemoteObject, Result, StatusReport,
    TransformStatus,
};

/// A named service endpoint with optional bearer credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name:  String,
    pub url:   String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Deadline for one control-plane or signing request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client shared by every request to one endpoint.
///
/// Only connection setup and gaps between reads are bounded here, so long
/// artifact downloads are not cut off. Whole-request deadlines are applied
/// per call by the control plane and the signing requests.
pub fn build_client(
    connect_timeout: Duration,
    read_timeout: Duration,
    max_idle_per_host: usize,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .pool_max_idle_per_host(max_idle_per_host)
        .build()
        .map_err(|e| RemoteError::Config(e.to_string()))
}

#[derive(Debug, Clone)]
struct Api {
    client:  reqwest::Client,
    base:    Url,
    token:   Option<String>,
    timeout: Duration,
}

impl Api {
    fn new(endpoint: &Endpoint, client: reqwest::Client) -> Result<Self> {
        let base = Url::parse(&endpoint.url)
            .map_err(|e| RemoteError::Config(format!("{}: {e}", endpoint.url)))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Config(format!("{} cannot be a base URL", endpoint.url)));
        }
        Ok(Self {
            client,
            base,
            token: endpoint.token.clone(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Config(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.prepare(self.client.get(url))
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.prepare(self.client.post(url))
    }

    /// A signed download. No credentials and no whole-request deadline.
    fn download(&self, signed: &str) -> reqwest::RequestBuilder { self.client.get(signed) }

    fn prepare(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Protocol(e.to_string())
    } else {
        RemoteError::Transient(e.to_string())
    }
}

/// Map a non-success HTTP status to an error.
pub(crate) fn classify(status: u16, what: &str, body: &str) -> RemoteError {
    match status {
        404 => RemoteError::NotFound(what.to_string()),
        408 | 500..=599 => RemoteError::Transient(format!("{what}: HTTP {status}")),
        _ => RemoteError::Rejected {
            status,
            message: if body.trim().is_empty() {
                what.to_string()
            } else {
                body.trim().to_string()
            },
        },
    }
}

async fn checked(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify(status.as_u16(), what, &body))
}

pub struct HttpControlPlane {
    api: Api,
}

impl HttpControlPlane {
    pub fn new(endpoint: &Endpoint, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            api: Api::new(endpoint, client)?,
        })
    }

    /// Deadline for each API request. Defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.api.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    request_id: String,
}

impl ControlPlane for HttpControlPlane {
    async fn submit(&self, request: &TransformRequest) -> Result<String> {
        let url = self.api.url(&["servicex", "transformation"])?;
        let response = self
            .api
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let body: SubmitResponse = checked(response, "submit transform")
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(body.request_id)
    }

    async fn status(&self, transform_id: &str) -> Result<TransformStatus> {
        let url = self.api.url(&["servicex", "transformation", transform_id])?;
        let response = self.api.get(url).send().await.map_err(transport)?;
        let what = format!("transform {transform_id}");
        let report: StatusReport = checked(response, &what)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(report.into_status(transform_id))
    }

    async fn code_generators(&self) -> Result<BTreeMap<String, String>> {
        let url = self.api.url(&["multiple-codegen-list"])?;
        let response = self.api.get(url).send().await.map_err(transport)?;
        checked(response, "code generator list")
            .await?
            .json()
            .await
            .map_err(transport)
    }
}

pub struct HttpObjectStore {
    api: Api,
}

impl HttpObjectStore {
    pub fn new(endpoint: &Endpoint, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            api: Api::new(endpoint, client)?,
        })
    }

    /// Deadline for each API request. Defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.api.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

impl ObjectStore for HttpObjectStore {
    async fn list(&self, transform_id: &str) -> Result<Vec<RemoteObject>> {
        let url = self
            .api
            .url(&["servicex", "transformation", transform_id, "results"])?;
        let response = self.api.get(url).send().await.map_err(transport)?;
        let what = format!("results of {transform_id}");
        checked(response, &what).await?.json().await.map_err(transport)
    }

    async fn fetch(
        &self,
        transform_id: &str,
        object: &RemoteObject,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let signed = self.sign(transform_id, object).await?;
        let response = self
            .api
            .download(&signed)
            .send()
            .await
            .map_err(transport)?;
        let response = checked(response, &object.name).await?;
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(transport));
        Ok(Box::pin(stream))
    }

    async fn sign(&self, transform_id: &str, object: &RemoteObject) -> Result<String> {
        let url = self.api.url(&[
            "servicex",
            "transformation",
            transform_id,
            "results",
            &object.name,
            "url",
        ])?;
        let response = self.api.get(url).send().await.map_err(transport)?;
        let body: SignedUrl = checked(response, &object.name)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(body.url)
    }
}
