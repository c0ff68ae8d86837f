//! `reqwest` transports for the rendering service, the generation backend and prompt templates.

use crate::generate::{GenerationBackend, GenerationPayload};
use async_trait::async_trait;
use futures::StreamExt as _;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sketchwire_core::{Error, PromptCatalog, PromptSource, Result};
use sketchwire_render::{Method, RemoteClient, RemoteRequest, RemoteResponse};
use url::Url;

fn transport_error(err: reqwest::Error) -> Error {
    match err.status() {
        Some(status) => Error::http_status(status.as_u16(), err.to_string()),
        None => Error::transport(err.to_string()),
    }
}

fn status_error(status: reqwest::StatusCode) -> Error {
    Error::http_status(status.as_u16(), status.canonical_reason().unwrap_or("unexpected status"))
}

/// Resolves a possibly relative endpoint (`/api/nl-draw`) against `origin`.
pub fn resolve_endpoint(endpoint: &str, origin: Option<&str>) -> Result<Url> {
    match Url::parse(endpoint) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let origin = origin.ok_or_else(|| {
                Error::configuration(format!(
                    "endpoint {endpoint:?} is relative; a server origin is required"
                ))
            })?;
            Url::parse(origin)
                .and_then(|base| base.join(endpoint))
                .map_err(|err| Error::configuration(format!("invalid server origin {origin:?}: {err}")))
        }
        Err(err) => Err(Error::configuration(format!("invalid endpoint {endpoint:?}: {err}"))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpRemoteClient {
    client: Client,
}

impl HttpRemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        tracing::debug!(method = ?request.method, url = %request.url, "render service request");
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        }
        .header(ACCEPT, request.accept);
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();
        tracing::debug!(status, bytes = body.len(), "render service response");
        Ok(RemoteResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct HttpGenerationBackend {
    client: Client,
    endpoint: Url,
}

impl HttpGenerationBackend {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn open(&self, payload: GenerationPayload) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        tracing::debug!(
            endpoint = %self.endpoint,
            draw_tool_name = %payload.draw_tool_name,
            draw_type = %payload.draw_type,
            "opening generation stream"
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport_error))
            .boxed())
    }
}

#[derive(Debug, Clone)]
pub struct HttpPromptSource {
    client: Client,
    url: Url,
}

impl HttpPromptSource {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub fn with_client(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl PromptSource for HttpPromptSource {
    async fn fetch(&self) -> Result<PromptCatalog> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }
        let text = response.text().await.map_err(transport_error)?;
        PromptCatalog::from_json_str(&text)
    }
}
