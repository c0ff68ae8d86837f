//! Renders PlantUML through a PlantUML server instead of the generic rendering service.
//!
//! The server takes the diagram in PlantUML's own path encoding
//! (`{base}/svg/{encoded}`). When the SVG request fails the PNG endpoint is tried once, and
//! the image is returned inline as a data URI.

use crate::dispatch::{Format, LocalRenderer, Method, RemoteClient, RemoteRequest};
use crate::svg;
use async_trait::async_trait;
use base64::Engine as _;
use sketchwire_core::{DiagramType, DiagramTypeRegistry, Error, Result, plantuml_encode};
use std::sync::Arc;
use url::Url;

pub const PLANTUML_SERVER: &str = "https://www.plantuml.com/plantuml";

pub struct PlantUmlServer {
    base: Url,
    diagram_type: DiagramType,
    client: Arc<dyn RemoteClient>,
}

impl std::fmt::Debug for PlantUmlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlantUmlServer")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl PlantUmlServer {
    /// A renderer for the public server.
    pub fn new(client: Arc<dyn RemoteClient>) -> Result<Self> {
        Self::with_base(PLANTUML_SERVER, client)
    }

    pub fn with_base(base: &str, client: Arc<dyn RemoteClient>) -> Result<Self> {
        let base = Url::parse(base).map_err(|err| {
            Error::configuration(format!("invalid PlantUML server URL {base:?}: {err}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "PlantUML server URL {base} cannot be a base"
            )));
        }
        let diagram_type = DiagramTypeRegistry::with_defaults().lookup("plantuml")?.clone();
        Ok(Self {
            base,
            diagram_type,
            client,
        })
    }

    /// `{base}/{format}/{encoded}?t={timestamp_ms}`.
    pub fn url(&self, encoded: &str, format: Format, timestamp_ms: i64) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(format.path_segment())
                .push(encoded);
        }
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("t", &timestamp_ms.to_string());
        url
    }

    async fn fetch(&self, encoded: &str, format: Format) -> Result<Vec<u8>> {
        let request = RemoteRequest {
            method: Method::Get,
            url: self.url(encoded, format, chrono::Utc::now().timestamp_millis()),
            accept: format.accept(),
            content_type: None,
            body: None,
        };
        tracing::debug!(url = %request.url, "PlantUML server request");
        let response = self.client.send(request).await?;
        if !response.is_success() {
            return Err(Error::http_status(
                response.status,
                format!("PlantUML server returned {}", response.status),
            ));
        }
        Ok(response.body)
    }

    async fn render_svg(&self, encoded: &str) -> Result<String> {
        let body = self.fetch(encoded, Format::Svg).await?;
        let text = String::from_utf8(body)
            .map_err(|err| Error::malformed(format!("SVG is not UTF-8: {err}")))?;
        Ok(svg::process(&text, &self.diagram_type)?.markup)
    }
}

#[async_trait]
impl LocalRenderer for PlantUmlServer {
    async fn render(&self, text: &str) -> Result<String> {
        let encoded = plantuml_encode(text)?;
        let error = match self.render_svg(&encoded).await {
            Ok(markup) => return Ok(markup),
            Err(err) if err.allows_png_fallback() => err,
            Err(err) => return Err(err),
        };

        tracing::info!(error = %error, "PlantUML SVG failed, trying PNG");
        let png = self.fetch(&encoded, Format::Png).await?;
        Ok(format!(
            r#"<img src="data:image/png;base64,{}" alt="PlantUML diagram">"#,
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}
