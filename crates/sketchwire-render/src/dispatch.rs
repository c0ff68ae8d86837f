use crate::svg::{self, ProcessedSvg};
use crate::viewport::{Size, ViewportController};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use sketchwire_core::{
    DiagramSource, DiagramType, DiagramTypeRegistry, Encoder, Error, Result, SettingsStore,
    Transport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Output format requested from the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Svg,
    Png,
}

impl Format {
    pub fn path_segment(self) -> &'static str {
        match self {
            Format::Svg => "svg",
            Format::Png => "png",
        }
    }

    pub fn accept(self) -> &'static str {
        match self {
            Format::Svg => "image/svg+xml",
            Format::Png => "image/png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: Url,
    pub accept: &'static str,
    /// `Content-Type` of the body; `None` for GET.
    pub content_type: Option<&'static str>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs requests against the remote rendering service.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse>;
}

/// Renders a diagram type in-process, returning markup for direct display.
#[async_trait]
pub trait LocalRenderer: Send + Sync {
    async fn render(&self, text: &str) -> Result<String>;
}

/// Where rendered output is displayed. Each call replaces what was shown before.
pub trait RenderSink: Send + Sync {
    fn clear(&self);
    fn show_loading(&self, diagram_type: &DiagramType);
    fn show_error(&self, error: &Error);
    fn show_artifact(&self, artifact: RenderedArtifact);
}

#[derive(Debug)]
pub enum RenderedArtifact {
    Svg {
        svg: ProcessedSvg,
        viewport: Option<ViewportController>,
    },
    Png {
        bytes: Vec<u8>,
    },
    Local {
        markup: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPath {
    Local,
    Remote,
}

#[derive(Debug)]
pub enum RenderOutcome {
    Rendered { path: RenderPath },
    /// SVG failed with `error`; a PNG was shown instead.
    PngFallback { error: Error },
    Failed(Error),
    /// A newer render was dispatched before this one finished. The sink was not touched.
    Superseded,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Rendered { .. } | Self::PngFallback { .. })
    }
}

/// Builds the service URL for `diagram_type`.
///
/// GET: `{base}/{type}/{format}/{encoded}?t={timestamp}`. POST: `{base}/{type}/{format}/`.
pub fn remote_url(
    base: &str,
    diagram_type: &DiagramType,
    transport: &Transport,
    format: Format,
    timestamp_ms: i64,
) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|err| Error::configuration(format!("invalid render service URL {base:?}: {err}")))?;
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            Error::configuration(format!("render service URL {base:?} cannot be a base"))
        })?;
        segments
            .pop_if_empty()
            .push(diagram_type.remote_type)
            .push(format.path_segment());
        match transport {
            Transport::Path(encoded) => segments.push(encoded),
            Transport::Body(_) => segments.push(""),
        };
    }
    url.set_query(None);
    if let Transport::Path(_) = transport {
        url.query_pairs_mut()
            .append_pair("t", &timestamp_ms.to_string());
    }
    Ok(url)
}

pub fn remote_request(
    base: &str,
    diagram_type: &DiagramType,
    transport: &Transport,
    format: Format,
) -> Result<RemoteRequest> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let url = remote_url(base, diagram_type, transport, format, timestamp)?;
    Ok(match transport {
        Transport::Path(_) => RemoteRequest {
            method: Method::Get,
            url,
            accept: format.accept(),
            content_type: None,
            body: None,
        },
        Transport::Body(text) => RemoteRequest {
            method: Method::Post,
            url,
            accept: format.accept(),
            content_type: Some(diagram_type.content_type),
            body: Some(text.clone()),
        },
    })
}

/// Chooses between local and remote rendering and drives a [`RenderSink`].
///
/// Calls are numbered; when an older call finishes after a newer one was dispatched, its result
/// is dropped so the sink always reflects the latest request.
pub struct Renderer {
    registry: Arc<DiagramTypeRegistry>,
    encoder: Encoder,
    settings: Arc<SettingsStore>,
    remote: Arc<dyn RemoteClient>,
    local: FxHashMap<String, Arc<dyn LocalRenderer>>,
    viewport_size: Size,
    latest: AtomicU64,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("encoder", &self.encoder)
            .field("local", &self.local.keys().collect::<Vec<_>>())
            .field("latest", &self.latest.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(
        registry: Arc<DiagramTypeRegistry>,
        settings: Arc<SettingsStore>,
        remote: Arc<dyn RemoteClient>,
    ) -> Self {
        Self {
            registry,
            encoder: Encoder::default(),
            settings,
            remote,
            local: FxHashMap::default(),
            viewport_size: Size::new(800.0, 600.0),
            latest: AtomicU64::new(0),
        }
    }

    pub fn with_encoder(mut self, encoder: Encoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_local_renderer(
        mut self,
        diagram_type: impl Into<String>,
        renderer: Arc<dyn LocalRenderer>,
    ) -> Self {
        self.local.insert(diagram_type.into(), renderer);
        self
    }

    /// Initial viewport size for interactive controllers on rendered SVG.
    pub fn with_viewport_size(mut self, size: Size) -> Self {
        self.viewport_size = size;
        self
    }

    pub fn registry(&self) -> &DiagramTypeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Sequence number of the most recently dispatched call.
    pub fn latest_sequence(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    fn is_current(&self, seq: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == seq
    }

    pub async fn render(&self, source: &DiagramSource, sink: &dyn RenderSink) -> RenderOutcome {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        sink.clear();

        let diagram_type = match self.registry.lookup(&source.diagram_type) {
            Ok(t) => t,
            Err(err) => {
                sink.show_error(&err);
                return RenderOutcome::Failed(err);
            }
        };
        sink.show_loading(diagram_type);

        let settings = self.settings.snapshot();
        let local = (!settings.force_remote && diagram_type.local_render)
            .then(|| self.local.get(diagram_type.id))
            .flatten();

        let outcome = match local {
            Some(local) => {
                tracing::debug!(seq, diagram_type = diagram_type.id, "rendering locally");
                let result = local.render(&source.text).await;
                if !self.is_current(seq) {
                    return self.superseded(seq);
                }
                match result {
                    Ok(markup) => {
                        sink.show_artifact(RenderedArtifact::Local { markup });
                        RenderOutcome::Rendered {
                            path: RenderPath::Local,
                        }
                    }
                    Err(err) => {
                        sink.show_error(&err);
                        RenderOutcome::Failed(err)
                    }
                }
            }
            None => {
                self.render_remote(seq, source, diagram_type, &settings.render_base_url, sink)
                    .await
            }
        };

        match &outcome {
            RenderOutcome::Failed(err) => {
                tracing::warn!(seq, diagram_type = diagram_type.id, error = %err, "render failed")
            }
            RenderOutcome::PngFallback { error } => {
                tracing::info!(seq, diagram_type = diagram_type.id, error = %error, "rendered PNG fallback")
            }
            _ => {}
        }
        outcome
    }

    async fn render_remote(
        &self,
        seq: u64,
        source: &DiagramSource,
        diagram_type: &DiagramType,
        base: &str,
        sink: &dyn RenderSink,
    ) -> RenderOutcome {
        let request = self
            .encoder
            .encode(&source.text, diagram_type)
            .and_then(|transport| {
                Ok((
                    remote_request(base, diagram_type, &transport, Format::Svg)?,
                    transport,
                ))
            });
        let (request, transport) = match request {
            Ok(pair) => pair,
            Err(err) => {
                sink.show_error(&err);
                return RenderOutcome::Failed(err);
            }
        };

        tracing::debug!(seq, diagram_type = diagram_type.id, url = %request.url, "rendering remotely");
        let result = self.fetch_svg(request, diagram_type).await;
        if !self.is_current(seq) {
            return self.superseded(seq);
        }

        let error = match result {
            Ok(svg) => {
                let viewport = svg.view_box.and_then(|vb| {
                    ViewportController::for_type(diagram_type, Size::from(vb), self.viewport_size)
                });
                sink.show_artifact(RenderedArtifact::Svg { svg, viewport });
                return RenderOutcome::Rendered {
                    path: RenderPath::Remote,
                };
            }
            Err(err) => err,
        };

        sink.show_error(&error);
        if !error.allows_png_fallback() {
            return RenderOutcome::Failed(error);
        }

        let result = match remote_request(base, diagram_type, &transport, Format::Png) {
            Ok(request) => self.fetch(request).await,
            Err(err) => Err(err),
        };
        if !self.is_current(seq) {
            return self.superseded(seq);
        }
        match result {
            Ok(bytes) => {
                sink.clear();
                sink.show_artifact(RenderedArtifact::Png { bytes });
                RenderOutcome::PngFallback { error }
            }
            Err(fallback_err) => {
                sink.clear();
                sink.show_error(&fallback_err);
                RenderOutcome::Failed(fallback_err)
            }
        }
    }

    async fn fetch(&self, request: RemoteRequest) -> Result<Vec<u8>> {
        let response = self.remote.send(request).await?;
        if !response.is_success() {
            let detail = String::from_utf8_lossy(&response.body);
            let detail = detail.trim();
            return Err(Error::http_status(
                response.status,
                detail.chars().take(200).collect::<String>(),
            ));
        }
        Ok(response.body)
    }

    async fn fetch_svg(&self, request: RemoteRequest, diagram_type: &DiagramType) -> Result<ProcessedSvg> {
        let body = self.fetch(request).await?;
        let text = String::from_utf8(body)
            .map_err(|err| Error::malformed(format!("SVG is not UTF-8: {err}")))?;
        svg::process(&text, diagram_type)
    }

    fn superseded(&self, seq: u64) -> RenderOutcome {
        tracing::debug!(seq, latest = self.latest_sequence(), "discarding stale render");
        RenderOutcome::Superseded
    }
}
