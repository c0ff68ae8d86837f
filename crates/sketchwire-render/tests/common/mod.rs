#![allow(dead_code)]

use async_trait::async_trait;
use sketchwire_core::{DiagramType, DiagramTypeRegistry, Error, Result, Settings, SettingsStore};
use sketchwire_render::{
    LocalRenderer, RemoteClient, RemoteRequest, RemoteResponse, RenderSink, RenderedArtifact,
    Renderer,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "https://render.test";

pub fn svg(marker: &str) -> Vec<u8> {
    format!(r#"<svg width="40" height="20"><text>{marker}</text></svg>"#).into_bytes()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Clear,
    Loading(&'static str),
    Error(String),
    Svg(String),
    Png(Vec<u8>),
    Local(String),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SinkEvent> {
        self.events.lock().unwrap().last().cloned()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RenderSink for RecordingSink {
    fn clear(&self) {
        self.push(SinkEvent::Clear);
    }

    fn show_loading(&self, diagram_type: &DiagramType) {
        self.push(SinkEvent::Loading(diagram_type.id));
    }

    fn show_error(&self, error: &Error) {
        self.push(SinkEvent::Error(error.to_string()));
    }

    fn show_artifact(&self, artifact: RenderedArtifact) {
        self.push(match artifact {
            RenderedArtifact::Svg { svg, .. } => SinkEvent::Svg(svg.markup),
            RenderedArtifact::Png { bytes } => SinkEvent::Png(bytes),
            RenderedArtifact::Local { markup } => SinkEvent::Local(markup),
        });
    }
}

/// Replies with queued responses in order, each after its delay.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<(Duration, Result<RemoteResponse>)>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl ScriptedClient {
    pub fn reply(self, status: u16, body: Vec<u8>) -> Self {
        self.reply_after(Duration::ZERO, status, body)
    }

    pub fn reply_after(self, delay: Duration, status: u16, body: Vec<u8>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back((delay, Ok(RemoteResponse { status, body })));
        self
    }

    pub fn fail(self, err: Error) -> Self {
        self.script.lock().unwrap().push_back((Duration::ZERO, Err(err)));
        self
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        let (delay, result) =
            next.unwrap_or((Duration::ZERO, Err(Error::transport("no scripted response"))));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[derive(Default)]
pub struct CountingLocal {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LocalRenderer for CountingLocal {
    async fn render(&self, text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("<div class=\"local\">{text}</div>"))
    }
}

pub fn settings(f: impl FnOnce(&mut Settings)) -> Arc<SettingsStore> {
    let mut settings = Settings {
        render_base_url: BASE.to_string(),
        ..Settings::default()
    };
    f(&mut settings);
    SettingsStore::shared(settings)
}

pub fn renderer(settings: Arc<SettingsStore>, client: Arc<ScriptedClient>) -> Renderer {
    Renderer::new(
        Arc::new(DiagramTypeRegistry::with_defaults()),
        settings,
        client,
    )
}
