#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt as _;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use sketchwire::generate::{
    CodeBuffer, GenerationBackend, GenerationPayload, Notice, Notifier, RenderTrigger,
};
use sketchwire::{DiagramSource, Error, Result};
use std::sync::{Arc, Mutex};

pub type Chunk = Result<Vec<u8>>;

/// Shared, ordered log of what happened across fakes.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct DropLog(Journal, String);

impl Drop for DropLog {
    fn drop(&mut self) {
        self.0.push(format!("drop {}", self.1));
    }
}

/// Each `open` returns a stream fed by a channel the test controls.
#[derive(Default)]
pub struct ChannelBackend {
    pub journal: Journal,
    payloads: Mutex<Vec<GenerationPayload>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<Chunk>>>,
    refuse_with: Mutex<Option<Error>>,
}

impl ChannelBackend {
    pub fn refusing(err: Error) -> Self {
        let this = Self::default();
        *this.refuse_with.lock().unwrap() = Some(err);
        this
    }

    pub fn payloads(&self) -> Vec<GenerationPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn opens(&self) -> Vec<String> {
        self.payloads().into_iter().map(|p| p.user_context).collect()
    }

    /// Sends `text` on the stream of the `n`th open.
    pub fn send(&self, n: usize, text: &str) {
        let senders = self.senders.lock().unwrap();
        senders[n]
            .unbounded_send(Ok(text.as_bytes().to_vec()))
            .unwrap();
    }

    pub fn send_err(&self, n: usize, err: Error) {
        let senders = self.senders.lock().unwrap();
        senders[n].unbounded_send(Err(err)).unwrap();
    }

    /// Ends the stream of the `n`th open.
    pub fn close(&self, n: usize) {
        self.senders.lock().unwrap()[n].close_channel();
    }
}

#[async_trait]
impl GenerationBackend for ChannelBackend {
    async fn open(&self, payload: GenerationPayload) -> Result<BoxStream<'static, Chunk>> {
        if let Some(err) = self.refuse_with.lock().unwrap().take() {
            return Err(err);
        }
        let name = payload.user_context.clone();
        self.journal.push(format!("open {name}"));
        self.payloads.lock().unwrap().push(payload);

        let (tx, rx) = mpsc::unbounded();
        self.senders.lock().unwrap().push(tx);
        let guard = DropLog(self.journal.clone(), name);
        Ok(rx
            .map(move |chunk| {
                let _ = &guard;
                chunk
            })
            .boxed())
    }
}

#[derive(Default)]
pub struct RecordingBuffer {
    history: Mutex<Vec<String>>,
}

impl RecordingBuffer {
    pub fn with_code(code: &str) -> Self {
        Self {
            history: Mutex::new(vec![code.to_string()]),
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl CodeBuffer for RecordingBuffer {
    fn code(&self) -> String {
        self.history.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn set_code(&self, code: &str) {
        self.history.lock().unwrap().push(code.to_string());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
pub struct RecordingTrigger {
    renders: Mutex<Vec<DiagramSource>>,
}

impl RecordingTrigger {
    pub fn renders(&self) -> Vec<DiagramSource> {
        self.renders.lock().unwrap().clone()
    }
}

impl RenderTrigger for RecordingTrigger {
    fn render(&self, source: DiagramSource) {
        self.renders.lock().unwrap().push(source);
    }
}

/// Yields to spawned tasks until `cond` holds.
pub async fn until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
