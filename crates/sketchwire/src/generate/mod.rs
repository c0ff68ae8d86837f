//! Natural-language to diagram generation.
//!
//! A [`GenerationManager`] runs at most one streaming session at a time. Requests arriving while a
//! session is active wait in a single pending slot (the newest wins) and start once the active
//! session ends.

mod manager;
pub mod stream;

pub use manager::{GenerationManager, SubmitOutcome};
pub use stream::{LineDecoder, StreamRecord};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use sketchwire_core::{DiagramSource, Result};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationStatus {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }
}

/// JSON body posted to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationPayload {
    pub api_key: String,
    pub prompt: String,
    pub user_context: String,
    pub draw_tool_name: String,
    pub draw_type: String,
}

/// Opens the streaming generation call. Chunks are raw response bytes.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn open(&self, payload: GenerationPayload) -> Result<BoxStream<'static, Result<Vec<u8>>>>;
}

/// The editor buffer that receives generated code.
pub trait CodeBuffer: Send + Sync {
    fn code(&self) -> String;
    fn set_code(&self, code: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Completed,
    Failed(String),
}

/// User-facing notifications (toasts).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Requests one forced render of freshly generated code.
pub trait RenderTrigger: Send + Sync {
    fn render(&self, source: DiagramSource);
}

#[derive(Debug, Default)]
pub struct SharedBuffer {
    code: Mutex<String>,
}

impl SharedBuffer {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Mutex::new(code.into()),
        }
    }
}

impl CodeBuffer for SharedBuffer {
    fn code(&self) -> String {
        match self.code.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_code(&self, code: &str) {
        let mut guard = match self.code.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clear();
        guard.push_str(code);
    }
}

/// Reports notices through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Completed => tracing::info!("generation completed"),
            Notice::Failed(message) => tracing::warn!(%message, "generation failed"),
        }
    }
}
