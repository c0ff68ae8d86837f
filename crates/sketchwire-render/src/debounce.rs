use crate::dispatch::{RenderSink, Renderer};
use sketchwire_core::{DiagramSource, RenderMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Collapses bursts of render requests into one render of the latest source.
///
/// Each request restarts the timer; when it fires, only the most recent request renders. Must be
/// used from within a tokio runtime.
#[derive(Clone)]
pub struct AutoRenderer {
    renderer: Arc<Renderer>,
    sink: Arc<dyn RenderSink>,
    ticket: Arc<AtomicU64>,
}

impl std::fmt::Debug for AutoRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoRenderer")
            .field("renderer", &self.renderer)
            .field("ticket", &self.ticket.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl AutoRenderer {
    pub fn new(renderer: Arc<Renderer>, sink: Arc<dyn RenderSink>) -> Self {
        Self {
            renderer,
            sink,
            ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn renderer(&self) -> &Arc<Renderer> {
        &self.renderer
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.renderer.settings().snapshot().debounce_ms)
    }

    /// Schedules a render after an edit. Ignored unless auto-render is on and
    /// natural-language drawing is off. Returns whether a render was scheduled.
    pub fn on_source_changed(&self, source: DiagramSource) -> bool {
        self.request(source, RenderMode::Auto)
    }

    pub fn request(&self, source: DiagramSource, mode: RenderMode) -> bool {
        if mode == RenderMode::Auto && !self.renderer.settings().snapshot().renders_on_edit() {
            tracing::trace!(diagram_type = %source.diagram_type, "auto-render disabled; edit ignored");
            return false;
        }

        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.delay();
        let latest = Arc::clone(&self.ticket);
        let renderer = Arc::clone(&self.renderer);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if latest.load(Ordering::SeqCst) != ticket {
                return;
            }
            tracing::debug!(ticket, ?mode, diagram_type = %source.diagram_type, "debounce elapsed");
            renderer.render(&source, sink.as_ref()).await;
        });
        true
    }

    /// Drops any scheduled render that has not fired yet.
    pub fn cancel_pending(&self) {
        self.ticket.fetch_add(1, Ordering::SeqCst);
    }
}
