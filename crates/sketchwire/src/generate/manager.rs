use super::stream::{LineDecoder, StreamRecord};
use super::{
    CodeBuffer, GenerationBackend, GenerationPayload, GenerationStatus, Notice, Notifier,
    RenderTrigger,
};
use futures::StreamExt as _;
use futures::future::{AbortHandle, AbortRegistration, Abortable};
use sketchwire_core::prompt::{PromptSource, load_catalog};
use sketchwire_core::{DiagramSource, Error, GenerationRequest, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

const DECODE_FAILURE_NOTICE: &str = "could not decode the generation response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new session was started.
    Started(Uuid),
    /// A session is active; the request waits in the pending slot, replacing any earlier one.
    Queued,
    /// The active session was aborted; the request starts once the abort lands.
    Superseding,
}

struct ActiveSession {
    id: Uuid,
    abort: AbortHandle,
}

#[derive(Default)]
struct State {
    active: Option<ActiveSession>,
    pending: Option<GenerationRequest>,
}

/// How a session ended.
enum Terminal {
    Completed,
    Aborted,
    Failed(Error),
}

struct Inner {
    backend: Arc<dyn GenerationBackend>,
    prompts: Arc<dyn PromptSource>,
    buffer: Arc<dyn CodeBuffer>,
    notifier: Arc<dyn Notifier>,
    trigger: Arc<dyn RenderTrigger>,
    state: Mutex<State>,
    status: watch::Sender<GenerationStatus>,
}

/// Single-flight, cancellable generation sessions with a one-slot queue.
///
/// Sessions run as tokio tasks, so `submit`, `supersede` and `cancel` must be called from within
/// a tokio runtime. Shared state sits behind a `std::sync::Mutex` that is never held across an
/// await point.
#[derive(Clone)]
pub struct GenerationManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GenerationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl GenerationManager {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        prompts: Arc<dyn PromptSource>,
        buffer: Arc<dyn CodeBuffer>,
        notifier: Arc<dyn Notifier>,
        trigger: Arc<dyn RenderTrigger>,
    ) -> Self {
        let (status, _) = watch::channel(GenerationStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                backend,
                prompts,
                buffer,
                notifier,
                trigger,
                state: Mutex::new(State::default()),
                status,
            }),
        }
    }

    pub fn status(&self) -> GenerationStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationStatus> {
        self.inner.status.subscribe()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// Starts a session, or parks `request` in the pending slot if one is active.
    pub fn submit(&self, request: GenerationRequest) -> Result<SubmitOutcome> {
        request.validate()?;
        let mut state = self.inner.lock();
        if state.active.is_some() {
            tracing::debug!(diagram_type = %request.diagram_type, "generation queued");
            state.pending = Some(request);
            return Ok(SubmitOutcome::Queued);
        }
        let id = self.inner.start(&mut state, request);
        Ok(SubmitOutcome::Started(id))
    }

    /// Replaces the active session with `request`.
    ///
    /// The active session is aborted and `request` starts from its Aborted transition, so the old
    /// stream is always torn down before the new one opens.
    pub fn supersede(&self, request: GenerationRequest) -> Result<SubmitOutcome> {
        request.validate()?;
        let mut state = self.inner.lock();
        if state.active.is_none() {
            let id = self.inner.start(&mut state, request);
            return Ok(SubmitOutcome::Started(id));
        }
        if let Some(active) = state.active.as_ref() {
            tracing::debug!(session = %active.id, "superseding generation");
            active.abort.abort();
        }
        state.pending = Some(request);
        Ok(SubmitOutcome::Superseding)
    }

    /// Clears the pending slot and aborts the active session. Returns whether a session was
    /// active.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.lock();
        state.pending = None;
        match state.active.as_ref() {
            Some(active) => {
                tracing::debug!(session = %active.id, "cancelling generation");
                active.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Resolves once no session is active and nothing is pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|s| *s == GenerationStatus::Idle).await;
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, status: GenerationStatus) {
        self.status.send_replace(status);
    }

    /// Records a new active session and spawns its task. Caller holds the state lock.
    fn start(self: &Arc<Self>, state: &mut State, request: GenerationRequest) -> Uuid {
        let (id, registration) = self.activate(state);
        tokio::spawn(Arc::clone(self).run(id, request, registration));
        id
    }

    fn activate(&self, state: &mut State) -> (Uuid, AbortRegistration) {
        let (abort, registration) = AbortHandle::new_pair();
        let id = Uuid::new_v4();
        state.active = Some(ActiveSession { id, abort });
        self.publish(GenerationStatus::Requesting);
        (id, registration)
    }

    /// Runs sessions back to back until the pending slot is empty.
    async fn run(
        self: Arc<Self>,
        mut id: Uuid,
        mut request: GenerationRequest,
        mut registration: AbortRegistration,
    ) {
        loop {
            tracing::info!(session = %id, diagram_type = %request.diagram_type, "generation started");
            let terminal = Abortable::new(self.drive(&request), registration)
                .await
                .unwrap_or(Terminal::Aborted);
            self.report(id, terminal);

            let next = {
                let mut state = self.lock();
                match state.pending.take() {
                    Some(next) => {
                        let (next_id, next_registration) = self.activate(&mut state);
                        Some((next_id, next, next_registration))
                    }
                    None => {
                        state.active = None;
                        self.publish(GenerationStatus::Idle);
                        None
                    }
                }
            };
            match next {
                Some((next_id, next, next_registration)) => {
                    id = next_id;
                    request = next;
                    registration = next_registration;
                }
                None => break,
            }
        }
    }

    fn report(&self, id: Uuid, terminal: Terminal) {
        match terminal {
            Terminal::Completed => {
                tracing::info!(session = %id, "generation completed");
                self.publish(GenerationStatus::Completed);
                self.notifier.notify(Notice::Completed);
            }
            Terminal::Aborted => {
                tracing::debug!(session = %id, "generation aborted");
                self.publish(GenerationStatus::Aborted);
            }
            Terminal::Failed(err) => {
                tracing::warn!(session = %id, error = %err, "generation failed");
                self.publish(GenerationStatus::Failed);
                let message = match err {
                    Error::Decode { .. } => DECODE_FAILURE_NOTICE.to_string(),
                    other => other.to_string(),
                };
                self.notifier.notify(Notice::Failed(message));
            }
        }
    }

    async fn drive(&self, request: &GenerationRequest) -> Terminal {
        let catalog = load_catalog(self.prompts.as_ref()).await;
        let payload = GenerationPayload {
            api_key: request.api_key.clone(),
            prompt: catalog.build_prompt(request),
            user_context: request.prompt_context.clone(),
            draw_tool_name: request.diagram_type.clone(),
            draw_type: request.draw_type().to_string(),
        };

        let mut stream = match self.backend.open(payload).await {
            Ok(stream) => stream,
            Err(err) => return Terminal::Failed(err),
        };
        self.publish(GenerationStatus::Streaming);

        let mut decoder = LineDecoder::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return Terminal::Failed(err),
            };
            for line in decoder.push(&chunk) {
                if let Some(terminal) = self.apply(&line, request) {
                    return terminal;
                }
            }
        }
        if let Some(line) = decoder.finish() {
            if let Some(terminal) = self.apply(&line, request) {
                return terminal;
            }
        }
        Terminal::Failed(Error::malformed("generation stream ended before completion"))
    }

    /// Applies one record. `Some` ends the session.
    fn apply(&self, line: &str, request: &GenerationRequest) -> Option<Terminal> {
        match StreamRecord::parse(line) {
            Err(err) => Some(Terminal::Failed(err)),
            Ok(StreamRecord::Failure(message)) => Some(Terminal::Failed(Error::transport(
                format!("generation service reported: {message}"),
            ))),
            Ok(StreamRecord::Update { code, done }) => {
                if let Some(code) = code {
                    self.buffer.set_code(&code);
                }
                if !done {
                    return None;
                }
                self.trigger.render(DiagramSource::new(
                    self.buffer.code(),
                    request.diagram_type.clone(),
                ));
                Some(Terminal::Completed)
            }
        }
    }
}
