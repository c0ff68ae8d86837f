use crate::generate::{
    CodeBuffer, GenerationBackend, GenerationManager, LogNotifier, Notifier, RenderTrigger,
    SharedBuffer, SubmitOutcome,
};
use sketchwire_core::{
    DiagramSource, GenerationRequest, PromptSource, RenderMode, Result, SettingsStore,
    StaticPrompts,
};
use sketchwire_render::{AutoRenderer, RenderSink, Renderer};
use std::sync::{Arc, Mutex};

/// Forwards generated code to the debounced renderer as a forced render.
struct DebouncedTrigger(AutoRenderer);

impl RenderTrigger for DebouncedTrigger {
    fn render(&self, source: DiagramSource) {
        self.0.request(source, RenderMode::Forced);
    }
}

pub struct StudioBuilder {
    renderer: Renderer,
    sink: Arc<dyn RenderSink>,
    backend: Arc<dyn GenerationBackend>,
    prompts: Arc<dyn PromptSource>,
    notifier: Arc<dyn Notifier>,
    diagram_type: String,
    code: String,
}

impl StudioBuilder {
    pub fn prompts(mut self, prompts: Arc<dyn PromptSource>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn diagram_type(mut self, id: impl Into<String>) -> Self {
        self.diagram_type = id.into();
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn build(self) -> Result<Studio> {
        self.renderer.registry().lookup(&self.diagram_type)?;

        let settings = Arc::clone(self.renderer.settings());
        let auto = AutoRenderer::new(Arc::new(self.renderer), self.sink);
        let buffer = Arc::new(SharedBuffer::new(self.code));
        let generation = GenerationManager::new(
            self.backend,
            self.prompts,
            buffer.clone(),
            self.notifier,
            Arc::new(DebouncedTrigger(auto.clone())),
        );
        Ok(Studio {
            settings,
            auto,
            generation,
            buffer,
            diagram_type: Mutex::new(self.diagram_type),
        })
    }
}

/// One editor: a diagram buffer wired to debounced rendering and generation.
///
/// Requires a tokio runtime for everything that schedules work.
#[derive(Debug)]
pub struct Studio {
    settings: Arc<SettingsStore>,
    auto: AutoRenderer,
    generation: GenerationManager,
    buffer: Arc<SharedBuffer>,
    diagram_type: Mutex<String>,
}

impl Studio {
    pub fn builder(
        renderer: Renderer,
        sink: Arc<dyn RenderSink>,
        backend: Arc<dyn GenerationBackend>,
    ) -> StudioBuilder {
        StudioBuilder {
            renderer,
            sink,
            backend,
            prompts: Arc::new(StaticPrompts::default()),
            notifier: Arc::new(LogNotifier),
            diagram_type: "mermaid".to_string(),
            code: String::new(),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn generation(&self) -> &GenerationManager {
        &self.generation
    }

    pub fn code(&self) -> String {
        self.buffer.code()
    }

    pub fn diagram_type(&self) -> String {
        match self.diagram_type.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn source(&self) -> DiagramSource {
        DiagramSource::new(self.code(), self.diagram_type())
    }

    /// Switches the diagram type. Unknown ids are rejected and leave the type unchanged.
    pub fn set_diagram_type(&self, id: &str) -> Result<()> {
        self.auto.renderer().registry().lookup(id)?;
        let mut guard = match self.diagram_type.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = id.to_string();
        Ok(())
    }

    /// Replaces the buffer after a user edit. Returns whether a render was scheduled.
    pub fn edit(&self, code: &str) -> bool {
        self.buffer.set_code(code);
        self.auto.on_source_changed(self.source())
    }

    pub fn render_now(&self) -> bool {
        self.auto.request(self.source(), RenderMode::Forced)
    }

    /// Saves the current work: in natural-language mode, generates code from `description`;
    /// otherwise forces a render of the buffer.
    pub fn save(&self, description: &str, template_hint: Option<&str>) -> Result<Option<SubmitOutcome>> {
        let settings = self.settings.snapshot();
        if !settings.nl_drawing_enabled {
            self.render_now();
            return Ok(None);
        }
        let mut request = GenerationRequest::new(settings.api_key, description, self.diagram_type());
        request.template_hint = template_hint.map(str::to_string);
        self.generation.submit(request).map(Some)
    }

    pub fn cancel_generation(&self) -> bool {
        self.generation.cancel()
    }

    /// Toggling remote rendering always re-renders.
    pub fn set_force_remote(&self, on: bool) {
        self.settings.update(|s| s.force_remote = on);
        self.render_now();
    }

    pub fn set_nl_drawing(&self, on: bool) {
        self.settings.update(|s| s.nl_drawing_enabled = on);
    }

    pub fn set_auto_render(&self, on: bool) {
        self.settings.update(|s| s.auto_render = on);
    }
}
