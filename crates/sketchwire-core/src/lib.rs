#![forbid(unsafe_code)]

//! Diagram types, settings, transport encoding and prompt templates (headless).
//!
//! Design goals:
//! - no I/O beyond reading a settings file; network access lives behind traits
//! - runtime-agnostic async APIs (no specific executor required)
//! - byte-compatible transport encoding with Kroki-style rendering services

pub mod config;
pub mod diagram;
pub mod encode;
pub mod error;
pub mod prompt;

pub use config::{Settings, SettingsStore, SubscriptionId};
pub use diagram::{
    DiagramFamily, DiagramSource, DiagramType, DiagramTypeRegistry, RenderMode, RenderRequest,
    ViewportSpec,
};
#[cfg(feature = "deflate")]
pub use encode::{ZlibCompressor, plantuml_decode, plantuml_encode};
pub use encode::{Compressor, Encoder, Transport};
pub use error::{Error, Result};
pub use prompt::{GenerationRequest, PromptCatalog, PromptSource, StaticPrompts};

/// The default registry paired with an encoder.
#[derive(Debug, Clone)]
pub struct Toolkit {
    pub registry: DiagramTypeRegistry,
    pub encoder: Encoder,
}

impl Default for Toolkit {
    fn default() -> Self {
        Self {
            registry: DiagramTypeRegistry::with_defaults(),
            encoder: Encoder::default(),
        }
    }
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `source` for the remote service of its diagram type.
    pub fn encode(&self, source: &DiagramSource) -> Result<Transport> {
        let diagram_type = self.registry.lookup(&source.diagram_type)?;
        self.encoder.encode(&source.text, diagram_type)
    }
}
