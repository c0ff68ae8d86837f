use crate::{Error, Result};
use indexmap::IndexMap;

/// Groups diagram types whose externally rendered SVG needs the same repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiagramFamily {
    #[default]
    Generic,
    /// blockdiag-style renderers (seqdiag, actdiag, nwdiag, ...).
    BoxAndLine,
    /// Process notations exported by a UI toolkit (bpmn-js).
    ProcessNotation,
}

/// Interactive viewport settings for types that tend to produce large drawings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSpec {
    pub default_scale: f64,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagramType {
    pub id: &'static str,
    pub name: &'static str,
    /// Path segment used by the remote rendering service.
    pub remote_type: &'static str,
    /// `Content-Type` sent with POST bodies.
    pub content_type: &'static str,
    /// GET with a compact encoded source instead of POSTing the raw text.
    pub requires_encoding: bool,
    /// Whether a local renderer may handle this type.
    pub local_render: bool,
    pub family: DiagramFamily,
    pub file_extension: &'static str,
    pub viewport: Option<ViewportSpec>,
}

impl DiagramType {
    /// A remote-only, POST-rendered, generic type. Use struct update syntax for the rest.
    pub const fn remote(id: &'static str, name: &'static str, file_extension: &'static str) -> Self {
        Self {
            id,
            name,
            remote_type: id,
            content_type: "text/plain",
            requires_encoding: false,
            local_render: false,
            family: DiagramFamily::Generic,
            file_extension,
            viewport: None,
        }
    }
}

const WIDE_DIAGRAM: ViewportSpec = ViewportSpec {
    default_scale: 1.0,
    fullscreen: true,
};

#[derive(Debug, Clone, Default)]
pub struct DiagramTypeRegistry {
    types: IndexMap<&'static str, DiagramType>,
}

impl DiagramTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, diagram_type: DiagramType) {
        self.types.insert(diagram_type.id, diagram_type);
    }

    pub fn get(&self, id: &str) -> Option<&DiagramType> {
        self.types.get(id)
    }

    pub fn lookup(&self, id: &str) -> Result<&DiagramType> {
        self.get(id).ok_or_else(|| Error::UnknownDiagramType {
            diagram_type: id.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagramType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The types offered by the editor, in menu order.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();

        reg.insert(DiagramType {
            local_render: true,
            ..DiagramType::remote("mermaid", "Mermaid", ".mmd")
        });
        reg.insert(DiagramType {
            requires_encoding: true,
            local_render: true,
            ..DiagramType::remote("plantuml", "PlantUML", ".puml")
        });
        reg.insert(DiagramType {
            family: DiagramFamily::BoxAndLine,
            viewport: Some(WIDE_DIAGRAM),
            ..DiagramType::remote("seqdiag", "SeqDiag", ".diag")
        });
        reg.insert(DiagramType {
            content_type: "application/xml",
            family: DiagramFamily::ProcessNotation,
            viewport: Some(ViewportSpec {
                default_scale: 0.8,
                fullscreen: true,
            }),
            ..DiagramType::remote("bpmn", "BPMN", ".bpmn")
        });
        reg.insert(DiagramType {
            content_type: "application/json",
            requires_encoding: true,
            ..DiagramType::remote("excalidraw", "Excalidraw", ".excalidraw")
        });
        reg.insert(DiagramType::remote("bytefield", "Bytefield", ".bytefield"));
        reg.insert(DiagramType::remote("nomnoml", "Nomnoml", ".nomnoml"));
        reg.insert(DiagramType {
            family: DiagramFamily::BoxAndLine,
            viewport: Some(WIDE_DIAGRAM),
            ..DiagramType::remote("actdiag", "ActDiag", ".diag")
        });
        reg.insert(DiagramType {
            viewport: Some(ViewportSpec {
                default_scale: 1.0,
                fullscreen: false,
            }),
            ..DiagramType::remote("erd", "Erd", ".erd")
        });
        reg.insert(DiagramType::remote("ditaa", "Ditaa", ".ditaa"));

        for (id, name) in [
            ("blockdiag", "BlockDiag"),
            ("nwdiag", "NwDiag"),
            ("packetdiag", "PacketDiag"),
            ("rackdiag", "RackDiag"),
        ] {
            reg.insert(DiagramType {
                family: DiagramFamily::BoxAndLine,
                ..DiagramType::remote(id, name, ".diag")
            });
        }

        reg
    }
}

/// Diagram text tagged with the id of its [`DiagramType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramSource {
    pub text: String,
    pub diagram_type: String,
}

impl DiagramSource {
    pub fn new(text: impl Into<String>, diagram_type: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            diagram_type: diagram_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Triggered by an edit; subject to the auto-render toggle.
    #[default]
    Auto,
    /// Explicit user request (save, toggle switch, generation completed).
    Forced,
}

/// One render attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub source: DiagramSource,
    pub mode: RenderMode,
}
