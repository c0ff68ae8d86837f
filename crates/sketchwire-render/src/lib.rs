#![forbid(unsafe_code)]

//! Rendering side of sketchwire: remote/local dispatch, SVG repair and viewport state.

pub mod debounce;
pub mod dispatch;
pub mod plantuml;
pub mod svg;
pub mod viewport;

pub use debounce::AutoRenderer;
pub use dispatch::{
    Format, LocalRenderer, Method, RemoteClient, RemoteRequest, RemoteResponse, RenderOutcome,
    RenderPath, RenderSink, RenderedArtifact, Renderer, remote_request, remote_url,
};
pub use plantuml::{PLANTUML_SERVER, PlantUmlServer};
pub use svg::{ProcessedSvg, ViewBox};
pub use viewport::{FullscreenApi, Modifiers, Point, Size, ViewportController};
