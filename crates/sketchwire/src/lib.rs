#![forbid(unsafe_code)]

//! `sketchwire` renders diagram source through a remote (Kroki-style) service or a local
//! renderer, and drives natural-language generation against a streaming backend.
//!
//! # Features
//!
//! - `http`: `reqwest` implementations of the rendering, generation and prompt transports
//!   (`sketchwire::http`)

pub use sketchwire_core::*;

pub mod generate;
mod studio;

pub use studio::{Studio, StudioBuilder};

pub mod render {
    pub use sketchwire_render::*;
}

#[cfg(feature = "http")]
pub mod http;
