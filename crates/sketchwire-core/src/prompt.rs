//! Prompt templates for natural-language generation.
//!
//! A catalog is a two-level JSON object, `{category: {name: template}}`, where the category is a
//! diagram tool id (`"mermaid"`, `"plantuml"`, ...) and the name is the drawing kind the user
//! picked (`"flowchart"`, `"sequence"`, ...). Templates reference `{user_context}`,
//! `{draw_tool_name}` and `{draw_type}`.

use crate::{Error, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DRAW_TYPE: &str = "flowchart";

pub const DEFAULT_TEMPLATE: &str = "You are an expert in {draw_tool_name}. \
Write {draw_tool_name} source for a {draw_type} that captures the following description. \
Reply with the diagram source only, without explanations or code fences.\n\n\
Description:\n{user_context}\n";

/// What the user asked to have drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub api_key: String,
    /// The natural-language description.
    pub prompt_context: String,
    /// Diagram type id the result is written in.
    pub diagram_type: String,
    /// Catalog entry name, e.g. `"sequence"`. `None` selects [`DEFAULT_DRAW_TYPE`].
    pub template_hint: Option<String>,
}

impl GenerationRequest {
    pub fn new(
        api_key: impl Into<String>,
        prompt_context: impl Into<String>,
        diagram_type: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            prompt_context: prompt_context.into(),
            diagram_type: diagram_type.into(),
            template_hint: None,
        }
    }

    pub fn with_template_hint(mut self, hint: impl Into<String>) -> Self {
        self.template_hint = Some(hint.into());
        self
    }

    pub fn draw_type(&self) -> &str {
        self.template_hint
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_DRAW_TYPE)
    }

    /// Rejects requests that cannot be sent at all.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::configuration("an API key is required for generation"));
        }
        if self.prompt_context.trim().is_empty() {
            return Err(Error::configuration("the description to draw is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptCatalog {
    entries: IndexMap<String, IndexMap<String, String>>,
}

impl PromptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::malformed(format!("prompt catalog: {err}")))
    }

    pub fn insert(
        &mut self,
        category: impl Into<String>,
        name: impl Into<String>,
        template: impl Into<String>,
    ) {
        self.entries
            .entry(category.into())
            .or_default()
            .insert(name.into(), template.into());
    }

    pub fn get(&self, category: &str, name: &str) -> Option<&str> {
        self.entries
            .get(category)
            .and_then(|names| names.get(name))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The catalog template for the request, or [`DEFAULT_TEMPLATE`] when there is none.
    pub fn template_for(&self, request: &GenerationRequest) -> &str {
        match self.get(&request.diagram_type, request.draw_type()) {
            Some(template) => template,
            None => {
                tracing::debug!(
                    diagram_type = %request.diagram_type,
                    draw_type = request.draw_type(),
                    "no catalog prompt; using the built-in template"
                );
                DEFAULT_TEMPLATE
            }
        }
    }

    pub fn build_prompt(&self, request: &GenerationRequest) -> String {
        substitute(self.template_for(request), |key| match key {
            "user_context" => Some(request.prompt_context.as_str()),
            "draw_tool_name" => Some(request.diagram_type.as_str()),
            "draw_type" => Some(request.draw_type()),
            _ => None,
        })
    }
}

/// Replaces `{name}` placeholders. Unknown names and unbalanced braces are kept verbatim.
pub fn substitute<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find(['{', '}']) else {
            out.push_str(&rest[open..]);
            return out;
        };
        if after.as_bytes()[close] == b'{' {
            out.push('{');
            rest = after;
            continue;
        }
        let key = &after[..close];
        match lookup(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Supplies the prompt catalog. Implementations may fetch it over the network.
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn fetch(&self) -> Result<PromptCatalog>;
}

/// A catalog that is always available.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompts(pub PromptCatalog);

#[async_trait]
impl PromptSource for StaticPrompts {
    async fn fetch(&self) -> Result<PromptCatalog> {
        Ok(self.0.clone())
    }
}

/// Fetches the catalog, degrading to an empty one (and so the built-in template) on failure.
pub async fn load_catalog(source: &dyn PromptSource) -> PromptCatalog {
    match source.fetch().await {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::warn!(error = %err, "prompt catalog unavailable; using the built-in template");
            PromptCatalog::new()
        }
    }
}
