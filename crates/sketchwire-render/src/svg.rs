//! Post-processing of SVG returned by the remote rendering service.
//!
//! Output from blockdiag-style renderers and bpmn-js exports embeds fixed pixel sizes, blur
//! filters and per-glyph `textLength` hints that render poorly when inlined into a resizable
//! preview. [`process`] validates the markup and runs the rule table for the diagram's
//! family. The transform is pure and idempotent.

mod rules;

use rules::Rule;
use sketchwire_core::{DiagramFamily, DiagramType, Error, Result};

/// Root `viewBox` of a processed document, in user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBox {
    pub fn parse(raw: &str) -> Option<Self> {
        let vb: svgtypes::ViewBox = raw.parse().ok()?;
        Some(Self {
            min_x: vb.x,
            min_y: vb.y,
            width: vb.w,
            height: vb.h,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSvg {
    pub markup: String,
    pub view_box: Option<ViewBox>,
}

impl ProcessedSvg {
    pub fn as_str(&self) -> &str {
        &self.markup
    }
}

const COMMON_RULES: &[(&str, Rule)] = &[("ensure_viewbox", rules::ensure_viewbox)];

const BOX_AND_LINE_RULES: &[(&str, Rule)] = &[
    ("strip_blur_filters", rules::strip_blur_filters),
    ("fill_container", rules::fill_container),
    ("text_font_defaults", rules::text_font_defaults),
    ("strip_text_length", rules::strip_text_length),
];

const PROCESS_NOTATION_RULES: &[(&str, Rule)] = &[
    ("fluid_width", rules::fluid_width),
    ("group_container_styles", rules::group_container_styles),
    ("label_text_styles", rules::label_text_styles),
];

fn family_rules(family: DiagramFamily) -> &'static [(&'static str, Rule)] {
    match family {
        DiagramFamily::Generic => &[],
        DiagramFamily::BoxAndLine => BOX_AND_LINE_RULES,
        DiagramFamily::ProcessNotation => PROCESS_NOTATION_RULES,
    }
}

/// Names of the rules applied for `family`, in order.
pub fn rule_names(family: DiagramFamily) -> Vec<&'static str> {
    COMMON_RULES
        .iter()
        .chain(family_rules(family))
        .map(|(name, _)| *name)
        .collect()
}

pub fn validate(raw: &str) -> Result<()> {
    if raw.trim().is_empty() {
        return Err(Error::malformed("empty SVG document"));
    }
    if !rules::has_root(raw) {
        return Err(Error::malformed("response does not contain an <svg> element"));
    }
    Ok(())
}

pub fn process(raw: &str, diagram_type: &DiagramType) -> Result<ProcessedSvg> {
    validate(raw)?;

    let mut svg = rules::strip_doctype(raw);
    for (name, rule) in COMMON_RULES.iter().chain(family_rules(diagram_type.family)) {
        tracing::trace!(rule = name, diagram_type = diagram_type.id, "svg rule");
        svg = rule(&svg);
    }
    let markup = rules::finalize_root(&svg);

    let view_box = rules::root_attribute(&markup, "viewBox")
        .flatten()
        .and_then(|raw| ViewBox::parse(&raw));
    Ok(ProcessedSvg { markup, view_box })
}
