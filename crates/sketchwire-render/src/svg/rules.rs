//! Repair rules for externally rendered SVG.
//!
//! Every rule is a pure `fn(&str) -> String` and idempotent: applying it to its own output
//! changes nothing. Attribute edits go through `lol_html`, so markup inside comments, CDATA and
//! nested `<svg>` elements is never mistaken for the document root.

use lol_html::html_content::Element;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use regex::Regex;
use std::sync::OnceLock;

pub(crate) type Rule = fn(&str) -> String;

pub(crate) const FALLBACK_VIEWBOX: (f64, f64) = (800.0, 600.0);

const TEXT_FONT_FAMILY: &str = "Arial, sans-serif";

fn re_doctype() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<!DOCTYPE[^>\[]*(\[[^\]]*\])?[^>]*>\s*").expect("valid regex"))
}

fn re_blur_filter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*filter:\s*url\(#filter_blur\)").expect("valid regex"))
}

/// Runs `edit` on every element matching `selector`. Markup the rewriter rejects comes back
/// unchanged.
fn rewrite(svg: &str, selector: &str, mut edit: impl FnMut(&mut Element<'_, '_>)) -> String {
    let handlers = vec![element!(selector, |el| {
        edit(el);
        Ok(())
    })];
    rewrite_str(
        svg,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )
    .unwrap_or_else(|err| {
        tracing::warn!(%err, selector, "svg rewrite failed, markup left unchanged");
        svg.to_string()
    })
}

/// Runs `edit` on the outermost `<svg>` element only.
fn rewrite_root(svg: &str, mut edit: impl FnMut(&mut Element<'_, '_>)) -> String {
    let mut seen = false;
    rewrite(svg, "svg", |el| {
        if !std::mem::replace(&mut seen, true) {
            edit(el);
        }
    })
}

/// Value of `name` on the root `<svg>`. The outer `None` means the document has no root.
pub(crate) fn root_attribute(svg: &str, name: &str) -> Option<Option<String>> {
    let mut found = None;
    rewrite_root(svg, |root| found = Some(root.get_attribute(name)));
    found
}

pub(crate) fn has_root(svg: &str) -> bool {
    let mut found = false;
    rewrite_root(svg, |_| found = true);
    found
}

/// Sets each property in `props` on the element's inline style, replacing same-named
/// declarations and keeping the rest in order.
fn merge_style(el: &mut Element<'_, '_>, props: &[(&str, &str)]) {
    let existing = el.get_attribute("style").unwrap_or_default();
    let _ = el.set_attribute("style", &merged_style(&existing, props));
}

fn merged_style(existing: &str, props: &[(&str, &str)]) -> String {
    let kept = existing
        .split(';')
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| {
            let name = decl.split(':').next().unwrap_or_default().trim();
            !props.iter().any(|(prop, _)| prop.eq_ignore_ascii_case(name))
        })
        .map(|decl| format!("{decl};"));
    let added = props.iter().map(|(prop, value)| format!("{prop}: {value};"));
    kept.chain(added).collect::<Vec<_>>().join(" ")
}

pub(crate) fn strip_doctype(svg: &str) -> String {
    re_doctype().replace_all(svg, "").into_owned()
}

/// Root width/height as plain user units, when they are absolute lengths.
fn root_dimensions(root: &Element<'_, '_>) -> Option<(f64, f64)> {
    let w = absolute_length(&root.get_attribute("width")?)?;
    let h = absolute_length(&root.get_attribute("height")?)?;
    Some((w, h))
}

fn absolute_length(raw: &str) -> Option<f64> {
    use svgtypes::LengthUnit;

    let len: svgtypes::Length = raw.trim().parse().ok()?;
    let ok = matches!(len.unit, LengthUnit::None | LengthUnit::Px);
    (ok && len.number.is_finite() && len.number > 0.0).then_some(len.number)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Gives the root a `viewBox` from its width/height, or 800x600 when those are unusable.
pub(crate) fn ensure_viewbox(svg: &str) -> String {
    rewrite_root(svg, |root| {
        if root.get_attribute("viewBox").is_some() {
            return;
        }
        let (w, h) = root_dimensions(root).unwrap_or(FALLBACK_VIEWBOX);
        let view_box = format!("0 0 {} {}", format_number(w), format_number(h));
        let _ = root.set_attribute("viewBox", &view_box);
    })
}

pub(crate) fn strip_blur_filters(svg: &str) -> String {
    rewrite(svg, "[style]", |el| {
        let blurred = el
            .get_attribute("style")
            .is_some_and(|style| re_blur_filter().is_match(&style));
        if blurred {
            let _ = el.set_attribute("style", "opacity:0.7;fill-opacity:1");
        }
    })
}

pub(crate) fn fill_container(svg: &str) -> String {
    rewrite_root(svg, |root| {
        let _ = root.set_attribute("width", "100%");
        let _ = root.set_attribute("height", "100%");
    })
}

pub(crate) fn text_font_defaults(svg: &str) -> String {
    rewrite(svg, "text", |text| {
        if text.get_attribute("letter-spacing").is_none() {
            let _ = text.set_attribute("letter-spacing", "0.05em");
        }
        if text.get_attribute("font-family").is_none() {
            let _ = text.set_attribute("font-family", TEXT_FONT_FAMILY);
        }
    })
}

pub(crate) fn strip_text_length(svg: &str) -> String {
    rewrite(svg, "text", |text| {
        if text.get_attribute("textLength").is_none() {
            return;
        }
        text.remove_attribute("textLength");
        text.remove_attribute("lengthAdjust");
    })
}

pub(crate) fn fluid_width(svg: &str) -> String {
    rewrite_root(svg, |root| {
        let _ = root.set_attribute("width", "100%");
        let _ = root.set_attribute("height", "auto");
    })
}

pub(crate) fn group_container_styles(svg: &str) -> String {
    rewrite(svg, "g.djs-group", |group| {
        merge_style(
            group,
            &[("fill", "#fff"), ("stroke", "#000"), ("stroke-width", "1.5px")],
        );
    })
}

pub(crate) fn label_text_styles(svg: &str) -> String {
    rewrite(svg, "text.djs-label", |label| {
        merge_style(label, &[("font-family", TEXT_FONT_FAMILY), ("font-size", "12px")]);
    })
}

/// Applied last for every family.
pub(crate) fn finalize_root(svg: &str) -> String {
    rewrite_root(svg, |root| {
        let _ = root.set_attribute("preserveAspectRatio", "xMinYMin meet");
        merge_style(root, &[("max-width", "100%")]);
    })
}
