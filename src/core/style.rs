//! Visual-property dispatcher.
//!
//! Some descriptor parameters are not plain properties: shadow parts merge
//! into one `box-shadow`, `align`/`position` expand into offsets or margins,
//! and `line-clamp` and backgrounds touch several properties at once.
//! Everything else is written straight through with its priority flag.

use crate::surface::{NodeId, RenderSurface};

const SHADOW_PARTS: [&str; 5] = [
    "shadow-offset-x",
    "shadow-offset-y",
    "shadow-blur",
    "shadow-size",
    "shadow-color",
];

const ZERO_SHADOW: &str = "0px 0px 0px 0px";

/// Properties cleared before a positioned (fixed/absolute) alignment.
const POSITIONED_RESET: [&str; 5] = ["left", "top", "transform", "right", "bottom"];

/// Properties cleared before an in-flow alignment.
const FLOW_RESET: [&str; 4] = ["align-self", "margin-bottom", "margin-top", "margin-left"];

/// Apply one descriptor parameter to `node`. `None` clears it.
pub fn set_style<S: RenderSurface + ?Sized>(
    surface: &mut S,
    node: NodeId,
    parameter: &str,
    value: Option<&str>,
    important: bool,
) {
    match parameter {
        p if SHADOW_PARTS.contains(&p) => {
            let current = surface.style(node, "box-shadow").unwrap_or_default();
            let shadow = merge_shadow(current, p, value);
            surface.set_style(node, "box-shadow", shadow.as_deref(), false);
        }
        "align" | "position" => align(surface, node, value),
        "line-clamp" => line_clamp(surface, node, value),
        "background-image" => background_image(surface, node, value),
        "background-repeat" => background_repeat(surface, node, value),
        _ => surface.set_style(node, parameter, value, important),
    }
}

/// Re-apply the parent's spacing rule: the first visible child clears the
/// spacing property, every child after it receives it.
///
/// The rule lives in the parent's `spacing` attribute as `property: value`.
pub fn restyle_first_child<S: RenderSurface + ?Sized>(surface: &mut S, node: NodeId) {
    let Some(parent) = surface.parent(node) else {
        return;
    };
    let Some((property, value)) = surface
        .attribute(parent, "spacing")
        .and_then(|s| s.split_once(':'))
        .map(|(p, v)| (p.trim().to_string(), v.trim().to_string()))
    else {
        return;
    };

    let mut first = true;
    for child in surface.children(parent) {
        if !first {
            surface.set_style(child, &property, Some(value.as_str()), false);
        } else if surface.is_visible(child) {
            surface.set_style(child, &property, None, false);
            first = false;
        }
    }
}

/// Merge one shadow part into an existing `box-shadow` value.
///
/// Returns `None` when the result is an all-zero shadow with no color.
pub fn merge_shadow(current: &str, part: &str, value: Option<&str>) -> Option<String> {
    let current = if current.trim().is_empty() {
        ZERO_SHADOW
    } else {
        current.trim()
    };
    let (mut color, lengths) = split_shadow(current);
    let mut lengths: Vec<String> = lengths.split_whitespace().map(str::to_string).collect();
    lengths.resize(4, "0px".to_string());

    let slot = match part {
        "shadow-color" => {
            color = value.map(str::to_string);
            None
        }
        "shadow-offset-x" => Some(0),
        "shadow-offset-y" => Some(1),
        "shadow-blur" => Some(2),
        _ => Some(3),
    };
    if let Some(i) = slot {
        lengths[i] = value.unwrap_or("0px").to_string();
    }

    let lengths = lengths.join(" ");
    match color {
        Some(c) if !c.is_empty() => Some(format!("{} {}", c, lengths)),
        _ if lengths == ZERO_SHADOW => None,
        _ => Some(lengths),
    }
}

/// Split a shadow into its leading color (if any) and the length list.
fn split_shadow(shadow: &str) -> (Option<String>, &str) {
    if let Some(close) = shadow.rfind(')') {
        return (
            Some(shadow[..=close].to_string()),
            shadow[close + 1..].trim(),
        );
    }
    match shadow.split_once(char::is_whitespace) {
        Some((first, rest)) if !starts_like_length(first) => (Some(first.to_string()), rest.trim()),
        _ if !starts_like_length(shadow) => (Some(shadow.to_string()), ""),
        _ => (None, shadow),
    }
}

fn starts_like_length(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '.')
}

fn align<S: RenderSurface + ?Sized>(surface: &mut S, node: NodeId, value: Option<&str>) {
    let positioned = matches!(surface.style(node, "position"), Some("fixed" | "absolute"));
    let (reset, rules): (&[&str], &[(&str, &str)]) = if positioned {
        (&POSITIONED_RESET[..], positioned_alignment(value.unwrap_or_default()))
    } else {
        (&FLOW_RESET[..], flow_alignment(value.unwrap_or_default()))
    };
    for property in reset {
        surface.set_style(node, property, None, false);
    }
    for (property, v) in rules {
        surface.set_style(node, property, Some(v), false);
    }
}

fn positioned_alignment(value: &str) -> &'static [(&'static str, &'static str)] {
    match value {
        "center" => &[("left", "50%"), ("top", "50%"), ("transform", "translate(-50%,-50%)")],
        "top" => &[("left", "50%"), ("top", "0"), ("transform", "translateX(-50%)")],
        "left" => &[("left", "0"), ("top", "50%"), ("transform", "translateY(-50%)")],
        "right" => &[("right", "0"), ("top", "50%"), ("transform", "translate(-50%)")],
        "bottom" => &[("left", "50%"), ("bottom", "0"), ("transform", "translateX(-50%)")],
        "top-left" => &[("left", "0"), ("top", "0")],
        "top-right" => &[("right", "0"), ("top", "0")],
        "bottom-left" => &[("left", "0"), ("bottom", "0")],
        "bottom-right" => &[("right", "0"), ("bottom", "0")],
        _ => &[],
    }
}

fn flow_alignment(value: &str) -> &'static [(&'static str, &'static str)] {
    match value {
        "center" => &[("align-self", "center"), ("margin-bottom", "auto"), ("margin-top", "auto")],
        "top" => &[("align-self", "center"), ("margin-bottom", "auto")],
        "left" => &[("align-self", "flex-start"), ("margin-bottom", "auto"), ("margin-top", "auto")],
        "right" => &[
            ("align-self", "flex-end"),
            ("margin-bottom", "auto"),
            ("margin-top", "auto"),
            ("margin-left", "auto"),
        ],
        "bottom" => &[("align-self", "center"), ("margin-bottom", "0"), ("margin-top", "auto")],
        "top-left" => &[("align-self", "flex-start")],
        "top-right" => &[("align-self", "flex-end"), ("margin-left", "auto")],
        "bottom-left" => &[("align-self", "flex-start"), ("margin-bottom", "0"), ("margin-top", "auto")],
        "bottom-right" => &[
            ("align-self", "flex-end"),
            ("margin-bottom", "0"),
            ("margin-top", "auto"),
            ("margin-left", "auto"),
        ],
        _ => &[],
    }
}

fn line_clamp<S: RenderSurface + ?Sized>(surface: &mut S, node: NodeId, value: Option<&str>) {
    match value {
        Some(lines) => {
            surface.set_style(node, "display", Some("-webkit-box"), false);
            surface.set_style(node, "overflow", Some("hidden"), false);
            surface.set_style(node, "-webkit-line-clamp", Some(lines), false);
            surface.set_style(node, "-webkit-box-orient", Some("vertical"), false);
        }
        None => {
            for property in ["display", "overflow", "-webkit-line-clamp", "-webkit-box-orient"] {
                surface.set_style(node, property, None, false);
            }
        }
    }
}

fn background_image<S: RenderSurface + ?Sized>(surface: &mut S, node: NodeId, value: Option<&str>) {
    match value {
        Some(url) => {
            let repeat_set = surface
                .style(node, "background-repeat")
                .is_some_and(|v| !v.is_empty());
            surface.set_style(node, "background-image", Some(format!("url({})", url).as_str()), false);
            if !repeat_set {
                surface.set_style(node, "background-size", Some("cover"), false);
                surface.set_style(node, "background-position", Some("center"), false);
            }
        }
        None => {
            for property in ["background-image", "background-size", "background-position"] {
                surface.set_style(node, property, None, false);
            }
        }
    }
}

fn background_repeat<S: RenderSurface + ?Sized>(surface: &mut S, node: NodeId, value: Option<&str>) {
    match value {
        Some(_) => {
            surface.set_style(node, "background-repeat", Some("repeat"), false);
            surface.set_style(node, "background-size", None, false);
            surface.set_style(node, "background-position", None, false);
        }
        None => {
            surface.set_style(node, "background-repeat", None, false);
            surface.set_style(node, "background-size", Some("cover"), false);
            surface.set_style(node, "background-position", Some("center"), false);
        }
    }
}
