use crate::cascade::{CascadedProperty, DeclaredStyles};
use crate::dom::NodeId;
use crate::expr::{Expression, Separator, Term, TermValue};
use crate::units;

const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

const SHORTHANDS: [&str; 13] = [
    "margin",
    "padding",
    "border-width",
    "border-style",
    "border-color",
    "border",
    "border-top",
    "border-right",
    "border-bottom",
    "border-left",
    "list-style",
    "background",
    "font",
];

pub(crate) const LIST_STYLE_TYPES: [&str; 16] = [
    "disc",
    "circle",
    "square",
    "decimal",
    "decimal-leading-zero",
    "lower-roman",
    "upper-roman",
    "lower-greek",
    "lower-latin",
    "upper-latin",
    "lower-alpha",
    "upper-alpha",
    "armenian",
    "georgian",
    "hebrew",
    "none",
];

const BACKGROUND_REPEATS: [&str; 4] = ["repeat", "repeat-x", "repeat-y", "no-repeat"];
const BACKGROUND_ATTACHMENTS: [&str; 3] = ["scroll", "fixed", "local"];
const POSITION_KEYWORDS: [&str; 5] = ["left", "right", "top", "bottom", "center"];
const FONT_STYLES: [&str; 2] = ["italic", "oblique"];
const FONT_WEIGHTS: [&str; 4] = ["bold", "bolder", "lighter", "normal"];

pub fn is_shorthand(name: &str) -> bool {
    SHORTHANDS.contains(&name)
}

// Synthesizes longhands for every shorthand stored on `node`. Each
// longhand carries the shorthand's tier, specificity and sequence, so it
// only replaces a stored longhand that ranks strictly lower.
pub fn expand_node(declared: &mut DeclaredStyles, node: NodeId) {
    let shorthands: Vec<CascadedProperty> = declared
        .properties(node)
        .into_iter()
        .filter(|prop| is_shorthand(&prop.name))
        .cloned()
        .collect();
    for shorthand in shorthands {
        for (name, value) in expand(&shorthand.name, &shorthand.value) {
            declared.offer(
                node,
                CascadedProperty {
                    name,
                    value,
                    tier: shorthand.tier,
                    specificity: shorthand.specificity,
                    sequence: shorthand.sequence,
                },
            );
        }
    }
}

pub fn expand(name: &str, value: &Expression) -> Vec<(String, Expression)> {
    if value.is_inherit_marker() {
        return longhand_names(name)
            .into_iter()
            .map(|longhand| (longhand, Expression::inherited()))
            .collect();
    }
    if let Some(keyword @ ("initial" | "unset")) = value.as_keyword() {
        return longhand_names(name)
            .into_iter()
            .map(|longhand| (longhand, Expression::keyword(keyword)))
            .collect();
    }
    match name {
        "margin" => box_edges(value, |side| format!("margin-{side}")),
        "padding" => box_edges(value, |side| format!("padding-{side}")),
        "border-width" => box_edges(value, |side| format!("border-{side}-width")),
        "border-style" => box_edges(value, |side| format!("border-{side}-style")),
        "border-color" => box_edges(value, |side| format!("border-{side}-color")),
        "border" => border(value, &SIDES),
        "border-top" => border(value, &["top"]),
        "border-right" => border(value, &["right"]),
        "border-bottom" => border(value, &["bottom"]),
        "border-left" => border(value, &["left"]),
        "list-style" => list_style(value),
        "background" => background(value),
        "font" => font(value),
        _ => Vec::new(),
    }
}

fn sided(pattern: impl Fn(&str) -> String) -> Vec<String> {
    SIDES.iter().map(|side| pattern(*side)).collect()
}

fn longhand_names(name: &str) -> Vec<String> {
    match name {
        "margin" => sided(|side| format!("margin-{side}")),
        "padding" => sided(|side| format!("padding-{side}")),
        "border-width" => sided(|side| format!("border-{side}-width")),
        "border-style" => sided(|side| format!("border-{side}-style")),
        "border-color" => sided(|side| format!("border-{side}-color")),
        "border" => SIDES
            .iter()
            .flat_map(|side| border_side_names(side))
            .collect(),
        "border-top" | "border-right" | "border-bottom" | "border-left" => {
            border_side_names(&name["border-".len()..]).to_vec()
        }
        "list-style" => ["list-style-type", "list-style-position", "list-style-image"]
            .map(str::to_string)
            .to_vec(),
        "background" => [
            "background-color",
            "background-image",
            "background-repeat",
            "background-attachment",
            "background-position",
        ]
        .map(str::to_string)
        .to_vec(),
        "font" => [
            "font-style",
            "font-variant",
            "font-weight",
            "font-size",
            "line-height",
            "font-family",
        ]
        .map(str::to_string)
        .to_vec(),
        _ => Vec::new(),
    }
}

fn border_side_names(side: &str) -> [String; 3] {
    [
        format!("border-{side}-width"),
        format!("border-{side}-style"),
        format!("border-{side}-color"),
    ]
}

fn single(term: &Term) -> Expression {
    Expression::from_terms(vec![Term::new(term.value.clone())])
}

fn box_edges(value: &Expression, name: impl Fn(&str) -> String) -> Vec<(String, Expression)> {
    let terms = value.terms();
    let (top, right, bottom, left) = match terms {
        [all] => (all, all, all, all),
        [vertical, horizontal] => (vertical, horizontal, vertical, horizontal),
        [top, horizontal, bottom] => (top, horizontal, bottom, horizontal),
        [top, right, bottom, left] => (top, right, bottom, left),
        _ => return Vec::new(),
    };
    SIDES
        .iter()
        .zip([top, right, bottom, left])
        .map(|(side, term)| (name(*side), single(term)))
        .collect()
}

fn border(value: &Expression, sides: &[&str]) -> Vec<(String, Expression)> {
    let mut width = None;
    let mut style = None;
    let mut color = None;
    for term in value.terms() {
        if term.ident().is_some_and(units::is_border_style) {
            style = Some(single(term));
        } else if units::is_color_term(term) {
            color = Some(single(term));
        } else {
            width = Some(single(term));
        }
    }
    let mut out = Vec::new();
    for side in sides {
        if let Some(width) = &width {
            out.push((format!("border-{side}-width"), width.clone()));
        }
        if let Some(style) = &style {
            out.push((format!("border-{side}-style"), style.clone()));
        }
        if let Some(color) = &color {
            out.push((format!("border-{side}-color"), color.clone()));
        }
    }
    out
}

fn list_style(value: &Expression) -> Vec<(String, Expression)> {
    let mut out = Vec::new();
    let mut nones = 0;
    let (mut has_type, mut has_image) = (false, false);
    for term in value.terms() {
        let ident = term.ident().map(str::to_ascii_lowercase);
        let name = match ident.as_deref() {
            Some("none") => {
                nones += 1;
                continue;
            }
            Some(kw) if LIST_STYLE_TYPES.contains(&kw) => {
                has_type = true;
                "list-style-type"
            }
            Some("inside" | "outside") => "list-style-position",
            _ => {
                has_image = true;
                "list-style-image"
            }
        };
        out.push((name.to_string(), single(term)));
    }
    // `none` lands on whichever of type and image the value left unset.
    if nones > 0 {
        if !has_type {
            out.push(("list-style-type".to_string(), Expression::keyword("none")));
        }
        if !has_image {
            out.push(("list-style-image".to_string(), Expression::keyword("none")));
        }
    }
    out
}

fn background(value: &Expression) -> Vec<(String, Expression)> {
    let mut out = Vec::new();
    let mut position: Vec<Term> = Vec::new();
    for term in value.terms() {
        let ident = term.ident().map(str::to_ascii_lowercase);
        let is_position = term.is_length_or_percentage()
            || ident
                .as_deref()
                .is_some_and(|kw| POSITION_KEYWORDS.contains(&kw));
        if is_position {
            if position.len() < 2 {
                position.push(Term::new(term.value.clone()));
            }
            continue;
        }
        let name = match (&term.value, ident.as_deref()) {
            (TermValue::Function(func, _), _) if func == "url" || func.ends_with("gradient") => {
                "background-image"
            }
            (_, Some("none")) => "background-image",
            (_, Some(kw)) if BACKGROUND_REPEATS.contains(&kw) => "background-repeat",
            (_, Some(kw)) if BACKGROUND_ATTACHMENTS.contains(&kw) => "background-attachment",
            _ if units::is_color_term(term) => "background-color",
            _ => continue,
        };
        out.push((name.to_string(), single(term)));
    }
    if position.len() == 1 {
        position.push(Term::new(TermValue::Ident("center".to_string())));
    }
    if !position.is_empty() {
        out.push((
            "background-position".to_string(),
            Expression::from_terms(position),
        ));
    }
    out
}

fn font(value: &Expression) -> Vec<(String, Expression)> {
    let mut out = Vec::new();
    let mut family: Vec<Term> = Vec::new();
    let mut seen_size = false;
    for term in value.terms() {
        if seen_size {
            if term.separator == Separator::Slash && family.is_empty() {
                out.push(("line-height".to_string(), single(term)));
            } else {
                family.push(term.clone());
            }
            continue;
        }
        let ident = term.ident().map(str::to_ascii_lowercase);
        match (&term.value, ident.as_deref()) {
            (_, Some(kw)) if FONT_STYLES.contains(&kw) => {
                out.push(("font-style".to_string(), single(term)));
            }
            (_, Some("small-caps")) => {
                out.push(("font-variant".to_string(), single(term)));
            }
            (_, Some(kw)) if FONT_WEIGHTS.contains(&kw) && kw != "normal" => {
                out.push(("font-weight".to_string(), single(term)));
            }
            (_, Some("normal")) => {}
            (TermValue::Number(weight), _) if (100.0..=900.0).contains(weight) => {
                out.push(("font-weight".to_string(), single(term)));
            }
            (_, Some(kw)) if units::is_font_size_keyword(kw) => {
                out.push(("font-size".to_string(), single(term)));
                seen_size = true;
            }
            _ if term.is_length_or_percentage() => {
                out.push(("font-size".to_string(), single(term)));
                seen_size = true;
            }
            _ => family.push(term.clone()),
        }
    }
    if let Some(first) = family.first_mut() {
        first.separator = Separator::Space;
        out.push(("font-family".to_string(), Expression::from_terms(family)));
    }
    out
}
