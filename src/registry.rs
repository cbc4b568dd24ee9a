use std::collections::HashMap;
use std::sync::OnceLock;

use crate::computed::Resolver;
use crate::dom::NodeId;
use crate::error::ConvertError;
use crate::expr::{Expression, Separator, Term, TermValue};
use crate::shorthand::LIST_STYLE_TYPES;
use crate::units::{self, BORDER_WIDTH_KEYWORDS};

pub type AppliesFn = fn(&mut Resolver<'_>, NodeId) -> Result<bool, ConvertError>;
pub type InitialFn = fn(&mut Resolver<'_>, NodeId, &str) -> Result<Expression, ConvertError>;
pub type ComputeFn =
    fn(&mut Resolver<'_>, NodeId, &str, &Expression) -> Result<Expression, ConvertError>;

#[derive(Clone, Copy)]
pub enum Initial {
    Value(&'static str),
    Func(InitialFn),
}

#[derive(Clone, Copy)]
pub enum Compute {
    PassThrough,
    Keyword(&'static [&'static str]),
    Func(ComputeFn),
}

#[derive(Clone, Copy)]
pub struct PropertyInfo {
    pub names: &'static [&'static str],
    pub inherited: bool,
    // The compute function interprets `auto` itself instead of treating
    // it as forced inheritance.
    pub handles_auto: bool,
    pub applies: AppliesFn,
    pub initial: Initial,
    pub compute: Compute,
}

pub struct Registry {
    entries: Vec<PropertyInfo>,
    index: HashMap<&'static str, usize>,
}

impl Registry {
    pub fn new(entries: Vec<PropertyInfo>) -> Self {
        let mut index = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for name in entry.names {
                index.insert(*name, idx);
            }
        }
        Self { entries, index }
    }

    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(|| Registry::new(standard_entries()))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyInfo> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().flat_map(|entry| entry.names.iter().copied())
    }

    pub fn is_single_valued(&self, name: &str) -> bool {
        self.contains(name) && !TERM_LIST_PROPERTIES.contains(&name)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

const TERM_LIST_PROPERTIES: &[&str] = &[
    "font-family",
    "text-decoration",
    "border-spacing",
    "background-position",
];
const DIRECTIONS: &[&str] = &["ltr", "rtl"];
const VISIBILITY: &[&str] = &["visible", "hidden", "collapse"];
const LIST_POSITIONS: &[&str] = &["outside", "inside"];
const FONT_STYLES: &[&str] = &["normal", "italic", "oblique"];
const FONT_VARIANTS: &[&str] = &["normal", "small-caps"];
const TEXT_TRANSFORMS: &[&str] = &["none", "capitalize", "uppercase", "lowercase"];
const WHITE_SPACE: &[&str] = &["normal", "pre", "nowrap", "pre-wrap", "pre-line"];
const CAPTION_SIDES: &[&str] = &["top", "bottom"];
const BORDER_COLLAPSE: &[&str] = &["separate", "collapse"];
const EMPTY_CELLS: &[&str] = &["show", "hide"];
const POSITIONS: &[&str] = &["static", "relative", "absolute", "fixed"];
const FLOATS: &[&str] = &["none", "left", "right"];
const UNICODE_BIDI: &[&str] = &[
    "normal",
    "embed",
    "bidi-override",
    "isolate",
    "isolate-override",
    "plaintext",
];
const BACKGROUND_REPEATS: &[&str] = &["repeat", "repeat-x", "repeat-y", "no-repeat"];
const BACKGROUND_ATTACHMENTS: &[&str] = &["scroll", "fixed", "local"];
const TABLE_LAYOUTS: &[&str] = &["auto", "fixed"];
const TEXT_ALIGNS: &[&str] = &["left", "right", "center", "justify"];
const TEXT_DECORATIONS: &[&str] = &["underline", "overline", "line-through", "blink"];
const VERTICAL_ALIGNS: &[&str] = &[
    "baseline",
    "sub",
    "super",
    "top",
    "text-top",
    "middle",
    "bottom",
    "text-bottom",
];

const DISPLAYS: &[&str] = &[
    "inline",
    "block",
    "list-item",
    "inline-block",
    "table",
    "inline-table",
    "table-row-group",
    "table-header-group",
    "table-footer-group",
    "table-row",
    "table-column-group",
    "table-column",
    "table-cell",
    "table-caption",
    "none",
];

const TABLE_DISPLAYS: &[&str] = &[
    "table",
    "inline-table",
    "table-row-group",
    "table-header-group",
    "table-footer-group",
    "table-row",
    "table-column-group",
    "table-column",
    "table-cell",
    "table-caption",
];

const TABLE_INTERNAL_DISPLAYS: &[&str] = &[
    "table-row-group",
    "table-header-group",
    "table-footer-group",
    "table-row",
    "table-column-group",
    "table-column",
    "table-cell",
];

const BLOCK_CONTENT_TAGS: &[&str] = &[
    "p",
    "blockquote",
    "pre",
    "ul",
    "ol",
    "dl",
    "table",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
];

fn entry(
    names: &'static [&'static str],
    inherited: bool,
    initial: Initial,
    compute: Compute,
) -> PropertyInfo {
    PropertyInfo {
        names,
        inherited,
        handles_auto: false,
        applies: always,
        initial,
        compute,
    }
}

fn handling_auto(info: PropertyInfo) -> PropertyInfo {
    PropertyInfo {
        handles_auto: true,
        ..info
    }
}

fn applying(info: PropertyInfo, applies: AppliesFn) -> PropertyInfo {
    PropertyInfo { applies, ..info }
}

fn standard_entries() -> Vec<PropertyInfo> {
    use Compute::{Func, Keyword, PassThrough};
    use Initial::Value;
    vec![
        entry(&["display"], false, Value("inline"), Func(compute_display)),
        entry(&["position"], false, Value("static"), Keyword(POSITIONS)),
        entry(&["float"], false, Value("none"), Keyword(FLOATS)),
        entry(&["color"], true, Value("black"), Func(compute_color)),
        entry(&["direction"], true, Value("ltr"), Keyword(DIRECTIONS)),
        entry(&["unicode-bidi"], false, Value("normal"), Keyword(UNICODE_BIDI)),
        entry(&["visibility"], true, Value("visible"), Keyword(VISIBILITY)),
        entry(&["font-size"], true, Initial::Func(initial_font_size), Func(compute_font_size)),
        entry(&["font-family"], true, Initial::Func(initial_font_family), Func(compute_font_family)),
        entry(&["font-style"], true, Value("normal"), Keyword(FONT_STYLES)),
        entry(&["font-variant"], true, Value("normal"), Keyword(FONT_VARIANTS)),
        entry(&["font-weight"], true, Value("normal"), Func(compute_font_weight)),
        entry(&["line-height"], true, Value("normal"), Func(compute_line_height)),
        entry(&["letter-spacing", "word-spacing"], true, Value("normal"), Func(compute_spacing)),
        entry(&["list-style-type"], true, Value("disc"), Keyword(&LIST_STYLE_TYPES)),
        entry(&["list-style-image"], true, Value("none"), PassThrough),
        entry(&["list-style-position"], true, Value("outside"), Keyword(LIST_POSITIONS)),
        entry(&["text-indent"], true, Value("0pt"), Func(compute_text_indent)),
        entry(&["text-align"], true, Initial::Func(initial_text_align), Func(compute_text_align)),
        entry(&["text-decoration"], false, Value("none"), Func(compute_text_decoration)),
        entry(&["text-transform"], true, Value("none"), Keyword(TEXT_TRANSFORMS)),
        entry(&["white-space"], true, Value("normal"), Keyword(WHITE_SPACE)),
        applying(
            entry(&["caption-side"], true, Value("top"), Keyword(CAPTION_SIDES)),
            applies_caption_side,
        ),
        applying(
            entry(&["border-collapse"], true, Value("separate"), Keyword(BORDER_COLLAPSE)),
            applies_table,
        ),
        applying(
            entry(&["border-spacing"], true, Value("0pt"), Func(compute_border_spacing)),
            applies_table,
        ),
        applying(
            entry(&["empty-cells"], true, Value("show"), Keyword(EMPTY_CELLS)),
            applies_table,
        ),
        handling_auto(applying(
            entry(
                &["margin-top", "margin-bottom"],
                false,
                Initial::Func(initial_vertical_margin),
                Func(compute_margin),
            ),
            applies_vertical_margin,
        )),
        handling_auto(applying(
            entry(&["margin-left", "margin-right"], false, Value("0pt"), Func(compute_margin)),
            applies_horizontal_margin,
        )),
        applying(
            entry(
                &["padding-top", "padding-right", "padding-bottom", "padding-left"],
                false,
                Value("0pt"),
                Func(compute_padding),
            ),
            applies_padding,
        ),
        entry(
            &[
                "border-top-style",
                "border-right-style",
                "border-bottom-style",
                "border-left-style",
            ],
            false,
            Value("none"),
            Func(compute_border_style),
        ),
        entry(
            &[
                "border-top-width",
                "border-right-width",
                "border-bottom-width",
                "border-left-width",
            ],
            false,
            Value("medium"),
            Func(compute_border_width),
        ),
        entry(
            &[
                "border-top-color",
                "border-right-color",
                "border-bottom-color",
                "border-left-color",
            ],
            false,
            Initial::Func(initial_border_color),
            Func(compute_border_color),
        ),
        entry(&["background-color"], false, Value("transparent"), Func(compute_background_color)),
        entry(&["background-image"], false, Value("none"), PassThrough),
        entry(&["background-repeat"], false, Value("repeat"), Keyword(BACKGROUND_REPEATS)),
        entry(
            &["background-attachment"],
            false,
            Value("scroll"),
            Keyword(BACKGROUND_ATTACHMENTS),
        ),
        entry(&["background-position"], false, Value("0% 0%"), PassThrough),
        handling_auto(applying(
            entry(&["table-layout"], false, Value("auto"), Keyword(TABLE_LAYOUTS)),
            applies_table,
        )),
        handling_auto(applying(
            entry(&["width"], false, Value("auto"), Func(compute_width)),
            applies_dimensions,
        )),
        handling_auto(applying(
            entry(&["min-width", "max-width"], false, Initial::Func(initial_min_max), Func(compute_min_max_width)),
            applies_dimensions,
        )),
        handling_auto(applying(
            entry(&["height"], false, Value("auto"), Func(compute_height)),
            applies_dimensions,
        )),
        handling_auto(applying(
            entry(&["min-height", "max-height"], false, Initial::Func(initial_min_max), Func(compute_height)),
            applies_dimensions,
        )),
        applying(
            entry(&["vertical-align"], false, Value("baseline"), Func(compute_vertical_align)),
            applies_vertical_align,
        ),
    ]
}

pub fn always(_: &mut Resolver<'_>, _: NodeId) -> Result<bool, ConvertError> {
    Ok(true)
}

fn display_of(r: &mut Resolver<'_>, node: NodeId) -> Result<String, ConvertError> {
    r.keyword(node, "display")
}

fn applies_table(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    Ok(TABLE_DISPLAYS.contains(&display_of(r, node)?.as_str()))
}

fn applies_caption_side(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    let display = display_of(r, node)?;
    Ok(matches!(display.as_str(), "table" | "inline-table" | "table-caption"))
}

// Top/bottom margins skip non-replaced inline boxes; all margins skip the
// internal table boxes.
fn applies_vertical_margin(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    let display = display_of(r, node)?;
    Ok(display != "inline" && !TABLE_INTERNAL_DISPLAYS.contains(&display.as_str()))
}

fn applies_horizontal_margin(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    let display = display_of(r, node)?;
    Ok(!TABLE_INTERNAL_DISPLAYS.contains(&display.as_str()))
}

fn applies_padding(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    let display = display_of(r, node)?;
    Ok(display == "table-cell" || !TABLE_INTERNAL_DISPLAYS.contains(&display.as_str()))
}

fn applies_dimensions(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    let display = display_of(r, node)?;
    Ok(!matches!(
        display.as_str(),
        "inline" | "table-row-group" | "table-header-group" | "table-footer-group" | "table-row"
    ))
}

fn applies_vertical_align(r: &mut Resolver<'_>, node: NodeId) -> Result<bool, ConvertError> {
    let display = display_of(r, node)?;
    Ok(matches!(
        display.as_str(),
        "inline" | "inline-block" | "inline-table" | "table-cell"
    ))
}

fn initial_font_size(r: &mut Resolver<'_>, _: NodeId, _: &str) -> Result<Expression, ConvertError> {
    Ok(Expression::pt(r.settings().default_font_size))
}

fn initial_font_family(r: &mut Resolver<'_>, _: NodeId, _: &str) -> Result<Expression, ConvertError> {
    Ok(Expression::string(&r.settings().minor_font))
}

fn initial_text_align(r: &mut Resolver<'_>, node: NodeId, _: &str) -> Result<Expression, ConvertError> {
    let align = if r.keyword(node, "direction")? == "rtl" {
        "right"
    } else {
        "left"
    };
    Ok(Expression::keyword(align))
}

fn initial_vertical_margin(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
) -> Result<Expression, ConvertError> {
    let tag = r.tree().tag(node).unwrap_or_default();
    if name == "margin-bottom" && BLOCK_CONTENT_TAGS.contains(&tag) {
        return Ok(Expression::pt(r.settings().default_block_margin));
    }
    Ok(Expression::pt(0.0))
}

fn initial_border_color(r: &mut Resolver<'_>, node: NodeId, _: &str) -> Result<Expression, ConvertError> {
    r.computed(node, "color")
}

fn initial_min_max(_: &mut Resolver<'_>, _: NodeId, name: &str) -> Result<Expression, ConvertError> {
    if name.starts_with("max-") {
        Ok(Expression::keyword("none"))
    } else {
        Ok(Expression::pt(0.0))
    }
}

fn compute_display(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let raw = expr.as_keyword().map(str::to_ascii_lowercase).unwrap_or_default();
    let display = match raw.as_str() {
        "flex" | "grid" | "flow-root" => "block".to_string(),
        "inline-flex" | "inline-grid" => "inline-block".to_string(),
        other if DISPLAYS.contains(&other) => other.to_string(),
        _ => {
            r.degraded(node, name, expr);
            "inline".to_string()
        }
    };
    if display == "none" {
        return Ok(Expression::keyword("none"));
    }
    let floated = r.keyword(node, "float")? != "none";
    let positioned = matches!(r.keyword(node, "position")?.as_str(), "absolute" | "fixed");
    if !(floated || positioned) {
        return Ok(Expression::keyword(&display));
    }
    let blockified = match display.as_str() {
        "inline-table" => "table",
        "list-item" | "table" => display.as_str(),
        _ => "block",
    };
    Ok(Expression::keyword(blockified))
}

fn compute_color(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    match expr.terms() {
        [term] if term.is_ident("transparent") => return Ok(Expression::keyword("transparent")),
        [term] if term.is_ident("currentcolor") => {
            return match r.tree().parent(node) {
                Some(parent) => r.computed(parent, name),
                None => Ok(Expression::string("000000")),
            };
        }
        _ => {}
    }
    match units::color_expression_to_hex(expr) {
        Some(hex) => Ok(Expression::string(&hex)),
        None => {
            r.degraded(node, name, expr);
            Ok(Expression::string("000000"))
        }
    }
}

fn compute_background_color(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("transparent") {
        return Ok(Expression::keyword("transparent"));
    }
    if expr.is_keyword("currentcolor") {
        return r.computed(node, "color");
    }
    match units::color_expression_to_hex(expr) {
        Some(hex) => Ok(Expression::string(&hex)),
        None => {
            r.degraded(node, name, expr);
            Ok(Expression::keyword("transparent"))
        }
    }
}

fn compute_border_color(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("transparent") {
        return Ok(Expression::keyword("transparent"));
    }
    // Initial values arrive here already computed.
    if let Some(text) = expr.as_text() {
        if text.len() == 6 && text.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(expr.clone());
        }
    }
    if expr.is_keyword("currentcolor") {
        return r.computed(node, "color");
    }
    match units::color_expression_to_hex(expr) {
        Some(hex) => Ok(Expression::string(&hex)),
        None => {
            r.degraded(node, name, expr);
            r.computed(node, "color")
        }
    }
}

fn compute_font_size(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let term = expr.single(name)?;
    let pt = match &term.value {
        TermValue::Ident(keyword) => {
            let keyword = keyword.to_ascii_lowercase();
            match keyword.as_str() {
                "larger" => units::larger_font_size(r.parent_font_size_pt(node)?),
                "smaller" => units::smaller_font_size(r.parent_font_size_pt(node)?),
                other => match units::font_size_keyword(other) {
                    Some(pt) => pt,
                    None => {
                        r.degraded(node, name, expr);
                        r.parent_font_size_pt(node)?
                    }
                },
            }
        }
        TermValue::Dimension(value, unit) => match units::absolute_to_pt(*value, unit) {
            Some(pt) => pt,
            None => match unit.as_str() {
                "em" => value * r.parent_font_size_pt(node)?,
                "ex" => value * r.parent_font_size_pt(node)? / 2.0,
                "rem" => {
                    let root = r.tree().root();
                    let base = if root == node {
                        r.settings().default_font_size
                    } else {
                        r.font_size_pt(root)?
                    };
                    value * base
                }
                _ => {
                    r.degraded(node, name, expr);
                    r.parent_font_size_pt(node)?
                }
            },
        },
        TermValue::Percentage(pct) => r.parent_font_size_pt(node)? * pct / 100.0,
        TermValue::Number(value) if *value == 0.0 => 0.0,
        _ => {
            r.degraded(node, name, expr);
            r.parent_font_size_pt(node)?
        }
    };
    Ok(Expression::pt(pt.max(0.0)))
}

fn compute_font_family(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let mut families = Vec::new();
    for group in expr.comma_groups() {
        let words: Vec<String> = group
            .iter()
            .filter_map(|term| match &term.value {
                TermValue::Str(text) | TermValue::Ident(text) => Some(text.trim().to_string()),
                _ => None,
            })
            .filter(|word| !word.is_empty())
            .collect();
        if words.is_empty() {
            continue;
        }
        let separator = if families.is_empty() {
            Separator::Space
        } else {
            Separator::Comma
        };
        families.push(Term {
            separator,
            value: TermValue::Str(words.join(" ")),
        });
    }
    if families.is_empty() {
        r.degraded(node, name, expr);
        return Ok(Expression::string(&r.settings().minor_font));
    }
    Ok(Expression::from_terms(families))
}

fn compute_font_weight(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if let Some(weight) = expr.as_number() {
        return Ok(Expression::number(weight.clamp(1.0, 1000.0)));
    }
    let keyword = expr.as_keyword().map(str::to_ascii_lowercase).unwrap_or_default();
    let weight = match keyword.as_str() {
        "normal" => 400.0,
        "bold" => 700.0,
        "bolder" | "lighter" => {
            let parent = match r.tree().parent(node) {
                Some(parent) => r.computed(parent, name)?.as_number().unwrap_or(400.0),
                None => 400.0,
            };
            if keyword == "bolder" {
                bolder(parent)
            } else {
                lighter(parent)
            }
        }
        _ => {
            r.degraded(node, name, expr);
            400.0
        }
    };
    Ok(Expression::number(weight))
}

fn bolder(parent: f64) -> f64 {
    if parent < 350.0 {
        400.0
    } else if parent < 550.0 {
        700.0
    } else {
        900.0
    }
}

fn lighter(parent: f64) -> f64 {
    if parent < 550.0 {
        100.0
    } else if parent < 750.0 {
        400.0
    } else {
        700.0
    }
}

fn compute_line_height(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("normal") {
        return Ok(Expression::keyword("normal"));
    }
    if let Some(factor) = expr.as_number() {
        return Ok(Expression::number(factor));
    }
    let font_size = Expression::pt(r.font_size_pt(node)?);
    r.length(node, name, expr, Some(&font_size))
}

fn compute_spacing(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("normal") {
        return Ok(Expression::keyword("normal"));
    }
    let font_size = Expression::pt(r.font_size_pt(node)?);
    r.length(node, name, expr, Some(&font_size))
}

fn compute_text_indent(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let reference = r.containing_width(node)?;
    r.length(node, name, expr, Some(&reference))
}

fn compute_text_align(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let keyword = expr.as_keyword().map(str::to_ascii_lowercase).unwrap_or_default();
    if TEXT_ALIGNS.contains(&keyword.as_str()) {
        return Ok(Expression::keyword(&keyword));
    }
    let rtl = r.keyword(node, "direction")? == "rtl";
    let align = match keyword.as_str() {
        "start" => {
            if rtl {
                "right"
            } else {
                "left"
            }
        }
        "end" => {
            if rtl {
                "left"
            } else {
                "right"
            }
        }
        _ => {
            r.degraded(node, name, expr);
            return initial_text_align(r, node, name);
        }
    };
    Ok(Expression::keyword(align))
}

fn compute_text_decoration(
    _: &mut Resolver<'_>,
    _: NodeId,
    _: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let lines: Vec<Term> = expr
        .terms()
        .iter()
        .filter_map(|term| term.ident().map(str::to_ascii_lowercase))
        .filter(|ident| TEXT_DECORATIONS.contains(&ident.as_str()))
        .map(|ident| Term::new(TermValue::Ident(ident)))
        .collect();
    if lines.is_empty() {
        return Ok(Expression::keyword("none"));
    }
    Ok(Expression::from_terms(lines))
}

fn compute_border_spacing(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let mut out = Vec::new();
    for term in expr.terms().iter().take(2) {
        let single = Expression::from_terms(vec![Term::new(term.value.clone())]);
        let value = r.length(node, name, &single, None)?;
        match value.as_pt() {
            Some(pt) => out.push(Term::new(TermValue::Dimension(pt.max(0.0), "pt".to_string()))),
            None => {
                r.degraded(node, name, expr);
                return Ok(Expression::pt(0.0));
            }
        }
    }
    if out.is_empty() {
        return Ok(Expression::pt(0.0));
    }
    Ok(Expression::from_terms(out))
}

fn compute_margin(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("auto") {
        return Ok(Expression::keyword("auto"));
    }
    let reference = r.containing_width(node)?;
    r.length(node, name, expr, Some(&reference))
}

fn compute_padding(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let reference = r.containing_width(node)?;
    let value = r.length(node, name, expr, Some(&reference))?;
    match value.as_pt() {
        Some(pt) => Ok(Expression::pt(pt.max(0.0))),
        None => {
            r.degraded(node, name, expr);
            Ok(Expression::pt(0.0))
        }
    }
}

fn side_of(name: &str) -> &str {
    name.split('-').nth(1).unwrap_or("top")
}

fn compute_border_style(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    match expr.as_keyword() {
        Some(keyword) if units::is_border_style(keyword) => {
            Ok(Expression::keyword(&keyword.to_ascii_lowercase()))
        }
        _ => {
            r.degraded(node, name, expr);
            Ok(Expression::keyword("none"))
        }
    }
}

// Keywords use the border-specific thin/medium/thick table, not the one
// the generic length conversion applies.
fn compute_border_width(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    let style = r.keyword(node, &format!("border-{}-style", side_of(name)))?;
    if style == "none" || style == "hidden" {
        return Ok(Expression::pt(0.0));
    }
    if let Some(keyword) = expr.as_keyword() {
        if let Some(pt) = units::keyword_width(&BORDER_WIDTH_KEYWORDS, keyword) {
            return Ok(Expression::pt(pt));
        }
    }
    let value = r.length(node, name, expr, None)?;
    match value.as_pt() {
        Some(pt) => Ok(Expression::pt(pt.max(0.0))),
        None => {
            r.degraded(node, name, expr);
            Ok(Expression::pt(units::keyword_width(&BORDER_WIDTH_KEYWORDS, "medium").unwrap_or(3.0)))
        }
    }
}

// Block-level `auto` widths take the parent's width; table parts and
// inline boxes keep `auto`.
fn compute_width(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("auto") {
        let tag = r.tree().tag(node).unwrap_or_default();
        if matches!(tag, "caption" | "td" | "th" | "tr" | "table") {
            return Ok(Expression::keyword("auto"));
        }
        if r.keyword(node, "display")? == "inline" {
            return Ok(Expression::keyword("auto"));
        }
        return match r.tree().parent(node) {
            Some(parent) => r.computed(parent, name),
            None => Ok(r.page_width()),
        };
    }
    let reference = r.containing_width(node)?;
    r.length(node, name, expr, Some(&reference))
}

fn compute_min_max_width(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("none") || expr.is_keyword("auto") {
        return Ok(Expression::keyword(
            &expr.as_keyword().unwrap_or("none").to_ascii_lowercase(),
        ));
    }
    let reference = r.containing_width(node)?;
    r.length(node, name, expr, Some(&reference))
}

fn compute_height(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if expr.is_keyword("none") || expr.is_keyword("auto") {
        return Ok(Expression::keyword(
            &expr.as_keyword().unwrap_or("auto").to_ascii_lowercase(),
        ));
    }
    let reference = match r.tree().parent(node) {
        Some(parent) => r.computed(parent, "height")?,
        None => Expression::keyword("auto"),
    };
    r.length(node, name, expr, Some(&reference))
}

fn compute_vertical_align(
    r: &mut Resolver<'_>,
    node: NodeId,
    name: &str,
    expr: &Expression,
) -> Result<Expression, ConvertError> {
    if let Some(keyword) = expr.as_keyword() {
        let keyword = keyword.to_ascii_lowercase();
        if VERTICAL_ALIGNS.contains(&keyword.as_str()) {
            return Ok(Expression::keyword(&keyword));
        }
        r.degraded(node, name, expr);
        return Ok(Expression::keyword("baseline"));
    }
    let font_size = Expression::pt(r.font_size_pt(node)?);
    r.length(node, name, expr, Some(&font_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeContext, CascadedProperty, DeclaredStyles, Sheets, Tier, declare};
    use crate::dom::StyleTree;
    use crate::settings::Settings;
    use crate::sheet::Stylesheet;

    fn declared_for(tree: &StyleTree, author: &str, settings: &Settings) -> DeclaredStyles {
        let sheets = Sheets {
            author: Stylesheet::parse(author, None),
            ..Sheets::default()
        };
        let ctx = CascadeContext {
            registry: Registry::standard(),
            settings,
            debug: None,
            perf: None,
            doc_id: None,
        };
        declare(tree, &sheets, &ctx)
    }

    #[test]
    fn covers_the_documented_property_set() {
        let registry = Registry::standard();
        for name in [
            "color",
            "direction",
            "line-height",
            "visibility",
            "list-style-type",
            "list-style-image",
            "list-style-position",
            "font-family",
            "font-style",
            "font-variant",
            "font-weight",
            "font-size",
            "text-indent",
            "text-align",
            "text-decoration",
            "text-transform",
            "letter-spacing",
            "word-spacing",
            "white-space",
            "caption-side",
            "border-collapse",
            "border-spacing",
            "empty-cells",
            "margin-top",
            "margin-left",
            "padding-bottom",
            "border-left-width",
            "border-right-style",
            "border-top-color",
            "display",
            "position",
            "float",
            "unicode-bidi",
            "background-color",
            "table-layout",
            "width",
            "min-width",
            "max-width",
            "height",
            "min-height",
            "max-height",
            "vertical-align",
        ] {
            assert!(registry.contains(name), "{name}");
        }
        assert!(!registry.contains("margin"), "shorthands are not registered");
    }

    #[test]
    fn colors_compute_to_bare_hex() {
        let mut tree = StyleTree::new("body");
        let root = tree.root();
        let a = tree.append_element(root, "p", &[("style", "color: #0A3")]);
        let b = tree.append_element(root, "p", &[("style", "color: rgb(255, 128, 0)")]);
        let c = tree.append_element(root, "p", &[("style", "color: navy; border-left-style: solid")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert_eq!(r.computed(a, "color").expect("a").to_string(), "00aa33");
        assert_eq!(r.computed(b, "color").expect("b").to_string(), "ff8000");
        assert_eq!(r.computed(c, "color").expect("c").to_string(), "000080");
        assert_eq!(
            r.computed(c, "border-left-color").expect("border").to_string(),
            "000080"
        );
        assert_eq!(r.computed(root, "color").expect("root").to_string(), "000000");
    }

    #[test]
    fn unknown_border_style_degrades_to_none() {
        let tree = StyleTree::new("p");
        let settings = Settings::default();
        let declared = DeclaredStyles::default();
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let style = compute_border_style(
            &mut r,
            tree.root(),
            "border-top-style",
            &Expression::keyword("wavy"),
        )
        .expect("style");
        assert!(style.is_keyword("none"));
    }

    #[test]
    fn font_weight_keywords_and_relative_steps() {
        let mut tree = StyleTree::new("body");
        let b = tree.append_element(tree.root(), "b", &[("style", "font-weight: bold")]);
        let bolder = tree.append_element(b, "span", &[("style", "font-weight: bolder")]);
        let lighter = tree.append_element(b, "span", &[("style", "font-weight: lighter")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert_eq!(r.computed(tree.root(), "font-weight").expect("root").as_number(), Some(400.0));
        assert_eq!(r.computed(b, "font-weight").expect("b").as_number(), Some(700.0));
        assert_eq!(r.computed(bolder, "font-weight").expect("bolder").as_number(), Some(900.0));
        assert_eq!(r.computed(lighter, "font-weight").expect("lighter").as_number(), Some(400.0));
    }

    #[test]
    fn text_align_initial_follows_direction() {
        let mut tree = StyleTree::new("body");
        let rtl = tree.append_element(tree.root(), "p", &[("dir", "rtl")]);
        let ltr = tree.append_element(tree.root(), "p", &[]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(r.computed(rtl, "text-align").expect("rtl").is_keyword("left"));
        assert!(r.computed(ltr, "text-align").expect("ltr").is_keyword("left"));
        let mut tree = StyleTree::new("body");
        let rtl = tree.append_element(tree.root(), "p", &[("dir", "rtl"), ("style", "text-align: inherit")]);
        let declared = declared_for(&tree, "body { direction: rtl }", &settings);
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(r.computed(rtl, "text-align").expect("rtl").is_keyword("right"));
    }

    #[test]
    fn floats_blockify_inline_display() {
        let mut tree = StyleTree::new("body");
        let span = tree.append_element(tree.root(), "span", &[("style", "float: left")]);
        let abs = tree.append_element(tree.root(), "em", &[("style", "position: absolute; display: inline-table")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(r.computed(span, "display").expect("span").is_keyword("block"));
        assert!(r.computed(abs, "display").expect("abs").is_keyword("table"));
    }

    #[test]
    fn block_content_tags_default_bottom_margin() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(tree.root(), "p", &[]);
        let div = tree.append_element(tree.root(), "div", &[("style", "display: block")]);
        let settings = Settings {
            default_block_margin: 6.0,
            ..Settings::default()
        };
        let declared = declared_for(&tree, "p { display: block }", &settings);
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert_eq!(r.computed(p, "margin-bottom").expect("p").as_pt(), Some(6.0));
        assert_eq!(r.computed(p, "margin-top").expect("p").as_pt(), Some(0.0));
        assert_eq!(r.computed(div, "margin-bottom").expect("div").as_pt(), Some(0.0));
    }

    #[test]
    fn auto_on_a_property_that_ignores_it_forces_inheritance() {
        let mut tree = StyleTree::new("body");
        let div = tree.append_element(tree.root(), "div", &[("style", "text-transform: uppercase")]);
        let span = tree.append_element(div, "span", &[("style", "margin-left: auto")]);
        let settings = Settings::default();
        let mut declared = declared_for(&tree, "", &settings);
        declared.offer(
            span,
            CascadedProperty {
                name: "text-transform".to_string(),
                value: Expression::keyword("auto"),
                tier: Tier::AuthorNormal,
                specificity: Default::default(),
                sequence: 99,
            },
        );
        let mut r = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(r.computed(span, "margin-left").expect("margin").is_keyword("auto"));
        assert!(r.computed(span, "text-transform").expect("transform").is_keyword("uppercase"));
    }
}
