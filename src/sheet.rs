use lightningcss::declaration::DeclarationBlock;
use lightningcss::media_query::{MediaList, MediaQuery, MediaType, Qualifier};
use lightningcss::properties::Property;
use lightningcss::rules::page::PageRule;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;

use crate::debug::{DebugLogger, json_string};
use crate::expr::Expression;
use crate::registry::Registry;
use crate::selector::{Selector, split_selector_list};
use crate::settings::{PageGeometry, Settings};
use crate::types::{Pt, Size};
use crate::units;

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: Expression,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: &str, value: &str, important: bool) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            value: Expression::parse(value),
            important,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<RuleSet>,
    page: PageSetup,
}

impl Stylesheet {
    pub fn parse(css: &str, debug: Option<&DebugLogger>) -> Self {
        let mut out = Stylesheet::default();
        if css.trim().is_empty() {
            return out;
        }
        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        let sheet = match StyleSheet::parse(css, options) {
            Ok(sheet) => sheet,
            Err(err) => {
                if let Some(logger) = debug {
                    logger.log_event("css.parse_error", &[("error", &err.to_string())]);
                    logger.increment("css.sheet_unparsed", 1);
                }
                return out;
            }
        };
        collect_rules(&sheet.rules, &mut out, debug);
        out
    }

    pub fn from_rules(rules: Vec<RuleSet>) -> Self {
        Self {
            rules,
            page: PageSetup::default(),
        }
    }

    pub fn rules(&self) -> &[RuleSet] {
        &self.rules
    }

    pub fn page(&self) -> &PageSetup {
        &self.page
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn extend(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
        self.page.merge(&other.page);
    }
}

fn collect_rules(rules: &CssRuleList, out: &mut Stylesheet, debug: Option<&DebugLogger>) {
    for rule in &rules.0 {
        match rule {
            CssRule::Style(style) => {
                let selector_text = style
                    .selectors
                    .to_css_string(PrinterOptions::default())
                    .unwrap_or_default();
                let selectors = parse_selector_text(&selector_text, debug);
                if !style.rules.0.is_empty() {
                    if let Some(logger) = debug {
                        logger.increment("css.nested_rules_skipped", style.rules.0.len() as u64);
                    }
                }
                if selectors.is_empty() {
                    continue;
                }
                let declarations = declarations_from_block(&style.declarations, debug);
                if declarations.is_empty() {
                    continue;
                }
                out.rules.push(RuleSet {
                    selectors,
                    declarations,
                });
            }
            CssRule::Media(media) => {
                if media_list_matches(&media.query, debug) {
                    collect_rules(&media.rules, out, debug);
                }
            }
            CssRule::Page(page) => {
                if page_rule_targets_default(page) {
                    for decl in declarations_from_block(&page.declarations, debug) {
                        out.page.apply_declaration(&decl);
                    }
                } else if let Some(logger) = debug {
                    logger.increment("css.page_rule_named_skipped", 1);
                }
            }
            _ => {
                if let Some(logger) = debug {
                    logger.increment("css.at_rule_skipped", 1);
                }
            }
        }
    }
}

fn parse_selector_text(text: &str, debug: Option<&DebugLogger>) -> Vec<Selector> {
    let mut selectors = Vec::new();
    for raw in split_selector_list(text) {
        let raw = raw.trim();
        let parsed = Selector::parse(raw);
        if let Some(logger) = debug {
            logger.log_json(&format!(
                "{{\"type\":\"css.rule\",\"selector\":{},\"parsed\":{}}}",
                json_string(raw),
                parsed.is_some()
            ));
            if parsed.is_none() {
                logger.increment("css.selector_unparsed", 1);
            }
        }
        if let Some(selector) = parsed {
            selectors.push(selector);
        }
    }
    selectors
}

// Normal declarations first, then important ones. Relative order between
// the two groups never matters since they land in different tiers.
fn declarations_from_block(
    block: &DeclarationBlock,
    debug: Option<&DebugLogger>,
) -> Vec<Declaration> {
    let normal = block
        .declarations
        .iter()
        .filter_map(|property| declaration_from_property(property, false, debug));
    let important = block
        .important_declarations
        .iter()
        .filter_map(|property| declaration_from_property(property, true, debug));
    normal.chain(important).collect()
}

fn declaration_from_property(
    property: &Property,
    important: bool,
    debug: Option<&DebugLogger>,
) -> Option<Declaration> {
    let id = property.property_id();
    let name = id.name().to_ascii_lowercase();
    if name.starts_with("--") {
        return None;
    }
    let value = match property {
        // lightningcss could not type the value; keep its tokens unless they
        // hold references nothing here can resolve.
        Property::Unparsed(unparsed) => match Expression::from_tokens(&unparsed.value.0) {
            Some(value) => value,
            None => {
                log_dropped_declaration(debug, &name, &Expression::default(), "unparsed_value");
                return None;
            }
        },
        Property::Custom(custom) => Expression::from_tokens(&custom.value.0)?,
        _ => Expression::parse(
            &property
                .value_to_css_string(PrinterOptions::default())
                .ok()?,
        ),
    };
    if value.is_empty() {
        return None;
    }
    if value.len() > 1 && Registry::standard().is_single_valued(&name) {
        log_dropped_declaration(debug, &name, &value, "multiple_terms");
        return None;
    }
    Some(Declaration {
        name,
        value,
        important,
    })
}

fn log_dropped_declaration(
    debug: Option<&DebugLogger>,
    name: &str,
    value: &Expression,
    reason: &str,
) {
    if let Some(logger) = debug {
        logger.log_event(
            "DECLARATION_NO_EFFECT",
            &[
                ("property", name),
                ("value", &value.to_string()),
                ("reason", reason),
            ],
        );
        logger.increment("css.declaration_dropped", 1);
    }
}

pub fn parse_inline_style(text: &str, debug: Option<&DebugLogger>) -> Vec<Declaration> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let options = ParserOptions {
        error_recovery: true,
        ..ParserOptions::default()
    };
    match StyleAttribute::parse(text, options) {
        Ok(attr) => declarations_from_block(&attr.declarations, debug),
        Err(err) => {
            if let Some(logger) = debug {
                logger.log_event(
                    "css.inline_parse_error",
                    &[("style", text), ("error", &err.to_string())],
                );
                logger.increment("css.inline_unparsed", 1);
            }
            Vec::new()
        }
    }
}

// Paged output: all/print apply, a bare `not screen` applies, feature
// conditions are not evaluated.
fn media_list_matches(list: &MediaList, debug: Option<&DebugLogger>) -> bool {
    if list.media_queries.is_empty() {
        return true;
    }
    let matched = list
        .media_queries
        .iter()
        .any(|query| media_query_matches(query, debug));
    if let Some(logger) = debug {
        let key = if matched {
            "css.media.matched"
        } else {
            "css.media.unmatched"
        };
        logger.increment(key, 1);
    }
    matched
}

fn media_query_matches(query: &MediaQuery, debug: Option<&DebugLogger>) -> bool {
    if query.condition.is_some() {
        if let Some(logger) = debug {
            logger.increment("css.media.unsupported", 1);
        }
        return false;
    }
    let targets_print = matches!(query.media_type, MediaType::All | MediaType::Print);
    match query.qualifier {
        Some(Qualifier::Not) => !targets_print,
        _ => targets_print,
    }
}

fn page_rule_targets_default(rule: &PageRule) -> bool {
    if rule.selectors.is_empty() {
        return true;
    }
    rule.selectors
        .iter()
        .any(|selector| selector.name.is_none() && selector.pseudo_classes.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageSetup {
    pub size: Option<Size>,
    pub margin_top: Option<Pt>,
    pub margin_right: Option<Pt>,
    pub margin_bottom: Option<Pt>,
    pub margin_left: Option<Pt>,
}

impl PageSetup {
    pub fn is_empty(&self) -> bool {
        *self == PageSetup::default()
    }

    pub fn merge(&mut self, other: &PageSetup) {
        self.size = other.size.or(self.size);
        self.margin_top = other.margin_top.or(self.margin_top);
        self.margin_right = other.margin_right.or(self.margin_right);
        self.margin_bottom = other.margin_bottom.or(self.margin_bottom);
        self.margin_left = other.margin_left.or(self.margin_left);
    }

    pub fn apply_to(&self, page: PageGeometry) -> PageGeometry {
        let mut out = page;
        if let Some(size) = self.size {
            out.width = size.width.to_twips();
            out.height = size.height.to_twips();
        }
        if let Some(pt) = self.margin_top {
            out.top_margin = pt.to_twips();
        }
        if let Some(pt) = self.margin_right {
            out.right_margin = pt.to_twips();
        }
        if let Some(pt) = self.margin_bottom {
            out.bottom_margin = pt.to_twips();
        }
        if let Some(pt) = self.margin_left {
            out.left_margin = pt.to_twips();
        }
        out
    }

    fn apply_declaration(&mut self, decl: &Declaration) {
        match decl.name.as_str() {
            "size" => {
                if let Some(size) = page_size_from_expression(&decl.value) {
                    self.size = Some(size);
                }
            }
            "margin" => {
                let edges: Option<Vec<Pt>> = decl
                    .value
                    .terms()
                    .iter()
                    .map(|term| units::absolute_term_pt(term).map(Pt::from_f64))
                    .collect();
                let Some(edges) = edges else {
                    return;
                };
                let (top, right, bottom, left) = match edges.as_slice() {
                    [all] => (*all, *all, *all, *all),
                    [v, h] => (*v, *h, *v, *h),
                    [t, h, b] => (*t, *h, *b, *h),
                    [t, r, b, l] => (*t, *r, *b, *l),
                    _ => return,
                };
                self.margin_top = Some(top);
                self.margin_right = Some(right);
                self.margin_bottom = Some(bottom);
                self.margin_left = Some(left);
            }
            "margin-top" => self.margin_top = absolute_pt(&decl.value).or(self.margin_top),
            "margin-right" => self.margin_right = absolute_pt(&decl.value).or(self.margin_right),
            "margin-bottom" => {
                self.margin_bottom = absolute_pt(&decl.value).or(self.margin_bottom)
            }
            "margin-left" => self.margin_left = absolute_pt(&decl.value).or(self.margin_left),
            _ => {}
        }
    }
}

fn absolute_pt(value: &Expression) -> Option<Pt> {
    match value.terms() {
        [term] => units::absolute_term_pt(term).map(Pt::from_f64),
        _ => None,
    }
}

fn page_size_from_expression(value: &Expression) -> Option<Size> {
    let terms = value.terms();
    let lengths: Vec<f64> = terms.iter().filter_map(units::absolute_term_pt).collect();
    match lengths.as_slice() {
        [side] if terms.len() == 1 => {
            return Some(Size {
                width: Pt::from_f64(*side),
                height: Pt::from_f64(*side),
            });
        }
        [width, height] if terms.len() == 2 => {
            return Some(Size {
                width: Pt::from_f64(*width),
                height: Pt::from_f64(*height),
            });
        }
        _ => {}
    }
    let mut size: Option<Size> = None;
    let mut orientation: Option<String> = None;
    for term in terms {
        let Some(ident) = term.ident() else {
            return None;
        };
        let ident = ident.to_ascii_lowercase();
        if let Some(named) = page_named_size(&ident) {
            size = Some(named);
        } else if ident == "landscape" || ident == "portrait" {
            orientation = Some(ident);
        } else if ident != "auto" {
            return None;
        }
    }
    let size = match (size, orientation.as_deref()) {
        (Some(size), Some(orientation)) => orient_page_size(size, orientation),
        (Some(size), None) => size,
        (None, Some(orientation)) => orient_page_size(Size::a4(), orientation),
        (None, None) => return None,
    };
    Some(size)
}

fn page_named_size(name: &str) -> Option<Size> {
    match name {
        "a5" => Some(Size::from_mm(148.0, 210.0)),
        "a4" => Some(Size::a4()),
        "a3" => Some(Size::from_mm(297.0, 420.0)),
        "letter" => Some(Size::letter()),
        "legal" => Some(Size::from_inches(8.5, 14.0)),
        "ledger" | "tabloid" => Some(Size::from_inches(11.0, 17.0)),
        _ => None,
    }
}

fn orient_page_size(size: Size, orientation: &str) -> Size {
    match orientation {
        "landscape" => size.landscape(),
        "portrait" => size.portrait(),
        _ => size,
    }
}

const BLOCK_TAGS: &[&str] = &[
    "html", "body", "div", "p", "blockquote", "pre", "h1", "h2", "h3", "h4", "h5", "h6", "ul",
    "ol", "dl", "dt", "dd", "address", "center", "form", "hr", "fieldset", "section", "article",
    "header", "footer", "nav", "aside", "main", "figure", "figcaption", "menu", "dir",
];

pub fn default_css(settings: &Settings) -> String {
    let mut css = String::new();
    css.push_str(&BLOCK_TAGS.join(", "));
    css.push_str(" { display: block }\n");
    css.push_str(
        "li { display: list-item }\n\
         table { display: table }\n\
         caption { display: table-caption; text-align: center }\n\
         thead { display: table-header-group }\n\
         tbody { display: table-row-group }\n\
         tfoot { display: table-footer-group }\n\
         tr { display: table-row }\n\
         td, th { display: table-cell }\n\
         col { display: table-column }\n\
         colgroup { display: table-column-group }\n\
         head, script, style, title, meta, link { display: none }\n\
         h1 { font-size: 2em }\n\
         h2 { font-size: 1.5em }\n\
         h3 { font-size: 1.17em }\n\
         h4 { font-size: 1em }\n\
         h5 { font-size: 0.83em }\n\
         h6 { font-size: 0.67em }\n",
    );
    css.push_str(&format!(
        "h1, h2, h3, h4, h5, h6 {{ font-weight: bold; font-family: {} }}\n",
        css_string(&settings.major_font)
    ));
    css.push_str(
        "b, strong, th { font-weight: bold }\n\
         i, em, cite, var, address { font-style: italic }\n\
         u, ins { text-decoration: underline }\n\
         s, strike, del { text-decoration: line-through }\n\
         pre { white-space: pre }\n\
         pre, code, tt, kbd, samp { font-family: \"Courier New\", monospace }\n\
         ul { list-style-type: disc }\n\
         ol { list-style-type: decimal }\n\
         ul, ol { margin-left: 36pt }\n\
         ul ul, ol ol, ul ol, ol ul { margin-bottom: 0pt }\n\
         blockquote { margin-left: 36pt; margin-right: 36pt }\n\
         sup { vertical-align: super; font-size: smaller }\n\
         sub { vertical-align: sub; font-size: smaller }\n\
         center, th { text-align: center }\n\
         td, th { vertical-align: middle }\n",
    );
    css
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
