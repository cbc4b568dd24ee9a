use std::collections::HashMap;

use crate::computed::{StyledTree, materialize};
use crate::debug::DebugLogger;
use crate::dom::{NodeId, StyleTree};
use crate::error::ConvertError;
use crate::expr::Expression;
use crate::perf::{PerfLogger, timed};
use crate::registry::Registry;
use crate::selector::Specificity;
use crate::settings::Settings;
use crate::sheet::{Declaration, Stylesheet, parse_inline_style};
use crate::shorthand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    InitialValue,
    Inherited,
    UserAgentNormal,
    UserAgentHigh,
    UserNormal,
    AuthorNormal,
    AuthorHigh,
    HtmlAttribute,
    StyleAttributeNormal,
    StyleAttributeHigh,
    UserHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    UserAgent,
    User,
    Author,
}

impl Origin {
    pub fn tier(self, important: bool) -> Tier {
        match (self, important) {
            (Origin::UserAgent, false) => Tier::UserAgentNormal,
            (Origin::UserAgent, true) => Tier::UserAgentHigh,
            (Origin::User, false) => Tier::UserNormal,
            (Origin::User, true) => Tier::UserHigh,
            (Origin::Author, false) => Tier::AuthorNormal,
            (Origin::Author, true) => Tier::AuthorHigh,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Origin::UserAgent => "user_agent",
            Origin::User => "user",
            Origin::Author => "author",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadedProperty {
    pub name: String,
    pub value: Expression,
    pub tier: Tier,
    pub specificity: Specificity,
    pub sequence: u64,
}

impl CascadedProperty {
    fn rank(&self) -> (Tier, Specificity, u64) {
        (self.tier, self.specificity, self.sequence)
    }

    pub fn outranks(&self, other: &CascadedProperty) -> bool {
        self.rank() > other.rank()
    }
}

#[derive(Debug, Default)]
pub struct Sequence {
    next: u64,
}

impl Sequence {
    pub fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

#[derive(Debug, Default)]
pub struct DeclaredStyles {
    by_node: HashMap<NodeId, HashMap<String, CascadedProperty>>,
}

impl DeclaredStyles {
    // Stores `candidate` unless an equal-or-higher property is already
    // there. Returns whether it was stored.
    pub fn offer(&mut self, node: NodeId, candidate: CascadedProperty) -> bool {
        let slot = self.by_node.entry(node).or_default();
        match slot.get(&candidate.name) {
            Some(stored) if !candidate.outranks(stored) => false,
            _ => {
                slot.insert(candidate.name.clone(), candidate);
                true
            }
        }
    }

    pub fn get(&self, node: NodeId, name: &str) -> Option<&CascadedProperty> {
        self.by_node.get(&node)?.get(name)
    }

    pub fn properties(&self, node: NodeId) -> Vec<&CascadedProperty> {
        let mut out: Vec<&CascadedProperty> = self
            .by_node
            .get(&node)
            .map(|props| props.values().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sheets {
    pub user_agent: Stylesheet,
    pub user: Stylesheet,
    pub author: Stylesheet,
}

pub struct CascadeContext<'a> {
    pub registry: &'a Registry,
    pub settings: &'a Settings,
    pub debug: Option<&'a DebugLogger>,
    pub perf: Option<&'a PerfLogger>,
    pub doc_id: Option<usize>,
}

pub fn apply_all(
    tree: StyleTree,
    sheets: &Sheets,
    ctx: &CascadeContext<'_>,
) -> Result<StyledTree, ConvertError> {
    let declared = declare(&tree, sheets, ctx);
    let computed = timed(ctx.perf, "cascade.materialize", ctx.doc_id, || {
        materialize(&tree, &declared, ctx.registry, ctx.settings, ctx.debug)
    })?;
    if let Some(perf) = ctx.perf {
        perf.log_counts(
            "cascade.counts",
            ctx.doc_id,
            &[
                ("elements", tree.elements().len() as u64),
                ("properties", ctx.registry.len() as u64),
            ],
        );
    }
    Ok(StyledTree::new(tree, declared, computed, ctx.settings.clone()))
}

pub fn declare(tree: &StyleTree, sheets: &Sheets, ctx: &CascadeContext<'_>) -> DeclaredStyles {
    let mut declared = DeclaredStyles::default();
    let mut sequence = Sequence::default();
    let elements = tree.elements();

    timed(ctx.perf, "cascade.sheets", ctx.doc_id, || {
        apply_sheet(&sheets.user_agent, Origin::UserAgent, tree, &elements, &mut declared, &mut sequence, ctx);
        apply_sheet(&sheets.user, Origin::User, tree, &elements, &mut declared, &mut sequence, ctx);
        apply_presentational_hints(tree, &elements, &mut declared, &mut sequence);
        apply_sheet(&sheets.author, Origin::Author, tree, &elements, &mut declared, &mut sequence, ctx);
    });
    timed(ctx.perf, "cascade.inline", ctx.doc_id, || {
        apply_inline_styles(tree, &elements, &mut declared, &mut sequence, ctx);
        apply_dir_attributes(tree, &elements, &mut declared, &mut sequence);
    });
    timed(ctx.perf, "cascade.shorthands", ctx.doc_id, || {
        for &node in &elements {
            shorthand::expand_node(&mut declared, node);
        }
    });
    declared
}

fn apply_sheet(
    sheet: &Stylesheet,
    origin: Origin,
    tree: &StyleTree,
    elements: &[NodeId],
    declared: &mut DeclaredStyles,
    sequence: &mut Sequence,
    ctx: &CascadeContext<'_>,
) {
    for rule in sheet.rules() {
        let mut matched: Vec<(NodeId, Specificity)> = Vec::new();
        for selector in &rule.selectors {
            let specificity = selector.specificity();
            for &node in elements {
                if selector.matches(tree, node) {
                    matched.push((node, specificity));
                }
            }
        }
        if let Some(logger) = ctx.debug {
            if !matched.is_empty() {
                logger.increment(&format!("cascade.{}.rule_matches", origin.label()), matched.len() as u64);
            }
        }
        for decl in &rule.declarations {
            if !is_known(ctx.registry, decl, ctx.debug) {
                continue;
            }
            let seq = sequence.next();
            let tier = origin.tier(decl.important);
            for &(node, specificity) in &matched {
                declared.offer(
                    node,
                    CascadedProperty {
                        name: decl.name.clone(),
                        value: decl.value.clone(),
                        tier,
                        specificity,
                        sequence: seq,
                    },
                );
            }
        }
    }
}

fn apply_inline_styles(
    tree: &StyleTree,
    elements: &[NodeId],
    declared: &mut DeclaredStyles,
    sequence: &mut Sequence,
    ctx: &CascadeContext<'_>,
) {
    for &node in elements {
        let Some(style) = tree.attr(node, "style") else {
            continue;
        };
        for decl in parse_inline_style(style, ctx.debug) {
            if !is_known(ctx.registry, &decl, ctx.debug) {
                continue;
            }
            let tier = if decl.important {
                Tier::StyleAttributeHigh
            } else {
                Tier::StyleAttributeNormal
            };
            declared.offer(
                node,
                CascadedProperty {
                    name: decl.name,
                    value: decl.value,
                    tier,
                    specificity: Specificity::default(),
                    sequence: sequence.next(),
                },
            );
        }
    }
}

fn apply_dir_attributes(
    tree: &StyleTree,
    elements: &[NodeId],
    declared: &mut DeclaredStyles,
    sequence: &mut Sequence,
) {
    for &node in elements {
        let Some(dir) = tree.attr(node, "dir") else {
            continue;
        };
        let dir = dir.trim().to_ascii_lowercase();
        if dir != "ltr" && dir != "rtl" {
            continue;
        }
        declared.offer(
            node,
            CascadedProperty {
                name: "direction".to_string(),
                value: Expression::keyword(&dir),
                tier: Tier::HtmlAttribute,
                specificity: Specificity::default(),
                sequence: sequence.next(),
            },
        );
    }
}

// Legacy attributes act as author rules of zero specificity placed before
// the author sheet, so any author rule beats them.
fn apply_presentational_hints(
    tree: &StyleTree,
    elements: &[NodeId],
    declared: &mut DeclaredStyles,
    sequence: &mut Sequence,
) {
    for &node in elements {
        for (name, value) in presentational_hints(tree, node) {
            declared.offer(
                node,
                CascadedProperty {
                    name: name.to_string(),
                    value,
                    tier: Tier::AuthorNormal,
                    specificity: Specificity::default(),
                    sequence: sequence.next(),
                },
            );
        }
    }
}

fn presentational_hints(tree: &StyleTree, node: NodeId) -> Vec<(&'static str, Expression)> {
    let mut hints = Vec::new();
    let tag = tree.tag(node).unwrap_or_default();
    if let Some(align) = tree.attr(node, "align") {
        let align = align.trim().to_ascii_lowercase();
        let block = matches!(tag, "p" | "div" | "td" | "th" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "caption");
        if block && matches!(align.as_str(), "left" | "right" | "center" | "justify") {
            hints.push(("text-align", Expression::keyword(&align)));
        }
    }
    if let Some(valign) = tree.attr(node, "valign") {
        let valign = valign.trim().to_ascii_lowercase();
        if matches!(valign.as_str(), "top" | "middle" | "bottom" | "baseline") {
            hints.push(("vertical-align", Expression::keyword(&valign)));
        }
    }
    if let Some(color) = tree.attr(node, "bgcolor") {
        hints.push(("background-color", Expression::parse(color.trim())));
    }
    if let Some(width) = tree.attr(node, "width") {
        if matches!(tag, "table" | "td" | "th" | "col" | "img") {
            if let Some(value) = html_length(width) {
                hints.push(("width", value));
            }
        }
    }
    if tag == "font" {
        if let Some(color) = tree.attr(node, "color") {
            hints.push(("color", Expression::parse(color.trim())));
        }
        if let Some(face) = tree.attr(node, "face") {
            let families = face
                .split(',')
                .map(|family| format!("\"{}\"", family.trim().replace('"', "")))
                .collect::<Vec<_>>()
                .join(", ");
            hints.push(("font-family", Expression::parse(&families)));
        }
    }
    hints
}

// HTML dimension attributes: bare numbers are CSS pixels.
fn html_length(raw: &str) -> Option<Expression> {
    let raw = raw.trim();
    if let Some(pct) = raw.strip_suffix('%') {
        let value = pct.trim().parse::<f64>().ok()?;
        return Some(Expression::parse(&format!("{value}%")));
    }
    let value = raw.trim_end_matches("px").parse::<f64>().ok()?;
    Some(Expression::parse(&format!("{value}px")))
}

fn is_known(registry: &Registry, decl: &Declaration, debug: Option<&DebugLogger>) -> bool {
    if registry.contains(&decl.name) || shorthand::is_shorthand(&decl.name) {
        return true;
    }
    if let Some(logger) = debug {
        logger.log_event(
            "DECLARATION_NO_EFFECT",
            &[("property", &decl.name), ("value", &decl.value.to_string())],
        );
        logger.increment("cascade.declaration_no_effect", 1);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::temp_log_path;

    fn context<'a>(registry: &'a Registry, settings: &'a Settings) -> CascadeContext<'a> {
        CascadeContext {
            registry,
            settings,
            debug: None,
            perf: None,
            doc_id: None,
        }
    }

    fn sheets(user: &str, author: &str) -> Sheets {
        Sheets {
            user_agent: Stylesheet::default(),
            user: Stylesheet::parse(user, None),
            author: Stylesheet::parse(author, None),
        }
    }

    fn prop(tier: Tier, specificity: Specificity, sequence: u64) -> CascadedProperty {
        CascadedProperty {
            name: "color".to_string(),
            value: Expression::keyword("red"),
            tier,
            specificity,
            sequence,
        }
    }

    #[test]
    fn ordering_is_tier_then_specificity_then_sequence() {
        let high_tier = prop(Tier::UserHigh, Specificity(0, 0, 0), 1);
        let ids = prop(Tier::AuthorHigh, Specificity(5, 0, 0), 9);
        assert!(high_tier.outranks(&ids));

        let one_id = prop(Tier::AuthorNormal, Specificity(1, 0, 0), 1);
        let many_classes = prop(Tier::AuthorNormal, Specificity(0, 9, 9), 2);
        assert!(one_id.outranks(&many_classes));

        let early = prop(Tier::AuthorNormal, Specificity(0, 1, 0), 3);
        let late = prop(Tier::AuthorNormal, Specificity(0, 1, 0), 4);
        assert!(late.outranks(&early));
        assert!(!early.outranks(&early.clone()));
    }

    #[test]
    fn offer_keeps_first_of_equal_rank() {
        let mut declared = DeclaredStyles::default();
        let node = StyleTree::new("p").root();
        assert!(declared.offer(node, prop(Tier::AuthorNormal, Specificity(0, 1, 0), 2)));
        let mut same = prop(Tier::AuthorNormal, Specificity(0, 1, 0), 2);
        same.value = Expression::keyword("blue");
        assert!(!declared.offer(node, same));
        assert!(declared.get(node, "color").expect("stored").value.is_keyword("red"));
    }

    #[test]
    fn user_important_beats_author_normal() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(tree.root(), "p", &[("id", "x")]);
        let registry = Registry::standard();
        let settings = Settings::default();
        let declared = declare(
            &tree,
            &sheets("p { color: blue !important }", "#x { color: red }"),
            &context(registry, &settings),
        );
        let winner = declared.get(p, "color").expect("color");
        assert_eq!(winner.tier, Tier::UserHigh);
        assert!(winner.value.is_keyword("blue"));
    }

    #[test]
    fn id_beats_two_classes_and_type_breaks_class_ties() {
        let mut tree = StyleTree::new("body");
        let a = tree.append_element(tree.root(), "p", &[("id", "a"), ("class", "b c")]);
        let foo = tree.append_element(tree.root(), "div", &[("class", "foo")]);
        let registry = Registry::standard();
        let settings = Settings::default();
        let declared = declare(
            &tree,
            &sheets(
                "",
                "#a { color: red } .b.c { color: blue } div.foo { color: blue } .foo { color: red }",
            ),
            &context(registry, &settings),
        );
        assert!(declared.get(a, "color").expect("color").value.is_keyword("red"));
        assert!(declared.get(foo, "color").expect("color").value.is_keyword("blue"));
    }

    #[test]
    fn inline_style_and_dir_attribute_tiers() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(
            tree.root(),
            "p",
            &[("style", "color: green; direction: ltr"), ("dir", "rtl")],
        );
        let registry = Registry::standard();
        let settings = Settings::default();
        let declared = declare(
            &tree,
            &sheets("", "p { color: red !important; direction: ltr !important }"),
            &context(registry, &settings),
        );
        let color = declared.get(p, "color").expect("color");
        assert_eq!(color.tier, Tier::StyleAttributeNormal);
        assert!(color.value.is_keyword("green"));
        let direction = declared.get(p, "direction").expect("direction");
        assert_eq!(direction.tier, Tier::StyleAttributeNormal);
    }

    #[test]
    fn dir_attribute_outranks_author_important() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(tree.root(), "p", &[("dir", "RTL")]);
        let registry = Registry::standard();
        let settings = Settings::default();
        let declared = declare(
            &tree,
            &sheets("", "p { direction: ltr !important }"),
            &context(registry, &settings),
        );
        let direction = declared.get(p, "direction").expect("direction");
        assert_eq!(direction.tier, Tier::HtmlAttribute);
        assert!(direction.value.is_keyword("rtl"));
    }

    #[test]
    fn presentational_attributes_lose_to_author_rules() {
        let mut tree = StyleTree::new("table");
        let td = tree.append_element(tree.root(), "td", &[("align", "right"), ("bgcolor", "#ccc")]);
        let registry = Registry::standard();
        let settings = Settings::default();
        let declared = declare(
            &tree,
            &sheets("", "td { text-align: left }"),
            &context(registry, &settings),
        );
        assert!(declared.get(td, "text-align").expect("align").value.is_keyword("left"));
        assert_eq!(
            declared.get(td, "background-color").expect("bg").tier,
            Tier::AuthorNormal
        );
    }

    #[test]
    fn unknown_properties_are_logged_and_dropped() {
        let path = temp_log_path("cascade_unknown");
        let logger = DebugLogger::new(&path).expect("logger");
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(tree.root(), "p", &[]);
        let registry = Registry::standard();
        let settings = Settings::default();
        let ctx = CascadeContext {
            registry,
            settings: &settings,
            debug: Some(&logger),
            perf: None,
            doc_id: None,
        };
        let declared = declare(&tree, &sheets("", "p { flex-grow: 1; color: red }"), &ctx);
        assert!(declared.get(p, "flex-grow").is_none());
        assert!(declared.get(p, "color").is_some());
        assert_eq!(logger.counter("cascade.declaration_no_effect"), 1);
        logger.flush();
        let log = std::fs::read_to_string(&path).expect("read log");
        assert!(log.contains("DECLARATION_NO_EFFECT"));
        let _ = std::fs::remove_file(path);
    }
}
