use std::collections::HashMap;

use crate::cascade::DeclaredStyles;
use crate::debug::DebugLogger;
use crate::dom::{NodeId, StyleTree};
use crate::error::ConvertError;
use crate::expr::{Expression, TermValue};
use crate::registry::{Compute, Initial, PropertyInfo, Registry};
use crate::settings::Settings;
use crate::units::{self, GENERIC_WIDTH_KEYWORDS};

type ValueCache = HashMap<NodeId, HashMap<String, Expression>>;

pub struct Resolver<'a> {
    tree: &'a StyleTree,
    declared: &'a DeclaredStyles,
    registry: &'a Registry,
    settings: &'a Settings,
    debug: Option<&'a DebugLogger>,
    cache: ValueCache,
}

impl<'a> Resolver<'a> {
    pub fn new(
        tree: &'a StyleTree,
        declared: &'a DeclaredStyles,
        registry: &'a Registry,
        settings: &'a Settings,
        debug: Option<&'a DebugLogger>,
    ) -> Self {
        Self {
            tree,
            declared,
            registry,
            settings,
            debug,
            cache: HashMap::new(),
        }
    }

    pub fn tree(&self) -> &'a StyleTree {
        self.tree
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    pub fn into_cache(self) -> ValueCache {
        self.cache
    }

    pub fn computed(&mut self, node: NodeId, name: &str) -> Result<Expression, ConvertError> {
        if let Some(value) = self.cache.get(&node).and_then(|props| props.get(name)) {
            return Ok(value.clone());
        }
        let registry = self.registry;
        let info = registry
            .get(name)
            .ok_or_else(|| ConvertError::UnknownProperty(name.to_string()))?;
        let assigned = self.declared.get(node, name).map(|prop| prop.value.clone());
        let value = match assigned {
            Some(expr) if expr.is_keyword("initial") => {
                let initial = self.initial_value(info, node, name)?;
                self.compute_assigned(info, node, name, &initial)?
            }
            Some(expr) if expr.is_keyword("unset") => {
                self.inherit_or_initial(info, node, name, false)?
            }
            Some(expr) if !forces_inheritance(info, &expr) => {
                self.compute_assigned(info, node, name, &expr)?
            }
            forced => self.inherit_or_initial(info, node, name, forced.is_some())?,
        };
        self.cache
            .entry(node)
            .or_default()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn inherit_or_initial(
        &mut self,
        info: &PropertyInfo,
        node: NodeId,
        name: &str,
        forced: bool,
    ) -> Result<Expression, ConvertError> {
        if info.inherited || forced {
            if let Some(parent) = self.tree.parent(node) {
                if (info.applies)(self, parent)? {
                    return self.computed(parent, name);
                }
            }
        }
        let initial = self.initial_value(info, node, name)?;
        self.compute_assigned(info, node, name, &initial)
    }

    fn initial_value(
        &mut self,
        info: &PropertyInfo,
        node: NodeId,
        name: &str,
    ) -> Result<Expression, ConvertError> {
        match info.initial {
            Initial::Value(raw) => Ok(Expression::parse(raw)),
            Initial::Func(initial) => initial(self, node, name),
        }
    }

    fn compute_assigned(
        &mut self,
        info: &PropertyInfo,
        node: NodeId,
        name: &str,
        expr: &Expression,
    ) -> Result<Expression, ConvertError> {
        match info.compute {
            Compute::PassThrough => Ok(expr.clone()),
            Compute::Keyword(allowed) => {
                let keyword = expr.as_keyword().map(str::to_ascii_lowercase);
                match keyword {
                    Some(keyword) if allowed.contains(&keyword.as_str()) => {
                        Ok(Expression::keyword(&keyword))
                    }
                    _ => {
                        self.degraded(node, name, expr);
                        self.initial_value(info, node, name)
                    }
                }
            }
            Compute::Func(compute) => compute(self, node, name, expr),
        }
    }

    pub fn keyword(&mut self, node: NodeId, name: &str) -> Result<String, ConvertError> {
        Ok(self
            .computed(node, name)?
            .as_keyword()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default())
    }

    pub fn font_size_pt(&mut self, node: NodeId) -> Result<f64, ConvertError> {
        Ok(self
            .computed(node, "font-size")?
            .as_pt()
            .unwrap_or(self.settings.default_font_size))
    }

    pub fn parent_font_size_pt(&mut self, node: NodeId) -> Result<f64, ConvertError> {
        match self.tree.parent(node) {
            Some(parent) => self.font_size_pt(parent),
            None => Ok(self.settings.default_font_size),
        }
    }

    pub fn containing_width(&mut self, node: NodeId) -> Result<Expression, ConvertError> {
        let tree = self.tree;
        for ancestor in tree.ancestors(node) {
            let width = self.computed(ancestor, "width")?;
            if width.as_pt().is_some() {
                return Ok(width);
            }
        }
        Ok(self.page_width())
    }

    pub fn page_width(&self) -> Expression {
        Expression::pt(self.settings.page.printable_width_pt())
    }

    // Generic length conversion: absolute units to pt, em/ex against this
    // node's font size, percentages against `reference` (or `auto` when
    // there is none). Keywords outside the width table pass through.
    pub fn length(
        &mut self,
        node: NodeId,
        property: &str,
        expr: &Expression,
        reference: Option<&Expression>,
    ) -> Result<Expression, ConvertError> {
        let term = expr.single(property)?;
        let value = match &term.value {
            TermValue::Dimension(value, unit) => {
                if let Some(pt) = units::absolute_to_pt(*value, unit) {
                    Expression::pt(pt)
                } else {
                    match unit.as_str() {
                        "em" => Expression::pt(value * self.font_size_pt(node)?),
                        "ex" => Expression::pt(value * self.font_size_pt(node)? / 2.0),
                        "rem" => {
                            let root = self.tree.root();
                            let base = if root == node {
                                self.settings.default_font_size
                            } else {
                                self.font_size_pt(root)?
                            };
                            Expression::pt(value * base)
                        }
                        _ => {
                            self.degraded(node, property, expr);
                            Expression::pt(0.0)
                        }
                    }
                }
            }
            TermValue::Percentage(pct) => match reference.and_then(Expression::as_pt) {
                Some(base) => Expression::pt(base * pct / 100.0),
                None => Expression::keyword("auto"),
            },
            TermValue::Number(value) if *value == 0.0 => Expression::pt(0.0),
            TermValue::Ident(keyword) => match units::keyword_width(&GENERIC_WIDTH_KEYWORDS, keyword) {
                Some(pt) => Expression::pt(pt),
                None => Expression::keyword(&keyword.to_ascii_lowercase()),
            },
            _ => expr.clone(),
        };
        Ok(value)
    }

    pub fn degraded(&self, node: NodeId, property: &str, value: &Expression) {
        if let Some(logger) = self.debug {
            logger.log_event(
                "style.degraded_value",
                &[
                    ("node", &node.index().to_string()),
                    ("property", property),
                    ("value", &value.to_string()),
                ],
            );
            logger.increment("style.degraded_value", 1);
        }
    }
}

// `inherit` always forces inheritance; `auto` does too unless the property
// interprets it.
fn forces_inheritance(info: &PropertyInfo, expr: &Expression) -> bool {
    expr.is_inherit_marker() || (!info.handles_auto && expr.is_keyword("auto"))
}

pub fn materialize(
    tree: &StyleTree,
    declared: &DeclaredStyles,
    registry: &Registry,
    settings: &Settings,
    debug: Option<&DebugLogger>,
) -> Result<ValueCache, ConvertError> {
    let mut resolver = Resolver::new(tree, declared, registry, settings, debug);
    for node in tree.elements() {
        for name in registry.names() {
            resolver.computed(node, name)?;
        }
    }
    Ok(resolver.into_cache())
}

pub struct StyledTree {
    tree: StyleTree,
    declared: DeclaredStyles,
    computed: ValueCache,
    settings: Settings,
}

impl StyledTree {
    pub fn new(
        tree: StyleTree,
        declared: DeclaredStyles,
        computed: ValueCache,
        settings: Settings,
    ) -> Self {
        Self {
            tree,
            declared,
            computed,
            settings,
        }
    }

    pub fn tree(&self) -> &StyleTree {
        &self.tree
    }

    pub fn declared(&self) -> &DeclaredStyles {
        &self.declared
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn computed(&self, node: NodeId, name: &str) -> Result<&Expression, ConvertError> {
        self.computed
            .get(&node)
            .and_then(|props| props.get(name))
            .ok_or_else(|| ConvertError::MissingComputedValue {
                node: node.index(),
                property: name.to_string(),
            })
    }

    pub fn keyword(&self, node: NodeId, name: &str) -> Result<String, ConvertError> {
        Ok(self
            .computed(node, name)?
            .as_keyword()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default())
    }

    pub fn pt(&self, node: NodeId, name: &str) -> Result<Option<f64>, ConvertError> {
        Ok(self.computed(node, name)?.as_pt())
    }

    pub fn text(&self, node: NodeId, name: &str) -> Result<Option<String>, ConvertError> {
        Ok(self.computed(node, name)?.as_text().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeContext, Sheets, declare};
    use crate::registry::always;
    use crate::sheet::Stylesheet;
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    fn close(expr: &Expression, expected: f64) -> bool {
        expr.as_pt().is_some_and(|pt| (pt - expected).abs() < 1e-6)
    }

    static INITIAL_CALLS: AtomicUsize = AtomicUsize::new(0);
    static COMPUTE_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_initial(_: &mut Resolver<'_>, _: NodeId, _: &str) -> Result<Expression, ConvertError> {
        INITIAL_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(Expression::pt(1.0))
    }

    fn counting_compute(
        _: &mut Resolver<'_>,
        _: NodeId,
        _: &str,
        expr: &Expression,
    ) -> Result<Expression, ConvertError> {
        COMPUTE_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(expr.clone())
    }

    #[test]
    fn second_lookup_is_served_from_the_cache() {
        let registry = Registry::new(vec![PropertyInfo {
            names: &["probe"],
            inherited: false,
            handles_auto: false,
            applies: always,
            initial: Initial::Func(counting_initial),
            compute: Compute::Func(counting_compute),
        }]);
        let tree = StyleTree::new("div");
        let declared = DeclaredStyles::default();
        let settings = Settings::default();
        let mut resolver = Resolver::new(&tree, &declared, &registry, &settings, None);
        let first = resolver.computed(tree.root(), "probe").expect("first");
        let second = resolver.computed(tree.root(), "probe").expect("second");
        assert_eq!(first, second);
        assert_eq!(INITIAL_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(COMPUTE_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_property_is_a_contract_error() {
        let tree = StyleTree::new("div");
        let declared = DeclaredStyles::default();
        let settings = Settings::default();
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let err = resolver.computed(tree.root(), "flex-grow").expect_err("unregistered");
        assert!(matches!(err, ConvertError::UnknownProperty(ref name) if name == "flex-grow"));
    }

    #[test]
    fn font_family_inherits_from_body() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(tree.root(), "p", &[]);
        let span = tree.append_element(p, "span", &[]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "body { font-family: Georgia, serif }", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let family = resolver.computed(span, "font-family").expect("family");
        assert_eq!(family.to_string(), "Georgia, serif");
    }

    #[test]
    fn absolute_units_compute_to_points() {
        let mut tree = StyleTree::new("body");
        let root = tree.root();
        let nodes: Vec<NodeId> = ["1in", "2.54cm", "96px", "72pt"]
            .iter()
            .map(|width| {
                let style = format!("text-indent: {width}");
                tree.append_element(root, "p", &[("style", style.as_str())])
            })
            .collect();
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        for node in nodes {
            let value = resolver.computed(node, "text-indent").expect("indent");
            assert!(close(&value, 72.0), "{value}");
        }
    }

    #[test]
    fn percentage_width_uses_parent_width() {
        let mut tree = StyleTree::new("body");
        let parent = tree.append_element(tree.root(), "div", &[("style", "width: 200pt")]);
        let child = tree.append_element(parent, "div", &[("style", "width: 50%")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let width = resolver.computed(child, "width").expect("width");
        assert!(close(&width, 100.0), "{width}");
    }

    #[test]
    fn percentage_width_falls_back_to_page_width() {
        let mut tree = StyleTree::new("span");
        let child = tree.append_element(tree.root(), "div", &[("style", "width: 50%")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(resolver.computed(tree.root(), "width").expect("root").is_keyword("auto"));
        let width = resolver.computed(child, "width").expect("width");
        let page = settings.page.printable_width_pt();
        assert!(close(&width, page / 2.0), "{width} vs {page}");
    }

    #[test]
    fn auto_width_on_blocks_copies_parent_width() {
        let mut tree = StyleTree::new("body");
        let outer = tree.append_element(tree.root(), "div", &[]);
        let inner = tree.append_element(outer, "div", &[]);
        let cell = tree.append_element(outer, "td", &[]);
        let settings = Settings::default();
        let declared = declared_for(
            &tree,
            "body, div, td { display: block } body { width: 300pt }",
            &settings,
        );
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(close(&resolver.computed(inner, "width").expect("inner"), 300.0));
        assert!(resolver.computed(cell, "width").expect("cell").is_keyword("auto"));
    }

    #[test]
    fn em_and_percentage_font_sizes() {
        let mut tree = StyleTree::new("body");
        let div = tree.append_element(tree.root(), "div", &[("style", "font-size: 20pt")]);
        let p = tree.append_element(div, "p", &[("style", "font-size: 1.5em; line-height: 120%")]);
        let span = tree.append_element(p, "span", &[("style", "font-size: 50%; margin-left: 2em")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert!(close(&resolver.computed(p, "font-size").expect("p"), 30.0));
        assert!(close(&resolver.computed(p, "line-height").expect("lh"), 36.0));
        assert!(close(&resolver.computed(span, "font-size").expect("span"), 15.0));
        assert!(close(&resolver.computed(span, "margin-left").expect("ml"), 30.0));
        assert!(close(
            &resolver.computed(tree.root(), "font-size").expect("root"),
            settings.default_font_size
        ));
    }

    #[test]
    fn percentage_height_needs_a_parent_height() {
        let mut tree = StyleTree::new("body");
        let sized = tree.append_element(tree.root(), "div", &[("style", "height: 200pt")]);
        let half = tree.append_element(sized, "div", &[("style", "height: 50%")]);
        let loose = tree.append_element(tree.root(), "div", &[]);
        let orphan = tree.append_element(loose, "div", &[("style", "height: 50%")]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let height = resolver.computed(half, "height").expect("height");
        assert!(close(&height, 100.0), "{height}");
        assert!(resolver.computed(orphan, "height").expect("height").is_keyword("auto"));
    }

    #[test]
    fn ex_and_spacing_percentages_use_own_font_size() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(
            tree.root(),
            "p",
            &[("style", "font-size: 12pt; text-indent: 2ex; letter-spacing: 10%")],
        );
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let indent = resolver.computed(p, "text-indent").expect("indent");
        assert!(close(&indent, 12.0), "{indent}");
        let spacing = resolver.computed(p, "letter-spacing").expect("spacing");
        assert!(close(&spacing, 1.2), "{spacing}");
    }

    #[test]
    fn initial_keyword_ignores_the_parent() {
        let mut tree = StyleTree::new("html");
        let body = tree.append_element(
            tree.root(),
            "body",
            &[("style", "font-size: 20pt; margin-left: 5pt; color: red")],
        );
        let p = tree.append_element(body, "p", &[]);
        let settings = Settings::default();
        let declared = declared_for(
            &tree,
            "p { font-size: initial; margin-left: initial; color: unset }",
            &settings,
        );
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let size = resolver.computed(p, "font-size").expect("size");
        assert!(close(&size, settings.default_font_size), "{size}");
        let margin = resolver.computed(p, "margin-left").expect("margin");
        assert!(close(&margin, 0.0), "{margin}");
        assert_eq!(resolver.computed(p, "color").expect("color").to_string(), "ff0000");
    }

    #[test]
    fn generic_length_and_border_width_keyword_tables_differ() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(
            tree.root(),
            "p",
            &[("style", "border-top: thin solid; border-bottom-width: thin")],
        );
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        let generic = resolver
            .length(p, "text-indent", &Expression::keyword("thin"), None)
            .expect("generic");
        assert!(close(&generic, 0.3));
        let border = resolver.computed(p, "border-top-width").expect("border");
        assert!(close(&border, 0.75));
        let no_style = resolver.computed(p, "border-bottom-width").expect("bottom");
        assert!(close(&no_style, 0.0), "style none zeroes the width");
    }

    #[test]
    fn inherit_forces_inheritance_of_non_inherited_property() {
        let mut tree = StyleTree::new("body");
        let div = tree.append_element(tree.root(), "div", &[("style", "background-color: #0f0")]);
        let span = tree.append_element(div, "span", &[("style", "background-color: inherit")]);
        let plain = tree.append_element(div, "em", &[]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let mut resolver = Resolver::new(&tree, &declared, Registry::standard(), &settings, None);
        assert_eq!(resolver.computed(span, "background-color").expect("bg").to_string(), "00ff00");
        assert_eq!(
            resolver.computed(plain, "background-color").expect("bg").to_string(),
            "transparent"
        );
    }

    #[test]
    fn materialized_tree_answers_every_property() {
        let mut tree = StyleTree::new("body");
        let p = tree.append_element(tree.root(), "p", &[]);
        let settings = Settings::default();
        let declared = declared_for(&tree, "", &settings);
        let registry = Registry::standard();
        let cache = materialize(&tree, &declared, registry, &settings, None).expect("materialize");
        let styled = StyledTree::new(tree, declared, cache, settings);
        for name in registry.names() {
            assert!(styled.computed(p, name).is_ok(), "{name}");
        }
        assert!(matches!(
            styled.computed(p, "flex-grow"),
            Err(ConvertError::MissingComputedValue { .. })
        ));
    }
}
