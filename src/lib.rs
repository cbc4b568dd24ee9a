mod cascade;
mod computed;
mod debug;
mod document;
mod dom;
mod error;
mod expr;
mod font;
mod html;
mod perf;
mod registry;
mod selector;
mod settings;
mod sheet;
mod shorthand;
mod types;
mod units;

pub use cascade::{
    CascadeContext, CascadedProperty, DeclaredStyles, Origin, Sheets, Tier, apply_all, declare,
};
pub use computed::{Resolver, StyledTree, materialize};
pub use debug::DebugLogger;
pub use document::{
    Alignment, Block, CellAlignment, Document, LineSpacing, Numbering, Paragraph,
    ParagraphProperties, Run, RunContent, RunProperties, Table, TableCell, TableLayout, TableRow,
    VerticalPosition,
};
pub use dom::{NodeId, StyleTree};
pub use error::ConvertError;
pub use expr::{Expression, Separator, Term, TermValue};
pub use font::{FontRegistry, TextMeasurer};
pub use html::build_document;
pub use perf::PerfLogger;
pub use registry::{
    AppliesFn, Compute, ComputeFn, Initial, InitialFn, PropertyInfo, Registry, always,
};
pub use selector::{Selector, Specificity};
pub use settings::{PageGeometry, Settings};
pub use sheet::{Declaration, PageSetup, RuleSet, Stylesheet, default_css, parse_inline_style};
pub use types::{Pt, Size};

use perf::timed;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Converter {
    settings: Settings,
    user_agent: Stylesheet,
    user: Stylesheet,
    author: Stylesheet,
    measurer: Option<Arc<dyn TextMeasurer>>,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
}

#[derive(Clone)]
pub struct ConverterBuilder {
    settings: Settings,
    use_default_sheet: bool,
    user_css: String,
    author_css: String,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    measurer: Option<Arc<dyn TextMeasurer>>,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl Converter {
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::new()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn convert(&self, html: &str) -> Result<Document, ConvertError> {
        let result = self.convert_at(0, html);
        self.emit_debug_summary("convert");
        result
    }

    pub fn compute_styles(&self, html: &str) -> Result<StyledTree, ConvertError> {
        let result = self.compute_styles_at(0, html);
        self.emit_debug_summary("compute_styles");
        result
    }

    // Converts independent documents in parallel. Output order follows
    // input order; the first failure is returned.
    pub fn convert_batch(&self, html_list: &[&str]) -> Result<Vec<Document>, ConvertError> {
        use rayon::prelude::*;

        let results: Vec<Result<Document, ConvertError>> = html_list
            .par_iter()
            .enumerate()
            .map(|(idx, html)| self.convert_at(idx, html))
            .collect();
        self.emit_debug_summary("convert_batch");
        results.into_iter().collect()
    }

    fn convert_at(&self, doc_id: usize, html: &str) -> Result<Document, ConvertError> {
        let styled = self.compute_styles_at(doc_id, html)?;
        let perf = self.perf.as_ref();
        let document = timed(perf, "document.build", Some(doc_id), || {
            build_document(&styled, self.measurer.as_deref(), self.debug.as_ref())
        })?;
        if let Some(perf) = perf {
            perf.log_counts(
                "document.counts",
                Some(doc_id),
                &[
                    ("nodes", styled.tree().len() as u64),
                    ("paragraphs", document.paragraphs().len() as u64),
                    ("tables", document.tables().len() as u64),
                ],
            );
        }
        Ok(document)
    }

    fn compute_styles_at(&self, doc_id: usize, html: &str) -> Result<StyledTree, ConvertError> {
        let debug = self.debug.as_ref();
        let perf = self.perf.as_ref();
        let tree = timed(perf, "parse_html", Some(doc_id), || StyleTree::parse_html(html));
        let mut author = self.author.clone();
        for block in tree.style_blocks() {
            author.extend(Stylesheet::parse(block, debug));
        }

        // @page overrides replace the geometry before anything is computed,
        // since the printable width is the root percentage base.
        let mut page = *self.user.page();
        page.merge(author.page());
        let mut settings = self.settings.clone();
        settings.page = page.apply_to(settings.page);
        settings.validate()?;
        if !page.is_empty() {
            if let Some(logger) = debug {
                logger.log_event(
                    "css.page_override",
                    &[
                        ("width", &settings.page.width.to_string()),
                        ("height", &settings.page.height.to_string()),
                    ],
                );
            }
        }

        let sheets = Sheets {
            user_agent: self.user_agent.clone(),
            user: self.user.clone(),
            author,
        };
        let ctx = CascadeContext {
            registry: Registry::standard(),
            settings: &settings,
            debug,
            perf,
            doc_id: Some(doc_id),
        };
        apply_all(tree, &sheets, &ctx)
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_ref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_ref() {
            perf.flush();
        }
    }
}

impl Default for ConverterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            use_default_sheet: true,
            user_css: String::new(),
            author_css: String::new(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            measurer: None,
            debug_path: None,
            perf_path: None,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn default_font_size(mut self, pt: f64) -> Self {
        self.settings.default_font_size = pt;
        self
    }

    pub fn minor_font(mut self, family: impl Into<String>) -> Self {
        self.settings.minor_font = family.into();
        self
    }

    pub fn major_font(mut self, family: impl Into<String>) -> Self {
        self.settings.major_font = family.into();
        self
    }

    pub fn default_block_margin(mut self, pt: f64) -> Self {
        self.settings.default_block_margin = pt;
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.settings.page = page;
        self
    }

    pub fn page_size(mut self, size: Size, margin: Pt) -> Self {
        self.settings.page = PageGeometry::from_size(size, margin);
        self
    }

    // Turning this off leaves only user, author and inline styles.
    pub fn use_default_sheet(mut self, enabled: bool) -> Self {
        self.use_default_sheet = enabled;
        self
    }

    pub fn user_css(mut self, css: impl Into<String>) -> Self {
        self.user_css = css.into();
        self
    }

    pub fn author_css(mut self, css: impl AsRef<str>) -> Self {
        if !self.author_css.is_empty() {
            self.author_css.push('\n');
        }
        self.author_css.push_str(css.as_ref());
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn text_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.measurer = Some(measurer);
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Span/count JSONL log; a ranked hot-spot file is written beside it.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Converter, ConvertError> {
        self.settings.validate()?;
        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = match &self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };
        let measurer = match self.measurer {
            Some(measurer) => Some(measurer),
            None if self.font_dirs.is_empty() && self.font_files.is_empty() => None,
            None => {
                let mut registry = FontRegistry::new();
                for dir in &self.font_dirs {
                    registry.register_dir(dir)?;
                }
                for file in &self.font_files {
                    registry.register_file(file)?;
                }
                if let Some(logger) = &debug {
                    for family in registry.families() {
                        logger.log_event("fonts.registered", &[("family", family)]);
                    }
                    logger.increment("fonts.faces", registry.len() as u64);
                }
                Some(Arc::new(registry) as Arc<dyn TextMeasurer>)
            }
        };
        let user_agent = if self.use_default_sheet {
            Stylesheet::parse(&default_css(&self.settings), debug.as_ref())
        } else {
            Stylesheet::default()
        };
        let user = Stylesheet::parse(&self.user_css, debug.as_ref());
        let author = Stylesheet::parse(&self.author_css, debug.as_ref());
        Ok(Converter {
            settings: self.settings,
            user_agent,
            user,
            author,
            measurer,
            debug,
            perf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::temp_log_path;

    fn first(styled: &StyledTree, tag: &str) -> NodeId {
        styled.tree().find_first(tag).expect("element present")
    }

    #[test]
    fn inline_color_without_any_sheets() {
        let converter = Converter::builder()
            .use_default_sheet(false)
            .build()
            .expect("converter");
        let styled = converter
            .compute_styles("<p style=\"color:#FF0000\">Hello</p>")
            .expect("styles");
        let p = first(&styled, "p");
        assert_eq!(styled.text(p, "color").expect("color").as_deref(), Some("ff0000"));
        assert_eq!(
            styled.text(p, "font-family").expect("family").as_deref(),
            Some("Calibri")
        );
    }

    #[test]
    fn user_important_beats_author_normal() {
        let converter = Converter::builder()
            .user_css("p { color: blue !important }")
            .build()
            .expect("converter");
        let styled = converter
            .compute_styles("<style>p#x.y { color: red }</style><p id=\"x\" class=\"y\">t</p>")
            .expect("styles");
        let p = first(&styled, "p");
        assert_eq!(styled.text(p, "color").expect("color").as_deref(), Some("0000ff"));
    }

    #[test]
    fn page_rule_replaces_root_percentage_base() {
        let converter = Converter::builder().build().expect("converter");
        let html = "<style>@page { size: letter landscape; margin: 0.5in }</style>\
                    <div style=\"width: 50%\">x</div>";
        let styled = converter.compute_styles(html).expect("styles");
        assert_eq!(styled.settings().page.width, 15840);
        let div = first(&styled, "div");
        let width = styled.pt(div, "width").expect("width").expect("pt");
        assert!((width - 360.0).abs() < 1e-6, "{width}");
        let document = converter.convert(html).expect("document");
        assert_eq!(document.page.left_margin, 720);
    }

    #[test]
    fn malformed_author_values_do_not_abort_conversion() {
        let converter = Converter::builder()
            .author_css("p { width: 10pt 20pt; text-indent: 2em hanging; color: green }")
            .build()
            .expect("converter");
        let html = "<div style=\"width: 200pt\"><p>x</p></div>";
        let styled = converter.compute_styles(html).expect("styles");
        let p = first(&styled, "p");
        assert_eq!(styled.text(p, "color").expect("color").as_deref(), Some("008000"));
        let width = styled.pt(p, "width").expect("width").expect("pt");
        assert!((width - 200.0).abs() < 1e-6, "{width}");
        assert_eq!(styled.pt(p, "text-indent").expect("indent"), Some(0.0));
        let document = converter.convert(html).expect("document");
        assert_eq!(document.text(), "x");
    }

    #[test]
    fn builder_rejects_invalid_settings() {
        let err = Converter::builder()
            .default_font_size(0.0)
            .build()
            .err()
            .expect("font size must be positive");
        assert!(matches!(err, ConvertError::InvalidConfiguration(_)));
        let err = Converter::builder()
            .minor_font("  ")
            .build()
            .err()
            .expect("font name required");
        assert!(matches!(err, ConvertError::InvalidConfiguration(_)));
    }

    #[test]
    fn batch_preserves_input_order() {
        let converter = Converter::builder().build().expect("converter");
        let inputs = ["<p>one</p>", "<p>two</p><p>three</p>", "<h1>four</h1>"];
        let documents = converter.convert_batch(&inputs).expect("batch");
        let texts: Vec<String> = documents.iter().map(Document::text).collect();
        assert_eq!(texts, vec!["one", "two\nthree", "four"]);
    }

    #[test]
    fn debug_log_records_unknown_properties_and_summary() {
        let path = temp_log_path("converter");
        let converter = Converter::builder()
            .debug_log(&path)
            .build()
            .expect("converter");
        converter
            .convert("<p style=\"flex-grow: 1; display: contents\">x</p>")
            .expect("document");
        let log = std::fs::read_to_string(&path).expect("log");
        assert!(log.contains("DECLARATION_NO_EFFECT"));
        assert!(log.contains("style.degraded_value"));
        assert!(log.contains("\"type\":\"debug.summary\""));
        assert!(log.contains("document.paragraphs"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn perf_log_records_phase_spans() {
        let path = temp_log_path("perf");
        let converter = Converter::builder()
            .perf_log(&path)
            .build()
            .expect("converter");
        converter.convert("<p>x</p>").expect("document");
        let log = std::fs::read_to_string(&path).expect("log");
        for span in [
            "parse_html",
            "cascade.sheets",
            "cascade.inline",
            "cascade.shorthands",
            "cascade.materialize",
            "document.build",
        ] {
            assert!(log.contains(&format!("\"name\":\"{span}\"")), "{span}");
        }
        drop(converter);
        let _ = std::fs::remove_file(&path);
    }
}
