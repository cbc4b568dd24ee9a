use std::iter;

use crate::computed::StyledTree;
use crate::debug::DebugLogger;
use crate::document::{
    Alignment, Block, CellAlignment, Document, LineSpacing, Numbering, Paragraph,
    ParagraphProperties, Run, RunContent, RunProperties, Table, TableCell, TableLayout, TableRow,
    VerticalPosition,
};
use crate::dom::NodeId;
use crate::error::ConvertError;
use crate::expr::{Expression, TermValue};
use crate::font::TextMeasurer;
use crate::types::Pt;

const GENERIC_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
];

const LIST_TAGS: &[&str] = &["ul", "ol", "menu", "dir"];

pub fn build_document(
    styled: &StyledTree,
    measurer: Option<&dyn TextMeasurer>,
    debug: Option<&DebugLogger>,
) -> Result<Document, ConvertError> {
    let builder = DocumentBuilder { styled, measurer };
    let tree = styled.tree();
    let start = tree.find_first("body").unwrap_or_else(|| tree.root());
    let mut document = Document::new(styled.settings().page);
    if styled.keyword(start, "display")? != "none" {
        builder.build_block(start, BlockContext::default(), &mut document.blocks)?;
    }
    if let Some(logger) = debug {
        logger.increment("document.paragraphs", document.paragraphs().len() as u64);
        logger.increment("document.tables", document.tables().len() as u64);
    }
    Ok(document)
}

#[derive(Debug, Clone, Copy, Default)]
struct BlockContext {
    indent_left: f64,
    indent_right: f64,
    list_depth: u8,
}

struct PendingRun {
    run: Run,
    collapsible: bool,
}

struct Frame<'p> {
    ctx: BlockContext,
    properties: &'p ParagraphProperties,
    pending: Vec<PendingRun>,
    owned: Vec<usize>,
}

impl Frame<'_> {
    fn at_line_start_or_space(&self) -> bool {
        match self.pending.last() {
            None => true,
            Some(last) => match &last.run.content {
                RunContent::Break => true,
                RunContent::Text(text) => text.ends_with(' '),
            },
        }
    }

    // Collapsible whitespace at either end of a paragraph is dropped.
    fn flush(&mut self, out: &mut Vec<Block>) {
        while let Some(first) = self.pending.first_mut() {
            if !first.collapsible {
                break;
            }
            if let RunContent::Text(text) = &mut first.run.content {
                let trimmed = text.trim_start_matches(' ');
                if trimmed.is_empty() {
                    self.pending.remove(0);
                    continue;
                }
                *text = trimmed.to_string();
            }
            break;
        }
        while let Some(last) = self.pending.last_mut() {
            if !last.collapsible {
                break;
            }
            if let RunContent::Text(text) = &mut last.run.content {
                let trimmed = text.trim_end_matches(' ');
                if trimmed.is_empty() {
                    self.pending.pop();
                    continue;
                }
                *text = trimmed.to_string();
            }
            break;
        }
        if self.pending.is_empty() {
            return;
        }
        let runs = self.pending.drain(..).map(|pending| pending.run).collect();
        out.push(Block::Paragraph(Paragraph {
            properties: self.properties.clone(),
            runs,
        }));
        self.owned.push(out.len() - 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhiteSpaceMode {
    Normal,
    NoWrap,
    Pre,
    PreWrap,
    PreLine,
}

impl WhiteSpaceMode {
    fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "nowrap" => WhiteSpaceMode::NoWrap,
            "pre" => WhiteSpaceMode::Pre,
            "pre-wrap" => WhiteSpaceMode::PreWrap,
            "pre-line" => WhiteSpaceMode::PreLine,
            _ => WhiteSpaceMode::Normal,
        }
    }
}

fn preserve_whitespace(mode: WhiteSpaceMode) -> bool {
    matches!(mode, WhiteSpaceMode::Pre | WhiteSpaceMode::PreWrap)
}

fn keeps_newlines(mode: WhiteSpaceMode) -> bool {
    matches!(
        mode,
        WhiteSpaceMode::Pre | WhiteSpaceMode::PreWrap | WhiteSpaceMode::PreLine
    )
}

struct DocumentBuilder<'a> {
    styled: &'a StyledTree,
    measurer: Option<&'a dyn TextMeasurer>,
}

impl DocumentBuilder<'_> {
    fn build_block(
        &self,
        node: NodeId,
        parent: BlockContext,
        out: &mut Vec<Block>,
    ) -> Result<(), ConvertError> {
        let s = self.styled;
        let mut ctx = parent;
        ctx.indent_left += self.edge(node, "left")?;
        ctx.indent_right += self.edge(node, "right")?;
        if LIST_TAGS.contains(&s.tree().tag(node).unwrap_or_default()) {
            ctx.list_depth = ctx.list_depth.saturating_add(1);
        }
        let properties = self.paragraph_properties(node, ctx)?;
        self.build_contents(node, ctx, &properties, out)
    }

    // Builds the children of a block container. Spacing before/after and
    // list numbering stay on the outermost paragraphs the node produced
    // itself.
    fn build_contents(
        &self,
        node: NodeId,
        ctx: BlockContext,
        properties: &ParagraphProperties,
        out: &mut Vec<Block>,
    ) -> Result<(), ConvertError> {
        let start = out.len();
        let mut frame = Frame {
            ctx,
            properties,
            pending: Vec::new(),
            owned: Vec::new(),
        };
        for &child in self.styled.tree().children(node) {
            self.visit(child, &mut frame, out)?;
        }
        frame.flush(out);
        if out.len() == start {
            out.push(Block::Paragraph(Paragraph {
                properties: properties.clone(),
                runs: Vec::new(),
            }));
            frame.owned.push(start);
        }
        let last = out.len() - 1;
        for (position, &idx) in frame.owned.iter().enumerate() {
            let Some(Block::Paragraph(paragraph)) = out.get_mut(idx) else {
                continue;
            };
            if idx != start {
                paragraph.properties.spacing_before = 0;
            }
            if idx != last {
                paragraph.properties.spacing_after = 0;
            }
            if position > 0 {
                paragraph.properties.numbering = None;
                paragraph.properties.first_line_indent = 0;
            }
        }
        Ok(())
    }

    fn visit(&self, node: NodeId, frame: &mut Frame<'_>, out: &mut Vec<Block>) -> Result<(), ConvertError> {
        let s = self.styled;
        let tree = s.tree();
        if !tree.is_element(node) {
            return self.push_text(node, frame);
        }
        let display = s.keyword(node, "display")?;
        if display == "none" {
            return Ok(());
        }
        if tree.tag(node) == Some("br") {
            let properties = self.run_properties(node)?;
            frame.pending.push(PendingRun {
                run: Run {
                    content: RunContent::Break,
                    properties,
                    measured_width: None,
                },
                collapsible: false,
            });
            return Ok(());
        }
        match display.as_str() {
            "inline" | "inline-block" => {
                for &child in tree.children(node) {
                    self.visit(child, frame, out)?;
                }
                Ok(())
            }
            "table" | "inline-table" => {
                frame.flush(out);
                self.build_table(node, frame.ctx, out)
            }
            _ => {
                frame.flush(out);
                self.build_block(node, frame.ctx, out)
            }
        }
    }

    fn push_text(&self, node: NodeId, frame: &mut Frame<'_>) -> Result<(), ConvertError> {
        let tree = self.styled.tree();
        let (Some(raw), Some(parent)) = (tree.text(node), tree.parent(node)) else {
            return Ok(());
        };
        let mode = WhiteSpaceMode::from_keyword(&self.styled.keyword(parent, "white-space")?);
        let transform = self.styled.keyword(parent, "text-transform")?;
        let properties = self.run_properties(parent)?;
        let collapsible = !preserve_whitespace(mode);
        let text = normalize_text(raw, mode);
        let pieces: Vec<&str> = if keeps_newlines(mode) {
            text.split('\n').collect()
        } else {
            vec![text.as_str()]
        };
        for (idx, piece) in pieces.into_iter().enumerate() {
            if idx > 0 {
                frame.pending.push(PendingRun {
                    run: Run {
                        content: RunContent::Break,
                        properties: properties.clone(),
                        measured_width: None,
                    },
                    collapsible: false,
                });
            }
            let piece = if collapsible && frame.at_line_start_or_space() {
                piece.trim_start_matches(' ')
            } else {
                piece
            };
            if piece.is_empty() {
                continue;
            }
            let piece = apply_text_transform(piece, &transform);
            let measured_width = self.measurer.and_then(|m| {
                m.measure_text_width(
                    &properties.font,
                    properties.size_half_points as f64 / 2.0,
                    properties.bold,
                    properties.italic,
                    &piece,
                )
            });
            frame.pending.push(PendingRun {
                run: Run {
                    content: RunContent::Text(piece),
                    properties: properties.clone(),
                    measured_width,
                },
                collapsible,
            });
        }
        Ok(())
    }

    fn build_table(&self, node: NodeId, ctx: BlockContext, out: &mut Vec<Block>) -> Result<(), ConvertError> {
        let s = self.styled;
        let tree = s.tree();
        let mut rows = Vec::new();
        let mut captions_after = Vec::new();
        for &child in tree.children(node) {
            if !tree.is_element(child) {
                continue;
            }
            match s.keyword(child, "display")?.as_str() {
                "table-caption" => {
                    if s.keyword(node, "caption-side")? == "bottom" {
                        captions_after.push(child);
                    } else {
                        self.build_block(child, ctx, out)?;
                    }
                }
                _ => self.collect_rows(child, false, &mut rows)?,
            }
        }
        let collapsed = s.keyword(node, "border-collapse")? == "collapse";
        let spacing = s
            .computed(node, "border-spacing")?
            .terms()
            .first()
            .and_then(|term| match term.value {
                TermValue::Dimension(value, ref unit) if unit == "pt" => Some(value),
                _ => None,
            })
            .unwrap_or(0.0);
        let margin_left = s.pt(node, "margin-left")?.unwrap_or(0.0);
        out.push(Block::Table(Table {
            width: s.pt(node, "width")?.map(twips),
            layout: if s.keyword(node, "table-layout")? == "fixed" {
                TableLayout::Fixed
            } else {
                TableLayout::Auto
            },
            cell_spacing: if collapsed { 0 } else { twips(spacing) },
            indent_left: twips(ctx.indent_left + margin_left),
            rows,
        }));
        for caption in captions_after {
            self.build_block(caption, ctx, out)?;
        }
        Ok(())
    }

    fn collect_rows(&self, node: NodeId, header: bool, rows: &mut Vec<TableRow>) -> Result<(), ConvertError> {
        let s = self.styled;
        let tree = s.tree();
        if !tree.is_element(node) {
            return Ok(());
        }
        match s.keyword(node, "display")?.as_str() {
            "table-row" => {
                let mut cells = Vec::new();
                let mut all_th = true;
                for &child in tree.children(node) {
                    if !tree.is_element(child) || s.keyword(child, "display")? != "table-cell" {
                        continue;
                    }
                    all_th &= tree.tag(child) == Some("th");
                    cells.push(self.build_cell(child, node)?);
                }
                if !cells.is_empty() {
                    rows.push(TableRow {
                        cells,
                        header: header || all_th,
                    });
                }
            }
            "table-header-group" => {
                for &child in tree.children(node) {
                    self.collect_rows(child, true, rows)?;
                }
            }
            "table-row-group" | "table-footer-group" => {
                for &child in tree.children(node) {
                    self.collect_rows(child, header, rows)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn build_cell(&self, node: NodeId, row: NodeId) -> Result<TableCell, ConvertError> {
        let s = self.styled;
        let ctx = BlockContext::default();
        let properties = self.paragraph_properties(node, ctx)?;
        let mut blocks = Vec::new();
        self.build_contents(node, ctx, &properties, &mut blocks)?;
        let vertical_alignment = match s.keyword(node, "vertical-align")?.as_str() {
            "middle" => CellAlignment::Center,
            "bottom" | "text-bottom" => CellAlignment::Bottom,
            _ => CellAlignment::Top,
        };
        let shading = match hex_color(s.computed(node, "background-color")?) {
            Some(hex) => Some(hex),
            None => hex_color(s.computed(row, "background-color")?),
        };
        Ok(TableCell {
            width: s.pt(node, "width")?.map(twips),
            vertical_alignment,
            shading,
            blocks,
        })
    }

    fn edge(&self, node: NodeId, side: &str) -> Result<f64, ConvertError> {
        let s = self.styled;
        let margin = s.pt(node, &format!("margin-{side}"))?.unwrap_or(0.0);
        let border = s.pt(node, &format!("border-{side}-width"))?.unwrap_or(0.0);
        let padding = s.pt(node, &format!("padding-{side}"))?.unwrap_or(0.0);
        Ok(margin + border + padding)
    }

    fn paragraph_properties(&self, node: NodeId, ctx: BlockContext) -> Result<ParagraphProperties, ConvertError> {
        let s = self.styled;
        let tag = s.tree().tag(node).unwrap_or_default();
        let alignment = match s.keyword(node, "text-align")?.as_str() {
            "right" => Alignment::Right,
            "center" => Alignment::Center,
            "justify" => Alignment::Justify,
            _ => Alignment::Left,
        };
        let line_height = s.computed(node, "line-height")?;
        let line_spacing = match (line_height.as_number(), line_height.as_pt()) {
            (Some(factor), _) => Some(LineSpacing::Proportional(factor)),
            (None, Some(pt)) => Some(LineSpacing::Exact(twips(pt))),
            _ => None,
        };
        let numbering = if s.keyword(node, "display")? == "list-item" {
            let format = s.keyword(node, "list-style-type")?;
            (format != "none" && !format.is_empty()).then(|| Numbering {
                format,
                level: ctx.list_depth.saturating_sub(1),
            })
        } else {
            None
        };
        let heading_level = match tag.as_bytes() {
            [b'h', level @ b'1'..=b'6'] => Some(level - b'0'),
            _ => None,
        };
        Ok(ParagraphProperties {
            indent_left: twips(ctx.indent_left),
            indent_right: twips(ctx.indent_right),
            first_line_indent: twips(s.pt(node, "text-indent")?.unwrap_or(0.0)),
            spacing_before: twips(s.pt(node, "margin-top")?.unwrap_or(0.0).max(0.0)),
            spacing_after: twips(s.pt(node, "margin-bottom")?.unwrap_or(0.0).max(0.0)),
            line_spacing,
            alignment,
            bidi: s.keyword(node, "direction")? == "rtl",
            numbering,
            heading_level,
            shading: hex_color(s.computed(node, "background-color")?),
        })
    }

    fn run_properties(&self, element: NodeId) -> Result<RunProperties, ConvertError> {
        let s = self.styled;
        let size = s
            .pt(element, "font-size")?
            .unwrap_or(s.settings().default_font_size);
        let weight = s.computed(element, "font-weight")?.as_number().unwrap_or(400.0);
        let style = s.keyword(element, "font-style")?;
        let (underline, strike) = self.decorations(element)?;
        let mut shading = None;
        let mut vertical_position = VerticalPosition::Baseline;
        for id in self.inline_chain(element)? {
            if shading.is_none() {
                shading = hex_color(s.computed(id, "background-color")?);
            }
            if vertical_position == VerticalPosition::Baseline {
                vertical_position = match s.keyword(id, "vertical-align")?.as_str() {
                    "super" => VerticalPosition::Superscript,
                    "sub" => VerticalPosition::Subscript,
                    _ => VerticalPosition::Baseline,
                };
            }
        }
        Ok(RunProperties {
            font: self.choose_font(s.computed(element, "font-family")?),
            size_half_points: Pt::from_f64(size).to_half_points(),
            bold: weight >= 600.0,
            italic: matches!(style.as_str(), "italic" | "oblique"),
            underline,
            strike,
            small_caps: s.keyword(element, "font-variant")? == "small-caps",
            hidden: matches!(s.keyword(element, "visibility")?.as_str(), "hidden" | "collapse"),
            color: hex_color(s.computed(element, "color")?),
            shading,
            vertical_position,
            letter_spacing: twips(s.pt(element, "letter-spacing")?.unwrap_or(0.0)),
        })
    }

    // Decorations propagate from every ancestor, not just inline ones.
    fn decorations(&self, element: NodeId) -> Result<(bool, bool), ConvertError> {
        let s = self.styled;
        let (mut underline, mut strike) = (false, false);
        for id in iter::once(element).chain(s.tree().ancestors(element)) {
            for term in s.computed(id, "text-decoration")?.terms() {
                underline |= term.is_ident("underline");
                strike |= term.is_ident("line-through");
            }
        }
        Ok((underline, strike))
    }

    fn inline_chain(&self, element: NodeId) -> Result<Vec<NodeId>, ConvertError> {
        let s = self.styled;
        let mut chain = Vec::new();
        for id in iter::once(element).chain(s.tree().ancestors(element)) {
            if s.keyword(id, "display")? != "inline" {
                break;
            }
            chain.push(id);
        }
        Ok(chain)
    }

    // First available family. Without a measurer, the first non-generic
    // family is taken on trust.
    fn choose_font(&self, families: &Expression) -> String {
        let minor = &self.styled.settings().minor_font;
        for term in families.terms() {
            let (TermValue::Str(name) | TermValue::Ident(name)) = &term.value else {
                continue;
            };
            let available = match self.measurer {
                Some(measurer) => measurer.has_family(name),
                None => !GENERIC_FAMILIES.contains(&name.to_ascii_lowercase().as_str()),
            };
            if available {
                return name.clone();
            }
        }
        minor.clone()
    }
}

fn twips(pt: f64) -> i64 {
    Pt::from_f64(pt).to_twips()
}

fn hex_color(expr: &Expression) -> Option<String> {
    match expr.terms() {
        [term] => match &term.value {
            TermValue::Str(hex) if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
                Some(hex.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

// Collapses whitespace for the given mode without trimming; paragraph
// edges are trimmed when the paragraph is flushed.
fn normalize_text(text: &str, mode: WhiteSpaceMode) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    if preserve_whitespace(mode) {
        return text;
    }
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch == '\n' && mode == WhiteSpaceMode::PreLine {
            if out.ends_with(' ') {
                out.pop();
            }
            out.push('\n');
            in_space = true;
        } else if ch.is_whitespace() && ch != '\u{00A0}' {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn apply_text_transform(text: &str, transform: &str) -> String {
    match transform {
        "uppercase" => text.to_uppercase(),
        "lowercase" => text.to_lowercase(),
        "capitalize" => {
            let mut out = String::with_capacity(text.len());
            let mut new_word = true;
            for ch in text.chars() {
                if ch.is_whitespace() {
                    new_word = true;
                    out.push(ch);
                    continue;
                }
                if new_word {
                    out.extend(ch.to_uppercase());
                    new_word = false;
                } else {
                    out.push(ch);
                }
            }
            out
        }
        _ => text.to_string(),
    }
}
