use crate::settings::PageGeometry;

// Converted document: a flat list of top-level blocks plus the page
// geometry they were laid out against. Lengths are in twips unless a field
// says otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page: PageGeometry,
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(page: PageGeometry) -> Self {
        Self {
            page,
            blocks: Vec::new(),
        }
    }

    pub fn paragraphs(&self) -> Vec<&Paragraph> {
        let mut out = Vec::new();
        collect_paragraphs(&self.blocks, &mut out);
        out
    }

    pub fn tables(&self) -> Vec<&Table> {
        let mut out = Vec::new();
        collect_tables(&self.blocks, &mut out);
        out
    }

    pub fn text(&self) -> String {
        self.paragraphs()
            .iter()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn collect_paragraphs<'a>(blocks: &'a [Block], out: &mut Vec<&'a Paragraph>) {
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => out.push(paragraph),
            Block::Table(table) => {
                for row in &table.rows {
                    for cell in &row.cells {
                        collect_paragraphs(&cell.blocks, out);
                    }
                }
            }
        }
    }
}

fn collect_tables<'a>(blocks: &'a [Block], out: &mut Vec<&'a Table>) {
    for block in blocks {
        if let Block::Table(table) = block {
            out.push(table);
            for row in &table.rows {
                for cell in &row.cells {
                    collect_tables(&cell.blocks, out);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    pub properties: ParagraphProperties,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            match &run.content {
                RunContent::Text(text) => out.push_str(text),
                RunContent::Break => out.push('\n'),
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Right,
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSpacing {
    Proportional(f64),
    Exact(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numbering {
    pub format: String,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParagraphProperties {
    pub indent_left: i64,
    pub indent_right: i64,
    pub first_line_indent: i64,
    pub spacing_before: i64,
    pub spacing_after: i64,
    pub line_spacing: Option<LineSpacing>,
    pub alignment: Alignment,
    pub bidi: bool,
    pub numbering: Option<Numbering>,
    pub heading_level: Option<u8>,
    pub shading: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunContent {
    Text(String),
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalPosition {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunProperties {
    pub font: String,
    pub size_half_points: i64,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub small_caps: bool,
    pub hidden: bool,
    // Six hex digits, no `#`.
    pub color: Option<String>,
    pub shading: Option<String>,
    pub vertical_position: VerticalPosition,
    pub letter_spacing: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub content: RunContent,
    pub properties: RunProperties,
    pub measured_width: Option<f32>,
}

impl Run {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            RunContent::Text(text) => Some(text),
            RunContent::Break => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableLayout {
    #[default]
    Auto,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub width: Option<i64>,
    pub layout: TableLayout,
    pub cell_spacing: i64,
    pub indent_left: i64,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(|row| row.cells.len()).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    pub header: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellAlignment {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableCell {
    pub width: Option<i64>,
    pub vertical_alignment: CellAlignment,
    pub shading: Option<String>,
    pub blocks: Vec<Block>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(text: &str) -> Paragraph {
        Paragraph {
            properties: ParagraphProperties::default(),
            runs: vec![Run {
                content: RunContent::Text(text.to_string()),
                properties: RunProperties::default(),
                measured_width: None,
            }],
        }
    }

    #[test]
    fn paragraphs_descend_into_cells_in_reading_order() {
        let mut doc = Document::new(PageGeometry::default());
        doc.blocks.push(Block::Paragraph(paragraph("before")));
        doc.blocks.push(Block::Table(Table {
            rows: vec![TableRow {
                cells: vec![
                    TableCell {
                        blocks: vec![Block::Paragraph(paragraph("a"))],
                        ..TableCell::default()
                    },
                    TableCell {
                        blocks: vec![Block::Paragraph(paragraph("b"))],
                        ..TableCell::default()
                    },
                ],
                header: false,
            }],
            ..Table::default()
        }));
        doc.blocks.push(Block::Paragraph(paragraph("after")));
        assert_eq!(doc.text(), "before\na\nb\nafter");
        assert_eq!(doc.tables().len(), 1);
        assert_eq!(doc.tables()[0].column_count(), 2);
    }
}
