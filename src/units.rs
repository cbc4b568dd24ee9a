use lightningcss::traits::Parse;
use lightningcss::values::color::{CssColor, SRGB};

use crate::expr::{Expression, Term, TermValue};

pub const PT_PER_INCH: f64 = 72.0;
pub const CM_PER_INCH: f64 = 2.54;
pub const MM_PER_INCH: f64 = 25.4;
pub const PT_PER_PICA: f64 = 12.0;
pub const PT_PER_PX: f64 = 0.75;

// Keyword widths accepted wherever the generic length conversion runs.
// These differ from `BORDER_WIDTH_KEYWORDS`; both tables are kept as-is
// for their own call sites.
pub const GENERIC_WIDTH_KEYWORDS: [(&str, f64); 3] =
    [("thin", 0.3), ("medium", 1.2), ("thick", 1.8)];

pub const BORDER_WIDTH_KEYWORDS: [(&str, f64); 3] =
    [("thin", 0.75), ("medium", 3.0), ("thick", 4.5)];

pub const FONT_SIZE_KEYWORDS: [(&str, f64); 7] = [
    ("xx-small", 7.5),
    ("x-small", 10.0),
    ("small", 12.0),
    ("medium", 13.5),
    ("large", 18.0),
    ("x-large", 24.0),
    ("xx-large", 36.0),
];

const FONT_SIZE_STEPS: [f64; 12] = [
    6.0, 7.5, 8.0, 9.0, 10.0, 11.0, 12.0, 13.5, 14.0, 18.0, 24.0, 36.0,
];

pub const BORDER_STYLES: [&str; 10] = [
    "none", "hidden", "dotted", "dashed", "solid", "double", "groove", "ridge", "inset", "outset",
];

const NAMED_COLORS: [(&str, &str); 20] = [
    ("black", "000000"),
    ("silver", "c0c0c0"),
    ("gray", "808080"),
    ("grey", "808080"),
    ("white", "ffffff"),
    ("maroon", "800000"),
    ("red", "ff0000"),
    ("purple", "800080"),
    ("fuchsia", "ff00ff"),
    ("magenta", "ff00ff"),
    ("green", "008000"),
    ("lime", "00ff00"),
    ("olive", "808000"),
    ("yellow", "ffff00"),
    ("navy", "000080"),
    ("blue", "0000ff"),
    ("teal", "008080"),
    ("aqua", "00ffff"),
    ("cyan", "00ffff"),
    ("orange", "ffa500"),
];

pub fn absolute_to_pt(value: f64, unit: &str) -> Option<f64> {
    let pt = match unit {
        "pt" => value,
        "in" => value * PT_PER_INCH,
        "cm" => value * PT_PER_INCH / CM_PER_INCH,
        "mm" => value * PT_PER_INCH / MM_PER_INCH,
        "pc" => value * PT_PER_PICA,
        "px" => value * PT_PER_PX,
        _ => return None,
    };
    Some(pt)
}

pub fn absolute_term_pt(term: &Term) -> Option<f64> {
    match &term.value {
        TermValue::Dimension(value, unit) => absolute_to_pt(*value, unit),
        TermValue::Number(value) if *value == 0.0 => Some(0.0),
        _ => None,
    }
}

pub fn keyword_width(table: &[(&str, f64)], keyword: &str) -> Option<f64> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(keyword))
        .map(|(_, pt)| *pt)
}

pub fn font_size_keyword(keyword: &str) -> Option<f64> {
    keyword_width(&FONT_SIZE_KEYWORDS, keyword)
}

pub fn is_font_size_keyword(keyword: &str) -> bool {
    font_size_keyword(keyword).is_some() || keyword == "larger" || keyword == "smaller"
}

pub fn larger_font_size(current: f64) -> f64 {
    FONT_SIZE_STEPS
        .iter()
        .copied()
        .find(|step| *step > current + 1e-9)
        .unwrap_or(current * 1.2)
}

pub fn smaller_font_size(current: f64) -> f64 {
    FONT_SIZE_STEPS
        .iter()
        .rev()
        .copied()
        .find(|step| *step < current - 1e-9)
        .unwrap_or(current / 1.2)
}

pub fn is_border_style(keyword: &str) -> bool {
    BORDER_STYLES.iter().any(|s| s.eq_ignore_ascii_case(keyword))
}

pub fn is_color_term(term: &Term) -> bool {
    match &term.value {
        TermValue::Hash(_) => true,
        TermValue::Function(name, _) => matches!(
            name.as_str(),
            "rgb" | "rgba" | "hsl" | "hsla" | "hwb" | "lab" | "lch" | "oklab" | "oklch" | "color"
        ),
        TermValue::Ident(name) => {
            let lower = name.to_ascii_lowercase();
            lower == "transparent"
                || lower == "currentcolor"
                || named_color(&lower).is_some()
                || parse_with_lightningcss(&lower).is_some()
        }
        _ => false,
    }
}

pub fn named_color(name: &str) -> Option<&'static str> {
    NAMED_COLORS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, hex)| *hex)
}

pub fn color_term_to_hex(term: &Term) -> Option<String> {
    match &term.value {
        TermValue::Hash(hex) => hex_to_canonical(hex),
        TermValue::Ident(name) => named_color(name)
            .map(str::to_string)
            .or_else(|| parse_with_lightningcss(name)),
        TermValue::Function(name, args) if name == "rgb" || name == "rgba" => {
            rgb_function_to_hex(args)
        }
        TermValue::Function(..) => parse_with_lightningcss(&term.to_string()),
        _ => None,
    }
}

pub fn color_expression_to_hex(expr: &Expression) -> Option<String> {
    match expr.terms() {
        [term] => color_term_to_hex(term),
        _ => None,
    }
}

fn hex_to_canonical(hex: &str) -> Option<String> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let lower = hex.to_ascii_lowercase();
    let expanded: String = match lower.len() {
        3 | 4 => lower.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => lower,
        _ => return None,
    };
    let channel = |idx: usize| u8::from_str_radix(&expanded[idx..idx + 2], 16).ok();
    let (r, g, b) = (channel(0)?, channel(2)?, channel(4)?);
    let alpha = if expanded.len() == 8 { channel(6)? } else { 255 };
    Some(rgba_to_hex(r, g, b, alpha))
}

fn rgb_function_to_hex(args: &Expression) -> Option<String> {
    let terms = args.terms();
    if terms.len() < 3 {
        return None;
    }
    let mut channels = [0u8; 3];
    for (slot, term) in channels.iter_mut().zip(terms.iter()) {
        *slot = match term.value {
            TermValue::Number(value) => value.round().clamp(0.0, 255.0) as u8,
            TermValue::Percentage(value) => (value.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u8,
            _ => return None,
        };
    }
    let alpha = match terms.get(3).map(|t| &t.value) {
        Some(TermValue::Number(value)) => (value.clamp(0.0, 1.0) * 255.0).round() as u8,
        Some(TermValue::Percentage(value)) => (value.clamp(0.0, 100.0) * 2.55).round() as u8,
        _ => 255,
    };
    Some(rgba_to_hex(channels[0], channels[1], channels[2], alpha))
}

fn parse_with_lightningcss(raw: &str) -> Option<String> {
    let color = CssColor::parse_string(raw).ok()?;
    css_color_to_hex(&color)
}

pub(crate) fn css_color_to_hex(color: &CssColor) -> Option<String> {
    match color {
        CssColor::RGBA(rgba) => Some(rgba_to_hex(rgba.red, rgba.green, rgba.blue, rgba.alpha)),
        CssColor::CurrentColor => None,
        _ => {
            let srgb = SRGB::try_from(color).ok()?;
            let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            Some(rgba_to_hex(to_u8(srgb.r), to_u8(srgb.g), to_u8(srgb.b), 255))
        }
    }
}

// Partially transparent colors are flattened over white.
fn rgba_to_hex(r: u8, g: u8, b: u8, alpha: u8) -> String {
    let blend = |channel: u8| {
        let a = alpha as f64 / 255.0;
        (channel as f64 * a + 255.0 * (1.0 - a)).round() as u8
    };
    format!("{:02x}{:02x}{:02x}", blend(r), blend(g), blend(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(raw: &str) -> Option<String> {
        color_expression_to_hex(&Expression::parse(raw))
    }

    #[test]
    fn absolute_units_normalize_to_points() {
        for (value, unit) in [(1.0, "in"), (2.54, "cm"), (25.4, "mm"), (6.0, "pc"), (96.0, "px")] {
            let pt = absolute_to_pt(value, unit).expect("absolute unit");
            assert!((pt - 72.0).abs() < 1e-6, "{value}{unit} -> {pt}");
        }
        assert_eq!(absolute_to_pt(3.0, "em"), None);
    }

    #[test]
    fn hex_and_named_colors() {
        assert_eq!(hex("#FF0000").as_deref(), Some("ff0000"));
        assert_eq!(hex("#0a3").as_deref(), Some("00aa33"));
        assert_eq!(hex("navy").as_deref(), Some("000080"));
        assert_eq!(hex("ORANGE").as_deref(), Some("ffa500"));
        assert_eq!(hex("#12345").as_deref(), None);
    }

    #[test]
    fn rgb_function_integer_and_percentage_forms() {
        assert_eq!(hex("rgb(255, 0, 10)").as_deref(), Some("ff000a"));
        assert_eq!(hex("rgb(100%, 50%, 0%)").as_deref(), Some("ff8000"));
        assert_eq!(hex("rgb(0 0 0)").as_deref(), Some("000000"));
        assert_eq!(hex("rgba(0, 0, 0, 0)").as_deref(), Some("ffffff"));
    }

    #[test]
    fn colors_outside_the_keyword_table_fall_back_to_the_css_parser() {
        assert_eq!(hex("tan").as_deref(), Some("d2b48c"));
        assert_eq!(hex("hsl(0, 100%, 50%)").as_deref(), Some("ff0000"));
        assert_eq!(hex("notacolor"), None);
    }

    #[test]
    fn width_keyword_tables_disagree() {
        assert_eq!(keyword_width(&GENERIC_WIDTH_KEYWORDS, "thin"), Some(0.3));
        assert_eq!(keyword_width(&BORDER_WIDTH_KEYWORDS, "thin"), Some(0.75));
        assert_eq!(keyword_width(&GENERIC_WIDTH_KEYWORDS, "thick"), Some(1.8));
        assert_eq!(keyword_width(&BORDER_WIDTH_KEYWORDS, "thick"), Some(4.5));
    }

    #[test]
    fn font_size_steps() {
        assert_eq!(font_size_keyword("xx-small"), Some(7.5));
        assert_eq!(font_size_keyword("xx-large"), Some(36.0));
        assert_eq!(larger_font_size(12.0), 13.5);
        assert_eq!(smaller_font_size(12.0), 11.0);
        assert!((larger_font_size(36.0) - 43.2).abs() < 1e-9);
        assert!((smaller_font_size(6.0) - 5.0).abs() < 1e-9);
    }
}
