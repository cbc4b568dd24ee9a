use std::fmt;

use lightningcss::properties::Property;
use lightningcss::properties::custom::{Token, TokenOrValue};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use lightningcss::traits::ToCss;
use lightningcss::values::angle::Angle;
use lightningcss::values::color::CssColor;
use lightningcss::values::resolution::Resolution;
use lightningcss::values::time::Time;

use crate::error::ConvertError;
use crate::units;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    #[default]
    Space,
    Comma,
    Slash,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermValue {
    Number(f64),
    Dimension(f64, String),
    Percentage(f64),
    Ident(String),
    Str(String),
    Hash(String),
    Function(String, Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub separator: Separator,
    pub value: TermValue,
}

impl Term {
    pub fn new(value: TermValue) -> Self {
        Self {
            separator: Separator::Space,
            value,
        }
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.value {
            TermValue::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_ident(&self, keyword: &str) -> bool {
        self.ident()
            .map(|name| name.eq_ignore_ascii_case(keyword))
            .unwrap_or(false)
    }

    pub fn is_length_or_percentage(&self) -> bool {
        match &self.value {
            TermValue::Dimension(..) | TermValue::Percentage(_) => true,
            TermValue::Number(value) => *value == 0.0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    terms: Vec<Term>,
}

pub const INHERITED: &str = "inherited";

impl Expression {
    // Tokenizes a value through lightningcss by reading it back as the
    // token list of a custom property. Text that does not tokenize, or
    // that holds `var()`/`env()` references, yields an empty expression.
    pub fn parse(raw: &str) -> Self {
        let source = format!("--value: {raw}");
        let Ok(attr) = StyleAttribute::parse(&source, ParserOptions::default()) else {
            return Self::default();
        };
        let parsed = attr
            .declarations
            .declarations
            .iter()
            .find_map(|property| match property {
                Property::Custom(custom) => Self::from_tokens(&custom.value.0),
                _ => None,
            });
        parsed.unwrap_or_default()
    }

    pub fn from_tokens(tokens: &[TokenOrValue<'_>]) -> Option<Self> {
        let mut terms = Vec::new();
        let mut separator = Separator::Space;
        for token in tokens {
            let value = match token {
                TokenOrValue::Token(Token::Comma) => {
                    separator = Separator::Comma;
                    continue;
                }
                TokenOrValue::Token(Token::Delim('/')) => {
                    separator = Separator::Slash;
                    continue;
                }
                TokenOrValue::Token(token) => match term_from_token(token) {
                    Some(value) => value,
                    None => continue,
                },
                TokenOrValue::Length(length) => {
                    let (value, unit) = length.to_unit_value();
                    TermValue::Dimension(widen(value), unit.to_ascii_lowercase())
                }
                TokenOrValue::Angle(angle) => {
                    let (value, unit) = match angle {
                        Angle::Deg(v) => (*v, "deg"),
                        Angle::Rad(v) => (*v, "rad"),
                        Angle::Grad(v) => (*v, "grad"),
                        Angle::Turn(v) => (*v, "turn"),
                    };
                    TermValue::Dimension(widen(value), unit.to_string())
                }
                TokenOrValue::Time(time) => {
                    let (value, unit) = match time {
                        Time::Seconds(v) => (*v, "s"),
                        Time::Milliseconds(v) => (*v, "ms"),
                    };
                    TermValue::Dimension(widen(value), unit.to_string())
                }
                TokenOrValue::Resolution(resolution) => {
                    let (value, unit) = match resolution {
                        Resolution::Dpi(v) => (*v, "dpi"),
                        Resolution::Dpcm(v) => (*v, "dpcm"),
                        Resolution::Dppx(v) => (*v, "dppx"),
                    };
                    TermValue::Dimension(widen(value), unit.to_string())
                }
                TokenOrValue::Color(color) => color_term(color),
                TokenOrValue::Url(url) => {
                    TermValue::Function("url".to_string(), Expression::string(url.url.as_ref()))
                }
                TokenOrValue::Function(func) => TermValue::Function(
                    func.name.0.as_ref().to_ascii_lowercase(),
                    Self::from_tokens(&func.arguments.0)?,
                ),
                _ => return None,
            };
            terms.push(Term { separator, value });
            separator = Separator::Space;
        }
        Some(Self { terms })
    }

    pub fn from_terms(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    pub fn keyword(name: &str) -> Self {
        Self::from_terms(vec![Term::new(TermValue::Ident(name.to_string()))])
    }

    pub fn pt(value: f64) -> Self {
        Self::from_terms(vec![Term::new(TermValue::Dimension(value, "pt".to_string()))])
    }

    pub fn number(value: f64) -> Self {
        Self::from_terms(vec![Term::new(TermValue::Number(value))])
    }

    pub fn string(value: &str) -> Self {
        Self::from_terms(vec![Term::new(TermValue::Str(value.to_string()))])
    }

    pub fn inherited() -> Self {
        Self::keyword(INHERITED)
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn into_terms(self) -> Vec<Term> {
        self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn single(&self, property: &str) -> Result<&Term, ConvertError> {
        match self.terms.as_slice() {
            [term] => Ok(term),
            _ => Err(ConvertError::MultiTermExpression {
                property: property.to_string(),
                terms: self.terms.len(),
            }),
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self.terms.as_slice() {
            [term] => term.ident(),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.as_keyword()
            .map(|name| name.eq_ignore_ascii_case(keyword))
            .unwrap_or(false)
    }

    pub fn is_inherit_marker(&self) -> bool {
        self.is_keyword(INHERITED) || self.is_keyword("inherit")
    }

    pub fn as_text(&self) -> Option<&str> {
        match self.terms.as_slice() {
            [Term {
                value: TermValue::Str(text) | TermValue::Ident(text),
                ..
            }] => Some(text),
            _ => None,
        }
    }

    pub fn as_pt(&self) -> Option<f64> {
        match self.terms.as_slice() {
            [Term {
                value: TermValue::Dimension(value, unit),
                ..
            }] if unit == "pt" => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.terms.as_slice() {
            [Term {
                value: TermValue::Number(value),
                ..
            }] => Some(*value),
            _ => None,
        }
    }

    pub fn comma_groups(&self) -> Vec<Vec<&Term>> {
        let mut groups: Vec<Vec<&Term>> = Vec::new();
        for term in &self.terms {
            if term.separator == Separator::Comma || groups.is_empty() {
                groups.push(Vec::new());
            }
            if let Some(group) = groups.last_mut() {
                group.push(term);
            }
        }
        groups
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, term) in self.terms.iter().enumerate() {
            if idx > 0 {
                match term.separator {
                    Separator::Space => write!(f, " ")?,
                    Separator::Comma => write!(f, ", ")?,
                    Separator::Slash => write!(f, " / ")?,
                }
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            TermValue::Number(value) => write!(f, "{}", format_number(*value)),
            TermValue::Dimension(value, unit) => write!(f, "{}{}", format_number(*value), unit),
            TermValue::Percentage(value) => write!(f, "{}%", format_number(*value)),
            TermValue::Ident(name) => write!(f, "{name}"),
            TermValue::Str(value) => {
                if value.chars().all(|c| c.is_alphanumeric() || c == '-' || c == ' ') {
                    write!(f, "{value}")
                } else {
                    write!(f, "\"{}\"", value.replace('"', "\\\""))
                }
            }
            TermValue::Hash(value) => write!(f, "#{value}"),
            TermValue::Function(name, args) => write!(f, "{name}({args})"),
        }
    }
}

pub fn format_number(value: f64) -> String {
    let mut out = format!("{:.6}", value);
    if out.contains('.') {
        while out.ends_with('0') {
            out.pop();
        }
        if out.ends_with('.') {
            out.pop();
        }
    }
    if out == "-0" {
        out = "0".to_string();
    }
    out
}

fn term_from_token(token: &Token<'_>) -> Option<TermValue> {
    let value = match token {
        Token::Ident(name) => TermValue::Ident(name.as_ref().to_string()),
        Token::String(text) => TermValue::Str(text.as_ref().to_string()),
        Token::Hash(name) | Token::IDHash(name) => TermValue::Hash(name.as_ref().to_string()),
        Token::Number { value, .. } => TermValue::Number(widen(*value)),
        Token::Percentage { unit_value, .. } => TermValue::Percentage(widen(*unit_value * 100.0)),
        Token::Dimension { value, unit, .. } => {
            TermValue::Dimension(widen(*value), unit.as_ref().to_ascii_lowercase())
        }
        Token::Delim(ch) => TermValue::Ident(ch.to_string()),
        _ => return None,
    };
    Some(value)
}

// Parsed colors come back as hex (eight digits when translucent) so the
// color conversions downstream see one shape.
fn color_term(color: &CssColor) -> TermValue {
    match color {
        CssColor::RGBA(rgba) if rgba.alpha == 255 => TermValue::Hash(format!(
            "{:02x}{:02x}{:02x}",
            rgba.red, rgba.green, rgba.blue
        )),
        CssColor::RGBA(rgba) => TermValue::Hash(format!(
            "{:02x}{:02x}{:02x}{:02x}",
            rgba.red, rgba.green, rgba.blue, rgba.alpha
        )),
        CssColor::CurrentColor => TermValue::Ident("currentcolor".to_string()),
        other => match units::css_color_to_hex(other) {
            Some(hex) => TermValue::Hash(hex),
            None => TermValue::Ident(other.to_css_string(PrinterOptions::default()).unwrap_or_default()),
        },
    }
}

// lightningcss stores numbers as f32; going through the shortest decimal
// keeps `2.54` from widening to `2.5399999618530273`.
fn widen(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_font_shorthand_with_slash_marker() {
        let expr = Expression::parse("italic bold 12pt / 1.5 \"Times New Roman\", serif");
        let terms = expr.terms();
        assert_eq!(terms.len(), 6);
        assert_eq!(terms[2].value, TermValue::Dimension(12.0, "pt".to_string()));
        assert_eq!(terms[3].separator, Separator::Slash);
        assert_eq!(terms[3].value, TermValue::Number(1.5));
        assert_eq!(terms[4].value, TermValue::Str("Times New Roman".to_string()));
        assert_eq!(terms[5].separator, Separator::Comma);
        assert!(terms[5].is_ident("serif"));
    }

    #[test]
    fn leading_dot_and_units_are_split() {
        let expr = Expression::parse(".5em -2.54CM 50% 1e2px");
        let values: Vec<&TermValue> = expr.terms().iter().map(|t| &t.value).collect();
        assert_eq!(
            values,
            vec![
                &TermValue::Dimension(0.5, "em".to_string()),
                &TermValue::Dimension(-2.54, "cm".to_string()),
                &TermValue::Percentage(50.0),
                &TermValue::Dimension(100.0, "px".to_string()),
            ]
        );
    }

    #[test]
    fn functions_keep_their_arguments() {
        let expr = Expression::parse("counter(item, lower-roman) url(\"img/a b.png\") #FFF");
        let terms = expr.terms();
        let TermValue::Function(name, args) = &terms[0].value else {
            panic!("expected function, got {:?}", terms[0]);
        };
        assert_eq!(name, "counter");
        assert_eq!(args.len(), 2);
        assert_eq!(args.terms()[1].separator, Separator::Comma);
        assert_eq!(
            terms[1].value,
            TermValue::Function("url".to_string(), Expression::string("img/a b.png"))
        );
        assert_eq!(terms[2].value, TermValue::Hash("ffffff".to_string()));
    }

    #[test]
    fn color_functions_arrive_as_hex() {
        let expr = Expression::parse("rgb(255, 0, 10) rgba(0, 0, 0, 0)");
        let values: Vec<&TermValue> = expr.terms().iter().map(|t| &t.value).collect();
        assert_eq!(
            values,
            vec![
                &TermValue::Hash("ff000a".to_string()),
                &TermValue::Hash("00000000".to_string()),
            ]
        );
    }

    #[test]
    fn variable_references_do_not_tokenize() {
        assert!(Expression::parse("var(--gap) 2pt").is_empty());
        assert!(Expression::parse("").is_empty());
    }

    #[test]
    fn single_rejects_multi_term_values() {
        let expr = Expression::parse("10pt 20pt");
        let err = expr.single("width").expect_err("two terms");
        assert!(matches!(
            err,
            ConvertError::MultiTermExpression { ref property, terms: 2 } if property == "width"
        ));
    }

    #[test]
    fn display_trims_float_noise() {
        assert_eq!(Expression::pt(72.0).to_string(), "72pt");
        assert_eq!(Expression::pt(0.1 + 0.2).to_string(), "0.3pt");
        assert_eq!(Expression::parse("a,b / c").to_string(), "a, b / c");
    }
}
