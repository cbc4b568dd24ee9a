use crate::error::ConvertError;
use crate::types::{Pt, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    pub width: i64,
    pub height: i64,
    pub top_margin: i64,
    pub right_margin: i64,
    pub bottom_margin: i64,
    pub left_margin: i64,
}

impl PageGeometry {
    pub fn a4() -> Self {
        let size = Size::a4();
        Self {
            width: size.width.to_twips(),
            height: size.height.to_twips(),
            top_margin: 1440,
            right_margin: 1440,
            bottom_margin: 1440,
            left_margin: 1440,
        }
    }

    pub fn from_size(size: Size, margin: Pt) -> Self {
        let margin = margin.to_twips();
        Self {
            width: size.width.to_twips(),
            height: size.height.to_twips(),
            top_margin: margin,
            right_margin: margin,
            bottom_margin: margin,
            left_margin: margin,
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: Pt::from_twips(self.width),
            height: Pt::from_twips(self.height),
        }
    }

    pub fn printable_width_twips(&self) -> i64 {
        self.width - self.left_margin - self.right_margin
    }

    pub fn printable_width_pt(&self) -> f64 {
        Pt::from_twips(self.printable_width_twips()).to_f64()
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        PageGeometry::a4()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub default_font_size: f64,
    pub minor_font: String,
    pub major_font: String,
    pub default_block_margin: f64,
    pub page: PageGeometry,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_font_size: 11.0,
            minor_font: "Calibri".to_string(),
            major_font: "Calibri Light".to_string(),
            default_block_margin: 8.0,
            page: PageGeometry::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConvertError> {
        if !self.default_font_size.is_finite() || self.default_font_size <= 0.0 {
            return Err(ConvertError::InvalidConfiguration(format!(
                "default_font_size must be > 0, got {}",
                self.default_font_size
            )));
        }
        if self.minor_font.trim().is_empty() {
            return Err(ConvertError::InvalidConfiguration(
                "minor_font must name a font family".to_string(),
            ));
        }
        if self.major_font.trim().is_empty() {
            return Err(ConvertError::InvalidConfiguration(
                "major_font must name a font family".to_string(),
            ));
        }
        if !self.default_block_margin.is_finite() || self.default_block_margin < 0.0 {
            return Err(ConvertError::InvalidConfiguration(format!(
                "default_block_margin must be >= 0, got {}",
                self.default_block_margin
            )));
        }
        if self.page.printable_width_twips() <= 0 {
            return Err(ConvertError::InvalidConfiguration(format!(
                "page printable width must be > 0 (width {} - margins {} - {})",
                self.page.width, self.page.left_margin, self.page.right_margin
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_prints_a4_minus_inch_margins() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.page.printable_width_twips(), 11906 - 2880);
        assert!((settings.page.printable_width_pt() - 451.3).abs() < 1e-6);
    }

    #[test]
    fn margins_wider_than_page_are_rejected() {
        let mut settings = Settings::default();
        settings.page.left_margin = settings.page.width;
        let err = settings.validate().expect_err("margins exceed page");
        assert!(matches!(err, ConvertError::InvalidConfiguration(_)));
    }
}
