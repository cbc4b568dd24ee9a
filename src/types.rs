use fixed::types::I32F32;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

pub const TWIPS_PER_PT: i64 = 20;

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f64(value: f64) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_twips(twips: i64) -> Pt {
        Pt::from_milli_i64(twips.saturating_mul(1000) / TWIPS_PER_PT)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_num()
    }

    // Rounds half away from zero to whole twentieths of a point.
    pub fn to_twips(self) -> i64 {
        let milli = self.to_milli_i64() as i128 * TWIPS_PER_PT as i128;
        div_round_i128(milli, 1000) as i64
    }

    pub fn to_half_points(self) -> i64 {
        div_round_i128(self.to_milli_i64() as i128 * 2, 1000) as i64
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    if num >= 0 {
        (num + (den_abs / 2)) / den
    } else {
        -(((-num) + (den_abs / 2)) / den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Size::from_mm(210.0, 297.0)
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Size::from_inches(8.5, 11.0)
    }

    pub fn from_inches(width_in: f64, height_in: f64) -> Self {
        Self {
            width: Pt::from_f64(width_in * 72.0),
            height: Pt::from_f64(height_in * 72.0),
        }
    }

    pub fn from_mm(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width: Pt::from_f64(width_mm * 72.0 / 25.4),
            height: Pt::from_f64(height_mm * 72.0 / 25.4),
        }
    }

    pub fn landscape(self) -> Self {
        if self.width < self.height {
            Size {
                width: self.height,
                height: self.width,
            }
        } else {
            self
        }
    }

    pub fn portrait(self) -> Self {
        if self.width > self.height {
            Size {
                width: self.height,
                height: self.width,
            }
        } else {
            self
        }
    }
}
