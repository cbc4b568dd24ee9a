use crate::error::ConvertError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use ttf_parser::GlyphId;

const PX_PER_PT: f64 = 96.0 / 72.0;

pub trait TextMeasurer: Send + Sync {
    fn has_family(&self, name: &str) -> bool;

    fn measure_text_width(
        &self,
        font: &str,
        size_pt: f64,
        bold: bool,
        italic: bool,
        text: &str,
    ) -> Option<f32>;
}

#[derive(Debug)]
struct RegisteredFace {
    family: String,
    bold: bool,
    italic: bool,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FontRegistry {
    faces: Vec<RegisteredFace>,
    families: HashMap<String, Vec<usize>>,
    family_cache: Mutex<HashMap<String, bool>>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn families(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for face in &self.faces {
            if !out.iter().any(|name| normalize_name(name) == normalize_name(&face.family)) {
                out.push(&face.family);
            }
        }
        out
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> Result<usize, ConvertError> {
        let mut added = 0;
        for entry in fs::read_dir(path.as_ref())?.flatten() {
            let path = entry.path();
            if path.is_file() && self.register_file(&path).is_ok() {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String, ConvertError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|v| v.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext != "ttf" && ext != "otf" {
            return Err(ConvertError::InvalidConfiguration(format!(
                "unsupported font file {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        let stem = path.file_stem().and_then(|v| v.to_str());
        self.register_bytes(data, stem)
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, ConvertError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let (family, bold, italic) = {
            let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
                return Err(ConvertError::InvalidConfiguration(format!(
                    "invalid font data for {source}"
                )));
            };
            (
                family_name(&face).unwrap_or_else(|| source.to_string()),
                face.is_bold(),
                face.is_italic() || face.is_oblique(),
            )
        };
        let index = self.faces.len();
        self.faces.push(RegisteredFace {
            family: family.clone(),
            bold,
            italic,
            data,
        });
        self.families
            .entry(normalize_name(&family))
            .or_default()
            .push(index);
        if let Ok(mut cache) = self.family_cache.lock() {
            cache.clear();
        }
        Ok(family)
    }

    // Exact style first, then matching weight, then the regular face.
    fn select_face(&self, family: &str, bold: bool, italic: bool) -> Option<&RegisteredFace> {
        let indexes = self.families.get(&normalize_name(family))?;
        let faces: Vec<&RegisteredFace> = indexes.iter().filter_map(|&i| self.faces.get(i)).collect();
        faces
            .iter()
            .find(|f| f.bold == bold && f.italic == italic)
            .or_else(|| faces.iter().find(|f| f.bold == bold))
            .or_else(|| faces.iter().find(|f| !f.bold && !f.italic))
            .or_else(|| faces.first())
            .copied()
    }
}

impl TextMeasurer for FontRegistry {
    fn has_family(&self, name: &str) -> bool {
        let key = normalize_name(name);
        if let Ok(cache) = self.family_cache.lock() {
            if let Some(&known) = cache.get(&key) {
                return known;
            }
        }
        let known = self.families.contains_key(&key);
        if let Ok(mut cache) = self.family_cache.lock() {
            cache.insert(key, known);
        }
        known
    }

    fn measure_text_width(
        &self,
        font: &str,
        size_pt: f64,
        bold: bool,
        italic: bool,
        text: &str,
    ) -> Option<f32> {
        let registered = self.select_face(font, bold, italic)?;
        let face = ttf_parser::Face::parse(&registered.data, 0).ok()?;
        let units_per_em = face.units_per_em().max(1) as f64;
        let fallback = face
            .glyph_hor_advance(GlyphId(0))
            .map(f64::from)
            .unwrap_or(units_per_em / 2.0);
        let units: f64 = text
            .chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(f64::from)
                    .unwrap_or(fallback)
            })
            .sum();
        Some((units * size_pt / units_per_em * PX_PER_PT) as f32)
    }
}

fn family_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut typographic = None;
    let mut family = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY if typographic.is_none() => typographic = Some(name),
            name_id::FAMILY if family.is_none() => family = Some(name),
            _ => {}
        }
    }
    typographic.or(family).filter(|name| !name.trim().is_empty())
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}
