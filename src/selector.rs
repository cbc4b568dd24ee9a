use crate::dom::{NodeId, StyleTree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity(pub u16, pub u16, pub u16);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
    pub pseudo: Option<String>,
}

impl SimpleSelector {
    pub fn matches(&self, tree: &StyleTree, node: NodeId) -> bool {
        if self.pseudo.is_some() {
            return false;
        }
        let Some(element) = tree.element(node) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if tag != "*" && tag != &element.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if tree.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        for class in &self.classes {
            if !tree.has_class(node, class) {
                return false;
            }
        }
        self.attrs.iter().all(|attr| attr.matches(tree, node))
    }

    pub fn specificity(&self) -> Specificity {
        let id_count = self.id.as_ref().map(|_| 1).unwrap_or(0);
        let class_count = (self.classes.len() + self.attrs.len()) as u16;
        let tag_count = self
            .tag
            .as_ref()
            .filter(|tag| tag.as_str() != "*")
            .map(|_| 1)
            .unwrap_or(0);
        Specificity(id_count, class_count, tag_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl AttrSelector {
    fn matches(&self, tree: &StyleTree, node: NodeId) -> bool {
        let Some(actual) = tree.attr(node, &self.name) else {
            return false;
        };
        let expected = self.value.as_deref().unwrap_or("");
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_whitespace().any(|part| part == expected),
            AttrOp::DashMatch => actual == expected || actual.starts_with(&format!("{expected}-")),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    parts: Vec<SimpleSelector>,
    combinators: Vec<Combinator>,
}

impl Selector {
    pub fn parse(selector: &str) -> Option<Selector> {
        parse_selector(selector)
    }

    pub fn parts(&self) -> &[SimpleSelector] {
        &self.parts
    }

    // Right-to-left match. A descendant combinator takes the nearest
    // ancestor matching the next part and never revisits that choice, so
    // `a b c` can miss when only a farther `b` leads to an `a`.
    pub fn matches(&self, tree: &StyleTree, node: NodeId) -> bool {
        let Some((last, rest)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(tree, node) {
            return false;
        }

        let mut current = node;
        for (idx, part) in rest.iter().rev().enumerate() {
            let comb_index = self.combinators.len().saturating_sub(1 + idx);
            let combinator = self
                .combinators
                .get(comb_index)
                .copied()
                .unwrap_or(Combinator::Descendant);
            match combinator {
                Combinator::Child => {
                    let Some(parent) = tree.parent(current) else {
                        return false;
                    };
                    if !part.matches(tree, parent) {
                        return false;
                    }
                    current = parent;
                }
                Combinator::AdjacentSibling => {
                    let Some(prev) = tree.previous_element_sibling(current) else {
                        return false;
                    };
                    if !part.matches(tree, prev) {
                        return false;
                    }
                    current = prev;
                }
                Combinator::Descendant => {
                    let Some(ancestor) = tree
                        .ancestors(current)
                        .find(|&ancestor| part.matches(tree, ancestor))
                    else {
                        return false;
                    };
                    current = ancestor;
                }
            }
        }
        true
    }

    pub fn specificity(&self) -> Specificity {
        let mut spec = Specificity(0, 0, 0);
        for part in &self.parts {
            let part_spec = part.specificity();
            spec.0 += part_spec.0;
            spec.1 += part_spec.1;
            spec.2 += part_spec.2;
        }
        spec
    }
}

pub fn split_selector_list(list: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    for (idx, ch) in list.char_indices() {
        if let Some(q) = in_quote {
            if ch == q {
                in_quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => in_quote = Some(ch),
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(list[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push(list[start..].trim());
    out.retain(|s| !s.is_empty());
    out
}

fn parse_selector(selector: &str) -> Option<Selector> {
    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }
    let mut parts: Vec<SimpleSelector> = Vec::new();
    let mut combinators: Vec<Combinator> = Vec::new();
    let mut buf = String::new();
    let mut pending: Option<Combinator> = None;
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;

    for ch in selector.chars() {
        if let Some(q) = in_quote {
            if ch == q {
                in_quote = None;
            }
            buf.push(ch);
            continue;
        }
        if depth > 0 {
            match ch {
                '"' | '\'' => in_quote = Some(ch),
                '[' | '(' => depth += 1,
                ']' | ')' => depth -= 1,
                _ => {}
            }
            buf.push(ch);
            continue;
        }
        match ch {
            '[' | '(' => {
                depth += 1;
                buf.push(ch);
            }
            '>' | '+' => {
                flush_part(&mut buf, &mut parts, &mut combinators, &mut pending)?;
                if parts.is_empty() {
                    return None;
                }
                pending = Some(if ch == '>' {
                    Combinator::Child
                } else {
                    Combinator::AdjacentSibling
                });
            }
            // General sibling and namespace syntax have no counterpart here.
            '~' | '|' => return None,
            c if c.is_whitespace() => {
                if !buf.trim().is_empty() {
                    flush_part(&mut buf, &mut parts, &mut combinators, &mut pending)?;
                    pending = Some(Combinator::Descendant);
                }
            }
            _ => buf.push(ch),
        }
    }
    if !buf.trim().is_empty() {
        flush_part(&mut buf, &mut parts, &mut combinators, &mut pending)?;
    } else if pending.is_some() {
        return None;
    }

    if parts.is_empty() || combinators.len() + 1 != parts.len() {
        return None;
    }
    Some(Selector { parts, combinators })
}

fn flush_part(
    buf: &mut String,
    parts: &mut Vec<SimpleSelector>,
    combinators: &mut Vec<Combinator>,
    pending: &mut Option<Combinator>,
) -> Option<()> {
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        buf.clear();
        return Some(());
    }
    let simple = parse_simple_selector(trimmed)?;
    if !parts.is_empty() {
        combinators.push(pending.take().unwrap_or(Combinator::Descendant));
    }
    parts.push(simple);
    buf.clear();
    Some(())
}

enum SelectorPart {
    Tag,
    Id,
    Class,
}

fn parse_simple_selector(selector: &str) -> Option<SimpleSelector> {
    let (base, attrs_raw) = extract_attr_selectors(selector);
    let (base, pseudo) = match split_pseudo(&base) {
        Some((base, pseudo)) => (base.to_string(), Some(pseudo.to_string())),
        None => (base, None),
    };

    let mut out = SimpleSelector::default();
    let mut buffer = String::new();
    let mut mode = SelectorPart::Tag;
    for ch in base.chars() {
        match ch {
            '#' | '.' => {
                flush_simple_part(&mode, &mut buffer, &mut out);
                mode = if ch == '#' {
                    SelectorPart::Id
                } else {
                    SelectorPart::Class
                };
            }
            _ => buffer.push(ch),
        }
    }
    flush_simple_part(&mode, &mut buffer, &mut out);

    for raw in attrs_raw {
        out.attrs.push(parse_attr_selector(&raw)?);
    }
    out.pseudo = pseudo;

    if out.tag.is_none()
        && out.id.is_none()
        && out.classes.is_empty()
        && out.attrs.is_empty()
        && out.pseudo.is_none()
    {
        return None;
    }
    Some(out)
}

fn split_pseudo(base: &str) -> Option<(&str, &str)> {
    let idx = base.find(':')?;
    Some((&base[..idx], base[idx..].trim_start_matches(':')))
}

fn flush_simple_part(mode: &SelectorPart, buffer: &mut String, out: &mut SimpleSelector) {
    if buffer.is_empty() {
        return;
    }
    let value = std::mem::take(buffer);
    match mode {
        SelectorPart::Tag => out.tag = Some(value.to_ascii_lowercase()),
        SelectorPart::Id => out.id = Some(value),
        SelectorPart::Class => out.classes.push(value),
    }
}

fn extract_attr_selectors(input: &str) -> (String, Vec<String>) {
    let mut base = String::new();
    let mut attrs = Vec::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '[' {
            base.push(ch);
            continue;
        }
        let mut buf = String::new();
        let mut in_quote: Option<char> = None;
        for c in chars.by_ref() {
            if let Some(q) = in_quote {
                if c == q {
                    in_quote = None;
                }
                buf.push(c);
                continue;
            }
            if c == '"' || c == '\'' {
                in_quote = Some(c);
                buf.push(c);
                continue;
            }
            if c == ']' {
                break;
            }
            buf.push(c);
        }
        if !buf.trim().is_empty() {
            attrs.push(buf.trim().to_string());
        }
    }
    (base, attrs)
}

fn parse_attr_selector(raw: &str) -> Option<AttrSelector> {
    const OPS: [(&str, AttrOp); 6] = [
        ("~=", AttrOp::Includes),
        ("|=", AttrOp::DashMatch),
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Substring),
        ("=", AttrOp::Equals),
    ];
    let raw = raw.trim();
    let Some(eq) = raw.find('=') else {
        let name = raw.to_ascii_lowercase();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return None;
        }
        return Some(AttrSelector {
            name,
            op: AttrOp::Exists,
            value: None,
        });
    };
    let (op, name_end) = OPS
        .iter()
        .find(|(token, _)| token.len() == 2 && eq > 0 && raw[..=eq].ends_with(token))
        .map(|(_, op)| (*op, eq - 1))
        .unwrap_or((AttrOp::Equals, eq));
    let name = raw[..name_end].trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let value = raw[eq + 1..].trim();
    // Drop a trailing case-sensitivity flag (`i` / `s`) after a quoted value.
    let value = match value.rsplit_once(char::is_whitespace) {
        Some((quoted, flag)) if flag.len() == 1 && quoted.ends_with(['"', '\'']) => quoted.trim(),
        _ => value,
    };
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some(AttrSelector {
        name,
        op,
        value: Some(value.to_string()),
    })
}
