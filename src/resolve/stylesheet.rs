//! Minimal stylesheet parsing for the inline strategies.
//!
//! Good enough for the CSS that rides along in chat messages: flat class
//! rules, comments, and one level of at-rule nesting. Anything it cannot
//! represent as an inline style object is kept out of the class map and
//! falls through to the injection strategy instead.

use std::collections::BTreeMap;

/// A single parsed rule. `class_name` is set only for simple single-class
/// selectors, the only shape an inline style object can express.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub class_name: Option<String>,
    pub declarations: Vec<(String, String)>,
}

/// Ordered map of camel-cased class name to camel-cased declarations.
/// Later rules override earlier ones per the cascade.
pub type ClassStyleMap = BTreeMap<String, BTreeMap<String, String>>;

pub fn parse_stylesheet(css: &str) -> Vec<StyleRule> {
    let stripped = strip_comments(css);
    let mut rules = Vec::new();
    collect_rules(&stripped, &mut rules);
    rules
}

fn collect_rules(css: &str, rules: &mut Vec<StyleRule>) {
    let mut rest = css;
    while let Some(open) = rest.find('{') {
        let selector = rest[..open].trim().to_string();
        let body_start = open + 1;
        let Some(body_len) = matching_brace(&rest[body_start..]) else {
            return;
        };
        let body = &rest[body_start..body_start + body_len];

        if selector.starts_with('@') {
            // At-rule: recurse into nested rules, dropping the wrapper.
            if body.contains('{') {
                collect_rules(body, rules);
            }
        } else {
            rules.push(StyleRule {
                class_name: simple_class_name(&selector),
                declarations: parse_declarations(body),
                selector,
            });
        }
        rest = &rest[body_start + body_len + 1..];
    }
}

/// Byte length of the body up to the matching close brace, given text that
/// starts just after an open brace.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn parse_declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some((property.to_string(), value.to_string()))
        })
        .collect()
}

/// `.primary-button` yields `primary-button`; compound, pseudo, and non-class
/// selectors yield nothing.
fn simple_class_name(selector: &str) -> Option<String> {
    let name = selector.trim().strip_prefix('.')?;
    if name.is_empty() {
        return None;
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| name.to_string())
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Builds the camel-cased class map the inline strategy splices in.
pub fn class_style_map(rules: &[StyleRule]) -> ClassStyleMap {
    let mut map = ClassStyleMap::new();
    for rule in rules {
        let Some(class_name) = &rule.class_name else {
            continue;
        };
        let entry = map.entry(kebab_to_camel(class_name)).or_default();
        for (property, value) in &rule.declarations {
            entry.insert(kebab_to_camel(property), value.clone());
        }
    }
    map.retain(|_, declarations| !declarations.is_empty());
    map
}

/// `background-color` becomes `backgroundColor`. A leading hyphen marks a
/// vendor prefix and capitalizes the first segment (`-webkit-transform`
/// becomes `WebkitTransform`).
pub fn kebab_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let vendor_prefixed = s.starts_with('-');
    for (i, segment) in s.split('-').filter(|seg| !seg.is_empty()).enumerate() {
        if i == 0 && !vendor_prefixed {
            out.push_str(segment);
        } else {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Renders `const <binding> = { ... };` from a class map, deterministically
/// ordered. Keys that are not valid identifiers are quoted.
pub fn render_style_object(binding: &str, map: &ClassStyleMap) -> String {
    let mut out = format!("const {} = {{\n", binding);
    for (class_name, declarations) in map {
        out.push_str("  ");
        push_key(&mut out, class_name);
        out.push_str(": { ");
        let mut first = true;
        for (property, value) in declarations {
            if !first {
                out.push_str(", ");
            }
            first = false;
            push_key(&mut out, property);
            out.push_str(": \"");
            push_escaped(&mut out, value);
            out.push('"');
        }
        out.push_str(" },\n");
    }
    out.push_str("};");
    out
}

fn push_key(out: &mut String, key: &str) {
    let bare = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if bare {
        out.push_str(key);
    } else {
        out.push('"');
        push_escaped(out, key);
        out.push('"');
    }
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}

/// Escapes stylesheet text for embedding in a JS template literal.
pub fn escape_template(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}
