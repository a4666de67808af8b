//! The built-in `plain` engine: `{{ path.to.key }}` substitution

use std::sync::Arc;

use super::{Template, TemplateEngine, TemplateError};
use crate::bytecode::Val;

/// Substitutes `{{ dotted.path }}` placeholders from a map context
///
/// Options: `strict` turns a missing path into a render error instead of an
/// empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Path(Vec<String>),
}

#[derive(Debug)]
struct PlainTemplate {
    name: String,
    segments: Vec<Segment>,
    strict: bool,
}

impl TemplateEngine for PlainEngine {
    fn compile(&self, name: &str, source: &str, options: &Val) -> Result<Arc<dyn Template>, TemplateError> {
        let strict = match options {
            Val::Map(m) => m.read().get("strict").is_some_and(Val::is_truthy),
            _ => false,
        };
        Ok(Arc::new(PlainTemplate {
            name: name.to_string(),
            segments: parse(name, source)?,
            strict,
        }))
    }
}

fn parse(name: &str, source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = source;
    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_string()));
        }
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(TemplateError::Compile {
                name: name.to_string(),
                message: "unclosed '{{'".to_string(),
            });
        };
        let path = after[..close].trim();
        if path.is_empty() {
            return Err(TemplateError::Compile {
                name: name.to_string(),
                message: "empty placeholder".to_string(),
            });
        }
        segments.push(Segment::Path(path.split('.').map(|p| p.trim().to_string()).collect()));
        rest = &after[close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

fn lookup(context: &Val, path: &[String]) -> Option<Val> {
    let mut current = context.clone();
    for key in path {
        current = match &current {
            Val::Map(m) => m.read().get(key).cloned()?,
            Val::List(l) => {
                let index: usize = key.parse().ok()?;
                l.read().get(index).cloned()?
            }
            Val::Pair(p) => match key.as_str() {
                "0" | "first" => p.0.clone(),
                "1" | "second" => p.1.clone(),
                _ => return None,
            },
            Val::Usr(u) => u.dot(key).ok()?,
            _ => return None,
        };
    }
    Some(current)
}

impl Template for PlainTemplate {
    fn execute(&self, context: &Val) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Path(path) => match lookup(context, path) {
                    Some(value) => {
                        let text = value
                            .to_display_string()
                            .map_err(|e| TemplateError::Render(e.message()))?;
                        out.push_str(&text);
                    }
                    None if self.strict => {
                        return Err(TemplateError::Render(format!(
                            "{}: missing value for '{}'",
                            self.name,
                            path.join(".")
                        )));
                    }
                    None => {}
                },
            }
        }
        Ok(out)
    }
}
