//! Template engine contract and registry
//!
//! A `template "engine[opts]", ctx, source` expression picks an engine by
//! name at compile time, compiles the template body right away and stores the
//! result in the program's template pool. At run time the compiled template
//! is rendered against the evaluated context value.
//!
//! Engines are process-wide. The built-in `plain` engine substitutes
//! `{{ path.to.key }}` placeholders from the context; hosts register richer
//! engines with [`register_engine`].

mod plain;

pub use plain::PlainEngine;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;

use crate::bytecode::Val;

/// Errors raised while compiling or rendering a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template engine '{0}'")]
    UnknownEngine(String),

    #[error("{name}: {message}")]
    Compile { name: String, message: String },

    #[error("{0}")]
    Render(String),
}

/// A compiled template, ready to render
pub trait Template: Send + Sync + fmt::Debug {
    /// Render against a context value
    fn execute(&self, context: &Val) -> Result<String, TemplateError>;
}

/// A named template engine
pub trait TemplateEngine: Send + Sync {
    /// Compile `source`; `name` identifies the template in diagnostics and
    /// `options` carries the `[opts]` of the call site as a map
    fn compile(&self, name: &str, source: &str, options: &Val) -> Result<Arc<dyn Template>, TemplateError>;
}

type Registry = RwLock<HashMap<String, Arc<dyn TemplateEngine>>>;

fn registry() -> &'static Registry {
    static ENGINES: OnceLock<Registry> = OnceLock::new();
    ENGINES.get_or_init(|| {
        let mut engines: HashMap<String, Arc<dyn TemplateEngine>> = HashMap::new();
        engines.insert("plain".to_string(), Arc::new(PlainEngine));
        RwLock::new(engines)
    })
}

/// Register (or replace) a template engine under `name`
pub fn register_engine(name: impl Into<String>, engine: Arc<dyn TemplateEngine>) {
    let name = name.into();
    tracing::debug!(engine = %name, "registered template engine");
    registry().write().insert(name, engine);
}

/// Look up an engine by name
#[must_use]
pub fn engine(name: &str) -> Option<Arc<dyn TemplateEngine>> {
    registry().read().get(name).cloned()
}

/// Split an engine spec `name[opts]` into the name and an options map
///
/// Options are comma separated; `key=value` pairs become string entries and
/// bare keys become `true`.
pub fn parse_engine_spec(spec: &str) -> Result<(String, Val), TemplateError> {
    let spec = spec.trim();
    let Some(open) = spec.find('[') else {
        return Ok((spec.to_string(), Val::empty_map()));
    };
    let Some(inner) = spec[open + 1..].strip_suffix(']') else {
        return Err(TemplateError::Compile {
            name: spec.to_string(),
            message: "unclosed '[' in engine options".to_string(),
        });
    };
    let options = inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), Val::string(v.trim())),
            None => (item.to_string(), Val::Bool(true)),
        });
    Ok((spec[..open].trim().to_string(), Val::map(options)))
}

/// Compile `source` with the engine named by `spec`
pub fn compile(spec: &str, name: &str, source: &str) -> Result<Arc<dyn Template>, TemplateError> {
    let (engine_name, options) = parse_engine_spec(spec)?;
    let engine = engine(&engine_name).ok_or(TemplateError::UnknownEngine(engine_name))?;
    engine.compile(name, source, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Shout(String);

    impl Template for Shout {
        fn execute(&self, _context: &Val) -> Result<String, TemplateError> {
            Ok(self.0.to_uppercase())
        }
    }

    struct ShoutEngine;

    impl TemplateEngine for ShoutEngine {
        fn compile(&self, _name: &str, source: &str, _options: &Val) -> Result<Arc<dyn Template>, TemplateError> {
            Ok(Arc::new(Shout(source.to_string())))
        }
    }

    #[test]
    fn engine_spec_options() {
        let (name, options) = parse_engine_spec("plain[strict, escape=html]").unwrap();
        assert_eq!(name, "plain");
        assert_eq!(options.to_string(), r#"{"escape": "html", "strict": true}"#);
        let (name, options) = parse_engine_spec("plain").unwrap();
        assert_eq!(name, "plain");
        assert!(!options.is_truthy());
        assert!(parse_engine_spec("plain[strict").is_err());
    }

    #[test]
    fn registered_engines_are_found() {
        register_engine("shout", Arc::new(ShoutEngine));
        let template = compile("shout", "t", "hello").unwrap();
        assert_eq!(template.execute(&Val::Null).unwrap(), "HELLO");
        assert_eq!(
            compile("nope", "t", "x").unwrap_err(),
            TemplateError::UnknownEngine("nope".to_string())
        );
    }
}
