//! Command-line host: serves variables and prints what scripts emit
//!
//! Actions print as `name => value`. Config events print as an indented
//! outline of the sections, properties and commands the config block walked
//! through, annotations first.

use std::collections::HashMap;

use parking_lot::Mutex;
use plume_core::{Evaluator, Host, RuntimeErrorKind, RuntimeResult, Val};

pub struct CliHost {
    vars: Mutex<HashMap<String, Val>>,
    lines: Mutex<Vec<String>>,
    depth: Mutex<usize>,
    echo: bool,
}

impl CliHost {
    /// A host that prints every emitted line to stdout as it happens
    pub fn new() -> Self {
        Self::with_echo(true)
    }

    /// A host that only records emitted lines
    pub fn quiet() -> Self {
        Self::with_echo(false)
    }

    fn with_echo(echo: bool) -> Self {
        Self {
            vars: Mutex::new(HashMap::new()),
            lines: Mutex::new(Vec::new()),
            depth: Mutex::new(0),
            echo,
        }
    }

    pub fn set_var(&self, name: impl Into<String>, value: Val) {
        self.vars.lock().insert(name.into(), value);
    }

    /// Every line emitted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    #[allow(clippy::print_stdout)]
    fn emit(&self, line: String) {
        if self.echo {
            println!("{line}");
        }
        self.lines.lock().push(line);
    }

    fn indent(&self) -> String {
        "    ".repeat(*self.depth.lock())
    }
}

impl Default for CliHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Strings quoted, everything else in its display form
pub fn render(value: &Val) -> String {
    match value {
        Val::Str(s) => format!("{:?}", &**s),
        other => other.to_string(),
    }
}

fn render_attrs(attrs: &Val) -> String {
    let Val::Map(map) = attrs else {
        return String::new();
    };
    map.read()
        .iter()
        .map(|(name, value)| match value {
            Val::Bool(true) => format!("@{name} "),
            other => format!("@{name}({}) ", render(other)),
        })
        .collect()
}

impl Host for CliHost {
    fn load_var(&self, _: &mut Evaluator, name: &str) -> RuntimeResult<Val> {
        self.vars
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()).into())
    }

    fn store_var(&self, _: &mut Evaluator, name: &str, value: Val) -> RuntimeResult<()> {
        self.set_var(name, value);
        Ok(())
    }

    fn action(&self, _: &mut Evaluator, name: &str, value: Val) -> RuntimeResult<()> {
        self.emit(format!("{name} => {}", render(&value)));
        Ok(())
    }

    fn call(&self, _: &mut Evaluator, name: &str, args: &[Val]) -> RuntimeResult<Val> {
        match name {
            "log" => {
                let message = args
                    .iter()
                    .map(Val::to_display_string)
                    .collect::<RuntimeResult<Vec<_>>>()?
                    .join(" ");
                tracing::info!(target: "plume::script", "{message}");
                Ok(Val::Null)
            }
            other => Err(RuntimeErrorKind::UndefinedFunction(other.to_string()).into()),
        }
    }

    fn push_config(&self, _: &mut Evaluator, name: &str, label: Val, attrs: Val) -> RuntimeResult<()> {
        let header = match label {
            Val::Null => format!("{}{}{name} {{", self.indent(), render_attrs(&attrs)),
            label => format!("{}{}{name} {} {{", self.indent(), render_attrs(&attrs), render(&label)),
        };
        self.emit(header);
        *self.depth.lock() += 1;
        Ok(())
    }

    fn pop_config(&self, _: &mut Evaluator) -> RuntimeResult<()> {
        {
            let mut depth = self.depth.lock();
            *depth = depth.saturating_sub(1);
        }
        self.emit(format!("{}}}", self.indent()));
        Ok(())
    }

    fn config_property(&self, _: &mut Evaluator, key: &str, value: Val, attrs: Val) -> RuntimeResult<()> {
        self.emit(format!(
            "{}{}{key} => {};",
            self.indent(),
            render_attrs(&attrs),
            render(&value)
        ));
        Ok(())
    }

    fn config_command(&self, _: &mut Evaluator, key: &str, args: &[Val], attrs: Val) -> RuntimeResult<Val> {
        let args: Vec<String> = args.iter().map(render).collect();
        self.emit(format!(
            "{}{}{key}({});",
            self.indent(),
            render_attrs(&attrs),
            args.join(", ")
        ));
        Ok(Val::Null)
    }
}
