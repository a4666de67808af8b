//! REPL (Read-Eval-Print Loop) for Plume
//!
//! Each input is compiled as the body of a rule, after the module loaded with
//! `:load` (if any), and run through the global and session phases first.
//! `let` lines are kept and replayed ahead of later inputs, so bindings
//! persist across inputs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use plume_core::{compile_module_named, Evaluator, Val};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};

use crate::host::{render, CliHost};

/// REPL prompt shown at the start of each line
const PROMPT: &str = ">>> ";
/// Continuation prompt for multi-line input
const CONTINUATION_PROMPT: &str = "... ";
/// History file name
const HISTORY_FILE: &str = ".plume_history";
/// Event name the input rule answers to
const REPL_EVENT: &str = "__repl__";

/// Result of processing a REPL command
enum CommandResult {
    /// Continue the REPL loop
    Continue,
    /// Exit the REPL
    Exit,
    /// Input was handled as a command
    Handled,
}

/// Session state independent of the line editor
#[derive(Default)]
pub struct Session {
    /// Source of the module loaded with `:load`
    prelude: String,
    /// `let` statements replayed ahead of each input
    bindings: Vec<String>,
    host: Arc<CliHost>,
}

impl Session {
    pub fn new(host: Arc<CliHost>) -> Self {
        Self {
            prelude: String::new(),
            bindings: Vec::new(),
            host,
        }
    }

    /// Load a module whose functions and blocks later inputs can use
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file '{}': {e}", path.display()))?;
        compile_module_named(&path.display().to_string(), &source)
            .map_err(|e| anyhow::anyhow!("{}:{e}", path.display()))?;
        self.prelude = source;
        Ok(())
    }

    /// Forget bindings and the loaded module
    pub fn reset(&mut self) {
        self.prelude.clear();
        self.bindings.clear();
    }

    /// Evaluate one input
    pub fn eval(&mut self, input: &str) -> Result<Val, String> {
        let input = input.trim();
        let is_binding = input.starts_with("let ");
        let statement = if is_binding && !input.ends_with(';') {
            format!("{input};")
        } else {
            input.to_string()
        };
        let mut body = self.bindings.join("\n");
        body.push('\n');
        body.push_str(&statement);
        if is_binding {
            body.push_str("\nnull");
        }

        let source = format!("{}\n{REPL_EVENT} {{\n{body}\n}}\n", self.prelude);
        let module = compile_module_named("<repl>", &source).map_err(|e| format!("Compile error: {e}"))?;
        let mut eval = Evaluator::new(Arc::new(module)).with_host(self.host.clone());
        eval.eval_global().map_err(|e| format!("Runtime error: {e}"))?;
        eval.eval_session().map_err(|e| format!("Runtime error: {e}"))?;
        let value = eval
            .eval(REPL_EVENT)
            .map_err(|e| format!("Runtime error: {e}"))?
            .unwrap_or(Val::Null);

        if is_binding {
            self.bindings.push(statement);
        }
        Ok(value)
    }
}

/// The Plume REPL
pub struct Repl {
    session: Session,
    editor: Editor<(), DefaultHistory>,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(host: Arc<CliHost>) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;

        if let Some(home) = home_dir() {
            let _ = editor.load_history(&home.join(HISTORY_FILE));
        }

        Ok(Self {
            session: Session::new(host),
            editor,
        })
    }

    /// Load a module before the first prompt
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.session.load(path)
    }

    /// Run the REPL loop
    #[allow(clippy::print_stdout, clippy::print_stderr)]
    pub fn run(&mut self) -> Result<()> {
        println!("Plume v{}", plume_core::VERSION);
        println!("Type :help for help, :quit to exit");
        println!();

        loop {
            match self.read_input() {
                Ok(Some(input)) => {
                    match self.handle_command(&input) {
                        CommandResult::Exit => break,
                        CommandResult::Handled => continue,
                        CommandResult::Continue => {}
                    }
                    match self.session.eval(&input) {
                        Ok(Val::Null) => {}
                        Ok(value) => println!("{}", render(&value)),
                        Err(err) => eprintln!("{err}"),
                    }
                }
                Ok(None) => continue,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error reading input: {err}");
                    break;
                }
            }
        }

        if let Some(home) = home_dir() {
            let _ = self.editor.save_history(&home.join(HISTORY_FILE));
        }

        Ok(())
    }

    /// Read input from the user, handling multi-line input
    fn read_input(&mut self) -> Result<Option<String>, ReadlineError> {
        let mut input = String::new();
        let mut prompt = PROMPT;

        loop {
            let line = self.editor.readline(prompt)?;

            if input.is_empty() && line.trim().is_empty() {
                return Ok(None);
            }

            if !input.is_empty() {
                input.push('\n');
            }
            input.push_str(&line);

            if is_complete(&input) {
                let _ = self.editor.add_history_entry(&input);
                return Ok(Some(input));
            }

            prompt = CONTINUATION_PROMPT;
        }
    }

    /// Handle REPL commands (starting with :)
    #[allow(clippy::print_stdout, clippy::print_stderr)]
    fn handle_command(&mut self, input: &str) -> CommandResult {
        let trimmed = input.trim();

        let Some(cmd) = trimmed.strip_prefix(':') else {
            return CommandResult::Continue;
        };
        let (cmd_name, args) = cmd.trim().split_once(' ').unwrap_or((cmd.trim(), ""));

        match cmd_name.to_lowercase().as_str() {
            "quit" | "q" | "exit" => CommandResult::Exit,

            "help" | "h" | "?" => {
                print_help();
                CommandResult::Handled
            }

            "load" | "l" => {
                if args.is_empty() {
                    println!("Usage: :load <file>");
                } else if let Err(err) = self.session.load(Path::new(args.trim())) {
                    eprintln!("{err}");
                }
                CommandResult::Handled
            }

            "reset" => {
                self.session.reset();
                println!("Bindings and loaded module cleared");
                CommandResult::Handled
            }

            _ => {
                println!("Unknown command: :{cmd_name}");
                println!("Type :help for available commands");
                CommandResult::Handled
            }
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Whether brackets are balanced outside strings and comments
fn is_complete(input: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            match c {
                '\\' if q != '`' => {
                    chars.next();
                }
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '#' => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }

    quote.is_none() && depth <= 0
}

#[allow(clippy::print_stdout)]
fn print_help() {
    println!(
        r#"
Plume REPL Commands:
  :help, :h, :?    Show this help message
  :quit, :q        Exit the REPL
  :load <file>     Load a module; its functions and blocks become visible
  :reset           Forget bindings and the loaded module

Tips:
  - Inputs are rule bodies: statements, then an optional trailing expression
  - `let` bindings persist across inputs
  - Actions print as `name => value`
  - Press Ctrl+D to exit

Examples:
  >>> 1 + 2 * 3
  7
  >>> let xs = [3, 1, 2]
  >>> xs.len()
  3
"#
    );
}
