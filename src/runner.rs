use crate::ast::SyntaxTree;
use crate::error::{Diagnostic, ExecError};
use crate::machine::{Machine, MachineConfig, Outcome};
use crate::parser;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{} syntax error(s)", .0.len())]
    Syntax(Vec<Diagnostic>),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl RunError {
    pub fn report(&self, source: &str, filename: Option<&str>) {
        match self {
            RunError::Syntax(errors) => {
                for error in errors {
                    error.report(source, filename);
                }
            }
            RunError::Exec(error) => error.report(source, filename),
        }
    }
}

/// Options for a one-shot run from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: MachineConfig,
    pub dump_ast: bool,
}

/// Parse `source`, refusing trees that carry errors.
pub fn compile(source: &str) -> Result<SyntaxTree, RunError> {
    let tree = parser::parse(source);
    if tree.has_errors() {
        return Err(RunError::Syntax(tree.errors().to_vec()));
    }
    Ok(tree)
}

/// Run `source` on `machine` in a fresh program environment.
pub fn evaluate_with(machine: &mut Machine, source: &str) -> Result<Outcome, RunError> {
    let tree = compile(source)?;
    Ok(machine.run(&tree)?)
}

/// Run `source` on a default machine.
pub fn evaluate(source: &str) -> Result<Outcome, RunError> {
    evaluate_with(&mut Machine::new(), source)
}

/// Run a script, printing its output as it goes and reporting any failure
/// against the source. Returns whether it succeeded.
pub fn run(source: &str, filename: Option<&str>, options: &RunOptions) -> bool {
    let tree = parser::parse(source);
    if options.dump_ast {
        println!("{}", tree.root());
    }
    if tree.has_errors() {
        tree.report(source, filename);
        return false;
    }

    let mut config = options.config.clone();
    config.echo_output = true;
    let mut machine = Machine::with_config(config);
    match machine.run(&tree) {
        Ok(outcome) => {
            debug!(completion = ?outcome.completion, value = %outcome.value, "script finished");
            true
        }
        Err(error) => {
            error.report(source, filename);
            false
        }
    }
}
