// FIN-script interpreter library
//
// Scanner, syntax-tree builder and tree-walking execution machine for the
// FIN-script embedded scripting language.

pub mod ast;
pub mod builtins;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod flow;
pub mod function;
pub mod lexer;
pub mod machine;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod stack;
pub mod value;
pub mod variable;

// Re-export commonly used items
pub use ast::{AstNode, NodeKind, SyntaxTree};
pub use environment::{EnvId, Environments, FigureHandle};
pub use error::{Diagnostic, ErrorKind, ExecError, ExecResult, Span};
pub use flow::{FlowControl, FlowKind};
pub use function::Function;
pub use lexer::{Keyword, OperatorKind, Scanner, Token, TokenKind};
pub use machine::{Completion, Machine, MachineConfig, Outcome};
pub use parser::{parse, Parser};
pub use value::{Image, Value};
pub use variable::{Heap, VarId, VarType};

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::{evaluate, run, RunError, RunOptions};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=finscript=debug` or
/// `RUST_LOG=finscript=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    });
}
