use crate::environment::EnvId;
use crate::machine::{Completion, Machine, MachineConfig};
use crate::parser;
use crate::value::Value;
use std::io::{self, Write};
use tracing::warn;

/// Interactive session. Declarations persist between lines because every
/// line runs in the same session environment.
pub fn start(config: MachineConfig) {
    println!("FIN-script {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'quit' or press Ctrl+D to leave");
    println!();

    let mut machine = Machine::with_config(MachineConfig {
        echo_output: true,
        ..config
    });
    let session = match machine.new_session() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("Cannot open a session: {}", err);
            return;
        }
    };

    loop {
        print!("fin> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" {
                    break;
                }
                if !run_line(line, &mut machine, session) {
                    break;
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }

    if let Err(err) = machine.end_session(session) {
        warn!(%err, "session teardown failed");
    }
}

/// Returns false once the script has called `exit`.
fn run_line(source: &str, machine: &mut Machine, session: EnvId) -> bool {
    let tree = parser::parse(source);
    if tree.has_errors() {
        tree.report(source, None);
        return true;
    }

    match machine.run_in(&tree, session) {
        Ok(outcome) => {
            if outcome.value != Value::Null {
                println!("{}", outcome.value);
            }
            outcome.completion != Completion::Exited
        }
        Err(error) => {
            error.report(source, None);
            true
        }
    }
}
