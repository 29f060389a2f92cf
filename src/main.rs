use clap::{value_parser, Arg, ArgAction, Command};
use finscript::{init_tracing, repl, runner, MachineConfig};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    init_tracing();

    let matches = Command::new("fin")
        .about("Interpreter for the FIN-script embedded scripting language")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("Maximum nesting of function calls")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("dump-ast")
                .long("dump-ast")
                .help("Print the syntax tree before running")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = MachineConfig::default();
    if let Some(depth) = matches.get_one::<usize>("max-depth") {
        config.max_call_depth = *depth;
    }

    match matches.get_one::<String>("file") {
        Some(file_path) if !matches.get_flag("interactive") => {
            let options = runner::RunOptions {
                config,
                dump_ast: matches.get_flag("dump-ast"),
            };
            run_file(file_path, &options)
        }
        _ => {
            repl::start(config);
            ExitCode::SUCCESS
        }
    }
}

fn run_file(path: &str, options: &runner::RunOptions) -> ExitCode {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        return ExitCode::FAILURE;
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let filename = path.to_string_lossy();
            if runner::run(&source, Some(&filename), options) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}
