//! CLI entry point: run a script, evaluate a string, or start a REPL.
//!
//! Exit code 0 on success; 1 on an uncaught error (reported with its
//! kind, message, and best-effort source line).

use mjulia::values::display_value;
use mjulia::Session;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => repl(),
        [flag] if flag == "--help" || flag == "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        [flag, expr] if flag == "-e" => eval_one(expr),
        [path] => run_file(path),
        _ => {
            print_usage();
            ExitCode::from(2)
        }
    }
}

fn print_usage() {
    println!("usage: mjulia [script.jl | -e 'expression']");
    println!("  with no arguments, starts an interactive session");
}

fn new_session() -> Result<Session, ExitCode> {
    Session::new().map_err(|e| {
        eprintln!("error during startup: {}", e);
        ExitCode::FAILURE
    })
}

fn eval_one(expr: &str) -> ExitCode {
    let mut session = match new_session() {
        Ok(s) => s,
        Err(code) => return code,
    };
    match session.eval(expr) {
        Ok(value) => {
            if !matches!(value, mjulia::Value::Nothing) {
                println!("{}", display_value(&value));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", e.error.kind(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let mut session = match new_session() {
        Ok(s) => s,
        Err(code) => return code,
    };
    match session.run_file(path) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", e.error.kind(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "repl")]
fn repl() -> ExitCode {
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    let mut session = match new_session() {
        Ok(s) => s,
        Err(code) => return code,
    };
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("failed to start line editor: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("mjulia {} — :quit to exit", env!("CARGO_PKG_VERSION"));
    loop {
        match editor.readline("julia> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":quit" || line == "exit()" {
                    return ExitCode::SUCCESS;
                }
                let _ = editor.add_history_entry(line);
                match session.eval(line) {
                    Ok(value) => {
                        if !matches!(value, mjulia::Value::Nothing) {
                            println!("{}", display_value(&value));
                        }
                    }
                    Err(e) => eprintln!("ERROR: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("readline error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
}

#[cfg(not(feature = "repl"))]
fn repl() -> ExitCode {
    use std::io::{BufRead, Write};

    let mut session = match new_session() {
        Ok(s) => s,
        Err(code) => return code,
    };
    println!(
        "mjulia {} (line mode; build with --features repl for history)",
        env!("CARGO_PKG_VERSION")
    );
    let stdin = std::io::stdin();
    loop {
        print!("julia> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":quit" || line == "exit()" {
                    return ExitCode::SUCCESS;
                }
                match session.eval(line) {
                    Ok(value) => {
                        if !matches!(value, mjulia::Value::Nothing) {
                            println!("{}", display_value(&value));
                        }
                    }
                    Err(e) => eprintln!("ERROR: {}", e),
                }
            }
            Err(e) => {
                eprintln!("read error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
}
