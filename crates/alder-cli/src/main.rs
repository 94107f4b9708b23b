use std::{
    env, fs,
    io::{self, BufRead, Write},
    process::ExitCode,
    time::Instant,
};

use alder::{Session, bootstrap_environment, expand_environment_with_modules, parse_module};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.get(1) {
        Some(path) => compile_file(path),
        None => repl(),
    }
}

/// Compiles a module file into a fresh environment and prints the manifest.
fn compile_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let file = match parse_module(&source) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let environment = match bootstrap_environment() {
        Ok(environment) => environment,
        Err(err) => {
            eprintln!("failed to bootstrap the core modules:\n{err}");
            return ExitCode::FAILURE;
        }
    };
    let start = Instant::now();
    match expand_environment_with_modules(&environment, &[file]) {
        Ok(expansion) => {
            let elapsed = start.elapsed();
            for (name, value) in &expansion.added {
                println!("compiled {name} ({} value units) in {elapsed:?}", value.size_units());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// A line-based REPL over a persistent session.
fn repl() -> ExitCode {
    let mut session = match Session::new() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("failed to bootstrap the core modules:\n{err}");
            return ExitCode::FAILURE;
        }
    };
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        if stdout.flush().is_err() {
            return ExitCode::FAILURE;
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error reading input: {err}");
                return ExitCode::FAILURE;
            }
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match session.submit(line) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("{err}"),
        }
    }
}
