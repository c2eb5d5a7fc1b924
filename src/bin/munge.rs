//! Command-line interface for munger
//! This binary applies munger programs to text documents.
//!
//! Usage:
//!   munge apply `<program.mg>` [input] [--json]  - Munge a document and print the result
//!   munge check `<program.mg>`                   - Parse a program and report errors

use clap::{Arg, ArgAction, Command};
use munger::munger::parse;
use std::io::Read;

fn main() {
    let matches = Command::new("munge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Apply munger programs to text documents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("apply")
                .about("Munge a document and print the result")
                .arg(
                    Arg::new("program")
                        .help("Path to the munger program")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("input")
                        .help("Path to the input document; stdin when omitted")
                        .index(2),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Wrap the output in a JSON object")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Parse a program and report errors")
                .arg(
                    Arg::new("program")
                        .help("Path to the munger program")
                        .required(true)
                        .index(1),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("apply", apply_matches)) => {
            let program = apply_matches.get_one::<String>("program").unwrap();
            let input = apply_matches.get_one::<String>("input");
            let json = apply_matches.get_flag("json");
            handle_apply_command(program, input.map(String::as_str), json);
        }
        Some(("check", check_matches)) => {
            let program = check_matches.get_one::<String>("program").unwrap();
            handle_check_command(program);
        }
        _ => unreachable!(),
    }
}

/// Handle the apply command
fn handle_apply_command(program_path: &str, input_path: Option<&str>, json: bool) {
    let source = read_file(program_path);
    let program = parse(&source).unwrap_or_else(|e| {
        eprintln!("Parse error in {}: {}", program_path, e);
        std::process::exit(1);
    });

    let input = match input_path {
        Some(path) => read_file(path),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .unwrap_or_else(|e| {
                    eprintln!("Error reading stdin: {}", e);
                    std::process::exit(1);
                });
            buffer
        }
    };

    let output = program.munge(&input).unwrap_or_else(|e| {
        eprintln!("Munge error: {}", e);
        std::process::exit(1);
    });

    if json {
        println!("{}", serde_json::json!({ "output": output }));
    } else {
        print!("{}", output);
    }
}

/// Handle the check command
fn handle_check_command(program_path: &str) {
    let source = read_file(program_path);
    match parse(&source) {
        Ok(_) => println!("{}: ok", program_path),
        Err(e) => {
            eprintln!("Parse error in {}: {}", program_path, e);
            std::process::exit(1);
        }
    }
}

fn read_file(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path, e);
        std::process::exit(1);
    })
}
