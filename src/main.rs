extern crate clap;
extern crate thiserror;

pub mod bytecode;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    process::ExitCode,
    time::Instant,
};

use clap::{Parser, ValueEnum};
use colored::Colorize;
use stackvm::program;
use thiserror::Error;

use crate::{
    bytecode::{encoding, encoding::DecodeError, Program, ProgramError},
    interpreter::{ExecutionFlags, Executor, ExecutorConfig, VmError, DEFAULT_STACK_CAPACITY},
    lexer::{lexer::Lexer, LexerError, Token},
    parser::ParseError,
};

/// Stack based bytecode virtual machine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text assembly or an encoded program, runs the fibonacci demo if left out
    #[arg(short, long)]
    file: Option<String>,

    /// What to do with the program (defaults to `run`)
    #[arg(value_enum)]
    commands: Vec<Commands>,

    #[arg(long, default_value_t = DEFAULT_STACK_CAPACITY)]
    stack_capacity: usize,

    #[arg(long, default_value_t = bytecode::DEFAULT_PROGRAM_CAPACITY)]
    program_capacity: usize,

    /// Give up after this many executed instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Print every instruction as it executes
    #[arg(short, long)]
    trace: bool,

    /// Dump the stack once the program stops
    #[arg(short, long)]
    dump_stack: bool,

    /// Write the encoded program to this path
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Hash, PartialEq, Eq)]
enum Commands {
    /// Output the lexer tokens
    Tokens,
    /// Output the program as assembly
    Program,
    /// Output the encoded program as hex
    Bytecode,
    /// Run the program
    Run,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Couldn't read `{path}`: {source}")]
    Read { path: String, source: io::Error },

    #[error("Couldn't write `{path}`: {source}")]
    Write { path: String, source: io::Error },

    #[error("`{0}` is neither an encoded program nor utf-8 text")]
    NotText(String),

    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Vm(#[from] VmError),
}

const FIBONACCI_SOURCE: &str = include_str!("../demos/fibonacci.svm");

/// The program the machine shipped with, keeps printing fibonacci numbers until one is above 100
fn fibonacci() -> Result<Program, ProgramError> {
    program! {
        push 0;
        push 1;
        next:
        dup 1;
        dup 1;
        iadd;
        dup 0;
        print_int;
        dup 0;
        push 100;
        igt;
        jnz done;
        jmp next;
        done:
        halt;
    }
}

fn load(path: &str, args: &Args, commands: &HashSet<Commands>) -> Result<Program, CliError> {
    let bytes = fs::read(path).map_err(|source| CliError::Read {
        path: path.to_string(),
        source,
    })?;

    if encoding::is_encoded(&bytes) {
        println!("{}", "Starting decoding".blue());
        let now = Instant::now();
        let program = encoding::decode(&bytes, args.program_capacity)?;
        println!("{} {:.2?}", "Finished decoding in".green(), now.elapsed());
        return Ok(program);
    }

    let text = String::from_utf8(bytes).map_err(|_| CliError::NotText(path.to_string()))?;

    println!("{}", "Starting lexing".blue());
    let mut now = Instant::now();
    let tokens = Lexer::new(&text).collect_results()?;
    println!("{} {:.2?}", "Finished lexing in".green(), now.elapsed());

    if commands.contains(&Commands::Tokens) {
        print_tokens(&tokens);
    }

    println!("{}", "Starting assembling".blue());
    now = Instant::now();
    let program = parser::parser::Parser::new(&tokens, args.program_capacity).parse_program()?;
    println!(
        "{} {} instructions in {:.2?}",
        "Finished assembling".green(),
        program.len(),
        now.elapsed()
    );

    Ok(program)
}

fn print_tokens(tokens: &[Token]) {
    for token in tokens.iter() {
        println!("{}:{}\t{:?}", token.line, token.col, token.kind);
    }
}

fn print_hex(bytes: &[u8]) {
    for line in bytes.chunks(16) {
        let hex: Vec<String> = line.iter().map(|byte| format!("{:02x}", byte)).collect();
        println!("{}", hex.join(" "));
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let mut commands: HashSet<Commands> = HashSet::from_iter(args.commands.iter().cloned());
    if commands.is_empty() {
        commands.insert(Commands::Run);
    }

    let program = match &args.file {
        Some(path) => {
            println!("Loading {}", path);
            load(path, &args, &commands)?
        }
        None => {
            println!("{}", "No file given, using the fibonacci demo".yellow());
            if commands.contains(&Commands::Tokens) {
                print_tokens(&Lexer::new(FIBONACCI_SOURCE).collect_results()?);
            }
            fibonacci()?
        }
    };

    if commands.contains(&Commands::Program) {
        print!("{}", program);
    }

    if commands.contains(&Commands::Bytecode) || args.output.is_some() {
        let bytes = encoding::encode(&program);
        if commands.contains(&Commands::Bytecode) {
            print_hex(&bytes);
        }
        if let Some(path) = &args.output {
            fs::write(path, &bytes).map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
            println!("{} {}", "Wrote encoded program to".green(), path);
        }
    }

    if commands.contains(&Commands::Run) {
        let mut flags = ExecutionFlags::empty();
        flags.set(ExecutionFlags::TRACE, args.trace);
        flags.set(ExecutionFlags::DUMP_ON_EXIT, args.dump_stack);
        let config = ExecutorConfig {
            stack_capacity: args.stack_capacity,
            max_steps: args.max_steps,
            flags,
        };

        println!("{}", "Starting execution".blue());
        let now = Instant::now();
        let mut executor = Executor::with_config(program, config, io::stdout().lock());
        let outcome = executor.run();
        executor.into_output().flush().map_err(VmError::from)?;
        outcome?;
        println!("{} {:.2?}", "Halted in".green(), now.elapsed());
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{0:}: {1:}", "Error".red(), err);
            ExitCode::FAILURE
        }
    }
}
