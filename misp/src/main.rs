use std::{fs, io};
use std::io::{BufRead, Write};

use mimalloc::MiMalloc;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use misp_sys::{repl, reporting};
use misp_sys::parser;
use misp_sys::repl::Reader;
use misp_sys::vm::{opcode, VirtualMachine};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;


fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut options: Options = match parse_args(args) {
        Some(options) => options,
        None => return
    };
    let result = match options.file.take() {
        Some(name) => run_main(name, options),
        None => run_repl()
    };
    match result {
        Ok(()) => {},
        Err(e) => eprintln!("{}", e)
    }
}

fn run_main(name: String, options: Options) -> Result<(), String> {
    let text: String = match fs::read_to_string(&name) {
        Ok(text) => text,
        Err(_) => {
            eprintln!("Cannot find file {}", name);
            std::process::exit(-1);
        }
    };
    let image = parser::parse(&text)
        .map_err(|errors| errors.iter().map(reporting::format_parse_error).collect::<Vec<String>>().join("\n"))?;

    let mut vm = VirtualMachine::new(image, io::stdout());
    if options.debug {
        run_debug(&mut vm)
    } else {
        vm.run_until_completion();
        report_exit(&mut vm);
        Ok(())
    }
}

/// Single-step mode: dump the current frame, wait for a line of input, clear
/// the screen, step, and dump again, until the machine halts.
fn run_debug<W : Write>(vm: &mut VirtualMachine<W>) -> Result<(), String> {
    let stdin = io::stdin();
    let mut buffer: String = String::new();
    vm.dump_frame();
    while !vm.is_halted() {
        buffer.clear();
        let read: usize = stdin.lock().read_line(&mut buffer).map_err(|e| format!("{}", e))?;
        if read == 0 {
            break // stdin was closed, stop stepping
        }
        vm.print(String::from("\x1B[2J\x1B[1;1H"));
        vm.step();
        vm.dump_frame();
    }
    report_exit(vm);
    Ok(())
}

fn report_exit<W : Write>(vm: &mut VirtualMachine<W>) {
    if let Some(panic) = vm.panic() {
        vm.println(format!("PANIC: {}", panic.kind.code()));
        vm.dump_frame();
    }
}

fn run_repl() -> Result<(), String> {
    println!("Welcome to MISP! (exit with Ctrl-C)");
    repl::run(EditorRepl { editor: DefaultEditor::new().unwrap() }, io::stdout())
}

struct EditorRepl {
    editor: DefaultEditor
}

impl Reader for EditorRepl {
    fn read(&mut self, prompt: &'static str) -> Option<Result<String, String>> {
        io::stdout().flush().unwrap();
        match self.editor.readline(prompt) {
            Ok(line) => {
                self.editor.add_history_entry(line.as_str()).unwrap();
                Some(Ok(line))
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(e) => Some(Err(format!("Error: {}", e))),
        }
    }
}


fn parse_args(args: Vec<String>) -> Option<Options> {
    let mut iter = args.into_iter();
    let mut options: Options = Options {
        file: None,
        debug: false,
    };

    if iter.next().is_none() {
        panic!("Unexpected first argument");
    }

    for arg in iter.by_ref() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return None;
            },
            "-v" | "--version" => {
                print_version();
                return None;
            },
            "-d" | "--debug" => options.debug = true,
            a => {
                options.file = Some(String::from(a));
                break
            },
        }
    }

    Some(options)
}

fn print_version() {
    println!("MISP {}", env!("CARGO_PKG_VERSION"));
    println!("Copyright (C) 2023");
    println!("License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>");
    println!("This is free software: you are free to change and redistribute it.");
    println!("There is NO WARRANTY, to the extent permitted by law.");
}

fn print_help() {
    println!("misp [options] <file>");
    println!("When invoked with no arguments, this will open a REPL for the MISP language (exit with Ctrl-C)");
    println!("Options:");
    println!("  -h --help    : Show this message and then exit.");
    println!("  -v --version : Print version and license information and then exit.");
    println!("  -d --debug   : Single-step through evaluation, dumping the current frame between steps.");
    println!("Keywords:");
    println!("  {}", opcode::keywords().keys().copied().collect::<Vec<&str>>().join(" "));
}

struct Options {
    file: Option<String>,
    debug: bool,
}
