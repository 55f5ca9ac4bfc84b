use std::io::Write;

use crate::{parser, reporting};
use crate::vm::{ExitType, VirtualMachine};


/// A source of input lines for the read-eval-print loop. `None` ends the
/// session; `Some(Err(..))` aborts it with an error message.
pub trait Reader {
    fn read(&mut self, prompt: &'static str) -> Option<Result<String, String>>;
}

/// Runs the read-eval-print loop until the reader is exhausted. Each line is
/// parsed and evaluated as one complete program against a fresh arena; the
/// top-level result is printed in the debug format, and panics print their
/// code followed by the frame dump.
pub fn run<R, W>(mut reader: R, mut writer: W) -> Result<(), String> where
    R : Reader,
    W : Write {

    loop {
        let line: String = match reader.read(">>> ") {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        };
        if line.trim().is_empty() {
            continue
        }
        match parser::parse(&line) {
            Err(errors) => {
                for error in &errors {
                    writeln!(writer, "{}", reporting::format_parse_error(error)).unwrap();
                }
            },
            Ok(image) => {
                let mut vm = VirtualMachine::new(image, &mut writer);
                match vm.run_until_completion() {
                    ExitType::Halt => {
                        if let Some(result) = vm.result() {
                            let text: String = vm.render(result);
                            vm.println(text);
                        }
                    },
                    ExitType::Panic(panic) => {
                        vm.println(reporting::format_panic(&panic));
                        vm.dump_frame();
                    },
                }
            },
        }
    }
}
