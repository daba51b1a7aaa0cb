// File: src/repl.rs
//
// Interactive prompt: reads one line at a time and feeds it straight to the
// VM, matching the reference implementation's `repl()` in `main.c` (a
// `fgets`-per-line loop with no multi-line accumulation, no bracket
// balancing, and no special commands). `rustyline` replaces raw `fgets` for
// line editing and history, the way the teacher crate already used it.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::errors::NahError;
use crate::vm::Vm;

pub struct Repl {
    vm: Vm,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, NahError> {
        let editor = DefaultEditor::new().map_err(|err| NahError::Readline(err.to_string()))?;
        Ok(Repl { vm: Vm::with_std_natives(), editor })
    }

    /// Runs until EOF (Ctrl+D) or an interrupt (Ctrl+C). Each line is
    /// compiled and executed independently; a compile or runtime error on
    /// one line does not end the session, matching the reference REPL.
    pub fn run(&mut self) -> Result<(), NahError> {
        loop {
            match self.editor.readline("> ") {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());
                    self.vm.interpret(&line);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(NahError::Readline(err.to_string())),
            }
        }
        Ok(())
    }
}
