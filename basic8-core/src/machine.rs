//! The integrated machine.
//!
//! `Machine` wires the memory image, symbol table, program store, screen,
//! token executor and an optionally mounted disk image together behind the
//! operations a front end needs: feed it input lines, run the stored
//! program, list it, and move programs to and from the floppy.
//!
//! Everything is synchronous and single-owner: each operation runs to
//! completion before the caller gets control back, and nothing here may be
//! re-entered while another operation is in flight.

use crate::console::Console;
use crate::disk::{normalize_8_3, DiskImage};
use crate::error::{Basic8Error, Basic8Result};
use crate::exec::{Executed, Executor, Flow, NullParser, StatementParser};
use crate::memory::MemoryImage;
use crate::program::ProgramStore;
use crate::screen::Screen;
use crate::symbols::{SymbolEntry, SymbolTable};
use crate::tokens::{detokenize, normalize_statement, tokenize};

/// ROM presence marker installed in the hardware region at power-on.
const ROM_SIGNATURE: &[u8] = b"BASIC8";
const ROM_SIGNATURE_ADDR: u16 = 0xFFF0;
const ROM_VERSION_ADDR: u16 = 0xFFF6;
const ROM_VERSION: u8 = 0x10;
/// Reset vector, pointing at the ROM entry the way the real board would.
const RESET_VECTOR_ADDR: u16 = 0xFFFC;
const ROM_ENTRY: u16 = 0xF000;

/// An 8-bit home computer: 64K of memory, a tokenized BASIC and a floppy
/// drive.
pub struct Machine<C: Console, P: StatementParser = NullParser> {
    mem: MemoryImage,
    console: C,
    parser: P,
    disk: Option<DiskImage>,
}

impl<C: Console> Machine<C, NullParser> {
    /// A machine with no fallback parser: statements outside the fast path
    /// report syntax errors.
    pub fn new(console: C) -> Self {
        Self::with_parser(console, NullParser)
    }
}

impl<C: Console, P: StatementParser> Machine<C, P> {
    pub fn with_parser(console: C, parser: P) -> Self {
        let mut machine = Self {
            mem: MemoryImage::new(),
            console,
            parser,
            disk: None,
        };
        machine.init_memory();
        machine
    }

    /// Install the power-on memory state: empty symbol table and program,
    /// blank screen, ROM marker and reset vector.
    fn init_memory(&mut self) {
        SymbolTable::new(&mut self.mem).reset();
        ProgramStore::new(&mut self.mem).clear();
        Screen::new(&mut self.mem).clear();
        for (i, &b) in ROM_SIGNATURE.iter().enumerate() {
            self.mem.write_byte(ROM_SIGNATURE_ADDR + i as u16, b);
        }
        self.mem.write_byte(ROM_VERSION_ADDR, ROM_VERSION);
        self.mem
            .write_word16(RESET_VECTOR_ADDR, ROM_ENTRY)
            .expect("vector word in range");
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Read access to the memory image (DUMP and friends).
    pub fn memory(&self) -> &MemoryImage {
        &self.mem
    }

    /// Attach a disk image to the drive.
    pub fn mount(&mut self, disk: DiskImage) {
        self.disk = Some(disk);
    }

    pub fn disk(&self) -> Option<&DiskImage> {
        self.disk.as_ref()
    }

    pub fn disk_mut(&mut self) -> Option<&mut DiskImage> {
        self.disk.as_mut()
    }

    /// Feed one line of user input to the machine.
    ///
    /// A leading line number stores (or, with an empty body, deletes) a
    /// program line; anything else executes immediately. Immediate `GOTO`
    /// starts the stored program at the target line.
    pub fn submit_line(&mut self, input: &str) -> Basic8Result<()> {
        if input.trim().is_empty() {
            return Ok(());
        }
        match split_line_number(input) {
            Some((digits, rest)) => {
                let line_no: u16 = digits.parse().map_err(|_| {
                    Basic8Error::SyntaxError(format!("bad line number: {digits}"))
                })?;
                if rest.trim().is_empty() {
                    // A bare number deletes the line; deleting a line that
                    // was never stored is not an error at the prompt.
                    match ProgramStore::new(&mut self.mem).delete(line_no) {
                        Ok(()) | Err(Basic8Error::NoSuchLine(_)) => Ok(()),
                        Err(e) => Err(e),
                    }
                } else {
                    let tokens = tokenize(&normalize_statement(rest));
                    ProgramStore::new(&mut self.mem).insert_or_replace(line_no, &tokens)
                }
            }
            None => {
                match self.execute_tokens(&tokenize(input))? {
                    Flow::Jump(target) => self.run_from(target),
                    Flow::Continue | Flow::Halt => Ok(()),
                }
            }
        }
    }

    /// RUN the stored program from its first line.
    pub fn run(&mut self) -> Basic8Result<()> {
        let first = ProgramStore::new(&mut self.mem).first_line_addr();
        self.run_chain(first)
    }

    fn run_from(&mut self, line_no: u16) -> Basic8Result<()> {
        let addr = ProgramStore::new(&mut self.mem)
            .find(line_no)
            .ok_or(Basic8Error::NoSuchLine(line_no))?;
        self.run_chain(Some(addr))
    }

    /// Execute records by following the chain pointers until the program
    /// ends, halts or fails. Errors abort the run and leave all state from
    /// completed statements in place.
    fn run_chain(&mut self, mut cur: Option<u16>) -> Basic8Result<()> {
        while let Some(addr) = cur {
            let (line_no, tokens, next) = {
                let prog = ProgramStore::new(&mut self.mem);
                (prog.line_of(addr), prog.tokens_at(addr).to_vec(), prog.next_of(addr))
            };
            let flow = self.execute_tokens(&tokens).map_err(|e| at_line(line_no, e))?;
            cur = match flow {
                Flow::Continue => (next != 0).then_some(next),
                Flow::Jump(target) => Some(
                    ProgramStore::new(&mut self.mem)
                        .find(target)
                        .ok_or_else(|| at_line(line_no, Basic8Error::NoSuchLine(target)))?,
                ),
                Flow::Halt => None,
            };
        }
        Ok(())
    }

    /// Push one line of tokens through the executor, handing anything it
    /// rejects to the fallback parser. Output reaches the screen only
    /// after the statement has fully succeeded.
    fn execute_tokens(&mut self, tokens: &[u8]) -> Basic8Result<Flow> {
        let mut out = String::new();
        match Executor::new(&mut self.mem).execute_line(tokens, &mut out)? {
            Executed::Done(flow) => {
                self.emit(&out);
                Ok(flow)
            }
            Executed::Fallback(text) => {
                log::debug!("fast path declined, falling back: {text}");
                if let Some(msg) = self.parser.execute_statement(&text)? {
                    self.emit(&msg);
                    if !msg.ends_with('\n') {
                        self.emit("\n");
                    }
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// Write interpreter output through screen memory and echo it to the
    /// console.
    fn emit(&mut self, text: &str) {
        Screen::new(&mut self.mem).put_str(text);
        self.console.write_str(text);
    }

    /// Detokenized program listing in line order.
    pub fn list(&mut self) -> Vec<(u16, String)> {
        ProgramStore::new(&mut self.mem)
            .iter()
            .map(|(n, t)| (n, detokenize(t)))
            .collect()
    }

    /// NEW: drop the program and every variable.
    pub fn new_program(&mut self) {
        ProgramStore::new(&mut self.mem).clear();
        SymbolTable::new(&mut self.mem).reset();
    }

    /// Clear screen memory and home the cursor.
    pub fn cls(&mut self) {
        Screen::new(&mut self.mem).clear();
    }

    /// Current variables with their 16-bit values, in allocation order.
    pub fn variables(&mut self) -> Vec<(String, i16)> {
        let entries = SymbolTable::new(&mut self.mem).entries();
        entries
            .into_iter()
            .map(|e| {
                let value = self.mem.read_word16(e.addr).unwrap_or(0) as i16;
                (e.name, value)
            })
            .collect()
    }

    /// Raw symbol table entries (SYMBOLS report).
    pub fn symbols(&mut self) -> Vec<SymbolEntry> {
        SymbolTable::new(&mut self.mem).entries()
    }

    pub fn program_bytes_used(&mut self) -> u16 {
        ProgramStore::new(&mut self.mem).bytes_used()
    }

    pub fn variable_bytes_used(&mut self) -> u16 {
        SymbolTable::new(&mut self.mem).bytes_used()
    }

    /// SAVE: write the detokenized program to the mounted disk. Returns
    /// the stored 8.3 filename.
    pub fn save_program(&mut self, name: &str) -> Basic8Result<String> {
        let listing: String = self
            .list()
            .into_iter()
            .map(|(n, code)| format!("{n} {code}\n"))
            .collect();
        let disk = self.disk.as_mut().ok_or(Basic8Error::DiskNotMounted)?;
        let filename = normalize_8_3(name, "BAS");
        disk.save_file(&filename, listing.as_bytes())?;
        Ok(filename)
    }

    /// LOAD: replace the stored program with one from the mounted disk.
    /// The file is parsed in full before the old program is dropped.
    pub fn load_program(&mut self, name: &str) -> Basic8Result<String> {
        let disk = self.disk.as_ref().ok_or(Basic8Error::DiskNotMounted)?;
        let filename = normalize_8_3(name, "BAS");
        let data = disk.load_file(&filename)?;
        let text = String::from_utf8_lossy(&data).into_owned();

        let mut parsed = Vec::new();
        for raw in text.lines() {
            if raw.trim().is_empty() {
                continue;
            }
            let (digits, rest) = split_line_number(raw).ok_or_else(|| {
                Basic8Error::SyntaxError(format!("program line without a number: {raw}"))
            })?;
            let line_no: u16 = digits
                .parse()
                .map_err(|_| Basic8Error::SyntaxError(format!("bad line number: {digits}")))?;
            parsed.push((line_no, tokenize(&normalize_statement(rest))));
        }

        let mut prog = ProgramStore::new(&mut self.mem);
        prog.clear();
        for (line_no, tokens) in &parsed {
            prog.insert_or_replace(*line_no, tokens)?;
        }
        log::debug!("loaded {} ({} lines)", filename, parsed.len());
        Ok(filename)
    }
}

fn at_line(line: u16, source: Basic8Error) -> Basic8Error {
    Basic8Error::RuntimeAt {
        line,
        source: Box::new(source),
    }
}

/// Split a leading line number off an input line. Returns the digit run
/// and everything after it, or None when the line does not start with a
/// digit.
fn split_line_number(input: &str) -> Option<(&str, &str)> {
    let trimmed = input.trim_start();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if digits_end == 0 {
        return None;
    }
    Some((&trimmed[..digits_end], &trimmed[digits_end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::HeadlessConsole;
    use crate::memory::region;
    use pretty_assertions::assert_eq;

    fn machine() -> Machine<HeadlessConsole> {
        Machine::new(HeadlessConsole::new())
    }

    #[test]
    fn rom_marker_is_installed() {
        let m = machine();
        assert_eq!(m.memory().dump(0xFFF0, 6).unwrap(), b"BASIC8");
        assert_eq!(m.memory().read_word16(0xFFFC).unwrap(), 0xF000);
    }

    #[test]
    fn numbered_lines_store_and_list_in_order() {
        let mut m = machine();
        m.submit_line("30 C% = 3").unwrap();
        m.submit_line("10 A% = 1").unwrap();
        m.submit_line("20 B% = 2").unwrap();
        let listing = m.list();
        assert_eq!(
            listing,
            vec![
                (10, "A% = 1".to_string()),
                (20, "B% = 2".to_string()),
                (30, "C% = 3".to_string()),
            ]
        );
    }

    #[test]
    fn stored_lines_are_whitespace_normalized() {
        let mut m = machine();
        m.submit_line("10   LET   A%   =   1").unwrap();
        m.submit_line("20 PRINT 1").unwrap();
        let listing = m.list();
        assert_eq!(listing[0].1, "LET A% = 1");
        // Spaces survive only around operators and between words; the one
        // before a numeric literal is squeezed out.
        assert_eq!(listing[1].1, "PRINT1");
    }

    #[test]
    fn bare_line_number_deletes() {
        let mut m = machine();
        m.submit_line("10 A% = 1").unwrap();
        m.submit_line("10").unwrap();
        assert!(m.list().is_empty());
        // Deleting a line that never existed is quietly accepted.
        m.submit_line("99").unwrap();
    }

    #[test]
    fn immediate_statements_execute() {
        let mut m = machine();
        m.submit_line("A% = 2+3").unwrap();
        assert_eq!(m.variables(), vec![("A%".to_string(), 5)]);
    }

    #[test]
    fn run_executes_in_line_order_with_goto() {
        let mut m = machine();
        m.submit_line("10 A% = 1").unwrap();
        m.submit_line("20 GOTO 40").unwrap();
        m.submit_line("30 A% = 99").unwrap();
        m.submit_line("40 PRINT A%").unwrap();
        m.run().unwrap();
        assert_eq!(m.console().output_string(), "1\n");
        assert_eq!(m.variables(), vec![("A%".to_string(), 1)]);
    }

    #[test]
    fn goto_missing_line_reports_line_context() {
        let mut m = machine();
        m.submit_line("10 GOTO 70").unwrap();
        let err = m.run().unwrap_err();
        match err {
            Basic8Error::RuntimeAt { line, source } => {
                assert_eq!(line, 10);
                assert!(matches!(*source, Basic8Error::NoSuchLine(70)));
            }
            other => panic!("expected RuntimeAt, got {other}"),
        }
    }

    #[test]
    fn output_reaches_screen_memory_and_console() {
        let mut m = machine();
        m.submit_line("PRINT \"READY\"").unwrap();
        assert_eq!(m.console().output_string(), "READY\n");
        assert_eq!(
            m.memory().dump(region::SCREEN_START, 5).unwrap(),
            b"READY"
        );
    }

    #[test]
    fn new_program_resets_everything() {
        let mut m = machine();
        m.submit_line("10 A% = 1").unwrap();
        m.submit_line("A% = 5").unwrap();
        m.new_program();
        assert!(m.list().is_empty());
        assert!(m.variables().is_empty());
    }

    #[test]
    fn unparsed_statements_surface_as_syntax_errors() {
        let mut m = machine();
        let err = m.submit_line("REPEAT").unwrap_err();
        assert!(matches!(err, Basic8Error::SyntaxError(_)));
    }

    /// Fallback parser stub that records what it was handed.
    struct RecordingParser {
        seen: std::sync::mpsc::Sender<String>,
    }

    impl crate::exec::StatementParser for RecordingParser {
        fn execute_statement(&mut self, statement: &str) -> Basic8Result<Option<String>> {
            self.seen.send(statement.to_string()).ok();
            Ok(Some("handled elsewhere".to_string()))
        }
    }

    #[test]
    fn fallback_statements_reach_the_injected_parser() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut m = Machine::with_parser(HeadlessConsole::new(), RecordingParser { seen: tx });
        m.submit_line("FOR I% = 1 TO 3").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "FOR I% = 1 TO 3");
        assert_eq!(m.console().output_string(), "handled elsewhere\n");
    }
}
