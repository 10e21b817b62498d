//! Direct token executor.
//!
//! Executes a line's token bytes straight off the byte stream with a
//! cursor — no intermediate parse tree. Statement tokens dispatch to
//! handlers that consume the token shapes they expect; expressions are a
//! recursive-descent walk honoring parentheses > `*`,`/` > `+`,`-`,
//! left-to-right within a level.
//!
//! Anything the fast path does not recognize is detokenized and handed to
//! the injected [`StatementParser`] collaborator. Handlers never mutate
//! state before the decision to fall back, so a fallback statement starts
//! from a clean slate.
//!
//! Numeric semantics: expressions evaluate in 32-bit registers and wrap;
//! variable stores truncate to 16 bits two's-complement (modular, never
//! saturating). Division by zero is an error that aborts the statement with
//! all previously committed state intact.

use crate::error::{Basic8Error, Basic8Result};
use crate::memory::MemoryImage;
use crate::symbols::SymbolTable;
use crate::tokens::{detokenize, tok};

/// Control flow after a successfully executed statement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    /// Fall through to the next line.
    Continue,
    /// GOTO target line.
    Jump(u16),
    /// END or STOP.
    Halt,
}

/// Result of pushing a line through the fast path.
#[derive(Debug, PartialEq)]
pub enum Executed {
    Done(Flow),
    /// Statement shape not handled here; detokenized text for the
    /// fallback parser, untouched state behind it.
    Fallback(String),
}

/// Text-parser collaborator for statements the executor does not handle.
pub trait StatementParser: Send {
    /// Execute one statement given as text. `Ok(Some(_))` carries output
    /// for the screen.
    fn execute_statement(&mut self, statement: &str) -> Basic8Result<Option<String>>;
}

/// Default collaborator: rejects everything, so unrecognized statements
/// surface as syntax errors.
pub struct NullParser;

impl StatementParser for NullParser {
    fn execute_statement(&mut self, statement: &str) -> Basic8Result<Option<String>> {
        Err(Basic8Error::SyntaxError(statement.to_string()))
    }
}

/// Executes token bytes against a memory image. Print output accumulates
/// in a caller-supplied buffer so a failed statement emits nothing.
pub struct Executor<'a> {
    mem: &'a mut MemoryImage,
}

impl<'a> Executor<'a> {
    pub fn new(mem: &'a mut MemoryImage) -> Self {
        Self { mem }
    }

    /// Execute one line of tokens: a statement, or several separated by
    /// `:`. GOTO and END abandon the rest of the line.
    pub fn execute_line(&mut self, tokens: &[u8], out: &mut String) -> Basic8Result<Executed> {
        let mut pos = 0;
        loop {
            skip_spaces(tokens, &mut pos);
            if pos >= tokens.len() {
                return Ok(Executed::Done(Flow::Continue));
            }
            match self.execute_statement(tokens, &mut pos, out)? {
                Executed::Done(Flow::Continue) => {
                    skip_spaces(tokens, &mut pos);
                    if pos >= tokens.len() {
                        return Ok(Executed::Done(Flow::Continue));
                    }
                    if tokens[pos] == b':' {
                        pos += 1;
                        continue;
                    }
                    return Err(Basic8Error::SyntaxError(format!(
                        "unexpected text after statement: {}",
                        detokenize(&tokens[pos..])
                    )));
                }
                done @ Executed::Done(_) => return Ok(done),
                fallback @ Executed::Fallback(_) => return Ok(fallback),
            }
        }
    }

    fn execute_statement(
        &mut self,
        tokens: &[u8],
        pos: &mut usize,
        out: &mut String,
    ) -> Basic8Result<Executed> {
        let start = *pos;

        // Fast-path statement bodies are built from literal bytes only. A
        // keyword token anywhere past the leading one (functions, FOR/TO,
        // THEN, ...) means this shape belongs to the fallback parser.
        if tokens[*pos] != tok::REM {
            let body_start = if tokens[*pos] >= 0x80 { *pos + 1 } else { *pos };
            let seg_end = segment_end(tokens, body_start);
            if tokens[body_start..seg_end].iter().any(|&b| b >= 0x80) {
                return Ok(Executed::Fallback(detokenize(&tokens[start..])));
            }
        }

        match tokens[*pos] {
            tok::LET => {
                *pos += 1;
                skip_spaces(tokens, pos);
                self.assignment(tokens, pos, start)
            }
            b if b.is_ascii_alphabetic() => self.assignment(tokens, pos, start),
            tok::PRINT => {
                *pos += 1;
                self.print(tokens, pos, out)?;
                Ok(Executed::Done(Flow::Continue))
            }
            tok::GOTO => {
                *pos += 1;
                let target = self.expression(tokens, pos)?;
                if !(0..=0xFFFF).contains(&target) {
                    return Err(Basic8Error::SyntaxError(format!(
                        "bad line number: {target}"
                    )));
                }
                Ok(Executed::Done(Flow::Jump(target as u16)))
            }
            tok::END | tok::STOP => {
                *pos += 1;
                Ok(Executed::Done(Flow::Halt))
            }
            tok::REM => {
                // Comment swallows the rest of the line, colons included.
                *pos = tokens.len();
                Ok(Executed::Done(Flow::Continue))
            }
            _ => Ok(Executed::Fallback(detokenize(&tokens[start..]))),
        }
    }

    /// `name = expression`, creating the variable on first assignment.
    fn assignment(
        &mut self,
        tokens: &[u8],
        pos: &mut usize,
        stmt_start: usize,
    ) -> Basic8Result<Executed> {
        let Some(name) = parse_var_name(tokens, pos) else {
            return Err(Basic8Error::SyntaxError(
                "expected variable name".to_string(),
            ));
        };
        if name.ends_with('$') {
            // String storage is reserved; let the collaborator have it.
            return Ok(Executed::Fallback(detokenize(&tokens[stmt_start..])));
        }

        skip_spaces(tokens, pos);
        if *pos >= tokens.len() || tokens[*pos] != b'=' {
            // Not a plain scalar assignment (array subscript, keyword
            // statement the tokenizer left as text, ...); nothing has been
            // touched yet, so the collaborator can have the whole thing.
            return Ok(Executed::Fallback(detokenize(&tokens[stmt_start..])));
        }
        *pos += 1;

        let value = self.expression(tokens, pos)?;

        let mut syms = SymbolTable::new(self.mem);
        let addr = match syms.lookup(&name) {
            Ok(addr) => addr,
            Err(Basic8Error::VariableNotFound(_)) => syms.allocate(&name, 2)?,
            Err(e) => return Err(e),
        };
        self.mem.write_word16(addr, value as u16)?;
        log::trace!("{name} = {} -> ${addr:04X}", value as i16);
        Ok(Executed::Done(Flow::Continue))
    }

    /// PRINT items separated by `;` (no padding) or `,` (next 8-column
    /// field). A trailing separator suppresses the newline.
    fn print(&mut self, tokens: &[u8], pos: &mut usize, out: &mut String) -> Basic8Result<()> {
        let mut trailing_separator = false;
        loop {
            skip_spaces(tokens, pos);
            if *pos >= tokens.len() || tokens[*pos] == b':' {
                break;
            }

            if tokens[*pos] == b'"' {
                *pos += 1;
                let text_start = *pos;
                while *pos < tokens.len() && tokens[*pos] != b'"' {
                    *pos += 1;
                }
                if *pos >= tokens.len() {
                    return Err(Basic8Error::SyntaxError(
                        "unterminated string".to_string(),
                    ));
                }
                out.push_str(&detokenize(&tokens[text_start..*pos]));
                *pos += 1;
            } else {
                let value = self.expression(tokens, pos)?;
                out.push_str(&value.to_string());
            }

            skip_spaces(tokens, pos);
            trailing_separator = false;
            match tokens.get(*pos) {
                Some(b';') => {
                    *pos += 1;
                    trailing_separator = true;
                }
                Some(b',') => {
                    *pos += 1;
                    trailing_separator = true;
                    let col = out.chars().rev().take_while(|&c| c != '\n').count();
                    let pad = 8 - col % 8;
                    out.extend(std::iter::repeat(' ').take(pad));
                }
                _ => {}
            }
        }
        if !trailing_separator {
            out.push('\n');
        }
        Ok(())
    }

    // Expression grammar:
    //   expression := term { (+|-) term }
    //   term       := factor { (*|/) factor }
    //   factor     := number | variable | ( expression ) | - factor

    fn expression(&mut self, tokens: &[u8], pos: &mut usize) -> Basic8Result<i32> {
        let mut value = self.term(tokens, pos)?;
        loop {
            skip_spaces(tokens, pos);
            match tokens.get(*pos) {
                Some(b'+') => {
                    *pos += 1;
                    value = value.wrapping_add(self.term(tokens, pos)?);
                }
                Some(b'-') => {
                    *pos += 1;
                    value = value.wrapping_sub(self.term(tokens, pos)?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self, tokens: &[u8], pos: &mut usize) -> Basic8Result<i32> {
        let mut value = self.factor(tokens, pos)?;
        loop {
            skip_spaces(tokens, pos);
            match tokens.get(*pos) {
                Some(b'*') => {
                    *pos += 1;
                    value = value.wrapping_mul(self.factor(tokens, pos)?);
                }
                Some(b'/') => {
                    *pos += 1;
                    let divisor = self.factor(tokens, pos)?;
                    if divisor == 0 {
                        return Err(Basic8Error::DivisionByZero);
                    }
                    value = value.wrapping_div(divisor);
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self, tokens: &[u8], pos: &mut usize) -> Basic8Result<i32> {
        skip_spaces(tokens, pos);
        match tokens.get(*pos) {
            Some(b'(') => {
                *pos += 1;
                let value = self.expression(tokens, pos)?;
                skip_spaces(tokens, pos);
                if tokens.get(*pos) != Some(&b')') {
                    return Err(Basic8Error::SyntaxError(
                        "expected closing parenthesis".to_string(),
                    ));
                }
                *pos += 1;
                Ok(value)
            }
            Some(b'-') => {
                *pos += 1;
                Ok(self.factor(tokens, pos)?.wrapping_neg())
            }
            Some(b) if b.is_ascii_digit() => Ok(parse_number(tokens, pos)),
            Some(b) if b.is_ascii_alphabetic() => {
                let name = parse_var_name(tokens, pos).expect("leading byte is alphabetic");
                let addr = SymbolTable::new(self.mem).lookup(&name)?;
                let raw = self.mem.read_word16(addr)?;
                Ok(raw as i16 as i32)
            }
            _ => Err(Basic8Error::SyntaxError(
                "expected number or variable".to_string(),
            )),
        }
    }
}

fn skip_spaces(tokens: &[u8], pos: &mut usize) {
    while tokens.get(*pos) == Some(&b' ') {
        *pos += 1;
    }
}

/// Index of the `:` ending the statement that starts at `start`, or the
/// end of the line. Colons inside string literals do not count.
fn segment_end(tokens: &[u8], start: usize) -> usize {
    let mut in_string = false;
    for (i, &b) in tokens.iter().enumerate().skip(start) {
        match b {
            b'"' => in_string = !in_string,
            b':' if !in_string => return i,
            _ => {}
        }
    }
    tokens.len()
}

/// Variable names are `[A-Z][A-Z0-9]*` with an optional `%` or `$` suffix;
/// the suffix terminates the name.
fn parse_var_name(tokens: &[u8], pos: &mut usize) -> Option<String> {
    if !tokens.get(*pos)?.is_ascii_alphabetic() {
        return None;
    }
    let mut name = String::new();
    while let Some(&b) = tokens.get(*pos) {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => {
                name.push(b.to_ascii_uppercase() as char);
                *pos += 1;
            }
            b'%' | b'$' => {
                name.push(b as char);
                *pos += 1;
                break;
            }
            _ => break,
        }
    }
    Some(name)
}

/// Decimal integer literal; digits accumulate with modular arithmetic.
fn parse_number(tokens: &[u8], pos: &mut usize) -> i32 {
    let mut value: i32 = 0;
    while let Some(&b) = tokens.get(*pos) {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.wrapping_mul(10).wrapping_add((b - b'0') as i32);
        *pos += 1;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;
    use crate::tokens::tokenize;
    use pretty_assertions::assert_eq;

    fn fresh_mem() -> MemoryImage {
        let mut mem = MemoryImage::new();
        SymbolTable::new(&mut mem).reset();
        mem
    }

    fn exec(mem: &mut MemoryImage, line: &str) -> Basic8Result<(Executed, String)> {
        let tokens = tokenize(line);
        let mut out = String::new();
        let result = Executor::new(mem).execute_line(&tokens, &mut out)?;
        Ok((result, out))
    }

    fn var(mem: &mut MemoryImage, name: &str) -> i16 {
        let addr = SymbolTable::new(mem).lookup(name).unwrap();
        mem.read_word16(addr).unwrap() as i16
    }

    #[test]
    fn let_assignment_creates_and_stores() {
        let mut mem = fresh_mem();
        exec(&mut mem, "LET A% = 5").unwrap();
        assert_eq!(var(&mut mem, "A%"), 5);
    }

    #[test]
    fn implicit_assignment_without_let() {
        let mut mem = fresh_mem();
        exec(&mut mem, "X% = 3+4").unwrap();
        assert_eq!(var(&mut mem, "X%"), 7);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let mut mem = fresh_mem();
        exec(&mut mem, "A% = 2+3*4").unwrap();
        assert_eq!(var(&mut mem, "A%"), 14);
        exec(&mut mem, "B% = (2+3)*4").unwrap();
        assert_eq!(var(&mut mem, "B%"), 20);
        exec(&mut mem, "C% = 10-4-3").unwrap();
        assert_eq!(var(&mut mem, "C%"), 3); // left associative
        exec(&mut mem, "D% = 100/5/2").unwrap();
        assert_eq!(var(&mut mem, "D%"), 10);
    }

    #[test]
    fn unary_minus_and_variables_in_expressions() {
        let mut mem = fresh_mem();
        exec(&mut mem, "A% = -7").unwrap();
        exec(&mut mem, "B% = A%*-2").unwrap();
        assert_eq!(var(&mut mem, "B%"), 14);
    }

    #[test]
    fn sixteen_bit_store_wraps() {
        let mut mem = fresh_mem();
        exec(&mut mem, "A% = 32767").unwrap();
        exec(&mut mem, "B% = A%+1").unwrap();
        assert_eq!(var(&mut mem, "B%"), -32768);
        exec(&mut mem, "C% = 70000").unwrap();
        assert_eq!(var(&mut mem, "C%"), 4464); // 70000 mod 65536
    }

    #[test]
    fn division_by_zero_leaves_variables_untouched() {
        let mut mem = fresh_mem();
        exec(&mut mem, "A% = 9").unwrap();
        let err = exec(&mut mem, "A% = 1/0").unwrap_err();
        assert!(matches!(err, Basic8Error::DivisionByZero));
        assert_eq!(var(&mut mem, "A%"), 9);
        // A zero divisor reached through a variable counts too.
        exec(&mut mem, "Z% = 0").unwrap();
        let err = exec(&mut mem, "A% = 5/Z%").unwrap_err();
        assert!(matches!(err, Basic8Error::DivisionByZero));
        assert_eq!(var(&mut mem, "A%"), 9);
    }

    #[test]
    fn undefined_variable_reference_errors() {
        let mut mem = fresh_mem();
        let err = exec(&mut mem, "A% = B%+1").unwrap_err();
        assert!(matches!(err, Basic8Error::VariableNotFound(_)));
    }

    #[test]
    fn print_expressions_and_strings() {
        let mut mem = fresh_mem();
        exec(&mut mem, "A% = 6").unwrap();
        let (_, out) = exec(&mut mem, "PRINT \"A IS \"; A%*7").unwrap();
        assert_eq!(out, "A IS 42\n");
    }

    #[test]
    fn print_comma_advances_to_next_field() {
        let mut mem = fresh_mem();
        let (_, out) = exec(&mut mem, "PRINT 1, 22, 333").unwrap();
        assert_eq!(out, "1       22      333\n");
    }

    #[test]
    fn print_trailing_semicolon_suppresses_newline() {
        let mut mem = fresh_mem();
        let (_, out) = exec(&mut mem, "PRINT \"READY\";").unwrap();
        assert_eq!(out, "READY");
    }

    #[test]
    fn goto_and_end_control_flow() {
        let mut mem = fresh_mem();
        let (result, _) = exec(&mut mem, "GOTO 100").unwrap();
        assert_eq!(result, Executed::Done(Flow::Jump(100)));
        let (result, _) = exec(&mut mem, "END").unwrap();
        assert_eq!(result, Executed::Done(Flow::Halt));
    }

    #[test]
    fn colon_separates_statements() {
        let mut mem = fresh_mem();
        let (_, out) = exec(&mut mem, "A% = 2 : B% = A%*3 : PRINT B%").unwrap();
        assert_eq!(var(&mut mem, "B%"), 6);
        assert_eq!(out, "6\n");
    }

    #[test]
    fn rem_swallows_the_line() {
        let mut mem = fresh_mem();
        let (result, out) = exec(&mut mem, "REM A% = 1 : B% = 2").unwrap();
        assert_eq!(result, Executed::Done(Flow::Continue));
        assert!(out.is_empty());
        assert!(SymbolTable::new(&mut mem).lookup("A%").is_err());
    }

    #[test]
    fn unknown_statements_fall_back_before_mutating() {
        let mut mem = fresh_mem();
        let (result, _) = exec(&mut mem, "FOR I% = 1 TO 10").unwrap();
        match result {
            Executed::Fallback(text) => assert_eq!(text, "FOR I% = 1 TO 10"),
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(SymbolTable::new(&mut mem).count(), 0);
    }

    #[test]
    fn function_tokens_in_expressions_fall_back() {
        let mut mem = fresh_mem();
        let (result, out) = exec(&mut mem, "PRINT CHR$(65)").unwrap();
        assert!(matches!(result, Executed::Fallback(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn array_shaped_assignment_falls_back() {
        let mut mem = fresh_mem();
        let (result, _) = exec(&mut mem, "A%(3) = 5").unwrap();
        match result {
            Executed::Fallback(text) => assert_eq!(text, "A%(3) = 5"),
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(SymbolTable::new(&mut mem).count(), 0);
    }

    #[test]
    fn string_assignment_falls_back() {
        let mut mem = fresh_mem();
        let (result, _) = exec(&mut mem, "N$ = \"HELLO\"").unwrap();
        assert!(matches!(result, Executed::Fallback(_)));
        assert_eq!(SymbolTable::new(&mut mem).count(), 0);
    }
}
