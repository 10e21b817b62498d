//! Console I/O abstraction.
//!
//! The `Console` trait provides character I/O that works identically for
//! tests (`HeadlessConsole`) and real terminals.

use std::collections::VecDeque;

/// Character I/O for the machine's front panel.
pub trait Console: Send {
    /// Write a character to console output.
    fn write(&mut self, ch: u8);

    /// Check if a key is available (non-blocking).
    fn has_key(&self) -> bool;

    /// Get next key from buffer. Returns None if no key available.
    fn get_key(&mut self) -> Option<u8>;

    /// Wait for a key (blocking). Default implementation polls.
    fn wait_for_key(&mut self) -> u8 {
        loop {
            if let Some(key) = self.get_key() {
                return key;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Write a whole string.
    fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write(b);
        }
    }

    /// Read one line of input with echo and backspace handling.
    /// Returns on carriage return or line feed; the terminator is echoed
    /// as CR+LF but not included in the result.
    fn read_line(&mut self) -> String {
        let mut line = Vec::new();
        loop {
            let ch = self.wait_for_key();
            match ch {
                13 | 10 => {
                    self.write(13);
                    self.write(10);
                    break;
                }
                8 | 127 => {
                    if line.pop().is_some() {
                        self.write(8);
                        self.write(b' ');
                        self.write(8);
                    }
                }
                3 => {
                    // Ctrl+C cancels the line.
                    self.write(b'\n');
                    line.clear();
                    break;
                }
                32..=126 => {
                    line.push(ch);
                    self.write(ch);
                }
                0 => break, // input source closed
                _ => {}
            }
        }
        String::from_utf8_lossy(&line).into_owned()
    }
}

/// Headless console for testing - captures output, provides queued input.
#[derive(Default)]
pub struct HeadlessConsole {
    output: Vec<u8>,
    input: VecDeque<u8>,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-queued input.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            output: Vec::new(),
            input: input.iter().copied().collect(),
        }
    }

    /// Queue a string as input.
    pub fn queue_string(&mut self, s: &str) {
        self.input.extend(s.as_bytes().iter().copied());
    }

    /// Get all output as bytes.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Get output as string (lossy UTF-8 conversion).
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Clear output buffer.
    pub fn clear_output(&mut self) {
        self.output.clear();
    }
}

impl Console for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn has_key(&self) -> bool {
        !self.input.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn wait_for_key(&mut self) -> u8 {
        // For headless, just return from queue or 0 if empty.
        self.input.pop_front().unwrap_or(0)
    }
}
