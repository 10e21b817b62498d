//! Console command dispatch.
//!
//! Command words are matched before anything reaches the BASIC
//! interpreter, so `LIST` at the prompt lists the program while
//! `A% = LIST` would be a syntax error. Anything that is not a command is
//! handed back to the caller as BASIC input.

use basic8_core::memory::region;
use basic8_core::{normalize_8_3, Basic8Error, Basic8Result, Console, Machine, StatementParser};

/// What became of one line of input.
pub enum CommandOutcome {
    Handled,
    Quit,
    /// Not a console command; treat as BASIC.
    NotACommand,
}

const HELP_TEXT: &[(&str, &str)] = &[
    ("LIST", "List the current program"),
    ("RUN", "Execute the stored program"),
    ("NEW", "Clear the current program and variables"),
    ("VARS", "List all variables and their values"),
    ("CLS", "Clear the screen"),
    ("MEMORY", "Display memory map and usage (alias: MAP)"),
    ("DUMP [addr]", "Dump memory contents in hex"),
    ("SYMBOLS", "Display the symbol table"),
    ("SAVE name", "Save program to disk (.BAS)"),
    ("LOAD name", "Load program from disk (.BAS)"),
    ("CAT", "List files on the disk (alias: DIR)"),
    ("TYPE name", "Display a text file (.TXT)"),
    ("DEL name", "Delete a file (.TXT)"),
    ("FORMAT", "Wipe the disk to an empty filesystem"),
    ("QUIT", "Exit (alias: EXIT)"),
    ("HELP", "Show this list"),
];

/// Try to execute `input` as a console command.
pub fn execute<C: Console, P: StatementParser>(
    machine: &mut Machine<C, P>,
    input: &str,
) -> Basic8Result<CommandOutcome> {
    let mut parts = input.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(CommandOutcome::Handled);
    };
    let arg = parts.next().map(str::to_string);

    match word.to_uppercase().as_str() {
        "LIST" => {
            let listing = machine.list();
            if listing.is_empty() {
                say(machine, "No program in memory\n");
            } else {
                for (line_no, code) in listing {
                    say(machine, &format!("{line_no:5} {code}\n"));
                }
            }
        }
        "RUN" => machine.run()?,
        "NEW" => {
            machine.new_program();
            say(machine, "Program cleared\n");
        }
        "VARS" => {
            let vars = machine.variables();
            if vars.is_empty() {
                say(machine, "No variables set\n");
            } else {
                for (name, value) in vars {
                    say(machine, &format!("{name} = {value}\n"));
                }
            }
        }
        "CLS" | "CLEAR" => {
            machine.cls();
            // ANSI clear for the real terminal behind the console.
            say(machine, "\x1b[2J\x1b[H");
        }
        "MEMORY" | "MAP" => {
            let report = memory_map(machine);
            say(machine, &report);
        }
        "DUMP" => {
            let addr = match arg.as_deref().map(parse_address) {
                Some(Ok(addr)) => addr,
                Some(Err(bad)) => {
                    say(machine, &format!("Invalid address: {bad}\n"));
                    return Ok(CommandOutcome::Handled);
                }
                None => region::VARS_START,
            };
            let report = hex_dump(machine, addr);
            say(machine, &report);
        }
        "SYMBOLS" => {
            let entries = machine.symbols();
            if entries.is_empty() {
                say(machine, "Symbol table empty\n");
            } else {
                say(machine, "NAME      ADDR  SIZE TYPE\n");
                for e in entries {
                    say(
                        machine,
                        &format!("{:<8}  ${:04X}  {:>3}  ${:02X}\n", e.name, e.addr, e.size, e.tag),
                    );
                }
            }
        }
        "SAVE" => match arg {
            Some(name) => {
                let filename = machine.save_program(&name)?;
                say(machine, &format!("Saved {filename}\n"));
            }
            None => say(machine, "Syntax: SAVE filename\n"),
        },
        "LOAD" => match arg {
            Some(name) => {
                let filename = machine.load_program(&name)?;
                say(machine, &format!("Loaded {filename}\n"));
            }
            None => say(machine, "Syntax: LOAD filename\n"),
        },
        "CAT" | "DIR" | "CATALOG" => {
            let report = catalog(machine)?;
            say(machine, &report);
        }
        "TYPE" => match arg {
            Some(name) => {
                let filename = normalize_8_3(&name, "TXT");
                let disk = machine.disk().ok_or(Basic8Error::DiskNotMounted)?;
                let data = disk.load_file(&filename)?;
                let text = String::from_utf8_lossy(&data).into_owned();
                say(machine, &text);
                if !text.ends_with('\n') {
                    say(machine, "\n");
                }
            }
            None => say(machine, "Syntax: TYPE filename\n"),
        },
        "DEL" | "DELETE" => match arg {
            Some(name) => {
                let filename = normalize_8_3(&name, "TXT");
                machine
                    .disk_mut()
                    .ok_or(Basic8Error::DiskNotMounted)?
                    .delete_file(&filename)?;
                say(machine, &format!("Deleted {filename}\n"));
            }
            None => say(machine, "Syntax: DEL filename\n"),
        },
        "FORMAT" => {
            let label = arg.unwrap_or_else(|| "BASIC8".to_string());
            machine
                .disk_mut()
                .ok_or(Basic8Error::DiskNotMounted)?
                .format(&label)?;
            say(machine, "Disk formatted\n");
        }
        "HELP" => {
            say(machine, "Available commands:\n");
            for (name, text) in HELP_TEXT {
                say(machine, &format!("  {name:<12} - {text}\n"));
            }
        }
        "QUIT" | "EXIT" => return Ok(CommandOutcome::Quit),
        _ => return Ok(CommandOutcome::NotACommand),
    }
    Ok(CommandOutcome::Handled)
}

fn say<C: Console, P: StatementParser>(machine: &mut Machine<C, P>, text: &str) {
    machine.console_mut().write_str(text);
}

/// `0x` / `&` prefixed hex, or decimal.
fn parse_address(text: &str) -> Result<u16, String> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix('&') {
        u16::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| text.to_string())
}

fn hex_dump<C: Console, P: StatementParser>(machine: &Machine<C, P>, start: u16) -> String {
    let len = 64.min(0x10000 - start as usize);
    let bytes = match machine.memory().dump(start, len) {
        Ok(bytes) => bytes,
        Err(e) => return format!("{e}\n"),
    };
    let mut out = format!("Memory dump starting at ${start:04X}:\n");
    for (row, chunk) in bytes.chunks(16).enumerate() {
        out.push_str(&format!("${:04X}: ", start as usize + row * 16));
        for b in chunk {
            out.push_str(&format!("{b:02X} "));
        }
        out.push('\n');
    }
    out
}

fn memory_map<C: Console, P: StatementParser>(machine: &mut Machine<C, P>) -> String {
    let vars = machine.variable_bytes_used();
    let prog = machine.program_bytes_used();
    format!(
        "Memory Map:\n\
         $0000-$00FF  Zero Page (256 bytes)\n\
         $0100-$01FF  Stack (256 bytes)\n\
         $0200-$03FF  System Area (512 bytes)\n\
         $0400-$07FF  Screen Memory (1024 bytes)\n\
         $0800-$0FFF  Variable Storage (2048 bytes)\n\
         $1000-$EFFF  Program Memory (57344 bytes)\n\
         $F000-$FFFF  Hardware / ROM (4096 bytes)\n\
         \n\
         Variables: {vars} bytes used\n\
         Program:   {prog} bytes used\n"
    )
}

fn catalog<C: Console, P: StatementParser>(machine: &Machine<C, P>) -> Basic8Result<String> {
    let disk = machine.disk().ok_or(Basic8Error::DiskNotMounted)?;
    let files = disk.list_files();
    let label = disk.volume_label().unwrap_or_else(|| "NO NAME".to_string());

    let mut out = format!("\nDirectory of {label}\n\n");
    if files.is_empty() {
        out.push_str("No files found\n");
    } else {
        let mut total = 0u64;
        for (filename, size) in &files {
            let (name, ext) = match filename.rfind('.') {
                Some(pos) => (&filename[..pos], &filename[pos + 1..]),
                None => (filename.as_str(), ""),
            };
            out.push_str(&format!("{name:<8} {ext:<3} {size:>7}\n"));
            total += *size as u64;
        }
        out.push_str(&format!("\n{} file(s), {} bytes\n", files.len(), total));
    }
    out.push_str(&format!("{} bytes free\n", disk.free_space()));
    Ok(out)
}
