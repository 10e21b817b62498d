//! basic8 console - an 8-bit home computer at your prompt.
//!
//! Usage:
//!   basic8                        # boot with basic8.dsk (created if absent)
//!   basic8 --disk games.dsk       # boot a specific disk image
//!   basic8 --import games.zip     # install a program bundle onto the disk
//!   basic8 -- "10 A% = 5" RUN     # feed lines non-interactively and exit

use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc as tokio_mpsc;

use basic8_core::{
    install_bundle, load_bundle_from_path, Basic8Result, Console, DiskImage, Machine,
};

mod commands;

use commands::CommandOutcome;

/// basic8 home computer emulator
#[derive(Parser, Debug)]
#[command(name = "basic8")]
#[command(about = "Run the basic8 home computer")]
struct Args {
    /// Disk image file (created and formatted when missing)
    #[arg(short, long, default_value = "basic8.dsk")]
    disk: PathBuf,

    /// Program bundles (.zip) to install onto the disk before booting
    #[arg(short, long)]
    import: Vec<PathBuf>,

    /// Program to LOAD from the disk at startup
    #[arg(short, long)]
    load: Option<String>,

    /// Input lines to run non-interactively (then exit)
    #[arg(last = true)]
    batch: Vec<String>,
}

/// Console fed by a keyboard channel; output goes straight to stdout.
struct ChannelConsole {
    key_rx: mpsc::Receiver<u8>,
    /// Set once the keyboard channel hangs up.
    closed: bool,
}

impl ChannelConsole {
    fn new(key_rx: mpsc::Receiver<u8>) -> Self {
        Self {
            key_rx,
            closed: false,
        }
    }
}

impl Console for ChannelConsole {
    fn write(&mut self, ch: u8) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        match ch {
            // Raw mode needs an explicit carriage return.
            0x0A => {
                let _ = handle.write_all(b"\r\n");
            }
            _ => {
                let _ = handle.write_all(&[ch]);
            }
        }
        let _ = handle.flush();
    }

    fn has_key(&self) -> bool {
        false // only used by polling callers; the REPL blocks instead
    }

    fn get_key(&mut self) -> Option<u8> {
        self.key_rx.try_recv().ok()
    }

    fn wait_for_key(&mut self) -> u8 {
        // 0 signals a closed keyboard channel; read_line treats it as EOF.
        match self.key_rx.recv() {
            Ok(ch) => ch,
            Err(_) => {
                self.closed = true;
                0
            }
        }
    }
}

/// Translate crossterm key events to console key codes.
fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return Some(upper as u8 - 64); // Ctrl+A=1, Ctrl+C=3, ...
            }
        }
    }

    match code {
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(13),
        KeyCode::Backspace => Some(8),
        KeyCode::Tab => Some(9),
        KeyCode::Esc => Some(27),
        _ => None,
    }
}

/// One line of input through the command registry, falling through to the
/// BASIC interpreter. Errors are rendered, never fatal.
fn handle_line<C: Console>(machine: &mut Machine<C>, line: &str) -> bool {
    let result: Basic8Result<bool> = (|| {
        match commands::execute(machine, line)? {
            CommandOutcome::Quit => return Ok(true),
            CommandOutcome::Handled => {}
            CommandOutcome::NotACommand => machine.submit_line(line)?,
        }
        Ok(false)
    })();
    match result {
        Ok(quit) => quit,
        Err(e) => {
            machine.console_mut().write_str(&format!("Error: {e}\n"));
            false
        }
    }
}

/// The interactive loop: banner, prompt, dispatch, repeat.
fn repl(machine: &mut Machine<ChannelConsole>) {
    machine.console_mut().write_str("basic8\n");
    if let Some(disk) = machine.disk() {
        let free = disk.free_space();
        machine
            .console_mut()
            .write_str(&format!("{free} bytes free\n"));
    }
    machine.console_mut().write_str("Ready\n\n");

    loop {
        machine.console_mut().write_str("> ");
        let line = machine.console_mut().read_line();
        if machine.console().closed {
            break;
        }
        if handle_line(machine, &line) {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    // Mount the disk, creating a fresh formatted image when absent.
    let mut disk = DiskImage::open(&args.disk)?;

    // Install requested bundles before the machine boots.
    for path in &args.import {
        let bundle = load_bundle_from_path(path)?;
        let installed = install_bundle(&bundle, &mut disk)?;
        eprintln!(
            "Installed bundle: {} ({} files)",
            bundle.manifest.name, installed
        );
    }

    // Batch mode: feed the lines, skip the terminal setup entirely.
    if !args.batch.is_empty() {
        let (_tx, rx) = mpsc::channel();
        let console = ChannelConsole::new(rx);
        let mut machine = Machine::new(console);
        machine.mount(disk);
        if let Some(name) = &args.load {
            machine.load_program(name)?;
        }
        for line in &args.batch {
            if handle_line(&mut machine, line) {
                break;
            }
        }
        return Ok(());
    }

    let (key_tx, key_rx) = mpsc::channel::<u8>();
    let (shutdown_tx, mut shutdown_rx) = tokio_mpsc::channel::<()>(1);
    let console = ChannelConsole::new(key_rx);

    let raw_mode_enabled = enable_raw_mode().is_ok();

    let load = args.load.clone();
    let machine_handle = tokio::task::spawn_blocking(move || {
        let mut machine = Machine::new(console);
        machine.mount(disk);
        if let Some(name) = &load {
            match machine.load_program(name) {
                Ok(filename) => machine
                    .console_mut()
                    .write_str(&format!("Loaded {filename}\n")),
                Err(e) => machine.console_mut().write_str(&format!("Error: {e}\n")),
            }
        }
        repl(&mut machine);
    });

    // Pump terminal key events into the machine's keyboard channel.
    let input_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    if event::poll(Duration::from_millis(0)).unwrap_or(false) {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if let Some(ch) = translate_key(key_event.code, key_event.modifiers) {
                                if key_tx.send(ch).is_err() {
                                    break; // machine gone
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    let result = machine_handle.await;

    let _ = shutdown_tx.send(()).await;
    let _ = input_handle.await;

    if raw_mode_enabled {
        let _ = disable_raw_mode();
    }

    result?;
    Ok(())
}
