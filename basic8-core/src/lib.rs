//! basic8 emulator core
//!
//! This crate provides the core components of an 8-bit home computer:
//! - A flat 64K memory image with a fixed region map
//! - A symbol table and tokenized BASIC program store living inside it
//! - A direct token executor with a pluggable text-parser fallback
//! - A 160KB virtual floppy with a FAT-style filesystem
//!
//! # Architecture
//!
//! The machine uses a layered design:
//! - `MemoryImage`: owns every byte; components mutate it through views
//! - `SymbolTable` / `ProgramStore` / `Screen`: region-scoped views
//! - `Console` trait: character I/O abstraction
//! - `StatementParser` trait: fallback for statements the fast path skips
//! - `Machine`: ties the views, executor, console and disk together

pub mod console;
pub mod disk;
pub mod error;
pub mod exec;
pub mod machine;
pub mod memory;
pub mod package;
pub mod program;
pub mod screen;
pub mod symbols;
pub mod tokens;

pub use console::{Console, HeadlessConsole};
pub use disk::{normalize_8_3, DiskImage};
pub use error::{Basic8Error, Basic8Result};
pub use exec::{Executed, Flow, NullParser, StatementParser};
pub use machine::Machine;
pub use memory::{region, MemoryImage, MEMORY_SIZE};
pub use package::{install_bundle, load_bundle, load_bundle_from_path, LoadedBundle};
pub use program::ProgramStore;
pub use screen::Screen;
pub use symbols::{SymbolEntry, SymbolTable};
pub use tokens::{detokenize, normalize_statement, tokenize};
