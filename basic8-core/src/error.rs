//! Error types for the basic8 core.

use thiserror::Error;

/// Errors surfaced by the memory image, symbol table, program store,
/// token executor and virtual disk.
#[derive(Error, Debug)]
pub enum Basic8Error {
    #[error("Address out of range: ${0:04X}")]
    AddressOutOfRange(u32),

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Variable already defined: {0}")]
    DuplicateVariable(String),

    #[error("Variable storage full: cannot allocate {0} bytes")]
    VariableRegionFull(usize),

    #[error("Program memory full")]
    ProgramMemoryFull,

    #[error("No such line: {0}")]
    NoSuchLine(u16),

    #[error("Syntax error: {0}")]
    SyntaxError(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Runtime error at line {line}: {source}")]
    RuntimeAt {
        line: u16,
        #[source]
        source: Box<Basic8Error>,
    },

    #[error("Directory full")]
    DirectoryFull,

    #[error("Disk full: need {needed} sectors, {free} free")]
    DiskFull { needed: usize, free: usize },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No disk mounted")]
    DiskNotMounted,

    #[error("Bad disk image: {0}")]
    InvalidImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Basic8Result<T> = Result<T, Basic8Error>;
