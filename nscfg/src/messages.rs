//! Numbered user-facing messages and the console that prints them.

use std::fmt;
use std::path::Path;

use crate::schema::ParseError;

/// Every message the command prints. Numbers are stable.
#[derive(Debug)]
pub enum Message<'a> {
    IllegalFmri { fmri: &'a str },
    AlreadyConfigured { fmri: &'a str },
    Imported { fmri: &'a str },
    NoLegacyConfig { fmri: &'a str },
    Exported { fmri: &'a str },
    Unchanged { fmri: &'a str },
    Unconfigured { fmri: &'a str },
    Validated { fmri: &'a str },
    BadValue { path: &'a Path, error: &'a ParseError },
    Failed { operation: &'a str, fmri: &'a str, cause: String },
    NoWrite { fmri: &'a str },
}

impl Message<'_> {
    pub fn number(&self) -> u32 {
        match self {
            Message::IllegalFmri { .. } => 1,
            Message::AlreadyConfigured { .. } => 2,
            Message::Imported { .. } => 3,
            Message::NoLegacyConfig { .. } => 4,
            Message::Exported { .. } => 5,
            Message::Unchanged { .. } => 6,
            Message::Unconfigured { .. } => 7,
            Message::Validated { .. } => 8,
            Message::BadValue { .. } => 9,
            Message::Failed { .. } => 10,
            Message::NoWrite { .. } => 11,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Message::IllegalFmri { .. } | Message::BadValue { .. } | Message::Failed { .. }
        )
    }
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nscfg[{}]: ", self.number())?;
        match self {
            Message::IllegalFmri { fmri } => write!(f, "illegal FMRI: {fmri}"),
            Message::AlreadyConfigured { fmri } => {
                write!(f, "{fmri} is already configured, use -f to import anyway")
            }
            Message::Imported { fmri } => write!(f, "imported legacy configuration into {fmri}"),
            Message::NoLegacyConfig { fmri } => {
                write!(f, "no legacy configuration to import for {fmri}")
            }
            Message::Exported { fmri } => write!(f, "exported {fmri} to its legacy file"),
            Message::Unchanged { fmri } => write!(f, "legacy file for {fmri} is up to date"),
            Message::Unconfigured { fmri } => write!(f, "reset {fmri} to its defaults"),
            Message::Validated { fmri } => write!(f, "{fmri} is valid"),
            Message::BadValue { path, error } => write!(f, "{}: {error}", path.display()),
            Message::Failed {
                operation,
                fmri,
                cause,
            } => write!(f, "{operation} of {fmri} failed: {cause}"),
            Message::NoWrite { fmri } => write!(f, "no-write: {fmri} left untouched"),
        }
    }
}

/// Prints messages. Errors always go to stderr; the rest only when not quiet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    quiet: bool,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Whether `message` would be printed.
    pub fn shows(&self, message: &Message) -> bool {
        message.is_error() || !self.quiet
    }

    pub fn report(&self, message: Message) {
        if !self.shows(&message) {
            return;
        }
        if message.is_error() {
            eprintln!("{message}");
        } else {
            println!("{message}");
        }
    }
}
