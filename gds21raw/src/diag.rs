//!
//! # Diagnostics
//!
//! Human-readable reports of recoverable anomalies: missing references, unreadable files, and the like.
//! Every operation which may report takes a `&mut dyn Diagnostics` argument.
//! Whether and where reports go never affects control flow.
//!

// Std-Lib
use std::io::Write;

/// # Diagnostics Sink Trait
pub trait Diagnostics {
    /// Report a single diagnostic line
    fn report(&mut self, msg: &str);
}

/// # Log-Facade Diagnostics
/// Forwards each report to [log::warn!]. Where they land is up to the host's logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;
impl Diagnostics for LogDiagnostics {
    fn report(&mut self, msg: &str) {
        log::warn!("{}", msg);
    }
}

/// # Silent Diagnostics
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;
impl Diagnostics for NoDiagnostics {
    fn report(&mut self, _msg: &str) {}
}

/// # Stream Diagnostics
/// Writes each report as a tagged line to a text stream, e.g. [std::io::Stderr].
/// Write failures are ignored.
#[derive(Debug)]
pub struct StreamDiagnostics<W: Write> {
    dest: W,
}
impl<W: Write> StreamDiagnostics<W> {
    /// Create a [StreamDiagnostics] writing to `dest`
    pub fn new(dest: W) -> Self {
        Self { dest }
    }
    /// Consume ourselves, returning the destination stream
    pub fn into_inner(self) -> W {
        self.dest
    }
}
impl<W: Write> Diagnostics for StreamDiagnostics<W> {
    fn report(&mut self, msg: &str) {
        let _ = writeln!(self.dest, "[gds21raw] {}", msg);
    }
}

/// Collecting reports in a vector, largely for inspection in tests
impl Diagnostics for Vec<String> {
    fn report(&mut self, msg: &str) {
        self.push(msg.to_string());
    }
}
