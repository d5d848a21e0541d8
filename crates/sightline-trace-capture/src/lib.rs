//! Stack trace capture for snapshots.
//!
//! Capturing is split in two. [`capture_unresolved`] only walks the stack
//! and records instruction pointers, which is cheap enough for the
//! instrumented thread. [`UnresolvedStack::resolve`] symbolizes, filters,
//! and bounds the frames; it loads debug info on first use and belongs on a
//! background thread.

use std::error::Error;
use std::fmt;
use std::fmt::Write as _;
use std::num::NonZeroUsize;

/// Symbol prefixes that never belong in a rendered trace.
const INTERNAL_PREFIXES: &[&str] = &["backtrace::", "sightline_trace_capture::"];

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub max_frames: NonZeroUsize,
    /// Frames dropped from the top after internal frames are filtered.
    pub skip_frames: usize,
    /// Additional symbol prefixes to filter out (e.g. the caller's own
    /// instrumentation layers).
    pub skip_prefixes: &'static [&'static str],
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_frames: NonZeroUsize::MIN.saturating_add(63),
            skip_frames: 0,
            skip_prefixes: &[],
        }
    }
}

impl CaptureOptions {
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = NonZeroUsize::new(max_frames).unwrap_or(NonZeroUsize::MIN);
        self
    }
}

/// One symbolized frame. Inlined calls produce several entries sharing an ip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub ip: u64,
    pub symbol: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStack {
    pub frames: Vec<CapturedFrame>,
}

#[derive(Debug)]
pub enum CaptureError {
    EmptyBacktrace,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBacktrace => write!(f, "no frames left after filtering the captured backtrace"),
        }
    }
}

impl Error for CaptureError {}

/// Extra raw frames walked beyond `max_frames + skip_frames`, to leave room
/// for internal frames that are filtered out after symbolization.
const RAW_HEADROOM: usize = 32;

/// Instruction pointers of a walked stack, not yet symbolized.
#[derive(Debug, Clone)]
pub struct UnresolvedStack {
    ips: Vec<usize>,
    options: CaptureOptions,
}

/// Walks the current thread's stack without symbolizing it.
pub fn capture_unresolved(options: CaptureOptions) -> UnresolvedStack {
    let limit = options
        .max_frames
        .get()
        .saturating_add(options.skip_frames)
        .saturating_add(RAW_HEADROOM);
    let mut ips = Vec::new();
    backtrace::trace(|frame| {
        ips.push(frame.ip() as usize);
        ips.len() < limit
    });
    UnresolvedStack { ips, options }
}

/// Walks and symbolizes the current thread's stack in one go.
pub fn capture_current(options: CaptureOptions) -> Result<CapturedStack, CaptureError> {
    capture_unresolved(options).resolve()
}

impl UnresolvedStack {
    /// Number of raw frames walked.
    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    /// Symbolizes the walked frames, drops internal ones, then applies
    /// `skip_frames` and `max_frames`.
    pub fn resolve(&self) -> Result<CapturedStack, CaptureError> {
        let options = self.options;
        let mut frames = Vec::new();
        let mut skip_remaining = options.skip_frames;

        'walk: for &addr in &self.ips {
            let ip = addr as u64;
            let mut resolved = Vec::new();
            backtrace::resolve(addr as *mut std::ffi::c_void, |symbol| {
                resolved.push(CapturedFrame {
                    ip,
                    symbol: symbol.name().map(|name| format!("{name:#}")),
                    file: symbol.filename().map(|path| path.display().to_string()),
                    line: symbol.lineno(),
                });
            });
            if resolved.is_empty() {
                resolved.push(CapturedFrame {
                    ip,
                    symbol: None,
                    file: None,
                    line: None,
                });
            }

            for entry in resolved {
                if is_internal(entry.symbol.as_deref(), options.skip_prefixes) {
                    continue;
                }
                if skip_remaining > 0 {
                    skip_remaining -= 1;
                    continue;
                }
                if frames.len() >= options.max_frames.get() {
                    break 'walk;
                }
                frames.push(entry);
            }
        }

        if frames.is_empty() {
            return Err(CaptureError::EmptyBacktrace);
        }
        Ok(CapturedStack { frames })
    }

    /// Resolves and renders. Never fails: an empty capture renders as an
    /// empty string.
    pub fn render(&self) -> String {
        match self.resolve() {
            Ok(stack) => stack.render(),
            Err(_) => String::new(),
        }
    }
}

fn is_internal(symbol: Option<&str>, extra: &[&str]) -> bool {
    let Some(symbol) = symbol else {
        return false;
    };
    let symbol = symbol.trim_start_matches('<');
    INTERNAL_PREFIXES
        .iter()
        .chain(extra.iter())
        .any(|prefix| symbol.starts_with(prefix))
}

impl CapturedStack {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, frame) in self.frames.iter().enumerate() {
            let symbol = frame.symbol.as_deref().unwrap_or("<unknown>");
            let _ = writeln!(out, "{index:4}: {symbol}");
            match (&frame.file, frame.line) {
                (Some(file), Some(line)) => {
                    let _ = writeln!(out, "             at {file}:{line}");
                }
                (Some(file), None) => {
                    let _ = writeln!(out, "             at {file}");
                }
                _ => {
                    let _ = writeln!(out, "             at 0x{:x}", frame.ip);
                }
            }
        }
        out
    }
}
