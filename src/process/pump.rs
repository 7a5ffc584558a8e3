// src/process/pump.rs

//! Output pump: drains a child's stdout and stderr as one line stream.

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

use crate::process::OutputLine;

/// OSC sequences (`ESC ] ... BEL` or `ESC ] ... ESC \`, e.g. window titles),
/// CSI sequences (`ESC [ ... final`) and two-byte `ESC x` escapes. OSC comes
/// first so its payload is not left behind by the two-byte branch.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:\][^\x07\x1B]*(?:\x07|\x1B\\)|[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])")
        .expect("valid ANSI regex")
});

/// Remove ANSI/VT100 escape sequences from `line`.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Strip escapes and stamp with the local wall-clock time.
pub fn output_line(raw: &str) -> OutputLine {
    OutputLine {
        received_at: Local::now(),
        text: strip_ansi(raw).into_owned(),
    }
}

/// Line reader tolerant of invalid UTF-8 and of being polled from `select!`:
/// partial reads stay in `buf` until the line is complete.
struct LineSource<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    name: &'static str,
}

impl<R: AsyncRead + Unpin> LineSource<R> {
    fn new(inner: R, name: &'static str) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            name,
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) if self.buf.is_empty() => None,
            Ok(_) => Some(self.take_line()),
            Err(e) => {
                warn!(stream = self.name, error = %e, "error reading process output");
                None
            }
        }
    }

    fn take_line(&mut self) -> String {
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

async fn next_from<R: AsyncRead + Unpin>(source: &mut Option<LineSource<R>>) -> Option<String> {
    match source {
        Some(src) => src.next_line().await,
        None => None,
    }
}

/// Forward every line of `stdout` and `stderr` to `sink` until both reach
/// EOF. Lines from the two streams are interleaved in arrival order; lines
/// within one stream keep their order.
pub async fn pump_lines<O, E, F>(stdout: Option<O>, stderr: Option<E>, mut sink: F)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    F: FnMut(OutputLine),
{
    let mut out = stdout.map(|s| LineSource::new(s, "stdout"));
    let mut err = stderr.map(|s| LineSource::new(s, "stderr"));

    loop {
        let (line, from_stdout) = tokio::select! {
            line = next_from(&mut out), if out.is_some() => (line, true),
            line = next_from(&mut err), if err.is_some() => (line, false),
            else => break,
        };

        match line {
            Some(raw) => sink(output_line(&raw)),
            None if from_stdout => out = None,
            None => err = None,
        }
    }
}
