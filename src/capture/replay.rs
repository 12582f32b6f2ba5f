//! File-backed capture sources
//!
//! Development stand-ins for the scanner driver: [`ReplaySource`] turns a
//! list of scan image files into a capture event stream, and
//! [`InteractiveSource`] prompts on stdin for one scan file per "finger
//! press", blocking indefinitely the way a real reader waits for a touch.
//!
//! Scan files are binary PGM (P5) grayscale images.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{CaptureEvent, CaptureSource};
use crate::biometric::RawSample;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read scan file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Load one scan file as a raw sample.
pub fn load_scan(path: &Path) -> Result<RawSample, ReplayError> {
    let bytes = fs::read(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_pgm(&bytes).map_err(|reason| ReplayError::Malformed {
        path: path.to_path_buf(),
        reason,
    })
}

/// Decode a binary PGM (P5) image with an 8-bit maxval.
fn decode_pgm(bytes: &[u8]) -> Result<RawSample, String> {
    let mut pos = 0usize;

    let magic = next_token(bytes, &mut pos).ok_or("empty file")?;
    if magic != b"P5" {
        return Err("not a binary PGM (P5) image".into());
    }

    let width = parse_dimension(next_token(bytes, &mut pos), "width")?;
    let height = parse_dimension(next_token(bytes, &mut pos), "height")?;
    let maxval = parse_dimension(next_token(bytes, &mut pos), "maxval")?;
    if maxval == 0 || maxval > 255 {
        return Err(format!("unsupported maxval {maxval}, expected 1..=255"));
    }

    // The header ends with exactly one whitespace byte before the raster
    let raster = &bytes[pos..];
    let expected = width as usize * height as usize;
    if raster.len() < expected {
        return Err(format!(
            "truncated raster: {} bytes, expected {}",
            raster.len(),
            expected
        ));
    }

    RawSample::new(width, height, raster[..expected].to_vec()).map_err(|e| e.to_string())
}

/// Next header token, skipping whitespace and `#` comment lines. Leaves
/// `pos` one byte past the token's trailing whitespace.
fn next_token<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }

    if *pos >= bytes.len() {
        return None;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    let end = *pos;
    if *pos < bytes.len() {
        // consume the single separator after the token
        *pos += 1;
    }
    Some(&bytes[start..end])
}

fn parse_dimension(token: Option<&[u8]>, name: &str) -> Result<u32, String> {
    let token = token.ok_or_else(|| format!("missing {name}"))?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| format!("invalid {name}"))
}

/// Replays scan files as a capture event stream: one touch/capture/lift
/// cycle per file, then a reader disconnect.
pub struct ReplaySource {
    events: VecDeque<CaptureEvent>,
}

impl ReplaySource {
    pub fn from_files(paths: &[PathBuf]) -> Result<Self, ReplayError> {
        let mut events = VecDeque::new();
        events.push_back(CaptureEvent::ReaderConnected("replay".into()));
        for path in paths {
            let sample = load_scan(path)?;
            log::debug!(
                "loaded scan {} ({}x{})",
                path.display(),
                sample.width(),
                sample.height()
            );
            events.push_back(CaptureEvent::FingerTouched);
            events.push_back(CaptureEvent::SampleCaptured(sample));
            events.push_back(CaptureEvent::FingerLifted);
        }
        events.push_back(CaptureEvent::ReaderDisconnected("replay".into()));
        Ok(Self { events })
    }
}

impl CaptureSource for ReplaySource {
    fn next_event(&mut self) -> Option<CaptureEvent> {
        self.events.pop_front()
    }
}

/// Prompts on stdin for scan file paths, one per finger press.
///
/// An empty line or EOF reads as unplugging the reader.
pub struct InteractiveSource {
    pending: VecDeque<CaptureEvent>,
    closed: bool,
}

impl InteractiveSource {
    pub fn new() -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(CaptureEvent::ReaderConnected("console".into()));
        Self {
            pending,
            closed: false,
        }
    }
}

impl Default for InteractiveSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for InteractiveSource {
    fn next_event(&mut self) -> Option<CaptureEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.closed {
            return None;
        }

        loop {
            eprint!("scan file (empty line to stop)> ");
            let _ = io::stderr().flush();

            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line);
            let path = line.trim();
            if matches!(read, Err(_) | Ok(0)) || path.is_empty() {
                self.closed = true;
                return Some(CaptureEvent::ReaderDisconnected("console".into()));
            }

            match load_scan(Path::new(path)) {
                Ok(sample) => {
                    self.pending.push_back(CaptureEvent::SampleCaptured(sample));
                    self.pending.push_back(CaptureEvent::FingerLifted);
                    return Some(CaptureEvent::FingerTouched);
                }
                Err(e) => {
                    log::warn!("scan not usable: {e}");
                    eprintln!("could not read that scan, try another file");
                }
            }
        }
    }
}
