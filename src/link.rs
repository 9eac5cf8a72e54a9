//! # Sensor Link Module
//!
//! Reads newline-terminated ASCII records from the sensor board and decodes
//! them into scaled 3-channel readings.
//!
//! ## Record Format
//! ```text
//! 0.012345 0.000000 0.431000 \n
//! ```
//! Three whitespace-separated decimal numbers, channel order 0, 1, 2. The board
//! prints in volts; every value is multiplied by the configured unit scale.
//!
//! ## Threading
//! `LinkReader::spawn` moves the blocking read onto a feeder thread that
//! forwards raw records over a channel. Decoding happens on the session side
//! so a rejected record never touches any state.

use crate::error::LinkError;
use crate::CHANNELS;
use crossbeam_channel::Sender;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::thread;

/// Raw records this short (terminator included) are line noise
const NOISE_RECORD_LEN: usize = 3;

/// Longest record kept; anything longer is cut here and discarded
pub const MAX_RECORD_LEN: usize = 4096;

/// Why a record was dropped instead of becoming a reading
#[derive(Debug, Clone, PartialEq)]
pub enum DiscardReason {
    /// Empty or near-empty read, dropped without a warning
    Noise,
    /// Record ran past `MAX_RECORD_LEN` without a terminator
    TooLong,
    /// Bytes were not valid UTF-8
    Decode,
    /// Wrong number of whitespace-separated tokens
    TokenCount(usize),
    /// A token was not a finite decimal number
    Number(String),
}

impl DiscardReason {
    /// Whether the discard should be reported
    pub fn is_silent(&self) -> bool {
        matches!(self, DiscardReason::Noise)
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::Noise => write!(f, "line noise"),
            DiscardReason::TooLong => {
                write!(f, "record longer than {} bytes", MAX_RECORD_LEN)
            }
            DiscardReason::Decode => write!(f, "record is not valid UTF-8"),
            DiscardReason::TokenCount(n) => {
                write!(f, "expected {} values, found {}", CHANNELS, n)
            }
            DiscardReason::Number(token) => write!(f, "bad value {:?}", token),
        }
    }
}

/// Decode one raw record into scaled channel values
pub fn parse_record(raw: &[u8], unit_scale: f64) -> Result<[f64; CHANNELS], DiscardReason> {
    if raw.len() <= NOISE_RECORD_LEN {
        return Err(DiscardReason::Noise);
    }
    if raw.len() > MAX_RECORD_LEN {
        return Err(DiscardReason::TooLong);
    }

    let text = std::str::from_utf8(raw).map_err(|_| DiscardReason::Decode)?;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != CHANNELS {
        return Err(DiscardReason::TokenCount(tokens.len()));
    }

    let mut values = [0.0; CHANNELS];
    for (slot, token) in values.iter_mut().zip(tokens) {
        let value: f64 = token
            .parse()
            .map_err(|_| DiscardReason::Number(token.to_string()))?;
        if !value.is_finite() {
            return Err(DiscardReason::Number(token.to_string()));
        }
        *slot = value * unit_scale;
    }

    Ok(values)
}

/// Messages from the feeder thread to the session
#[derive(Debug)]
pub enum LinkEvent {
    Record(Vec<u8>),
    /// End of stream, the board or pipe went away cleanly
    Closed,
    Failed(LinkError),
}

/// Blocking line reader over the sensor link
pub struct LinkReader<R> {
    inner: R,
    path: PathBuf,
}

impl LinkReader<Box<dyn BufRead + Send>> {
    /// Open the link device, or standard input for `-`
    pub fn open(path: &Path) -> Result<Self, LinkError> {
        let inner: Box<dyn BufRead + Send> = if path == Path::new("-") {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(path).map_err(|source| LinkError::Unavailable {
                path: path.to_path_buf(),
                source,
            })?;
            Box::new(BufReader::new(file))
        };

        log::info!("Opened sensor link {}", path.display());
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

impl<R: BufRead> LinkReader<R> {
    #[allow(dead_code)]
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    /// Block until one record is available.
    ///
    /// Returns `Ok(None)` at end of stream. A record is never longer than
    /// `MAX_RECORD_LEN + 1` bytes: past that the rest of the line is skipped
    /// and the truncated bytes are returned for the decoder to reject.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        let mut line = Vec::new();
        loop {
            let limit = (MAX_RECORD_LEN + 1 - line.len()) as u64;
            match (&mut self.inner).take(limit).read_until(b'\n', &mut line) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(LinkError::Read(e)),
            }
        }

        if line.is_empty() {
            return Ok(None);
        }
        if line.len() > MAX_RECORD_LEN && line.last() != Some(&b'\n') {
            self.skip_line().map_err(LinkError::Read)?;
        }
        Ok(Some(line))
    }

    /// Drop input up to and including the next terminator, without buffering it
    fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let (found, used) = {
                let buf = match self.inner.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                if buf.is_empty() {
                    return Ok(());
                }
                match buf.iter().position(|&b| b == b'\n') {
                    Some(i) => (true, i + 1),
                    None => (false, buf.len()),
                }
            };
            self.inner.consume(used);
            if found {
                return Ok(());
            }
        }
    }
}

impl<R: BufRead + Send + 'static> LinkReader<R> {
    /// Move the reader onto its own thread, forwarding records to `sender`.
    ///
    /// The thread exits at end of stream, on a read error, or once the
    /// receiving session is gone.
    pub fn spawn(mut self, sender: Sender<LinkEvent>) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("link-reader".into())
            .spawn(move || loop {
                let event = match self.read_record() {
                    Ok(Some(record)) => LinkEvent::Record(record),
                    Ok(None) => {
                        log::info!("Sensor link {} closed", self.path.display());
                        let _ = sender.send(LinkEvent::Closed);
                        break;
                    }
                    Err(e) => {
                        let _ = sender.send(LinkEvent::Failed(e));
                        break;
                    }
                };
                if sender.send(event).is_err() {
                    log::debug!("Link reader: session gone, stopping");
                    break;
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_record_scales_values() {
        let values = parse_record(b"0.1 0.25 1.5 \r\n", 10.0).unwrap();
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[1] - 2.5).abs() < 1e-12);
        assert!((values[2] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_lines_are_silent_noise() {
        assert_eq!(parse_record(b"", 10.0), Err(DiscardReason::Noise));
        assert_eq!(parse_record(b"\r\n", 10.0), Err(DiscardReason::Noise));
        assert_eq!(parse_record(b"1 \n", 10.0), Err(DiscardReason::Noise));
        assert!(DiscardReason::Noise.is_silent());
    }

    #[test]
    fn test_malformed_records() {
        assert_eq!(
            parse_record(b"1.0 abc 2.0\n", 1.0),
            Err(DiscardReason::Number("abc".to_string()))
        );
        assert_eq!(parse_record(b"1.0 2.0\n", 1.0), Err(DiscardReason::TokenCount(2)));
        assert_eq!(
            parse_record(b"1.0 2.0 3.0 4.0\n", 1.0),
            Err(DiscardReason::TokenCount(4))
        );
        assert_eq!(parse_record(b"1.0 \xff\xfe 2.0\n", 1.0), Err(DiscardReason::Decode));
        assert_eq!(
            parse_record(b"1.0 nan 2.0\n", 1.0),
            Err(DiscardReason::Number("nan".to_string()))
        );
        assert!(!DiscardReason::TokenCount(2).is_silent());
    }

    #[test]
    fn test_read_record_splits_lines() {
        let mut reader = LinkReader::new(Cursor::new(b"1 2 3\n4 5 6\n7 8".to_vec()), "test");
        assert_eq!(reader.read_record().unwrap().unwrap(), b"1 2 3\n");
        assert_eq!(reader.read_record().unwrap().unwrap(), b"4 5 6\n");
        assert_eq!(reader.read_record().unwrap().unwrap(), b"7 8");
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_overlong_record_is_capped_and_skipped() {
        let mut stream = vec![b'x'; 100_000];
        stream.extend_from_slice(b"\n1 2 3\n");
        let mut reader = LinkReader::new(Cursor::new(stream), "test");

        let overlong = reader.read_record().unwrap().unwrap();
        assert_eq!(overlong.len(), MAX_RECORD_LEN + 1);
        assert_eq!(parse_record(&overlong, 1.0), Err(DiscardReason::TooLong));
        assert!(!DiscardReason::TooLong.is_silent());

        // Resynchronised on the next line
        assert_eq!(reader.read_record().unwrap().unwrap(), b"1 2 3\n");
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_unterminated_stream_stays_bounded() {
        let mut reader = LinkReader::new(Cursor::new(vec![b'7'; 1 << 20]), "test");
        let record = reader.read_record().unwrap().unwrap();
        assert!(record.len() <= MAX_RECORD_LEN + 1);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_open_missing_device_is_unavailable() {
        let result = LinkReader::open(Path::new("/definitely/not/a/device"));
        assert!(matches!(result, Err(LinkError::Unavailable { .. })));
    }

    #[test]
    fn test_spawned_reader_forwards_then_closes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reader = LinkReader::new(Cursor::new(b"1 2 3\n".to_vec()), "test");
        let handle = reader.spawn(tx).unwrap();

        assert!(matches!(rx.recv().unwrap(), LinkEvent::Record(r) if r == b"1 2 3\n"));
        assert!(matches!(rx.recv().unwrap(), LinkEvent::Closed));
        handle.join().unwrap();
    }
}
