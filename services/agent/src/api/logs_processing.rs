//! Log file extraction: reverse reading, paging, and compression.
//!
//! Log files are append-only and every line starts with a
//! `YYYY-MM-DD HH:MM:SS,mmm` prefix, so plain string comparison of a line
//! against a timestamp of the same shape orders lines chronologically.
//! Extraction reads the file backward in fixed-size chunks, selects lines
//! strictly newer than `since`, and accumulates oldest-first until the
//! size bound is hit.

use std::cmp::min;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::Local;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use serde::Serialize;

use crate::store::model::CompressionAlg;

/// Chunk size for backward reads.
const REVERSE_BUF_SIZE: u64 = 8192;

/// Length of the timestamp prefix (`1970-01-01 00:00:00,000`).
pub const DATETIME_LEN: usize = 23;

/// Lines selected for one page of a log endpoint.
#[derive(Debug)]
pub struct ExtractedLines {
    /// Selected lines, oldest first, newline-terminated.
    pub lines: String,

    /// Timestamp prefix of the newest selected line; resume point for the
    /// next page.
    pub last_datetime: Option<String>,

    /// Whether the size bound cut the selection short.
    pub more_data: bool,
}

/// Iterator over the lines of a file, newest first.
pub struct ReverseLines {
    file: std::fs::File,
    file_size: u64,
    remaining: i64,
    offset: u64,
    segment: Option<Vec<u8>>,
    pending: Vec<Vec<u8>>,
    finished: bool,
}

impl ReverseLines {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            file_size,
            remaining: file_size as i64,
            offset: 0,
            segment: None,
            pending: Vec::new(),
            finished: false,
        })
    }

    fn load_chunk(&mut self) -> io::Result<()> {
        self.offset = min(self.file_size, self.offset + REVERSE_BUF_SIZE);
        self.file.seek(SeekFrom::Start(self.file_size - self.offset))?;

        let to_read = min(self.remaining as u64, REVERSE_BUF_SIZE) as usize;
        let mut buffer = vec![0u8; to_read];
        self.file.read_exact(&mut buffer)?;

        // The file's trailing newline is not a line of its own.
        if self.remaining as u64 == self.file_size && buffer.last() == Some(&b'\n') {
            buffer.pop();
        }
        self.remaining -= REVERSE_BUF_SIZE as i64;

        let mut lines: Vec<Vec<u8>> = buffer.split(|b| *b == b'\n').map(<[u8]>::to_vec).collect();
        // The previous chunk's leading fragment continues this chunk's
        // last line; this chunk's first fragment carries over in turn.
        if let Some(segment) = self.segment.take() {
            if let Some(last) = lines.last_mut() {
                last.extend(segment);
            }
        }
        self.segment = Some(lines.remove(0));
        self.pending = lines;
        Ok(())
    }
}

impl Iterator for ReverseLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop() {
                return Some(Ok(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.finished {
                return None;
            }
            if self.remaining > 0 {
                if let Err(e) = self.load_chunk() {
                    self.finished = true;
                    return Some(Err(e));
                }
            } else {
                self.finished = true;
                if let Some(segment) = self.segment.take() {
                    return Some(Ok(String::from_utf8_lossy(&segment).into_owned()));
                }
                return None;
            }
        }
    }
}

/// All lines strictly newer than `since`, newest first.
///
/// The `~` sentinel makes the boundary exclusive: `~` sorts above every
/// character a timestamp can contain, so a line equal to `since` (or
/// merely extending it) never matches.
pub fn find_lines_since(path: &Path, since: &str) -> io::Result<Vec<String>> {
    let boundary = format!("{since}~");
    let mut matched = Vec::new();
    for line in ReverseLines::open(path)? {
        let line = line?;
        if line.as_str() > boundary.as_str() {
            matched.push(line);
        }
    }
    Ok(matched)
}

/// Accumulate matched lines (oldest first) while the page stays within
/// `max_size` characters.
pub fn select_lines_until_limit(lines: &[String], max_size: usize) -> ExtractedLines {
    let mut data = String::new();
    let mut last_datetime = None;
    let mut more_data = false;

    for line in lines.iter().rev() {
        if data.len() + line.len() <= max_size {
            data.push_str(line);
            data.push('\n');
            last_datetime = Some(line.chars().take(DATETIME_LEN).collect::<String>());
        } else {
            more_data = true;
            break;
        }
    }

    ExtractedLines {
        lines: data,
        last_datetime,
        more_data,
    }
}

/// One page of a log file, optionally compressed.
pub fn get_lines_from_file(
    path: &Path,
    since: &str,
    max_size: usize,
    compression_alg: Option<CompressionAlg>,
) -> io::Result<ExtractedLines> {
    let matched = find_lines_since(path, since)?;
    let mut extracted = select_lines_until_limit(&matched, max_size);
    if let Some(alg) = compression_alg {
        extracted.lines = compress_data(&extracted.lines, alg)?;
    }
    Ok(extracted)
}

// ---------------------------------------------------------------------------
// Compression
// ---------------------------------------------------------------------------

const BASE85_ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

fn base85_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(4) * 5);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = BASE85_ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        for &digit in &digits[..chunk.len() + 1] {
            out.push(digit as char);
        }
    }
    out
}

fn base85_decode(data: &str) -> Result<Vec<u8>, String> {
    let bytes = data.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 5 * 4 + 4);
    for chunk in bytes.chunks(5) {
        if chunk.len() == 1 {
            return Err("truncated base85 group".to_string());
        }
        let mut value: u64 = 0;
        for i in 0..5 {
            // Short groups are padded with the highest digit; the padded
            // positions fall outside the kept bytes.
            let c = chunk.get(i).copied().unwrap_or(b'~');
            let digit = BASE85_ALPHABET
                .iter()
                .position(|&a| a == c)
                .ok_or_else(|| format!("invalid base85 character '{}'", c as char))?;
            value = value * 85 + digit as u64;
        }
        if value > u64::from(u32::MAX) {
            return Err("base85 group out of range".to_string());
        }
        let word = (value as u32).to_be_bytes();
        out.extend_from_slice(&word[..chunk.len() - 1]);
    }
    Ok(out)
}

/// Compress a page with the selected algorithm.
pub fn compress_data(data: &str, algorithm: CompressionAlg) -> io::Result<String> {
    match algorithm {
        CompressionAlg::ZlibBase85 => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data.as_bytes())?;
            Ok(base85_encode(&encoder.finish()?))
        }
    }
}

/// Inverse of [`compress_data`].
pub fn decompress_data(data: &str, algorithm: CompressionAlg) -> Result<String, String> {
    match algorithm {
        CompressionAlg::ZlibBase85 => {
            let binary = base85_decode(data)?;
            let mut decoder = ZlibDecoder::new(Vec::new());
            decoder
                .write_all(&binary)
                .and_then(|()| decoder.finish())
                .map_err(|e| format!("zlib inflate failed: {e}"))
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|_| "decompressed data is not utf-8".to_string())
                })
        }
    }
}

// ---------------------------------------------------------------------------
// Severity statistics
// ---------------------------------------------------------------------------

/// Severity counters over the tail of a log file.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct LogCounters {
    pub debug: u64,
    pub info: u64,
    pub warning: u64,
    pub error: u64,
    pub critical: u64,
    pub unknown: u64,
}

fn detect_severity(line: &str) -> &'static str {
    const TOKENS: &[(&str, &str)] = &[
        ("DEBUG", "debug"),
        ("TRACE", "debug"),
        ("INFO", "info"),
        ("WARNING", "warning"),
        ("WARN", "warning"),
        ("ERROR", "error"),
        ("CRITICAL", "critical"),
    ];
    for (token, label) in TOKENS {
        if line.contains(token) {
            return label;
        }
    }
    "unknown"
}

/// Bucket the lines of the last `delta_minutes` by severity.
pub fn statistics(path: &Path, delta_minutes: i64) -> io::Result<LogCounters> {
    let threshold = (Local::now() - chrono::Duration::minutes(delta_minutes))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let mut counters = LogCounters::default();
    for line in ReverseLines::open(path)? {
        let line = line?;
        if line.as_str() <= threshold.as_str() {
            break;
        }
        match detect_severity(&line) {
            "debug" => counters.debug += 1,
            "info" => counters.info += 1,
            "warning" => counters.warning += 1,
            "error" => counters.error += 1,
            "critical" => counters.critical += 1,
            _ => counters.unknown += 1,
        }
    }
    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_file(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        (dir, path)
    }

    fn stamped(offset_secs: u64, level: &str, message: &str) -> String {
        format!("2025-06-01 10:00:{offset_secs:02},000 {level} netmon_agent: {message}")
    }

    #[test]
    fn reverse_reader_inverts_the_file() {
        let lines: Vec<String> = (0..50).map(|i| stamped(i, "INFO", &format!("line {i}"))).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_dir, path) = write_file(&refs);

        let mut collected: Vec<String> =
            ReverseLines::open(&path).unwrap().map(|l| l.unwrap()).collect();
        collected.reverse();
        assert_eq!(collected, lines);
    }

    #[test]
    fn reverse_reader_handles_lines_spanning_chunks() {
        // One line far larger than the read chunk.
        let long = format!("2025-06-01 10:00:00,000 INFO x{}", "y".repeat(3 * 8192));
        let (_dir, path) = write_file(&[&long, "2025-06-01 10:00:01,000 INFO tail"]);

        let collected: Vec<String> =
            ReverseLines::open(&path).unwrap().map(|l| l.unwrap()).collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1], long);
    }

    #[test]
    fn reverse_reader_of_empty_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "").unwrap();
        assert_eq!(ReverseLines::open(&path).unwrap().count(), 0);
    }

    #[test]
    fn since_boundary_is_exclusive() {
        let first = stamped(0, "INFO", "first");
        let second = stamped(1, "INFO", "second");
        let (_dir, path) = write_file(&[&first, &second]);

        // Asking since the first line's timestamp must not return the
        // first line itself, even though it extends the boundary string.
        let since = &first[..DATETIME_LEN];
        let matched = find_lines_since(&path, since).unwrap();
        assert_eq!(matched, vec![second]);
    }

    #[test]
    fn selection_accumulates_oldest_first_within_the_limit() {
        let lines: Vec<String> = (0..5).map(|i| stamped(i, "INFO", "x")).collect();
        let matched: Vec<String> = lines.iter().rev().cloned().collect();

        let line_len = lines[0].len() + 1;
        let extracted = select_lines_until_limit(&matched, line_len * 3);
        assert!(extracted.more_data);
        assert_eq!(
            extracted.lines,
            format!("{}\n{}\n{}\n", lines[0], lines[1], lines[2])
        );
        // Resume point is the newest returned line.
        assert_eq!(extracted.last_datetime.as_deref(), Some(&lines[2][..DATETIME_LEN]));
    }

    #[test]
    fn first_line_too_big_returns_empty_with_more_data() {
        let matched = vec![stamped(0, "INFO", "does not fit")];
        let extracted = select_lines_until_limit(&matched, 10);
        assert!(extracted.more_data);
        assert!(extracted.lines.is_empty());
        assert!(extracted.last_datetime.is_none());
    }

    #[test]
    fn paging_walks_the_whole_file(){
        let lines: Vec<String> = (0..20).map(|i| stamped(i, "INFO", "payload")).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_dir, path) = write_file(&refs);

        let mut since = "1970-01-01".to_string();
        let mut collected = String::new();
        loop {
            let page = get_lines_from_file(&path, &since, 250, None).unwrap();
            collected.push_str(&page.lines);
            if !page.more_data {
                break;
            }
            since = page.last_datetime.unwrap();
        }
        assert_eq!(collected, lines.join("\n") + "\n");
    }

    #[test]
    fn base85_round_trips_all_lengths() {
        for len in 0..20 {
            let data: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            let encoded = base85_encode(&data);
            assert_eq!(base85_decode(&encoded).unwrap(), data, "length {len}");
        }
    }

    #[test]
    fn base85_rejects_foreign_characters() {
        assert!(base85_decode("ab\"cd").is_err());
    }

    #[test]
    fn compression_round_trips() {
        let payload = stamped(0, "INFO", "compress me").repeat(100);
        let compressed = compress_data(&payload, CompressionAlg::ZlibBase85).unwrap();
        assert!(compressed.len() < payload.len());
        assert_eq!(
            decompress_data(&compressed, CompressionAlg::ZlibBase85).unwrap(),
            payload
        );
    }

    #[test]
    fn severity_statistics_bucket_recent_lines() {
        let now = Local::now();
        let recent = |level: &str, i: i64| {
            format!(
                "{} {level} netmon_agent: message {i}",
                (now - chrono::Duration::seconds(30 + i)).format("%Y-%m-%d %H:%M:%S,%3f")
            )
        };
        let lines = vec![
            "2000-01-01 00:00:00,000 ERROR netmon_agent: ancient".to_string(),
            recent("DEBUG", 5),
            recent("INFO", 4),
            recent("INFO", 3),
            recent("WARN", 2),
            recent("ERROR", 1),
            "untagged line without a level".to_string(),
        ];
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let (_dir, path) = write_file(&refs);

        // The reverse scan counts the untagged trailing line (it sorts
        // above the threshold) and stops at the ancient error.
        let counters = statistics(&path, 10).unwrap();
        assert_eq!(
            counters,
            LogCounters {
                debug: 1,
                info: 2,
                warning: 1,
                error: 1,
                critical: 0,
                unknown: 1,
            }
        );
    }
}
