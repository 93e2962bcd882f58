use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

// @module: Subtitle data model and SRT serialization

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2,}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2,}):(\d{2}):(\d{2}),(\d{3})").unwrap()
});

/// A single word with its aligned time range and confidence.
///
/// Produced by the forced-alignment stage and immutable afterwards. Word
/// timings cannot be represented in the SRT format, so they travel as a
/// side-channel on progress events rather than in the subtitle file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordTiming {
    /// Word text
    pub text: String,

    /// Start time in ms
    pub start_time_ms: u64,

    /// End time in ms
    pub end_time_ms: u64,

    /// Alignment confidence in [0, 1]
    pub confidence: f32,
}

/// Single subtitle entry (one cue in the file)
#[derive(Debug, Clone)]
pub struct SubtitleEntry {
    /// Sequence number, 1-based
    pub seq_num: usize,

    /// Start time in ms
    pub start_time_ms: u64,

    /// End time in ms
    pub end_time_ms: u64,

    /// Subtitle text, possibly multi-line
    pub text: String,

    /// Per-word timestamps, empty unless the entry came out of alignment
    pub words: Vec<WordTiming>,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry without word timings
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: String) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text,
            words: Vec::new(),
        }
    }

    /// Creates an entry from aligned words; start/end derive from the first
    /// and last word
    pub fn from_words(seq_num: usize, words: Vec<WordTiming>) -> Result<Self> {
        let first = words
            .first()
            .ok_or_else(|| anyhow!("Cannot build entry {} from an empty word list", seq_num))?;
        let last = words.last().expect("non-empty checked above");

        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(SubtitleEntry {
            seq_num,
            start_time_ms: first.start_time_ms,
            end_time_ms: last.end_time_ms,
            text,
            words,
        })
    }

    // @creates: Validated subtitle entry
    // @validates: Time range and non-empty text
    pub fn new_validated(
        seq_num: usize,
        start_time_ms: u64,
        end_time_ms: u64,
        text: String,
    ) -> Result<Self> {
        if end_time_ms <= start_time_ms {
            return Err(anyhow!(
                "Invalid time range: end time {} <= start time {}",
                end_time_ms,
                start_time_ms
            ));
        }

        let trimmed_text = text.trim();
        if trimmed_text.is_empty() {
            return Err(anyhow!("Empty subtitle text for entry {}", seq_num));
        }

        Ok(SubtitleEntry::new(
            seq_num,
            start_time_ms,
            end_time_ms,
            trimmed_text.to_string(),
        ))
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
        let parts: Vec<&str> = timestamp.split(&[':', ','][..]).collect();

        if parts.len() != 4 {
            return Err(anyhow!("Invalid timestamp format: {}", timestamp));
        }

        let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
        let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
        let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
        let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// An ordered subtitle track with language metadata
#[derive(Debug)]
pub struct SubtitleTrack {
    /// File the track was parsed from or will be written to
    pub source_file: PathBuf,

    /// Ordered entries, non-decreasing start times
    pub entries: Vec<SubtitleEntry>,

    /// Language tag of the track text
    pub language: String,
}

impl SubtitleTrack {
    /// Create an empty track
    pub fn new(source_file: PathBuf, language: String) -> Self {
        SubtitleTrack {
            source_file,
            entries: Vec::new(),
            language,
        }
    }

    /// Parse an SRT file from disk
    pub fn from_srt_file<P: AsRef<Path>>(path: P, language: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read subtitle file: {}", path.display()))?;

        let entries = Self::parse_srt_string(&content)?;

        Ok(SubtitleTrack {
            source_file: path.to_path_buf(),
            entries,
            language: language.to_string(),
        })
    }

    /// Parse SRT format string into subtitle entries.
    ///
    /// Accepts a leading UTF-8 BOM, CRLF and LF line endings, and trailing
    /// blank lines. Entries are sorted by start time and renumbered densely
    /// from 1; invalid cues are skipped with a warning.
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let mut entries = Vec::new();

        let mut current_seq_num: Option<usize> = None;
        let mut current_start_time_ms: Option<u64> = None;
        let mut current_end_time_ms: Option<u64> = None;
        let mut current_text = String::new();
        let mut line_count = 0;

        let mut add_current_entry = |seq_num: usize, start_ms: u64, end_ms: u64, text: &str| {
            match SubtitleEntry::new_validated(seq_num, start_ms, end_ms, text.trim_end().to_string()) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping invalid subtitle entry {}: {}", seq_num, e),
            }
        };

        for line in content.lines() {
            line_count += 1;
            // lines() strips LF; strip the CR a CRLF file leaves behind
            let trimmed = line.trim_end_matches('\r').trim();

            if trimmed.is_empty() {
                if let (Some(seq_num), Some(start_ms), Some(end_ms)) =
                    (current_seq_num, current_start_time_ms, current_end_time_ms)
                {
                    if !current_text.is_empty() {
                        add_current_entry(seq_num, start_ms, end_ms, &current_text);
                    }
                    current_seq_num = None;
                    current_start_time_ms = None;
                    current_end_time_ms = None;
                    current_text.clear();
                }
                continue;
            }

            // Sequence number opens a new cue
            if current_seq_num.is_none() && current_text.is_empty() {
                if let Ok(num) = trimmed.parse::<usize>() {
                    current_seq_num = Some(num);
                    continue;
                }
            }

            // Timestamp line follows the sequence number
            if current_seq_num.is_some()
                && current_start_time_ms.is_none()
                && current_end_time_ms.is_none()
            {
                if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                    match (
                        Self::parse_timestamp_captures(&caps, 1),
                        Self::parse_timestamp_captures(&caps, 5),
                    ) {
                        (Ok(start_ms), Ok(end_ms)) => {
                            current_start_time_ms = Some(start_ms);
                            current_end_time_ms = Some(end_ms);
                            continue;
                        }
                        _ => {
                            warn!("Invalid timestamp format at line {}: {}", line_count, trimmed);
                        }
                    }
                }
            }

            if current_seq_num.is_some()
                && current_start_time_ms.is_some()
                && current_end_time_ms.is_some()
            {
                if !current_text.is_empty() {
                    current_text.push('\n');
                }
                current_text.push_str(trimmed);
            } else {
                warn!(
                    "Unexpected text at line {} before sequence number or timestamp: {}",
                    line_count, trimmed
                );
            }
        }

        // Final cue when the file has no trailing blank line
        if let (Some(seq_num), Some(start_ms), Some(end_ms)) =
            (current_seq_num, current_start_time_ms, current_end_time_ms)
        {
            if !current_text.is_empty() {
                add_current_entry(seq_num, start_ms, end_ms, &current_text);
            }
        }

        if entries.is_empty() {
            return Err(anyhow!("No valid subtitle entries were found in the SRT content"));
        }

        entries.sort_by_key(|entry| entry.start_time_ms);

        let overlap_count = entries
            .windows(2)
            .filter(|w| w[0].end_time_ms > w[1].start_time_ms)
            .count();
        if overlap_count > 0 {
            warn!("Found {} overlapping subtitle entries", overlap_count);
        }

        // Renumber densely from 1
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.seq_num = i + 1;
        }

        Ok(entries)
    }

    fn parse_timestamp_captures(caps: &regex::Captures, start_idx: usize) -> Result<u64> {
        let field = |idx: usize| -> Result<u64> {
            caps.get(idx)
                .ok_or_else(|| anyhow!("Missing timestamp capture group {}", idx))?
                .as_str()
                .parse::<u64>()
                .context("Failed to parse timestamp component")
        };

        let hours = field(start_idx)?;
        let minutes = field(start_idx + 1)?;
        let seconds = field(start_idx + 2)?;
        let millis = field(start_idx + 3)?;

        Ok((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
    }

    /// Serialize the track to an SRT string
    pub fn to_srt_string(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            // Display writes seq, timestamps, text, and the separating blank line
            out.push_str(&entry.to_string());
        }
        out
    }

    /// Write the track to an SRT file atomically (temp file + rename).
    ///
    /// A consumer can never observe a partially-written subtitle file: the
    /// content lands under the final path only via rename.
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = dir {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
            .context("Failed to create temporary subtitle file")?;
        tmp.write_all(self.to_srt_string().as_bytes())
            .context("Failed to write subtitle content")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to move subtitle file into place: {}", path.display()))?;

        debug!("Wrote {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}

impl fmt::Display for SubtitleTrack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Track")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Language: {}", self.language)?;
        writeln!(f, "Entries: {}", self.entries.len())?;
        Ok(())
    }
}

/// Derive the transcript output path for a video file:
/// `movie.mp4` becomes `movie.original.srt` next to the video.
pub fn transcript_output_path(video_path: &Path) -> PathBuf {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let file_name = format!("{}.original.srt", stem);
    match video_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Derive the translation output path for a subtitle file:
/// `movie.original.srt` becomes `movie.<lang>.srt`, any other `.srt`
/// gets the language tag appended to its stem.
pub fn translation_output_path(srt_path: &Path, target_language: &str) -> PathBuf {
    let file_name = srt_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output.srt".to_string());

    let new_name = if let Some(base) = file_name.strip_suffix(".original.srt") {
        format!("{}.{}.srt", base, target_language)
    } else if let Some(base) = file_name.strip_suffix(".srt") {
        format!("{}.{}.srt", base, target_language)
    } else {
        format!("{}.{}.srt", file_name, target_language)
    };

    match srt_path.parent() {
        Some(parent) => parent.join(new_name),
        None => PathBuf::from(new_name),
    }
}
