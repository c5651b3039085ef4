//! Timestamped lyric parsing and position-to-line synchronization.

/// Blank lines placed ahead of the lyrics so the active line can sit in the
/// middle of a fixed-height viewport from the very first line.
pub const LYRICS_PADDING_LINES: usize = 7;

/// Text of the single line shown when a song has no usable lyrics
pub const LYRICS_NOT_FOUND: &str = "Lyrics not found";

/// A single line of lyrics with its start offset
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LyricsLine {
    /// Milliseconds from track start
    pub offset_ms: u64,
    pub text: String,
}

impl LyricsLine {
    #[must_use]
    pub fn new(offset_ms: u64, text: impl Into<String>) -> Self {
        Self {
            offset_ms,
            text: text.into(),
        }
    }
}

/// Parse raw timestamped lyric text into lines sorted by offset.
///
/// Lines without a leading `[mm:ss.xx]` timestamp are dropped. A line with
/// several leading timestamps yields one entry per timestamp, and an
/// `[offset:±ms]` header shifts every entry. Ties keep their source order.
#[must_use]
pub fn parse(raw: &str) -> Vec<LyricsLine> {
    let mut offset: i64 = 0;
    let mut lines = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(value) = parse_offset_tag(line) {
            offset = value;
            continue;
        }

        if let Some((timestamps, text)) = split_timestamps(line) {
            for timestamp in timestamps {
                lines.push(LyricsLine::new(timestamp, text));
            }
        }
    }

    if offset != 0 {
        for line in &mut lines {
            line.offset_ms = apply_offset(line.offset_ms, offset);
        }
    }

    lines.sort_by_key(|l| l.offset_ms);
    lines
}

/// Index of the last line whose offset is at or before `position_ms`, or 0
/// when none qualifies.
#[must_use]
pub fn active_line(lines: &[LyricsLine], position_ms: u64) -> usize {
    // Lines are sorted, so the count of started lines is a partition point.
    lines
        .partition_point(|line| line.offset_ms <= position_ms)
        .saturating_sub(1)
}

/// Lyrics prepared for a scrolling viewport.
///
/// Found lyrics carry [`LYRICS_PADDING_LINES`] blank lines at offset 0 in
/// front, missing or unparseable lyrics collapse to one placeholder line.
/// Indices returned by [`DisplayLyrics::active_line`] address `lines`
/// including the padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLyrics {
    pub lines: Vec<LyricsLine>,
    found: bool,
}

impl DisplayLyrics {
    #[must_use]
    pub fn from_raw(raw: Option<&str>) -> Self {
        let parsed = raw.map(parse).unwrap_or_default();
        if parsed.is_empty() {
            return Self::not_found();
        }

        let mut lines = Vec::with_capacity(LYRICS_PADDING_LINES + parsed.len());
        lines.resize(LYRICS_PADDING_LINES, LyricsLine::default());
        lines.extend(parsed);
        Self { lines, found: true }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            lines: vec![LyricsLine::new(0, LYRICS_NOT_FOUND)],
            found: false,
        }
    }

    /// Whether real lyrics were parsed
    #[must_use]
    pub const fn is_found(&self) -> bool {
        self.found
    }

    #[must_use]
    pub fn active_line(&self, position_ms: u64) -> usize {
        active_line(&self.lines, position_ms)
    }

    /// Lines around `index` for display, clamped to the available range
    #[must_use]
    pub fn window(&self, index: usize, before: usize, after: usize) -> &[LyricsLine] {
        if self.lines.is_empty() {
            return &[];
        }
        let index = index.min(self.lines.len() - 1);
        let start = index.saturating_sub(before);
        let end = (index + after + 1).min(self.lines.len());
        &self.lines[start..end]
    }
}

impl Default for DisplayLyrics {
    fn default() -> Self {
        Self::not_found()
    }
}

/// Render milliseconds as `mm:ss`
#[must_use]
pub fn format_time(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Parse an `[offset:+500]` header
fn parse_offset_tag(line: &str) -> Option<i64> {
    let content = line.strip_prefix('[')?.strip_suffix(']')?;
    let (tag, value) = content.split_once(':')?;
    if !tag.trim().eq_ignore_ascii_case("offset") {
        return None;
    }
    value.trim().trim_start_matches('+').parse().ok()
}

/// Split `[00:12.34][00:40.00]text` into its timestamps and the text
fn split_timestamps(line: &str) -> Option<(Vec<u64>, &str)> {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while let Some(rest) = remaining.strip_prefix('[') {
        let Some(end) = rest.find(']') else {
            break;
        };
        let Some(timestamp) = parse_timestamp(&rest[..end]) else {
            break;
        };
        timestamps.push(timestamp);
        remaining = &rest[end + 1..];
    }

    if timestamps.is_empty() {
        None
    } else {
        Some((timestamps, remaining.trim()))
    }
}

/// Parse `mm:ss`, `mm:ss.f`, `mm:ss.ff`, `mm:ss.fff` or `mm:ss:ff` into milliseconds
fn parse_timestamp(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.trim().split(':').collect();

    let (minutes, seconds, fraction) = match parts.as_slice() {
        [minutes, rest] => match rest.split_once('.') {
            Some((seconds, fraction)) => (*minutes, seconds, Some(fraction)),
            None => (*minutes, *rest, None),
        },
        [minutes, seconds, fraction] => (*minutes, *seconds, Some(*fraction)),
        _ => return None,
    };

    let minutes = parse_digits(minutes)?;
    let seconds = parse_digits(seconds)?;
    let fraction_ms = match fraction {
        Some(fraction) => fraction_to_ms(fraction)?,
        None => 0,
    };

    minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(fraction_ms)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Scale a fractional-second field by its digit count (`5` → 500, `34` → 340, `345` → 345)
fn fraction_to_ms(fraction: &str) -> Option<u64> {
    let value = parse_digits(fraction)?;
    match fraction.len() {
        1 => Some(value * 100),
        2 => Some(value * 10),
        3 => Some(value),
        // Finer than milliseconds: keep the leading three digits.
        _ => parse_digits(&fraction[..3]),
    }
}

fn apply_offset(offset_ms: u64, shift_ms: i64) -> u64 {
    if shift_ms >= 0 {
        offset_ms.saturating_add(shift_ms.unsigned_abs())
    } else {
        offset_ms.saturating_sub(shift_ms.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_line() {
        let lines = parse("[00:12.34]Hello world");
        assert_eq!(lines, vec![LyricsLine::new(12_340, "Hello world")]);
    }

    #[test]
    fn test_parse_drops_unmatched_lines() {
        let raw = "[ti:Title]\nplain text\n[00:05.00]First\n[xx:yy.zz]Broken\n\n[00:10.00]Second";
        let lines = parse(raw);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "First");
        assert_eq!(lines[1].text, "Second");
    }

    #[test]
    fn test_parse_sorts_and_keeps_ties_stable() {
        let raw = "[00:10.00]Later\n[00:05.00]Tie A\n[00:05.00]Tie B\n[00:01.00]Earliest";
        let texts: Vec<_> = parse(raw).into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["Earliest", "Tie A", "Tie B", "Later"]);
    }

    #[test]
    fn test_parse_fraction_precision() {
        assert_eq!(parse("[01:02.5]a")[0].offset_ms, 62_500);
        assert_eq!(parse("[01:02.05]a")[0].offset_ms, 62_050);
        assert_eq!(parse("[01:02.005]a")[0].offset_ms, 62_005);
        assert_eq!(parse("[01:02]a")[0].offset_ms, 62_000);
        assert_eq!(parse("[00:12:34]a")[0].offset_ms, 12_340);
    }

    #[test]
    fn test_parse_multi_timestamp_line() {
        let lines = parse("[00:05.00][00:15.00]Chorus");
        assert_eq!(
            lines,
            vec![LyricsLine::new(5000, "Chorus"), LyricsLine::new(15_000, "Chorus")]
        );
    }

    #[test]
    fn test_parse_offset_header() {
        let lines = parse("[offset:500]\n[00:10.00]Test");
        assert_eq!(lines[0].offset_ms, 10_500);

        let lines = parse("[offset:-20000]\n[00:10.00]Test");
        assert_eq!(lines[0].offset_ms, 0);
    }

    #[test]
    fn test_parse_cjk_text() {
        let lines = parse("[00:05.00]  你好世界  ");
        assert_eq!(lines[0].text, "你好世界");
    }

    #[test]
    fn test_active_line() {
        let lines = parse("[00:05.00]First\n[00:10.00]Second\n[00:15.00]Third");
        assert_eq!(active_line(&lines, 0), 0);
        assert_eq!(active_line(&lines, 4_999), 0);
        assert_eq!(active_line(&lines, 5_000), 0);
        assert_eq!(active_line(&lines, 12_000), 1);
        assert_eq!(active_line(&lines, 600_000), 2);
        assert_eq!(active_line(&[], 1_000), 0);
    }

    #[test]
    fn test_active_line_is_monotonic() {
        let lines = parse("[00:01.00]a\n[00:01.00]b\n[00:03.50]c\n[00:07.25]d\n[01:00.00]e");
        let mut previous = 0;
        for position in (0..70_000).step_by(250) {
            let index = active_line(&lines, position);
            assert!(index >= previous, "index went back at {position}ms");
            previous = index;
        }
    }

    #[test]
    fn test_display_lyrics_padding_keeps_indices_aligned() {
        let display = DisplayLyrics::from_raw(Some("[00:00.00]Intro\n[00:10.00]Verse"));
        assert!(display.is_found());
        assert_eq!(display.lines.len(), LYRICS_PADDING_LINES + 2);
        assert!(display.lines[..LYRICS_PADDING_LINES]
            .iter()
            .all(|l| l.text.is_empty() && l.offset_ms == 0));

        assert_eq!(display.active_line(0), LYRICS_PADDING_LINES);
        assert_eq!(display.active_line(10_000), LYRICS_PADDING_LINES + 1);
    }

    #[test]
    fn test_display_lyrics_fallback() {
        for raw in [None, Some(""), Some("no timestamps here")] {
            let display = DisplayLyrics::from_raw(raw);
            assert!(!display.is_found());
            assert_eq!(display.lines, vec![LyricsLine::new(0, LYRICS_NOT_FOUND)]);
            assert_eq!(display.active_line(42_000), 0);
        }
    }

    #[test]
    fn test_display_window() {
        let display = DisplayLyrics::from_raw(Some(
            "[00:05.00]Line 1\n[00:10.00]Line 2\n[00:15.00]Line 3\n[00:20.00]Line 4",
        ));
        let index = display.active_line(12_000);
        let window = display.window(index, 1, 1);
        let texts: Vec<_> = window.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Line 1", "Line 2", "Line 3"]);

        assert_eq!(display.window(999, 2, 2).len(), 3);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(61_999), "01:01");
        assert_eq!(format_time(3_600_000), "60:00");
    }
}
