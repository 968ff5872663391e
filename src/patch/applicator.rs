//! Patch engine: applies a parsed unified diff to in-memory content.
//!
//! Hunks are applied strictly in diff order against a growable line buffer. A
//! [`Cursor`] carries the running line offset (how far earlier hunks shifted the
//! file relative to the diff's line numbers) and a floor below which no later
//! hunk may search, so text an earlier hunk produced is never matched again.

use crate::patch::errors::{ClosestLine, PatchError};
use crate::patch::matcher::{self, MatchSpan};
use crate::patch::parser::{self, Hunk, ParsedDiff};
use tracing::debug;

/// Default radius, in lines, of the local search around a hunk's hinted position.
pub const DEFAULT_SEARCH_WINDOW: usize = 40;

/// Minimum normalized similarity for a line to be reported as the closest candidate.
const CLOSEST_LINE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Radius of the windowed search before falling back to the rest of the file
    pub search_window: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            search_window: DEFAULT_SEARCH_WINDOW,
        }
    }
}

/// How a hunk was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Pure insertion at the declared position
    Inserted { at: usize },
    /// Found within the search window around the hinted position
    Window { span: MatchSpan },
    /// Found by scanning the rest of the file
    Fallback { span: MatchSpan },
    /// Header with no body lines
    Skipped,
}

/// Patched content plus per-hunk placement details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub content: String,
    pub placements: Vec<Placement>,
}

/// Apply `diff` to `original` with default options.
pub fn apply(original: &str, diff: &str) -> Result<String, PatchError> {
    apply_with(original, diff, &ApplyOptions::default())
}

pub fn apply_with(original: &str, diff: &str, options: &ApplyOptions) -> Result<String, PatchError> {
    let parsed = parser::parse(diff)?;
    apply_parsed(original, &parsed, options).map(|outcome| outcome.content)
}

/// Apply an already-parsed diff. A diff without hunks returns `original` unchanged.
pub fn apply_parsed(
    original: &str,
    diff: &ParsedDiff,
    options: &ApplyOptions,
) -> Result<PatchOutcome, PatchError> {
    if diff.is_empty() {
        return Ok(PatchOutcome {
            content: original.to_string(),
            placements: Vec::new(),
        });
    }

    let mut buffer = LineBuffer::parse(original);
    let mut cursor = Cursor::default();
    let mut placements = Vec::with_capacity(diff.hunks.len());

    for (index, hunk) in diff.hunks.iter().enumerate() {
        let placement = apply_hunk(&mut buffer, &mut cursor, hunk, index + 1, options)?;
        debug!(hunk = index + 1, header = %hunk.header, ?placement, "hunk applied");
        placements.push(placement);
    }

    Ok(PatchOutcome {
        content: buffer.render(),
        placements,
    })
}

fn apply_hunk(
    buffer: &mut LineBuffer,
    cursor: &mut Cursor,
    hunk: &Hunk,
    number: usize,
    options: &ApplyOptions,
) -> Result<Placement, PatchError> {
    let original_block = hunk.original_block();
    let new_block = hunk.new_block();

    if original_block.is_empty() {
        if new_block.is_empty() {
            return Ok(Placement::Skipped);
        }
        let at = cursor.insertion_index(hunk, buffer.lines.len());
        let inserted = new_block.len();
        buffer.splice(at, at, new_block);
        cursor.advance(at, 0, inserted);
        return Ok(Placement::Inserted { at });
    }

    let lines = &buffer.lines;
    let hint = cursor.hint(hunk.old_start, lines.len());
    let window_start = hint.saturating_sub(options.search_window).max(cursor.floor);
    let window_end = hint.saturating_add(options.search_window).saturating_add(1);

    let (span, placement) =
        match matcher::find_in_range(lines, &original_block, window_start, window_end) {
            Some(span) => (span, Placement::Window { span }),
            None => match matcher::find(lines, &original_block, cursor.floor) {
                Some(span) => (span, Placement::Fallback { span }),
                None => return Err(not_found(lines, &original_block, cursor.floor, hunk, number)),
            },
        };

    let span = absorb_blank_context(lines, &original_block, span, cursor.floor);
    let inserted = new_block.len();
    buffer.splice(span.start, span.end, new_block);
    cursor.advance(span.start, span.len(), inserted);

    Ok(match placement {
        Placement::Window { .. } => Placement::Window { span },
        _ => Placement::Fallback { span },
    })
}

/// Widen a fuzzy match over blank lines that the hunk's leading/trailing blank
/// context corresponds to, so those lines are replaced rather than duplicated.
fn absorb_blank_context(
    lines: &[String],
    original_block: &[String],
    mut span: MatchSpan,
    floor: usize,
) -> MatchSpan {
    if original_block.iter().all(|line| line.is_empty()) {
        return span;
    }

    let leading = original_block.iter().take_while(|l| l.is_empty()).count();
    let trailing = original_block.iter().rev().take_while(|l| l.is_empty()).count();

    for _ in 0..leading {
        if span.start > floor && lines[span.start - 1].trim_end().is_empty() {
            span.start -= 1;
        } else {
            break;
        }
    }
    for _ in 0..trailing {
        if span.end < lines.len() && lines[span.end].trim_end().is_empty() {
            span.end += 1;
        } else {
            break;
        }
    }
    span
}

fn not_found(
    lines: &[String],
    original_block: &[String],
    floor: usize,
    hunk: &Hunk,
    number: usize,
) -> PatchError {
    let divergence = matcher::diagnose(lines, original_block, floor);
    let closest = closest_line(lines, &divergence.unmatched_line, floor);
    PatchError::HunkNotFound {
        hunk: number,
        header: hunk.header.clone(),
        unmatched_line: divergence.unmatched_line,
        closest,
    }
}

fn closest_line(lines: &[String], wanted: &str, floor: usize) -> Option<ClosestLine> {
    let wanted = wanted.trim();
    if wanted.is_empty() {
        return None;
    }
    lines
        .iter()
        .enumerate()
        .skip(floor)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx, line, strsim::normalized_levenshtein(wanted, line.trim())))
        .filter(|(_, _, similarity)| *similarity >= CLOSEST_LINE_THRESHOLD)
        .fold(None, |best: Option<ClosestLine>, (idx, line, similarity)| match best {
            Some(b) if b.similarity >= similarity => Some(b),
            _ => Some(ClosestLine {
                line_number: idx + 1,
                text: line.clone(),
                similarity,
            }),
        })
}

/// Position bookkeeping threaded through the hunk loop.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    /// Lines added minus lines removed by hunks applied so far
    offset: isize,
    /// Index just past the most recent replacement; later hunks start here
    floor: usize,
}

impl Cursor {
    /// Hinted 0-indexed position of a hunk declared at 1-indexed `old_start`.
    fn hint(&self, old_start: usize, len: usize) -> usize {
        self.shift(old_start.saturating_sub(1), len)
    }

    fn insertion_index(&self, hunk: &Hunk, len: usize) -> usize {
        // "-N,0" inserts after line N; otherwise the declared line is where the
        // new lines go.
        let declared = if hunk.declares_empty_old_range() {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        self.shift(declared, len).max(self.floor.min(len))
    }

    fn shift(&self, declared: usize, len: usize) -> usize {
        let shifted = declared as isize + self.offset;
        shifted.clamp(0, len as isize) as usize
    }

    fn advance(&mut self, start: usize, removed: usize, inserted: usize) {
        self.offset += inserted as isize - removed as isize;
        self.floor = start + inserted;
    }
}

/// File content as lines plus what is needed to reassemble it byte-faithfully.
///
/// Each line keeps its own terminator, so files mixing `\n` and `\r\n` come
/// back unchanged outside the spliced spans.
struct LineBuffer {
    lines: Vec<String>,
    /// Terminator of each line, parallel to `lines`
    endings: Vec<&'static str>,
    /// Ending of the first terminated line; used when there is no neighbour
    eol: &'static str,
    trailing_newline: bool,
}

impl LineBuffer {
    fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();
        let mut eol = None;

        for raw in content.split_inclusive('\n') {
            let (text, ending) = if let Some(text) = raw.strip_suffix("\r\n") {
                (text, Some("\r\n"))
            } else if let Some(text) = raw.strip_suffix('\n') {
                (text, Some("\n"))
            } else {
                (raw, None)
            };
            eol = eol.or(ending);
            lines.push(text.to_string());
            endings.push(ending);
        }

        let eol = eol.unwrap_or("\n");
        Self {
            lines,
            // An unterminated last line only gets a terminator if lines are
            // appended after it; it then takes the file's first ending.
            endings: endings.into_iter().map(|e| e.unwrap_or(eol)).collect(),
            eol,
            trailing_newline: content.is_empty() || content.ends_with('\n'),
        }
    }

    /// Replace lines `start..end` with `new_lines`. New lines take the ending
    /// of the first replaced line, else the line before, else the line after.
    fn splice(&mut self, start: usize, end: usize, new_lines: Vec<String>) {
        let ending = if start < end {
            self.endings[start]
        } else if start > 0 {
            self.endings[start - 1]
        } else {
            self.endings.get(start).copied().unwrap_or(self.eol)
        };
        let count = new_lines.len();
        self.lines.splice(start..end, new_lines);
        self.endings
            .splice(start..end, std::iter::repeat(ending).take(count));
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (idx, (line, ending)) in self.lines.iter().zip(&self.endings).enumerate() {
            out.push_str(line);
            if idx < last || self.trailing_newline {
                out.push_str(ending);
            }
        }
        out
    }
}
