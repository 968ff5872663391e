//! Unified diff parsing.
//!
//! Agent-authored diffs are sloppy: line counts in `@@` headers are often wrong,
//! blank context lines lose their leading space, and hunks trail off with empty
//! lines. The parser therefore treats header counts as informational and reads
//! each hunk body until the next `@@` marker or file header.

use crate::patch::errors::PatchError;
use regex::Regex;
use std::sync::OnceLock;

const DEV_NULL: &str = "/dev/null";
const UNNAMED_FILE: &str = "<unnamed>";

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
            .expect("hunk header regex is valid")
    })
}

/// One body line of a hunk, tagged by its diff operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

/// One contiguous change region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// The raw `@@ ... @@` line, kept for diagnostics
    pub header: String,
    /// Declared 1-indexed old start line (0 for insertions at the top of the file)
    pub old_start: usize,
    /// Declared old line count, if the header carried one
    pub old_len: Option<usize>,
    pub new_start: usize,
    pub new_len: Option<usize>,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Context and removed lines with trailing whitespace stripped: what must be found.
    pub fn original_block(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HunkLine::Context(text) | HunkLine::Removed(text) => {
                    Some(text.trim_end().to_string())
                }
                HunkLine::Added(_) => None,
            })
            .collect()
    }

    /// Context and added lines, verbatim: what replaces the matched span.
    pub fn new_block(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HunkLine::Context(text) | HunkLine::Added(text) => Some(text.clone()),
                HunkLine::Removed(_) => None,
            })
            .collect()
    }

    /// True when the hunk only adds lines.
    pub fn is_pure_insertion(&self) -> bool {
        self.lines
            .iter()
            .all(|line| matches!(line, HunkLine::Added(_)))
    }

    /// True when the header explicitly declares an empty old range (`-N,0`).
    pub fn declares_empty_old_range(&self) -> bool {
        self.old_len == Some(0)
    }
}

/// A single-file unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDiff {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl ParsedDiff {
    /// A `/dev/null` source path signals creation of a new file.
    pub fn is_new_file(&self) -> bool {
        self.old_path.as_deref() == Some(DEV_NULL)
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// Parse a unified diff. Text without any `@@` marker parses to an empty diff.
pub fn parse(diff: &str) -> Result<ParsedDiff, PatchError> {
    let lines: Vec<&str> = diff.lines().collect();
    let mut parsed = ParsedDiff::default();
    let mut builder: Option<HunkBuilder> = None;
    let mut seen_file_header = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("@@") {
            if let Some(done) = builder.take() {
                parsed.hunks.push(done.finish());
            }
            builder = Some(HunkBuilder::new(parse_header(line)?));
            i += 1;
            continue;
        }

        // Inside a hunk that still expects body lines, "--- x" / "+++ y" is a
        // removed/added pair rather than the next file's header, unless an `@@`
        // marker follows directly. Declared counts are not trusted over that.
        let is_file_header = line.starts_with("--- ")
            && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "))
            && (builder.as_ref().map_or(true, HunkBuilder::is_complete)
                || lines.get(i + 2).is_some_and(|next| next.starts_with("@@")));
        if is_file_header {
            if let Some(done) = builder.take() {
                parsed.hunks.push(done.finish());
            }
            let old_path = header_path(&line[4..]);
            let new_path = header_path(&lines[i + 1][4..]);
            // Hunks that came before any header belong to an unnamed first file
            if seen_file_header || !parsed.hunks.is_empty() {
                let first = parsed
                    .new_path
                    .clone()
                    .or_else(|| parsed.old_path.clone())
                    .unwrap_or_else(|| UNNAMED_FILE.to_string());
                return Err(PatchError::MultipleFiles {
                    first,
                    second: if new_path == DEV_NULL { old_path } else { new_path },
                });
            }
            seen_file_header = true;
            parsed.old_path = Some(old_path);
            parsed.new_path = Some(new_path);
            i += 2;
            continue;
        }

        if line.starts_with("diff --git ") {
            if let Some(done) = builder.take() {
                parsed.hunks.push(done.finish());
            }
            i += 1;
            continue;
        }

        // Outside a hunk this is preamble (`index ...`, commit messages, etc.)
        if let Some(hunk) = builder.as_mut() {
            hunk.push_body_line(line);
        }
        i += 1;
    }

    if let Some(done) = builder.take() {
        parsed.hunks.push(done.finish());
    }

    Ok(parsed)
}

fn parse_header(line: &str) -> Result<Hunk, PatchError> {
    let malformed = || PatchError::MalformedHeader {
        header: line.to_string(),
    };
    let caps = header_regex().captures(line).ok_or_else(malformed)?;
    let number = |idx: usize| -> Result<Option<usize>, PatchError> {
        caps.get(idx)
            .map(|m| m.as_str().parse::<usize>().map_err(|_| malformed()))
            .transpose()
    };

    Ok(Hunk {
        header: line.trim_end().to_string(),
        old_start: number(1)?.ok_or_else(malformed)?,
        old_len: number(2)?,
        new_start: number(3)?.ok_or_else(malformed)?,
        new_len: number(4)?,
        lines: Vec::new(),
    })
}

/// Strip the `a/` / `b/` prefix and any tab-separated timestamp from a header path.
fn header_path(raw: &str) -> String {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == DEV_NULL {
        return path.to_string();
    }
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

struct HunkBuilder {
    hunk: Hunk,
    /// Bare empty lines not yet known to be inside the hunk body
    pending_blanks: usize,
    old_seen: usize,
    new_seen: usize,
}

impl HunkBuilder {
    fn new(hunk: Hunk) -> Self {
        Self {
            hunk,
            pending_blanks: 0,
            old_seen: 0,
            new_seen: 0,
        }
    }

    /// Whether the body has reached the line counts its header declared.
    /// Headers without counts are always complete.
    fn is_complete(&self) -> bool {
        self.hunk.old_len.map_or(true, |n| self.old_seen >= n)
            && self.hunk.new_len.map_or(true, |n| self.new_seen >= n)
    }

    fn push_body_line(&mut self, line: &str) {
        if line.is_empty() {
            self.pending_blanks += 1;
            return;
        }

        let mut chars = line.chars();
        let op = chars.next();
        let text = chars.as_str().to_string();
        let tagged = match op {
            Some(' ') => HunkLine::Context(text),
            Some('-') => HunkLine::Removed(text),
            Some('+') => HunkLine::Added(text),
            // `\ No newline at end of file` and anything else without an operator
            _ => return,
        };

        // A bare empty line followed by more body is a blank context line whose
        // leading space was lost.
        for _ in 0..self.pending_blanks {
            self.hunk.lines.push(HunkLine::Context(String::new()));
            self.old_seen += 1;
            self.new_seen += 1;
        }
        self.pending_blanks = 0;
        match &tagged {
            HunkLine::Context(_) => {
                self.old_seen += 1;
                self.new_seen += 1;
            }
            HunkLine::Removed(_) => self.old_seen += 1,
            HunkLine::Added(_) => self.new_seen += 1,
        }
        self.hunk.lines.push(tagged);
    }

    fn finish(self) -> Hunk {
        self.hunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_and_paths() {
        let diff = "\
--- a/src/lib.rs\t2024-01-01 00:00:00
+++ b/src/lib.rs
@@ -1,3 +1,3 @@ fn main() {
 line 1
-line 2
+line two
 line 3
";
        let parsed = parse(diff).unwrap();
        assert_eq!(parsed.old_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(parsed.new_path.as_deref(), Some("src/lib.rs"));
        assert!(!parsed.is_new_file());
        assert_eq!(parsed.hunks.len(), 1);

        let hunk = &parsed.hunks[0];
        assert_eq!(hunk.old_start, 1);
        assert_eq!(hunk.old_len, Some(3));
        assert_eq!(hunk.new_start, 1);
        assert_eq!(hunk.original_block(), vec!["line 1", "line 2", "line 3"]);
        assert_eq!(hunk.new_block(), vec!["line 1", "line two", "line 3"]);
    }

    #[test]
    fn test_parse_without_counts() {
        let parsed = parse("@@ -7 +7 @@\n-a\n+b\n").unwrap();
        assert_eq!(parsed.hunks[0].old_start, 7);
        assert_eq!(parsed.hunks[0].old_len, None);
        assert_eq!(parsed.hunks[0].new_len, None);
    }

    #[test]
    fn test_dev_null_is_new_file() {
        let parsed = parse("--- /dev/null\n+++ b/new.txt\n@@ -0,0 +1,2 @@\n+a\n+b\n").unwrap();
        assert!(parsed.is_new_file());
        assert!(parsed.hunks[0].is_pure_insertion());
        assert!(parsed.hunks[0].declares_empty_old_range());
        assert_eq!(parsed.new_path.as_deref(), Some("new.txt"));
    }

    #[test]
    fn test_no_hunks_is_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("--- a/x\n+++ b/x\n").unwrap().is_empty());
        assert!(parse("just some prose\n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_header() {
        let err = parse("@@ bogus @@\n-a\n").unwrap_err();
        assert!(matches!(err, PatchError::MalformedHeader { .. }));
    }

    #[test]
    fn test_bare_empty_line_inside_hunk_is_blank_context() {
        let parsed = parse("@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n").unwrap();
        assert_eq!(
            parsed.hunks[0].lines,
            vec![
                HunkLine::Context("a".into()),
                HunkLine::Context(String::new()),
                HunkLine::Removed("b".into()),
                HunkLine::Added("c".into()),
            ]
        );
    }

    #[test]
    fn test_trailing_empty_lines_dropped() {
        let parsed = parse("@@ -1 +1 @@\n-a\n+b\n\n\n@@ -5 +5 @@\n-x\n+y\n\n").unwrap();
        assert_eq!(parsed.hunks.len(), 2);
        assert_eq!(parsed.hunks[0].lines.len(), 2);
        assert_eq!(parsed.hunks[1].lines.len(), 2);
    }

    #[test]
    fn test_no_newline_marker_ignored() {
        let parsed = parse("@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+b\n").unwrap();
        assert_eq!(
            parsed.hunks[0].lines,
            vec![HunkLine::Removed("a".into()), HunkLine::Added("b".into())]
        );
    }

    #[test]
    fn test_second_file_header_rejected() {
        let diff = "--- a/one\n+++ b/one\n@@ -1 +1 @@\n-a\n+b\n--- a/two\n+++ b/two\n@@ -1 +1 @@\n-c\n+d\n";
        let err = parse(diff).unwrap_err();
        assert_eq!(
            err,
            PatchError::MultipleFiles {
                first: "one".into(),
                second: "two".into()
            }
        );
    }

    #[test]
    fn test_second_file_header_rejected_after_overstated_counts() {
        let diff = "@@ -1,5 +1,5 @@\n-a\n+b\n--- a/two\n+++ b/two\n@@ -1 +1 @@\n-c\n+d\n";
        let err = parse(diff).unwrap_err();
        assert_eq!(
            err,
            PatchError::MultipleFiles {
                first: "<unnamed>".into(),
                second: "two".into()
            }
        );

        let diff = "--- a/one\n+++ b/one\n@@ -1,9 +1,9 @@\n-a\n+b\n--- a/two\n+++ b/two\n@@ -1 +1 @@\n-c\n+d\n";
        assert!(matches!(
            parse(diff).unwrap_err(),
            PatchError::MultipleFiles { .. }
        ));
    }

    #[test]
    fn test_header_lookalike_pair_inside_incomplete_hunk_is_body() {
        let parsed = parse("@@ -1,2 +1,2 @@\n--- old rule\n+++ new rule\n keep\n").unwrap();
        assert_eq!(parsed.old_path, None);
        assert_eq!(
            parsed.hunks[0].lines,
            vec![
                HunkLine::Removed("-- old rule".into()),
                HunkLine::Added("++ new rule".into()),
                HunkLine::Context("keep".into()),
            ]
        );
    }

    #[test]
    fn test_removed_line_that_looks_like_header_is_body() {
        // "---" not followed by "+++" stays a removed line
        let parsed = parse("@@ -1,2 +1,1 @@\n--- separator\n keep\n").unwrap();
        assert_eq!(
            parsed.hunks[0].lines,
            vec![
                HunkLine::Removed("-- separator".into()),
                HunkLine::Context("keep".into()),
            ]
        );
    }
}
