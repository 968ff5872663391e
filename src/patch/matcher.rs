//! Fuzzy hunk location.
//!
//! The only tolerated drift is trailing whitespace and extra or missing blank
//! lines. Every non-blank line of the hunk must appear in the target, in order,
//! with identical content once trailing whitespace is stripped.

/// Half-open span `[start, end)` of target lines matched by a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

impl MatchSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Why the best candidate for a hunk failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Number of leading non-blank hunk lines the best candidate matched
    pub matched: usize,
    /// First hunk line that could not be matched
    pub unmatched_line: String,
}

fn strip(line: &str) -> &str {
    line.trim_end()
}

fn core_pattern<H: AsRef<str>>(hunk_lines: &[H]) -> Vec<&str> {
    hunk_lines
        .iter()
        .map(|line| strip(line.as_ref()))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Find `hunk_lines` in `target`, trying candidate starts from `search_start` onward.
pub fn find<T, H>(target: &[T], hunk_lines: &[H], search_start: usize) -> Option<MatchSpan>
where
    T: AsRef<str>,
    H: AsRef<str>,
{
    find_in_range(target, hunk_lines, search_start, target.len())
}

/// Like [`find`], but only candidate starts in `[start, end)` are tried. A match
/// starting inside the range may extend past `end`.
pub fn find_in_range<T, H>(
    target: &[T],
    hunk_lines: &[H],
    start: usize,
    end: usize,
) -> Option<MatchSpan>
where
    T: AsRef<str>,
    H: AsRef<str>,
{
    let core = core_pattern(hunk_lines);
    if core.is_empty() {
        return find_blank_block(target, hunk_lines, start, end);
    }

    let end = end.min(target.len());
    (start..end)
        .filter(|&candidate| strip(target[candidate].as_ref()) == core[0])
        .find_map(|candidate| {
            consume(target, &core, candidate)
                .ok()
                .map(|stop| MatchSpan {
                    start: candidate,
                    end: stop,
                })
        })
}

/// Report how far the best candidate from `search_start` got before diverging.
pub fn diagnose<T, H>(target: &[T], hunk_lines: &[H], search_start: usize) -> Divergence
where
    T: AsRef<str>,
    H: AsRef<str>,
{
    let core = core_pattern(hunk_lines);
    if core.is_empty() {
        return Divergence {
            matched: 0,
            unmatched_line: hunk_lines
                .first()
                .map(|line| line.as_ref().to_string())
                .unwrap_or_default(),
        };
    }

    let matched = (search_start..target.len())
        .filter(|&candidate| strip(target[candidate].as_ref()) == core[0])
        .map(|candidate| match consume(target, &core, candidate) {
            Ok(_) => core.len(),
            Err(matched) => matched,
        })
        .max()
        .unwrap_or(0);

    Divergence {
        matched,
        unmatched_line: core[matched.min(core.len() - 1)].to_string(),
    }
}

/// Walk forward from `candidate` consuming `core` in order, skipping blank target
/// lines. Returns the index after the last consumed line, or the number of
/// pattern lines matched before a non-blank mismatch or end of input.
fn consume<T: AsRef<str>>(target: &[T], core: &[&str], candidate: usize) -> Result<usize, usize> {
    let mut matched = 1;
    let mut pos = candidate + 1;

    while matched < core.len() && pos < target.len() {
        let line = strip(target[pos].as_ref());
        if line == core[matched] {
            matched += 1;
        } else if !line.is_empty() {
            return Err(matched);
        }
        pos += 1;
    }

    if matched == core.len() {
        Ok(pos)
    } else {
        Err(matched)
    }
}

/// Exact stripped slice match for hunks made only of blank lines.
fn find_blank_block<T, H>(
    target: &[T],
    hunk_lines: &[H],
    start: usize,
    end: usize,
) -> Option<MatchSpan>
where
    T: AsRef<str>,
    H: AsRef<str>,
{
    let width = hunk_lines.len();
    if width > target.len() {
        return None;
    }
    let stop = end.min(target.len() - width + 1);
    (start..stop)
        .find(|&i| {
            target[i..i + width]
                .iter()
                .zip(hunk_lines)
                .all(|(t, h)| strip(t.as_ref()) == strip(h.as_ref()))
        })
        .map(|i| MatchSpan {
            start: i,
            end: i + width,
        })
}
