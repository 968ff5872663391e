//! Property tests for fuzzy hunk placement and the hash precondition

use proptest::prelude::*;
use safe_patch::{patch, ContentHash, Session};
use std::fs;

fn clean_lines(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("line {i}")).collect()
}

/// Single-hunk diff replacing line `k` of `lines`, with up to two context lines
/// on each side, positioned as if `lines` were the whole file.
fn single_change_diff(lines: &[String], k: usize) -> String {
    let start = k.saturating_sub(2);
    let end = (k + 3).min(lines.len());
    let len = end - start;

    let mut diff = format!("@@ -{},{len} +{},{len} @@\n", start + 1, start + 1);
    for (i, line) in lines.iter().enumerate().take(end).skip(start) {
        if i == k {
            diff.push_str(&format!("-{line}\n+{line} changed\n"));
        } else {
            diff.push_str(&format!(" {line}\n"));
        }
    }
    diff
}

fn non_blank(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn proptest_blank_lines_and_trailing_whitespace_are_tolerated(
        layout in (3usize..30).prop_flat_map(|n| (
            prop::collection::vec(0usize..3, n),
            prop::collection::vec(any::<bool>(), n),
            0..n,
        )),
    ) {
        let (blanks, padded, k) = layout;
        let lines = clean_lines(blanks.len());

        let mut target = String::new();
        for (i, line) in lines.iter().enumerate() {
            target.push_str(line);
            if padded[i] {
                target.push_str("  \t");
            }
            target.push('\n');
            target.push_str(&"\n".repeat(blanks[i]));
        }

        let diff = single_change_diff(&lines, k);
        let result = patch::apply(&target, &diff);
        prop_assert!(result.is_ok(), "diff failed to apply: {:?}\n{}", result, diff);

        let mut expected = lines.clone();
        expected[k] = format!("line {k} changed");
        prop_assert_eq!(non_blank(&result.unwrap()), expected);
    }

    #[test]
    fn proptest_sequential_hunks_track_offset(
        plan in (5usize..40).prop_flat_map(|n| prop::collection::vec((any::<bool>(), 0usize..3), n)),
    ) {
        let lines = clean_lines(plan.len());

        // Keep changes three lines apart so hunk contexts never overlap
        let mut changes = Vec::new();
        let mut last: Option<usize> = None;
        for (i, (changed, added)) in plan.iter().enumerate() {
            if *changed && last.map_or(true, |l| i >= l + 3) {
                changes.push((i, *added));
                last = Some(i);
            }
        }

        let mut diff = String::from("--- a/file\n+++ b/file\n");
        let mut expected = Vec::new();
        let mut copied = 0;
        let mut delta: isize = 0;
        for &(i, added) in &changes {
            let start = i.saturating_sub(1);
            let end = (i + 2).min(lines.len());
            let old_len = end - start;
            let new_len = old_len - 1 + added;
            let new_start = (start + 1) as isize + delta;
            diff.push_str(&format!("@@ -{},{old_len} +{new_start},{new_len} @@\n", start + 1));

            for (j, line) in lines.iter().enumerate().take(end).skip(start) {
                if j == i {
                    diff.push_str(&format!("-{line}\n"));
                    for r in 0..added {
                        diff.push_str(&format!("+new {i}.{r}\n"));
                    }
                } else {
                    diff.push_str(&format!(" {line}\n"));
                }
            }

            expected.extend(lines[copied..i].iter().cloned());
            expected.extend((0..added).map(|r| format!("new {i}.{r}")));
            copied = i + 1;
            delta += added as isize - 1;
        }
        expected.extend(lines[copied..].iter().cloned());

        let original = format!("{}\n", lines.join("\n"));
        let patched = patch::apply(&original, &diff);
        prop_assert!(patched.is_ok(), "diff failed to apply: {:?}\n{}", patched, diff);

        let patched = patched.unwrap();
        let actual: Vec<&str> = patched.lines().collect();
        prop_assert_eq!(actual, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn proptest_stamp_then_verify_round_trip(content in "[a-z \n]{1,64}") {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, &content).unwrap();

        let mut session = Session::default();
        let snapshot = session.read(&path).unwrap();
        prop_assert_eq!(&snapshot.content_hash, &ContentHash::of(&content));
        prop_assert!(session.verify(&path, &snapshot.content_hash).unwrap().is_match());

        // Flip one character
        let mut mutated: Vec<char> = content.chars().collect();
        mutated[0] = if mutated[0] == 'a' { 'b' } else { 'a' };
        let mutated: String = mutated.into_iter().collect();
        fs::write(&path, &mutated).unwrap();
        prop_assert!(!session.verify(&path, &snapshot.content_hash).unwrap().is_match());
    }
}
