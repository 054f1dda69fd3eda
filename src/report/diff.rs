use std::collections::HashSet;

use super::types::{ChangeStatus, CodeChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Added,
    Removed,
    Common,
}

/// One rendered line of a file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub text: String,
}

impl DiffLine {
    fn new(kind: LineKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self.kind {
            LineKind::Added => "+ ",
            LineKind::Removed => "- ",
            LineKind::Common => "  ",
        }
    }
}

/// Approximate line diff based on set membership, not sequence alignment.
///
/// Each old line is either kept (if it appears later in the new text than the
/// last kept line) or removed; new lines skipped over are reported as added.
/// Reordered or duplicated lines can be misattributed.
pub fn line_diff(old: &str, new: &str) -> Vec<DiffLine> {
    let new_lines: Vec<&str> = new.split('\n').collect();
    let new_set: HashSet<&str> = new_lines.iter().copied().collect();
    let mut diff = Vec::new();
    let mut next_new = 0;

    for line in old.split('\n') {
        let found = if new_set.contains(line) {
            new_lines[next_new..].iter().position(|l| *l == line)
        } else {
            None
        };
        match found {
            Some(offset) => {
                let idx = next_new + offset;
                diff.extend(
                    new_lines[next_new..idx]
                        .iter()
                        .map(|l| DiffLine::new(LineKind::Added, l)),
                );
                diff.push(DiffLine::new(LineKind::Common, line));
                next_new = idx + 1;
            }
            None => diff.push(DiffLine::new(LineKind::Removed, line)),
        }
    }

    diff.extend(
        new_lines[next_new..]
            .iter()
            .map(|l| DiffLine::new(LineKind::Added, l)),
    );
    diff
}

/// Diff a proposed change against the original file, if known.
///
/// Returns `None` for a deletion whose original content was never fetched.
/// A modification without an original is shown as unchanged text.
pub fn diff_change(change: &CodeChange, original: Option<&str>) -> Option<Vec<DiffLine>> {
    let all = |text: &str, kind| text.split('\n').map(|l| DiffLine::new(kind, l)).collect();
    match (change.status, original) {
        (ChangeStatus::Created, _) => Some(all(&change.content, LineKind::Added)),
        (ChangeStatus::Deleted, Some(old)) => Some(all(old, LineKind::Removed)),
        (ChangeStatus::Deleted, None) => None,
        (ChangeStatus::Modified, Some(old)) => Some(line_diff(old, &change.content)),
        (ChangeStatus::Modified, None) => Some(all(&change.content, LineKind::Common)),
    }
}
