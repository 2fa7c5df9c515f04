//! Shifts stored highlight lines as a document is edited, without consulting git.

/// One structural change to a document, in zero-based line numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDelta {
    /// `count` newlines were inserted; every highlighted index at or after `line` moves down
    Insert { line: u32, count: u32 },
    /// Lines `start..end` were joined into `start`
    Delete { start: u32, end: u32 },
}

impl EditDelta {
    /// Derive deltas from an editor change event: the replaced range spans
    /// `start_line..=end_line` and `text` is what was typed in its place.
    /// A replacement that both removes and adds lines yields the deletion first.
    pub fn from_change(start_line: u32, end_line: u32, text: &str) -> Vec<EditDelta> {
        let mut deltas = Vec::new();
        if end_line > start_line {
            deltas.push(EditDelta::Delete {
                start: start_line,
                end: end_line,
            });
        }
        let newlines = text.matches('\n').count() as u32;
        if newlines > 0 {
            deltas.push(EditDelta::Insert {
                line: start_line + 1,
                count: newlines,
            });
        }
        deltas
    }
}

/// Apply `delta` to an ascending line list in place. Returns true if any index moved.
/// Order is preserved; deletions may produce duplicates but never drop entries.
pub fn apply_delta(lines: &mut [u32], delta: EditDelta) -> bool {
    match delta {
        EditDelta::Insert { line, count } => {
            if count == 0 {
                return false;
            }
            let from = lines.partition_point(|&l| l < line);
            for l in &mut lines[from..] {
                *l = l.saturating_add(count);
            }
            from < lines.len()
        }
        EditDelta::Delete { start, end } => {
            let removed = end.saturating_sub(start);
            if removed == 0 {
                return false;
            }
            let from = lines.partition_point(|&l| l < start);
            let mut moved = false;
            for l in &mut lines[from..] {
                let shift = (*l - start).min(removed);
                if shift > 0 {
                    *l -= shift;
                    moved = true;
                }
            }
            moved
        }
    }
}
