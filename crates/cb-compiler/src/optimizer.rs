use std::collections::HashSet;

use cb_core::rule::RuleEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

/// Drop repeated rules, keeping the first occurrence of each.
///
/// Two entries are the same rule when their raw text is identical; lists
/// merged from several sources repeat rules verbatim.
pub fn optimize_entries(entries: &mut Vec<RuleEntry>) -> OptimizeStats {
    let before = entries.len();

    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    let mut deduped = 0usize;
    entries.retain(|entry| {
        if seen.insert(entry.raw().to_string()) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    OptimizeStats {
        before,
        after: entries.len(),
        deduped,
    }
}
