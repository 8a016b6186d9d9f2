//! Top-K plus OTHER reduction of label counts

use crate::consts::OTHER_LABEL;
use crate::core::types::{GroupEntry, GroupSummary, LabelCounts};

fn share_percent(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}

/// Keep the `k` largest labels and fold the remainder into one OTHER entry.
///
/// Ties keep first-seen order. Shares are against the total of all input
/// counts, OTHER included.
pub(crate) fn reduce(counts: &LabelCounts, k: usize) -> GroupSummary {
    let total = counts.total();
    let mut ranked: Vec<&(String, u64)> = counts.entries().iter().collect();
    // sort_by is stable, so equal counts stay in insertion order
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let split = k.min(ranked.len());
    let mut entries: Vec<GroupEntry> = ranked[..split]
        .iter()
        .map(|(label, count)| GroupEntry {
            label: label.clone(),
            count: *count,
            share_percent: share_percent(*count, total),
            is_other: false,
        })
        .collect();

    let remainder: u64 = ranked[split..].iter().map(|(_, n)| n).sum();
    if remainder > 0 {
        entries.push(GroupEntry {
            label: OTHER_LABEL.to_string(),
            count: remainder,
            share_percent: share_percent(remainder, total),
            is_other: true,
        });
    }

    GroupSummary { entries, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(summary: &GroupSummary) -> Vec<&str> {
        summary.entries.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn top_five_with_other() {
        let counts: LabelCounts = [("A", 50), ("B", 30), ("C", 10), ("D", 5), ("E", 3), ("F", 2)]
            .into_iter()
            .collect();
        let summary = reduce(&counts, 5);

        assert_eq!(labels(&summary), ["A", "B", "C", "D", "E", "OTHER"]);
        assert_eq!(summary.total, 100);
        let other = summary.other().unwrap();
        assert_eq!(other.count, 2);
        assert_eq!(other.share_percent, 2);
        assert_eq!(summary.entries[0].share_percent, 50);
        assert_eq!(summary.entries[1].share_percent, 30);
    }

    #[test]
    fn no_other_when_everything_fits() {
        let counts: LabelCounts = [("north", 3), ("east", 1)].into_iter().collect();
        let summary = reduce(&counts, 5);
        assert_eq!(summary.entries.len(), 2);
        assert!(summary.other().is_none());
    }

    #[test]
    fn no_other_when_remainder_is_zero() {
        let counts: LabelCounts = [("a", 4), ("b", 0), ("c", 0)].into_iter().collect();
        let summary = reduce(&counts, 1);
        assert_eq!(labels(&summary), ["a"]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let counts: LabelCounts = [("late", 1), ("x", 5), ("first", 5), ("y", 5)]
            .into_iter()
            .collect();
        let summary = reduce(&counts, 2);
        assert_eq!(labels(&summary), ["x", "first", "OTHER"]);
        assert_eq!(summary.other().unwrap().count, 6);
    }

    #[test]
    fn empty_input_is_empty_summary() {
        let summary = reduce(&LabelCounts::new(), 10);
        assert!(summary.is_empty());
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn zero_total_gives_zero_shares() {
        let counts: LabelCounts = [("a", 0), ("b", 0)].into_iter().collect();
        let summary = reduce(&counts, 5);
        assert!(summary.entries.iter().all(|e| e.share_percent == 0));
    }

    #[test]
    fn k_zero_folds_everything() {
        let counts: LabelCounts = [("a", 2), ("b", 3)].into_iter().collect();
        let summary = reduce(&counts, 0);
        assert_eq!(labels(&summary), ["OTHER"]);
        assert_eq!(summary.entries[0].share_percent, 100);
    }

    proptest! {
        #[test]
        fn prop_reduce_bounds(
            raw in prop::collection::vec(("[a-e]{1,2}", 0u64..1000), 0..40),
            k in 0usize..12,
        ) {
            let counts: LabelCounts = raw.iter().map(|(l, n)| (l.as_str(), *n)).collect();
            let summary = reduce(&counts, k);

            prop_assert!(summary.entries.len() <= k + 1);
            let sum: u64 = summary.entries.iter().map(|e| e.count).sum();
            prop_assert_eq!(sum, counts.total());

            let counts_desc = summary
                .entries
                .iter()
                .filter(|e| !e.is_other)
                .map(|e| e.count)
                .collect::<Vec<_>>();
            prop_assert!(counts_desc.windows(2).all(|w| w[0] >= w[1]));

            if counts.total() > 0 {
                let shares: i64 = summary.entries.iter().map(|e| e.share_percent as i64).sum();
                // each entry rounds independently by at most half a point
                let slack = summary.entries.len() as i64;
                prop_assert!((shares - 100).abs() <= slack);
            }
        }
    }
}
