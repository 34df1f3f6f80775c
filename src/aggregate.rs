//! Grouping candidates by signal date and capping trades per date.

use std::collections::BTreeMap;

use crate::{series::SignalDate, CandidateTrade, PositionCap};

/// Candidates keyed by signal date. Keys iterate chronologically; each
/// vector keeps input order.
pub type DateBucket = BTreeMap<SignalDate, Vec<CandidateTrade>>;

/// Group candidates by signal date, stable w.r.t. input order.
pub fn group_by_date<I>(candidates: I) -> DateBucket
where
    I: IntoIterator<Item = CandidateTrade>,
{
    let mut bucket = DateBucket::new();
    for trade in candidates {
        bucket.entry(trade.date).or_default().push(trade);
    }
    bucket
}

/// Keep the `cap` strongest candidates of every date.
///
/// Sorted by `change_percent` descending; equal keys keep grouping order.
pub fn select_top(mut bucket: DateBucket, cap: PositionCap) -> DateBucket {
    for trades in bucket.values_mut() {
        rank(trades);
        trades.truncate(cap.get());
    }
    bucket
}

/// Stable descending sort on the ranking key.
pub fn rank(trades: &mut [CandidateTrade]) {
    trades.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
}
