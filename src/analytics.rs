//! Category counts over stored events.

use std::collections::BTreeMap;

use crate::ingest::types::{Category, Event};

/// Category → number of events. Serializes as `{"CIVIL_ACTIVITY": 1, ...}`.
pub type Summary = BTreeMap<Category, u64>;

/// Count each event once under its category. Pure; works on the full stored set or
/// any subset the caller passes in.
pub fn summarize<'a, I>(events: I) -> Summary
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut out = Summary::new();
    for ev in events {
        *out.entry(ev.category).or_insert(0) += 1;
    }
    out
}
