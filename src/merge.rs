// src/merge.rs
//! Combines per-feed event lists into one timeline.
//!
//! Inputs are each sorted by descending timestamp. On equal timestamps the
//! element of the second operand is emitted first, so folding several feeds
//! is order-sensitive for ties: feeds are folded in the entity's declared
//! order.

use crate::ingest::types::Event;

/// Two-pointer merge of two descending sequences. Nothing is dropped or
/// deduplicated.
pub fn merge_descending(a: Vec<Event>, b: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();

    loop {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => x.timestamp > y.timestamp,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_a { a.next() } else { b.next() };
        out.extend(next);
    }

    out
}

/// Left fold of [`merge_descending`] over `seqs` in iteration order.
pub fn merge_all<I>(seqs: I) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<Event>>,
{
    seqs.into_iter().fold(Vec::new(), merge_descending)
}
