//! Grouping of a drained collector into per-key counts.

use crate::nfs::NfsRequest;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// How requests are grouped on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    ByClient,
    ByServer,
    ByOpCode,
    ByUser,
}

impl Selection {
    pub const ALL: [Selection; 4] = [
        Selection::ByClient,
        Selection::ByServer,
        Selection::ByOpCode,
        Selection::ByUser,
    ];

    pub fn key(self, request: &NfsRequest) -> String {
        match self {
            Selection::ByClient => request.client(),
            Selection::ByServer => request.server(),
            Selection::ByOpCode => request.op_code().to_string(),
            Selection::ByUser => request.cred().to_string(),
        }
    }

    /// Keyboard shortcut for the grouping
    pub fn from_key(c: char) -> Option<Selection> {
        match c {
            'c' => Some(Selection::ByClient),
            's' => Some(Selection::ByServer),
            'o' => Some(Selection::ByOpCode),
            'u' => Some(Selection::ByUser),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(v: u8) -> Selection {
        Selection::ALL.get(v as usize).copied().unwrap_or_default()
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Selection::ByClient => "client",
            Selection::ByServer => "server",
            Selection::ByOpCode => "operation",
            Selection::ByUser => "user",
        })
    }
}

/// The active grouping, written by the keyboard handler and read once per
/// refresh by the event loop.
#[derive(Debug, Clone, Default)]
pub struct SharedSelection(Arc<AtomicU8>);

impl SharedSelection {
    pub fn new(selection: Selection) -> Self {
        SharedSelection(Arc::new(AtomicU8::new(selection.to_u8())))
    }

    pub fn get(&self) -> Selection {
        Selection::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, selection: Selection) {
        self.0.store(selection.to_u8(), Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub key: String,
    pub value: usize,
}

/// Result of one aggregation pass. Keys keep the order in which they were
/// first seen during the window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Term {
    elements: Vec<Element>,
    sum: usize,
}

impl Term {
    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    pub fn sum(&self) -> usize {
        self.sum
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.elements.iter().find(|e| e.key == key).map(|e| e.value)
    }
}

pub fn aggregate_by<T, F>(records: &[T], mut key_fn: F) -> Term
where
    F: FnMut(&T) -> String,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut elements: Vec<Element> = Vec::new();

    for record in records {
        let key = key_fn(record);
        match index.get(&key) {
            Some(&i) => elements[i].value += 1,
            None => {
                index.insert(key.clone(), elements.len());
                elements.push(Element { key, value: 1 });
            }
        }
    }

    Term {
        elements,
        sum: records.len(),
    }
}

pub fn aggregate(records: &[NfsRequest], selection: Selection) -> Term {
    aggregate_by(records, |r| selection.key(r))
}

/// Bar of `round(value / sum * width)` characters, never wider than `width`.
pub fn fill_histogram(sum: usize, value: usize, width: usize) -> String {
    if sum == 0 {
        return String::new();
    }
    let (sum, value, width) = (sum as u128, value.min(sum) as u128, width as u128);
    let filled = (2 * value * width + sum) / (2 * sum);
    "|".repeat(filled as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_in_first_seen_order() {
        let records = ["b", "a", "b", "c", "b", "a"];
        let term = aggregate_by(&records, |s| s.to_string());
        let pairs: Vec<_> = term.iter().map(|e| (e.key.as_str(), e.value)).collect();
        assert_eq!(pairs, [("b", 3), ("a", 2), ("c", 1)]);
        assert_eq!(term.sum(), records.len());
        assert_eq!(term.get("a"), Some(2));
        assert_eq!(term.get("z"), None);
    }

    #[test]
    fn empty_input() {
        let records: [&str; 0] = [];
        let term = aggregate_by(&records, |s| s.to_string());
        assert!(term.is_empty());
        assert_eq!(term.sum(), 0);
    }

    #[test]
    fn sum_matches_counts() {
        let records: Vec<u32> = (0..1000).map(|i| (i * 7919) % 13).collect();
        let term = aggregate_by(&records, |n| (n % 5).to_string());
        assert_eq!(term.sum(), records.len());
        assert_eq!(term.iter().map(|e| e.value).sum::<usize>(), records.len());
        for e in term.iter() {
            let expected = records.iter().filter(|n| (*n % 5).to_string() == e.key).count();
            assert_eq!(e.value, expected);
        }
    }

    #[test]
    fn histogram_bounds() {
        assert_eq!(fill_histogram(0, 0, 40), "");
        assert_eq!(fill_histogram(0, 5, 40), "");
        assert_eq!(fill_histogram(4, 4, 40).len(), 40);
        assert_eq!(fill_histogram(4, 0, 40).len(), 0);
        assert_eq!(fill_histogram(4, 1, 10).len(), 3);
        assert_eq!(fill_histogram(3, 1, 10).len(), 3);
        for sum in 1..50 {
            for value in 0..=sum {
                let len = fill_histogram(sum, value, 33).len();
                assert!(len <= 33);
            }
        }
        assert_eq!(fill_histogram(2, 9, 10).len(), 10);
    }

    #[test]
    fn selection_keys_and_cell() {
        assert_eq!(Selection::from_key('o'), Some(Selection::ByOpCode));
        assert_eq!(Selection::from_key('x'), None);

        let cell = SharedSelection::default();
        assert_eq!(cell.get(), Selection::ByClient);
        let other = cell.clone();
        other.set(Selection::ByUser);
        assert_eq!(cell.get(), Selection::ByUser);
        assert_eq!(Selection::ByOpCode.to_string(), "operation");
    }
}
