//! Static address binding tables
//!
//! Operator-supplied ground truth for spoofing checks. A table is built once
//! before traffic is processed and is only read afterwards.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::net::Ipv4Addr;

use super::types::MacAddr;

/// Immutable mapping from an authoritative address to its trusted counterpart
#[derive(Debug, Clone)]
pub struct BindingTable<K, V> {
    entries: HashMap<K, V>,
}

/// IP -> MAC bindings used by ARP inspection
pub type ArpBindings = BindingTable<Ipv4Addr, MacAddr>;

/// MAC -> IP bindings used by IP source guard
pub type SourceBindings = BindingTable<MacAddr, Ipv4Addr>;

impl<K, V> BindingTable<K, V>
where
    K: Eq + Hash,
{
    /// Trusted counterpart for `key`, or `None` if the address is not under protection
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for BindingTable<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K, V> fmt::Display for BindingTable<K, V>
where
    K: fmt::Display + Ord,
    V: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in sorted {
            writeln!(f, "{} -> {}", key, value)?;
        }
        Ok(())
    }
}
