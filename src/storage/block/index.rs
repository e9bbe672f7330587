//! Index block codec - separators and child RBNs.
//!
//! # Layout
//! ```text
//! I\n<key1>,<key2>,...;<rbn1>,<rbn2>,...\n
//! ```
//! A node with `n` separator keys has `n + 1` children. Separator `i` is the
//! largest key reachable through child `i`; the last child has no separator
//! in this node.

use crate::common::{Error, Rbn, Result};
use crate::record::Key;

use super::BlockKind;

/// An index node: ordered separators and one more child than separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBlock {
    keys: Vec<Key>,
    children: Vec<Rbn>,
    order: usize,
}

impl IndexBlock {
    /// Create an index node with no separators and no children yet.
    pub fn new(order: usize) -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
            order,
        }
    }

    /// Create an index node from parts.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` unless
    /// `children.len() == keys.len() + 1`.
    pub fn from_parts(order: usize, keys: Vec<Key>, children: Vec<Rbn>) -> Result<Self> {
        if children.len() != keys.len() + 1 {
            return Err(Error::invariant(format!(
                "index node with {} keys has {} children",
                keys.len(),
                children.len()
            )));
        }
        Ok(Self {
            keys,
            children,
            order,
        })
    }

    /// Parse an index node from block bytes (padding may already be trimmed).
    ///
    /// # Errors
    /// Returns `Error::Format` if the index marker is missing or the key or
    /// child lists are malformed.
    pub fn decode(order: usize, bytes: &[u8]) -> Result<Self> {
        if BlockKind::detect(bytes) != BlockKind::Index {
            return Err(Error::format("expected index block marker"));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::format("index block is not valid UTF-8"))?;
        let body = text
            .strip_prefix("I\n")
            .ok_or_else(|| Error::format("index marker not followed by newline"))?
            .trim_end();

        let (keys_part, children_part) = body
            .split_once(';')
            .ok_or_else(|| Error::format("index block missing ';' separator"))?;

        let keys = parse_list::<Key>(keys_part, "separator key")?;
        let children = parse_list::<u32>(children_part, "child RBN")?
            .into_iter()
            .map(|n| Rbn::from_raw(n).ok_or_else(|| Error::format("child RBN 0 in index block")))
            .collect::<Result<Vec<_>>>()?;

        if children.len() != keys.len() + 1 {
            return Err(Error::format(format!(
                "index block has {} keys but {} children",
                keys.len(),
                children.len()
            )));
        }
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::format("index separators are not strictly ascending"));
        }

        Ok(Self {
            keys,
            children,
            order,
        })
    }

    /// Serialize to `I\n<keys>;<children>\n` (unpadded).
    pub fn encode(&self) -> Vec<u8> {
        let keys: Vec<String> = self.keys.iter().map(Key::to_string).collect();
        let children: Vec<String> = self.children.iter().map(|c| c.get().to_string()).collect();
        format!("I\n{};{}\n", keys.join(","), children.join(",")).into_bytes()
    }

    // ========================================================================
    // Separator management
    // ========================================================================

    /// Insert `key` at its sorted position.
    ///
    /// With `right = Some(r)`, the child slot at that position is replaced by
    /// `[left, r]` (or both are appended to an empty node); this is how a new
    /// root is seeded after a split. Otherwise `left` is inserted immediately
    /// to the right of the new key.
    pub fn insert_separator(&mut self, key: Key, left: Rbn, right: Option<Rbn>) {
        let pos = self.keys.partition_point(|&k| k < key);
        self.keys.insert(pos, key);

        match right {
            Some(right) if pos < self.children.len() => {
                self.children[pos] = left;
                self.children.insert(pos + 1, right);
            }
            Some(right) => {
                self.children.push(left);
                self.children.push(right);
            }
            None => self.children.insert(pos + 1, left),
        }
    }

    /// Remove `key` and the child `child` (matched by value).
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` if either is absent; nothing is
    /// removed in that case.
    pub fn remove_separator(&mut self, key: Key, child: Rbn) -> Result<()> {
        let key_pos = self.keys.iter().position(|&k| k == key);
        let child_pos = self.children.iter().position(|&c| c == child);

        match (key_pos, child_pos) {
            (Some(k), Some(c)) => {
                self.keys.remove(k);
                self.children.remove(c);
                Ok(())
            }
            _ => Err(Error::invariant(format!(
                "index node lacks separator {} / child {}",
                key, child
            ))),
        }
    }

    /// Slot of the child to descend into for `key`: the leftmost `i` with
    /// `key <= keys[i]`, else the last child.
    pub fn child_index_for(&self, key: Key) -> usize {
        self.keys
            .iter()
            .position(|&k| key <= k)
            .unwrap_or(self.keys.len())
    }

    /// Child RBN to descend into for `key`.
    pub fn child_for(&self, key: Key) -> Option<Rbn> {
        self.children.get(self.child_index_for(key)).copied()
    }

    /// Slot holding `child`, if it is one of this node's children.
    pub fn position_of(&self, child: Rbn) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Split around key `mid`: that key is returned for promotion and
    /// everything to its right moves into the returned node.
    ///
    /// # Panics
    /// Panics if `mid >= keys.len()`.
    pub fn split_at(&mut self, mid: usize) -> (Key, IndexBlock) {
        let separator = self.keys[mid];
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        self.keys.truncate(mid);

        let right = IndexBlock {
            keys: right_keys,
            children: right_children,
            order: self.order,
        };
        (separator, right)
    }

    /// Append `separator` then all of `other`'s keys and children.
    pub fn merge_from(&mut self, separator: Key, other: IndexBlock) {
        self.keys.push(separator);
        self.keys.extend(other.keys);
        self.children.extend(other.children);
    }

    // ========================================================================
    // Fill state
    // ========================================================================

    pub fn is_overfilled(&self) -> bool {
        self.keys.len() > self.order
    }

    pub fn is_underfilled(&self) -> bool {
        self.keys.len() < self.order / 2
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Largest separator (not necessarily the subtree maximum).
    pub fn largest_key(&self) -> Option<Key> {
        self.keys.last().copied()
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn children(&self) -> &[Rbn] {
        &self.children
    }

    pub fn separator_at(&self, slot: usize) -> Option<Key> {
        self.keys.get(slot).copied()
    }

    /// Overwrite separator `slot`; returns `true` if the value changed.
    pub fn set_separator(&mut self, slot: usize, key: Key) -> bool {
        match self.keys.get_mut(slot) {
            Some(k) if *k != key => {
                *k = key;
                true
            }
            _ => false,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

fn parse_list<T: std::str::FromStr>(raw: &str, what: &str) -> Result<Vec<T>> {
    raw.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            item.trim()
                .parse()
                .map_err(|_| Error::format(format!("invalid {} {:?}", what, item)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rbns(ns: &[u32]) -> Vec<Rbn> {
        ns.iter().map(|&n| Rbn::new(n)).collect()
    }

    fn node(keys: &[Key], children: &[u32]) -> IndexBlock {
        IndexBlock::from_parts(4, keys.to_vec(), rbns(children)).unwrap()
    }

    // --- codec ---

    #[test]
    fn test_encode_layout() {
        let n = node(&[55408, 55414], &[2, 3, 4]);
        assert_eq!(n.encode(), b"I\n55408,55414;2,3,4\n");
    }

    #[test]
    fn test_decode_roundtrip_trimmed() {
        let n = node(&[10, 20, 30], &[5, 6, 7, 8]);
        let mut bytes = n.encode();
        bytes.pop(); // block store trims the trailing newline
        assert_eq!(IndexBlock::decode(4, &bytes).unwrap(), n);
    }

    #[test]
    fn test_decode_single_child() {
        let n = IndexBlock::decode(4, b"I\n;7").unwrap();
        assert!(n.keys().is_empty());
        assert_eq!(n.children(), &rbns(&[7])[..]);
    }

    #[test]
    fn test_decode_rejects_leaf_and_garbage() {
        assert!(IndexBlock::decode(4, b"0,0,0\n").is_err());
        assert!(IndexBlock::decode(4, b"I\n1,2\n").is_err());
        assert!(IndexBlock::decode(4, b"I\n1,2;3\n").is_err());
        assert!(IndexBlock::decode(4, b"I\n2,1;3,4,5\n").is_err());
    }

    #[test]
    fn test_from_parts_checks_arity() {
        assert!(IndexBlock::from_parts(4, vec![1], rbns(&[2])).is_err());
    }

    // --- separators ---

    #[test]
    fn test_insert_separator_seeds_root() {
        let mut n = IndexBlock::new(4);
        n.insert_separator(100, Rbn::new(2), Some(Rbn::new(3)));
        assert_eq!(n.keys(), &[100]);
        assert_eq!(n.children(), &rbns(&[2, 3])[..]);
    }

    #[test]
    fn test_insert_separator_right_of_key() {
        let mut n = node(&[10, 30], &[2, 3, 4]);
        // child 3 (keys 11..=30) split: left keeps up to 20, new block 9
        n.insert_separator(20, Rbn::new(9), None);
        assert_eq!(n.keys(), &[10, 20, 30]);
        assert_eq!(n.children(), &rbns(&[2, 3, 9, 4])[..]);
    }

    #[test]
    fn test_insert_separator_replaces_slot() {
        let mut n = node(&[10], &[2, 3]);
        n.insert_separator(20, Rbn::new(5), Some(Rbn::new(6)));
        assert_eq!(n.keys(), &[10, 20]);
        assert_eq!(n.children(), &rbns(&[2, 5, 6])[..]);
    }

    #[test]
    fn test_remove_separator() {
        let mut n = node(&[10, 20, 30], &[2, 3, 4, 5]);
        n.remove_separator(20, Rbn::new(4)).unwrap();
        assert_eq!(n.keys(), &[10, 30]);
        assert_eq!(n.children(), &rbns(&[2, 3, 5])[..]);
    }

    #[test]
    fn test_remove_separator_missing_is_invariant_violation() {
        let mut n = node(&[10, 20], &[2, 3, 4]);
        let before = n.clone();
        assert!(matches!(
            n.remove_separator(15, Rbn::new(3)),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            n.remove_separator(10, Rbn::new(99)),
            Err(Error::InvariantViolation(_))
        ));
        assert_eq!(n, before);
    }

    #[test]
    fn test_child_for_routing() {
        let n = node(&[10, 20], &[2, 3, 4]);
        assert_eq!(n.child_for(5), Some(Rbn::new(2)));
        assert_eq!(n.child_for(10), Some(Rbn::new(2)));
        assert_eq!(n.child_for(11), Some(Rbn::new(3)));
        assert_eq!(n.child_for(20), Some(Rbn::new(3)));
        assert_eq!(n.child_for(21), Some(Rbn::new(4)));
        assert_eq!(IndexBlock::new(4).child_for(1), None);
    }

    // --- split / merge ---

    #[test]
    fn test_split_promotes_median() {
        let mut n = node(&[10, 20, 30, 40, 50], &[1, 2, 3, 4, 5, 6]);
        assert!(n.is_overfilled());

        let (sep, right) = n.split_at(2);
        assert_eq!(sep, 30);
        assert_eq!(n.keys(), &[10, 20]);
        assert_eq!(n.children(), &rbns(&[1, 2, 3])[..]);
        assert_eq!(right.keys(), &[40, 50]);
        assert_eq!(right.children(), &rbns(&[4, 5, 6])[..]);
    }

    #[test]
    fn test_merge_pulls_separator_down() {
        let mut left = node(&[10], &[1, 2]);
        let right = node(&[40], &[3, 4]);
        left.merge_from(25, right);
        assert_eq!(left.keys(), &[10, 25, 40]);
        assert_eq!(left.children(), &rbns(&[1, 2, 3, 4])[..]);
    }

    #[test]
    fn test_fill_state() {
        assert!(node(&[1], &[1, 2]).is_underfilled());
        assert!(!node(&[1, 2], &[1, 2, 3]).is_underfilled());
        assert!(!node(&[1, 2, 3, 4], &[1, 2, 3, 4, 5]).is_overfilled());
    }

    #[test]
    fn test_set_separator_reports_change() {
        let mut n = node(&[10, 20], &[2, 3, 4]);
        assert!(n.set_separator(0, 12));
        assert!(!n.set_separator(0, 12));
        assert!(!n.set_separator(5, 1));
        assert_eq!(n.keys(), &[12, 20]);
    }
}
