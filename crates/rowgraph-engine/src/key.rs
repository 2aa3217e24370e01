//! Row identity keys.
//!
//! A `RowKey` accumulates the labels and values that identify one logical
//! entity across joined rows. Equality compares the full accumulated
//! sequence; the hash is maintained incrementally so lookups stay cheap as
//! nested keys are combined with their parents.

use rowgraph_core::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq)]
enum KeyPart {
    Label(String),
    Value(Value),
    Key(RowKey),
}

/// Accumulated identity of a row under one mapping plan.
#[derive(Debug, Clone)]
pub struct RowKey {
    parts: Vec<KeyPart>,
    checksum: u64,
}

impl RowKey {
    /// An empty key.
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            checksum: 17,
        }
    }

    /// A key seeded with a plan id.
    pub fn seeded(plan_id: &str) -> Self {
        let mut key = Self::new();
        key.update_label(plan_id);
        key
    }

    /// Append a name such as a column label or plan id.
    pub fn update_label(&mut self, label: &str) {
        let mut hasher = DefaultHasher::new();
        0u8.hash(&mut hasher);
        label.hash(&mut hasher);
        self.push(KeyPart::Label(label.to_string()), hasher.finish());
    }

    /// Append a cell value. Hashed apart from labels, so a label and a
    /// text cell with the same content never collide.
    pub fn update_value(&mut self, value: &Value) {
        let mut hasher = DefaultHasher::new();
        1u8.hash(&mut hasher);
        value.hash_into(&mut hasher);
        self.push(KeyPart::Value(value.clone()), hasher.finish());
    }

    /// Fold another key into this one as a single entry.
    pub fn update_key(&mut self, other: &RowKey) {
        let mut hasher = DefaultHasher::new();
        2u8.hash(&mut hasher);
        other.checksum.hash(&mut hasher);
        self.push(KeyPart::Key(other.clone()), hasher.finish());
    }

    fn push(&mut self, part: KeyPart, part_hash: u64) {
        self.checksum = self
            .checksum
            .wrapping_mul(37)
            .wrapping_add(part_hash);
        self.parts.push(part);
    }

    /// Number of entries accumulated so far, seed included.
    pub fn update_count(&self) -> usize {
        self.parts.len()
    }

    /// A key identifies a row only once something beyond the seed went in.
    pub fn is_stable(&self) -> bool {
        self.update_count() >= 2
    }

    /// Return the key if stable.
    pub fn into_stable(self) -> Option<Self> {
        self.is_stable().then_some(self)
    }

    /// This key extended with a parent key.
    ///
    /// Returns `None` unless both keys are stable: an unstable side means the
    /// row cannot be identified and must never be deduplicated.
    pub fn combine(&self, parent: Option<&RowKey>) -> Option<RowKey> {
        let parent = parent.filter(|p| p.is_stable())?;
        if !self.is_stable() {
            return None;
        }
        let mut combined = self.clone();
        combined.update_key(parent);
        Some(combined)
    }
}

impl Default for RowKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.checksum == other.checksum && self.parts == other.parts
    }
}

// Values compared by keys come from the same columns; NaN keys simply never
// match, which only disables deduplication for such rows.
impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.checksum);
        state.write_usize(self.parts.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key(plan: &str, column: &str, value: i64) -> RowKey {
        let mut key = RowKey::seeded(plan);
        key.update_label(column);
        key.update_value(&Value::BigInt(value));
        key
    }

    #[test]
    fn test_seed_only_is_unstable() {
        let key = RowKey::seeded("blog");
        assert_eq!(key.update_count(), 1);
        assert!(!key.is_stable());
        assert!(key.into_stable().is_none());
    }

    #[test]
    fn test_equal_keys_collide_in_map() {
        let mut map = HashMap::new();
        map.insert(key("blog", "ID", 1), "first");
        assert_eq!(map.get(&key("blog", "ID", 1)), Some(&"first"));
        assert!(map.get(&key("blog", "ID", 2)).is_none());
        assert!(map.get(&key("post", "ID", 1)).is_none());
    }

    #[test]
    fn test_value_type_is_part_of_identity() {
        let mut a = RowKey::seeded("blog");
        a.update_value(&Value::Int(1));
        let mut b = RowKey::seeded("blog");
        b.update_value(&Value::BigInt(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_combine_requires_stable_parent() {
        let child = key("post", "POST_ID", 10);
        let parent = key("blog", "ID", 1);

        let combined = child.combine(Some(&parent)).unwrap();
        assert_eq!(combined.update_count(), child.update_count() + 1);
        assert_ne!(combined, child);
        assert_eq!(combined, child.combine(Some(&parent)).unwrap());

        assert!(child.combine(Some(&RowKey::seeded("blog"))).is_none());
        assert!(child.combine(None).is_none());
        assert!(RowKey::seeded("post").combine(Some(&parent)).is_none());
    }

    #[test]
    fn test_same_child_under_different_parents() {
        let child = key("post", "POST_ID", 10);
        let under_one = child.combine(Some(&key("blog", "ID", 1)));
        let under_two = child.combine(Some(&key("blog", "ID", 2)));
        assert_ne!(under_one, under_two);
    }
}
