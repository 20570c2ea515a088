use super::sro::{DescriptorError, SroDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do with a descriptor key that is absent from a pinned schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnseenKeyPolicy {
    /// Fail vectorization, so the structure is excluded.
    #[default]
    Reject,
    /// Drop the unknown key and keep the remaining columns.
    Ignore,
}

/// The ordered column set used to flatten descriptors into vectors.
///
/// Keys are unique and sorted alphabetically. Once a run has established its
/// schema, every vector used for fitting and prediction must be produced
/// through the same instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    keys: Vec<String>,
}

impl KeySchema {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// The sorted union of the keys of every descriptor.
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a SroDescriptor>,
    {
        Self::new(descriptors.into_iter().flat_map(|d| d.keys().cloned()))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.keys
            .binary_search_by(|probe| probe.as_str().cmp(key))
            .ok()
    }

    /// Flattens `descriptor` into a vector ordered by this schema.
    ///
    /// Keys missing from the descriptor become zero. Keys missing from the
    /// schema are handled according to `policy`.
    pub fn vectorize(
        &self,
        descriptor: &SroDescriptor,
        policy: UnseenKeyPolicy,
    ) -> Result<Vec<f64>, DescriptorError> {
        let mut vector = vec![0.0; self.keys.len()];
        for (key, &count) in descriptor {
            match self.position(key) {
                Some(idx) => vector[idx] = f64::from(count),
                None => match policy {
                    UnseenKeyPolicy::Reject => {
                        return Err(DescriptorError::UnseenKey { key: key.clone() });
                    }
                    UnseenKeyPolicy::Ignore => {
                        tracing::warn!(key = %key, "Ignoring descriptor key outside the pinned schema.");
                    }
                },
            }
        }
        Ok(vector)
    }

    /// Checks that a vector has exactly one value per schema column.
    pub fn check_len(&self, vector: &[f64]) -> Result<(), DescriptorError> {
        if vector.len() != self.keys.len() {
            return Err(DescriptorError::LengthMismatch {
                expected: self.keys.len(),
                found: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(entries: &[(&str, u32)]) -> SroDescriptor {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn schema_is_sorted_union_of_keys() {
        let a = descriptor(&[("FeFe", 3), ("CoFe", 1)]);
        let b = descriptor(&[("CoCo", 2), ("CoFe", 5)]);
        let schema = KeySchema::from_descriptors([&a, &b]);
        assert_eq!(schema.keys(), &["CoCo", "CoFe", "FeFe"]);
    }

    #[test]
    fn vectors_against_union_schema_have_equal_length_and_zero_padding() {
        let a = descriptor(&[("AA", 4), ("AB", 2)]);
        let b = descriptor(&[("AB", 1), ("BB", 7)]);
        let schema = KeySchema::from_descriptors([&a, &b]);

        let va = schema.vectorize(&a, UnseenKeyPolicy::Reject).unwrap();
        let vb = schema.vectorize(&b, UnseenKeyPolicy::Reject).unwrap();

        assert_eq!(va.len(), vb.len());
        assert_eq!(va, vec![4.0, 2.0, 0.0]);
        assert_eq!(vb, vec![0.0, 1.0, 7.0]);
    }

    #[test]
    fn unseen_key_is_rejected_or_ignored_by_policy() {
        let schema = KeySchema::new(["AA", "AB"]);
        let d = descriptor(&[("AA", 1), ("CC", 9)]);

        assert_eq!(
            schema.vectorize(&d, UnseenKeyPolicy::Reject),
            Err(DescriptorError::UnseenKey { key: "CC".into() })
        );
        assert_eq!(
            schema.vectorize(&d, UnseenKeyPolicy::Ignore).unwrap(),
            vec![1.0, 0.0]
        );
    }

    #[test]
    fn duplicate_keys_collapse_and_positions_are_found() {
        let schema = KeySchema::new(["BB", "AA", "BB"]);
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.position("BB"), Some(1));
        assert_eq!(schema.position("CC"), None);
    }

    #[test]
    fn check_len_reports_mismatch() {
        let schema = KeySchema::new(["AA", "AB"]);
        assert!(schema.check_len(&[1.0, 2.0]).is_ok());
        assert_eq!(
            schema.check_len(&[1.0]),
            Err(DescriptorError::LengthMismatch {
                expected: 2,
                found: 1
            })
        );
    }
}
