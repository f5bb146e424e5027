//! Constraint propagation over the knowledge base.
//!
//! Each person has exactly one image, so a name confirmed for one key is
//! wrong for every other key. Pushing that fact everywhere lets later rounds
//! narrow candidates for images that were never confirmed directly.

use crate::knowledge::KnowledgeBase;
use crate::types::IdentityKey;
use tracing::debug;

impl KnowledgeBase {
    /// Exclude `confirmed` for every tracked key except `source`.
    ///
    /// Returns how many exclusions were newly added; zero on a repeat call.
    pub fn propagate(&mut self, confirmed: &str, source: &IdentityKey) -> usize {
        let mut added = 0;
        for key in self.tracked_keys() {
            if &key == source {
                continue;
            }
            if self
                .excluded
                .entry(key)
                .or_default()
                .insert(confirmed.to_string())
            {
                added += 1;
            }
        }
        if added > 0 {
            debug!("Eliminated '{}' from {} other images", confirmed, added);
        }
        added
    }
}
