//! Id-keyed artifact merge.
//!
//! New ids are prepended in batch order; existing entries keep their
//! position and field values. The first occurrence of an id always wins.

use std::collections::HashSet;

use crate::types::{Artifact, ArtifactId};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Most-recent-first collection after the merge.
    pub collection: Vec<Artifact>,
    /// Candidates that were actually inserted, in insertion order.
    pub inserted: Vec<Artifact>,
}

pub fn merge(
    existing: Vec<Artifact>,
    candidates: impl IntoIterator<Item = Artifact>,
) -> MergeOutcome {
    let mut seen: HashSet<ArtifactId> = existing.iter().map(|a| a.id.clone()).collect();
    let inserted: Vec<Artifact> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.id.clone()))
        .collect();

    let mut collection = Vec::with_capacity(inserted.len() + existing.len());
    collection.extend(inserted.iter().cloned());
    collection.extend(existing);

    MergeOutcome {
        collection,
        inserted,
    }
}
