use std::collections::HashMap;
use std::hash::Hash;

/// Bijection between entity identifiers and dense positions.
///
/// Built once per computation and dropped with it. Identifiers are laid out in
/// ascending order, so the same set of ids always yields the same positions.
#[derive(Debug, Clone)]
pub struct IndexMap<K> {
    ids: Vec<K>,
    positions: HashMap<K, usize>,
}

impl<K> IndexMap<K>
where
    K: Clone + Eq + Hash + Ord,
{
    /// Indexes the distinct ids of `ids`; duplicates collapse to one position
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut ids: Vec<K> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        let positions = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.clone(), position))
            .collect();

        Self { ids, positions }
    }

    pub fn position(&self, id: &K) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn id(&self, position: usize) -> Option<&K> {
        self.ids.get(position)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &K)> {
        self.ids.iter().enumerate()
    }
}
