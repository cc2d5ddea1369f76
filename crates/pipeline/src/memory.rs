//! In-memory implementations of the storage ports.
//!
//! Used by tests and by single-process runs that export the manuscript at
//! the end. Both stores are safe to share behind `Arc`; locks are never held
//! across an `.await`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    ChapterNumber, ChapterRecord, ProjectId, ProjectState, ProjectStore, QualityScore,
    RevisionAttempt, StoreError, SummaryKey, SummaryRange, SummaryRecord, SummaryStore,
};

// ---------------------------------------------------------------------------
// Project store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ProjectData {
    state: Option<ProjectState>,
    chapters: BTreeMap<ChapterNumber, ChapterRecord>,
    attempts: BTreeMap<ChapterNumber, Vec<RevisionAttempt>>,
    scores: BTreeMap<ChapterNumber, Vec<QualityScore>>,
}

/// [`ProjectStore`] backed by a map per project.
#[derive(Default)]
pub struct InMemoryProjectStore {
    projects: Mutex<HashMap<ProjectId, ProjectData>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn save_project(&self, state: &ProjectState) -> Result<(), StoreError> {
        self.projects
            .lock()
            .entry(state.id.clone())
            .or_default()
            .state = Some(state.clone());
        Ok(())
    }

    async fn load_project(&self, project: &ProjectId) -> Result<Option<ProjectState>, StoreError> {
        Ok(self
            .projects
            .lock()
            .get(project)
            .and_then(|p| p.state.clone()))
    }

    async fn save_chapter(
        &self,
        project: &ProjectId,
        chapter: &ChapterRecord,
    ) -> Result<(), StoreError> {
        self.projects
            .lock()
            .entry(project.clone())
            .or_default()
            .chapters
            .insert(chapter.number, chapter.clone());
        Ok(())
    }

    async fn chapter(
        &self,
        project: &ProjectId,
        number: ChapterNumber,
    ) -> Result<Option<ChapterRecord>, StoreError> {
        Ok(self
            .projects
            .lock()
            .get(project)
            .and_then(|p| p.chapters.get(&number).cloned()))
    }

    async fn chapters(
        &self,
        project: &ProjectId,
        start: ChapterNumber,
        end: ChapterNumber,
    ) -> Result<Vec<ChapterRecord>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .projects
            .lock()
            .get(project)
            .map(|p| p.chapters.range(start..=end).map(|(_, c)| c.clone()).collect())
            .unwrap_or_default())
    }

    async fn append_attempt(
        &self,
        project: &ProjectId,
        attempt: &RevisionAttempt,
    ) -> Result<(), StoreError> {
        self.projects
            .lock()
            .entry(project.clone())
            .or_default()
            .attempts
            .entry(attempt.chapter)
            .or_default()
            .push(attempt.clone());
        Ok(())
    }

    async fn attempts(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<RevisionAttempt>, StoreError> {
        Ok(self
            .projects
            .lock()
            .get(project)
            .and_then(|p| p.attempts.get(&chapter).cloned())
            .unwrap_or_default())
    }

    async fn save_score(
        &self,
        project: &ProjectId,
        score: &QualityScore,
    ) -> Result<(), StoreError> {
        self.projects
            .lock()
            .entry(project.clone())
            .or_default()
            .scores
            .entry(score.chapter())
            .or_default()
            .push(score.clone());
        Ok(())
    }

    async fn scores(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<QualityScore>, StoreError> {
        Ok(self
            .projects
            .lock()
            .get(project)
            .and_then(|p| p.scores.get(&chapter).cloned())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Summary store
// ---------------------------------------------------------------------------

/// Arena of summary records with explicit dependency edges.
///
/// Each meta-summary adds an edge from every source slot to its own slot, so
/// invalidation walks exactly the records built on what was removed.
#[derive(Default)]
struct SummaryArena {
    slots: Vec<Option<SummaryRecord>>,
    free: Vec<usize>,
    by_range: HashMap<SummaryRange, usize>,
    /// source slot -> slots of records built from it
    dependents: HashMap<usize, Vec<usize>>,
}

impl SummaryArena {
    fn insert(&mut self, record: SummaryRecord) -> usize {
        let range = record.range().clone();
        let sources: Vec<usize> = record
            .sources
            .iter()
            .filter_map(|key| self.slot_of(key))
            .collect();

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(record);
                slot
            }
            None => {
                self.slots.push(Some(record));
                self.slots.len() - 1
            }
        };
        self.by_range.insert(range, slot);
        for source in sources {
            self.dependents.entry(source).or_default().push(slot);
        }
        slot
    }

    /// Slot holding exactly `key` (same range and same hash).
    fn slot_of(&self, key: &SummaryKey) -> Option<usize> {
        let slot = *self.by_range.get(&key.range)?;
        match &self.slots[slot] {
            Some(record) if record.key == *key => Some(slot),
            _ => None,
        }
    }

    /// Multi-chapter records of the same project and tier that start where
    /// `record` starts but end earlier. The older range handed to the cache
    /// only ever grows, so these are never read again. Single-chapter records
    /// are the per-chapter summaries and are always kept.
    fn outgrown_by(&self, record: &SummaryRecord) -> Vec<usize> {
        let range = record.range();
        self.by_range
            .iter()
            .filter(|(other, _)| {
                other.project == range.project
                    && other.start == range.start
                    && other.end < range.end
                    && other.chapter_count() > 1
            })
            .filter(|(_, slot)| {
                self.slots[**slot]
                    .as_ref()
                    .is_some_and(|existing| existing.tier == record.tier)
            })
            .map(|(_, slot)| *slot)
            .collect()
    }

    /// Removes `seeds` and everything transitively built from them.
    fn remove_cascading(&mut self, seeds: Vec<usize>) -> Vec<SummaryKey> {
        let mut removed = Vec::new();
        let mut pending = seeds;
        while let Some(slot) = pending.pop() {
            let Some(record) = self.slots.get_mut(slot).and_then(Option::take) else {
                continue;
            };
            if self.by_range.get(record.range()) == Some(&slot) {
                self.by_range.remove(record.range());
            }
            if let Some(children) = self.dependents.remove(&slot) {
                pending.extend(children);
            }
            // Drop edges pointing at the freed slot so a later occupant does
            // not inherit them.
            for children in self.dependents.values_mut() {
                children.retain(|child| *child != slot);
            }
            self.free.push(slot);
            removed.push(record.key);
        }
        removed
    }
}

/// [`SummaryStore`] that keeps records in an arena indexed by range.
#[derive(Default)]
pub struct InMemorySummaryStore {
    arena: Mutex<SummaryArena>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records across all projects.
    pub fn len(&self) -> usize {
        self.arena.lock().by_range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn put(&self, record: SummaryRecord) -> Result<(), StoreError> {
        let mut arena = self.arena.lock();
        // A new record for a range supersedes the old one and whatever was
        // built from it.
        if let Some(previous) = arena.by_range.get(record.range()).copied() {
            arena.remove_cascading(vec![previous]);
        }
        let outgrown = arena.outgrown_by(&record);
        if !outgrown.is_empty() {
            let pruned = arena.remove_cascading(outgrown);
            debug!(range = %record.range(), pruned = pruned.len(), "pruned outgrown summaries");
        }
        arena.insert(record);
        Ok(())
    }

    async fn get(&self, range: &SummaryRange) -> Result<Option<SummaryRecord>, StoreError> {
        let arena = self.arena.lock();
        Ok(arena
            .by_range
            .get(range)
            .and_then(|slot| arena.slots[*slot].clone()))
    }

    async fn invalidate_covering(
        &self,
        project: &ProjectId,
        chapter: ChapterNumber,
    ) -> Result<Vec<SummaryKey>, StoreError> {
        let mut arena = self.arena.lock();
        let seeds: Vec<usize> = arena
            .by_range
            .iter()
            .filter(|(range, _)| range.project == *project && range.covers(chapter))
            .map(|(_, slot)| *slot)
            .collect();
        let mut removed = arena.remove_cascading(seeds);
        removed.sort();
        Ok(removed)
    }

    async fn records(&self, project: &ProjectId) -> Result<Vec<SummaryRecord>, StoreError> {
        let arena = self.arena.lock();
        let mut records: Vec<SummaryRecord> = arena
            .by_range
            .iter()
            .filter(|(range, _)| range.project == *project)
            .filter_map(|(_, slot)| arena.slots[*slot].clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{content_version_hash, Timestamp};

    fn ch(n: u32) -> ChapterNumber {
        ChapterNumber::new(n).unwrap()
    }

    fn key(project: &ProjectId, start: u32, end: u32) -> SummaryKey {
        SummaryKey {
            range: SummaryRange::new(project.clone(), ch(start), ch(end)).unwrap(),
            version_hash: content_version_hash(&[]),
        }
    }

    fn record(key: SummaryKey, tier: u32, sources: Vec<SummaryKey>) -> SummaryRecord {
        SummaryRecord {
            key,
            text: "summary".into(),
            tier,
            created_at: Timestamp::now(),
            sources,
        }
    }

    #[tokio::test]
    async fn test_chapters_returns_ascending_subrange() {
        let store = InMemoryProjectStore::new();
        let project = ProjectId::new("p").unwrap();
        for n in [3, 1, 2, 5] {
            store
                .save_chapter(&project, &ChapterRecord::planned(ch(n), "t"))
                .await
                .unwrap();
        }
        let numbers: Vec<u32> = store
            .chapters(&project, ch(2), ch(5))
            .await
            .unwrap()
            .iter()
            .map(|c| c.number.get())
            .collect();
        assert_eq!(numbers, vec![2, 3, 5]);
        assert!(store.chapters(&project, ch(5), ch(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_follows_dependency_edges_across_tiers() {
        let store = InMemorySummaryStore::new();
        let p = ProjectId::new("p").unwrap();
        let (a, b, c) = (key(&p, 1, 10), key(&p, 11, 20), key(&p, 21, 30));
        let ab = key(&p, 1, 20);
        let abc = key(&p, 1, 30);

        store.put(record(a.clone(), 0, vec![])).await.unwrap();
        store.put(record(b.clone(), 0, vec![])).await.unwrap();
        store.put(record(c.clone(), 0, vec![])).await.unwrap();
        store.put(record(ab.clone(), 1, vec![a.clone(), b.clone()])).await.unwrap();
        store.put(record(abc.clone(), 2, vec![ab.clone(), c.clone()])).await.unwrap();

        // Chapter 25 is covered by [21-30] and [1-30] only.
        let removed = store.invalidate_covering(&p, ch(25)).await.unwrap();
        assert_eq!(removed, {
            let mut v = vec![c, abc];
            v.sort();
            v
        });
        assert_eq!(store.len(), 3);
        assert!(store.get(&ab.range).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_superseding_a_source_drops_its_dependents() {
        let store = InMemorySummaryStore::new();
        let p = ProjectId::new("p").unwrap();
        let (a, b) = (key(&p, 1, 10), key(&p, 11, 20));
        let ab = key(&p, 1, 20);
        store.put(record(a.clone(), 0, vec![])).await.unwrap();
        store.put(record(b.clone(), 0, vec![])).await.unwrap();
        store.put(record(ab.clone(), 1, vec![a.clone(), b])).await.unwrap();

        store.put(record(a.clone(), 0, vec![])).await.unwrap();

        assert!(store.get(&ab.range).await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_growing_prefix_replaces_outgrown_records_of_its_tier() {
        let store = InMemorySummaryStore::new();
        let p = ProjectId::new("p").unwrap();
        let (a, tail18) = (key(&p, 1, 10), key(&p, 11, 18));
        let meta18 = key(&p, 1, 18);
        store.put(record(key(&p, 11, 11), 0, vec![])).await.unwrap();
        store.put(record(a.clone(), 0, vec![])).await.unwrap();
        store.put(record(tail18.clone(), 0, vec![])).await.unwrap();
        store.put(record(meta18.clone(), 1, vec![a.clone(), tail18])).await.unwrap();

        let tail19 = key(&p, 11, 19);
        store.put(record(tail19.clone(), 0, vec![])).await.unwrap();
        store.put(record(key(&p, 1, 19), 1, vec![a, tail19])).await.unwrap();

        let ranges: Vec<(u32, u32, u32)> = store
            .records(&p)
            .await
            .unwrap()
            .iter()
            .map(|r| (r.range().start.get(), r.range().end.get(), r.tier))
            .collect();
        assert_eq!(ranges, vec![(1, 10, 0), (1, 19, 1), (11, 11, 0), (11, 19, 0)]);
    }

    #[tokio::test]
    async fn test_other_projects_are_untouched() {
        let store = InMemorySummaryStore::new();
        let p = ProjectId::new("p").unwrap();
        let q = ProjectId::new("q").unwrap();
        store.put(record(key(&p, 1, 5), 0, vec![])).await.unwrap();
        store.put(record(key(&q, 1, 5), 0, vec![])).await.unwrap();

        store.invalidate_covering(&p, ch(3)).await.unwrap();

        assert!(store.records(&p).await.unwrap().is_empty());
        assert_eq!(store.records(&q).await.unwrap().len(), 1);
    }
}
