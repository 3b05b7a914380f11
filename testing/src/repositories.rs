//! `BTreeMap`-backed repositories.

use nest_core::model::{
    Chunk, ChunkId, Event, EventId, HealthMetricsId, HealthScore, ProjectHealthMetrics, ProjectId,
    RepositoryId,
};
use nest_core::repository::{
    ChunkPage, ChunkQuery, ChunkRepository, EventRepository, HealthMetricsStore, ProjectStore,
    RepositoryError, Result,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory event repository.
///
/// # Example
///
/// ```
/// use nest_core::repository::EventRepository;
/// use nest_testing::{fixtures, InMemoryEventRepository};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repo = InMemoryEventRepository::new();
/// repo.insert(fixtures::event(1, "Global AppSec"));
///
/// let events = repo.list().await?;
/// assert_eq!(events.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventRepository {
    events: Arc<RwLock<BTreeMap<EventId, Event>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEventRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event
    pub fn insert(&self, event: Event) {
        self.events.write().unwrap().insert(event.id, event);
    }

    /// Make every read fail with a storage error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage("connection refused".to_string()));
        }
        Ok(())
    }
}

impl FromIterator<Event> for InMemoryEventRepository {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        let repo = Self::new();
        for event in iter {
            repo.insert(event);
        }
        repo
    }
}

impl EventRepository for InMemoryEventRepository {
    async fn list(&self) -> Result<Vec<Event>> {
        self.check_available()?;
        Ok(self.events.read().unwrap().values().cloned().collect())
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>> {
        self.check_available()?;
        Ok(self.events.read().unwrap().get(&id).cloned())
    }
}

/// In-memory chunk repository with the same search rules as the Postgres one.
#[derive(Clone, Debug, Default)]
pub struct InMemoryChunkRepository {
    chunks: Arc<RwLock<BTreeMap<ChunkId, Chunk>>>,
}

impl InMemoryChunkRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a chunk
    pub fn insert(&self, chunk: Chunk) {
        self.chunks.write().unwrap().insert(chunk.id, chunk);
    }
}

impl FromIterator<Chunk> for InMemoryChunkRepository {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        let repo = Self::new();
        for chunk in iter {
            repo.insert(chunk);
        }
        repo
    }
}

impl ChunkRepository for InMemoryChunkRepository {
    async fn search(&self, query: &ChunkQuery) -> Result<ChunkPage> {
        let chunks = self.chunks.read().unwrap();
        let matching: Vec<&Chunk> = chunks
            .values()
            .rev()
            .filter(|chunk| query.matches(&chunk.text))
            .collect();

        let skip = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(query.per_page).unwrap_or(usize::MAX);

        Ok(ChunkPage {
            chunks: matching.iter().skip(skip).take(take).map(|c| (*c).clone()).collect(),
            count: matching.len() as u64,
            total: chunks.len() as u64,
            page: query.page,
            per_page: query.per_page,
        })
    }
}

/// In-memory health metrics store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHealthMetricsStore {
    rows: Arc<RwLock<BTreeMap<HealthMetricsId, ProjectHealthMetrics>>>,
}

impl InMemoryHealthMetricsStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a metrics row
    pub fn insert(&self, metrics: ProjectHealthMetrics) {
        self.rows.write().unwrap().insert(metrics.id, metrics);
    }
}

impl HealthMetricsStore for InMemoryHealthMetricsStore {
    async fn get(&self, id: HealthMetricsId) -> Result<Option<ProjectHealthMetrics>> {
        Ok(self.rows.read().unwrap().get(&id).cloned())
    }

    async fn set_score(&self, id: HealthMetricsId, score: Option<HealthScore>) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("project health metrics {id}")))?;
        row.score = score;
        Ok(())
    }
}

/// In-memory project-to-repository links.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProjectStore {
    links: Arc<RwLock<BTreeMap<ProjectId, BTreeSet<RepositoryId>>>>,
}

impl InMemoryProjectStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a repository to a project; linking twice is a no-op
    pub fn link(&self, project: ProjectId, repository: RepositoryId) {
        self.links
            .write()
            .unwrap()
            .entry(project)
            .or_default()
            .insert(repository);
    }
}

impl ProjectStore for InMemoryProjectStore {
    async fn repositories(&self, project: ProjectId) -> Result<Vec<RepositoryId>> {
        Ok(self
            .links
            .read()
            .unwrap()
            .get(&project)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }
}
