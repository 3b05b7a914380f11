//! Storage-facing traits for the read surfaces.
//!
//! The web layer only ever reads events and chunks, so the traits expose no
//! write methods for them. Health metrics are written by the scoring job
//! through [`HealthMetricsStore`], which validates every score it accepts.

use crate::model::{
    Chunk, Event, EventId, HealthMetricsId, HealthScore, ProjectHealthMetrics, ProjectId,
    RepositoryId,
};
use std::future::Future;
use thiserror::Error;

/// Errors returned by repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored row could not be turned into a domain value
    #[error("Decode error: {0}")]
    Decode(String),

    /// The addressed row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result alias for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Read-only access to events.
pub trait EventRepository: Send + Sync {
    /// All events, ordered by id ascending.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails.
    fn list(&self) -> impl Future<Output = Result<Vec<Event>>> + Send;

    /// One event, `None` if the id does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails.
    fn get(&self, id: EventId) -> impl Future<Output = Result<Option<Event>>> + Send;
}

/// Search access to chunks for the admin console.
pub trait ChunkRepository: Send + Sync {
    /// Chunks whose text matches every search bit, ordered by id descending
    /// and cut to the requested page.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails.
    fn search(&self, query: &ChunkQuery) -> impl Future<Output = Result<ChunkPage>> + Send;
}

/// Access to project health metrics.
pub trait HealthMetricsStore: Send + Sync {
    /// One metrics row, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails.
    fn get(
        &self,
        id: HealthMetricsId,
    ) -> impl Future<Output = Result<Option<ProjectHealthMetrics>>> + Send;

    /// Set or clear the score.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if the row does not exist.
    fn set_score(
        &self,
        id: HealthMetricsId,
        score: Option<HealthScore>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Project relations that replaced the single `owasp_repository` link.
pub trait ProjectStore: Send + Sync {
    /// Repositories linked to the project, ordered by id.
    ///
    /// An unknown project has no repositories.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails.
    fn repositories(
        &self,
        project: ProjectId,
    ) -> impl Future<Output = Result<Vec<RepositoryId>>> + Send;
}

/// Admin changelist query over chunk text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkQuery {
    /// Raw search box contents
    pub term: String,
    /// Whether substring matching is case-sensitive
    pub case_sensitive: bool,
    /// 1-based page number
    pub page: u32,
    /// Rows per page
    pub per_page: u32,
}

impl Default for ChunkQuery {
    fn default() -> Self {
        Self {
            term: String::new(),
            case_sensitive: false,
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
        }
    }
}

impl ChunkQuery {
    /// Default page size of the changelist.
    pub const DEFAULT_PER_PAGE: u32 = 100;

    /// Query for `term` on the first page.
    #[must_use]
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Self::default()
        }
    }

    /// Select a page; `0` is treated as the first page.
    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Override the page size; `0` is treated as `1`.
    #[must_use]
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Toggle case-sensitive matching.
    #[must_use]
    pub const fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Search bits: the term split on whitespace, with quoted phrases kept
    /// together and their quotes removed. Empty when there is no term.
    #[must_use]
    pub fn bits(&self) -> Vec<String> {
        let mut bits = Vec::new();
        let mut current = String::new();
        let mut quote: Option<char> = None;
        let mut quoted = false;

        for ch in self.term.chars() {
            match quote {
                Some(open) if ch == open => quote = None,
                Some(_) => current.push(ch),
                None if ch == '"' || ch == '\'' => {
                    quote = Some(ch);
                    quoted = true;
                }
                None if ch.is_whitespace() => {
                    if !current.is_empty() || quoted {
                        bits.push(std::mem::take(&mut current));
                    }
                    quoted = false;
                }
                None => current.push(ch),
            }
        }
        if !current.is_empty() || quoted {
            bits.push(current);
        }

        bits.retain(|bit| !bit.is_empty());
        bits
    }

    /// Whether `text` contains every search bit.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let bits = self.bits();
        if self.case_sensitive {
            bits.iter().all(|bit| text.contains(bit.as_str()))
        } else {
            let haystack = text.to_lowercase();
            bits.iter()
                .all(|bit| haystack.contains(bit.to_lowercase().as_str()))
        }
    }

    /// Rows to skip for the selected page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.per_page)
    }
}

/// One page of chunk search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPage {
    /// Rows on this page
    pub chunks: Vec<Chunk>,
    /// Rows matching the search
    pub count: u64,
    /// Rows in the table regardless of search
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Rows per page
    pub per_page: u32,
}

impl ChunkPage {
    /// Number of pages, at least one even when nothing matches.
    #[must_use]
    pub fn num_pages(&self) -> u64 {
        let per_page = u64::from(self.per_page.max(1));
        self.count.div_ceil(per_page).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChunkId;

    #[test]
    fn test_bits_split_on_whitespace() {
        assert_eq!(ChunkQuery::new("  foo   bar ").bits(), vec!["foo", "bar"]);
        assert!(ChunkQuery::new("   ").bits().is_empty());
    }

    #[test]
    fn test_bits_keep_quoted_phrases() {
        let query = ChunkQuery::new(r#"owasp "top ten" 'zap scan'"#);
        assert_eq!(query.bits(), vec!["owasp", "top ten", "zap scan"]);
    }

    #[test]
    fn test_matches_requires_every_bit() {
        let query = ChunkQuery::new("alpha gamma");
        assert!(query.matches("alpha beta gamma"));
        assert!(!query.matches("alpha beta"));
    }

    #[test]
    fn test_matches_case_insensitive_by_default() {
        assert!(ChunkQuery::new("FOO").matches("the foo bar"));
        assert!(!ChunkQuery::new("FOO").case_sensitive(true).matches("the foo bar"));
    }

    #[test]
    fn test_empty_term_matches_everything() {
        assert!(ChunkQuery::default().matches(""));
        assert!(ChunkQuery::default().matches("anything"));
    }

    #[test]
    fn test_offset_and_num_pages() {
        let query = ChunkQuery::new("x").page(3).per_page(10);
        assert_eq!(query.offset(), 20);
        assert_eq!(ChunkQuery::new("x").page(0).offset(), 0);

        let page = ChunkPage {
            chunks: vec![Chunk::new(ChunkId(1), "x", "")],
            count: 21,
            total: 40,
            page: 3,
            per_page: 10,
        };
        assert_eq!(page.num_pages(), 3);

        let empty = ChunkPage {
            chunks: Vec::new(),
            count: 0,
            total: 0,
            page: 1,
            per_page: 100,
        };
        assert_eq!(empty.num_pages(), 1);
    }
}
