//! `PostgreSQL` repositories for events, chunks and health metrics.

use nest_core::model::{
    Chunk, ChunkId, Event, EventId, HealthMetricsId, HealthScore, ProjectHealthMetrics, ProjectId,
    RepositoryId,
};
use nest_core::repository::{
    ChunkPage, ChunkQuery, ChunkRepository, EventRepository, HealthMetricsStore, ProjectStore,
    RepositoryError, Result,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

fn storage(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(error.to_string())
}

#[derive(FromRow)]
struct EventRow {
    id: i64,
    name: String,
    description: String,
    url: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = RepositoryError;

    fn try_from(row: EventRow) -> Result<Self> {
        Self::new(
            EventId(row.id),
            row.name,
            row.description,
            row.url,
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| RepositoryError::Decode(format!("event {}: {e}", row.id)))
    }
}

const EVENT_COLUMNS: &str = "id, name, description, url, created_at, updated_at";

/// Event repository over the `owasp_event` table.
#[derive(Clone, Debug)]
pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    /// Create a repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventRepository for PostgresEventRepository {
    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Event>> {
        let rows: Vec<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM owasp_event ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;

        // A row that fails to decode is left out of the collection; `get`
        // still reports it as a decode error.
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Event::try_from(row)
                    .inspect_err(|e| tracing::warn!(error = %e, "Skipping undecodable event row"))
                    .ok()
            })
            .collect())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: EventId) -> Result<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM owasp_event WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        row.map(Event::try_from).transpose()
    }
}

/// Escape `LIKE` wildcards so a search bit matches literally.
fn like_pattern(bit: &str) -> String {
    let mut escaped = String::with_capacity(bit.len() + 2);
    escaped.push('%');
    for ch in bit.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_search_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &ChunkQuery) {
    let operator = if query.case_sensitive { " LIKE " } else { " ILIKE " };
    for (index, bit) in query.bits().iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        builder.push("text");
        builder.push(operator);
        builder.push_bind(like_pattern(bit));
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| RepositoryError::Storage(format!("{value} out of range")))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| RepositoryError::Decode(format!("negative count {value}")))
}

/// Chunk repository over the `ai_chunk` table.
#[derive(Clone, Debug)]
pub struct PostgresChunkRepository {
    pool: PgPool,
}

impl PostgresChunkRepository {
    /// Create a repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ChunkRepository for PostgresChunkRepository {
    #[tracing::instrument(skip(self, query), fields(term = %query.term, page = query.page))]
    async fn search(&self, query: &ChunkQuery) -> Result<ChunkPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_chunk")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ai_chunk");
        push_search_filter(&mut count_query, query);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;

        let mut page_query = QueryBuilder::<Postgres>::new("SELECT id, text, context FROM ai_chunk");
        push_search_filter(&mut page_query, query);
        page_query.push(" ORDER BY id DESC LIMIT ");
        page_query.push_bind(i64::from(query.per_page));
        page_query.push(" OFFSET ");
        page_query.push_bind(to_i64(query.offset())?);

        let rows: Vec<(i64, String, String)> = page_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        tracing::debug!(count, total, "Chunk search");

        Ok(ChunkPage {
            chunks: rows
                .into_iter()
                .map(|(id, text, context)| Chunk::new(ChunkId(id), text, context))
                .collect(),
            count: to_u64(count)?,
            total: to_u64(total)?,
            page: query.page,
            per_page: query.per_page,
        })
    }
}

/// Health metrics store over the `owasp_projecthealthmetrics` table.
#[derive(Clone, Debug)]
pub struct PostgresHealthMetricsStore {
    pool: PgPool,
}

impl PostgresHealthMetricsStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl HealthMetricsStore for PostgresHealthMetricsStore {
    #[tracing::instrument(skip(self))]
    async fn get(&self, id: HealthMetricsId) -> Result<Option<ProjectHealthMetrics>> {
        let row: Option<(i64, i64, Option<f64>)> = sqlx::query_as(
            "SELECT id, project_id, score FROM owasp_projecthealthmetrics WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(|(id, project_id, score)| {
            let score = score
                .map(HealthScore::new)
                .transpose()
                .map_err(|e| RepositoryError::Decode(format!("health metrics {id}: {e}")))?;
            Ok(ProjectHealthMetrics {
                id: HealthMetricsId(id),
                project_id: ProjectId(project_id),
                score,
            })
        })
        .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn set_score(&self, id: HealthMetricsId, score: Option<HealthScore>) -> Result<()> {
        let result = sqlx::query("UPDATE owasp_projecthealthmetrics SET score = $1 WHERE id = $2")
            .bind(score.map(HealthScore::value))
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("project health metrics {id}")));
        }

        metrics::counter!("health_metrics.scored").increment(1);
        Ok(())
    }
}

/// Project relations over the `owasp_project_repositories` join table.
#[derive(Clone, Debug)]
pub struct PostgresProjectStore {
    pool: PgPool,
}

impl PostgresProjectStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProjectStore for PostgresProjectStore {
    #[tracing::instrument(skip(self))]
    async fn repositories(&self, project: ProjectId) -> Result<Vec<RepositoryId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT repository_id FROM owasp_project_repositories \
             WHERE project_id = $1 ORDER BY repository_id",
        )
        .bind(project.get())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(ids.into_iter().map(RepositoryId).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("foo"), "%foo%");
        assert_eq!(like_pattern("50%_off"), r"%50\%\_off%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }

    #[test]
    fn test_search_filter_ands_every_bit() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ai_chunk");
        push_search_filter(&mut builder, &ChunkQuery::new(r#"foo "bar baz""#));
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM ai_chunk WHERE text ILIKE $1 AND text ILIKE $2"
        );

        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ai_chunk");
        push_search_filter(&mut builder, &ChunkQuery::new("Foo").case_sensitive(true));
        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM ai_chunk WHERE text LIKE $1");
    }

    #[test]
    fn test_empty_term_adds_no_filter() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ai_chunk");
        push_search_filter(&mut builder, &ChunkQuery::default());
        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM ai_chunk");
    }
}
