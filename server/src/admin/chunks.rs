//! Chunk changelist for the admin console.
//!
//! Shows `id`, `text` and `context`, newest first, with search on `text`
//! using the admin's rules: every whitespace-separated bit (or quoted
//! phrase) must appear in the text.

use super::auth::RequireOperator;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use nest_core::model::Chunk;
use nest_core::repository::{ChunkPage, ChunkQuery, ChunkRepository};
use nest_web::{AppError, WebResult};
use serde::{Deserialize, Serialize};

/// Columns shown by the changelist, in display order.
pub const COLUMNS: [&str; 3] = ["id", "text", "context"];

/// Changelist query string: `?q=<search>&p=<page>`.
#[derive(Debug, Default, Deserialize)]
pub struct ChangeListParams {
    /// Search term
    #[serde(default)]
    pub q: String,
    /// 1-based page number
    pub p: Option<String>,
}

/// One changelist row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRow {
    /// Primary key
    pub id: i64,
    /// Chunk body
    pub text: String,
    /// Surrounding context
    pub context: String,
}

impl From<Chunk> for ChunkRow {
    fn from(chunk: Chunk) -> Self {
        Self {
            id: chunk.id.get(),
            text: chunk.text,
            context: chunk.context,
        }
    }
}

/// Changelist response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeList {
    /// Column names
    pub columns: [&'static str; 3],
    /// Rows on this page
    pub rows: Vec<ChunkRow>,
    /// Rows matching the search
    pub count: u64,
    /// Rows in the table
    pub total: u64,
    /// Current page
    pub page: u32,
    /// Number of pages
    pub num_pages: u64,
    /// Search term as received
    pub query: String,
}

impl ChangeList {
    fn new(page: ChunkPage, query: String) -> Self {
        let num_pages = page.num_pages();
        Self {
            columns: COLUMNS,
            count: page.count,
            total: page.total,
            page: page.page,
            num_pages,
            rows: page.chunks.into_iter().map(ChunkRow::from).collect(),
            query,
        }
    }
}

fn parse_page(raw: Option<&str>) -> WebResult<u32> {
    match raw {
        None => Ok(1),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(page) if page >= 1 => Ok(page),
            _ => Err(AppError::bad_request(format!("Invalid page '{raw}'"))),
        },
    }
}

/// Search and page chunks.
///
/// # Example
///
/// ```bash
/// curl -H "Authorization: Bearer $ADMIN_OPERATOR_TOKEN" \
///   "http://localhost:8000/admin/ai/chunk?q=%22cross+site%22+xss&p=2"
/// ```
///
/// # Errors
///
/// Returns 401/403 from [`RequireOperator`], 400 for a page that is not a
/// positive integer or lies past the last page, and 500 if the repository
/// fails.
pub async fn changelist<E, C>(
    _operator: RequireOperator,
    State(state): State<AppState<E, C>>,
    Query(params): Query<ChangeListParams>,
) -> WebResult<Json<ChangeList>>
where
    C: ChunkRepository,
{
    let page = parse_page(params.p.as_deref())?;
    let query = ChunkQuery::new(params.q.clone())
        .case_sensitive(state.admin.case_sensitive)
        .per_page(state.admin.per_page)
        .page(page);

    let result = state.chunks.search(&query).await?;
    if u64::from(page) > result.num_pages() {
        return Err(AppError::bad_request(format!("Invalid page '{page}'")));
    }

    metrics::counter!("admin.chunk.searches").increment(1);
    tracing::info!(
        term = %params.q,
        page,
        count = result.count,
        "Chunk changelist"
    );

    Ok(Json(ChangeList::new(result, params.q)))
}
