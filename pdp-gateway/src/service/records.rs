use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::AppError;
use crate::store::model::{RecordKind, RecordQuery, SortOrder};
use crate::utils::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CidsParams {
    pub filename: Option<String>,
}

/// GET /api/cids
pub async fn list_cids_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CidsParams>,
) -> Result<impl IntoResponse, AppError> {
    let filename = params.filename.as_deref().filter(|f| !f.is_empty());
    let mappings = state.store.list_file_mappings(filename).await?;
    Ok(Json(mappings))
}

fn parse_kind(raw: &str) -> Result<RecordKind, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

/// Builds a query from the request parameters. Unparsable numbers fall back
/// to their defaults and unknown sort columns to the kind's default.
pub fn record_query(kind: RecordKind, params: &HashMap<String, String>) -> RecordQuery {
    let number = |name: &str| params.get(name).and_then(|v| v.parse::<i64>().ok());

    let mut query = RecordQuery::new(kind).sort_by(kind, params.get("sort").map(String::as_str));
    query.limit = number("limit")
        .filter(|l| *l > 0)
        .unwrap_or(RecordQuery::DEFAULT_LIMIT);
    query.offset = number("offset").filter(|o| *o >= 0).unwrap_or(0);
    query.order = SortOrder::parse(params.get("order").map(String::as_str));
    query.search = params.get("search").filter(|s| !s.is_empty()).cloned();
    query.filters = kind
        .filters()
        .iter()
        .filter_map(|(name, filter)| {
            params
                .get(*name)
                .filter(|v| !v.is_empty())
                .map(|v| (*filter, v.clone()))
        })
        .collect();
    query
}

/// GET /api/data/{type}
pub async fn query_data_handler(
    State(state): State<Arc<AppState>>,
    Path(data_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&data_type)?;
    let query = record_query(kind, &params);
    debug!("Querying {} with {:?}", kind.table(), query);

    let page = state.store.query_records(kind, &query).await?;
    Ok(Json(json!({
        "data": page.data,
        "pagination": {
            "total": page.total,
            "limit": query.limit,
            "offset": query.offset,
            "count": page.data.len(),
        },
        "sort": {
            "by": query.sort,
            "order": query.order,
        },
    })))
}

/// GET /api/data/{type}/{cid}
pub async fn get_data_handler(
    State(state): State<Arc<AppState>>,
    Path((data_type, cid)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = parse_kind(&data_type)?;
    let record = state.store.get_record(kind, &cid).await?;
    Ok(Json(json!({ "data": record })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::Filter;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_record_query_defaults() {
        let query = record_query(RecordKind::Genome, &params(&[("limit", "abc"), ("offset", "-3")]));
        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 0);
        assert_eq!(query.sort, "created_at");
        assert_eq!(query.order, SortOrder::Desc);
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_record_query_picks_kind_filters() {
        let query = record_query(
            RecordKind::Spectrum,
            &params(&[
                ("technique", "NMR"),
                ("year", "2020"),
                ("order", "ASC"),
                ("sort", "compound"),
            ]),
        );
        assert_eq!(
            query.filters,
            vec![(Filter::Ilike("technique_nmr_ir_ms"), "NMR".to_string())]
        );
        assert_eq!(query.order, SortOrder::Asc);
        assert_eq!(query.sort, "compound");
    }
}
