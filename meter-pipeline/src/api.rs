use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use meter_client::domain::{parse_date, DateRange, Granularity, GranularityError, MetricKey};
use serde::{Deserialize, Serialize};
use time::macros::date;

use crate::{
    cache::SeriesCache,
    config::AppConfig,
    pipeline::{
        build_series_set, Outcome, OutcomeStatus, PipelineError, PipelineSettings, RecordFailure,
        Warning,
    },
    resolver::{resolve, ResolverConfig, SeriesSelector, SeriesSet},
    sinks::{export, records, ExportConfig, ExportFormat, ExportRecord},
    sources::{raw::RawDataset, sample_dataset},
};

const SAMPLE_FIRST_DAY: time::Date = date!(2020-01-01);
const SAMPLE_DEFAULT_DAYS: u32 = 90;
const SAMPLE_MAX_DAYS: u32 = 3 * 366;
const TRANSFORM_STATUS_HEADER: HeaderName = HeaderName::from_static("x-transform-status");

/// Settings shared by all request handlers.
pub struct AppState {
    pub pipeline: PipelineSettings,
    pub resolver: ResolverConfig,
    pub export: ExportConfig,
    pub cache: Option<SeriesCache>,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            pipeline: cfg.pipeline.clone(),
            resolver: cfg.resolver,
            export: cfg.export.clone(),
            cache: cfg
                .cache
                .enabled
                .then(|| SeriesCache::new(cfg.cache.capacity)),
        }
    }

    fn build(&self, dataset: &RawDataset) -> Result<Arc<Outcome<SeriesSet>>, PipelineError> {
        match &self.cache {
            Some(cache) => cache.get_or_build(dataset, |d| build_series_set(d, &self.pipeline)),
            None => build_series_set(dataset, &self.pipeline).map(Arc::new),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SeriesRequest {
    pub granularity: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(flatten)]
    pub dataset: RawDataset,
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: String,
}

#[derive(Debug, Deserialize)]
struct SampleQuery {
    granularity: String,
    days: Option<u32>,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetricLegend {
    pub key: MetricKey,
    pub label: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub granularity: String,
    pub selected: SeriesSelector,
    pub status: OutcomeStatus,
    pub metrics: Vec<MetricLegend>,
    pub points: Vec<ExportRecord>,
    pub warnings: Vec<Warning>,
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<GranularityError> for ApiError {
    fn from(e: GranularityError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "series request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Combines a granularity name with an optional `from`/`to` range.
///
/// A range is only meaningful for `custom` and must be given whole.
pub fn parse_granularity(
    name: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Granularity, ApiError> {
    let granularity: Granularity = name.parse()?;
    match (from, to) {
        (None, None) => Ok(granularity),
        (Some(from), Some(to)) => match granularity {
            Granularity::Custom(_) => {
                let range = DateRange::new(parse_date(from)?, parse_date(to)?)?;
                Ok(Granularity::Custom(Some(range)))
            }
            other => Err(ApiError::BadRequest(format!(
                "from/to only apply to custom granularity, got {}",
                other.kind()
            ))),
        },
        _ => Err(ApiError::BadRequest(
            "from and to must be given together".to_string(),
        )),
    }
}

/// Resolves `granularity` against a built set and shapes the response body.
pub fn series_response(
    outcome: &Outcome<SeriesSet>,
    granularity: &Granularity,
    resolver: &ResolverConfig,
) -> Result<SeriesResponse, PipelineError> {
    let resolved = resolve(&outcome.value, granularity, resolver);
    let config = resolved.series.config();
    let metrics = config
        .keys()
        .filter_map(|key| {
            config.style(key).map(|style| MetricLegend {
                key,
                label: style.label.clone(),
                color: style.color.clone(),
            })
        })
        .collect();

    Ok(SeriesResponse {
        granularity: granularity.kind().to_string(),
        selected: resolved.selector,
        status: outcome.report.status(),
        metrics,
        points: records(&resolved.series)?,
        warnings: outcome.report.warnings.clone(),
        failures: outcome.report.failures.clone(),
    })
}

async fn post_series(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SeriesRequest>,
) -> Result<Json<SeriesResponse>, ApiError> {
    metrics::counter!("http_series_requests_total").increment(1);

    let granularity = parse_granularity(&req.granularity, req.from.as_deref(), req.to.as_deref())?;
    let outcome = state.build(&req.dataset)?;
    Ok(Json(series_response(&outcome, &granularity, &state.resolver)?))
}

async fn post_export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
    Json(req): Json<SeriesRequest>,
) -> Result<Response, ApiError> {
    metrics::counter!("http_series_requests_total").increment(1);

    let format: ExportFormat = query
        .format
        .parse()
        .map_err(|e: PipelineError| ApiError::BadRequest(e.to_string()))?;
    let granularity = parse_granularity(&req.granularity, req.from.as_deref(), req.to.as_deref())?;
    let outcome = state.build(&req.dataset)?;
    let resolved = resolve(&outcome.value, &granularity, &state.resolver);
    let body = export(&resolved.series, format, &state.export)?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type()),
            (TRANSFORM_STATUS_HEADER, outcome.report.status().as_str()),
        ],
        body,
    )
        .into_response())
}

async fn get_sample_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SampleQuery>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let days = query.days.unwrap_or(SAMPLE_DEFAULT_DAYS);
    if days == 0 || days > SAMPLE_MAX_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {SAMPLE_MAX_DAYS}"
        )));
    }
    let granularity = parse_granularity(&query.granularity, query.from.as_deref(), query.to.as_deref())?;
    let dataset = sample_dataset(SAMPLE_FIRST_DAY, days)?;
    let outcome = state.build(&dataset)?;
    Ok(Json(series_response(&outcome, &granularity, &state.resolver)?))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/series", post(post_series))
        .route("/export", post(post_export))
        .route("/sample/series", get(get_sample_series))
        .with_state(Arc::new(state))
}

/// Serves the API on `bind_addr` until the listener fails.
pub async fn serve(bind_addr: &str, state: AppState) -> Result<(), PipelineError> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| PipelineError::Config(format!("invalid server bind address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PipelineError::Source(format!("failed to bind API listener on {addr}: {e}")))?;

    tracing::info!(%addr, "series API listening");
    axum::serve(listener, router(state).into_make_service())
        .await
        .map_err(|e| PipelineError::Source(format!("API server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_applies_to_custom_only() {
        let g = parse_granularity("custom", Some("2024-01-01"), Some("2024-02-01")).unwrap();
        assert_eq!(
            g.range().map(|r| (r.start(), r.end())),
            Some((date!(2024-01-01), date!(2024-02-01)))
        );
        assert!(matches!(
            parse_granularity("month", Some("2024-01-01"), Some("2024-02-01")),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_granularity("custom", Some("2024-01-01"), None),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            parse_granularity("weekly", None, None),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn request_body_carries_dataset_inline() {
        let req: SeriesRequest = serde_json::from_str(
            r#"{"granularity": "year", "esl-data": [{"month": "2024-01-01", "data": []}]}"#,
        )
        .unwrap();
        assert_eq!(req.granularity, "year");
        assert!(req.from.is_none());
        assert_eq!(req.dataset.esl.len(), 1);
        assert!(req.dataset.sdat.is_empty());
    }

    #[test]
    fn sample_month_response_uses_daily_series() {
        let state = AppState::from_config(&AppConfig::default());
        let dataset = sample_dataset(SAMPLE_FIRST_DAY, 31).unwrap();
        let outcome = state.build(&dataset).unwrap();

        let body = series_response(&outcome, &Granularity::Month, &state.resolver).unwrap();
        assert_eq!(body.selected, SeriesSelector::Daily);
        assert_eq!(body.status, OutcomeStatus::Complete);
        assert_eq!(body.points.len(), 31);
        let keys: Vec<_> = body.metrics.iter().map(|m| m.key).collect();
        assert_eq!(keys, vec![MetricKey::Purchase, MetricKey::FeedIn]);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["selected"], "daily");
        assert_eq!(json["points"][0]["date"], "2020-01-01");
        assert_eq!(json["points"][0]["reading_count"], 2);
    }

    #[test]
    fn cached_state_reuses_built_set() {
        let mut cfg = AppConfig::default();
        cfg.cache.enabled = true;
        let state = AppState::from_config(&cfg);
        let dataset = sample_dataset(SAMPLE_FIRST_DAY, 3).unwrap();

        let a = state.build(&dataset).unwrap();
        let b = state.build(&dataset).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
