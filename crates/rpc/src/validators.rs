//! Beacon validator and balance endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use beacon_validator_resolution::{BalanceEntry, ValidatorFilter, ValidatorResponse};
use metrics::counter;
use serde::Deserialize;

use crate::server::{ApiError, DataResponse, SharedState};

type ApiResult<T> = Result<Json<DataResponse<T>>, ApiError>;

/// Query string for listings. Both keys take comma separated values.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidatorsRequest {
    #[serde(default)]
    ids: Option<Vec<String>>,
    #[serde(default)]
    statuses: Option<Vec<String>>,
}

pub(crate) fn routes() -> Router<SharedState> {
    Router::new()
        .route(
            "/eth/v1/beacon/states/:state_id/validators",
            get(handle_get_validators).post(handle_post_validators),
        )
        .route(
            "/eth/v1/beacon/states/:state_id/validators/:validator_id",
            get(handle_get_validator),
        )
        .route(
            "/eth/v1/beacon/states/:state_id/validator_balances",
            get(handle_get_balances).post(handle_post_balances),
        )
}

async fn handle_get_validators(
    State(state): State<SharedState>,
    Path(state_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<ValidatorResponse>> {
    state.record_request();
    let ids = split_list(query.id.as_deref());
    let statuses = split_list(query.status.as_deref());
    let result = list_validators(&state, &state_id, ids, statuses).await;
    respond("validators", result)
}

async fn handle_post_validators(
    State(state): State<SharedState>,
    Path(state_id): Path<String>,
    body: Result<Json<ValidatorsRequest>, JsonRejection>,
) -> ApiResult<Vec<ValidatorResponse>> {
    state.record_request();
    let result = match body {
        Ok(Json(request)) => {
            let ids = non_empty(request.ids);
            let statuses = non_empty(request.statuses);
            list_validators(&state, &state_id, ids, statuses).await
        }
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    };
    respond("validators", result)
}

async fn handle_get_validator(
    State(state): State<SharedState>,
    Path((state_id, validator_id)): Path<(String, String)>,
) -> ApiResult<ValidatorResponse> {
    state.record_request();
    let result = state
        .queries
        .get_validator(&state_id, &validator_id)
        .await
        .map_err(ApiError::from);
    respond("validator", result)
}

async fn handle_get_balances(
    State(state): State<SharedState>,
    Path(state_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<BalanceEntry>> {
    state.record_request();
    let ids = split_list(query.id.as_deref());
    let result = state
        .queries
        .list_balances(&state_id, ids.as_deref())
        .await
        .map_err(ApiError::from);
    respond("validator_balances", result)
}

async fn handle_post_balances(
    State(state): State<SharedState>,
    Path(state_id): Path<String>,
    body: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult<Vec<BalanceEntry>> {
    state.record_request();
    let result = match body {
        Ok(Json(ids)) => {
            let ids = non_empty(Some(ids));
            state
                .queries
                .list_balances(&state_id, ids.as_deref())
                .await
                .map_err(ApiError::from)
        }
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    };
    respond("validator_balances", result)
}

async fn list_validators<S: AsRef<str>>(
    state: &SharedState,
    state_id: &str,
    ids: Option<Vec<S>>,
    statuses: Option<Vec<S>>,
) -> Result<Vec<ValidatorResponse>, ApiError> {
    let filter = ValidatorFilter::parse(ids, statuses)?;
    Ok(state.queries.list_validators(state_id, &filter).await?)
}

fn respond<T>(endpoint: &'static str, result: Result<T, ApiError>) -> ApiResult<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.outcome(),
    };
    counter!(
        "validator_api_requests_total",
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
    result.map(DataResponse::json)
}

/// Split a comma separated parameter. Absent or blank parameters mean
/// "no filter".
fn split_list(value: Option<&str>) -> Option<Vec<&str>> {
    let items = value?
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>();
    (!items.is_empty()).then_some(items)
}

fn non_empty(values: Option<Vec<String>>) -> Option<Vec<String>> {
    values.filter(|values| !values.is_empty())
}
