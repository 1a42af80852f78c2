use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::db::market_repo;
use crate::errors::AppError;
use crate::models::{OutcomeVerdict, StoredMarket};
use crate::oracle::{check_outcome, create_default_ai_oracle_state};
use crate::AppState;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<StoredMarket>>> {
    match market_repo::get_all_markets(&state.db).await {
        Ok(markets) => Json(ApiResponse {
            success: true,
            data: Some(markets),
            error: None,
        }),
        Err(e) => Json(ApiResponse {
            success: false,
            data: None,
            error: Some(e.to_string()),
        }),
    }
}

pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<StoredMarket>>, StatusCode> {
    match market_repo::get_market(&state.db, &id).await {
        Ok(Some(market)) => Ok(Json(ApiResponse {
            success: true,
            data: Some(market),
            error: None,
        })),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// On-demand single-shot check. Returns the verdict without persisting —
/// the scheduler remains the only writer of oracle state.
pub async fn check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OutcomeVerdict>>, AppError> {
    let market = market_repo::get_market(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("market {id}")))?;

    let request = match &market.oracle {
        Some(oracle) => oracle.request.clone(),
        None => create_default_ai_oracle_state(&market).request,
    };

    let verdict = check_outcome(&state.oracle, &request).await?;
    Ok(Json(ApiResponse {
        success: true,
        data: Some(verdict),
        error: None,
    }))
}
