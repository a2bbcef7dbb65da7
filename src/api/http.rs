use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{
    AppError, DEFAULT_LOOKBACK_YEARS, DEFAULT_SIMULATIONS, DEFAULT_YEARS, RunParams,
    build_run_config, fetch_price_series, simulate_from_prices,
};
use crate::market::PriceSource;

#[derive(Clone)]
struct AppState {
    source: Arc<dyn PriceSource>,
}

#[derive(Debug, Deserialize)]
struct FundPayload {
    ticker: String,
    weight: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_balance: Option<f64>,
    annual_contribution: Option<f64>,
    years: Option<u32>,
    annual_expenses: Option<f64>,
    bond_percent: Option<f64>,
    funds: Option<Vec<FundPayload>>,
    simulations: Option<u32>,
    lookback_years: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16, source: Arc<dyn PriceSource>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(AppState { source });

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fire-sim HTTP API listening");
    println!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(state)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload, Local::now().date_naive()).await
}

async fn simulate_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload, Local::now().date_naive()).await
}

async fn simulate_handler_impl(
    state: &AppState,
    payload: SimulatePayload,
    today: NaiveDate,
) -> Response {
    match simulate_request(state, payload, today).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "simulation request failed");
            error_response(status_for(&e), &e.to_string())
        }
    }
}

async fn simulate_request(
    state: &AppState,
    payload: SimulatePayload,
    today: NaiveDate,
) -> Result<Response, AppError> {
    let config = build_run_config(run_params_from_payload(payload))?;
    let series = fetch_price_series(&config, state.source.as_ref(), today).await?;

    let run = tokio::task::spawn_blocking(move || simulate_from_prices(&config, &series, today))
        .await
        .map_err(|e| AppError::Task(e.to_string()))??;
    Ok(json_response(StatusCode::OK, run.report))
}

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Fire(_) | AppError::Config(_) => StatusCode::BAD_REQUEST,
        AppError::Market(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn run_params_from_payload(payload: SimulatePayload) -> RunParams {
    let defaults = default_params_for_api();
    let funds: Vec<(String, f64)> = payload
        .funds
        .unwrap_or_default()
        .into_iter()
        .map(|fund| (fund.ticker.trim().to_uppercase(), fund.weight))
        .collect();
    // An explicit fund list replaces the default bond split.
    let bond_percent = match payload.bond_percent {
        Some(b) => Some(b),
        None if funds.is_empty() => defaults.bond_percent,
        None => None,
    };

    RunParams {
        current_balance: payload.current_balance.unwrap_or(defaults.current_balance),
        annual_contribution: payload
            .annual_contribution
            .unwrap_or(defaults.annual_contribution),
        years: payload.years.unwrap_or(defaults.years),
        annual_expenses: payload.annual_expenses.unwrap_or(defaults.annual_expenses),
        bond_percent,
        funds,
        simulations: payload.simulations.unwrap_or(defaults.simulations),
        lookback_years: payload.lookback_years.unwrap_or(defaults.lookback_years),
        seed: payload.seed,
    }
}

fn default_params_for_api() -> RunParams {
    RunParams {
        current_balance: 100_000.0,
        annual_contribution: 20_000.0,
        years: DEFAULT_YEARS,
        annual_expenses: 40_000.0,
        bond_percent: Some(15.0),
        funds: Vec::new(),
        simulations: DEFAULT_SIMULATIONS,
        lookback_years: DEFAULT_LOOKBACK_YEARS,
        seed: None,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::history_range;
    use crate::api::test_support::synthetic_prices_csv;
    use crate::market::CsvSource;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payload_from_json(json: &str) -> SimulatePayload {
        serde_json::from_str(json).expect("valid payload")
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn payload_parses_camel_case_keys() {
        let payload = payload_from_json(
            r#"{
                "currentBalance": 250000,
                "annualContribution": 18000,
                "years": 12,
                "annualExpenses": 50000,
                "funds": [
                    {"ticker": "fskax", "weight": 0.8},
                    {"ticker": "FXNAX", "weight": 0.2}
                ],
                "simulations": 500,
                "lookbackYears": 10,
                "seed": 7
            }"#,
        );
        let params = run_params_from_payload(payload);

        assert_eq!(params.current_balance, 250_000.0);
        assert_eq!(params.annual_contribution, 18_000.0);
        assert_eq!(params.years, 12);
        assert_eq!(params.annual_expenses, 50_000.0);
        assert_eq!(params.bond_percent, None);
        assert_eq!(
            params.funds,
            vec![("FSKAX".to_string(), 0.8), ("FXNAX".to_string(), 0.2)]
        );
        assert_eq!(params.simulations, 500);
        assert_eq!(params.lookback_years, 10);
        assert_eq!(params.seed, Some(7));
    }

    #[test]
    fn empty_payload_uses_api_defaults() {
        let params = run_params_from_payload(payload_from_json("{}"));
        assert_eq!(params.years, DEFAULT_YEARS);
        assert_eq!(params.simulations, DEFAULT_SIMULATIONS);
        assert_eq!(params.lookback_years, DEFAULT_LOOKBACK_YEARS);
        assert_eq!(params.bond_percent, Some(15.0));
        assert!(params.funds.is_empty());
        assert!(params.seed.is_none());
    }

    #[test]
    fn error_statuses_follow_error_kind() {
        assert_eq!(
            status_for(&AppError::Config("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AppError::Market(crate::market::MarketDataError::RateLimited(
                "VTSAX".to_string()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AppError::Task("panicked".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn simulate_returns_report_json() {
        let today = ymd(2025, 1, 10);
        let (start, end) = history_range(today, 3).unwrap();
        let file = synthetic_prices_csv(
            &[("VTSAX", 80.0, 0.09), ("VGTSX", 18.0, 0.05), ("VBMFX", 10.0, 0.02)],
            start,
            end,
        );
        let state = AppState {
            source: Arc::new(CsvSource::new(file.path())),
        };
        let payload = payload_from_json(
            r#"{"currentBalance": 10000, "annualContribution": 1200, "years": 5,
                "annualExpenses": 0, "bondPercent": 15, "simulations": 50,
                "lookbackYears": 3, "seed": 7}"#,
        );

        let response = simulate_handler_impl(&state, payload, today).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let body = body_json(response).await;
        assert_eq!(body["summary"]["seed"], 7);
        assert_eq!(body["summary"]["simulations"], 50);
        assert!(body["summary"]["fire"].is_null());
        assert_eq!(body["allocation"]["holdings"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_request_is_bad_request() {
        let state = AppState {
            source: Arc::new(CsvSource::new("/nonexistent/prices.csv")),
        };
        let payload = payload_from_json(r#"{"years": 0}"#);

        let response = simulate_handler_impl(&state, payload, ymd(2025, 1, 10)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("--years"));
    }

    #[tokio::test]
    async fn market_data_failure_is_bad_gateway() {
        let state = AppState {
            source: Arc::new(CsvSource::new("/nonexistent/prices.csv")),
        };
        let payload = payload_from_json(r#"{"simulations": 10, "seed": 1}"#);

        let response = simulate_handler_impl(&state, payload, ymd(2025, 1, 10)).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Not found");
    }
}
