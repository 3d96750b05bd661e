//! Axum routing over the operations of §6. Thin by design: every handler
//! parses its input, calls into the core (store / schedule_builder /
//! substitutes / analytics), and maps the result through
//! [`crate::error::Error`]'s `IntoResponse` impl. No business logic lives
//! here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::analytics::{AnalyticsReporter, Report};
use crate::config::{AppConfig, ScheduleConfig, ScheduleConfigInput};
use crate::constraints::PenaltyWeights;
use crate::domain::{
    Catalog, EntryId, Group, Lesson, Method, Room, Subject, Teacher, TeacherId, Version, VersionId,
};
use crate::error::{Error, Result};
use crate::schedule_builder;
use crate::solver::{csp::CspParams, ga::GaParams, SolveParams};
use crate::store::Store;
use crate::substitutes::{AssignmentReport, AutoAssignmentEngine, Candidate, ScoreWeights};

pub struct AppState {
    pub store: Arc<Store>,
    pub app_config: AppConfig,
    pub penalty_weights: PenaltyWeights,
    pub score_weights: ScoreWeights,
}

impl AppState {
    fn solve_params(&self) -> SolveParams {
        SolveParams {
            csp: CspParams {
                timeout: self.app_config.csp_timeout,
            },
            ga: GaParams {
                population_size: self.app_config.default_ga_pop_size,
                generations: self.app_config.default_ga_generations,
                mutation_rate: self.app_config.default_ga_mutation_rate,
                penalty_weights: self.penalty_weights,
                ..GaParams::default()
            },
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/catalog", put(replace_catalog))
        .route("/v1/config", get(get_config).put(update_config))
        .route("/v1/schedule/generate", post(generate))
        .route("/v1/schedule/versions/:version_id", get(get_version))
        .route("/v1/analytics/:version_id", get(analytics))
        .route("/v1/substitutions/auto-assign", post(auto_assign))
        .route(
            "/v1/substitutions/entries/:entry_id/suggestions",
            get(ranked_suggestions),
        )
        .route("/v1/substitutions/assign", post(assign_substitute))
        .route("/v1/substitutions/cancel", post(cancel_class))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Process entry point: an empty catalog and the default schedule
/// configuration, exactly as the store's own `Default`s describe. Seeding
/// real data is a `PUT /v1/catalog` call away (§6's persistence layout is
/// otherwise out of scope for this binary).
pub async fn run_server(app_config: AppConfig) {
    let store = Arc::new(Store::new(Catalog::default(), ScheduleConfig::default()));
    let state = Arc::new(AppState {
        store,
        penalty_weights: PenaltyWeights::default(),
        score_weights: ScoreWeights::default(),
        app_config: app_config.clone(),
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&app_config.bind_address)
        .await
        .expect("failed to bind listener");
    info!("server listening on http://{}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("server loop failed");
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogInput {
    #[serde(default)]
    teachers: Vec<Teacher>,
    #[serde(default)]
    rooms: Vec<Room>,
    #[serde(default)]
    subjects: Vec<Subject>,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    lessons: Vec<Lesson>,
}

async fn replace_catalog(State(state): State<Arc<AppState>>, Json(input): Json<CatalogInput>) -> Result<Json<Catalog>> {
    let catalog = state
        .store
        .replace_entities(input.teachers, input.rooms, input.subjects, input.groups, input.lessons)?;
    Ok(Json(catalog))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<ScheduleConfig> {
    Json(state.store.schedule_config())
}

async fn update_config(State(state): State<Arc<AppState>>, Json(input): Json<ScheduleConfigInput>) -> Result<Json<ScheduleConfig>> {
    Ok(Json(state.store.update_schedule_config(input)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    method: Method,
    version_name: String,
    /// When true, the handler returns immediately with a `processing`
    /// Version and the solve completes on a background task (§5, §9
    /// "Background generation"). Defaults to false (synchronous).
    #[serde(default)]
    background: bool,
}

async fn generate(State(state): State<Arc<AppState>>, Json(req): Json<GenerateRequest>) -> Result<Json<Version>> {
    if req.background {
        let version_id = state.store.create_processing_version(req.version_name, req.method);
        let params = state.solve_params();
        let weights = state.penalty_weights;
        let store = state.store.clone();
        tokio::spawn(async move {
            schedule_builder::generate_in_background(store, version_id, req.method, params, weights).await;
        });
        Ok(Json(state.store.get_version(version_id)?))
    } else {
        let params = state.solve_params();
        let version = schedule_builder::generate_and_save(&state.store, req.method, req.version_name, &params, &state.penalty_weights)?;
        Ok(Json(version))
    }
}

async fn get_version(State(state): State<Arc<AppState>>, Path(version_id): Path<VersionId>) -> Result<Json<Version>> {
    Ok(Json(state.store.get_version(version_id)?))
}

async fn analytics(State(state): State<Arc<AppState>>, Path(version_id): Path<VersionId>) -> Result<Json<Report>> {
    Ok(Json(AnalyticsReporter::new(&state.store).report(version_id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoAssignRequest {
    teacher_id: TeacherId,
    date: String,
    #[serde(default)]
    auto_notify: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| Error::Validation(format!("'{raw}' is not a valid YYYY-MM-DD date")))
}

async fn auto_assign(State(state): State<Arc<AppState>>, Json(req): Json<AutoAssignRequest>) -> Result<Json<AssignmentReport>> {
    let date = parse_date(&req.date)?;
    let engine = AutoAssignmentEngine::new(&state.store, state.score_weights);
    Ok(Json(engine.auto_assign(req.teacher_id, date, req.auto_notify)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopNQuery {
    #[serde(default = "default_top_n")]
    top_n: usize,
}

fn default_top_n() -> usize {
    5
}

async fn ranked_suggestions(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<EntryId>,
    Query(q): Query<TopNQuery>,
) -> Result<Json<Vec<Candidate>>> {
    let engine = AutoAssignmentEngine::new(&state.store, state.score_weights);
    Ok(Json(engine.ranked_suggestions(entry_id, q.top_n)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignSubstituteRequest {
    entry_id: EntryId,
    date: String,
    substitute_teacher_id: TeacherId,
    original_teacher_id: TeacherId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubstitutionAck {
    ok: bool,
}

async fn assign_substitute(State(state): State<Arc<AppState>>, Json(req): Json<AssignSubstituteRequest>) -> Result<Json<SubstitutionAck>> {
    let date = parse_date(&req.date)?;
    let engine = AutoAssignmentEngine::new(&state.store, state.score_weights);
    engine.assign_substitute(req.entry_id, date, req.substitute_teacher_id, req.original_teacher_id)?;
    Ok(Json(SubstitutionAck { ok: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelClassRequest {
    entry_id: EntryId,
    date: String,
    original_teacher_id: TeacherId,
    reason: String,
}

async fn cancel_class(State(state): State<Arc<AppState>>, Json(req): Json<CancelClassRequest>) -> Result<Json<SubstitutionAck>> {
    let date = parse_date(&req.date)?;
    let engine = AutoAssignmentEngine::new(&state.store, state.score_weights);
    engine.cancel_class(req.entry_id, date, req.original_teacher_id, req.reason)?;
    Ok(Json(SubstitutionAck { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_rejects_malformed_input() {
        assert!(parse_date("not-a-date").is_err());
        assert!(parse_date("2026-13-40").is_err());
        assert!(parse_date("2026-01-05").is_ok());
    }
}
