//! HTTP request handlers

use std::sync::Arc;

use actix_web::{web, HttpResponse};

use super::models::*;
use crate::error::QueryError;
use crate::query::PatientQuery;
use crate::records::variable_descriptions;

pub const NO_PATIENT_FOUND: &str = "no patient found";

/// Application state shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<PatientQuery>,
}

impl AppState {
    pub fn new(query: Arc<PatientQuery>) -> Self {
        Self { query }
    }
}

fn query_error(err: &QueryError) -> HttpResponse {
    match err {
        QueryError::NotFound { .. } => {
            HttpResponse::NotFound().json(ApiError::new(404, err.to_string()))
        }
        QueryError::InvalidId { .. } | QueryError::InvalidStroke { .. } => {
            HttpResponse::UnprocessableEntity().json(ApiError::new(422, err.to_string()))
        }
        QueryError::Frame { .. } => {
            log::error!("{}", err);
            HttpResponse::InternalServerError().json(ApiError::new(500, err.to_string()))
        }
    }
}

pub async fn read_root() -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse::new(
        "Welcome to the Stroke Prediction API!",
    ))
}

/// Health check
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "stroke-api",
        "patients": state.query.table().len(),
        "memoized_filters": state.query.memoized_filters(),
    }))
}

/// Patients matching the optional query criteria
pub async fn get_patients(
    params: web::Query<PatientFilterParams>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let filter = match params.into_inner().into_filter() {
        Ok(filter) => filter,
        Err(e) => return query_error(&e),
    };

    match state.query.filter_patients(&filter) {
        Ok(patients) if patients.is_empty() => {
            log::debug!("no patient for {:?}", filter);
            HttpResponse::Ok().json(MessageResponse::new(NO_PATIENT_FOUND))
        }
        Ok(patients) => {
            log::debug!("{} patients for {:?}", patients.len(), filter);
            HttpResponse::Ok().json(patients)
        }
        Err(e) => query_error(&e),
    }
}

pub async fn get_patient_by_id(
    patient_id: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match state.query.lookup(&patient_id) {
        Ok(patient) => HttpResponse::Ok().json(patient),
        Err(e) if e.is_not_found() => query_error(&e),
        Err(e) => {
            log::debug!("patient lookup {:?} rejected: {}", patient_id.as_str(), e);
            query_error(&e)
        }
    }
}

/// Global statistics over the whole table
pub async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    match state.query.global_statistics() {
        Ok(stats) => HttpResponse::Ok().json(stats.as_ref()),
        Err(e) => query_error(&e),
    }
}

/// Chart series over the patients matching the query criteria
pub async fn get_charts(
    params: web::Query<PatientFilterParams>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match params.into_inner().into_filter() {
        Ok(filter) => match state.query.charts(&filter) {
            Ok(charts) => HttpResponse::Ok().json(charts.as_ref()),
            Err(e) => query_error(&e),
        },
        Err(e) => query_error(&e),
    }
}

/// Data dictionary
pub async fn get_variables() -> HttpResponse {
    HttpResponse::Ok().json(variable_descriptions())
}
