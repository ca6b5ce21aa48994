//! HTTP route configuration

use actix_web::{error, web, HttpResponse};

use super::handlers;
use super::models::ApiError;

/// Configure every route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // malformed query strings answer 422 with the usual error body
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            let body = ApiError::new(422, err.to_string());
            error::InternalError::from_response(err, HttpResponse::UnprocessableEntity().json(body))
                .into()
        }))
        .route("/", web::get().to(handlers::read_root))
        .route("/health", web::get().to(handlers::health_check))
        // patients
        .route("/patients", web::get().to(handlers::get_patients))
        .route("/patients/", web::get().to(handlers::get_patients))
        .route("/patients/{patient_id}", web::get().to(handlers::get_patient_by_id))
        // statistics and charts
        .route("/stats", web::get().to(handlers::get_stats))
        .route("/stats/", web::get().to(handlers::get_stats))
        .route("/charts", web::get().to(handlers::get_charts))
        .route("/charts/", web::get().to(handlers::get_charts))
        .route("/variables", web::get().to(handlers::get_variables))
        .route("/variables/", web::get().to(handlers::get_variables));
}
