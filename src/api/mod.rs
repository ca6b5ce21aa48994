//! HTTP API over the patient query façade

pub mod handlers;
pub mod models;
pub mod routes;

use std::io;
use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use crate::query::PatientQuery;
use handlers::AppState;

pub struct ApiServer {
    state: AppState,
    bind_address: String,
    workers: usize,
}

impl ApiServer {
    pub fn new(query: Arc<PatientQuery>, bind_address: String, workers: usize) -> Self {
        Self {
            state: AppState::new(query),
            bind_address,
            workers: workers.max(1),
        }
    }

    pub async fn run(self) -> io::Result<()> {
        log::info!(
            "Starting HTTP server at {} with {} workers",
            self.bind_address,
            self.workers
        );

        let state = self.state;
        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(middleware::Logger::default())
                // the dashboard is served from another origin
                .wrap(
                    actix_cors::Cors::default()
                        .allow_any_origin()
                        .allowed_methods(vec!["GET"])
                        .allow_any_header()
                        .max_age(3600),
                )
                .configure(routes::configure)
        })
        .workers(self.workers)
        .bind(&self.bind_address)?
        .run()
        .await
    }
}
