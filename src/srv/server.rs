use std::future::Future;
use std::pin::Pin;

use actix_web::error::ErrorInternalServerError;
use actix_web::http::header::{self, CACHE_CONTROL};
use actix_web::middleware::{Condition, Logger};
use actix_web::web::Data;
use actix_web::{middleware, route, web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};

use crate::config::ServerState;
use crate::srv::tiles::get_tile;
use crate::{TileryError, TileryResult};

/// Runtime knobs of the HTTP edge, fed from the CLI.
#[derive(Clone, Debug)]
pub struct SrvConfig {
    pub port: u16,
    pub internal_port: u16,
    pub enable_cors: bool,
    pub simplify: bool,
    /// `0` means one worker per core.
    pub worker_processes: usize,
}

impl Default for SrvConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            internal_port: 3001,
            enable_cors: false,
            simplify: false,
            worker_processes: 0,
        }
    }
}

pub fn map_internal_error<T: std::fmt::Display>(e: T) -> actix_web::Error {
    error!("{e}");
    ErrorInternalServerError(e.to_string())
}

/// Return 200 OK if healthy. Served from the internal listener only.
#[route("/healthcheck", method = "GET", method = "HEAD")]
#[allow(clippy::unused_async)]
async fn healthcheck() -> impl Responder {
    HttpResponse::Ok()
        .insert_header((CACHE_CONTROL, "no-cache"))
        .message_body("OK")
}

/// Public routes.
pub fn router(cfg: &mut web::ServiceConfig) {
    cfg.service(get_tile);
}

/// Internal routes (health, served on the internal port).
pub fn internal_router(cfg: &mut web::ServiceConfig) {
    cfg.service(healthcheck);
}

fn make_cors() -> actix_cors::Cors {
    actix_cors::Cors::default()
        .allow_any_origin()
        .allowed_methods(["GET", "OPTIONS"])
        .allowed_headers([
            header::ACCEPT,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
        ])
        .supports_credentials()
}

type Server = Pin<Box<dyn Future<Output = TileryResult<()>>>>;

/// Creates the two listeners: the public tile endpoint and the internal
/// health endpoint. Either one failing takes the process down.
pub fn new_server(config: SrvConfig, state: ServerState) -> TileryResult<(Server, String)> {
    let state = Data::new(state);
    let srv_config = Data::new(config.clone());

    let workers = if config.worker_processes == 0 {
        num_cpus::get()
    } else {
        config.worker_processes
    };

    if config.enable_cors {
        info!("Enabling CORS support");
    }
    let enable_cors = config.enable_cors;

    let public_addr = format!("0.0.0.0:{}", config.port);
    let public = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(srv_config.clone())
            .wrap(Condition::new(enable_cors, make_cors()))
            .wrap(Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(router)
    })
    .bind(&public_addr)
    .map_err(|e| TileryError::BindingError(e, public_addr.clone()))?
    .workers(workers)
    .shutdown_timeout(0)
    .run();

    let internal_addr = format!("0.0.0.0:{}", config.internal_port);
    let internal = HttpServer::new(|| App::new().configure(internal_router))
        .bind(&internal_addr)
        .map_err(|e| TileryError::BindingError(e, internal_addr.clone()))?
        .workers(1)
        .shutdown_timeout(0)
        .run();

    let server = async move {
        futures::future::try_join(public, internal).await?;
        Ok(())
    };

    Ok((
        Box::pin(server),
        format!("{public_addr} (internal: {internal_addr})"),
    ))
}
