//! HTTP route registration

use actix_web::{Responder, web};

use crate::handlers;

/// Register the relay endpoints and the liveness probe
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::send::send)
        .service(handlers::receive::receive)
        .route("/_healthy", web::get().to(healthy));
}

async fn healthy() -> impl Responder {
    "ok"
}
