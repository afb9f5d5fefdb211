//! Route registration

use actix_web::web;

pub mod broker;
pub mod events;
pub mod health;
pub mod recommendations;

pub fn configure(cfg: &mut web::ServiceConfig) {
    events::configure(cfg);
    recommendations::configure(cfg);
    broker::configure(cfg);
    health::configure(cfg);
}
