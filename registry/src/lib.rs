//! Discovery service for the medalcast fleet.
//!
//! - [`ServiceRegistry`] keeps the instance list, heartbeats, the designated
//!   master replica and sticky client assignments
//! - [`LoadBalancer`] evicts instances that stop beating and reshuffles clients
//! - [`routes`] exposes both over HTTP

mod balancer;
mod error;
mod registry;
mod routes;

pub use balancer::{BalanceReport, LoadBalancer};
pub use error::ApiError;
pub use registry::ServiceRegistry;
pub use routes::routes;
