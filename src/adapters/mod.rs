pub mod traits;
pub mod registry;
pub mod routes;
pub mod snapshot;

pub use registry::SpokeClientRegistry;
pub use routes::{TokenRoute, TokenRouteRefundResolver};
