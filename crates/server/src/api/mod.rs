pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod slider;

pub use routes::create_router;
