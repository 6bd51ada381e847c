//! HTTP API handlers for brickmap-xr

pub mod health;
pub mod inventory;
pub mod matching;

pub use health::health_routes;
pub use inventory::inventory_routes;
pub use matching::matching_routes;
