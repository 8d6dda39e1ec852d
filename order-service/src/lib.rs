pub mod app;
pub mod collaborators;
pub mod config;
pub mod coupon;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod invoice;
pub mod order;
pub mod order_handlers;
pub mod payment;
pub mod returns;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod tracking;
pub mod views;

pub use app::{build_router, AppState};
pub use config::OrderConfig;
pub use error::OrderError;
pub use service::{CheckoutRequest, Collaborators, OrderService};
