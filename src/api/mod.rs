mod convert;
pub mod error;
mod media;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub mod utils;
mod validation;

pub use error::ApiError;
pub use server::{router, run};
pub use state::AppState;
