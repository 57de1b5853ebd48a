mod admin;
pub mod dto;
pub mod response;
mod router;
pub mod validation;
mod ztr;

pub use router::{AppState, create_router};
