mod image;
mod models;

pub use image::{ImageRef, parse_artifact_url, project_names};
pub use models::*;
