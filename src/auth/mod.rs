mod middleware;
mod token;

pub use middleware::{AuthError, RequireAdmin};
pub use token::{GeneratedToken, TokenGenerator, TokenKind, parse_token};
