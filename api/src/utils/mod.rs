//! Edge-only utilities: error-to-response mapping and the guild/user context
//! extractor that stands in for the out-of-scope auth middleware.

pub mod errors;
pub mod extract;

pub use errors::ApiError;
pub use extract::GuildContext;
