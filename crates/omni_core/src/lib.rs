pub mod models;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use models::{ParserLoader, ScreenParser};
pub use types::{ParseOutput, ParseRequest};

pub mod prelude {
    pub use super::{Error, Result, ParseOutput, ParseRequest, ParserLoader, ScreenParser};
}
