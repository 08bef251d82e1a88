//! Transfer session adapters.

mod http;
mod resume;
mod throttle;

pub use http::{HttpSessionBuilder, HttpTransferSession, SessionError};
pub use resume::ResumeToken;
