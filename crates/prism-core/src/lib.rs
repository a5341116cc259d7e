//! Types shared by the Prism server and media crates

mod context;
mod error;

pub use context::{ClientIdentity, RequestContext};
pub use error::HttpError;
