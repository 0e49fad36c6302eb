pub mod clock;
pub mod error;
pub mod fs;
pub mod lock;
pub mod path;
pub mod property;

pub use error::{DavError, Result};
pub use path::DavPath;
