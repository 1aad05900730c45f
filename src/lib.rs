pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod helpers;
pub mod parser;
pub mod profile;
pub mod util;

pub use convert::Converter;
pub use error::{ConvertError, ParseError, RenderError};
pub use profile::Profile;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
