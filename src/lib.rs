pub mod bugdb;
pub mod cache;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod measures;
pub mod model;
pub mod output;
pub mod processor;
pub mod progress;
pub mod source;
pub mod util;

pub use error::{ChurnError, Result};
