pub mod checker;
pub mod config;
pub mod error;
pub mod intra;
pub mod logging;
pub mod notify;
