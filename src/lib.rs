#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating most pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod classify;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod registry;
pub mod relay;
pub mod session;
pub mod tls;
pub mod translate;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
