pub mod cli;
pub mod consts;
pub mod data;
pub mod errors;
pub mod ipc;
pub mod jobs;
pub mod logging;
pub mod shared;

pub use ::{anyhow, clap, lazy_static, log, nix};
