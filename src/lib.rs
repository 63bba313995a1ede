#![forbid(unsafe_code)]

pub mod app;
pub mod audit;
pub mod cli;
pub mod digest;
pub mod fetch;
pub mod findings;
pub mod logging;
pub mod openai;
pub mod report;
pub mod signals;
pub mod walk;
