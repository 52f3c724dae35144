//! HTTP server and command line front end of framecast.

pub mod api;
pub mod cli;
pub mod metrics;
pub mod state;
