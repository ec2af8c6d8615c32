pub mod config;
pub mod debug;
pub mod profile;
pub mod run;
