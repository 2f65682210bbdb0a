pub mod cli;
pub mod config;
pub mod parallel;
pub mod persist;
pub mod scaling;
pub mod solver;
pub mod tasks;
