#[path = "../support/mod.rs"]
mod support;

mod engine;
mod runner;
