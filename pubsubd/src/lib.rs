#![warn(clippy::all, rust_2018_idioms)]

mod actions;
mod app;
mod fixture;
pub use app::{App, AppError};
pub use fixture::{Fixture, FixtureError};
