//! Background services run alongside the HTTP server.

pub mod display;

pub use display::{display_once, render_listing, run_display_loop};
