//! Helium engine crate.
//!
//! A small frame renderer over an explicit GPU API: [`device`] is the API
//! seam, [`render`] keeps CPU recording and GPU execution ordered, and
//! [`window`] runs the window thread that feeds it.

pub mod core;
pub mod device;
pub mod logging;
pub mod render;
pub mod time;
pub mod window;
