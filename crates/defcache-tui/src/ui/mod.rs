//! Terminal UI module using ratatui.
//!
//! - `render`: frame layout and the definition grid
//! - `input`: keyboard event handling
//! - `styles`: colors and text styling

pub mod input;
pub mod render;
pub mod styles;
