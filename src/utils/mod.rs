//! Utility Module
//!
//! - [`time`]: frame clock feeding frame ids, timestamps and time steps to
//!   the render peers

pub mod time;

pub use time::{FrameClock, FrameTick};
