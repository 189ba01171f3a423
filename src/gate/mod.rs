//! Gate-crossing counter: turns per-frame tracked rectangles into validated
//! directional [`Event`](crate::store::model::EventRow) writes.

pub mod counter;

pub use counter::{FrameSource, GateCounter, ScriptedFrameSource, StdinFrameSource, TrackedBox};
