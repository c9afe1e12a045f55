//! A TDoA (Time Difference of Arrival) ranging engine for a mesh of fixed
//! UWB anchors and one mobile tag.
//!
//! The engine ingests TDoA2 range packets overheard between anchors,
//! maintains a per-anchor clock-correction filter, picks a reference
//! anchor to pair each packet against, and turns the pair into a distance
//! difference handed to an external position estimator. [`driver`] wraps
//! the engine with the radio-facing event loop; everything below it can be
//! exercised without any hardware.
#![cfg_attr(not(test), no_std)]

pub mod anchor_time;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod estimator;
pub mod matching;
pub mod stats;
pub mod storage;
pub mod time;
pub mod wire;

pub use driver::{Event, Radio, RangingState, TagDriver};
pub use engine::TdoaEngine;
pub use estimator::{Coordinates, Estimator, EstimatorKind, Measurement, TdoaMeasurement};
pub use matching::MatchingAlgorithm;
pub use storage::{AnchorCtx, AnchorStorage, Position};
