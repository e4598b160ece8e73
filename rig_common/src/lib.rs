//! # Rig Common Library
//!
//! Shared types and definitions for all rig workspace crates.
//!
//! # Module Structure
//!
//! - [`servo`] - Servo metadata, orientation and calibration types
//! - [`easing`] - Easing functions for keyframe interpolation
//! - [`timeline`] - Timeline, track, keyframe and marker data model
//! - [`preset`] - Procedural motion preset kinds and parameters
//! - [`safety`] - Safety states, emergency modes and safe poses
//! - [`error`] - Error taxonomy and the command acknowledgement type
//! - [`events`] - Broadcast events and subscriber contract
//! - [`config`] - Daemon configuration loading

pub mod config;
pub mod easing;
pub mod error;
pub mod events;
pub mod preset;
pub mod safety;
pub mod servo;
pub mod timeline;

pub use error::{Ack, RigError, RigResult};
