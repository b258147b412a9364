//! Track and court geometry primitives for basketball footage
//!
//! This crate holds the frame-indexed building blocks that the analytics stages
//! consume: bounding boxes, per-frame track storage with ball clean-up and gap
//! filling, and homography estimation for mapping the broadcast image onto a
//! top-down court.
//!
//! ```rust,ignore
//! use hooptrack::{BallTrack, BallTrackParams};
//!
//! let params = BallTrackParams { max_ball_speed_px_per_frame: 25.0, max_interpolation_gap: 30 };
//! let ball = raw_ball
//!     .remove_wrong_detections(&params)
//!     .interpolate_ball_positions(&params);
//! ```

pub mod bbox;
pub mod homography;
pub mod tracks;

pub use bbox::Bbox;
pub use homography::{Homography, RansacParams, MIN_CORRESPONDENCES};
pub use tracks::{BallDetection, BallTrack, BallTrackParams, FrameTracks, ObjectTracks, TrackedBox};
