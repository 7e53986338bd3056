// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! The identity registry: vector index, pending tracks, re-link probation,
//! watchlist classification, and the tracker's decision pipeline (§4 of the
//! design). One [`Tracker`] instance is shared by every stream worker.

pub mod config;
pub mod geometry;
pub mod identity;
pub mod index;
pub mod maintenance;
pub mod pending;
pub mod relink;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod tracker;
pub mod vector;
pub mod watchlist;

pub use crate::config::TrackerConfig;
pub use crate::geometry::BBox;
pub use crate::identity::Identity;
pub use crate::tracker::{Stats, Tracker};
pub use crate::vector::Embedding;
pub use crate::watchlist::{Watchlist, WatchlistMatch, WatchlistRecord};
