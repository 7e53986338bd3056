// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! Request/response bodies for the control/preview API (spec §6). Kept in one
//! file the way the teacher keeps its database-facing JSON types together.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct StartStreamRequest {
    pub url: String,
    pub stream_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartStreamResponse {
    pub stream_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StopStreamRequest {
    pub stream_id: String,
}

#[derive(Debug, Serialize)]
pub struct StreamListEntry {
    pub stream_id: String,
    pub url: String,
    pub streaming: bool,
}

#[derive(Debug, Serialize)]
pub struct StreamStatusResponse {
    pub streaming: bool,
    pub stream_url: String,
    pub has_error: bool,
}

#[derive(Debug, Serialize)]
pub struct SharedStatsResponse {
    pub total_faces: u64,
    pub lifetime_faces: u64,
    pub active_faces: usize,
    pub suspicious_faces: usize,
    pub clean_faces: usize,
    pub database_entries: usize,
    pub suspicious_ids: Vec<u64>,
    pub tracking_threshold: f32,
    pub consolidation_threshold: f32,
    pub face_timeout: f64,
    pub next_id: u64,
    pub consolidation_check_interval: u32,
}

#[derive(Debug, Serialize)]
pub struct SuspiciousRecord {
    pub id: u64,
    pub score: f32,
    pub name: String,
    pub nickname: Option<String>,
    pub age: Option<i32>,
    pub police_station: Option<String>,
    pub crime_and_section: Option<String>,
    pub head_of_crime: Option<String>,
    pub arrested_date: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
