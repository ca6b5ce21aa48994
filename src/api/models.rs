//! HTTP request/response models

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::filters::{parse_stroke_flag, PatientFilter};

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Plain message body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query string of `/patients/` and `/charts/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientFilterParams {
    pub gender: Option<String>,
    pub stroke: Option<i64>,
    pub min_age: Option<f64>,
    pub max_age: Option<f64>,
}

impl PatientFilterParams {
    pub fn into_filter(self) -> Result<PatientFilter, QueryError> {
        let mut filter = PatientFilter::new();
        if let Some(gender) = self.gender {
            filter = filter.gender(gender);
        }
        if let Some(stroke) = self.stroke {
            filter = filter.stroke(parse_stroke_flag(stroke)?);
        }
        filter.min_age = self.min_age;
        filter.max_age = self.max_age;
        Ok(filter)
    }
}
