//! Error types for the request/response layer.
//!
//! The split mirrors the two directions of traffic: [`RequestError`] for
//! inbound inspection, [`ResponseError`] for outbound mutation. Tolerable
//! wire-input problems never show up here — they are skipped at the parse
//! sites. These variants cover caller mistakes (bad explicit configuration,
//! illegal state transitions) and date header values that defeated every
//! fallback format.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unsupported encoding: {label:?}")]
    UnsupportedEncoding { label: String },

    #[error("invalid {name} header: {value:?}")]
    InvalidDateHeader { name: String, value: String },

    #[error("request body already committed to {current}")]
    ReadModeConflict { current: &'static str },

    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },
}

impl RequestError {
    pub fn unsupported_encoding<S: ToString>(label: S) -> Self {
        Self::UnsupportedEncoding { label: label.to_string() }
    }

    pub fn invalid_date_header<N: ToString, V: ToString>(name: N, value: V) -> Self {
        Self::InvalidDateHeader { name: name.to_string(), value: value.to_string() }
    }

    pub fn read_mode_conflict(current: &'static str) -> Self {
        Self::ReadModeConflict { current }
    }

    pub fn invalid_params<S: ToString>(reason: S) -> Self {
        Self::InvalidParams { reason: reason.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("unsupported encoding: {label:?}")]
    UnsupportedEncoding { label: String },

    #[error("response output already committed to {current}")]
    OutputConflict { current: &'static str },

    #[error("response is already committed")]
    Committed,

    #[error("redirect target is empty")]
    EmptyRedirectTarget,

    #[error("invalid header value: {reason}")]
    InvalidHeaderValue { reason: String },
}

impl ResponseError {
    pub fn unsupported_encoding<S: ToString>(label: S) -> Self {
        Self::UnsupportedEncoding { label: label.to_string() }
    }

    pub fn output_conflict(current: &'static str) -> Self {
        Self::OutputConflict { current }
    }

    pub fn invalid_header_value<S: ToString>(reason: S) -> Self {
        Self::InvalidHeaderValue { reason: reason.to_string() }
    }
}
