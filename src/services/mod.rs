//! External collaborators reached by the tools.
//!
//! Each collaborator sits behind a trait so the dispatcher can be built
//! against fakes in tests:
//! - [`store::TransitStore`]: stops, lines, towns and rail stations
//! - [`google::DirectionsService`]: local transit directions
//! - [`sncf::RailService`]: long-distance rail journeys and departures
//!
//! Failures are reported as [`ServiceError`]. An empty result set is an
//! error too, so a tool never hands the planner a silent empty success.

pub mod google;
pub mod sncf;
pub mod store;

use serde::Serialize;
use thiserror::Error;

/// Errors from collaborator calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} is not configured: {what} is missing")]
    NotConfigured { service: &'static str, what: String },

    #[error("network error contacting {service}: {source}")]
    Network {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service}: {status} - {message}")]
    Upstream {
        service: &'static str,
        status: String,
        message: String,
    },

    #[error("could not decode {service} response: {reason}")]
    Decode { service: &'static str, reason: String },

    #[error("{0}")]
    NotFound(String),
}

impl ServiceError {
    /// The URL is dropped: query strings can carry API keys.
    pub(crate) fn network(service: &'static str, source: reqwest::Error) -> Self {
        ServiceError::Network {
            service,
            source: source.without_url(),
        }
    }

    pub(crate) fn decode(service: &'static str, err: impl std::fmt::Display) -> Self {
        ServiceError::Decode {
            service,
            reason: err.to_string(),
        }
    }
}

/// Read a non-2xx response into a [`ServiceError::Status`].
pub(crate) async fn status_error(service: &'static str, response: reqwest::Response) -> ServiceError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    ServiceError::Status {
        service,
        status,
        message: truncate(&message, 300),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

// --- Itineraries ---

/// One ranked way of getting from a departure to a destination.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Itinerary {
    pub rank: usize,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    pub departure: String,
    pub arrival: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    pub legs: Vec<Leg>,
}

/// An ordered segment of an itinerary.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Leg {
    Walking {
        instruction: String,
        duration: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        distance: String,
    },
    Transit {
        /// Vehicle kind as reported upstream (SUBWAY, TRAM, BUS, TER, TGV...)
        vehicle: String,
        line: String,
        line_name: String,
        direction: String,
        departure_stop: String,
        arrival_stop: String,
        duration: String,
        stop_count: u32,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Itineraries {
    pub itineraries: Vec<Itinerary>,
}
