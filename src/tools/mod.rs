//! Tool registry and dispatcher.
//!
//! - [`ToolName`] enumerates every capability the planner may call. Each
//!   variant owns a stable wire name and a strict JSON Schema.
//! - [`ToolRegistry`] is the immutable table advertised to the planner.
//! - [`ToolDispatcher`] resolves a planner-issued name to a [`ToolName`],
//!   validates the raw arguments, invokes the collaborator and folds every
//!   outcome into a [`ToolResult`]. Dispatch never fails past its boundary:
//!   unknown names, bad arguments, collaborator failures and timeouts all
//!   become error results the planner can read.
//!
//! The dispatcher matches exhaustively on [`ToolName`], so a registry entry
//! without an invocation does not compile.

pub mod directions;
pub mod rail;
pub mod stops;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::services::google::DirectionsService;
use crate::services::sncf::RailService;
use crate::services::store::TransitStore;
use crate::services::ServiceError;
use crate::types::{ToolCall, ToolDefinition};

/// Every tool the planner can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchStop,
    SearchLine,
    LineStops,
    StopLines,
    TownStops,
    Directions,
    SearchStation,
    NearestStation,
    TrainJourneys,
    StationLines,
    NextDepartures,
}

impl ToolName {
    pub const ALL: [ToolName; 11] = [
        ToolName::SearchStop,
        ToolName::SearchLine,
        ToolName::LineStops,
        ToolName::StopLines,
        ToolName::TownStops,
        ToolName::Directions,
        ToolName::SearchStation,
        ToolName::NearestStation,
        ToolName::TrainJourneys,
        ToolName::StationLines,
        ToolName::NextDepartures,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::SearchStop => "search_stop",
            ToolName::SearchLine => "search_line",
            ToolName::LineStops => "get_line_stops",
            ToolName::StopLines => "get_stop_lines",
            ToolName::TownStops => "get_town_stops",
            ToolName::Directions => "get_directions",
            ToolName::SearchStation => "search_station",
            ToolName::NearestStation => "get_nearest_station",
            ToolName::TrainJourneys => "get_train_journeys",
            ToolName::StationLines => "get_station_lines",
            ToolName::NextDepartures => "get_next_departures",
        }
    }

    /// Description and parameter schema advertised to the planner.
    pub fn definition(self) -> ToolDefinition {
        let (description, input_schema) = match self {
            ToolName::SearchStop => stops::search_stop_spec(),
            ToolName::SearchLine => stops::search_line_spec(),
            ToolName::LineStops => stops::line_stops_spec(),
            ToolName::StopLines => stops::stop_lines_spec(),
            ToolName::TownStops => stops::town_stops_spec(),
            ToolName::Directions => directions::directions_spec(),
            ToolName::SearchStation => rail::search_station_spec(),
            ToolName::NearestStation => rail::nearest_station_spec(),
            ToolName::TrainJourneys => rail::train_journeys_spec(),
            ToolName::StationLines => rail::station_lines_spec(),
            ToolName::NextDepartures => rail::next_departures_spec(),
        };
        ToolDefinition {
            name: self.as_str().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a strict object schema: every property required, nothing else allowed.
pub(crate) fn strict_object(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

// --- Registry ---

/// The fixed table of tools declared to the planner.
pub struct ToolRegistry {
    entries: Vec<(ToolName, ToolDefinition)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: ToolName::ALL.iter().map(|t| (*t, t.definition())).collect(),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|(_, d)| d.clone()).collect()
    }

    /// Resolve a planner-issued name. Matching is exact.
    pub fn resolve(&self, name: &str) -> Option<ToolName> {
        self.entries
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(tool, _)| *tool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify that names are unique, that every entry resolves back to its
    /// own variant, and that every schema is strict.
    pub fn check_consistency(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (tool, definition) in &self.entries {
            if !seen.insert(definition.name.as_str()) {
                bail!("duplicate tool name: {}", definition.name);
            }
            if self.resolve(&definition.name) != Some(*tool) {
                bail!("tool {} does not resolve to {:?}", definition.name, tool);
            }
            check_strict_schema(&definition.name, &definition.input_schema)?;
        }
        for tool in ToolName::ALL {
            if !self.entries.iter().any(|(t, _)| *t == tool) {
                bail!("tool {} is missing from the registry", tool);
            }
        }
        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_strict_schema(name: &str, schema: &Value) -> Result<()> {
    if schema["type"] != "object" || schema["additionalProperties"] != false {
        bail!("tool {} must declare a closed object schema", name);
    }
    let Some(properties) = schema["properties"].as_object() else {
        bail!("tool {} has no properties", name);
    };
    let required: HashSet<&str> = schema["required"]
        .as_array()
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let declared: HashSet<&str> = properties.keys().map(|k| k.as_str()).collect();
    if required != declared {
        bail!("tool {} must list every property as required", name);
    }
    Ok(())
}

// --- Results ---

/// Why a tool call produced no data.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: ToolName, reason: String },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{tool} did not answer within {limit:?}")]
    Timeout { tool: ToolName, limit: Duration },

    #[error("could not encode {tool} result: {reason}")]
    Encode { tool: ToolName, reason: String },
}

impl ToolError {
    pub(crate) fn invalid(tool: ToolName, reason: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool,
            reason: reason.into(),
        }
    }
}

/// The normalized outcome of one tool call.
#[derive(Debug)]
pub struct ToolResult {
    pub call_id: String,
    pub tool: String,
    pub outcome: Result<Value, ToolError>,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Text placed in the transcript: the success payload, or `{"error": ...}`.
    pub fn to_content(&self) -> String {
        match &self.outcome {
            Ok(value) => value.to_string(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        }
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(tool: ToolName, raw: &str) -> Result<T, ToolError> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| ToolError::invalid(tool, e.to_string()))
}

pub(crate) fn encode<T: Serialize>(tool: ToolName, value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Encode {
        tool,
        reason: e.to_string(),
    })
}

/// Reject blank text arguments; returns the trimmed value.
pub(crate) fn required_text<'a>(
    tool: ToolName,
    field: &str,
    value: &'a str,
) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::invalid(tool, format!("'{}' must not be empty", field)));
    }
    Ok(trimmed)
}

// --- Dispatcher ---

/// Executes tool calls against the injected collaborators.
///
/// Stateless and reentrant: concurrent calls need no coordination.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    store: Arc<dyn TransitStore>,
    directions: Arc<dyn DirectionsService>,
    rail: Arc<dyn RailService>,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(
        store: Arc<dyn TransitStore>,
        directions: Arc<dyn DirectionsService>,
        rail: Arc<dyn RailService>,
    ) -> Self {
        Self {
            registry: ToolRegistry::new(),
            store,
            directions,
            rail,
            timeout: None,
        }
    }

    /// Bound every collaborator call; overruns become [`ToolError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Execute one planner-issued call. Always returns a result.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        info!(tool = %call.name, call_id = %call.id, arguments = %call.arguments, "tool requested");

        let outcome = match self.registry.resolve(&call.name) {
            None => Err(ToolError::UnknownFunction(call.name.clone())),
            Some(tool) => match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.invoke(tool, &call.arguments))
                    .await
                    .unwrap_or(Err(ToolError::Timeout { tool, limit })),
                None => self.invoke(tool, &call.arguments).await,
            },
        };

        let result = ToolResult {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            outcome,
        };
        match &result.outcome {
            Ok(_) => info!(tool = %call.name, call_id = %call.id, result = %result.to_content(), "tool result"),
            Err(e) => warn!(tool = %call.name, call_id = %call.id, error = %e, "tool failed"),
        }
        result
    }

    async fn invoke(&self, tool: ToolName, raw: &str) -> Result<Value, ToolError> {
        let store = self.store.as_ref();
        let rail = self.rail.as_ref();
        match tool {
            ToolName::SearchStop => stops::search_stop(store, parse_args(tool, raw)?).await,
            ToolName::SearchLine => stops::search_line(store, parse_args(tool, raw)?).await,
            ToolName::LineStops => stops::line_stops(store, parse_args(tool, raw)?).await,
            ToolName::StopLines => stops::stop_lines(store, parse_args(tool, raw)?).await,
            ToolName::TownStops => stops::town_stops(store, parse_args(tool, raw)?).await,
            ToolName::Directions => {
                directions::directions(self.directions.as_ref(), parse_args(tool, raw)?).await
            }
            ToolName::SearchStation => rail::search_station(store, parse_args(tool, raw)?).await,
            ToolName::NearestStation => rail::nearest_station(store, parse_args(tool, raw)?).await,
            ToolName::TrainJourneys => rail::train_journeys(rail, parse_args(tool, raw)?).await,
            ToolName::StationLines => rail::station_lines(rail, parse_args(tool, raw)?).await,
            ToolName::NextDepartures => rail::next_departures(rail, parse_args(tool, raw)?).await,
        }
    }
}
