//! Rail station and SNCF journey tools.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use super::{encode, required_text, strict_object, ToolError, ToolName};
use crate::services::sncf::RailService;
use crate::services::store::TransitStore;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchStationArgs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NearestStationArgs {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainJourneysArgs {
    pub from_station_id: String,
    pub to_station_id: String,
    #[serde(deserialize_with = "present_or_null")]
    pub datetime: Option<String>,
}

/// A nullable field that must still be present: without `deserialize_with`
/// serde would default a missing `Option` to `None`.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::deserialize(deserializer)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationArgs {
    pub station_id: String,
}

pub(super) fn search_station_spec() -> (&'static str, Value) {
    (
        "Find an SNCF rail station by name. Returns its SNCF id, needed by the \
         other rail tools.",
        strict_object(json!({
            "name": {"type": "string", "description": "Station name, e.g. 'Toulouse Matabiau', 'Montauban'"}
        })),
    )
}

pub(super) fn nearest_station_spec() -> (&'static str, Value) {
    (
        "Find the rail stations closest to a GPS position.",
        strict_object(json!({
            "latitude": {"type": "number", "description": "Latitude in decimal degrees"},
            "longitude": {"type": "number", "description": "Longitude in decimal degrees"}
        })),
    )
}

pub(super) fn train_journeys_spec() -> (&'static str, Value) {
    (
        "Compute train journeys between two SNCF stations (TER, TGV, Intercités).",
        strict_object(json!({
            "from_station_id": {"type": "string", "description": "SNCF id of the departure station, from search_station"},
            "to_station_id": {"type": "string", "description": "SNCF id of the arrival station, from search_station"},
            "datetime": {
                "type": ["string", "null"],
                "description": "Earliest departure, ISO 8601 (e.g. '2024-06-01T08:30'), or null for now"
            }
        })),
    )
}

pub(super) fn station_lines_spec() -> (&'static str, Value) {
    (
        "List the rail lines serving an SNCF station.",
        strict_object(json!({
            "station_id": {"type": "string", "description": "SNCF id of the station, from search_station"}
        })),
    )
}

pub(super) fn next_departures_spec() -> (&'static str, Value) {
    (
        "Real-time next train departures from an SNCF station.",
        strict_object(json!({
            "station_id": {"type": "string", "description": "SNCF id of the station, from search_station"}
        })),
    )
}

pub(super) async fn search_station(
    store: &dyn TransitStore,
    args: SearchStationArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::SearchStation;
    let name = required_text(tool, "name", &args.name)?;
    let stations = store.search_station(name).await?;
    encode(tool, json!({ "stations": stations }))
}

pub(super) async fn nearest_station(
    store: &dyn TransitStore,
    args: NearestStationArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::NearestStation;
    if !(-90.0..=90.0).contains(&args.latitude) || !(-180.0..=180.0).contains(&args.longitude) {
        return Err(ToolError::invalid(
            tool,
            format!("{}, {} is not a valid position", args.latitude, args.longitude),
        ));
    }
    let stations = store.nearest_stations(args.latitude, args.longitude).await?;
    encode(tool, json!({ "stations": stations }))
}

pub(super) async fn train_journeys(
    rail: &dyn RailService,
    args: TrainJourneysArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::TrainJourneys;
    let from = required_text(tool, "from_station_id", &args.from_station_id)?;
    let to = required_text(tool, "to_station_id", &args.to_station_id)?;
    let datetime = match args.datetime.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_datetime(raw).ok_or_else(|| {
            ToolError::invalid(tool, format!("'{}' is not an ISO 8601 date-time", raw))
        })?),
    };
    encode(tool, rail.journeys(from, to, datetime).await?)
}

pub(super) async fn station_lines(
    rail: &dyn RailService,
    args: StationArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::StationLines;
    let station_id = required_text(tool, "station_id", &args.station_id)?;
    let lines = rail.station_lines(station_id).await?;
    encode(tool, json!({ "station_id": station_id, "lines": lines }))
}

pub(super) async fn next_departures(
    rail: &dyn RailService,
    args: StationArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::NextDepartures;
    let station_id = required_text(tool, "station_id", &args.station_id)?;
    let departures = rail.next_departures(station_id).await?;
    encode(tool, json!({ "station_id": station_id, "departures": departures }))
}

/// Accepts RFC 3339 (offset dropped, local time kept) and the common
/// offset-less ISO forms.
fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}
