//! Stop and line tools backed by the transit store.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{encode, required_text, strict_object, ToolError, ToolName};
use crate::services::store::TransitStore;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchStopArgs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchLineArgs {
    pub line: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineStopsArgs {
    pub line_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopLinesArgs {
    pub stop_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TownStopsArgs {
    pub town: String,
}

pub(super) fn search_stop_spec() -> (&'static str, Value) {
    (
        "Find a Tisséo stop by name. Returns its address and town, or close \
         suggestions when nothing matches exactly. Call this before get_directions \
         when the destination is a stop.",
        strict_object(json!({
            "name": {"type": "string", "description": "Stop name, e.g. 'Capitole', 'Jeanne d'Arc'"}
        })),
    )
}

pub(super) fn search_line_spec() -> (&'static str, Value) {
    (
        "Find a transit line by name or number. Returns its mode and colour.",
        strict_object(json!({
            "line": {"type": "string", "description": "Line name or number, e.g. 'A', 'L1', 'T1', '14'"}
        })),
    )
}

pub(super) fn line_stops_spec() -> (&'static str, Value) {
    (
        "List the stops of a line in route order. Use it to check whether a \
         line serves a stop.",
        strict_object(json!({
            "line_id": {"type": "string", "description": "Line identifier, e.g. 'A', 'L1', '14'"}
        })),
    )
}

pub(super) fn stop_lines_spec() -> (&'static str, Value) {
    (
        "List every line serving a stop.",
        strict_object(json!({
            "stop_name": {"type": "string", "description": "Stop name, e.g. 'Jean Jaurès'"}
        })),
    )
}

pub(super) fn town_stops_spec() -> (&'static str, Value) {
    (
        "List the transit stops in a town.",
        strict_object(json!({
            "town": {"type": "string", "description": "Town name, e.g. 'Ramonville', 'Castanet-Tolosan'"}
        })),
    )
}

pub(super) async fn search_stop(
    store: &dyn TransitStore,
    args: SearchStopArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::SearchStop;
    let name = required_text(tool, "name", &args.name)?;
    encode(tool, store.search_stop(name).await?)
}

pub(super) async fn search_line(
    store: &dyn TransitStore,
    args: SearchLineArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::SearchLine;
    let line = required_text(tool, "line", &args.line)?;
    let lines = store.search_line(line).await?;
    encode(tool, json!({ "lines": lines }))
}

pub(super) async fn line_stops(
    store: &dyn TransitStore,
    args: LineStopsArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::LineStops;
    let line_id = required_text(tool, "line_id", &args.line_id)?;
    let stops = store.line_stops(line_id).await?;
    encode(tool, json!({ "line": line_id, "stops": stops }))
}

pub(super) async fn stop_lines(
    store: &dyn TransitStore,
    args: StopLinesArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::StopLines;
    let stop_name = required_text(tool, "stop_name", &args.stop_name)?;
    let lines = store.stop_lines(stop_name).await?;
    encode(tool, json!({ "stop": stop_name, "lines": lines }))
}

pub(super) async fn town_stops(
    store: &dyn TransitStore,
    args: TownStopsArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::TownStops;
    let town = required_text(tool, "town", &args.town)?;
    let stops = store.town_stops(town).await?;
    encode(tool, json!({ "town": town, "stops": stops }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_blank_name_is_invalid() {
        rt().block_on(async {
            let err = search_stop(&FakeStore::default(), SearchStopArgs { name: "   ".into() })
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "invalid arguments for search_stop: 'name' must not be empty");
        });
    }

    #[test]
    fn test_line_stops_payload() {
        rt().block_on(async {
            let value = line_stops(&FakeStore::default(), LineStopsArgs { line_id: " A ".into() })
                .await
                .unwrap();
            assert_eq!(value["line"], "A");
            assert_eq!(value["stops"][0], "Basso Cambo");
        });
    }

    #[test]
    fn test_stop_lines_payload() {
        rt().block_on(async {
            let value = stop_lines(
                &FakeStore::default(),
                StopLinesArgs { stop_name: "Jean Jaurès".into() },
            )
            .await
            .unwrap();
            assert_eq!(value["lines"][0]["line"], "A");
        });
    }
}
