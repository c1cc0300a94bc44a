//! Local transit directions tool.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{encode, required_text, strict_object, ToolError, ToolName};
use crate::services::google::DirectionsService;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectionsArgs {
    pub departure: String,
    pub destination: String,
}

pub(super) fn directions_spec() -> (&'static str, Value) {
    (
        "Compute public-transit itineraries. For a stop, pass the full address \
         returned by search_stop (e.g. 'Place Jeanne d'Arc, Toulouse').",
        strict_object(json!({
            "departure": {
                "type": "string",
                "description": "GPS coordinates 'lat, lng' OR a full address with town"
            },
            "destination": {
                "type": "string",
                "description": "GPS coordinates 'lat, lng' OR a full address with town"
            }
        })),
    )
}

pub(super) async fn directions(
    service: &dyn DirectionsService,
    args: DirectionsArgs,
) -> Result<Value, ToolError> {
    let tool = ToolName::Directions;
    let departure = required_text(tool, "departure", &args.departure)?;
    let destination = required_text(tool, "destination", &args.destination)?;
    encode(tool, service.directions(departure, destination).await?)
}
