//! Local transit directions through the Google Directions API.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{status_error, Itineraries, Itinerary, Leg, ServiceError};

const SERVICE: &str = "Google Directions";

pub const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/directions/json";

static COORDINATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+\.?\d*\s*,\s*-?\d+\.?\d*$").expect("coordinate pattern is valid")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("html tag pattern is valid"));

/// Transit directions between two places.
///
/// Each place is free-form text or a `"lat, lng"` pair.
#[async_trait]
pub trait DirectionsService: Send + Sync {
    async fn directions(
        &self,
        departure: &str,
        destination: &str,
    ) -> Result<Itineraries, ServiceError>;
}

pub struct GoogleDirections {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Deserialize, Debug)]
struct ApiRoute {
    #[serde(default)]
    legs: Vec<ApiLeg>,
}

#[derive(Deserialize, Debug)]
struct ApiLeg {
    duration: Option<TextValue>,
    distance: Option<TextValue>,
    #[serde(default)]
    start_address: String,
    #[serde(default)]
    end_address: String,
    departure_time: Option<TextValue>,
    arrival_time: Option<TextValue>,
    #[serde(default)]
    steps: Vec<ApiStep>,
}

#[derive(Deserialize, Debug)]
struct TextValue {
    text: String,
}

#[derive(Deserialize, Debug)]
struct ApiStep {
    travel_mode: String,
    html_instructions: Option<String>,
    duration: Option<TextValue>,
    distance: Option<TextValue>,
    transit_details: Option<ApiTransitDetails>,
}

#[derive(Deserialize, Debug, Default)]
struct ApiTransitDetails {
    line: Option<ApiLine>,
    headsign: Option<String>,
    departure_stop: Option<Named>,
    arrival_stop: Option<Named>,
    num_stops: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ApiLine {
    short_name: Option<String>,
    name: Option<String>,
    vehicle: Option<ApiVehicle>,
}

#[derive(Deserialize, Debug)]
struct ApiVehicle {
    r#type: String,
}

#[derive(Deserialize, Debug)]
struct Named {
    name: String,
}

impl GoogleDirections {
    pub fn new(api_key: Option<String>, endpoint: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client,
        }
    }

    fn parse_response(&self, api_response: ApiResponse) -> Result<Itineraries, ServiceError> {
        if api_response.status != "OK" {
            return Err(ServiceError::Upstream {
                service: SERVICE,
                status: api_response.status,
                message: api_response
                    .error_message
                    .unwrap_or_else(|| "no route found".to_string()),
            });
        }

        let itineraries: Vec<Itinerary> = api_response
            .routes
            .into_iter()
            .filter_map(|route| route.legs.into_iter().next())
            .enumerate()
            .map(|(index, leg)| Itinerary {
                rank: index + 1,
                duration: text(leg.duration),
                distance: leg.distance.map(|d| d.text),
                departure: leg.start_address,
                arrival: leg.end_address,
                departure_time: leg.departure_time.map(|t| t.text),
                arrival_time: leg.arrival_time.map(|t| t.text),
                legs: leg.steps.into_iter().map(convert_step).collect(),
            })
            .collect();

        if itineraries.is_empty() {
            return Err(ServiceError::NotFound(
                "Google Directions returned no transit route".to_string(),
            ));
        }
        Ok(Itineraries { itineraries })
    }
}

#[async_trait]
impl DirectionsService for GoogleDirections {
    async fn directions(
        &self,
        departure: &str,
        destination: &str,
    ) -> Result<Itineraries, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::NotConfigured {
            service: SERVICE,
            what: "the Google Maps API key".to_string(),
        })?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("origin", localize(departure)),
                ("destination", localize(destination)),
                ("mode", "transit".to_string()),
                ("alternatives", "true".to_string()),
                ("language", "fr".to_string()),
                ("region", "fr".to_string()),
                ("key", api_key.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::network(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(SERVICE, e))?;

        self.parse_response(api_response)
    }
}

pub fn is_coordinates(place: &str) -> bool {
    COORDINATES.is_match(place.trim())
}

/// Coordinates pass through; place names get a country hint.
fn localize(place: &str) -> String {
    let place = place.trim();
    if is_coordinates(place) {
        place.to_string()
    } else {
        format!("{}, France", place)
    }
}

fn text(value: Option<TextValue>) -> String {
    value.map(|v| v.text).unwrap_or_default()
}

fn convert_step(step: ApiStep) -> Leg {
    if step.travel_mode == "WALKING" {
        let instruction = step
            .html_instructions
            .map(|html| HTML_TAG.replace_all(&html, "").into_owned())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Marcher".to_string());
        return Leg::Walking {
            instruction,
            duration: text(step.duration),
            distance: text(step.distance),
        };
    }

    let details = step.transit_details.unwrap_or_default();
    let (line, line_name, vehicle) = match details.line {
        Some(line) => (
            line.short_name.unwrap_or_default(),
            line.name.unwrap_or_default(),
            line.vehicle.map(|v| v.r#type),
        ),
        None => (String::new(), String::new(), None),
    };
    Leg::Transit {
        vehicle: vehicle.unwrap_or_else(|| "TRANSIT".to_string()),
        line,
        line_name,
        direction: details.headsign.unwrap_or_default(),
        departure_stop: details.departure_stop.map(|s| s.name).unwrap_or_default(),
        arrival_stop: details.arrival_stop.map(|s| s.name).unwrap_or_default(),
        duration: text(step.duration),
        stop_count: details.num_stops.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> GoogleDirections {
        GoogleDirections::new(Some("k".into()), None, reqwest::Client::new())
    }

    #[test]
    fn test_coordinate_detection() {
        assert!(is_coordinates("43.607, 1.430"));
        assert!(is_coordinates("-43.6,1.4"));
        assert!(!is_coordinates("Capitole, Toulouse"));
        assert_eq!(localize("Capitole"), "Capitole, France");
        assert_eq!(localize(" 43.607, 1.430 "), "43.607, 1.430");
    }

    #[test]
    fn test_parse_walk_and_metro() {
        let api: ApiResponse = serde_json::from_value(json!({
            "status": "OK",
            "routes": [{
                "legs": [{
                    "duration": {"text": "22 min"},
                    "distance": {"text": "8,1 km"},
                    "start_address": "Ramonville-Saint-Agne",
                    "end_address": "Place du Capitole, Toulouse",
                    "departure_time": {"text": "14:30"},
                    "steps": [
                        {"travel_mode": "WALKING", "html_instructions": "Marcher jusqu'à <b>Ramonville</b>",
                         "duration": {"text": "3 min"}, "distance": {"text": "200 m"}},
                        {"travel_mode": "TRANSIT", "duration": {"text": "15 min"},
                         "transit_details": {
                            "line": {"short_name": "B", "name": "Métro B", "vehicle": {"type": "SUBWAY"}},
                            "headsign": "Borderouge",
                            "departure_stop": {"name": "Ramonville"},
                            "arrival_stop": {"name": "Jean Jaurès"},
                            "num_stops": 9
                         }}
                    ]
                }]
            }]
        }))
        .unwrap();

        let result = provider().parse_response(api).unwrap();
        let itinerary = &result.itineraries[0];
        assert_eq!(itinerary.rank, 1);
        assert_eq!(itinerary.departure_time.as_deref(), Some("14:30"));
        assert_eq!(itinerary.arrival_time, None);
        assert_eq!(
            itinerary.legs[0],
            Leg::Walking {
                instruction: "Marcher jusqu'à Ramonville".into(),
                duration: "3 min".into(),
                distance: "200 m".into(),
            }
        );
        match &itinerary.legs[1] {
            Leg::Transit { vehicle, line, arrival_stop, stop_count, .. } => {
                assert_eq!(vehicle, "SUBWAY");
                assert_eq!(line, "B");
                assert_eq!(arrival_stop, "Jean Jaurès");
                assert_eq!(*stop_count, 9);
            }
            other => panic!("expected transit leg, got {:?}", other),
        }
    }

    #[test]
    fn test_non_ok_status_is_an_error() {
        let api: ApiResponse =
            serde_json::from_value(json!({"status": "ZERO_RESULTS", "routes": []})).unwrap();
        let err = provider().parse_response(api).unwrap_err();
        assert_eq!(err.to_string(), "Google Directions: ZERO_RESULTS - no route found");
    }

    #[test]
    fn test_ok_without_routes_is_not_silent() {
        let api: ApiResponse = serde_json::from_value(json!({"status": "OK"})).unwrap();
        assert!(matches!(
            provider().parse_response(api),
            Err(ServiceError::NotFound(_))
        ));
    }
}
