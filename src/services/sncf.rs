//! Long-distance rail through the SNCF (Navitia) API.
//!
//! Endpoints used, relative to the coverage base URL:
//! - `/journeys?from=..&to=..&datetime=..`
//! - `/stop_areas/{id}/departures`
//! - `/stop_areas/{id}/lines`
//!
//! Authentication is HTTP basic with the API key as user name.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Itineraries, Itinerary, Leg, ServiceError};

const SERVICE: &str = "SNCF";
const NAVITIA_DATETIME: &str = "%Y%m%dT%H%M%S";
const JOURNEY_COUNT: &str = "3";
const DEPARTURE_COUNT: &str = "10";

pub const DEFAULT_API_BASE: &str = "https://api.sncf.com/v1/coverage/sncf";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RailLine {
    pub id: String,
    pub name: String,
    pub code: String,
    pub mode: String,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Departure {
    pub mode: String,
    pub line: String,
    pub direction: String,
    pub train_number: String,
    pub network: String,
    pub departure_time: String,
    /// Timetabled time, present only when it differs from the real-time one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
}

#[async_trait]
pub trait RailService: Send + Sync {
    async fn journeys(
        &self,
        from_station: &str,
        to_station: &str,
        datetime: Option<NaiveDateTime>,
    ) -> Result<Itineraries, ServiceError>;
    async fn station_lines(&self, station_id: &str) -> Result<Vec<RailLine>, ServiceError>;
    async fn next_departures(&self, station_id: &str) -> Result<Vec<Departure>, ServiceError>;
}

pub struct SncfClient {
    api_key: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct JourneysResponse {
    #[serde(default)]
    journeys: Vec<ApiJourney>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiJourney {
    #[serde(default)]
    duration: u64,
    departure_date_time: Option<String>,
    arrival_date_time: Option<String>,
    #[serde(default)]
    sections: Vec<ApiSection>,
}

#[derive(Deserialize, Debug)]
struct ApiSection {
    r#type: String,
    #[serde(default)]
    duration: u64,
    from: Option<ApiPlace>,
    to: Option<ApiPlace>,
    display_informations: Option<DisplayInfo>,
    #[serde(default)]
    stop_date_times: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct ApiPlace {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Debug, Default)]
struct DisplayInfo {
    #[serde(default)]
    commercial_mode: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    headsign: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    network: String,
}

#[derive(Deserialize, Debug)]
struct DeparturesResponse {
    #[serde(default)]
    departures: Vec<ApiDeparture>,
}

#[derive(Deserialize, Debug)]
struct ApiDeparture {
    #[serde(default)]
    display_informations: DisplayInfo,
    stop_date_time: ApiStopDateTime,
}

#[derive(Deserialize, Debug)]
struct ApiStopDateTime {
    departure_date_time: String,
    base_departure_date_time: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LinesResponse {
    #[serde(default)]
    lines: Vec<ApiLine>,
}

#[derive(Deserialize, Debug)]
struct ApiLine {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: String,
    commercial_mode: Option<NamedObject>,
    network: Option<NamedObject>,
}

#[derive(Deserialize, Debug)]
struct NamedObject {
    #[serde(default)]
    name: String,
}

// --- Implementation ---

impl SncfClient {
    pub fn new(api_key: Option<String>, api_base: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(self.api_base.trim_end_matches('/'))
            .map_err(|e| ServiceError::decode(SERVICE, format!("bad API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::decode(SERVICE, "API base cannot hold a path"))?
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ServiceError::NotConfigured {
            service: SERVICE,
            what: "the SNCF API key".to_string(),
        })?;

        let response = self
            .client
            .get(url)
            .basic_auth(api_key, None::<&str>)
            .query(query)
            .send()
            .await
            .map_err(|e| ServiceError::network(SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::network(SERVICE, e))?;

        if !status.is_success() {
            // Navitia explains most failures (no_solution, unknown_object...) in the body.
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
                return Err(upstream(envelope.error));
            }
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ServiceError::decode(SERVICE, e))
    }
}

#[async_trait]
impl RailService for SncfClient {
    async fn journeys(
        &self,
        from_station: &str,
        to_station: &str,
        datetime: Option<NaiveDateTime>,
    ) -> Result<Itineraries, ServiceError> {
        let mut query = vec![
            ("from", from_station.to_string()),
            ("to", to_station.to_string()),
            ("count", JOURNEY_COUNT.to_string()),
        ];
        if let Some(datetime) = datetime {
            query.push(("datetime", datetime.format(NAVITIA_DATETIME).to_string()));
        }

        let response: JourneysResponse = self.get(self.url(&["journeys"])?, &query).await?;
        convert_journeys(response)
    }

    async fn station_lines(&self, station_id: &str) -> Result<Vec<RailLine>, ServiceError> {
        let url = self.url(&["stop_areas", station_id, "lines"])?;
        let response: LinesResponse = self.get(url, &[]).await?;
        let lines: Vec<RailLine> = response
            .lines
            .into_iter()
            .map(|line| RailLine {
                id: line.id,
                name: line.name,
                code: line.code,
                mode: line.commercial_mode.map(|m| m.name).unwrap_or_default(),
                network: line.network.map(|n| n.name).unwrap_or_default(),
            })
            .collect();
        if lines.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no rail line serves station '{}'",
                station_id
            )));
        }
        Ok(lines)
    }

    async fn next_departures(&self, station_id: &str) -> Result<Vec<Departure>, ServiceError> {
        let url = self.url(&["stop_areas", station_id, "departures"])?;
        let response: DeparturesResponse = self
            .get(url, &[("count", DEPARTURE_COUNT.to_string())])
            .await?;
        let departures: Vec<Departure> = response
            .departures
            .into_iter()
            .map(|d| {
                let info = d.display_informations;
                let real = d.stop_date_time.departure_date_time;
                let scheduled = d
                    .stop_date_time
                    .base_departure_date_time
                    .filter(|base| *base != real)
                    .map(|base| readable_datetime(&base));
                Departure {
                    mode: info.commercial_mode,
                    line: first_non_empty(&[info.code, info.label]),
                    direction: info.direction,
                    train_number: info.headsign,
                    network: info.network,
                    departure_time: readable_datetime(&real),
                    scheduled_time: scheduled,
                }
            })
            .collect();
        if departures.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no upcoming departure from station '{}'",
                station_id
            )));
        }
        Ok(departures)
    }
}

fn upstream(error: ApiError) -> ServiceError {
    ServiceError::Upstream {
        service: SERVICE,
        status: if error.id.is_empty() { "error".to_string() } else { error.id },
        message: error.message,
    }
}

fn convert_journeys(response: JourneysResponse) -> Result<Itineraries, ServiceError> {
    if let Some(error) = response.error {
        return Err(upstream(error));
    }

    let itineraries: Vec<Itinerary> = response
        .journeys
        .into_iter()
        .enumerate()
        .map(|(index, journey)| {
            let departure = journey
                .sections
                .first()
                .and_then(|s| s.from.as_ref())
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let arrival = journey
                .sections
                .last()
                .and_then(|s| s.to.as_ref())
                .map(|p| p.name.clone())
                .unwrap_or_default();
            Itinerary {
                rank: index + 1,
                duration: format_duration(journey.duration),
                distance: None,
                departure,
                arrival,
                departure_time: journey.departure_date_time.as_deref().map(readable_datetime),
                arrival_time: journey.arrival_date_time.as_deref().map(readable_datetime),
                legs: journey.sections.into_iter().filter_map(convert_section).collect(),
            }
        })
        .collect();

    if itineraries.is_empty() {
        return Err(ServiceError::NotFound(
            "SNCF returned no journey for these stations".to_string(),
        ));
    }
    Ok(Itineraries { itineraries })
}

fn convert_section(section: ApiSection) -> Option<Leg> {
    let from = section.from.map(|p| p.name).unwrap_or_default();
    let to = section.to.map(|p| p.name).unwrap_or_default();
    match section.r#type.as_str() {
        "public_transport" => {
            let info = section.display_informations.unwrap_or_default();
            Some(Leg::Transit {
                vehicle: info.commercial_mode,
                line: first_non_empty(&[info.code, info.label.clone()]),
                line_name: first_non_empty(&[info.name, info.label]),
                direction: info.direction,
                departure_stop: from,
                arrival_stop: to,
                duration: format_duration(section.duration),
                stop_count: section.stop_date_times.len().saturating_sub(1) as u32,
            })
        }
        "street_network" | "transfer" | "crow_fly" => Some(Leg::Walking {
            instruction: if to.is_empty() {
                "Marcher".to_string()
            } else {
                format!("Marcher jusqu'à {}", to)
            },
            duration: format_duration(section.duration),
            distance: String::new(),
        }),
        _ => None,
    }
}

fn first_non_empty(candidates: &[String]) -> String {
    candidates
        .iter()
        .find(|c| !c.is_empty())
        .cloned()
        .unwrap_or_default()
}

/// `20240601T083000` -> `2024-06-01 08:30`; anything unparsable passes through.
fn readable_datetime(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, NAVITIA_DATETIME)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn format_duration(seconds: u64) -> String {
    let minutes = (seconds + 59) / 60;
    if minutes < 60 {
        format!("{} min", minutes)
    } else {
        format!("{} h {:02} min", minutes / 60, minutes % 60)
    }
}
