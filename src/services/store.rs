//! Stop, line and station lookups against the transit database.
//!
//! The database is exposed through PostgREST (Supabase). Column names on
//! the wire follow the database schema; the Rust types use our own names.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{status_error, ServiceError};

const SERVICE: &str = "transit store";

/// Half-width of the box searched around a position, in degrees.
const NEAREST_BOX_DEG: f64 = 0.5;
const NEAREST_COUNT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    #[serde(rename(deserialize = "nom_arret"))]
    pub name: String,
    #[serde(rename(deserialize = "commune"), default)]
    pub town: Option<String>,
    #[serde(rename(deserialize = "adresse"), default)]
    pub address: Option<String>,
    #[serde(default, alias = "score", skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Outcome of a stop search: exact matches, or fuzzy suggestions when
/// nothing matched exactly.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StopSearch {
    pub results: Vec<Stop>,
    pub suggestions: Vec<Stop>,
    pub exact_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Line {
    #[serde(rename(deserialize = "ligne"))]
    pub line: String,
    #[serde(rename(deserialize = "nom_ligne"), default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(rename(deserialize = "couleur"), default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineAtStop {
    #[serde(rename(deserialize = "ligne"))]
    pub line: String,
    #[serde(rename(deserialize = "nom_ligne"), default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    #[serde(rename(deserialize = "nom"))]
    pub name: String,
    #[serde(rename(deserialize = "id_sncf"))]
    pub id: String,
    #[serde(rename(deserialize = "commune"), default)]
    pub town: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NearbyStation {
    #[serde(flatten)]
    pub station: Station,
    pub distance_km: f64,
}

#[derive(Deserialize)]
struct StopNameRow {
    nom_arret: String,
}

/// Read-only lookups in the transit database.
#[async_trait]
pub trait TransitStore: Send + Sync {
    async fn search_stop(&self, name: &str) -> Result<StopSearch, ServiceError>;
    async fn search_line(&self, line: &str) -> Result<Vec<Line>, ServiceError>;
    /// Stop names of a line, in route order.
    async fn line_stops(&self, line_id: &str) -> Result<Vec<String>, ServiceError>;
    async fn stop_lines(&self, stop_name: &str) -> Result<Vec<LineAtStop>, ServiceError>;
    async fn town_stops(&self, town: &str) -> Result<Vec<Stop>, ServiceError>;
    async fn search_station(&self, name: &str) -> Result<Vec<Station>, ServiceError>;
    /// The closest rail stations to a position, nearest first.
    async fn nearest_stations(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<NearbyStation>, ServiceError>;
}

/// PostgREST client for the Supabase-hosted transit database.
pub struct SupabaseStore {
    base_url: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(base_url: Option<String>, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.filter(|u| !u.is_empty()),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ServiceError> {
        let base = self.base_url.as_deref().ok_or(ServiceError::NotConfigured {
            service: SERVICE,
            what: "supabase_url".to_string(),
        })?;
        let key = self.api_key.as_deref().ok_or(ServiceError::NotConfigured {
            service: SERVICE,
            what: "the Supabase API key".to_string(),
        })?;
        Ok((base.trim_end_matches('/'), key))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ServiceError> {
        let (base, key) = self.credentials()?;
        let url = format!("{}/rest/v1/{}", base, table);
        let response = self
            .client
            .get(&url)
            .header("apikey", key)
            .bearer_auth(key)
            .query(query)
            .send()
            .await
            .map_err(|e| ServiceError::network(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::decode(SERVICE, e))
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        body: serde_json::Value,
    ) -> Result<Vec<T>, ServiceError> {
        let (base, key) = self.credentials()?;
        let url = format!("{}/rest/v1/rpc/{}", base, function);
        let response = self
            .client
            .post(&url)
            .header("apikey", key)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::network(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }
        // PostgREST answers `null` when a set-returning function yields nothing.
        let rows: Option<Vec<T>> = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(SERVICE, e))?;
        Ok(rows.unwrap_or_default())
    }
}

#[async_trait]
impl TransitStore for SupabaseStore {
    async fn search_stop(&self, name: &str) -> Result<StopSearch, ServiceError> {
        let exact: Vec<Stop> = self
            .select(
                "arrets_physiques",
                &[
                    ("select", "nom_arret,commune,adresse".to_string()),
                    ("nom_arret", contains(name)),
                    ("limit", "5".to_string()),
                ],
            )
            .await?;
        if !exact.is_empty() {
            return Ok(StopSearch {
                results: exact,
                suggestions: vec![],
                exact_match: true,
            });
        }

        let suggestions: Vec<Stop> = self
            .rpc("recherche_arret_fuzzy", json!({ "search_term": name }))
            .await?;
        if suggestions.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "no stop matching '{}' and no similar stop name",
                name
            )));
        }
        Ok(StopSearch {
            results: vec![],
            suggestions,
            exact_match: false,
        })
    }

    async fn search_line(&self, line: &str) -> Result<Vec<Line>, ServiceError> {
        let lines: Vec<Line> = self
            .select(
                "lignes",
                &[
                    ("select", "ligne,nom_ligne,mode,couleur".to_string()),
                    ("ligne", format!("ilike.{}", sanitize(line))),
                    ("limit", "5".to_string()),
                ],
            )
            .await?;
        non_empty(lines, || format!("no line matching '{}'", line))
    }

    async fn line_stops(&self, line_id: &str) -> Result<Vec<String>, ServiceError> {
        let rows: Vec<StopNameRow> = self
            .select(
                "arrets_itineraire",
                &[
                    ("select", "nom_arret".to_string()),
                    ("ligne", format!("ilike.{}", sanitize(line_id))),
                    ("order", "ordre.asc".to_string()),
                    ("limit", "50".to_string()),
                ],
            )
            .await?;
        let names = dedup_by_key(rows.into_iter().map(|r| r.nom_arret), |name| name.clone());
        non_empty(names, || format!("no stops found for line '{}'", line_id))
    }

    async fn stop_lines(&self, stop_name: &str) -> Result<Vec<LineAtStop>, ServiceError> {
        let rows: Vec<LineAtStop> = self
            .select(
                "arrets_itineraire",
                &[
                    ("select", "ligne,nom_ligne,mode".to_string()),
                    ("nom_arret", contains(stop_name)),
                    ("limit", "20".to_string()),
                ],
            )
            .await?;
        let lines = dedup_by_key(rows, |row| row.line.clone());
        non_empty(lines, || format!("no line serves a stop matching '{}'", stop_name))
    }

    async fn town_stops(&self, town: &str) -> Result<Vec<Stop>, ServiceError> {
        let stops: Vec<Stop> = self
            .select(
                "arrets_physiques",
                &[
                    ("select", "nom_arret,adresse,commune".to_string()),
                    ("commune", contains(town)),
                    ("limit", "20".to_string()),
                ],
            )
            .await?;
        non_empty(stops, || format!("no stops found in a town matching '{}'", town))
    }

    async fn search_station(&self, name: &str) -> Result<Vec<Station>, ServiceError> {
        let stations: Vec<Station> = self
            .select(
                "gares_sncf",
                &[
                    ("select", "nom,id_sncf,commune,latitude,longitude".to_string()),
                    ("nom", contains(name)),
                    ("limit", "5".to_string()),
                ],
            )
            .await?;
        non_empty(stations, || format!("no rail station matching '{}'", name))
    }

    async fn nearest_stations(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<NearbyStation>, ServiceError> {
        let candidates: Vec<Station> = self
            .select(
                "gares_sncf",
                &[
                    ("select", "nom,id_sncf,commune,latitude,longitude".to_string()),
                    ("latitude", format!("gte.{}", latitude - NEAREST_BOX_DEG)),
                    ("latitude", format!("lte.{}", latitude + NEAREST_BOX_DEG)),
                    ("longitude", format!("gte.{}", longitude - NEAREST_BOX_DEG)),
                    ("longitude", format!("lte.{}", longitude + NEAREST_BOX_DEG)),
                ],
            )
            .await?;
        let nearest = rank_by_distance(candidates, latitude, longitude, NEAREST_COUNT);
        non_empty(nearest, || {
            format!("no rail station within reach of {}, {}", latitude, longitude)
        })
    }
}

/// PostgREST `ilike` filter matching `term` anywhere in the column.
fn contains(term: &str) -> String {
    format!("ilike.*{}*", sanitize(term))
}

/// Drop the characters PostgREST treats as wildcards or reserved.
fn sanitize(term: &str) -> String {
    term.trim()
        .chars()
        .filter(|c| !matches!(c, '*' | '%' | '_' | '(' | ')' | ','))
        .collect()
}

fn non_empty<T>(items: Vec<T>, message: impl FnOnce() -> String) -> Result<Vec<T>, ServiceError> {
    if items.is_empty() {
        Err(ServiceError::NotFound(message()))
    } else {
        Ok(items)
    }
}

/// Keep the first item for each key, preserving order.
fn dedup_by_key<T, K: Eq + std::hash::Hash>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

fn rank_by_distance(
    stations: Vec<Station>,
    latitude: f64,
    longitude: f64,
    count: usize,
) -> Vec<NearbyStation> {
    let mut ranked: Vec<NearbyStation> = stations
        .into_iter()
        .map(|station| {
            let km = haversine_km(latitude, longitude, station.latitude, station.longitude);
            NearbyStation {
                station,
                distance_km: (km * 10.0).round() / 10.0,
            }
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(count);
    ranked
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
