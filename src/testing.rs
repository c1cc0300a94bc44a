//! Fakes shared by the unit tests: a scripted planner and in-memory
//! collaborators with optional latency.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::agent::{Agent, AgentSettings};
use crate::llm::LlmProvider;
use crate::services::google::DirectionsService;
use crate::services::sncf::{Departure, RailLine, RailService};
use crate::services::store::{
    Line, LineAtStop, NearbyStation, Station, Stop, StopSearch, TransitStore,
};
use crate::services::{Itineraries, Itinerary, Leg, ServiceError};
use crate::tools::ToolDispatcher;
use crate::types::{ChatRequest, ChatResponse, ToolCall};

pub fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

pub fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        tool_calls: vec![],
    }
}

pub fn tools(calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: calls,
    }
}

// --- Planner ---

/// Replays canned responses and records every request it receives.
#[derive(Default)]
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Result<ChatResponse, String>>>,
    repeat: Option<ChatResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedPlanner {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// Answers every request with the same response.
    pub fn always(response: ChatResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(message.to_string())])),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedPlanner {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(Ok(response)), _) => Ok(response),
            (Some(Err(message)), _) => Err(anyhow!(message)),
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Err(anyhow!("planner script exhausted")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// --- Collaborators ---

fn unavailable(service: &'static str) -> ServiceError {
    ServiceError::Status {
        service,
        status: 503,
        message: "service unavailable".to_string(),
    }
}

/// In-memory store. Per-operation delays let tests reorder completions.
#[derive(Default)]
pub struct FakeStore {
    fail: bool,
    delays: HashMap<&'static str, Duration>,
}

impl FakeStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, operation: &'static str, delay: Duration) -> Self {
        self.delays.insert(operation, delay);
        self
    }

    async fn enter(&self, operation: &'static str) -> Result<(), ServiceError> {
        if let Some(delay) = self.delays.get(operation) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail {
            return Err(unavailable("transit store"));
        }
        Ok(())
    }
}

fn stop(name: &str, address: &str) -> Stop {
    Stop {
        name: name.to_string(),
        town: Some("Toulouse".to_string()),
        address: Some(address.to_string()),
        similarity: None,
    }
}

fn matabiau() -> Station {
    Station {
        name: "Toulouse Matabiau".to_string(),
        id: "stop_area:SNCF:87611004".to_string(),
        town: Some("Toulouse".to_string()),
        latitude: 43.6114,
        longitude: 1.4537,
    }
}

#[async_trait]
impl TransitStore for FakeStore {
    async fn search_stop(&self, name: &str) -> Result<StopSearch, ServiceError> {
        self.enter("search_stop").await?;
        Ok(StopSearch {
            results: vec![stop(name, "Place du Capitole")],
            suggestions: vec![],
            exact_match: true,
        })
    }

    async fn search_line(&self, line: &str) -> Result<Vec<Line>, ServiceError> {
        self.enter("search_line").await?;
        Ok(vec![Line {
            line: line.to_string(),
            name: Some(format!("Métro {}", line)),
            mode: Some("metro".to_string()),
            color: Some("#E5056E".to_string()),
        }])
    }

    async fn line_stops(&self, _line_id: &str) -> Result<Vec<String>, ServiceError> {
        self.enter("line_stops").await?;
        Ok(vec!["Basso Cambo".to_string(), "Bellefontaine".to_string()])
    }

    async fn stop_lines(&self, _stop_name: &str) -> Result<Vec<LineAtStop>, ServiceError> {
        self.enter("stop_lines").await?;
        Ok(vec![LineAtStop {
            line: "A".to_string(),
            name: Some("Métro A".to_string()),
            mode: Some("metro".to_string()),
        }])
    }

    async fn town_stops(&self, town: &str) -> Result<Vec<Stop>, ServiceError> {
        self.enter("town_stops").await?;
        Ok(vec![stop(&format!("{} Centre", town), "Place de la Mairie")])
    }

    async fn search_station(&self, _name: &str) -> Result<Vec<Station>, ServiceError> {
        self.enter("search_station").await?;
        Ok(vec![matabiau()])
    }

    async fn nearest_stations(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Vec<NearbyStation>, ServiceError> {
        self.enter("nearest_stations").await?;
        Ok(vec![NearbyStation {
            station: matabiau(),
            distance_km: 1.2,
        }])
    }
}

fn sample_itineraries() -> Itineraries {
    Itineraries {
        itineraries: vec![Itinerary {
            rank: 1,
            duration: "22 min".to_string(),
            distance: Some("8 km".to_string()),
            departure: "Ramonville".to_string(),
            arrival: "Capitole".to_string(),
            departure_time: None,
            arrival_time: None,
            legs: vec![
                Leg::Walking {
                    instruction: "Marcher jusqu'à Ramonville".to_string(),
                    duration: "3 min".to_string(),
                    distance: "200 m".to_string(),
                },
                Leg::Transit {
                    vehicle: "SUBWAY".to_string(),
                    line: "B".to_string(),
                    line_name: "Métro B".to_string(),
                    direction: "Borderouge".to_string(),
                    departure_stop: "Ramonville".to_string(),
                    arrival_stop: "Jean Jaurès".to_string(),
                    duration: "15 min".to_string(),
                    stop_count: 9,
                },
            ],
        }],
    }
}

#[derive(Default)]
pub struct FakeDirections {
    failure: Option<(String, String)>,
    delay: Option<Duration>,
}

impl FakeDirections {
    /// Fails like an upstream non-OK status would.
    pub fn failing(status: &str, message: &str) -> Self {
        Self {
            failure: Some((status.to_string(), message.to_string())),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl DirectionsService for FakeDirections {
    async fn directions(
        &self,
        _departure: &str,
        _destination: &str,
    ) -> Result<Itineraries, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some((status, message)) => Err(ServiceError::Upstream {
                service: "Google Directions",
                status: status.clone(),
                message: message.clone(),
            }),
            None => Ok(sample_itineraries()),
        }
    }
}

#[derive(Default)]
pub struct FakeRail {
    fail: bool,
}

impl FakeRail {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl RailService for FakeRail {
    async fn journeys(
        &self,
        _from_station: &str,
        _to_station: &str,
        _datetime: Option<NaiveDateTime>,
    ) -> Result<Itineraries, ServiceError> {
        if self.fail {
            return Err(unavailable("SNCF"));
        }
        Ok(sample_itineraries())
    }

    async fn station_lines(&self, station_id: &str) -> Result<Vec<RailLine>, ServiceError> {
        if self.fail {
            return Err(unavailable("SNCF"));
        }
        Ok(vec![RailLine {
            id: format!("line:{}", station_id),
            name: "Toulouse - Brive".to_string(),
            code: "C".to_string(),
            mode: "TER".to_string(),
            network: "TER Occitanie".to_string(),
        }])
    }

    async fn next_departures(&self, _station_id: &str) -> Result<Vec<Departure>, ServiceError> {
        if self.fail {
            return Err(unavailable("SNCF"));
        }
        Ok(vec![Departure {
            mode: "TER".to_string(),
            line: "C".to_string(),
            direction: "Brive".to_string(),
            train_number: "871234".to_string(),
            network: "TER Occitanie".to_string(),
            departure_time: "2024-06-01 08:30".to_string(),
            scheduled_time: None,
        }])
    }
}

// --- Assembly ---

pub fn settings() -> AgentSettings {
    AgentSettings {
        model: "test-model".to_string(),
        system_prompt: "Tu es un assistant transports.".to_string(),
        max_tokens: 500,
        temperature: 0.3,
        max_tool_rounds: 8,
        planner_timeout: None,
        empty_reply_fallback: "Désolé, je n'ai pas pu générer une réponse.".to_string(),
        budget_exhausted_fallback: "Désolé, j'ai eu du mal à traiter ta demande. Peux-tu reformuler ?"
            .to_string(),
    }
}

pub fn agent_with(planner: Arc<ScriptedPlanner>, dispatcher: ToolDispatcher) -> Agent {
    Agent::new(planner, Arc::new(dispatcher), settings())
}

pub fn default_dispatcher() -> ToolDispatcher {
    ToolDispatcher::new(
        Arc::new(FakeStore::default()),
        Arc::new(FakeDirections::default()),
        Arc::new(FakeRail::default()),
    )
}
