//! End-to-end run of the agent loop over HTTP
//!
//! The planner (OpenAI-compatible chat completions) and the transit store
//! are both wiremock servers; the loop, the adapters and the dispatcher are
//! the real ones.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use smartmove::agent::{Agent, AgentSettings, Termination};
use smartmove::llm::openai_compatible::OpenAiCompatibleProvider;
use smartmove::services::google::GoogleDirections;
use smartmove::services::sncf::SncfClient;
use smartmove::services::store::SupabaseStore;
use smartmove::tools::ToolDispatcher;

fn settings() -> AgentSettings {
    AgentSettings {
        model: "gpt-4o-mini".into(),
        system_prompt: "Tu es un assistant transports.".into(),
        max_tokens: 2000,
        temperature: 0.3,
        max_tool_rounds: 8,
        planner_timeout: None,
        empty_reply_fallback: "Désolé, je n'ai pas pu générer une réponse.".into(),
        budget_exhausted_fallback: "Désolé, j'ai eu du mal à traiter ta demande. Peux-tu reformuler ?"
            .into(),
    }
}

fn agent(planner: &MockServer, store: &MockServer) -> Agent {
    let client = reqwest::Client::new();
    let llm = OpenAiCompatibleProvider::new("sk-test".into(), Some(planner.uri()), client.clone());
    let dispatcher = ToolDispatcher::new(
        Arc::new(SupabaseStore::new(Some(store.uri()), Some("anon".into()), client.clone())),
        Arc::new(GoogleDirections::new(None, None, client.clone())),
        Arc::new(SncfClient::new(None, None, client)),
    );
    Agent::new(Arc::new(llm), Arc::new(dispatcher), settings())
}

async fn planner_bodies(planner: &MockServer) -> Vec<Value> {
    planner
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/chat/completions")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_line_question_round_trip() {
    let planner = MockServer::start().await;
    let store = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": null, "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "search_line", "arguments": "{\"line\":\"A\"}"}
            }]}}]
        })))
        .up_to_n_times(1)
        .mount(&planner)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "La ligne A est le métro Basso Cambo - Balma-Gramont."}}]
        })))
        .mount(&planner)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/lignes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ligne": "A", "nom_ligne": "Métro A", "mode": "metro", "couleur": "#E5056E"}
        ])))
        .mount(&store)
        .await;

    let reply = agent(&planner, &store)
        .process_message(&[], "c'est quoi la ligne A ?")
        .await
        .unwrap();

    assert_eq!(reply.termination, Termination::Answered);
    assert_eq!(reply.text, "La ligne A est le métro Basso Cambo - Balma-Gramont.");

    let bodies = planner_bodies(&planner).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["tool_choice"], "required");
    assert_eq!(bodies[0]["tools"].as_array().unwrap().len(), 11);
    assert_eq!(bodies[1]["tool_choice"], "auto");

    let messages = bodies[1]["messages"].as_array().unwrap();
    let tool_turn = messages.last().unwrap();
    assert_eq!(tool_turn["role"], "tool");
    assert_eq!(tool_turn["tool_call_id"], "call_1");
    assert!(tool_turn["content"].as_str().unwrap().contains("Métro A"));
}

#[tokio::test]
async fn test_unconfigured_collaborator_is_reported_to_the_planner() {
    let planner = MockServer::start().await;
    let store = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": null, "tool_calls": [{
                "id": "call_g",
                "type": "function",
                "function": {
                    "name": "get_directions",
                    "arguments": "{\"departure\":\"Ramonville\",\"destination\":\"Capitole\"}"
                }
            }]}}]
        })))
        .up_to_n_times(1)
        .mount(&planner)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Le calcul d'itinéraire est indisponible."}}]
        })))
        .mount(&planner)
        .await;

    let reply = agent(&planner, &store)
        .process_message(&[], "comment aller de Ramonville à Capitole")
        .await
        .unwrap();

    assert_eq!(reply.termination, Termination::Answered);
    let bodies = planner_bodies(&planner).await;
    let tool_turn = bodies[1]["messages"].as_array().unwrap().last().cloned().unwrap();
    let content: Value = serde_json::from_str(tool_turn["content"].as_str().unwrap()).unwrap();
    assert!(content["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_planner_http_error_fails_the_request() {
    let planner = MockServer::start().await;
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&planner)
        .await;

    let err = agent(&planner, &store)
        .process_message(&[], "ligne A")
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("429"));
}
