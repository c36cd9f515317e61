//! Chat turns: retrieval, citations, sessions and optional verification.

use super::*;
use crate::types::{AnswerConfidence, SearchFilters};

const GROUNDED_MARKER: &str = "Answer the user's question using ONLY";

async fn ingested(llm: Arc<ScriptedLlm>) -> KnowledgeService {
    let service = service(llm);
    service
        .ingest_document(&guidance_record("water-guidance"), &guidance_text())
        .await
        .unwrap();
    service
}

#[tokio::test]
async fn test_chat_answers_with_citations() {
    let llm = Arc::new(ScriptedLlm::new());
    let service = ingested(llm.clone()).await;

    let response = service
        .chat("How much cooling water does the campus use?", None, &SearchFilters::new())
        .await
        .unwrap();

    assert!(!response.session_id.is_empty());
    assert_eq!(response.answer.answer, GROUNDED_ANSWER);
    assert_eq!(response.answer.citations.len(), 3);
    assert_eq!(response.answer.citations[0].section.as_deref(), Some("Cooling Water"));
    assert_eq!(
        response.answer.citations[0].resource_title,
        "Data Center Water Guidance"
    );
    assert!(response.answer.citations[0].referenced);
    assert!(!response.answer.citations[2].referenced);
    assert!(response
        .answer
        .citations
        .iter()
        .all(|c| c.excerpt.chars().count() <= 200));
    // Rank relevance 1.0, 0.9, 0.8
    assert_eq!(response.answer.confidence, AnswerConfidence::High);
    assert_eq!(response.answer.follow_up_questions.len(), 2);
    assert!(response.faithfulness.is_none());

    let grounded = llm.requests_with_system(GROUNDED_MARKER);
    assert_eq!(grounded.len(), 1);
    assert!(grounded[0]
        .system
        .as_deref()
        .is_some_and(|s| s.contains("[1] Cooling Water - Data Center Water Guidance")));
}

#[tokio::test]
async fn test_session_history_is_replayed() {
    let llm = Arc::new(ScriptedLlm::new());
    let service = ingested(llm.clone()).await;
    let filters = SearchFilters::new();

    let first = service
        .chat("How much cooling water is used?", None, &filters)
        .await
        .unwrap();
    let second = service
        .chat(
            "And how is power reported?",
            Some(first.session_id.as_str()),
            &filters,
        )
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);

    let grounded = llm.requests_with_system(GROUNDED_MARKER);
    assert_eq!(grounded.len(), 2);
    assert_eq!(grounded[0].messages.len(), 1);

    let replay = &grounded[1].messages;
    assert_eq!(replay.len(), 3);
    assert_eq!(replay[0].content, "How much cooling water is used?");
    assert_eq!(replay[1].content, GROUNDED_ANSWER);
    assert_eq!(replay[2].content, "And how is power reported?");
}

#[tokio::test]
async fn test_filters_exclude_everything() {
    let llm = Arc::new(ScriptedLlm::new());
    let service = ingested(llm).await;

    let filters = SearchFilters::new().with_language("de");
    let response = service
        .chat("How much cooling water is used?", None, &filters)
        .await
        .unwrap();

    assert!(response.answer.citations.is_empty());
    assert_eq!(response.answer.confidence, AnswerConfidence::Uncertain);
    assert_eq!(response.answer.answer, NO_CONTEXT_ANSWER);
}

#[tokio::test]
async fn test_chat_can_verify_answers() {
    let llm = Arc::new(ScriptedLlm::new().with_verdict(
        "The campus draws about 4 million litres of cooling water per day [1]",
        "TRUE [1]",
    ));
    let service = ingested(llm).await.with_verify_answers(true);

    let response = service
        .chat("How much cooling water is used?", None, &SearchFilters::new())
        .await
        .unwrap();

    let faithfulness = response.faithfulness.unwrap();
    assert_eq!(faithfulness.score, 1.0);
    assert_eq!(faithfulness.claims.len(), 1);
    assert!(faithfulness.claims[0].source_ref.is_some());
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let service = service(Arc::new(ScriptedLlm::new()));
    let err = service
        .chat("   ", None, &SearchFilters::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());
}
