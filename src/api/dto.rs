use serde::{Deserialize, Serialize};

use crate::memory::MemoryEntry;

/// POST /ask request
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// POST /ask response
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub query: String,
    pub answer: String,
    pub grounded: bool,
    pub relevance: f32,
    /// Most recent exchanges as `[query, answer]` pairs, oldest first.
    pub chat_history: Vec<MemoryEntry>,
}

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_null_query_deserialize_to_none() {
        let req: AskRequest = serde_json::from_str("{}").unwrap();
        assert!(req.query.is_none());
        let req: AskRequest = serde_json::from_str(r#"{"query":null}"#).unwrap();
        assert!(req.query.is_none());
    }

    #[test]
    fn response_renders_history_as_pairs() {
        let response = AskResponse {
            query: "q".to_string(),
            answer: "a".to_string(),
            grounded: true,
            relevance: 0.5,
            chat_history: vec![MemoryEntry::new("q", "a")],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "query": "q",
                "answer": "a",
                "grounded": true,
                "relevance": 0.5,
                "chat_history": [["q", "a"]],
            })
        );
    }
}
