use std::sync::Arc;

use crate::generator::AnswerGenerator;

/// Shared state for all handlers.
pub struct AppState {
    pub generator: AnswerGenerator,
}

impl AppState {
    pub fn new(generator: AnswerGenerator) -> Arc<Self> {
        Arc::new(Self { generator })
    }
}
