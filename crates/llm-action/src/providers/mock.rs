use std::sync::Mutex;

use crate::errors::ProviderError;
use crate::providers::base::{ChatRequest, Completion, Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Mutex<Vec<(Completion, Usage)>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<(Completion, Usage)>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(content: &str) -> Self {
        Self::new(vec![(
            Completion {
                content: Some(content.to_string()),
                tool_calls: Vec::new(),
            },
            Usage::default(),
        )])
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Provider for MockProvider {
    fn complete(&self, request: &ChatRequest) -> Result<(Completion, Usage), ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(ProviderError::NoChoices)
        } else {
            Ok(responses.remove(0))
        }
    }
}
