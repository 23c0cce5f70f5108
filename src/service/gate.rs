//! Bounded-concurrency admission control with a translation memo.
//!
//! Every outbound reasoning call passes through the gate: a semaphore caps
//! the number of calls in flight, and the translation path memoizes by
//! exact source text so repeated phrases never cost a second call. The
//! cache and the slot pool are the only state shared between concurrent
//! requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::sync::Semaphore;

use super::reasoning::{ReasoningRequest, ReasoningService};
use super::ServiceError;
use crate::pipeline::prompt;

pub struct RequestGate {
    service: Arc<dyn ReasoningService>,
    permits: Arc<Semaphore>,
    translation_cache: Mutex<HashMap<String, String>>,
    needs_translation: Regex,
}

impl RequestGate {
    /// `max_concurrent` is validated positive by config before we get here.
    pub fn new(
        service: Arc<dyn ReasoningService>,
        max_concurrent: usize,
        needs_translation: Regex,
    ) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            translation_cache: Mutex::new(HashMap::new()),
            needs_translation,
        }
    }

    /// Issue one reasoning call, waiting for a free slot first. Callers
    /// beyond the cap suspend here until a sibling completes.
    pub async fn call(&self, request: ReasoningRequest) -> Result<String, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ServiceError::HttpClient("request gate closed".into()))?;
        self.service.call(request).await
    }

    /// Translate `text` to English, memoized by exact source text.
    ///
    /// Text the language predicate says needs no translation is memoized
    /// as identity without a service call. A failed service call logs and
    /// returns the input unchanged — translation never aborts a run.
    /// Concurrent misses for the same key may race to call the service;
    /// last write wins, which is fine since values converge.
    pub async fn translate(&self, text: &str) -> String {
        if let Some(cached) = self.cached_translation(text) {
            return cached;
        }

        if !self.needs_translation.is_match(text) {
            self.memoize(text, text);
            return text.to_string();
        }

        let request = ReasoningRequest::user(prompt::translation_prompt(text));
        match self.call(request).await {
            Ok(translated) => {
                let translated = translated.trim().to_string();
                self.memoize(text, &translated);
                translated
            }
            Err(e) => {
                tracing::error!(error = %e, "Translation failed, keeping original text");
                text.to_string()
            }
        }
    }

    fn cached_translation(&self, text: &str) -> Option<String> {
        self.translation_cache.lock().unwrap().get(text).cloned()
    }

    fn memoize(&self, source: &str, value: &str) {
        self.translation_cache
            .lock()
            .unwrap()
            .insert(source.to_string(), value.to_string());
    }
}
