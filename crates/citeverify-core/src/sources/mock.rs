//! Hand-rolled test doubles for the HTTP and language-model capabilities.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;

use super::Source;
use crate::http::{FetchError, HttpFetch, HttpResponse};
use crate::llm::{GroundedAnswer, LanguageModel, LlmError};
use crate::{Reference, VerificationResult};

/// A canned outcome for one [`MockHttp`] call.
#[derive(Clone, Debug)]
pub enum MockReply {
    Body(String),
    Status(u16),
    Error(FetchError),
}

/// Pops replies in order, repeating the last one once the sequence runs out.
struct Sequence<T: Clone> {
    remaining: Mutex<Vec<T>>,
    last: T,
}

impl<T: Clone> Sequence<T> {
    fn new(mut replies: Vec<T>) -> Self {
        assert!(!replies.is_empty(), "sequence must have at least one reply");
        replies.reverse();
        let last = replies.first().cloned().unwrap();
        Self {
            remaining: Mutex::new(replies),
            last,
        }
    }

    fn next(&self) -> T {
        self.remaining
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.last.clone())
    }
}

/// Mock [`HttpFetch`] recording every request it receives.
pub struct MockHttp {
    replies: Sequence<MockReply>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MockHttp {
    pub fn new(reply: MockReply) -> Self {
        Self::with_sequence(vec![reply])
    }

    pub fn with_sequence(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Sequence::new(replies),
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn body(body: &str) -> Self {
        Self::new(MockReply::Body(body.to_string()))
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// URL and query pairs of every request, in order.
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpFetch for MockHttp {
    fn get<'a>(
        &'a self,
        url: &'a str,
        query: &'a [(&'a str, String)],
        _headers: &'a [(&'a str, String)],
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, FetchError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((
            url.to_string(),
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        let reply = self.replies.next();
        Box::pin(async move {
            match reply {
                MockReply::Body(body) => Ok(HttpResponse::ok(body)),
                MockReply::Status(status) => Ok(HttpResponse::with_status(status)),
                MockReply::Error(e) => Err(e),
            }
        })
    }
}

/// Mock [`LanguageModel`] answering grounded searches from a sequence.
pub struct MockModel {
    answers: Sequence<Result<String, LlmError>>,
    json: Option<Sequence<Result<String, LlmError>>>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn answering(text: &str) -> Self {
        Self::with_sequence(vec![Ok(text.to_string())])
    }

    pub fn with_sequence(answers: Vec<Result<String, LlmError>>) -> Self {
        Self {
            answers: Sequence::new(answers),
            json: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply to `generate_json` with this document.
    pub fn with_json(self, json: &str) -> Self {
        self.with_json_sequence(vec![Ok(json.to_string())])
    }

    /// Reply to successive `generate_json` calls from a sequence.
    pub fn with_json_sequence(mut self, replies: Vec<Result<String, LlmError>>) -> Self {
        self.json = Some(Sequence::new(replies));
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "Mock"
    }

    fn search_grounded<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<GroundedAnswer, LlmError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let answer = self.answers.next();
        Box::pin(async move {
            answer.map(|text| GroundedAnswer {
                text,
                sources: vec![],
            })
        })
    }

    fn generate_json<'a>(
        &'a self,
        prompt: &'a str,
        _schema: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .json
            .as_ref()
            .map_or(Err(LlmError::EmptyResponse), Sequence::next);
        Box::pin(async move { reply })
    }
}

/// Mock [`Source`] returning a fixed result.
pub struct MockSource {
    name: &'static str,
    result: VerificationResult,
    call_count: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &'static str, result: VerificationResult) -> Self {
        Self {
            name,
            result,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Source for MockSource {
    fn name(&self) -> &str {
        self.name
    }

    fn verify<'a>(
        &'a self,
        _reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let result = self.result.clone();
        Box::pin(async move { result })
    }
}
