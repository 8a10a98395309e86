//! Offline generator for tests and demos.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::generation::{AnswerGenerator, Fragment, GenerationRequest, TextStream};

#[derive(Debug, Clone)]
enum Behavior {
    Echo,
    Scripted(Vec<String>),
    Failing { partial: Vec<String>, message: String },
}

/// An [`AnswerGenerator`] that never touches the network.
///
/// - [`echo`](MockGenerator::echo) streams the prompt back line by line.
/// - [`scripted`](MockGenerator::scripted) streams fixed fragments.
/// - [`failing`](MockGenerator::failing) ends with an error fragment.
///
/// Every request is recorded and can be inspected with
/// [`requests`](MockGenerator::requests).
#[derive(Debug, Clone)]
pub struct MockGenerator {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockGenerator {
    fn with_behavior(behavior: Behavior) -> Self {
        Self { behavior, calls: Arc::default(), requests: Arc::default() }
    }

    /// Answer with the prompt itself.
    pub fn echo() -> Self {
        Self::with_behavior(Behavior::Echo)
    }

    /// Answer with `fragments`, in order.
    pub fn scripted<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behavior(Behavior::Scripted(fragments.into_iter().map(Into::into).collect()))
    }

    /// Fail immediately with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Failing { partial: Vec::new(), message: message.into() })
    }

    /// Stream `partial` first, then fail with `message`.
    pub fn failing_after<I, S>(partial: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behavior(Behavior::Failing {
            partial: partial.into_iter().map(Into::into).collect(),
            message: message.into(),
        })
    }

    /// Number of streams requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_else(|e| e.into_inner().clone())
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

#[async_trait]
impl AnswerGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate_stream(&self, request: GenerationRequest) -> TextStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fragments: Vec<Fragment> = match &self.behavior {
            Behavior::Echo => split_lines(&request.prompt).into_iter().map(Fragment::Text).collect(),
            Behavior::Scripted(parts) => parts.iter().cloned().map(Fragment::Text).collect(),
            Behavior::Failing { partial, message } => partial
                .iter()
                .cloned()
                .map(Fragment::Text)
                .chain(std::iter::once(Fragment::Error(message.clone())))
                .collect(),
        };
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
        Box::pin(stream::iter(fragments))
    }
}
