//! Mock source adapter for testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::adapter::{PageContext, ParseError, SourceAdapter};
use crate::catalog::CandidateRecord;

enum Step {
    Records(Vec<CandidateRecord>),
    Error(ParseError),
    Panic(String),
}

/// Mock implementation of the SourceAdapter trait.
///
/// Ignores the content and replays one scripted step per page. Once the
/// script runs out it returns the fallback records, or an empty page.
#[derive(Default)]
pub struct MockAdapter {
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<Vec<CandidateRecord>>>,
    calls: Mutex<Vec<PageContext>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter that returns `records` for every page.
    pub fn with_fallback(records: Vec<CandidateRecord>) -> Self {
        let adapter = Self::new();
        *lock(&adapter.fallback) = Some(records);
        adapter
    }

    pub fn push_records(&self, records: Vec<CandidateRecord>) {
        lock(&self.script).push_back(Step::Records(records));
    }

    pub fn push_error(&self, err: ParseError) {
        lock(&self.script).push_back(Step::Error(err));
    }

    /// The next parse panics with `message`.
    pub fn push_panic(&self, message: &str) {
        lock(&self.script).push_back(Step::Panic(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn contexts(&self) -> Vec<PageContext> {
        lock(&self.calls).clone()
    }
}

impl SourceAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn parse(&self, _content: &str, ctx: &PageContext) -> Result<Vec<CandidateRecord>, ParseError> {
        lock(&self.calls).push(ctx.clone());

        // Guard is released before a scripted panic so the mutex stays usable.
        let step = lock(&self.script).pop_front();
        match step {
            Some(Step::Records(records)) => Ok(records),
            Some(Step::Error(err)) => Err(err),
            Some(Step::Panic(message)) => panic!("{message}"),
            None => Ok(lock(&self.fallback).clone().unwrap_or_default()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
