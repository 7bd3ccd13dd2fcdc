//! Scripted runner and fetcher for unit tests

use crate::error::{HttpStatusSnafu, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation};
use crate::fetch::Fetcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Answers commands from a table keyed by command line or command-line
/// prefix. Unknown commands succeed with empty output. Every call is
/// recorded.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, Vec<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response. Repeated calls to the same command consume queued
    /// responses in order; the last one sticks.
    pub fn respond(self, command_line: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(command_line.to_string())
            .or_default()
            .push(output);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command_line: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == command_line)
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let line = invocation.command_line();
        self.calls.lock().unwrap().push(line.clone());

        let mut responses = self.responses.lock().unwrap();
        // Exact match first, then the longest scripted prefix (for commands
        // that carry temp file paths)
        let key = if responses.contains_key(&line) {
            Some(line.clone())
        } else {
            responses
                .keys()
                .filter(|key| line.starts_with(key.as_str()))
                .max_by_key(|key| key.len())
                .cloned()
        };
        let output = match key.and_then(|key| responses.get_mut(&key)) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or_default(),
            None => CommandOutput::ok(""),
        };
        Ok(output)
    }
}

/// Serves fixed bodies by URL; anything else is a 404
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_string(), body.into());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(body) => Ok(body.clone()),
            None => HttpStatusSnafu { url, status: 404u16 }.fail(),
        }
    }
}
