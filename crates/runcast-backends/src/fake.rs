//! Recording [`ToolRunner`] for adapter tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use runcast_schedule::ExecutionResult;

use crate::{
    error::Result,
    runner::{Invocation, ToolRunner},
};

type Handler = Box<dyn Fn(&Invocation) -> Result<ExecutionResult> + Send + Sync>;

pub(crate) struct FakeRunner {
    handler: Handler,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    /// Every invocation succeeds with empty output.
    pub(crate) fn ok() -> Self {
        Self::with(|_| Ok(output(0, "", "")))
    }

    pub(crate) fn with<F>(handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<ExecutionResult> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// argv (program first) of every call so far.
    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.invocations()
            .into_iter()
            .map(|inv| std::iter::once(inv.program).chain(inv.args).collect())
            .collect()
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ExecutionResult> {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.handler)(invocation)
    }
}

pub(crate) fn output(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 1,
        started_at: Utc::now(),
    }
}
