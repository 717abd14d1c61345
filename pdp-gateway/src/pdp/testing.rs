//! A scripted [`CommandInvoker`] for tests and offline development.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pdp::invoker::{CommandInvoker, InvokeError, Subcommand, ToolOutput};

#[derive(Debug, Clone)]
enum Reply {
    Ok(String),
    Fail(String),
}

/// Replies to each subcommand from a queue. The last queued reply repeats
/// once the queue is drained; an unscripted subcommand fails.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    script: Mutex<HashMap<Subcommand, VecDeque<Reply>>>,
    calls: Mutex<Vec<(Subcommand, Vec<String>, Instant)>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, subcommand: Subcommand, output: &str) -> Self {
        self.push(subcommand, Reply::Ok(output.to_string()))
    }

    pub fn fail(self, subcommand: Subcommand, output: &str) -> Self {
        self.push(subcommand, Reply::Fail(output.to_string()))
    }

    fn push(self, subcommand: Subcommand, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(subcommand)
            .or_default()
            .push_back(reply);
        self
    }

    /// Every call made so far with its arguments.
    pub fn calls(&self) -> Vec<(Subcommand, Vec<String>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(sub, args, _)| (*sub, args.clone()))
            .collect()
    }

    pub fn count(&self, subcommand: Subcommand) -> usize {
        self.call_times(subcommand).len()
    }

    /// When each call to `subcommand` was made.
    pub fn call_times(&self, subcommand: Subcommand) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(sub, _, _)| *sub == subcommand)
            .map(|(_, _, at)| *at)
            .collect()
    }
}

#[async_trait]
impl CommandInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        subcommand: Subcommand,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, InvokeError> {
        if cancel.is_cancelled() {
            return Err(InvokeError::Cancelled { subcommand });
        }
        self.calls
            .lock()
            .unwrap()
            .push((subcommand, args.to_vec(), Instant::now()));

        let reply = {
            let mut script = self.script.lock().unwrap();
            script.get_mut(&subcommand).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };
        match reply {
            Some(Reply::Ok(output)) => Ok(ToolOutput::from(output.as_str())),
            Some(Reply::Fail(output)) => Err(InvokeError::Failed {
                subcommand,
                status: "exit status: 1".to_string(),
                output: ToolOutput::from(output.as_str()),
            }),
            None => Err(InvokeError::Failed {
                subcommand,
                status: "exit status: 127".to_string(),
                output: ToolOutput::from(format!("no scripted reply for {subcommand}").as_str()),
            }),
        }
    }
}
