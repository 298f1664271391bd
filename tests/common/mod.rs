#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use field_relay::serial::{SerialError, SerialPortIO};
use tokio::time::Instant;

/// Transport that answers known commands with scripted lines after a delay.
/// Every write and every delivered line is appended to a shared event log.
pub struct ScriptedTransport {
    replies: HashMap<String, Vec<(Duration, String)>>,
    queue: VecDeque<(Instant, String)>,
    events: Arc<Mutex<Vec<String>>>,
    fail_writes: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            queue: VecDeque::new(),
            events: Arc::new(Mutex::new(Vec::new())),
            fail_writes: false,
        }
    }

    /// After `command` is written, deliver `line` once `delay` has passed
    pub fn reply(mut self, command: &str, delay: Duration, line: &str) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push((delay, line.to_string()));
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<String>>> {
        self.events.clone()
    }
}

#[async_trait::async_trait]
impl SerialPortIO for ScriptedTransport {
    async fn write_line(&mut self, line: &str) -> Result<(), SerialError> {
        if self.fail_writes {
            return Err(SerialError::WriteFailed("scripted failure".into()));
        }
        self.events.lock().unwrap().push(format!("write {}", line));
        if let Some(replies) = self.replies.get(line) {
            let now = Instant::now();
            for (delay, reply) in replies {
                self.queue.push_back((now + *delay, reply.clone()));
            }
            self.queue.make_contiguous().sort_by_key(|(due, _)| *due);
        }
        Ok(())
    }

    async fn poll_line(&mut self) -> Result<Option<String>, SerialError> {
        match self.queue.front() {
            Some((due, _)) if *due <= Instant::now() => {
                let (_, line) = self.queue.pop_front().unwrap();
                self.events.lock().unwrap().push(format!("read {}", line));
                Ok(Some(line))
            }
            _ => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.events.lock().unwrap().push("close".to_string());
    }
}
