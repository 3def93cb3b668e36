#![allow(dead_code)]

use futures::FutureExt;
use std::sync::{Arc, Mutex};
use task_engine_rs::task::{Operation, Task, TaskHandle};
use task_engine_rs::{EngineEvent, EventSink};

/// Sink that records every emitted event for later assertions
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&EngineEvent) -> bool>(&self, predicate: F) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// An operation that immediately succeeds
pub fn noop_operation() -> Operation {
    Box::new(|| async { Ok(()) }.boxed())
}

/// A task with a no-op operation, for queue-level tests
pub fn noop_task(priority: i32) -> (Task, TaskHandle) {
    Task::new(priority, noop_operation(), 0)
}
