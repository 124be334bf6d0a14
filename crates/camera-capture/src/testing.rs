//! Scripted sources for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{CameraError, Frame, FrameSource, SourceOpener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Frame,
    Fail,
    Lost,
}

#[derive(Debug, Default)]
pub struct ScriptLog {
    opened: AtomicUsize,
    closed: AtomicBool,
    reads: AtomicUsize,
}

impl ScriptLog {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Every `open` hands out a source that plays the next part of a shared script;
/// once the script runs out reads fail
pub struct ScriptedOpener {
    name: String,
    script: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<ScriptLog>,
    openable: bool,
}

impl ScriptedOpener {
    pub fn new(name: &str, script: Vec<Script>) -> (Self, Arc<ScriptLog>) {
        let log = Arc::new(ScriptLog::default());
        (
            Self {
                name: name.to_string(),
                script: Arc::new(Mutex::new(script.into())),
                log: log.clone(),
                openable: true,
            },
            log,
        )
    }

    pub fn unopenable(name: &str) -> (Self, Arc<ScriptLog>) {
        let (mut opener, log) = Self::new(name, Vec::new());
        opener.openable = false;
        (opener, log)
    }
}

impl SourceOpener for ScriptedOpener {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if !self.openable {
            return Err(CameraError::DeviceUnavailable(self.name.clone()));
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            name: self.name.clone(),
            script: self.script.clone(),
            log: self.log.clone(),
            counter: 0,
        }))
    }
}

struct ScriptedSource {
    name: String,
    script: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<ScriptLog>,
    counter: u64,
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        self.log.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Script::Frame) => {
                self.counter += 1;
                Frame::new(vec![0; 2 * 2 * 3], 2, 2, self.counter)
            }
            Some(Script::Lost) => Err(CameraError::DeviceLost(self.name.clone())),
            Some(Script::Fail) | None => Err(CameraError::ReadTimeout),
        }
    }

    fn close(&mut self) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}
