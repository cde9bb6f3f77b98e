//! In-memory stand-ins for the controller, the image registry and the clock.
//!
//! The fake controller holds at most one instance and mimics the controller's
//! asynchronous behaviour: IP assignment after start and the STOPPED state
//! after stop can be delayed by a number of lookups, or never happen.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{Instance, InstanceInfo, ObservedState};
use crate::{Controller, Error, ImageService, Lookup, Result, Sleeper};

/// A call received by [`FakeController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Create { image: String, instance: Instance },
    Start(String),
    Stop { id: String, force: bool },
    Delete(String),
}

/// When a delayed effect becomes visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// After this many lookups following the triggering call.
    AfterLookups(u32),
    Never,
}

#[derive(Debug)]
struct ControllerState {
    instance: Option<InstanceInfo>,
    duplicates: usize,
    calls: Vec<Call>,
    ip: String,
    ip_convergence: Convergence,
    stop_convergence: Convergence,
    pending_ip: Option<u32>,
    pending_stop: Option<u32>,
    failing: Option<&'static str>,
}

pub struct FakeController {
    state: Mutex<ControllerState>,
}

impl Default for FakeController {
    fn default() -> Self {
        Self::empty()
    }
}

impl FakeController {
    /// A controller with no instance.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(ControllerState {
                instance: None,
                duplicates: 0,
                calls: Vec::new(),
                ip: "10.0.0.2".into(),
                ip_convergence: Convergence::AfterLookups(0),
                stop_convergence: Convergence::AfterLookups(0),
                pending_ip: None,
                pending_stop: None,
                failing: None,
            }),
        }
    }

    /// A controller already holding `info`.
    pub fn with_instance(info: InstanceInfo) -> Self {
        let fake = Self::empty();
        fake.lock().instance = Some(info);
        fake
    }

    /// Address handed out after start, and when it shows up.
    pub fn assign_ip(self, ip: &str, when: Convergence) -> Self {
        {
            let mut state = self.lock();
            state.ip = ip.to_string();
            state.ip_convergence = when;
        }
        self
    }

    /// When the instance reports STOPPED after a stop call.
    pub fn stop_converges(self, when: Convergence) -> Self {
        self.lock().stop_convergence = when;
        self
    }

    /// Report the instance `extra` more times in every lookup.
    pub fn with_duplicates(self, extra: usize) -> Self {
        self.lock().duplicates = extra;
        self
    }

    /// Make the named operation fail with an API error.
    pub fn fail_on(self, op: &'static str) -> Self {
        self.lock().failing = Some(op);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls other than lookups.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Get(_)))
            .collect()
    }

    pub fn instance(&self) -> Option<InstanceInfo> {
        self.lock().instance.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_failure(state: &ControllerState, op: &'static str) -> Result<()> {
        if state.failing == Some(op) {
            return Err(Error::Api(qcontroller_api::Error::Api {
                endpoint: op,
                status: qcontroller_api::StatusCode::BAD_REQUEST,
                body: format!("{op} rejected"),
            }));
        }
        Ok(())
    }

    fn schedule(when: Convergence) -> Option<u32> {
        match when {
            Convergence::AfterLookups(n) => Some(n),
            Convergence::Never => None,
        }
    }

    fn advance(state: &mut ControllerState) {
        let ip = state.ip.clone();

        if let Some(n) = state.pending_ip {
            if n == 0 {
                if let Some(inst) = state.instance.as_mut() {
                    inst.ipaddresses = vec![ip];
                }
                state.pending_ip = None;
            } else {
                state.pending_ip = Some(n - 1);
            }
        }

        if let Some(n) = state.pending_stop {
            if n == 0 {
                if let Some(inst) = state.instance.as_mut() {
                    inst.state = ObservedState::Stopped;
                    inst.ipaddresses.clear();
                }
                state.pending_stop = None;
            } else {
                state.pending_stop = Some(n - 1);
            }
        }
    }
}

#[async_trait]
impl Controller for FakeController {
    async fn get(&self, id: &str) -> Result<Lookup> {
        let mut state = self.lock();
        state.calls.push(Call::Get(id.to_string()));
        Self::check_failure(&state, "get")?;
        Self::advance(&mut state);

        Ok(match &state.instance {
            Some(inst) if inst.name == id => {
                Lookup::Found(vec![inst.clone(); state.duplicates + 1])
            }
            _ => Lookup::Missing,
        })
    }

    async fn create(&self, image: &str, instance: &Instance) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Create {
            image: image.to_string(),
            instance: instance.clone(),
        });
        Self::check_failure(&state, "create")?;

        state.instance = Some(InstanceInfo {
            name: instance.id.clone(),
            state: ObservedState::Stopped,
            ipaddresses: vec![],
            details: instance.hardware,
        });
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Start(id.to_string()));
        Self::check_failure(&state, "start")?;

        if let Some(inst) = state.instance.as_mut() {
            inst.state = ObservedState::Running;
        }
        state.pending_ip = Self::schedule(state.ip_convergence);
        Ok(())
    }

    async fn stop(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Stop {
            id: id.to_string(),
            force,
        });
        Self::check_failure(&state, "stop")?;

        if let Some(inst) = state.instance.as_mut() {
            inst.state = ObservedState::Stopping;
        }
        state.pending_stop = Self::schedule(state.stop_convergence);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Delete(id.to_string()));
        Self::check_failure(&state, "delete")?;

        state.instance = None;
        Ok(())
    }
}

/// Image registry that records uploads.
#[derive(Default)]
pub struct FakeImages {
    registered: Mutex<Vec<String>>,
    uploads: Mutex<Vec<String>>,
}

impl FakeImages {
    pub fn with_images(ids: &[&str]) -> Self {
        Self {
            registered: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Ids passed to `put_image`, in call order.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ImageService for FakeImages {
    async fn list_images(&self) -> Result<Vec<String>> {
        Ok(self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    async fn put_image(&self, id: &str, _path: &Path) -> Result<()> {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(id.to_string());

        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !registered.iter().any(|existing| existing == id) {
            registered.push(id.to_string());
        }
        Ok(())
    }
}

/// Sleeper that returns immediately and remembers every requested delay.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.sleeps().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
    }
}
