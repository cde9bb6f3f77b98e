use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::params::ReconcileRequest;
use crate::plan::{Plan, resolve};
use crate::report;
use crate::retry::{RetryPolicy, retry_until_success};
use crate::types::{InstanceInfo, ObservedState};
use crate::{Controller, Error, ImageService, Result, Sleeper};

/// What a reconciliation pass reports back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    pub result: Map<String, Value>,
}

/// A failed pass, with whatever had been reported before the failure.
#[derive(Debug)]
pub struct Failure {
    pub error: Error,
    pub outcome: Outcome,
}

/// Drives one instance towards a desired state.
pub struct Reconciler {
    controller: Arc<dyn Controller>,
    images: Arc<dyn ImageService>,
    sleeper: Arc<dyn Sleeper>,
}

impl Reconciler {
    pub fn new(
        controller: Arc<dyn Controller>,
        images: Arc<dyn ImageService>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            controller,
            images,
            sleeper,
        }
    }

    /// Current record for `id`, fetched fresh from the controller.
    pub async fn observe(&self, id: &str) -> Result<Option<InstanceInfo>> {
        Ok(self.controller.get(id).await?.into_first(id))
    }

    /// Bring the instance to the requested state and report its final condition.
    pub async fn reconcile(&self, req: &ReconcileRequest) -> std::result::Result<Outcome, Failure> {
        let mut outcome = Outcome::default();
        match self.run(req, &mut outcome).await {
            Ok(()) => Ok(outcome),
            Err(error) => Err(Failure { error, outcome }),
        }
    }

    /// Report what `reconcile` would do without changing anything.
    pub async fn check(&self, req: &ReconcileRequest) -> std::result::Result<Outcome, Failure> {
        let observed = match self.observe(&req.name).await {
            Ok(observed) => observed,
            Err(error) => {
                return Err(Failure {
                    error,
                    outcome: Outcome::default(),
                });
            }
        };

        let plan = resolve(req.state, observed.as_ref());
        info!(instance = %req.name, actions = ?plan.actions(), "check mode, not executing");

        Ok(Outcome {
            changed: !plan.is_noop(),
            message: plan.message.to_string(),
            result: report::serialize(observed.as_ref()),
            plan: Some(plan),
        })
    }

    async fn run(&self, req: &ReconcileRequest, outcome: &mut Outcome) -> Result<()> {
        let observed = self.observe(&req.name).await?;
        let plan = resolve(req.state, observed.as_ref());

        info!(
            instance = %req.name,
            desired = %req.state,
            observed = observed.as_ref().map(|o| o.state.as_str()),
            actions = ?plan.actions(),
            "resolved plan"
        );

        outcome.changed = !plan.is_noop();
        outcome.plan = Some(plan.clone());

        self.execute(&plan, req, &RetryPolicy::from_timeout(req.timeout_secs))
            .await?;

        let observed = self.observe(&req.name).await?;
        outcome.message = plan.message.to_string();
        outcome.result = report::serialize(observed.as_ref());
        Ok(())
    }

    /// Perform the plan's actions in order: create, start, stop, delete.
    ///
    /// Stops at the first failing step. Nothing already done is undone.
    pub async fn execute(
        &self,
        plan: &Plan,
        req: &ReconcileRequest,
        policy: &RetryPolicy,
    ) -> Result<()> {
        if plan.create {
            self.create(req).await?;
        }
        if plan.start {
            self.start(&req.name, policy).await?;
        }
        if plan.stop {
            self.stop(&req.name, req.force, policy).await?;
        }
        if plan.delete {
            self.controller.delete(&req.name).await?;
            info!(instance = %req.name, "qcontroller: instance deleted");
        }
        Ok(())
    }

    async fn create(&self, req: &ReconcileRequest) -> Result<()> {
        let instance = req.instance()?;
        let mut image = req.image.image.clone().ok_or_else(|| {
            Error::Validation(format!(
                "parameter 'image' is required to create VM {}",
                req.name
            ))
        })?;

        if let Some(path) = &req.image.file {
            image = self
                .images
                .upload_image(&image, path, req.image.overwrite)
                .await?;
        }

        self.controller.create(&image, &instance).await?;
        info!(
            instance = %instance.id,
            image = %image,
            cpus = instance.hardware.cpus,
            memory = instance.hardware.memory,
            disk = instance.hardware.disk,
            "qcontroller: instance created"
        );
        Ok(())
    }

    async fn start(&self, id: &str, policy: &RetryPolicy) -> Result<()> {
        self.controller.start(id).await?;
        info!(instance = id, "qcontroller: instance started, waiting for an IP address");

        let controller = &*self.controller;
        let ip = retry_until_success(policy, Arc::clone(&self.sleeper), move || async move {
            assigned_ip(controller, id).await
        })
        .await
        .map_err(|e| e.into_timeout("an IP address"))?;

        info!(instance = id, ip = %ip, "qcontroller: instance reachable");
        Ok(())
    }

    async fn stop(&self, id: &str, force: bool, policy: &RetryPolicy) -> Result<()> {
        self.controller.stop(id, force).await?;
        info!(instance = id, force, "qcontroller: stop requested, waiting for STOPPED");

        let controller = &*self.controller;
        retry_until_success(policy, Arc::clone(&self.sleeper), move || async move {
            confirm_stopped(controller, id).await
        })
        .await
        .map_err(|e| e.into_timeout("the instance to stop"))?;

        info!(instance = id, "qcontroller: instance stopped");
        Ok(())
    }
}

async fn assigned_ip(controller: &dyn Controller, id: &str) -> Result<String> {
    controller
        .get(id)
        .await?
        .into_first(id)
        .and_then(|info| info.ipaddresses.into_iter().next())
        .ok_or_else(|| Error::NotReady("IP address not found".into()))
}

async fn confirm_stopped(controller: &dyn Controller, id: &str) -> Result<()> {
    let state = controller
        .get(id)
        .await?
        .into_first(id)
        .map(|info| info.state)
        .unwrap_or(ObservedState::Unspecified);

    if state == ObservedState::Stopped {
        Ok(())
    } else {
        Err(Error::NotReady(format!("VM not stopped (state {state})")))
    }
}
