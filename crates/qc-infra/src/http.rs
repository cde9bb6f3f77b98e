use std::path::Path;

use async_trait::async_trait;
use qcontroller_api::{
    CloudInitConfig, ControllerClient, CreateRequest, ImageClient, Info, InfoResponse, VmSettings,
};
use tracing::{debug, info};

use crate::types::{Hardware, Instance, InstanceInfo, ObservedState};
use crate::{Controller, ImageService, Lookup, Result};

/// Controller backed by the qcontroller REST gateway.
pub struct HttpController {
    client: ControllerClient,
}

impl HttpController {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: ControllerClient::new(host, port),
        }
    }

    fn instance_info(info: Info) -> InstanceInfo {
        InstanceInfo {
            state: ObservedState::parse(&info.state),
            name: info.name,
            ipaddresses: info.ipaddresses,
            details: Hardware {
                cpus: info.details.cpus,
                memory: info.details.memory,
                disk: info.details.disk,
            },
        }
    }
}

/// Interpret the answer to an info call.
///
/// The controller answers lookups of unknown names with a 5xx, so any
/// server error counts as "no such instance". Other failures propagate.
pub fn classify_lookup(result: qcontroller_api::Result<InfoResponse>) -> Result<Lookup> {
    match result {
        Ok(resp) if resp.info.is_empty() => Ok(Lookup::Missing),
        Ok(resp) => Ok(Lookup::Found(
            resp.info
                .into_iter()
                .map(HttpController::instance_info)
                .collect(),
        )),
        Err(e) if e.status().is_some_and(|s| s.is_server_error()) => {
            debug!(error = %e, "info lookup returned a server error, treating as missing");
            Ok(Lookup::Missing)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Controller for HttpController {
    async fn get(&self, id: &str) -> Result<Lookup> {
        classify_lookup(self.client.info(id).await)
    }

    async fn create(&self, image: &str, instance: &Instance) -> Result<()> {
        self.client
            .create(&CreateRequest {
                name: instance.id.clone(),
                image: image.to_string(),
                start: false,
                vm: VmSettings {
                    cpus: instance.hardware.cpus,
                    memory: instance.hardware.memory,
                    disk: instance.hardware.disk,
                },
                cloud_init: CloudInitConfig {
                    userdata: instance.cloudinit.userdata.clone(),
                    network_config: instance.cloudinit.network_config.clone(),
                },
            })
            .await?;
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.client.start(id).await?;
        Ok(())
    }

    async fn stop(&self, id: &str, force: bool) -> Result<()> {
        self.client.stop(id, force).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client.remove(id).await?;
        Ok(())
    }
}

/// Image registry backed by the qcontroller REST gateway.
pub struct HttpImageService {
    client: ImageClient,
}

impl HttpImageService {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: ImageClient::new(host, port),
        }
    }
}

#[async_trait]
impl ImageService for HttpImageService {
    async fn list_images(&self) -> Result<Vec<String>> {
        let resp = self.client.list_images().await?;
        Ok(resp.images.into_iter().map(|img| img.image_id).collect())
    }

    async fn put_image(&self, id: &str, path: &Path) -> Result<()> {
        info!(image = id, path = %path.display(), "qcontroller: uploading image");
        self.client.upload_image(id, path).await?;
        Ok(())
    }
}
