use serde::{Deserialize, Serialize};

// ── Controller types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub name: String,
    pub image: String,
    pub start: bool,
    pub vm: VmSettings,
    pub cloud_init: CloudInitConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSettings {
    #[serde(default)]
    pub cpus: u32,
    #[serde(default)]
    pub memory: u64,
    #[serde(default)]
    pub disk: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitConfig {
    pub userdata: String,
    pub network_config: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopRequest {
    pub name: String,
    pub force: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoResponse {
    #[serde(default)]
    pub info: Vec<Info>,
}

/// One instance record as reported by the controller.
///
/// `state` is the raw protobuf enum name (e.g. `STATE_RUNNING`).
#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub ipaddresses: Vec<String>,
    #[serde(default)]
    pub details: VmSettings,
}

// ── Image types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListImagesResponse {
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub image_id: String,
}
