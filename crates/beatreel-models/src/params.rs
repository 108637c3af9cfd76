//! Parameters passed to the visualizer's `renderFrame(time, params)` hook.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::plan::FRAME_RATE;
use crate::request::RenderRequest;

/// Render parameters bundled for every frame call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderParams {
    pub duration: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub bg_image_url: Option<String>,
    pub preset_id: Option<String>,
    pub preset_params: Map<String, Value>,
}

impl RenderParams {
    pub fn for_request(request: &RenderRequest) -> Self {
        let resolution = request.resolution();
        Self {
            duration: request.duration_sec,
            fps: FRAME_RATE,
            width: resolution.width,
            height: resolution.height,
            bg_image_url: request.bg_image_url.as_ref().map(|u| u.to_string()),
            preset_id: request.preset_id.clone(),
            preset_params: request.preset_params.clone(),
        }
    }
}
