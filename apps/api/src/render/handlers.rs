use axum::Json;
use serde::{Deserialize, Serialize};

use crate::render::{render_markdown, RenderNode};

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub nodes: Vec<RenderNode>,
}

/// POST /api/v1/render
pub async fn handle_render(Json(req): Json<RenderRequest>) -> Json<RenderResponse> {
    Json(RenderResponse {
        nodes: render_markdown(&req.content),
    })
}
