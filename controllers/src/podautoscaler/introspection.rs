//! JSON introspection shapes and the `GET /api/statz` handler. The HTML
//! graph/simulate UI this data originally fed is out of scope; only the
//! shape below is served.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use resources::objects::pod::PodSpec;
use resources::objects::scaling_policy::ScalingPolicy;

use crate::control::Controller;

#[derive(Debug, Serialize)]
pub struct PolicyInfoJson {
    pub policy: ScalingPolicy,
    pub latest_target: Option<PodSpec>,
    pub scale_down_threshold: Option<PodSpec>,
    pub scale_up_threshold: Option<PodSpec>,
    pub latest_actual: Option<PodSpec>,
}

#[derive(Debug, Serialize)]
pub struct StateInfo {
    pub policies: HashMap<String, PolicyInfoJson>,
}

pub fn build_state_info(controller: &Controller) -> StateInfo {
    let policies = controller
        .query()
        .into_iter()
        .map(|(key, info)| {
            (
                key,
                PolicyInfoJson {
                    policy: info.policy,
                    latest_target: info.smoothing.latest_target,
                    scale_down_threshold: info.smoothing.scale_down_threshold,
                    scale_up_threshold: info.smoothing.scale_up_threshold,
                    latest_actual: info.latest_actual,
                },
            )
        })
        .collect();
    StateInfo { policies }
}

async fn statz(State(controller): State<Arc<Controller>>) -> Json<StateInfo> {
    Json(build_state_info(&controller))
}

pub fn router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/api/statz", get(statz))
        .with_state(controller)
}
