pub mod mapper;
mod model;

pub use mapper::{map_poll_response, map_submit_response, strip_artifact_prefix};
pub use model::{JobState, Phase, StatusModel};
