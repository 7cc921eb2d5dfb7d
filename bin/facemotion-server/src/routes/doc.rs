use utoipa::OpenApi;

use crate::routes::{generate, health, tasks};

#[derive(OpenApi)]
#[openapi(info(
    title = "facemotion-server",
    description = "Talking-head video synthesis orchestration API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(generate::GenerateApi::openapi());
    root.merge(tasks::TasksApi::openapi());
    root
}
