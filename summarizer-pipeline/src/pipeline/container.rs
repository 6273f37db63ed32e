use common::error::AppError;
use tracing::debug;
use uuid::Uuid;

use crate::services::RemoteServices;

/// Handle to the remote knowledge container owned by one summarizer
/// instance. Documents are only added by ingestion and only removed by
/// cleanup.
#[derive(Debug, Clone)]
pub struct KnowledgeContainer {
    pub id: String,
    pub name: String,
}

/// Handle to the reusable reasoning engine configuration. The engine
/// outlives queries and containers; only its container binding moves.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub id: String,
}

/// Allocates an empty container with a per-instance unique name.
pub async fn create_container(
    services: &dyn RemoteServices,
    base_name: &str,
) -> Result<KnowledgeContainer, AppError> {
    let name = format!("{base_name}-{}", Uuid::new_v4());
    let id = services.create_container(&name).await?;
    debug!(container_id = %id, name = %name, "knowledge container allocated");

    Ok(KnowledgeContainer { id, name })
}

pub async fn create_engine(
    services: &dyn RemoteServices,
    name: &str,
    instructions: &str,
) -> Result<EngineConfig, AppError> {
    let id = services.create_engine(name, instructions).await?;
    debug!(engine_id = %id, "reasoning engine configuration created");

    Ok(EngineConfig { id })
}

/// Rebinds the engine's document search to `container`. Called once
/// per query; the latest bind wins.
pub async fn bind_container(
    services: &dyn RemoteServices,
    engine: &EngineConfig,
    container: &KnowledgeContainer,
) -> Result<(), AppError> {
    services.bind_engine(&engine.id, &container.id).await
}
