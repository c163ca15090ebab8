use ig_core::{Catalog, ModelInfo};
use serde::de::DeserializeOwned;
use crate::error::TransportError;
use super::backend::schemas::{LorasResponse, ModelsResponse, SamplersResponse, SchedulersResponse};
use super::backend::Transport;

/// Asks the backend for its model, sampler, scheduler and LoRA lists.
/// Each list falls back on its own to the built-in one when the call fails,
/// so a partly reachable backend never blocks startup.
pub async fn load_catalog(transport: &dyn Transport) -> Catalog {
    let (models, samplers, schedulers, loras) = tokio::join!(
        fetch::<ModelsResponse>(transport, "/models"),
        fetch::<SamplersResponse>(transport, "/samplers"),
        fetch::<SchedulersResponse>(transport, "/schedulers"),
        fetch::<LorasResponse>(transport, "/loras"),
    );

    Catalog::new(
        models.map_or_else(Catalog::builtin_models, |r| r.models),
        samplers.map_or_else(Catalog::builtin_samplers, |r| r.samplers),
        schedulers.map_or_else(Catalog::builtin_schedulers, |r| r.schedulers),
        loras.map_or_else(Vec::<ModelInfo>::new, |r| r.loras),
    )
}

async fn fetch<T: DeserializeOwned>(transport: &dyn Transport, path: &str) -> Option<T> {
    let result = async {
        let value = transport.get_json(path).await?;
        Ok::<T, TransportError>(serde_json::from_value(value)?)
    }
    .await;

    match result {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("Failed to fetch {path}, using built-in defaults: {e}");
            None
        }
    }
}
