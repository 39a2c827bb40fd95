//! Walk one epoch of chain examples and log batch shapes

use chain_egs::data::EgsDataLoader;
use chain_egs::{metrics, EgsError, LoaderConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("CEGS_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            LoaderConfig::from_json_file(path)?
        }
        Err(_) => LoaderConfig::from_env()?,
    };
    let max_batches = match std::env::var("CEGS_MAX_BATCHES") {
        Ok(value) => Some(value.trim().parse::<usize>()?),
        Err(_) => None,
    };

    let loader = match EgsDataLoader::from_config(&config) {
        Ok(loader) => loader,
        Err(e) => {
            error!("Failed to build loader: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Inspecting {} of {} batch group(s)",
        max_batches.map_or(loader.num_batches(), |m| m.min(loader.num_batches())),
        loader.num_batches()
    );

    let mut prefetch = loader.prefetch(&tokio::runtime::Handle::current(), config.prefetch_capacity);
    let mut seen = 0usize;
    loop {
        if max_batches.is_some_and(|m| seen >= m) {
            break;
        }
        match prefetch.next_batch().await {
            Ok(batch) => {
                for (key, (features, supervision)) in batch
                    .keys
                    .iter()
                    .zip(batch.features.iter().zip(&batch.supervisions))
                {
                    info!(
                        "{}: features {:?}, {} sequence(s) x {} frames, weight {}",
                        key,
                        features.dim(),
                        supervision.num_sequences,
                        supervision.frames_per_sequence,
                        supervision.weight
                    );
                }
                seen += 1;
            }
            Err(EgsError::DataExhausted) => break,
            Err(e) => {
                error!("Batch {} failed: {}", seen, e);
                prefetch.shutdown().await;
                return Err(e.into());
            }
        }
    }
    prefetch.shutdown().await;

    info!("Done after {} batch group(s)\n{}", seen, metrics::gather());
    Ok(())
}
