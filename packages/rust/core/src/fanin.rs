//! Stream merging.

use tokio::sync::mpsc;

use pokecache_shared::{PokeCacheError, Result};

/// Capacity of every inter-stage channel. Kept minimal so a slow consumer
/// blocks its producers.
pub const CHANNEL_CAPACITY: usize = 1;

/// Merge `inputs` into one receiver.
///
/// Every element of every input is forwarded, in no particular order. The
/// output closes once all inputs have closed; each forwarding task holds a
/// sender clone, so the last one to finish closes it. Dropping the output
/// stops the forwarders.
pub fn fan_in<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Wait until every error signal has closed or one of them reports.
///
/// The first error received wins and is returned; the rest are discarded.
/// The wait does not cancel anything by itself.
pub async fn wait_for_pipeline(errors: Vec<mpsc::Receiver<PokeCacheError>>) -> Result<()> {
    let mut merged = fan_in(errors);
    match merged.recv().await {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
