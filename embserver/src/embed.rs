//! Embed shell: loads the configured source and applies the cache-busting
//! recovery convention.
//!
//! On a media error the same URI is resubmitted once with a timestamp query
//! parameter appended, in case a corrupt cached response caused the failure.
//! Only one retry per submitted URI; a second error is terminal until a new
//! source is submitted.

use std::sync::Arc;

use embaudio::cache_busted;
use embplayer::{PlayerController, PlayerEvent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn spawn_shell(
    controller: Arc<PlayerController>,
    source: Option<String>,
) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        let Some(original) = source else {
            info!("no embed source configured");
            return;
        };
        info!(src = %original, "loading embed source");
        controller.change_source(Some(&original), None);

        let mut retried = false;
        while let Some(event) = events.recv().await {
            match event {
                PlayerEvent::Error(error) if !retried => {
                    retried = true;
                    let busted = cache_busted(&original);
                    warn!(
                        src = %error.src,
                        retry = %busted,
                        "media error, resubmitting with cache-busting parameter"
                    );
                    controller.change_source(Some(&busted), None);
                }
                PlayerEvent::Error(error) => {
                    warn!(src = %error.src, "media error after retry, giving up");
                    break;
                }
                _ => {}
            }
        }
    })
}
