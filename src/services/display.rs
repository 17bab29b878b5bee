//! Periodic product listing.
//!
//! Every cycle reads the whole collection through the gateway and writes a
//! numbered listing to stdout:
//!
//! ```text
//! All products:
//! 1.
//! {
//!   "id": "65a4f0c2e13b5a0012345678",
//!   "name": "Widget",
//!   ...
//! }
//! ---
//! ```
//!
//! A failed read skips the cycle; the loop keeps running until cancelled.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppResult;
use crate::metrics;
use crate::models::StoredProduct;
use crate::store::ProductGateway;

/// Render products as a numbered listing of pretty-printed JSON.
///
/// Records that fail to serialize are logged and left out of the numbering.
pub fn render_listing(products: &[StoredProduct]) -> (String, usize) {
    let mut listing = String::from("All products:\n");
    let mut count = 0;

    for product in products {
        match serde_json::to_string_pretty(product) {
            Ok(json) => {
                count += 1;
                listing.push_str(&format!("{count}.\n{json}\n"));
            }
            Err(e) => error!(product_id = %product.id, error = %e, "Error formatting product"),
        }
    }

    listing.push_str("---\n");
    (listing, count)
}

/// Run one display cycle, writing the listing to `out`.
///
/// Returns the number of products listed.
pub async fn display_once<W>(gateway: &ProductGateway, out: &mut W) -> AppResult<usize>
where
    W: AsyncWrite + Unpin,
{
    let products = gateway.find_all().await?;
    let (listing, count) = render_listing(&products);

    let written = match out.write_all(listing.as_bytes()).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        error!(error = %e, "Failed to write product listing");
    }

    info!(count, "Products retrieved successfully");
    metrics::record_display_cycle(count);
    Ok(count)
}

/// Display products every `period` until `cancel` fires.
///
/// The first cycle runs immediately.
pub async fn run_display_loop(gateway: ProductGateway, period: Duration, cancel: CancellationToken) {
    info!(interval = ?period, "Starting product display loop");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Display loop received cancellation signal");
                break;
            }
            _ = ticker.tick() => {
                let mut stdout = tokio::io::stdout();
                if let Err(e) = display_once(&gateway, &mut stdout).await {
                    error!(error = %e, "Error finding products, skipping cycle");
                }
            }
        }
    }

    debug!("Display loop shutting down");
}
