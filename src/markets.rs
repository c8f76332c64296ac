use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::{Dataset, DatasetStore, RawCard};
use crate::driver::PageDriver;
use crate::transform;
use crate::unlock;

const LOAD_MORE_XPATH: &str =
    "/html/body/div[1]/div/div[1]/main/div/section[2]/div/div[2]/section/div/div[5]/div/span";
const PAGINATION_PAUSE_MS: u64 = 3;

/// In-page collection of every facility link card currently rendered.
pub const COLLECT_CARDS_JS: &str = "Array.from(document.querySelectorAll('ul:nth-of-type(1) li div a')).map(card => ({ text: card.innerText.trim(), url: card.href }))";

/// Scrape facility listings for every market not yet marked complete.
///
/// The whole dataset is checkpointed to `store` after each market, so a
/// crash loses at most the market in flight and a restart picks up at the
/// first pending market. Returns the number of markets scraped.
pub async fn process_markets(
    driver: &dyn PageDriver,
    data: &mut Dataset,
    store: &DatasetStore,
) -> Result<usize> {
    let pending: Vec<String> = data
        .markets
        .iter()
        .filter(|(_, m)| !m.completed)
        .map(|(key, _)| key.clone())
        .collect();

    let mut scraped = 0;
    for key in pending {
        let Some((name, link)) = data
            .markets
            .get(&key)
            .map(|m| (m.name.clone(), m.link.clone()))
        else {
            continue;
        };

        info!("Processing market: {}", name);
        driver.navigate(&link).await?;

        if let Err(e) = unlock::run(driver).await {
            debug!("Unlock sequence abandoned on {}: {:#}", name, e);
        }

        let cards = collect_cards(driver).await;
        let count = cards.len();
        if let Some(market) = data.markets.get_mut(&key) {
            market.facilities = transform::facilities_from_cards(&cards);
            market.completed = true;
        }
        store.save(data)?;
        scraped += 1;
        info!("Completed: {} ({} facilities)", name, count);
    }

    Ok(scraped)
}

/// Click "load more" until it disappears, then read all rendered cards.
/// Any pagination error stops the loop; whatever is rendered gets scraped.
async fn collect_cards(driver: &dyn PageDriver) -> Vec<RawCard> {
    loop {
        match driver.exists(LOAD_MORE_XPATH).await {
            Ok(true) => {}
            _ => break,
        }
        if driver.scroll_by(1).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(PAGINATION_PAUSE_MS)).await;
        if driver.click(LOAD_MORE_XPATH).await.is_err() {
            break;
        }
    }

    let value = driver
        .evaluate(COLLECT_CARDS_JS)
        .await
        .unwrap_or(Value::Null);
    serde_json::from_value(value).unwrap_or_default()
}

// ── Tests ──
