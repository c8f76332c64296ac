use std::time::Duration;

use anyhow::Result;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::dataset::{Dataset, Facility};
use crate::driver::{Extracted, PageDriver};
use crate::transform::UNKNOWN;
use crate::unlock;

const NAME_XPATH: &str =
    "/html/body/div[1]/div/div[1]/main/div/div[1]/div[2]/section[1]/div[2]/div[1]";
const ADDRESS_XPATH: &str =
    "/html/body/div[1]/div/div[1]/main/div/div[1]/div[2]/section[1]/div[2]/div[2]/div[1]/div";
const DESCRIPTION_XPATH: &str =
    "/html/body/div[1]/div/div[1]/main/div/div[1]/div[2]/section[1]/div[2]/div[3]";

const TABLE_SCROLL_PX: i64 = 10;
const TABLE_SETTLE_MS: u64 = 3;

/// In-page scan of the facility details table: label/value pairs per grid
/// row, rows missing either sub-element skipped.
pub const TABLE_INFO_JS: &str = "(() => { const table = {}; for (const row of document.querySelectorAll('div.grid.grid-cols-2.w-full.items-center.py-6.border-b')) { const key = row.querySelector('div.font-medium'); const value = row.querySelector('div.text-sm.text-right'); if (key && value) table[key.innerText.trim()] = value.innerText.trim(); } return table; })()";

/// Everything scraped off one facility page. Field outcomes stay typed until
/// the merge, where anything not found becomes the "Unknown" sentinel.
#[derive(Debug, PartialEq)]
pub struct FacilityPage {
    pub name: Extracted,
    pub address: Extracted,
    pub description: Extracted,
    pub table_info: IndexMap<String, String>,
}

impl FacilityPage {
    /// Merge scraped fields over the record. `url` is preserved.
    pub fn apply_to(&self, facility: &mut Facility) {
        facility.name = or_unknown(&self.name);
        facility.address = or_unknown(&self.address);
        facility.description = or_unknown(&self.description);
        facility.table_info = self.table_info.clone();
    }
}

fn or_unknown(field: &Extracted) -> String {
    match field {
        Extracted::Found(text) => text.clone(),
        Extracted::Absent | Extracted::TimedOut => UNKNOWN.to_string(),
    }
}

#[derive(Debug, PartialEq)]
pub struct EnrichStats {
    pub total: usize,
    pub enriched: usize,
    pub skipped: usize,
}

/// Visit every facility across every market and merge the scraped fields
/// into the dataset in place. Progress counts against a total fixed at
/// start. The caller persists the dataset once after the full traversal.
pub async fn enrich_all(
    driver: &dyn PageDriver,
    data: &mut Dataset,
    wait: Duration,
) -> Result<EnrichStats> {
    let total = data.facility_count();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut enriched = 0usize;
    let mut skipped = 0usize;

    let market_keys: Vec<String> = data.markets.keys().cloned().collect();
    for market_key in market_keys {
        let facility_keys: Vec<String> = match data.markets.get(&market_key) {
            Some(m) => m.facilities.keys().cloned().collect(),
            None => continue,
        };
        for facility_key in facility_keys {
            let url = match data
                .markets
                .get(&market_key)
                .and_then(|m| m.facilities.get(&facility_key))
            {
                Some(f) => f.url.clone(),
                None => continue,
            };

            if url.is_empty() {
                warn!("Skipping {}/{}: record has no URL", market_key, facility_key);
                skipped += 1;
                pb.inc(1);
                continue;
            }

            let page = scrape_facility(driver, &url, wait).await?;
            if let Some(facility) = data
                .markets
                .get_mut(&market_key)
                .and_then(|m| m.facilities.get_mut(&facility_key))
            {
                page.apply_to(facility);
            }
            enriched += 1;
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    info!("Enriched {} facilities ({} skipped)", enriched, skipped);
    Ok(EnrichStats {
        total,
        enriched,
        skipped,
    })
}

/// Scrape the four structured fields off a single facility page.
pub async fn scrape_facility(
    driver: &dyn PageDriver,
    url: &str,
    wait: Duration,
) -> Result<FacilityPage> {
    driver.navigate(url).await?;
    if let Err(e) = unlock::run(driver).await {
        debug!("Unlock sequence abandoned on {}: {:#}", url, e);
    }

    let name = text_field(driver, NAME_XPATH, wait).await;
    let address = text_field(driver, ADDRESS_XPATH, wait).await;
    let description = text_field(driver, DESCRIPTION_XPATH, wait).await;
    if !description.is_found() {
        error!("No description extracted from {} ({:?})", url, description);
    }

    // The details table renders lazily below the fold.
    let _ = driver.scroll_by(TABLE_SCROLL_PX).await;
    tokio::time::sleep(Duration::from_millis(TABLE_SETTLE_MS)).await;
    let table_info = match driver.evaluate(TABLE_INFO_JS).await {
        Ok(value) => serde_json::from_value(value).unwrap_or_default(),
        Err(e) => {
            error!("Table extraction failed on {}: {:#}", url, e);
            IndexMap::new()
        }
    };

    Ok(FacilityPage {
        name,
        address,
        description,
        table_info,
    })
}

/// Bounded wait, then read. A timed-out wait and a missing/empty element are
/// distinct outcomes; both default to "Unknown" only at merge time.
async fn text_field(driver: &dyn PageDriver, xpath: &str, wait: Duration) -> Extracted {
    match driver.wait_for_visible(xpath, wait).await {
        Ok(true) => match driver.text_of(xpath).await {
            Ok(Some(text)) => Extracted::Found(text),
            _ => Extracted::Absent,
        },
        Ok(false) => Extracted::TimedOut,
        Err(_) => Extracted::Absent,
    }
}

// ── Tests ──
