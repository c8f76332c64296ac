use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const VISIBILITY_POLL_MS: u64 = 25;

/// Outcome of a single field extraction. Distinguishes an element that is
/// genuinely missing from a wait that expired before it rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Found(String),
    Absent,
    TimedOut,
}

impl Extracted {
    pub fn is_found(&self) -> bool {
        matches!(self, Extracted::Found(_))
    }
}

/// The page-automation capability the scraping stages consume. All element
/// addressing is by XPath; `evaluate` runs an arbitrary in-page script and
/// returns whatever serializes out of it.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn exists(&self, xpath: &str) -> Result<bool>;
    async fn is_visible(&self, xpath: &str) -> Result<bool>;
    async fn click(&self, xpath: &str) -> Result<()>;
    async fn type_into(&self, xpath: &str, text: &str) -> Result<()>;
    async fn text_of(&self, xpath: &str) -> Result<Option<String>>;
    async fn scroll_by(&self, dy: i64) -> Result<()>;
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Poll visibility until `timeout`. Ok(false) means the wait expired,
    /// which callers treat as "field absent", never as a failure.
    async fn wait_for_visible(&self, xpath: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_visible(xpath).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let step = Duration::from_millis(VISIBILITY_POLL_MS).min(deadline - now);
            tokio::time::sleep(step).await;
        }
    }
}

/// Headless-Chrome driver. One browser, one page, driven sequentially; DOM
/// work goes through `Page::evaluate` with `document.evaluate` XPath lookups
/// so the wire format is plain JSON.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    pub async fn launch() -> Result<Self> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(|e| anyhow!("Browser config: {}", e))?;
        let (browser, mut events) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move { while events.next().await.is_some() {} });
        let page = browser.new_page("about:blank").await?;
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        let _ = self.handler.await;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn exists(&self, xpath: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = {}; return el !== null; }})()",
            xpath_node_js(xpath)
        );
        Ok(self.evaluate(&script).await?.as_bool().unwrap_or(false))
    }

    async fn is_visible(&self, xpath: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = {}; return !!el && window.getComputedStyle(el).display !== 'none' && el.offsetParent !== null; }})()",
            xpath_node_js(xpath)
        );
        Ok(self.evaluate(&script).await?.as_bool().unwrap_or(false))
    }

    async fn click(&self, xpath: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return false; el.scrollIntoView(); el.click(); return true; }})()",
            xpath_node_js(xpath)
        );
        if self.evaluate(&script).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(anyhow!("No element to click at {}", xpath))
        }
    }

    async fn type_into(&self, xpath: &str, text: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return false; el.focus(); el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            xpath_node_js(xpath),
            js_string(text)
        );
        if self.evaluate(&script).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(anyhow!("No input element at {}", xpath))
        }
    }

    async fn text_of(&self, xpath: &str) -> Result<Option<String>> {
        let script = format!(
            "document.evaluate({}, document, null, XPathResult.STRING_TYPE, null).stringValue.trim()",
            js_string(xpath)
        );
        let value = self.evaluate(&script).await?;
        Ok(value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()))
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.evaluate(&format!("window.scrollBy(0, {})", dy)).await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }
}

/// JSON-encode a string into a JS literal so quotes in XPaths survive
/// embedding in injected scripts.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn xpath_node_js(xpath: &str) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
        js_string(xpath)
    )
}

// ── Tests ──


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes() {
        assert_eq!(
            js_string(r#"//div[contains(text(), 'Unlock')]"#),
            r#""//div[contains(text(), 'Unlock')]""#
        );
        assert_eq!(js_string(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn xpath_node_js_embeds_quoted_xpath() {
        let js = xpath_node_js("//span");
        assert!(js.starts_with("document.evaluate(\"//span\","));
        assert!(js.ends_with(".singleNodeValue"));
    }

    #[tokio::test]
    async fn fake_driver_records_interactions() {
        let mut fake = fake::FakeDriver::new();
        fake.add_visible("http://x", "//a", "go");
        let driver: &dyn PageDriver = &fake;

        driver.navigate("http://x").await.unwrap();
        assert!(driver.exists("//a").await.unwrap());
        assert!(!driver.exists("//b").await.unwrap());
        driver.click("//a").await.unwrap();
        assert!(driver.click("//b").await.is_err());
        assert_eq!(fake.navigations(), vec!["http://x"]);
        assert_eq!(fake.clicks(), vec!["//a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_visible_times_out() {
        let fake = fake::FakeDriver::new();
        let driver: &dyn PageDriver = &fake;
        driver.navigate("http://x").await.unwrap();
        let seen = driver
            .wait_for_visible("//missing", Duration::from_millis(30))
            .await
            .unwrap();
        assert!(!seen);
    }
}
