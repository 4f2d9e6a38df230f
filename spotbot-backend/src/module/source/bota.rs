///! Beaches on the Air announcements
///!
///! There is no API; the "Forthcoming" table is rendered client side, so the
///! page goes through headless Chrome before it is parsed.
use super::{FetchError, LocalityFilter, SourceAdapter, finalize};
use anyhow::Context;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use scraper::{ElementRef, Html, Selector};
use spotbot_common::{SourceKind, Spot, parse_timestamp};
use std::sync::Arc;
use std::time::Duration;

pub const BOTA_ANNOUNCEMENTS_URL: &str = "https://www.beachesontheair.com/activations/announcements";

const SECTION_TITLE: &str = "Forthcoming";

/// Loads a page and returns its rendered HTML
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HeadlessPageLoader {
    render_wait: Duration,
}

impl HeadlessPageLoader {
    pub fn new(render_wait: Duration) -> Self {
        Self { render_wait }
    }
}

fn render_page(url: &str, render_wait: Duration) -> anyhow::Result<String> {
    let launch_options = LaunchOptions {
        headless: true,
        sandbox: false,
        ..Default::default()
    };

    let browser = Browser::new(launch_options).context("Failed to launch headless browser")?;
    let tab = browser.new_tab().context("Failed to create new tab")?;

    tab.navigate_to(url).context("Failed to navigate to URL")?;
    tab.wait_until_navigated()
        .context("Failed to wait for page navigation")?;

    // Table rows are filled in by page scripts after load
    std::thread::sleep(render_wait);

    tab.get_content().context("Failed to get page content")
}

#[async_trait]
impl PageLoader for HeadlessPageLoader {
    async fn load(&self, url: &str) -> Result<String, FetchError> {
        let owned_url = url.to_string();
        let render_wait = self.render_wait;

        tokio::task::spawn_blocking(move || render_page(&owned_url, render_wait))
            .await
            .map_err(|e| FetchError::PageLoad {
                url: url.to_string(),
                message: format!("render task failed: {}", e),
            })?
            .map_err(|e| FetchError::PageLoad {
                url: url.to_string(),
                message: format!("{:#}", e),
            })
    }
}

/// Header cells and body rows of the announcements table
#[derive(Debug, Default, PartialEq)]
pub struct AnnouncementTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Decode {
        url: String::new(),
        message: format!("selector error: {}", e),
    })
}

fn clean_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Locate the table under the "Forthcoming" heading. `Ok(None)` when the
/// section or its table is not on the page.
pub fn extract_forthcoming_table(html: &str) -> Result<Option<AnnouncementTable>, FetchError> {
    let document = Html::parse_document(html);
    let heading_sel = selector("div.view-header h2")?;
    let table_sel = selector("table")?;
    let th_sel = selector("thead th")?;
    let tr_sel = selector("tr")?;
    let td_sel = selector("td")?;

    let Some(heading) = document
        .select(&heading_sel)
        .find(|h| clean_text(*h) == SECTION_TITLE)
    else {
        tracing::warn!("Could not find '{}' section.", SECTION_TITLE);
        return Ok(None);
    };

    // Closest enclosing div whose next sibling div holds the table
    let table = heading
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "div")
        .find_map(|header| {
            header
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|e| e.value().name() == "div")
                .and_then(|container| container.select(&table_sel).next())
        });

    let Some(table) = table else {
        tracing::warn!("Could not find table.");
        return Ok(None);
    };

    let headers = table.select(&th_sel).map(clean_text).collect();
    let rows = table
        .select(&tr_sel)
        .map(|row| row.select(&td_sel).map(clean_text).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(Some(AnnouncementTable { headers, rows }))
}

fn column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

/// Last column holds links only and is dropped.
pub fn announcements_to_spots(table: &AnnouncementTable) -> Vec<Spot> {
    let width = table.headers.len().saturating_sub(1);
    let headers = &table.headers[..width];

    let (Some(activator), Some(activation), Some(utc)) = (
        column(headers, "Activator"),
        column(headers, "Activation"),
        column(headers, "UTC"),
    ) else {
        tracing::warn!("Announcement table has unexpected columns: {:?}", table.headers);
        return Vec::new();
    };

    table
        .rows
        .iter()
        .filter_map(|row| {
            let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or_default();
            let location = cell(activation).split(" by").next().unwrap_or_default();
            Spot::new(SourceKind::BeachAnnouncement, cell(activator), location, 0.0)
                .with_posted_at(Some(parse_timestamp(cell(utc))))
                .validated()
        })
        .collect()
}

pub struct BotaSource {
    loader: Arc<dyn PageLoader>,
    url: String,
}

impl BotaSource {
    pub fn new(loader: Arc<dyn PageLoader>, url: Option<String>) -> Self {
        Self {
            loader,
            url: url.unwrap_or_else(|| BOTA_ANNOUNCEMENTS_URL.to_string()),
        }
    }
}

#[async_trait]
impl SourceAdapter for BotaSource {
    fn kind(&self) -> SourceKind {
        SourceKind::BeachAnnouncement
    }

    async fn fetch(&self, filter: &LocalityFilter) -> Result<Vec<Spot>, FetchError> {
        tracing::info!("Loading announcements from [{}]...", self.url);
        let html = self.loader.load(&self.url).await?;
        let spots = match extract_forthcoming_table(&html)? {
            Some(table) => announcements_to_spots(&table),
            None => Vec::new(),
        };
        let spots = finalize(spots, filter);
        tracing::info!("BOTA: {} announcements", spots.len());
        Ok(spots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="view-header"><h2>Past</h2></div>
          <div><table><tr><td>old</td></tr></table></div>
          <div class="view-header">
            <div class="title"><h2> Forthcoming </h2></div>
          </div>
          <div class="view-content">
            <table>
              <thead><tr><th>UTC</th><th>Activator</th><th>Activation</th><th></th></tr></thead>
              <tbody>
                <tr><td>2024-08-10 07:00</td><td>YO9BCH</td><td>B/YO-0007 Vama Veche by YO9BCH</td><td>details</td></tr>
                <tr><td>2024-08-11 06:30</td><td> EA5XY </td><td>B/EA-0123   Playa by EA5XY</td><td>details</td></tr>
              </tbody>
            </table>
          </div>
        </body></html>
    "#;

    struct StaticPage(Result<String, ()>);

    #[async_trait]
    impl PageLoader for StaticPage {
        async fn load(&self, url: &str) -> Result<String, FetchError> {
            self.0.clone().map_err(|_| FetchError::PageLoad {
                url: url.to_string(),
                message: "chrome crashed".to_string(),
            })
        }
    }

    #[test]
    fn test_extract_forthcoming_table() {
        let table = extract_forthcoming_table(PAGE).unwrap().unwrap();
        assert_eq!(table.headers, vec!["UTC", "Activator", "Activation", ""]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][2], "B/EA-0123 Playa by EA5XY");
    }

    #[test]
    fn test_announcements_to_spots() {
        let table = extract_forthcoming_table(PAGE).unwrap().unwrap();
        let spots = announcements_to_spots(&table);
        assert_eq!(spots.len(), 2);
        assert_eq!(spots[0].operator_id, "YO9BCH");
        assert_eq!(spots[0].location_ref, "B/YO-0007 Vama Veche");
        assert_eq!(spots[0].frequency_khz, 0.0);
        let posted = spots[0].posted_at.as_ref().unwrap();
        assert_eq!(posted.date, "2024-08-10");
        assert_eq!(posted.time, "07:00");
        assert_eq!(spots[1].operator_id, "EA5XY");
    }

    #[test]
    fn test_missing_section_is_empty() {
        let html = "<html><body><div class='view-header'><h2>Past</h2></div></body></html>";
        assert_eq!(extract_forthcoming_table(html).unwrap(), None);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let html = r#"<div class="view-header"><h2>Forthcoming</h2></div><div>No announcements</div>"#;
        assert_eq!(extract_forthcoming_table(html).unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_distinguishes_load_failure() {
        let ok = BotaSource::new(Arc::new(StaticPage(Ok("<html></html>".into()))), None);
        assert!(ok.fetch(&LocalityFilter::default()).await.unwrap().is_empty());

        let broken = BotaSource::new(Arc::new(StaticPage(Err(()))), None);
        let err = broken.fetch(&LocalityFilter::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::PageLoad { .. }));
    }

    #[tokio::test]
    #[ignore = "needs Chrome and network access"]
    async fn test_live_announcements_page() {
        let source = BotaSource::new(Arc::new(HeadlessPageLoader::new(Duration::from_secs(5))), None);
        source.fetch(&LocalityFilter::default()).await.unwrap();
    }
}
