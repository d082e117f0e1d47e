//! Playwright browser lifecycle.

use anyhow::{Context, Result};
use playwright::api::{Browser, BrowserContext, Page, Playwright};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Bound on browser shutdown so a wedged session cannot stall process exit.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Show the browser window (false = headless).
    pub headed: bool,
}

/// One interactive Chromium session, exclusively owned for the run.
pub struct BrowserSession {
    #[allow(dead_code)]
    playwright: Arc<Playwright>,
    browser: Browser,
}

/// Locate a Chromium executable installed into the ms-playwright cache.
///
/// Checks the macOS and Linux cache locations, newest browser build first.
fn find_chromium_executable() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let cache_roots = [
        PathBuf::from(&home).join("Library/Caches/ms-playwright"),
        PathBuf::from(&home).join(".cache/ms-playwright"),
    ];

    // Executable locations relative to a chromium-<build> directory.
    let candidates = [
        "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "chrome-mac/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        "chrome-linux/chrome",
    ];

    for root in cache_roots {
        let Ok(entries) = std::fs::read_dir(&root) else {
            continue;
        };
        let mut builds: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.starts_with("chromium-") && !name.contains("headless_shell")
            })
            .collect();
        builds.sort_by_key(|d| std::cmp::Reverse(d.file_name()));

        for build in builds {
            for candidate in candidates {
                let path = build.path().join(candidate);
                if path.exists() {
                    return Some(path);
                }
            }
        }
    }

    None
}

impl BrowserSession {
    /// Launch Chromium with the given options.
    pub async fn launch(options: BrowserOptions) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;
        let playwright = Arc::new(playwright);

        let chromium_path = find_chromium_executable().context(
            "Chromium not found. Run 'npx playwright install chromium' first.",
        )?;

        let browser = playwright
            .chromium()
            .launcher()
            .headless(!options.headed)
            .executable(&chromium_path)
            .launch()
            .await
            .context("Failed to launch Chromium browser")?;

        Ok(Self {
            playwright,
            browser,
        })
    }

    /// Open a fresh page in an isolated context.
    pub async fn new_page(&self) -> Result<Page> {
        let context: BrowserContext = self
            .browser
            .context_builder()
            .build()
            .await
            .context("Failed to create browser context")?;
        context
            .new_page()
            .await
            .context("Failed to open a new page")
    }

    /// Close the browser, waiting at most [`CLOSE_TIMEOUT`]. Consumes the
    /// session, so a second close cannot be attempted.
    pub async fn close(self) -> Result<()> {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.browser.close()).await {
            Ok(result) => result.context("Failed to close browser"),
            Err(_) => {
                warn!("browser did not close within {CLOSE_TIMEOUT:?}, abandoning session");
                Ok(())
            }
        }
    }
}
