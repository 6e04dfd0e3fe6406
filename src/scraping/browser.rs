//! Shared headless-browser lifecycle built on `chromiumoxide`.
//!
//! One browser process serves the whole crawl; every render opens a fresh
//! page against it. Teardown happens exactly once, from `Engine::stop`.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var.
/// 2. PATH scan for package-manager installs.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Whether JS rendering is possible on this machine at all.
pub fn browser_available() -> bool {
    find_chrome_executable().is_some()
}

/// Headless launch config with automation-disabling flags.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--lang=en-US")
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Lazily launched shared browser. The first render pays the launch cost;
/// subsequent renders reuse the process.
pub struct SharedBrowser {
    width: u32,
    height: u32,
    handle: Mutex<Option<BrowserHandle>>,
}

impl SharedBrowser {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            handle: Mutex::new(None),
        }
    }

    /// Open a fresh page, launching the browser on first use.
    pub async fn new_page(&self) -> Result<Page> {
        let mut guard = self.handle.lock().await;

        if guard.is_none() {
            let exe = find_chrome_executable().ok_or_else(|| {
                anyhow!(
                    "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE."
                )
            })?;
            info!(browser = %exe, "launching headless browser");

            let config = build_headless_config(&exe, self.width, self.height)?;
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

            let handler_task = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        error!("CDP handler error: {}", e);
                    }
                }
            });

            *guard = Some(BrowserHandle {
                browser,
                handler_task,
            });
        }

        let handle = guard.as_ref().expect("browser just launched");
        handle
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open page: {}", e))
    }

    /// Shut the browser down. Safe to call when it was never launched,
    /// and idempotent.
    pub async fn shutdown(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(mut handle) = guard.take() {
            if let Err(e) = handle.browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
            handle.handler_task.abort();
            info!("headless browser closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_without_launch_is_noop() {
        let browser = SharedBrowser::new(1920, 1080);
        browser.shutdown().await;
        browser.shutdown().await;
    }

    #[test]
    fn test_headless_config_builds() {
        // The config builder validates flags without spawning anything.
        assert!(build_headless_config("/usr/bin/chromium", 1920, 1080).is_ok());
    }
}
