//! System browser launcher

use tabula_common::auth::BrowserOpener;
use tracing::{debug, info};

/// Opens authorization URLs in the user's browser.
///
/// With no application configured the platform default handler is used.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowser {
    app: Option<String>,
}

impl SystemBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch a specific browser program instead of the default handler.
    pub fn with_app(app: impl Into<String>) -> Self {
        Self { app: Some(app.into()) }
    }

    /// Honour `$BROWSER` when it is set.
    pub fn from_env() -> Self {
        std::env::var("BROWSER")
            .ok()
            .filter(|app| !app.trim().is_empty())
            .map_or_else(Self::new, Self::with_app)
    }
}

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        match &self.app {
            Some(app) => {
                debug!(app = %app, "Opening authorization URL");
                open::with(url, app)
            }
            None => {
                info!("Opening authorization URL in the default browser");
                open::that(url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for platform::browser.
    use super::*;

    /// Validates a missing browser program surfaces as an error, not a panic.
    #[cfg(unix)]
    #[test]
    fn test_missing_program_is_an_error() {
        let browser = SystemBrowser::with_app("/nonexistent/tabula-browser");
        assert!(browser.open("http://127.0.0.1:1/").is_err());
    }
}
