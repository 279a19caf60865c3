/// Browser navigation
use parking_lot::RwLock;
use tracing::info;
use url::{Origin, Url};

/// Window-level navigation capability
pub trait Navigator: Send + Sync {
    /// Navigate the whole window to `url`
    fn navigate(&self, url: &Url) -> Result<(), String>;

    /// Replace the current location without navigating (history replace)
    fn replace(&self, url: &Url);

    /// Current location of the page
    fn location(&self) -> Url;
}

/// Navigator that opens the system browser for anything outside the app
///
/// URLs on the application's own origin are "this page", so they only move
/// the tracked location; the terminal re-renders instead of a browser tab.
pub struct BrowserNavigator {
    app_origin: Origin,
    location: RwLock<Url>,
}

impl BrowserNavigator {
    /// Create a navigator whose page currently shows `app_url`
    pub fn new(app_url: Url) -> Self {
        Self {
            app_origin: app_url.origin(),
            location: RwLock::new(app_url),
        }
    }

    fn is_in_app(&self, url: &Url) -> bool {
        url.origin() == self.app_origin
    }
}

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &Url) -> Result<(), String> {
        if !self.is_in_app(url) {
            info!(host = url.host_str().unwrap_or_default(), "opening browser");
            webbrowser::open(url.as_str()).map_err(|e| format!("Failed to open browser: {}", e))?;
        }
        *self.location.write() = url.clone();
        Ok(())
    }

    fn replace(&self, url: &Url) {
        *self.location.write() = url.clone();
    }

    fn location(&self) -> Url {
        self.location.read().clone()
    }
}

/// A recorded navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Navigate(Url),
    Replace(Url),
}

/// Navigator that only records what happened
///
/// Suitable for testing and headless use.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: RwLock<Url>,
    events: RwLock<Vec<NavigationEvent>>,
}

impl MemoryNavigator {
    pub fn new(start: Url) -> Self {
        Self {
            location: RwLock::new(start),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Every navigation and replacement, oldest first
    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events.read().clone()
    }

    /// The most recent full navigation, if any
    pub fn last_navigation(&self) -> Option<Url> {
        self.events.read().iter().rev().find_map(|event| match event {
            NavigationEvent::Navigate(url) => Some(url.clone()),
            NavigationEvent::Replace(_) => None,
        })
    }
}

impl Navigator for MemoryNavigator {
    fn navigate(&self, url: &Url) -> Result<(), String> {
        *self.location.write() = url.clone();
        self.events.write().push(NavigationEvent::Navigate(url.clone()));
        Ok(())
    }

    fn replace(&self, url: &Url) {
        *self.location.write() = url.clone();
        self.events.write().push(NavigationEvent::Replace(url.clone()));
    }

    fn location(&self) -> Url {
        self.location.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_navigator_records_events() {
        let start = Url::parse("http://localhost:5173/").unwrap();
        let navigator = MemoryNavigator::new(start.clone());
        assert_eq!(navigator.location(), start);
        assert!(navigator.last_navigation().is_none());

        let login = Url::parse("http://localhost:8081/api/v1/auth/login").unwrap();
        let cleaned = Url::parse("http://localhost:5173/callback").unwrap();
        navigator.navigate(&login).unwrap();
        navigator.replace(&cleaned);

        assert_eq!(navigator.location(), cleaned);
        assert_eq!(navigator.last_navigation(), Some(login.clone()));
        assert_eq!(
            navigator.events(),
            vec![
                NavigationEvent::Navigate(login),
                NavigationEvent::Replace(cleaned)
            ]
        );
    }

    #[test]
    fn test_browser_navigator_stays_in_app() {
        let app = Url::parse("http://localhost:5173/").unwrap();
        let navigator = BrowserNavigator::new(app.clone());

        let callback = Url::parse("http://localhost:5173/callback?code=abc").unwrap();
        assert!(navigator.is_in_app(&callback));
        assert!(!navigator.is_in_app(&Url::parse("http://localhost:8081/").unwrap()));

        // Same origin: no browser is launched, only the location moves
        navigator.navigate(&callback).unwrap();
        assert_eq!(navigator.location(), callback);

        navigator.replace(&app);
        assert_eq!(navigator.location(), app);
    }
}
