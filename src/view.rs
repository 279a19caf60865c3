/// Page surface the controller drives
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

/// Logical page elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    LoginButton,
    LogoutButton,
    FullLogoutButton,
    FetchDataButton,
    CopyTokenButton,
    Greeting,
    Username,
    Email,
    TokenBlock,
    RawToken,
}

impl Element {
    pub const ALL: [Element; 10] = [
        Element::LoginButton,
        Element::LogoutButton,
        Element::FullLogoutButton,
        Element::FetchDataButton,
        Element::CopyTokenButton,
        Element::Greeting,
        Element::Username,
        Element::Email,
        Element::TokenBlock,
        Element::RawToken,
    ];

    /// Controls only reachable with a stored access token
    pub const SIGNED_IN_CONTROLS: [Element; 4] = [
        Element::LogoutButton,
        Element::FullLogoutButton,
        Element::FetchDataButton,
        Element::CopyTokenButton,
    ];

    fn label(self) -> &'static str {
        match self {
            Element::LoginButton => "Log in",
            Element::LogoutButton => "Log out",
            Element::FullLogoutButton => "Full logout",
            Element::FetchDataButton => "Fetch user data",
            Element::CopyTokenButton => "Copy token",
            Element::Greeting => "Greeting",
            Element::Username => "Username",
            Element::Email => "Email",
            Element::TokenBlock => "Token",
            Element::RawToken => "Raw token",
        }
    }
}

/// Operations the controller performs on the page
pub trait View: Send + Sync {
    fn set_visible(&self, element: Element, visible: bool);

    fn set_text(&self, element: Element, text: &str);

    /// Blocking, user-visible notification
    fn alert(&self, message: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ElementState {
    visible: bool,
    text: String,
}

/// In-memory page model
///
/// Every element starts hidden and empty. `Display` draws the visible part
/// of the page for the terminal.
#[derive(Debug, Default)]
pub struct ViewState {
    elements: RwLock<BTreeMap<Element, ElementState>>,
    alerts: RwLock<Vec<String>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self, element: Element) -> bool {
        self.elements
            .read()
            .get(&element)
            .map(|state| state.visible)
            .unwrap_or(false)
    }

    pub fn text(&self, element: Element) -> String {
        self.elements
            .read()
            .get(&element)
            .map(|state| state.text.clone())
            .unwrap_or_default()
    }

    /// Visible elements in page order
    pub fn visible_elements(&self) -> Vec<Element> {
        Element::ALL
            .into_iter()
            .filter(|element| self.is_visible(*element))
            .collect()
    }

    /// Notifications raised so far, without clearing them
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.read().clone()
    }

    /// Drain pending notifications
    pub fn take_alerts(&self) -> Vec<String> {
        std::mem::take(&mut *self.alerts.write())
    }
}

impl View for ViewState {
    fn set_visible(&self, element: Element, visible: bool) {
        self.elements.write().entry(element).or_default().visible = visible;
    }

    fn set_text(&self, element: Element, text: &str) {
        self.elements.write().entry(element).or_default().text = text.to_string();
    }

    fn alert(&self, message: &str) {
        self.alerts.write().push(message.to_string());
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buttons: Vec<String> = [Element::LoginButton]
            .into_iter()
            .chain(Element::SIGNED_IN_CONTROLS)
            .filter(|element| self.is_visible(*element))
            .map(|element| format!("[ {} ]", element.label()))
            .collect();
        writeln!(f, "{}", buttons.join(" "))?;

        if self.is_visible(Element::Greeting) {
            writeln!(
                f,
                "Welcome, {} ({})",
                self.text(Element::Username),
                self.text(Element::Email)
            )?;
        }

        if self.is_visible(Element::TokenBlock) {
            writeln!(f, "{}:", Element::TokenBlock.label())?;
            writeln!(f, "  {}", self.text(Element::RawToken))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_start_hidden() {
        let view = ViewState::new();
        assert!(view.visible_elements().is_empty());
        assert_eq!(view.text(Element::Username), "");
    }

    #[test]
    fn test_visibility_and_text() {
        let view = ViewState::new();
        view.set_visible(Element::TokenBlock, true);
        view.set_visible(Element::LoginButton, true);
        view.set_text(Element::RawToken, "T1");

        assert_eq!(
            view.visible_elements(),
            vec![Element::LoginButton, Element::TokenBlock]
        );
        assert_eq!(view.text(Element::RawToken), "T1");

        view.set_visible(Element::LoginButton, false);
        assert_eq!(view.visible_elements(), vec![Element::TokenBlock]);
    }

    #[test]
    fn test_alerts_drain() {
        let view = ViewState::new();
        view.alert("first");
        view.alert("second");

        assert_eq!(view.alerts().len(), 2);
        assert_eq!(view.take_alerts(), vec!["first", "second"]);
        assert!(view.alerts().is_empty());
    }

    #[test]
    fn test_display_signed_in_page() {
        let view = ViewState::new();
        for element in Element::SIGNED_IN_CONTROLS {
            view.set_visible(element, true);
        }
        view.set_visible(Element::Greeting, true);
        view.set_visible(Element::TokenBlock, true);
        view.set_text(Element::Username, "Ann");
        view.set_text(Element::Email, "a@x.com");
        view.set_text(Element::RawToken, "T1");

        let rendered = view.to_string();
        assert!(rendered.contains("[ Log out ] [ Full logout ] [ Fetch user data ] [ Copy token ]"));
        assert!(!rendered.contains("Log in"));
        assert!(rendered.contains("Welcome, Ann (a@x.com)"));
        assert!(rendered.contains("  T1"));
    }

    #[test]
    fn test_display_signed_out_page() {
        let view = ViewState::new();
        view.set_visible(Element::LoginButton, true);

        assert_eq!(view.to_string(), "[ Log in ]\n");
    }
}
