//! Renderer-agnostic tray menu model.
//!
//! The tray layer turns these entries into native menu items; the core
//! only decides what is shown and what is checked.

use crate::config::{MenuLayout, Selector};

/// One item of the tray menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    /// "System Proxy" toggle.
    SystemProxy { checked: bool },
    Separator,
    /// Disabled selector caption (flat layout).
    Caption(String),
    /// Selector submenu (nested layout).
    Submenu { label: String, items: Vec<MenuEntry> },
    /// Radio item choosing `outbound` for `selector`.
    Outbound {
        selector: String,
        outbound: String,
        checked: bool,
    },
    Quit,
}

/// Build the menu for `selectors`.
///
/// `current` returns the outbound to show as checked for a selector.
pub fn build_menu<F>(selectors: &[Selector], layout: MenuLayout, proxy_enabled: bool, current: F) -> Vec<MenuEntry>
where
    F: Fn(&Selector) -> Option<String>,
{
    let mut menu = vec![MenuEntry::SystemProxy { checked: proxy_enabled }, MenuEntry::Separator];

    for selector in selectors {
        let checked = current(selector);
        let items: Vec<MenuEntry> = selector
            .candidates
            .iter()
            .map(|outbound| MenuEntry::Outbound {
                selector: selector.name.clone(),
                outbound: outbound.clone(),
                checked: checked.as_deref() == Some(outbound.as_str()),
            })
            .collect();

        match layout {
            MenuLayout::Nested => menu.push(MenuEntry::Submenu {
                label: selector.name.clone(),
                items,
            }),
            MenuLayout::Flat => {
                menu.push(MenuEntry::Caption(selector.name.clone()));
                menu.extend(items);
                menu.push(MenuEntry::Separator);
            }
        }
    }

    menu.push(MenuEntry::Separator);
    menu.push(MenuEntry::Quit);
    menu
}
