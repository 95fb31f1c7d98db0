//! Type-safe keys for settings storage.

use std::marker::PhantomData;

/// Type-safe key for settings storage.
///
/// Associates a storage key name with a value type at compile time.
///
/// # Example
/// ```rust
/// use appkit_settings::Key;
///
/// const PAGE_SIZE: Key<u32> = Key::new("pageSize");
/// assert_eq!(PAGE_SIZE.name(), "pageSize");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<T>,
}

impl<T> Key<T> {
    /// Create a new type-safe key with the given storage name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Get the string key name used for storage.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Storage keys of the settings managed by [`ConfigurationService`](crate::ConfigurationService).
pub mod keys {
    use super::Key;

    #[allow(missing_docs)]
    pub const LANGUAGE: Key<String> = Key::new("language");
    #[allow(missing_docs)]
    pub const THEME_ID: Key<u32> = Key::new("themeId");
    #[allow(missing_docs)]
    pub const HOME_URL: Key<String> = Key::new("homeUrl");
    #[allow(missing_docs)]
    pub const SHOW_DASHBOARD_STATISTICS: Key<bool> = Key::new("showDashboardStatistics");
    #[allow(missing_docs)]
    pub const SHOW_DASHBOARD_NOTIFICATIONS: Key<bool> = Key::new("showDashboardNotifications");
    #[allow(missing_docs)]
    pub const SHOW_DASHBOARD_TODO: Key<bool> = Key::new("showDashboardTodo");
    #[allow(missing_docs)]
    pub const SHOW_DASHBOARD_BANNER: Key<bool> = Key::new("showDashboardBanner");

    /// Every settings key, regardless of its value type.
    pub const ALL: [&str; 7] = [
        LANGUAGE.name(),
        THEME_ID.name(),
        HOME_URL.name(),
        SHOW_DASHBOARD_STATISTICS.name(),
        SHOW_DASHBOARD_NOTIFICATIONS.name(),
        SHOW_DASHBOARD_TODO.name(),
        SHOW_DASHBOARD_BANNER.name(),
    ];
}
