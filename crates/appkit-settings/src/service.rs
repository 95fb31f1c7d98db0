use appkit_state::{LocalStoreManager, StorageError};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    keys, ConfigurationDefaults, ConfigurationValues, Key, ThemeManager, TranslationService,
};

/// Errors that can occur when working with the configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Storage operation failed
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Failed to serialize/deserialize the configuration
    #[error("Failed to serialize/deserialize configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Generates the accessors of a boolean setting without side effects.
macro_rules! toggle_setting {
    ($(#[$doc:meta])* $field:ident, $setter:ident, $key:expr) => {
        $(#[$doc])*
        pub fn $field(&self) -> bool {
            self.overrides.$field.unwrap_or(self.defaults.$field)
        }

        $(#[$doc])*
        pub fn $setter(&mut self, value: bool) -> Result<(), ConfigurationError> {
            self.save($key, &value)?;
            self.overrides.$field = Some(value);
            Ok(())
        }
    };
}

/// Application settings backed by permanent storage.
///
/// Every setting resolves to its local override when one exists and to its default otherwise.
/// Overrides are saved as permanent data and reloaded when the service is created.
pub struct ConfigurationService<T, M>
where
    T: TranslationService,
    M: ThemeManager,
{
    storage: LocalStoreManager,
    translation: T,
    themes: M,
    defaults: ConfigurationDefaults,
    overrides: ConfigurationValues,
    imported: broadcast::Sender<()>,
}

impl<T, M> ConfigurationService<T, M>
where
    T: TranslationService,
    M: ThemeManager,
{
    /// Create the service and apply the overrides found in storage.
    pub fn new(
        storage: LocalStoreManager,
        translation: T,
        themes: M,
        defaults: ConfigurationDefaults,
    ) -> Result<Self, ConfigurationError> {
        let (imported, _) = broadcast::channel(16);
        let mut service = Self {
            storage,
            translation,
            themes,
            defaults,
            overrides: ConfigurationValues::default(),
            imported,
        };
        service.load_local_changes()?;
        Ok(service)
    }

    /// The user interface language.
    pub fn language(&self) -> &str {
        self.overrides
            .language
            .as_deref()
            .unwrap_or(&self.defaults.language)
    }

    /// Change and apply the user interface language.
    pub fn set_language(&mut self, language: impl Into<String>) -> Result<(), ConfigurationError> {
        let language = language.into();
        self.save(keys::LANGUAGE, &language)?;
        self.translation.change_language(&language);
        self.overrides.language = Some(language);
        Ok(())
    }

    /// The id of the user interface theme.
    pub fn theme_id(&self) -> u32 {
        self.overrides.theme_id.unwrap_or(self.defaults.theme_id)
    }

    /// Change and install the user interface theme.
    pub fn set_theme_id(&mut self, theme_id: u32) -> Result<(), ConfigurationError> {
        self.save(keys::THEME_ID, &theme_id)?;
        self.themes
            .install_theme(Some(self.themes.get_theme_by_id(theme_id)));
        self.overrides.theme_id = Some(theme_id);
        Ok(())
    }

    /// The page shown after signing in.
    pub fn home_url(&self) -> &str {
        self.overrides
            .home_url
            .as_deref()
            .unwrap_or(&self.defaults.home_url)
    }

    /// Change the page shown after signing in.
    pub fn set_home_url(&mut self, home_url: impl Into<String>) -> Result<(), ConfigurationError> {
        let home_url = home_url.into();
        self.save(keys::HOME_URL, &home_url)?;
        self.overrides.home_url = Some(home_url);
        Ok(())
    }

    toggle_setting!(
        /// Whether the dashboard shows the statistics widget.
        show_dashboard_statistics,
        set_show_dashboard_statistics,
        keys::SHOW_DASHBOARD_STATISTICS
    );
    toggle_setting!(
        /// Whether the dashboard shows the notifications widget.
        show_dashboard_notifications,
        set_show_dashboard_notifications,
        keys::SHOW_DASHBOARD_NOTIFICATIONS
    );
    toggle_setting!(
        /// Whether the dashboard shows the todo widget.
        show_dashboard_todo,
        set_show_dashboard_todo,
        keys::SHOW_DASHBOARD_TODO
    );
    toggle_setting!(
        /// Whether the dashboard shows the banner.
        show_dashboard_banner,
        set_show_dashboard_banner,
        keys::SHOW_DASHBOARD_BANNER
    );

    /// Replace every local override with the values of an exported configuration.
    ///
    /// The current overrides are always cleared first. Fields that are absent or `null` keep
    /// their default, and input that is empty or not a valid configuration applies nothing.
    /// Subscribers of [`Self::subscribe_configuration_imported`] are notified in every case.
    pub fn import(&mut self, json: &str) -> Result<(), ConfigurationError> {
        self.clear_local_changes()?;

        let values = if json.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<ConfigurationValues>(json) {
                Ok(values) => Some(values),
                Err(e) => {
                    warn!("Ignoring malformed configuration import: {:?}", e);
                    None
                }
            }
        };

        if let Some(values) = values {
            if let Some(language) = values.language {
                self.set_language(language)?;
            }
            if let Some(theme_id) = values.theme_id {
                self.set_theme_id(theme_id)?;
            }
            if let Some(home_url) = values.home_url {
                self.set_home_url(home_url)?;
            }
            if let Some(show) = values.show_dashboard_statistics {
                self.set_show_dashboard_statistics(show)?;
            }
            if let Some(show) = values.show_dashboard_notifications {
                self.set_show_dashboard_notifications(show)?;
            }
            if let Some(show) = values.show_dashboard_todo {
                self.set_show_dashboard_todo(show)?;
            }
            if let Some(show) = values.show_dashboard_banner {
                self.set_show_dashboard_banner(show)?;
            }
        }

        debug!("Configuration imported");
        // Sending only fails when nobody is subscribed.
        let _ = self.imported.send(());
        Ok(())
    }

    /// Export the configuration as JSON: only the local overrides when `changes_only` is set,
    /// otherwise every resolved value.
    pub fn export(&self, changes_only: bool) -> Result<String, ConfigurationError> {
        let values = if changes_only {
            self.overrides.clone()
        } else {
            ConfigurationValues {
                language: Some(self.language().to_owned()),
                theme_id: Some(self.theme_id()),
                home_url: Some(self.home_url().to_owned()),
                show_dashboard_statistics: Some(self.show_dashboard_statistics()),
                show_dashboard_notifications: Some(self.show_dashboard_notifications()),
                show_dashboard_todo: Some(self.show_dashboard_todo()),
                show_dashboard_banner: Some(self.show_dashboard_banner()),
            }
        };
        Ok(serde_json::to_string(&values)?)
    }

    /// Drop every local override, delete them from storage and restore the browser or default
    /// language and the default theme.
    pub fn clear_local_changes(&mut self) -> Result<(), ConfigurationError> {
        self.overrides = ConfigurationValues::default();
        for key in keys::ALL {
            self.storage.delete_data(key)?;
        }

        self.reset_language();
        self.reset_theme();
        Ok(())
    }

    /// Subscribe to notifications sent after each [`Self::import`].
    pub fn subscribe_configuration_imported(&self) -> broadcast::Receiver<()> {
        self.imported.subscribe()
    }

    fn load_local_changes(&mut self) -> Result<(), ConfigurationError> {
        match self.load(keys::LANGUAGE)? {
            Some(language) => {
                self.translation.change_language(&language);
                self.overrides.language = Some(language);
            }
            None => self.reset_language(),
        }

        match self.load(keys::THEME_ID)? {
            Some(theme_id) => {
                self.themes
                    .install_theme(Some(self.themes.get_theme_by_id(theme_id)));
                self.overrides.theme_id = Some(theme_id);
            }
            None => self.reset_theme(),
        }

        self.overrides.home_url = self.load(keys::HOME_URL)?;
        self.overrides.show_dashboard_statistics = self.load(keys::SHOW_DASHBOARD_STATISTICS)?;
        self.overrides.show_dashboard_notifications =
            self.load(keys::SHOW_DASHBOARD_NOTIFICATIONS)?;
        self.overrides.show_dashboard_todo = self.load(keys::SHOW_DASHBOARD_TODO)?;
        self.overrides.show_dashboard_banner = self.load(keys::SHOW_DASHBOARD_BANNER)?;
        Ok(())
    }

    fn reset_language(&mut self) {
        let language = self
            .translation
            .use_browser_language()
            .unwrap_or_else(|| self.translation.use_default_language());
        self.overrides.language = Some(language);
    }

    fn reset_theme(&mut self) {
        self.themes.install_theme(None);
        self.overrides.theme_id = None;
    }

    /// Read a stored override. Values that cannot be decoded are logged and ignored.
    fn load<V: DeserializeOwned>(&self, key: Key<V>) -> Result<Option<V>, ConfigurationError> {
        if !self.storage.exists(key.name())? {
            return Ok(None);
        }

        match self.storage.get_data_object::<V>(key.name(), false) {
            Ok(value) => Ok(value),
            Err(StorageError::Serde(e)) => {
                warn!("Failed to deserialize setting '{}': {:?}", key.name(), e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save<V: Serialize>(&self, key: Key<V>, value: &V) -> Result<(), ConfigurationError> {
        Ok(self.storage.save_permanent_data(key.name(), value)?)
    }
}
