/// Applies the user interface language.
pub trait TranslationService {
    /// Switch the user interface to `language`.
    fn change_language(&self, language: &str);

    /// Switch to the browser's preferred language, if it is supported, and return it.
    fn use_browser_language(&self) -> Option<String>;

    /// Switch to the application's default language and return it.
    fn use_default_language(&self) -> String;
}

/// Installs user interface themes.
pub trait ThemeManager {
    /// The application's theme description.
    type Theme;

    /// Look up the theme with the given id.
    fn get_theme_by_id(&self, id: u32) -> Self::Theme;

    /// Install `theme`, or the default theme when `None`.
    fn install_theme(&self, theme: Option<Self::Theme>);
}
