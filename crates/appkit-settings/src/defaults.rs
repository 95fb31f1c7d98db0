/// Values used for settings without a local override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDefaults {
    #[allow(missing_docs)]
    pub language: String,
    #[allow(missing_docs)]
    pub theme_id: u32,
    #[allow(missing_docs)]
    pub home_url: String,
    #[allow(missing_docs)]
    pub show_dashboard_statistics: bool,
    #[allow(missing_docs)]
    pub show_dashboard_notifications: bool,
    #[allow(missing_docs)]
    pub show_dashboard_todo: bool,
    #[allow(missing_docs)]
    pub show_dashboard_banner: bool,
}

impl Default for ConfigurationDefaults {
    fn default() -> Self {
        Self {
            language: "en".to_owned(),
            theme_id: 1,
            home_url: "/".to_owned(),
            show_dashboard_statistics: true,
            show_dashboard_notifications: true,
            show_dashboard_todo: false,
            show_dashboard_banner: true,
        }
    }
}
