use serde::{Deserialize, Deserializer, Serialize};

/// A set of settings values, as exchanged by
/// [`ConfigurationService::import`](crate::ConfigurationService::import) and
/// [`ConfigurationService::export`](crate::ConfigurationService::export).
///
/// Absent fields are omitted from the JSON representation. `themeId` is accepted either as a
/// number or as a numeric string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationValues {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[allow(missing_docs)]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_theme_id"
    )]
    pub theme_id: Option<u32>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_dashboard_statistics: Option<bool>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_dashboard_notifications: Option<bool>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_dashboard_todo: Option<bool>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_dashboard_banner: Option<bool>,
}

fn deserialize_theme_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ThemeId {
        Number(u32),
        Text(String),
    }

    match Option::<ThemeId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ThemeId::Number(id)) => Ok(Some(id)),
        Some(ThemeId::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
