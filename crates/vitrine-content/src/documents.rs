//! Typed documents returned by the site catalog's queries.
//!
//! Rich-text fields stay as raw JSON; rendering them is the page's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title used when settings cannot be loaded.
pub const DEFAULT_SITE_TITLE: &str = "Vitrine";

/// Site-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Site title.
    pub title: String,
    /// Site description (rich text).
    pub description: Option<Value>,
    /// Main navigation.
    pub menu_items: Vec<MenuItem>,
    /// Footer (rich text).
    pub footer: Option<Value>,
    /// Open Graph image reference.
    pub og_image: Option<Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: DEFAULT_SITE_TITLE.to_string(),
            description: None,
            menu_items: Vec::new(),
            footer: None,
            og_image: None,
        }
    }
}

/// One navigation entry, pointing at a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Referenced document type (`home`, `page`, `capsule`).
    #[serde(rename = "_type")]
    pub kind: String,
    /// Link label.
    pub title: Option<String>,
    /// Referenced document slug.
    pub slug: Option<String>,
}

impl MenuItem {
    /// Route of the referenced document, if it has one.
    pub fn href(&self) -> Option<String> {
        match (self.kind.as_str(), self.slug.as_deref()) {
            ("home", _) => Some("/".to_string()),
            ("page", Some(slug)) => Some(format!("/{slug}")),
            ("capsule", Some(slug)) => Some(format!("/capsules/{slug}")),
            _ => None,
        }
    }
}

/// The home page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Page title.
    pub title: String,
    /// Intro (rich text).
    #[serde(default)]
    pub overview: Option<Value>,
    /// Featured offerings.
    #[serde(default)]
    pub offerings: Vec<Offering>,
}

/// A coaching or therapy offering featured on the home page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    /// Document type.
    #[serde(rename = "_type")]
    pub kind: String,
    /// Title.
    pub title: Option<String>,
    /// Slug.
    pub slug: Option<String>,
    /// Summary (rich text).
    #[serde(default)]
    pub overview: Option<Value>,
}

/// A generic page: offerings, pricing, live event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Title.
    pub title: String,
    /// Slug.
    pub slug: String,
    /// Intro (rich text).
    #[serde(default)]
    pub overview: Option<Value>,
    /// Body (rich text).
    #[serde(default)]
    pub body: Option<Value>,
}

/// An audio capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Title.
    pub title: String,
    /// Slug.
    pub slug: String,
    /// Short description.
    #[serde(default)]
    pub excerpt: Option<String>,
    /// Length in seconds.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Publication date.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Audio file URL.
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl Capsule {
    /// Duration as `m:ss`, or `h:mm:ss` past an hour.
    pub fn formatted_duration(&self) -> Option<String> {
        let total = self.duration?;
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        Some(if h > 0 {
            format!("{h}:{m:02}:{s:02}")
        } else {
            format!("{m}:{s:02}")
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_partial_document() {
        let settings: Settings = serde_json::from_value(json!({
            "title": "Cabinet Lumière",
            "menuItems": [
                { "_type": "home", "title": "Accueil", "slug": null },
                { "_type": "page", "title": "Tarifs", "slug": "tarifs" },
                { "_type": "capsule", "title": "Respirer", "slug": "respirer" }
            ]
        }))
        .unwrap();

        assert_eq!(settings.title, "Cabinet Lumière");
        let hrefs: Vec<_> = settings.menu_items.iter().filter_map(MenuItem::href).collect();
        assert_eq!(hrefs, vec!["/", "/tarifs", "/capsules/respirer"]);
        assert!(settings.footer.is_none());
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.title, DEFAULT_SITE_TITLE);
        assert!(settings.menu_items.is_empty());
    }

    #[test]
    fn test_menu_item_without_slug() {
        let item = MenuItem {
            kind: "page".into(),
            title: Some("Orphan".into()),
            slug: None,
        };
        assert_eq!(item.href(), None);
    }

    #[test]
    fn test_capsule_decoding() {
        let capsule: Capsule = serde_json::from_value(json!({
            "_id": "capsule-1",
            "title": "Respirer",
            "slug": "respirer",
            "duration": 754,
            "publishedAt": "2024-05-02T08:00:00Z",
            "audioUrl": "https://cdn.example.com/respirer.mp3"
        }))
        .unwrap();
        assert_eq!(capsule.formatted_duration().as_deref(), Some("12:34"));
        assert!(capsule.published_at.is_some());
        assert!(capsule.excerpt.is_none());
    }

    #[test]
    fn test_capsule_long_duration() {
        let capsule = Capsule {
            id: String::new(),
            title: "Nuit".into(),
            slug: "nuit".into(),
            excerpt: None,
            duration: Some(3725),
            published_at: None,
            audio_url: None,
        };
        assert_eq!(capsule.formatted_duration().as_deref(), Some("1:02:05"));
    }

    #[test]
    fn test_home_page_requires_title() {
        let result: std::result::Result<HomePage, _> = serde_json::from_value(json!({ "_id": "home" }));
        assert!(result.is_err());
    }
}
