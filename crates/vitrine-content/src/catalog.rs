//! Named query templates.
//!
//! Page routes ask for content by name; the catalog turns a name and its
//! parameters into a [`ContentQuery`].

use std::collections::BTreeMap;

use vitrine_core::{ContentQuery, Error, Importance, QueryParams, Result};

/// Names of the queries in [`QueryCatalog::site`].
pub mod names {
    /// Site-wide settings (menu, footer, metadata).
    pub const SETTINGS: &str = "settings";
    /// The home page.
    pub const HOME_PAGE: &str = "homePage";
    /// A generic page by `$slug` (offerings, pricing, live event).
    pub const PAGE: &str = "page";
    /// One audio capsule by `$slug`.
    pub const CAPSULE: &str = "capsule";
    /// All audio capsules, newest first.
    pub const CAPSULES: &str = "capsules";
}

/// A registered query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    text: String,
    importance: Importance,
    listen_filter: Option<String>,
}

impl QueryTemplate {
    /// A primary query template.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            importance: Importance::Primary,
            listen_filter: None,
        }
    }

    /// Marks the query as secondary: failures degrade to defaults.
    pub fn secondary(mut self) -> Self {
        self.importance = Importance::Secondary;
        self
    }

    /// Sets the change-stream filter.
    pub fn listening_to(mut self, filter: impl Into<String>) -> Self {
        self.listen_filter = Some(filter.into());
        self
    }

    /// Query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Importance.
    pub fn importance(&self) -> Importance {
        self.importance
    }
}

/// Registry of named queries.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    templates: BTreeMap<String, QueryTemplate>,
}

impl QueryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a template.
    pub fn register(mut self, name: impl Into<String>, template: QueryTemplate) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    /// Looks up a template.
    pub fn get(&self, name: &str) -> Option<&QueryTemplate> {
        self.templates.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Builds the query registered as `name` with `params`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownQuery`] when nothing is registered under `name`.
    pub fn build(&self, name: &str, params: QueryParams) -> Result<ContentQuery> {
        let template = self
            .get(name)
            .ok_or_else(|| Error::UnknownQuery(name.to_string()))?;

        let mut query = ContentQuery::new(name, template.text.clone())
            .with_params(params)
            .with_importance(template.importance);
        if let Some(filter) = &template.listen_filter {
            query = query.with_listen_filter(filter.clone());
        }
        Ok(query)
    }

    /// The queries used by the site's page routes.
    pub fn site() -> Self {
        Self::new()
            .register(
                names::SETTINGS,
                QueryTemplate::new(
                    r#"*[_type == "settings"][0]{
  title,
  description,
  "menuItems": menuItems[]->{_type, title, "slug": slug.current},
  footer,
  ogImage
}"#,
                )
                .secondary()
                .listening_to(r#"*[_type == "settings"]"#),
            )
            .register(
                names::HOME_PAGE,
                QueryTemplate::new(
                    r#"*[_type == "home"][0]{
  _id,
  title,
  overview,
  "offerings": offerings[]->{_type, title, "slug": slug.current, overview}
}"#,
                )
                .listening_to(r#"*[_type in ["home", "page"]]"#),
            )
            .register(
                names::PAGE,
                QueryTemplate::new(
                    r#"*[_type == "page" && slug.current == $slug][0]{
  _id,
  title,
  "slug": slug.current,
  overview,
  body
}"#,
                )
                .listening_to(r#"*[_type == "page" && slug.current == $slug]"#),
            )
            .register(
                names::CAPSULE,
                QueryTemplate::new(
                    r#"*[_type == "capsule" && slug.current == $slug][0]{
  _id,
  title,
  "slug": slug.current,
  excerpt,
  duration,
  publishedAt,
  "audioUrl": audio.asset->url
}"#,
                )
                .listening_to(r#"*[_type == "capsule" && slug.current == $slug]"#),
            )
            .register(
                names::CAPSULES,
                QueryTemplate::new(
                    r#"*[_type == "capsule" && defined(slug.current)] | order(publishedAt desc){
  _id,
  title,
  "slug": slug.current,
  excerpt,
  duration,
  publishedAt
}"#,
                )
                .listening_to(r#"*[_type == "capsule"]"#),
            )
    }
}
