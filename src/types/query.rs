//! Incoming customer query
//!
//! A `Query` is created once per request and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default locale when the caller does not provide one
pub const DEFAULT_LOCALE: &str = "en";

/// Query embedding, shared read-only once cached
pub type EmbeddingVector = Arc<[f32]>;

/// Immutable customer question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    locale: String,
    product_hint: Option<String>,
}

impl Query {
    /// Create a query in the default locale
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            locale: DEFAULT_LOCALE.to_string(),
            product_hint: None,
        }
    }

    /// Set the locale (e.g. "pt-BR")
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        if !locale.trim().is_empty() {
            self.locale = locale;
        }
        self
    }

    /// Attach an explicit product of interest
    pub fn with_product_hint(mut self, product: impl Into<String>) -> Self {
        let product = product.into();
        if !product.trim().is_empty() {
            self.product_hint = Some(product);
        }
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn product_hint(&self) -> Option<&str> {
        self.product_hint.as_deref()
    }

    /// Whether the query asks for a Portuguese answer
    pub fn is_portuguese(&self) -> bool {
        self.locale.to_lowercase().starts_with("pt")
    }

    /// Lowercased text with collapsed whitespace, used for cache keys
    pub fn normalized(&self) -> String {
        normalize_text(&self.text)
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Lowercase and collapse runs of whitespace
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
