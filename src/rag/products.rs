//! Product catalog and product-focus detection
//!
//! Maps product keywords found in a query to product tags and URL path
//! patterns. A candidate belongs to the focus when one of its tags or its
//! source URL path matches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Candidate, Query};

/// One product line in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEntry {
    pub tag: String,
    /// Phrases that mention the product, lowercase
    pub keywords: Vec<String>,
    /// URL path fragments owned by the product
    pub url_patterns: Vec<String>,
}

impl ProductEntry {
    fn new(tag: &str, keywords: &[&str], url_patterns: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            url_patterns: url_patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Products detected for one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFocus {
    tags: BTreeSet<String>,
    url_patterns: BTreeSet<String>,
}

impl ProductFocus {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Number of distinct products in focus
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(&canonical_tag(tag))
    }

    fn add(&mut self, entry: &ProductEntry) {
        self.tags.insert(entry.tag.clone());
        self.url_patterns.extend(entry.url_patterns.iter().cloned());
    }

    /// Whether the candidate's tags or URL path match the focus
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if self.is_empty() {
            return false;
        }

        if candidate
            .product_tags
            .iter()
            .any(|tag| self.tags.contains(&canonical_tag(tag)))
        {
            return true;
        }

        let url = candidate.source_url.to_lowercase();
        !url.is_empty() && self.url_patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

/// Keyword catalog of known products
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCatalog {
    entries: Vec<ProductEntry>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new(vec![
            ProductEntry::new(
                "maquininha-celular",
                &["maquininha celular", "tap to pay", "tap-to-pay"],
                &["/maquininha-celular", "/tap-to-pay"],
            ),
            ProductEntry::new(
                "maquininha",
                &["maquininha", "maquininha smart", "card machine"],
                &["/maquininha"],
            ),
            ProductEntry::new("pix", &["pix"], &["/pix"]),
            ProductEntry::new("pdv", &["pdv"], &["/pdv"]),
            ProductEntry::new("boleto", &["boleto"], &["/boleto"]),
            ProductEntry::new("conta", &["conta", "conta digital"], &["/conta", "/conta-digital"]),
            ProductEntry::new("cartao", &["cartao", "cartão"], &["/cartao"]),
            ProductEntry::new("emprestimo", &["emprestimo", "empréstimo"], &["/emprestimo"]),
            ProductEntry::new("link", &["link de pagamento", "payment link"], &["/link"]),
        ])
    }
}

impl ProductCatalog {
    pub fn new(entries: Vec<ProductEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProductEntry] {
        &self.entries
    }

    /// Detect the product focus of a query, including its product hint
    pub fn detect(&self, query: &Query) -> ProductFocus {
        let mut focus = self.detect_text(query.text());

        if let Some(hint) = query.product_hint() {
            let hint_focus = self.detect_text(hint);
            if hint_focus.is_empty() {
                // Unknown product: trust the caller and match on the tag alone
                let tag = canonical_tag(hint);
                focus.url_patterns.insert(format!("/{}", tag));
                focus.tags.insert(tag);
            } else {
                focus.tags.extend(hint_focus.tags);
                focus.url_patterns.extend(hint_focus.url_patterns);
            }
        }

        focus
    }

    /// Detect products mentioned in free text
    pub fn detect_text(&self, text: &str) -> ProductFocus {
        let haystack = format!(" {} ", word_normalize(text));
        let mut focus = ProductFocus::default();

        for entry in &self.entries {
            let mentioned = entry
                .keywords
                .iter()
                .any(|kw| haystack.contains(&format!(" {} ", word_normalize(kw))));
            if mentioned {
                focus.add(entry);
            }
        }

        focus
    }
}

/// Lowercase, turn punctuation into spaces and collapse whitespace
fn word_normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn canonical_tag(tag: &str) -> String {
    word_normalize(tag).replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceKind;

    #[test]
    fn test_detects_products_on_word_boundaries() {
        let catalog = ProductCatalog::default();
        let focus = catalog.detect(&Query::new("Quais as taxas do Pix e do boleto?"));
        assert_eq!(focus.len(), 2);
        assert!(focus.contains("pix"));
        assert!(focus.contains("boleto"));

        // "pixel" must not match "pix"
        assert!(catalog.detect(&Query::new("pixel density")).is_empty());
    }

    #[test]
    fn test_accented_keywords() {
        let catalog = ProductCatalog::default();
        assert!(catalog.detect(&Query::new("Como pedir um empréstimo?")).contains("emprestimo"));
        assert!(catalog.detect(&Query::new("taxas do cartão")).contains("cartao"));
    }

    #[test]
    fn test_multiword_keyword() {
        let focus = ProductCatalog::default().detect(&Query::new("How does Tap to Pay work?"));
        assert!(focus.contains("maquininha-celular"));
    }

    #[test]
    fn test_product_hint_adds_focus() {
        let catalog = ProductCatalog::default();
        let focus = catalog.detect(&Query::new("what are the fees?").with_product_hint("PDV"));
        assert!(focus.contains("pdv"));

        let unknown = catalog.detect(&Query::new("fees").with_product_hint("Gift Card"));
        assert!(unknown.contains("gift-card"));
    }

    #[test]
    fn test_candidate_matching_by_tag_or_url() {
        let focus = ProductCatalog::default().detect(&Query::new("pix fees"));

        let by_tag = Candidate::new("1", "t", SourceKind::Faq, 0.5).with_tags(["Pix"]);
        let by_url = Candidate::new("2", "t", SourceKind::Document, 0.5)
            .with_url("https://www.example.com/pix/taxas");
        let other = Candidate::new("3", "t", SourceKind::Document, 0.5)
            .with_url("https://www.example.com/boleto");

        assert!(focus.matches(&by_tag));
        assert!(focus.matches(&by_url));
        assert!(!focus.matches(&other));
        assert!(!ProductFocus::default().matches(&by_tag));
    }
}
