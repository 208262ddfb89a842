//! Context builder: budget allocation and sentence-aware packing
//!
//! The character budget is split across sources in proportion to how much
//! relevant text each one has, with a per-source floor and a ceiling once
//! more than one source competes. Entries are packed most-relevant-first;
//! the last one that does not fit is cut at a sentence boundary when one
//! falls inside the trailing 20% of the space left, otherwise hard-cut.
//! Sections always come out FAQ first, then DOCUMENTS.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::types::{Candidate, SourceKind};

/// Separator between packed entries
pub const ENTRY_SEPARATOR: &str = "\n\n";

/// Maximum characters kept from one FAQ entry
pub const FAQ_ENTRY_CAP: usize = 700;

/// Lines with this many characters or fewer are dropped from documents
const MIN_DOC_LINE_CHARS: usize = 10;

/// Metadata prefixes stripped from document text
const DOC_METADATA_PREFIXES: [&str; 4] = ["URL:", "TAGS:", "SOURCE:", "ID:"];

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub min_section_chars: usize,
    pub max_section_share: f32,
    pub max_available_chars_per_source: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_section_chars: 600,
            max_section_share: 0.7,
            max_available_chars_per_source: 6000,
        }
    }
}

impl From<&PipelineConfig> for ContextConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_section_chars: config.min_section_chars,
            max_section_share: config.max_section_share,
            max_available_chars_per_source: config.max_available_chars_per_source,
        }
    }
}

/// One labeled block of packed context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub label: SourceKind,
    pub text: String,
    pub char_budget: usize,
    /// Characters of `text`; never above `char_budget`
    pub char_used: usize,
    /// Candidates that contributed text, in packing order
    pub candidate_ids: Vec<String>,
    pub source_urls: Vec<String>,
}

impl ContextSection {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Context builder for assembling prompt context
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Build sections from ranked candidates per source
    ///
    /// Returns an empty list when no source has usable text. Otherwise every
    /// source in `inputs` gets a section, empty ones with a zero budget.
    pub fn build(
        &self,
        inputs: &BTreeMap<SourceKind, Vec<Candidate>>,
        max_context_chars: usize,
    ) -> Vec<ContextSection> {
        let prepared: Vec<(SourceKind, Vec<(&Candidate, String)>)> = inputs
            .iter()
            .map(|(kind, candidates)| {
                let entries = candidates
                    .iter()
                    .filter_map(|c| {
                        let text = prepare_text(*kind, &c.text);
                        (!text.is_empty()).then_some((c, text))
                    })
                    .collect();
                (*kind, entries)
            })
            .collect();

        let available: Vec<usize> = prepared
            .iter()
            .map(|(_, entries)| {
                available_chars(entries.iter().map(|(_, t)| t.as_str()))
                    .min(self.config.max_available_chars_per_source)
            })
            .collect();

        if available.iter().all(|a| *a == 0) {
            return Vec::new();
        }

        let budgets = allocate_budgets(
            &available,
            max_context_chars,
            self.config.min_section_chars,
            self.config.max_section_share,
        );

        let sections: Vec<ContextSection> = prepared
            .into_iter()
            .zip(budgets)
            .map(|((kind, entries), budget)| pack_section(kind, &entries, budget))
            .collect();

        tracing::debug!(
            max_context_chars,
            sections = ?sections
                .iter()
                .map(|s| (s.label.as_str(), s.char_used, s.char_budget))
                .collect::<Vec<_>>(),
            "context assembled"
        );

        sections
    }

    /// Serialize non-empty sections into labeled prompt text
    pub fn render(sections: &[ContextSection]) -> String {
        sections
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| format!("[{}]\n{}", s.label.label(), s.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Source-specific cleanup before packing
fn prepare_text(kind: SourceKind, text: &str) -> String {
    match kind {
        SourceKind::Document => clean_document_text(text),
        SourceKind::Faq => truncate_chars(text.trim(), FAQ_ENTRY_CAP).to_string(),
    }
}

/// Drop metadata lines and very short lines from a document passage
pub fn clean_document_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            line.chars().count() > MIN_DOC_LINE_CHARS
                && !DOC_METADATA_PREFIXES.iter().any(|p| line.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Character count of entries joined with the separator
fn available_chars<'a>(entries: impl Iterator<Item = &'a str>) -> usize {
    let sep = ENTRY_SEPARATOR.chars().count();
    let mut total = 0usize;
    for (i, text) in entries.enumerate() {
        if i > 0 {
            total += sep;
        }
        total += text.chars().count();
    }
    total
}

/// Split `total` characters across sources
///
/// - No non-empty source: all zero.
/// - One non-empty source: it gets the whole budget.
/// - Several: proportional share clamped to `[floor, ceiling]` where
///   `floor = min(min_section, total / n)` and `ceiling = max(total * share, floor)`,
///   never above the source's own available text; overflow is taken back
///   from the largest budgets and leftover handed to sources that still have
///   unused text, up to the ceiling.
///
/// The result always sums to at most `total`.
pub fn allocate_budgets(available: &[usize], total: usize, min_section: usize, share: f32) -> Vec<usize> {
    let mut budgets = vec![0usize; available.len()];
    let nonempty: Vec<usize> = (0..available.len()).filter(|&i| available[i] > 0).collect();

    match nonempty.len() {
        0 => return budgets,
        1 => {
            budgets[nonempty[0]] = total;
            return budgets;
        }
        _ => {}
    }

    let n = nonempty.len();
    let floor = min_section.min(total / n);
    let ceiling = ((total as f64 * f64::from(share.clamp(0.0, 1.0))).round() as usize).max(floor);
    let sum_available: u128 = nonempty.iter().map(|&i| available[i] as u128).sum();

    for &i in &nonempty {
        let proportional = (total as u128 * available[i] as u128 / sum_available) as usize;
        budgets[i] = proportional.clamp(floor, ceiling).min(available[i]);
    }

    // Take back overflow from the largest budgets, never below the floor
    let mut assigned: usize = budgets.iter().sum();
    while assigned > total {
        let Some(&largest) = nonempty
            .iter()
            .filter(|&&i| budgets[i] > floor.min(available[i]))
            .max_by_key(|&&i| (budgets[i], std::cmp::Reverse(i)))
        else {
            break;
        };
        let reducible = budgets[largest] - floor.min(available[largest]);
        let cut = reducible.min(assigned - total);
        budgets[largest] -= cut;
        assigned -= cut;
    }

    // Hand leftover to sources with unused text, in context order
    for &i in &nonempty {
        if assigned >= total {
            break;
        }
        let cap = ceiling.min(available[i]);
        if budgets[i] < cap {
            let extra = (cap - budgets[i]).min(total - assigned);
            budgets[i] += extra;
            assigned += extra;
        }
    }

    // Floors alone can exceed tiny budgets; shave to stay within total
    let mut assigned: usize = budgets.iter().sum();
    for &i in nonempty.iter().rev() {
        if assigned <= total {
            break;
        }
        let cut = budgets[i].min(assigned - total);
        budgets[i] -= cut;
        assigned -= cut;
    }

    budgets
}

/// Pack entries most-relevant-first into `budget` characters
fn pack_section(kind: SourceKind, entries: &[(&Candidate, String)], budget: usize) -> ContextSection {
    let sep_chars = ENTRY_SEPARATOR.chars().count();
    let mut text = String::new();
    let mut used = 0usize;
    let mut candidate_ids = Vec::new();
    let mut source_urls: Vec<String> = Vec::new();

    for (candidate, entry) in entries {
        let sep = if text.is_empty() { 0 } else { sep_chars };
        if used + sep >= budget {
            break;
        }
        let remaining = budget - used - sep;
        let entry_chars = entry.chars().count();

        let (piece, piece_chars, complete) = if entry_chars <= remaining {
            (entry.as_str(), entry_chars, true)
        } else {
            let cut = truncate_at_sentence(entry, remaining);
            (cut, cut.chars().count(), false)
        };

        if piece_chars > 0 {
            if sep > 0 {
                text.push_str(ENTRY_SEPARATOR);
            }
            text.push_str(piece);
            used += sep + piece_chars;
            candidate_ids.push(candidate.id.clone());
            if !candidate.source_url.is_empty() && !source_urls.contains(&candidate.source_url) {
                source_urls.push(candidate.source_url.clone());
            }
        }

        if !complete {
            break;
        }
    }

    ContextSection {
        label: kind,
        text,
        char_budget: budget,
        char_used: used,
        candidate_ids,
        source_urls,
    }
}

/// Cut `text` to at most `limit` characters
///
/// Prefers the latest sentence end (`. `, `.\n`, `! `, `? `) whose cut point
/// lies in the trailing 20% of `limit`; falls back to a hard cut.
pub fn truncate_at_sentence(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return "";
    }

    // Byte offsets of the first limit + 1 characters
    let chars: Vec<(usize, char)> = text.char_indices().take(limit + 1).collect();
    if chars.len() <= limit {
        return text;
    }

    let window_start = limit - limit / 5;
    for i in (0..limit).rev() {
        let cut_len = i + 1;
        if cut_len < window_start.max(1) {
            break;
        }
        let (byte_idx, c) = chars[i];
        let next = chars[i + 1].1;
        let boundary = matches!((c, next), ('.', ' ') | ('.', '\n') | ('!', ' ') | ('?', ' '));
        if boundary {
            return &text[..byte_idx + c.len_utf8()];
        }
    }

    &text[..chars[limit].0]
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
