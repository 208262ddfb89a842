//! Prompt construction and answer post-processing

use crate::types::Query;

/// Appended to the prompt when the first answer comes back too short
pub const RETRY_SUFFIX: &str = "\n\nPlease answer concisely but fully.";

/// Phrases that mark an answer as "I don't know"
const OUT_OF_SCOPE_PHRASES: [&str; 5] = [
    "i don't know",
    "i do not know",
    "não tenho informações",
    "não sei",
    "fora do escopo",
];

const POLICY: &str = "Follow policy: do not request or output secrets or personal data; \
avoid politics, violence or hate. Answer strictly about the products in the catalog \
(Maquininha, Tap to Pay, PDV, Pix, Conta, Boleto, Link, Empréstimo, Cartão) and prefer \
information grounded by the provided context. If the context is insufficient, explicitly \
say you don't know and suggest contacting human support. Output format: short answer first, \
then bullet points if needed, then 'Sources:' with the most relevant URL. If you already \
include a 'Sources:' section, do not add another one.";

/// Locale-aware system preamble
pub fn system_prompt(query: &Query) -> String {
    let (prefix, language) = if query.is_portuguese() {
        (
            "[pt-BR]",
            "Always answer in Portuguese (pt-BR), using Brazilian Portuguese spelling and expressions.",
        )
    } else {
        ("[en]", "Always answer in English, do not mix languages.")
    };
    format!("{} {} {}", prefix, POLICY, language)
}

/// Full prompt: preamble, question and labeled context
pub fn build_prompt(query: &Query, context: &str) -> String {
    let context = context.trim();
    let context_block = if context.is_empty() {
        "(no relevant information was found)\n\nThere is not enough information to answer. \
Say that you don't know and suggest contacting human support."
            .to_string()
    } else {
        context.to_string()
    };

    format!(
        "{}\n\nQuestion: {}\n\nContext:\n{}",
        system_prompt(query),
        query.text().trim(),
        context_block
    )
}

/// Whether the answer admits it cannot help
pub fn is_out_of_scope(answer: &str) -> bool {
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    OUT_OF_SCOPE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Append a "Sources:" line unless the answer already has one
///
/// Out-of-scope answers are returned unchanged.
pub fn attach_sources(answer: &str, urls: &[String], max_sources: usize) -> String {
    if urls.is_empty()
        || max_sources == 0
        || is_out_of_scope(answer)
        || answer.to_lowercase().contains("sources:")
    {
        return answer.to_string();
    }

    let mut picked: Vec<&str> = Vec::new();
    for url in urls {
        if !url.is_empty() && !picked.contains(&url.as_str()) {
            picked.push(url);
        }
        if picked.len() == max_sources {
            break;
        }
    }

    if picked.is_empty() {
        return answer.to_string();
    }

    format!("{}\n\nSources: {}", answer.trim_end(), picked.join(", "))
}
