//! Terminal rendering of knowledge responses

use colored::Colorize;

use crate::cli::args::Verbosity;
use crate::errors::Result;
use crate::rag::response::{KnowledgeResponse, ResponseMode};

/// Print a response for humans, or as JSON
pub fn print_response(response: &KnowledgeResponse, verbosity: Verbosity, json: bool) -> Result<()> {
    if json {
        println!("{}", response.to_json()?);
    } else {
        print!("{}", render_human(response, verbosity));
    }
    Ok(())
}

/// Human-readable rendering
///
/// Quiet prints only the answer. Verbose levels append stage timings and
/// per-source diagnostics.
pub fn render_human(response: &KnowledgeResponse, verbosity: Verbosity) -> String {
    let mut out = String::new();
    out.push_str(&response.answer);
    out.push('\n');

    if verbosity == Verbosity::Quiet {
        return out;
    }

    out.push('\n');
    out.push_str(&format!(
        "{} {}  {} {}\n",
        "Confidence:".bold(),
        confidence_label(response.confidence),
        "Mode:".bold(),
        mode_label(response.mode)
    ));

    if !response.sources.is_empty() {
        out.push_str(&format!("{}\n", "Sources:".bold()));
        for source in &response.sources {
            out.push_str(&format!("  - {} {}\n", source.url, format!("[{}]", source.kind.as_str()).dimmed()));
        }
    }

    let flags = &response.flags;
    if flags.any_source_problem() || flags.overall_timed_out {
        out.push_str(&format!("{}\n", "Warning: some sources were unavailable".yellow()));
    }

    if verbosity.show_diagnostics() {
        let t = &response.timings;
        out.push_str(&format!("\n{}\n", "Diagnostics:".bold()));
        out.push_str(&format!("  request: {}\n", response.request_id));
        out.push_str(&format!("  strategy: {}\n", response.strategy.as_str()));
        out.push_str(&format!(
            "  timings (ms): embed={} retrieve={} rank={} context={} score={} web={} generate={} total={}\n",
            t.embed_ms,
            t.retrieve_ms,
            t.rank_ms,
            t.build_context_ms,
            t.score_ms,
            t.web_fallback_ms,
            t.generate_ms,
            t.total_ms
        ));
        out.push_str(&format!(
            "  timed out: documents={} faq={} overall={}\n",
            flags.timed_out.documents, flags.timed_out.faq, flags.overall_timed_out
        ));
        for (name, error) in [("documents", &flags.errors.documents), ("faq", &flags.errors.faq)] {
            if let Some(error) = error {
                out.push_str(&format!("  {} error: {}\n", name, error.red()));
            }
        }
        out.push_str(&format!(
            "  cache: embedding={} response={}\n",
            hit_label(flags.embedding_cache_hit),
            hit_label(flags.response_cache_hit)
        ));
        if flags.out_of_scope {
            out.push_str("  answer flagged out of scope\n");
        }
        if let Some(error) = &flags.internal_error {
            out.push_str(&format!("  internal error: {}\n", error.red()));
        }
        let stages: Vec<&str> = response.stages.iter().map(|s| s.display_name()).collect();
        out.push_str(&format!("  stages: {}\n", stages.join(" → ")));
    }

    out
}

fn confidence_label(confidence: f32) -> String {
    let text = format!("{:.2}", confidence);
    if confidence >= 0.7 {
        text.green().to_string()
    } else if confidence >= 0.45 {
        text.yellow().to_string()
    } else {
        text.red().to_string()
    }
}

fn mode_label(mode: ResponseMode) -> String {
    match mode {
        ResponseMode::Grounded => mode.as_str().green().to_string(),
        ResponseMode::WebFallback => mode.as_str().cyan().to_string(),
        ResponseMode::Insufficient => mode.as_str().yellow().to_string(),
        ResponseMode::Degraded => mode.as_str().red().to_string(),
    }
}

fn hit_label(hit: bool) -> &'static str {
    if hit {
        "hit"
    } else {
        "miss"
    }
}
