// Prompt rendering
// Serializes a ContextBundle into the document sent to the explanation backend

use crate::context_bundler::spans_in_diagnostic_order;
use cwhy_utils::ContextBundle;
use std::fmt::Write;

/// Marker left where the middle of an over-long error was cut
pub const ELISION_MARKER: &str = "[...]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptOptions {
    /// Longest compiler error text kept verbatim
    pub max_error_chars: usize,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_error_chars: 8 * 1024,
        }
    }
}

/// Render a bundle as a prompt: the code excerpts, then the compiler
/// error, then the question.
pub fn render_prompt(bundle: &ContextBundle, options: &PromptOptions) -> String {
    let mut prompt = String::new();

    let spans = spans_in_diagnostic_order(&bundle.diagnostics, &bundle.spans);
    if !spans.is_empty() {
        prompt.push_str("This is my code:\n\n");
        for span in spans {
            let _ = writeln!(prompt, "File `{}`:", span.file_path);
            prompt.push_str("```\n");
            for (offset, line) in span.text.lines().enumerate() {
                let _ = writeln!(prompt, "{} {}", span.start_line + offset, line);
            }
            prompt.push_str("```\n\n");
        }
    }

    let error_text = bundle
        .diagnostics
        .iter()
        .map(|d| d.raw_text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    prompt.push_str("This is my error:\n```\n");
    prompt.push_str(&elide_middle(&error_text, options.max_error_chars));
    prompt.push_str("\n```\n\n");
    prompt.push_str("What's the problem?");

    prompt
}

/// Keep the head and tail of `text`, cutting whole lines out of the middle
/// so that roughly `max_chars` characters of the original survive.
pub fn elide_middle(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    let half = max_chars / 2;

    // The first line is the primary error header and always survives
    let mut head_len = 0;
    let mut used = 0;
    for line in &lines {
        let cost = line.chars().count() + 1;
        if head_len > 0 && used + cost > half {
            break;
        }
        used += cost;
        head_len += 1;
    }

    let mut tail_len = 0;
    used = 0;
    for line in lines[head_len..].iter().rev() {
        let cost = line.chars().count() + 1;
        if used + cost > half {
            break;
        }
        used += cost;
        tail_len += 1;
    }

    let head = lines[..head_len].join("\n");
    let tail = lines[lines.len() - tail_len..].join("\n");

    format!("{}\n\n{}\n\n{}", head, ELISION_MARKER, tail)
}
