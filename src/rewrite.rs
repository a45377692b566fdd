use std::collections::HashMap;

use crate::models::{ResolvedCitation, SourceCard};

const VIEWER_PATH: &str = "/static/pdfjs/web/viewer.html";
const DATA_FILES_PATH: &str = "/data_files";

#[derive(Debug, Clone)]
pub struct RewrittenAnswer {
    pub html: String,
    pub source_cards: Vec<SourceCard>,
}

/// Replace each citation marker with an inline numbered reference and append
/// one Sources block with a card per citation. `phrases` is keyed by file id;
/// a missing or empty phrase leaves the auto-highlight inert but still links
/// the document.
///
/// Replacement runs in two passes over the text. Markers are first swapped for
/// opaque placeholders in ordinal order (first remaining occurrence only), so
/// a marker whose text happens to appear inside already-rendered output can
/// never match the rendered markup.
pub fn rewrite_answer(
    answer_text: &str,
    citations: &[ResolvedCitation],
    phrases: &HashMap<String, String>,
) -> RewrittenAnswer {
    let mut working = answer_text.to_string();

    for citation in citations {
        working = working.replacen(&citation.marker_text, &placeholder(citation.ordinal), 1);
    }

    let mut source_cards = Vec::with_capacity(citations.len());
    for citation in citations {
        let phrase = phrases
            .get(&citation.file_id)
            .map(String::as_str)
            .unwrap_or("");

        let card = SourceCard {
            ordinal: citation.ordinal,
            display_name: strip_quotes(&citation.filename),
            viewer_url: viewer_url(&citation.filename),
            phrase: phrase.to_string(),
        };

        working = working.replacen(&placeholder(citation.ordinal), &inline_reference(&card), 1);
        source_cards.push(card);
    }

    let mut html = working;
    if !source_cards.is_empty() {
        html.push_str("<br><br><div class='sources-container'><strong>Sources:</strong>");
        for card in &source_cards {
            html.push_str(&citation_card(card));
        }
        html.push_str("</div>");
    }

    RewrittenAnswer { html, source_cards }
}

fn placeholder(ordinal: usize) -> String {
    format!("%%CITATION_{ordinal}%%")
}

pub fn viewer_url(filename: &str) -> String {
    format!(
        "{VIEWER_PATH}?file={DATA_FILES_PATH}/{}",
        urlencoding::encode(filename)
    )
}

fn inline_reference(card: &SourceCard) -> String {
    format!(
        " <sup class='citation-ref'><a href='#' \
         onclick=\"openDocument('{url}', '{name}', '{phrase}'); return false;\" \
         style='color:#007bff; text-decoration:none; font-weight:bold;'>[{n}]</a></sup>",
        url = card.viewer_url,
        name = escape_handler_arg(&card.display_name),
        phrase = escape_handler_arg(&card.phrase),
        n = card.ordinal,
    )
}

fn citation_card(card: &SourceCard) -> String {
    format!(
        "<div class='citation-card' style='margin-top:8px; padding:10px; \
         background:#f0f8ff; border:1px solid #cce5ff; border-radius:6px;'>\
         <strong style='color:#0056b3;'>[{n}] {name}</strong><br>\
         <button onclick=\"openDocument('{url}', '{js_name}', '{phrase}')\" \
         style='margin-top:5px; background:#007bff; color:white; border:none; \
         padding:6px 12px; border-radius:4px; cursor:pointer; font-size:13px;'>\
         View &amp; Highlight</button></div>",
        n = card.ordinal,
        name = card.display_name,
        url = card.viewer_url,
        js_name = escape_handler_arg(&card.display_name),
        phrase = escape_handler_arg(&card.phrase),
    )
}

/// Display names drop quote characters outright; the viewer resolves the file
/// by URL, not by name.
fn strip_quotes(name: &str) -> String {
    name.replace(['\'', '"'], "")
}

/// Escape for a single-quoted JS string inside a double-quoted HTML attribute.
/// The browser turns `&quot;` back into `"` before the handler parses, so the
/// invoked function sees the original characters.
fn escape_handler_arg(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(ordinal: usize, marker: &str, file_id: &str, filename: &str) -> ResolvedCitation {
        ResolvedCitation {
            ordinal,
            marker_text: marker.to_string(),
            file_id: file_id.to_string(),
            filename: filename.to_string(),
        }
    }

    fn phrases(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn no_citations_leaves_text_untouched() {
        let text = "The deadline is May 1.";
        let rewritten = rewrite_answer(text, &[], &HashMap::new());
        assert_eq!(rewritten.html, text);
        assert!(rewritten.source_cards.is_empty());
        assert!(!rewritten.html.contains("sources-container"));
    }

    #[test]
    fn each_citation_gets_numbered_ref_and_card() {
        let text = "Deadline is May 1 [m1]. Fee is $40 [m2].";
        let citations = vec![
            citation(1, "[m1]", "file-a", "deadlines.pdf"),
            citation(2, "[m2]", "file-b", "fees.pdf"),
        ];
        let phrases = phrases(&[("file-a", "phrase a"), ("file-b", "phrase b")]);

        let rewritten = rewrite_answer(text, &citations, &phrases);

        assert_eq!(rewritten.html.matches("citation-ref").count(), 2);
        assert_eq!(rewritten.html.matches("citation-card").count(), 2);
        assert_eq!(rewritten.html.matches("sources-container").count(), 1);
        assert!(rewritten.html.contains("[1]"));
        assert!(rewritten.html.contains("[2]"));
        assert!(!rewritten.html.contains("[m1]"));
        assert!(!rewritten.html.contains("[m2]"));
        let first = rewritten.html.find("[1]").unwrap();
        let second = rewritten.html.find("[2]").unwrap();
        assert!(first < second);
    }

    #[test]
    fn replaces_only_first_remaining_occurrence() {
        let text = "alpha [m] beta [m]";
        let citations = vec![
            citation(1, "[m]", "file-a", "a.pdf"),
            citation(2, "[m]", "file-a", "a.pdf"),
        ];
        let rewritten = rewrite_answer(text, &citations, &phrases(&[("file-a", "p")]));

        assert!(!rewritten.html.contains("[m]"));
        assert!(rewritten.html.contains("[1]"));
        assert!(rewritten.html.contains("[2]"));
        assert!(rewritten.html.find("[1]").unwrap() < rewritten.html.find("[2]").unwrap());
    }

    #[test]
    fn shared_filename_keeps_separate_cards_and_phrase() {
        let text = "Fact one [m1]. Fact two [m2].";
        let citations = vec![
            citation(1, "[m1]", "file-a", "handbook.pdf"),
            citation(2, "[m2]", "file-a", "handbook.pdf"),
        ];
        let phrases = phrases(&[("file-a", "the shared verbatim phrase")]);

        let rewritten = rewrite_answer(text, &citations, &phrases);

        assert_eq!(rewritten.source_cards.len(), 2);
        assert_eq!(rewritten.html.matches("citation-card").count(), 2);
        assert!(rewritten
            .source_cards
            .iter()
            .all(|card| card.phrase == "the shared verbatim phrase"));
    }

    #[test]
    fn rendered_output_is_never_rematched() {
        // The second marker is a substring of the rendered reference markup.
        let text = "first [cite] then sup";
        let citations = vec![
            citation(1, "[cite]", "file-a", "a.pdf"),
            citation(2, "sup", "file-b", "b.pdf"),
        ];
        let rewritten = rewrite_answer(text, &citations, &HashMap::new());

        // "sup" from the original text is replaced, not the <sup> element
        // rendered for citation 1.
        assert_eq!(rewritten.html.matches("citation-ref").count(), 2);
        assert!(rewritten.html.contains("then  <sup class='citation-ref'>"));
    }

    #[test]
    fn quotes_and_backslashes_cannot_break_the_handler() {
        let text = "See the rules [m].";
        let citations = vec![citation(1, "[m]", "file-a", "my \"weird\" file's.pdf")];
        let phrases = phrases(&[("file-a", "a phrase with \\ and 'single' and \"double\"")]);

        let rewritten = rewrite_answer(text, &citations, &phrases);

        // Display name drops quotes entirely.
        assert!(rewritten.html.contains("[1] my weird files.pdf"));
        // Handler args: backslash doubled, single quote escaped, double quote
        // neutralized as an entity.
        assert!(rewritten
            .html
            .contains("a phrase with \\\\ and \\'single\\' and &quot;double&quot;"));
        // No raw double quote survives inside the onclick attribute value.
        let onclick = rewritten.html.find("onclick=\"openDocument(").unwrap();
        let tail = &rewritten.html[onclick + "onclick=\"".len()..];
        let attr_end = tail.find("; return false;").unwrap();
        assert!(!tail[..attr_end].contains('"'));
    }

    #[test]
    fn handler_args_unescape_back_to_original() {
        let escaped = escape_handler_arg("a\\b'c\"d");
        // What the browser hands the JS parser after entity decoding.
        let attr_decoded = escaped.replace("&quot;", "\"");
        // What the JS parser yields for the single-quoted literal.
        let js_decoded = attr_decoded.replace("\\\\", "\u{0}").replace("\\'", "'").replace('\u{0}', "\\");
        assert_eq!(js_decoded, "a\\b'c\"d");
    }

    #[test]
    fn viewer_url_percent_encodes_filename() {
        assert_eq!(
            viewer_url("Project Approval Framework.pdf"),
            "/static/pdfjs/web/viewer.html?file=/data_files/Project%20Approval%20Framework.pdf"
        );
    }

    #[test]
    fn missing_phrase_renders_empty_handler_arg() {
        let text = "Fact [m].";
        let citations = vec![citation(1, "[m]", "file-a", "a.pdf")];
        let rewritten = rewrite_answer(text, &citations, &HashMap::new());

        assert!(rewritten.html.contains("'a.pdf', ''"));
        assert_eq!(rewritten.source_cards[0].phrase, "");
    }

    #[test]
    fn marker_absent_from_text_still_yields_card() {
        let text = "Text without the marker.";
        let citations = vec![citation(1, "[gone]", "file-a", "a.pdf")];
        let rewritten = rewrite_answer(text, &citations, &HashMap::new());

        assert!(rewritten.html.starts_with("Text without the marker."));
        assert_eq!(rewritten.source_cards.len(), 1);
        assert_eq!(rewritten.html.matches("citation-card").count(), 1);
    }
}
