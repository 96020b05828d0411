//! Heuristic checks on a step's generated files.
//!
//! These are coarse signals, not parsers. An empty result means the step is
//! accepted; anything else feeds `VALIDATION_FAIL`.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::FileMap;

/// Largest tolerated gap between opening and closing HTML tag counts.
pub const HTML_TAG_TOLERANCE: usize = 3;

static OPEN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").expect("open tag regex is valid"));
static CLOSE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</[a-zA-Z][^>]*>").expect("close tag regex is valid"));

/// Validate generated files and console errors from running them.
///
/// Console errors come first, one entry each, in the order given. File
/// findings follow in file-name order.
pub fn validate_step_output(generated_files: &FileMap, console_errors: &[String]) -> Vec<String> {
    let mut errors: Vec<String> = console_errors
        .iter()
        .map(|message| format!("Console: {message}"))
        .collect();

    for (name, body) in generated_files {
        if body.trim().is_empty() {
            errors.push(format!("Empty file: {name}"));
            continue;
        }
        if name.ends_with(".html") {
            let (open, close) = count_html_tags(body);
            if open.abs_diff(close) > HTML_TAG_TOLERANCE {
                errors.push(format!(
                    "{name}: unbalanced HTML tags ({open} opening, {close} closing)"
                ));
            }
        } else if name.ends_with(".js") || name.ends_with(".ts") {
            let open = body.matches('{').count();
            let close = body.matches('}').count();
            if open != close {
                errors.push(format!(
                    "{name}: mismatched braces ({open} opening, {close} closing)"
                ));
            }
        }
    }

    errors
}

/// Count opening tags (excluding self-closing ones) and closing tags.
fn count_html_tags(body: &str) -> (usize, usize) {
    let open = OPEN_TAG_RE
        .find_iter(body)
        .filter(|tag| !tag.as_str().ends_with("/>"))
        .count();
    let close = CLOSE_TAG_RE.find_iter(body).count();
    (open, close)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect()
    }

    #[test]
    fn flags_empty_file() {
        let errors = validate_step_output(&files(&[("a.js", "")]), &[]);
        assert_eq!(errors, vec!["Empty file: a.js".to_string()]);
    }

    #[test]
    fn whitespace_only_counts_as_empty() {
        let errors = validate_step_output(&files(&[("style.css", "  \n\t ")]), &[]);
        assert_eq!(errors, vec!["Empty file: style.css".to_string()]);
    }

    #[test]
    fn flags_mismatched_braces_in_script() {
        let errors = validate_step_output(&files(&[("b.js", "function f(){ if(true){")]), &[]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("mismatched braces"), "{errors:?}");
    }

    #[test]
    fn typescript_braces_must_match_exactly() {
        let errors = validate_step_output(&files(&[("c.ts", "const a = { b: 1 }}")]), &[]);
        assert!(errors[0].starts_with("c.ts: mismatched braces"));
        assert!(validate_step_output(&files(&[("d.ts", "const a = { b: 1 }")]), &[]).is_empty());
    }

    #[test]
    fn single_unclosed_html_tag_is_tolerated() {
        let errors = validate_step_output(&files(&[("c.html", "<div><span></span>")]), &[]);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn large_html_imbalance_is_flagged() {
        let body = "<div><section><ul><li><p>unclosed";
        let errors = validate_step_output(&files(&[("index.html", body)]), &[]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unbalanced HTML tags (5 opening, 0 closing)"));
    }

    #[test]
    fn self_closing_tags_are_not_counted_as_open() {
        let body = "<div><img src=\"a.png\"/><br/><input/><hr/></div>";
        assert_eq!(count_html_tags(body), (1, 1));
    }

    #[test]
    fn console_errors_map_one_to_one_with_prefix() {
        let console = vec!["TypeError: x".to_string(), "SyntaxError: y".to_string()];
        let errors = validate_step_output(&files(&[("ok.js", "f()")]), &console);
        assert_eq!(
            errors,
            vec![
                "Console: TypeError: x".to_string(),
                "Console: SyntaxError: y".to_string()
            ]
        );
    }

    #[test]
    fn other_file_types_only_get_the_empty_check() {
        let errors = validate_step_output(&files(&[("notes.md", "{{{")]), &[]);
        assert!(errors.is_empty());
    }
}
