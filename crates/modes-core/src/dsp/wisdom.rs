//! Wisdom file parsing and application.
//!
//! Format: plain UTF-8 text, one `primitiveName implName` pair per
//! non-empty, non-comment line (`#` starts a comment), whitespace trimmed.
//! Order within the file is selection preference for that primitive.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use super::kernels::all_dispatchers;
use crate::error::Result;

/// Parses wisdom file contents into `primitive -> ordered impl names`.
pub fn parse_wisdom(text: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(primitive), Some(implementation)) = (parts.next(), parts.next()) else {
            continue;
        };
        out.entry(primitive.to_string()).or_default().push(implementation.to_string());
    }
    out
}

/// Applies the wisdom map to every registered primitive's dispatcher.
/// Primitives named in the file that don't correspond to any dispatcher are
/// silently ignored (matches "unrecognized lines are ignored").
pub fn apply_wisdom(wisdom: &HashMap<String, Vec<String>>) {
    for dispatcher in all_dispatchers() {
        if let Some(order) = wisdom.get(dispatcher.name()) {
            dispatcher.set_wisdom(order);
        }
    }
}

/// Reads a wisdom file from disk and applies it to every primitive. IO
/// errors are surfaced to the caller (who, per the error-handling policy,
/// should log and continue with factory order rather than abort).
pub fn read_wisdom_file(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let wisdom = parse_wisdom(&text);
    apply_wisdom(&wisdom);
    Ok(())
}

/// Best-effort variant used at CLI startup: logs and continues on error
/// instead of propagating, matching the "wisdom IO errors are non-fatal"
/// policy.
pub fn try_read_wisdom_file(path: &Path) {
    if let Err(e) = read_wisdom_file(path) {
        warn!(path = %path.display(), error = %e, "failed to read wisdom file; using factory implementation order");
    }
}

/// Serializes the current selection of every primitive in wisdom file
/// format, for `wisdom show`/`wisdom write`.
pub fn dump_current_selection() -> String {
    let mut out = String::new();
    for dispatcher in all_dispatchers() {
        out.push_str(&format!("{} {}\n", dispatcher.name(), dispatcher.current_selection()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_skips_comments() {
        let text = "# comment\nboxcar_u16 x86_64_avx2\n\nmean_power_u16 scalar\n";
        let parsed = parse_wisdom(text);
        assert_eq!(parsed.get("boxcar_u16"), Some(&vec!["x86_64_avx2".to_string()]));
        assert_eq!(parsed.get("mean_power_u16"), Some(&vec!["scalar".to_string()]));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn ignores_malformed_lines() {
        let parsed = parse_wisdom("justoneword\n   \n# x y\n");
        assert!(parsed.is_empty());
    }

    #[test]
    fn applying_empty_wisdom_leaves_dispatchers_untouched() {
        apply_wisdom(&HashMap::new());
        for d in all_dispatchers() {
            assert!(!d.impl_names().is_empty());
        }
    }
}
