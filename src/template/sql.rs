//! SQL `@name` placeholder scanner.
//!
//! Deliberately not minijinja: SQL text must never be textually
//! interpolated, only bound through named parameters. This is a small
//! regex pass that discovers which `@name`s are referenced and in what
//! order; `db::params` does the actual rewrite into a driver's native
//! placeholder syntax.

use regex::Regex;
use std::sync::OnceLock;

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

/// Extract `@name` references from SQL text, in first-occurrence order,
/// with duplicates removed: the same `@x` appearing twice binds once.
pub fn extract_param_names(sql: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for cap in param_re().captures_iter(sql) {
        let name = cap[1].to_string();
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_param_names_dedups() {
        let sql = "SELECT * FROM t WHERE id = @id AND parent = @id OR tag = @tag";
        assert_eq!(extract_param_names(sql), vec!["id".to_string(), "tag".to_string()]);
    }

    #[test]
    fn test_extract_param_names_empty() {
        assert!(extract_param_names("SELECT 1 AS n").is_empty());
    }
}
