//! `@name` → native placeholder translation, shared by both drivers.
//!
//! Hand-rolled rather than regex-based at this layer (the regex pass
//! already happened in `template::sql` for compile-time name discovery);
//! here we just rewrite the text once we know the final param order.

/// Rewrite `@name` occurrences into SQLite's `?NNN` positional form,
/// returning the rewritten SQL plus the ordered, de-duplicated parameter
/// names (by first occurrence) a caller must bind in that order.
pub fn to_positional(sql: &str) -> (String, Vec<String>) {
    let mut names: Vec<String> = Vec::new();
    let mut out = String::with_capacity(sql.len());
    let indices: Vec<(usize, char)> = sql.char_indices().collect();
    let len_bytes = sql.len();
    let mut pos = 0; // index into `indices`
    let mut last_copied = 0; // byte offset
    while pos < indices.len() {
        let (byte_i, ch) = indices[pos];
        if ch == '@' && indices.get(pos + 1).map(|(_, c)| is_ident_start_char(*c)).unwrap_or(false) {
            out.push_str(&sql[last_copied..byte_i]);
            let mut end = pos + 1;
            while end < indices.len() && is_ident_continue_char(indices[end].1) {
                end += 1;
            }
            let name_start = indices[pos + 1].0;
            let name_end = if end < indices.len() { indices[end].0 } else { len_bytes };
            let name = sql[name_start..name_end].to_string();
            let idx = match names.iter().position(|n| n == &name) {
                Some(p) => p,
                None => {
                    names.push(name);
                    names.len() - 1
                }
            };
            out.push_str(&format!("?{}", idx + 1));
            last_copied = name_end;
            pos = end;
        } else {
            pos += 1;
        }
    }
    out.push_str(&sql[last_copied..]);
    (out, names)
}

fn is_ident_start_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// SQL Server's native placeholder form is `@name` already; this just
/// validates/dedups without rewriting text, returning the same ordered
/// name list `to_positional` would.
pub fn native_names(sql: &str) -> Vec<String> {
    crate::template::sql::extract_param_names(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_positional_dedups_repeated_name() {
        let (sql, names) = to_positional("SELECT * FROM t WHERE a=@id OR b=@id AND c=@tag");
        assert_eq!(sql, "SELECT * FROM t WHERE a=?1 OR b=?1 AND c=?2");
        assert_eq!(names, vec!["id".to_string(), "tag".to_string()]);
    }
}
