use minijinja::value::Value as JValue;
use minijinja::Environment;

pub fn register(env: &mut Environment<'static>) {
    env.add_filter("upper", |s: String| s.to_uppercase());
    env.add_filter("lower", |s: String| s.to_lowercase());
    env.add_filter("trim", |s: String| s.trim().to_string());
    env.add_filter("replace", |s: String, from: String, to: String| s.replace(&from, &to));
    env.add_filter("contains", |s: String, needle: String| s.contains(&needle));
    env.add_filter("hasPrefix", |s: String, p: String| s.starts_with(&p));
    env.add_filter("hasSuffix", |s: String, p: String| s.ends_with(&p));
    env.add_filter("truncate", |s: String, n: usize| -> String {
        s.chars().take(n).collect()
    });
    env.add_filter("split", |s: String, sep: String| -> Vec<String> {
        s.split(sep.as_str()).map(|p| p.to_string()).collect()
    });
    env.add_filter("join", |items: Vec<JValue>, sep: String| -> String {
        items
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(&sep)
    });
    env.add_filter("substr", |s: String, start: i64, len: i64| -> String {
        let chars: Vec<char> = s.chars().collect();
        let start = start.max(0) as usize;
        if start >= chars.len() {
            return String::new();
        }
        let end = (start + len.max(0) as usize).min(chars.len());
        chars[start..end].iter().collect()
    });
    env.add_filter("quote", |s: String| -> String { format!("\"{}\"", s.replace('"', "\\\"")) });
    env.add_filter("repeat", |s: String, n: usize| s.repeat(n));
    env.add_function("sprintf", sprintf);
}

/// Minimal `%s`/`%d`/`%f` positional formatter for string-first templates.
fn sprintf(fmt: String, args: Vec<JValue>) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut arg_iter = args.into_iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek() {
                Some('s') | Some('d') | Some('f') | Some('v') => {
                    chars.next();
                    if let Some(a) = arg_iter.next() {
                        out.push_str(&a.to_string());
                    }
                }
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                _ => out.push('%'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
