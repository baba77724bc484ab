use minijinja::Environment;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use uuid::Uuid;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("isEmail", is_email);
    env.add_function("isUUID", |s: String| Uuid::parse_str(&s).is_ok());
    env.add_function("isURL", |s: String| url::Url::parse(&s).is_ok());
    env.add_function("isIP", |s: String| s.parse::<IpAddr>().is_ok());
    env.add_function("isIPv4", |s: String| matches!(s.parse::<IpAddr>(), Ok(IpAddr::V4(_))));
    env.add_function("isIPv6", |s: String| matches!(s.parse::<IpAddr>(), Ok(IpAddr::V6(_))));
    env.add_function("isNumeric", |s: String| s.trim().parse::<f64>().is_ok());
    env.add_function("matches", matches_regex);
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

fn is_email(s: String) -> bool {
    email_re().is_match(&s)
}

fn matches_regex(s: String, pattern: String) -> bool {
    Regex::new(&pattern).map(|re| re.is_match(&s)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_email() {
        assert!(is_email("a@b.com".to_string()));
        assert!(!is_email("not-an-email".to_string()));
    }
}
