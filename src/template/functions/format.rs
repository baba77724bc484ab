use minijinja::Environment;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("formatNumber", |v: f64, decimals: u32| -> String { format!("{v:.decimals$}") });
    env.add_function("formatPercent", |v: f64, decimals: u32| -> String { format!("{:.decimals$}%", v * 100.0) });
    env.add_function("formatBytes", format_bytes);
    env.add_function("zeropad", |v: i64, width: usize| -> String { format!("{v:0width$}") });
    env.add_function("pad", |s: String, width: usize| -> String { format!("{s:width$}") });
}

fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
    }
}
