//! Small string helpers shared by the transpiler passes.

/// Format a float for WGSL, removing trailing zeros but keeping it a float literal.
pub fn fmt_float(v: f64) -> String {
    if v.is_finite() {
        let s = format!("{v:.9}");
        let s = s.trim_end_matches('0');
        if let Some(s) = s.strip_suffix('.') {
            format!("{s}.0")
        } else {
            s.to_string()
        }
    } else {
        "0.0".to_string()
    }
}

pub fn sanitize_wgsl_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// `data` -> `Data`, used for generated struct names.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

pub fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

/// Indent every non-empty line by `levels` * 4 spaces.
pub fn indent(source: &str, levels: usize) -> String {
    let pad = "    ".repeat(levels);
    source
        .replace("\r\n", "\n")
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_float_keeps_decimal_point() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(0.25), "0.25");
        assert_eq!(fmt_float(std::f64::consts::PI), "3.141592654");
        assert_eq!(fmt_float(f64::NAN), "0.0");
    }

    #[test]
    fn test_sanitize_and_capitalize() {
        assert_eq!(sanitize_wgsl_ident("my-tex"), "my_tex");
        assert_eq!(sanitize_wgsl_ident("3d"), "_3d");
        assert_eq!(capitalize("data"), "Data");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent("a;\n\nb;", 1), "    a;\n\n    b;");
    }
}
