//! Input validation and sanitization functions for chainfold
//!
//! This module centralizes validation of values that arrive as text from
//! discovery output, JSON universes and the command line.

/// Sanitizes a label for safe use in rendered rule comments.
///
/// Removes control characters, quotes, and shell metacharacters.
/// Limits length to 64 bytes (ASCII characters only).
///
/// # Examples
///
/// ```
/// use chainfold::validators::sanitize_label;
///
/// let safe = sanitize_label("Allow SSH");
/// assert_eq!(safe, "Allow SSH");
///
/// let safe = sanitize_label("Test\nNewline\"Quote");
/// assert!(!safe.contains('\n'));
/// assert!(!safe.contains('"'));
/// ```
pub fn sanitize_label(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | ':' | '/'))
        .take(64)
        .collect()
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Parses a port or port range as written by iptables (`80`, `1000:2000`)
/// or netsh (`1000-2000`).
///
/// iptables allows open ranges (`:1024`, `1024:`), which extend to 1 and
/// 65535 respectively.
///
/// # Errors
///
/// Returns `Err` for non-numeric input, port 0, or reversed ranges.
///
/// # Examples
///
/// ```
/// use chainfold::validators::parse_port_spec;
///
/// assert_eq!(parse_port_spec("22"), Ok((22, 22)));
/// assert_eq!(parse_port_spec("1000:2000"), Ok((1000, 2000)));
/// assert_eq!(parse_port_spec("8000-8080"), Ok((8000, 8080)));
/// assert_eq!(parse_port_spec(":1024"), Ok((1, 1024)));
/// assert!(parse_port_spec("http").is_err());
/// ```
pub fn parse_port_spec(spec: &str) -> Result<(u16, u16), String> {
    let spec = spec.trim();
    let parse = |s: &str, default: u16| -> Result<u16, String> {
        if s.is_empty() {
            return Ok(default);
        }
        s.parse::<u16>()
            .map_err(|_| format!("Invalid port '{s}'"))
    };

    let (start, end) = if let Some((a, b)) = spec.split_once(':').or_else(|| spec.split_once('-')) {
        (parse(a, 1)?, parse(b, 65535)?)
    } else {
        let port = spec
            .parse::<u16>()
            .map_err(|_| format!("Invalid port '{spec}'"))?;
        (port, port)
    };

    validate_port_range(start, end)
}

/// Validates a chain name.
///
/// iptables limits chain names to 28 characters; whitespace would break
/// rendered scripts.
///
/// # Errors
///
/// Returns `Err` if the name is empty, too long, or contains whitespace or
/// quotes.
pub fn validate_chain_name(name: &str) -> Result<&str, String> {
    if name.is_empty() {
        return Err("Chain name cannot be empty".to_string());
    }

    if name.len() > 28 {
        return Err(format!("Chain name '{name}' too long (max 28 characters)"));
    }

    if name
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '"' | '\''))
    {
        return Err(format!("Chain name '{name}' contains invalid characters"));
    }

    Ok(name)
}

/// Normalizes a source address as written by discovery tools.
///
/// A bare IPv4 host address gets a `/32` suffix; CIDRs are returned
/// unchanged. Nothing is parsed here beyond spotting the missing prefix:
/// intersection reports malformed values.
///
/// # Examples
///
/// ```
/// use chainfold::validators::normalize_source;
///
/// assert_eq!(normalize_source("10.0.0.1"), "10.0.0.1/32");
/// assert_eq!(normalize_source("10.0.0.0/8"), "10.0.0.0/8");
/// ```
pub fn normalize_source(source: &str) -> String {
    let source = source.trim();
    if !source.contains('/') && source.parse::<std::net::Ipv4Addr>().is_ok() {
        format!("{source}/32")
    } else {
        source.to_string()
    }
}

/// Validates a snapshot name for filesystem safety.
///
/// Constraints:
/// - Alphanumeric, underscores, and hyphens only: Prevents shell injection and
///   cross-platform filename issues.
/// - Max 64 chars: Ensures filenames stay within system limits.
/// - Rejects "." and "..": Path traversal protection.
///
/// # Errors
///
/// Returns `Err` describing the violated constraint.
pub fn validate_snapshot_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".into());
    }

    if name.len() > 64 {
        return Err("Name too long (max 64 chars)".into());
    }

    if name == "." || name == ".." {
        return Err("Invalid name".into());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Name contains invalid characters (use only a-z, 0-9, _, -)".into());
    }

    Ok(())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_sanitize_label_never_panics(s in "\\PC*") {
            let _ = sanitize_label(&s);
        }

        #[test]
        fn test_sanitize_label_output_is_safe(s in "\\PC*") {
            let sanitized = sanitize_label(&s);
            prop_assert!(sanitized.len() <= 64);
            prop_assert!(sanitized.is_ascii());
            prop_assert!(!sanitized.contains('"'));
        }

        #[test]
        fn test_parse_port_spec_accepts_valid_ranges(a in 1u16..=65535, b in 1u16..=65535) {
            let (lo, hi) = (a.min(b), a.max(b));
            prop_assert_eq!(parse_port_spec(&format!("{lo}:{hi}")), Ok((lo, hi)));
            prop_assert_eq!(parse_port_spec(&format!("{lo}-{hi}")), Ok((lo, hi)));
        }

        #[test]
        fn test_parse_port_spec_never_panics(s in "\\PC{0,16}") {
            let _ = parse_port_spec(&s);
        }
    }
}
