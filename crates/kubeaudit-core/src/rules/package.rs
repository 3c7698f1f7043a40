//! Package declaration lookup for rule module source.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// First `package a.b.c` line, ignoring leading whitespace
    static ref PACKAGE_PATTERN: Regex = Regex::new(
        r"(?m)^\s*package\s+([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)"
    ).unwrap();
}

/// Extract the package path declared by a rule module's source.
pub fn package_name(source: &str) -> Option<&str> {
    PACKAGE_PATTERN
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
