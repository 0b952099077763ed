use std::collections::HashMap;

/// Parses a server statistics report into a field map.
///
/// The report is a sequence of `name:value` lines. Section headers start
/// with `#` and are skipped, as are blank lines. A line is split at its
/// first colon, so values may contain colons of their own. A line without
/// any colon is kept with the value `"n/a"`.
pub(crate) fn parse_stats(report: &str) -> HashMap<String, String> {
    let mut stats = HashMap::new();
    for line in report.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => stats.insert(name.to_string(), value.to_string()),
            None => stats.insert(line.to_string(), "n/a".to_string()),
        };
    }
    stats
}
