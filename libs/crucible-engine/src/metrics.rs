// Container memory probe.
//
// Samples are taken by container name after the launch returns. Because
// containers run with `--rm` they may already be gone by then, so every
// failure here is non-fatal and callers simply omit the metric.

use crate::docker::ContainerRuntime;
use crate::error::ExecError;

/// Current memory usage of a named container, in kilobytes.
pub async fn memory_used_kb(
    runtime: &dyn ContainerRuntime,
    container_name: &str,
) -> Result<i64, ExecError> {
    let raw = runtime.memory_sample(container_name).await?;
    parse_mem_usage_kb(&raw)
        .ok_or_else(|| ExecError::MetricsUnavailable(format!("unrecognized stats format: {raw}")))
}

/// Parse the runtime's `used / limit` form, e.g. `123.45MiB / 512MiB`,
/// into kilobytes of used memory.
fn parse_mem_usage_kb(raw: &str) -> Option<i64> {
    let used = raw.trim().split('/').next()?.trim();
    let split = used.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (number, unit) = used.split_at(split);
    let value: f64 = number.parse().ok()?;
    let kb = match unit.trim().to_ascii_lowercase().as_str() {
        "b" => value / 1024.0,
        "kb" | "kib" => value,
        "mb" | "mib" => value * 1024.0,
        "gb" | "gib" => value * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(kb.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mebibytes() {
        assert_eq!(parse_mem_usage_kb("123.45MiB / 512MiB"), Some(126413));
        assert_eq!(parse_mem_usage_kb("1MiB / 512MiB"), Some(1024));
    }

    #[test]
    fn test_parse_other_units() {
        assert_eq!(parse_mem_usage_kb("2048B / 512MiB"), Some(2));
        assert_eq!(parse_mem_usage_kb("300KiB / 512MiB"), Some(300));
        assert_eq!(parse_mem_usage_kb("1.5GiB / 2GiB"), Some(1572864));
        // Older daemons report SI suffixes.
        assert_eq!(parse_mem_usage_kb("12MB / 512MB"), Some(12288));
    }

    #[test]
    fn test_parse_tolerates_spacing() {
        assert_eq!(parse_mem_usage_kb("  10MiB/512MiB\n"), Some(10240));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_mem_usage_kb(""), None);
        assert_eq!(parse_mem_usage_kb("no such container"), None);
        assert_eq!(parse_mem_usage_kb("-- / --"), None);
        assert_eq!(parse_mem_usage_kb("10XB / 1GiB"), None);
    }
}
