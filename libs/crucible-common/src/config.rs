// Application configuration, loaded from environment variables with defaults.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address, `host:port`. A bare `:8001` or `8001` is tolerated.
    pub listen_addr: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    /// Edge rate limiter: requests allowed per `rate_window` per client IP.
    pub rate_limit: usize,
    pub rate_window: Duration,
    /// Worker pool size (W). Bounds concurrently open workspaces.
    pub max_workers: usize,
    /// Request queue capacity (Q). Enqueue beyond this fails synchronously.
    pub max_queue_size: usize,
    /// Concurrency-slot capacity (S). Bounds concurrent container launches,
    /// independently of the worker count.
    pub max_concurrent: usize,
    /// Wall-clock budget for a single-input execution.
    pub exec_timeout: Duration,
    /// Wall-clock budget for a whole batch execution.
    pub batch_timeout: Duration,
    /// Directory under which per-job workspaces are created.
    pub sandbox_root: PathBuf,
    /// Container image the sandbox launches.
    pub sandbox_image: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8001".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
            max_workers: 10,
            max_queue_size: 100,
            max_concurrent: 20,
            exec_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(60),
            sandbox_root: PathBuf::from("sandbox"),
            sandbox_image: "compiler-image".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for unset or unparseable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: listen_addr(std::env::var("PORT").ok().as_deref()),
            read_timeout: duration_or(
                std::env::var("READ_TIMEOUT").ok().as_deref(),
                defaults.read_timeout,
            ),
            write_timeout: duration_or(
                std::env::var("WRITE_TIMEOUT").ok().as_deref(),
                defaults.write_timeout,
            ),
            idle_timeout: duration_or(
                std::env::var("IDLE_TIMEOUT").ok().as_deref(),
                defaults.idle_timeout,
            ),
            rate_limit: usize_or(std::env::var("RATE_LIMIT").ok().as_deref(), defaults.rate_limit),
            rate_window: duration_or(
                std::env::var("RATE_WINDOW").ok().as_deref(),
                defaults.rate_window,
            ),
            max_workers: usize_or(
                std::env::var("MAX_WORKERS").ok().as_deref(),
                defaults.max_workers,
            ),
            max_queue_size: usize_or(
                std::env::var("MAX_QUEUE_SIZE").ok().as_deref(),
                defaults.max_queue_size,
            ),
            max_concurrent: usize_or(
                std::env::var("MAX_CONCURRENT").ok().as_deref(),
                defaults.max_concurrent,
            ),
            exec_timeout: duration_or(
                std::env::var("EXEC_TIMEOUT").ok().as_deref(),
                defaults.exec_timeout,
            ),
            batch_timeout: duration_or(
                std::env::var("BATCH_TIMEOUT").ok().as_deref(),
                defaults.batch_timeout,
            ),
            sandbox_root: std::env::var("SANDBOX_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.sandbox_root),
            sandbox_image: std::env::var("SANDBOX_IMAGE").unwrap_or(defaults.sandbox_image),
        }
    }
}

/// Normalize a `PORT` value into a bindable `host:port` address.
fn listen_addr(port: Option<&str>) -> String {
    match port {
        Some(p) if !p.is_empty() => {
            let p = p.trim_start_matches(':');
            if p.contains(':') {
                p.to_string()
            } else {
                format!("0.0.0.0:{p}")
            }
        }
        _ => "0.0.0.0:8001".to_string(),
    }
}

/// Parse a duration given as plain seconds (`30`) or with a unit suffix
/// (`500ms`, `30s`, `2m`).
fn duration_or(val: Option<&str>, default: Duration) -> Duration {
    let Some(val) = val else { return default };
    let val = val.trim();
    let parsed = if let Some(ms) = val.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(s) = val.strip_suffix('s') {
        s.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(m) = val.strip_suffix('m') {
        m.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        val.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.unwrap_or(default)
}

fn usize_or(val: Option<&str>, default: usize) -> usize {
    val.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr_forms() {
        assert_eq!(listen_addr(None), "0.0.0.0:8001");
        assert_eq!(listen_addr(Some("")), "0.0.0.0:8001");
        assert_eq!(listen_addr(Some("9000")), "0.0.0.0:9000");
        assert_eq!(listen_addr(Some(":9000")), "0.0.0.0:9000");
        assert_eq!(listen_addr(Some("127.0.0.1:9000")), "127.0.0.1:9000");
    }

    #[test]
    fn test_duration_forms() {
        let d = Duration::from_secs(7);
        assert_eq!(duration_or(None, d), d);
        assert_eq!(duration_or(Some("30"), d), Duration::from_secs(30));
        assert_eq!(duration_or(Some("30s"), d), Duration::from_secs(30));
        assert_eq!(duration_or(Some("2m"), d), Duration::from_secs(120));
        assert_eq!(duration_or(Some("500ms"), d), Duration::from_millis(500));
        assert_eq!(duration_or(Some("bogus"), d), d);
    }

    #[test]
    fn test_usize_fallback() {
        assert_eq!(usize_or(Some("42"), 10), 42);
        assert_eq!(usize_or(Some("-1"), 10), 10);
        assert_eq!(usize_or(None, 10), 10);
    }

    #[test]
    fn test_defaults_match_reference_deployment() {
        let cfg = Config::default();
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.max_queue_size, 100);
        assert_eq!(cfg.max_concurrent, 20);
        assert_eq!(cfg.exec_timeout, Duration::from_secs(30));
        assert_eq!(cfg.batch_timeout, Duration::from_secs(60));
    }
}
