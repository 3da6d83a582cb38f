//!
//! Attack/error logger for malformed inbound requests.
//!
//! Requests that fail framework-level parsing are classified by keyword
//! scan into known attack categories and recorded as compact gzipped JSONL,
//! one file per UTC day, with the verbose original error suppressed to a
//! single warning line.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::io::Write;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;
use tracing::{debug, warn};

/* --- constants ------------------------------------------------------------------------------ */

/** Raw request snippet size cap in log records */
const RAW_REQUEST_LIMIT: usize = 4096;

/** Known attack signatures by category */
const ATTACK_TYPES: &[(&str, &[&str])] = &[
    (
        "struts2_ognl",
        &[
            "xwork.methodaccessor.denymethodexecution",
            "_memberaccess",
            "allowstaticmethodaccess",
            "org.apache.commons.io.ioutils",
            "org.apache.struts2.servletactioncontext",
            "java.lang.runtime",
        ],
    ),
    ("directory_traversal", &["././././", "../../../", "..%2f", "..%5c"]),
    ("ssti_probe", &["${{", "${#", "{{", "%24%7b%7b", "%24%7b%23"]),
    ("sql_injection", &["' or '", "1=1", "union select", "--"]),
    ("xss_probe", &["<script>", "javascript:", "onerror=", "onload="]),
];

/* --- types ----------------------------------------------------------------------------------- */

///
/// Logger for recording malformed/malicious request attempts.
#[derive(Debug, Clone)]
pub struct AttackLogger {
    log_dir: PathBuf,
}

/* --- start of code -------------------------------------------------------------------------- */

///
/// Classify raw request data into a known attack category.
///
/// # Arguments
///  * `raw` - raw request data or parser error message
///
/// # Returns
///  * Category name, or `"unknown"` when no signature matches
pub fn classify_attack(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    for (attack_type, patterns) in ATTACK_TYPES {
        if patterns.iter().any(|p| lower.contains(p)) {
            return attack_type;
        }
    }
    "unknown"
}

impl AttackLogger {
    ///
    /// Build a logger writing under the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    ///
    /// Record one malformed request.
    ///
    /// Emits a single concise warning and appends the detailed record to the
    /// day file. Logging failures never affect request handling.
    ///
    /// # Arguments
    ///  * `remote_ip` - best-effort client address
    ///  * `raw_request` - raw request data (truncated to 4096 bytes)
    ///  * `error_type` - parser error category, e.g. `"InvalidJson"`
    ///  * `error_message` - parser error text
    pub fn log_attack(&self, remote_ip: &str, raw_request: &str, error_type: &str, error_message: &str) {
        let attack_type = classify_attack(raw_request);
        warn!("Attack blocked: {} from {} ({})", attack_type, remote_ip, error_type);

        let now = chrono::Utc::now();
        let mut snippet = raw_request.to_string();
        if snippet.len() > RAW_REQUEST_LIMIT {
            let mut cut = RAW_REQUEST_LIMIT;
            while !snippet.is_char_boundary(cut) {
                cut -= 1;
            }
            snippet.truncate(cut);
        }

        let entry = json!({
            "timestamp": now.to_rfc3339(),
            "remote_ip": remote_ip,
            "attack_type": attack_type,
            "error_type": error_type,
            "error_message": error_message,
            "raw_request": snippet,
        });

        if let Err(e) = self.append(&now, &entry) {
            debug!("Failed to save attack log: {}", e);
        }
    }

    fn append(
        &self,
        now: &chrono::DateTime<chrono::Utc>,
        entry: &serde_json::Value,
    ) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self.log_dir.join(format!("attacks_{}.jsonl.gz", now.format("%Y-%m-%d")));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        writeln!(encoder, "{}", entry)?;
        encoder.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify_attack("GET /${{7*7}} HTTP/1.1"), "ssti_probe");
        assert_eq!(classify_attack("../../../etc/passwd"), "directory_traversal");
        assert_eq!(classify_attack("' OR '1'='1"), "sql_injection");
        assert_eq!(classify_attack("<script>alert(1)</script>"), "xss_probe");
        assert_eq!(classify_attack("_memberAccess.allowStaticMethodAccess"), "struts2_ognl");
        assert_eq!(classify_attack("plain broken json"), "unknown");
    }

    #[test]
    fn test_log_attack_writes_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AttackLogger::new(dir.path().to_path_buf());
        logger.log_attack("10.0.0.1", "{{bad}}", "InvalidJson", "expected value");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        assert!(name.to_string_lossy().starts_with("attacks_"));
        assert!(name.to_string_lossy().ends_with(".jsonl.gz"));
    }

    #[test]
    fn test_snippet_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AttackLogger::new(dir.path().to_path_buf());
        logger.log_attack("10.0.0.1", &"x".repeat(10_000), "BadStatusLine", "too long");
        // Truncation happens before serialization; reaching here without
        // panicking on char boundaries is the contract.
    }
}
