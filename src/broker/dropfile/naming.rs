// src/broker/dropfile/naming.rs

//! Message file names.
//!
//! A message file is named `<timestamp><token>.<ext>`:
//! - `timestamp` is microseconds since the epoch, zero padded to 20 digits and
//!   forced strictly increasing within the process
//! - `token` is a random UUID generated once per process
//!
//! Two producers can only collide if they share both the token and the
//! timestamp, which the per-process counter rules out.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

static PROCESS_TOKEN: OnceLock<String> = OnceLock::new();
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Token shared by every file this process publishes.
pub(super) fn process_token() -> &'static str {
    PROCESS_TOKEN.get_or_init(|| Uuid::new_v4().simple().to_string())
}

/// Microsecond timestamp that never repeats or goes backwards in this process.
pub(super) fn next_timestamp() -> u64 {
    // ---
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Generate a fresh candidate file name.
pub(super) fn message_file_name(extension: &str) -> String {
    format!("{:020}{}.{}", next_timestamp(), process_token(), extension)
}

/// True if `path` looks like a message file for `extension`.
///
/// Hidden files (temporary files still being written) never match.
pub(super) fn is_message_file(path: &Path, extension: &str) -> bool {
    // ---
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'));

    !hidden && path.extension().and_then(|e| e.to_str()) == Some(extension)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::thread;

    #[test]
    fn test_token_is_stable() {
        // ---
        assert_eq!(process_token(), process_token());
        assert_eq!(process_token().len(), 32);
    }

    #[test]
    fn test_timestamps_strictly_increase_across_threads() {
        // ---
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..500).map(|_| next_timestamp()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let stamps = handle.join().unwrap();
            assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            for stamp in stamps {
                assert!(seen.insert(stamp), "timestamp {stamp} handed out twice");
            }
        }
    }

    #[test]
    fn test_file_name_shape() {
        // ---
        let name = message_file_name("msg");
        let (stem, ext) = name.rsplit_once('.').unwrap();

        assert_eq!(ext, "msg");
        assert_eq!(stem.len(), 20 + 32);
        assert!(stem[..20].chars().all(|c| c.is_ascii_digit()));
        assert!(stem.ends_with(process_token()));
        assert!(is_message_file(&PathBuf::from(&name), "msg"));
    }

    #[test]
    fn test_is_message_file_filters() {
        // ---
        assert!(is_message_file(Path::new("/q/jobs/0001abc.msg"), "msg"));
        assert!(!is_message_file(Path::new("/q/jobs/0001abc.job"), "msg"));
        assert!(!is_message_file(Path::new("/q/jobs/.pending-x.msg"), "msg"));
        assert!(!is_message_file(Path::new("/q/jobs/.pending-x.tmp"), "msg"));
        assert!(!is_message_file(Path::new("/q/jobs/noext"), "msg"));
    }
}
