//! Engine-scoped configuration, replacing process-wide global state.
//!
//! A [`Configuration`] is constructed once by the caller (library user or
//! `hadris-burn-cli`) and threaded through by reference into every
//! component constructor. There are no `static`s here beyond what a signal
//! trampoline would need, and `hadris-burn` installs none of those itself.

use crate::diagnostic::Severity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Minimal glob matcher supporting `*` and `?`, grounded on the subset of
/// `fnmatch` semantics device pattern lists rely on.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    fn rec(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => rec(&p[1..], t) || (!t.is_empty() && rec(p, &t[1..])),
            Some('?') => !t.is_empty() && rec(&p[1..], &t[1..]),
            Some(c) => t.first() == Some(c) && rec(&p[1..], &t[1..]),
        }
    }

    rec(&pattern, &text)
}

/// One named glob pattern list (whitelist, blacklist or greylist).
#[derive(Debug, Clone, Default)]
pub struct GlobPatternList(Vec<String>);

impl GlobPatternList {
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self(patterns.into_iter().collect())
    }

    pub fn push(&mut self, pattern: impl Into<String>) {
        self.0.push(pattern.into());
    }

    pub fn matches(&self, text: &str) -> bool {
        self.0.iter().any(|pattern| glob_match(pattern, text))
    }
}

/// Whitelist/blacklist/greylist triple controlling address acceptance.
/// See [`crate::address::resolve`] for the algorithm that consumes it.
#[derive(Debug, Clone, Default)]
pub struct ClassificationList {
    pub whitelist: GlobPatternList,
    pub blacklist: GlobPatternList,
    pub greylist: GlobPatternList,
}

/// A cooperative cancellation flag, replacing signal-handler state. The
/// burn pipeline's polling loop checks this once per iteration; setting it
/// is the only thing a signal handler (or any other caller) needs to do.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine-wide configuration: classification lists, abort threshold,
/// write-stdio policy, and the memory budget used by the media check ring.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub classification: ClassificationList,
    pub abort_threshold: Severity,
    pub ban_stdio_write: bool,
    pub declared_fd1: Option<String>,
    pub scsi_logging: bool,
    /// Upper bound, in bytes, for the async media-check ring's buffers.
    pub check_ring_memory_budget: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            classification: ClassificationList::default(),
            abort_threshold: Severity::Fatal,
            ban_stdio_write: false,
            declared_fd1: None,
            scsi_logging: false,
            check_ring_memory_budget: 256 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_star_and_question_mark() {
        let mut list = GlobPatternList::default();
        list.push("/dev/loop*");
        assert!(list.matches("/dev/loop0"));
        assert!(list.matches("/dev/loop12"));
        assert!(!list.matches("/dev/sr0"));

        let mut single = GlobPatternList::default();
        single.push("/dev/sr?");
        assert!(single.matches("/dev/sr0"));
        assert!(!single.matches("/dev/sr10"));
    }

    #[test]
    fn cancellation_token_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
