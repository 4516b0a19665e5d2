//! Address classification and normalization (Component B).
//!
//! Strips an optional `stdio:`/`mmc:` prefix, anchors relative paths at the
//! working directory, then consults the whitelist/blacklist/greylist in
//! that order to decide whether a caller-supplied device address is safe
//! to acquire.

use crate::config::Configuration;

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressStatus {
    Accept,
    RejectBanned,
    RejectRisky,
    RejectStdioBanned,
    Error(String),
}

/// A normalized address together with the prefix that was stripped from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// The effective address, e.g. `stdio:/dev/fd/1` or a bare MMC path.
    pub effective: String,
    pub was_mmc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    None,
    Stdio,
    Mmc,
}

fn strip_prefix(raw: &str) -> (Prefix, &str) {
    if let Some(rest) = raw.strip_prefix("stdio:") {
        (Prefix::Stdio, rest)
    } else if let Some(rest) = raw.strip_prefix("mmc:") {
        (Prefix::Mmc, rest)
    } else {
        (Prefix::None, raw)
    }
}

/// Asks whether `path` looks like a known MMC device node. The real backend
/// answers this question (see [`crate::backend::BurnBackend::is_mmc_path`]);
/// this free function exists so [`resolve`] can be exercised without a
/// concrete backend in tests.
pub fn looks_like_mmc_node(path: &str) -> bool {
    path.starts_with("/dev/sr") || path.starts_with("/dev/cdrom") || path.starts_with("/dev/dvd")
}

/// Classifies `raw` and produces the effective address the backend should
/// acquire. `declared_fd1` is the path recorded at startup for
/// `stdio:/dev/fd/1`, if the caller declared one.
pub fn resolve(cfg: &Configuration, raw: &str, is_mmc: impl Fn(&str) -> bool) -> AddressStatus {
    match resolve_address(cfg, raw, is_mmc) {
        Ok(_) => AddressStatus::Accept,
        Err(status) => status,
    }
}

/// Runs the full 8-step classification and, on acceptance, returns the
/// resolved address rather than discarding it.
pub fn resolve_address(
    cfg: &Configuration,
    raw: &str,
    is_mmc: impl Fn(&str) -> bool,
) -> Result<ResolvedAddress, AddressStatus> {
    // Step 1: strip optional prefix.
    let (prefix, rest) = strip_prefix(raw);

    // Step 2: anchor relative paths at the process working directory.
    let anchored = if prefix == Prefix::None && !rest.starts_with('/') {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(rest).to_string_lossy().into_owned(),
            Err(e) => return Err(AddressStatus::Error(e.to_string())),
        }
    } else {
        rest.to_string()
    };

    // Step 3: ask the backend whether this is a known MMC node.
    let is_mmc = prefix == Prefix::Mmc || is_mmc(&anchored);

    // Step 4: whitelist short-circuits everything.
    if cfg.classification.whitelist.matches(&anchored) {
        return finish(prefix, &anchored, is_mmc, cfg);
    }

    // Step 5: blacklist rejects.
    if cfg.classification.blacklist.matches(&anchored) {
        return Err(AddressStatus::RejectBanned);
    }

    // Step 6: unprefixed, non-MMC addresses consult the greylist.
    if prefix == Prefix::None && !is_mmc && cfg.classification.greylist.matches(&anchored) {
        return Err(AddressStatus::RejectRisky);
    }

    finish(prefix, &anchored, is_mmc, cfg)
}

fn finish(
    prefix: Prefix,
    anchored: &str,
    is_mmc: bool,
    cfg: &Configuration,
) -> Result<ResolvedAddress, AddressStatus> {
    // Step 7: construct the effective address.
    let effective = match prefix {
        Prefix::Mmc => anchored.to_string(),
        Prefix::Stdio => format!("stdio:{anchored}"),
        Prefix::None if !is_mmc => format!("stdio:{anchored}"),
        Prefix::None => anchored.to_string(),
    };

    // Edge case: stdio:/dev/fd/1 is only accepted if fd 1 was declared.
    let effective = if effective == "stdio:/dev/fd/1" {
        match &cfg.declared_fd1 {
            Some(declared) => format!("stdio:{declared}"),
            None => return Err(AddressStatus::Error("fd 1 was not declared at startup".into())),
        }
    } else {
        effective
    };

    // Step 8: a stdio:-prefixed write target can be globally banned.
    if effective.starts_with("stdio:") && cfg.ban_stdio_write {
        return Err(AddressStatus::RejectStdioBanned);
    }

    Ok(ResolvedAddress {
        effective,
        was_mmc: is_mmc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with_greylist(pattern: &str) -> Configuration {
        let mut cfg = Configuration::default();
        cfg.classification.greylist.push(pattern);
        cfg
    }

    #[test]
    fn rejects_ambiguous_loop_device_as_risky() {
        let cfg = cfg_with_greylist("/dev/loop*");
        let status = resolve(&cfg, "/dev/loop0", |_| false);
        assert_eq!(status, AddressStatus::RejectRisky);
    }

    #[test]
    fn stdio_prefix_bypasses_greylist() {
        let cfg = cfg_with_greylist("/dev/loop*");
        let status = resolve(&cfg, "stdio:/dev/loop0", |_| false);
        assert_eq!(status, AddressStatus::Accept);
    }

    #[test]
    fn blacklist_always_rejects() {
        let mut cfg = Configuration::default();
        cfg.classification.blacklist.push("/dev/sda");
        assert_eq!(
            resolve(&cfg, "/dev/sda", |_| false),
            AddressStatus::RejectBanned
        );
    }

    #[test]
    fn mmc_path_gets_bare_effective_address() {
        let cfg = Configuration::default();
        let resolved = resolve_address(&cfg, "mmc:/dev/sr0", |_| true).unwrap();
        assert_eq!(resolved.effective, "/dev/sr0");
        assert!(resolved.was_mmc);
    }

    #[test]
    fn write_stdio_ban_rejects_stdio_targets() {
        let mut cfg = Configuration::default();
        cfg.ban_stdio_write = true;
        assert_eq!(
            resolve(&cfg, "stdio:/tmp/out.iso", |_| false),
            AddressStatus::RejectStdioBanned
        );
    }

    #[test]
    fn fd1_requires_declaration() {
        let cfg = Configuration::default();
        assert!(matches!(
            resolve(&cfg, "stdio:/dev/fd/1", |_| false),
            AddressStatus::Error(_)
        ));

        let mut declared = Configuration::default();
        declared.declared_fd1 = Some("/proc/self/fd/1".into());
        assert_eq!(
            resolve(&declared, "stdio:/dev/fd/1", |_| false),
            AddressStatus::Accept
        );
    }
}
