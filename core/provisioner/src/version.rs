//! Version precedence for toolchain release strings.
//!
//! Versions look like `v1.2.3-alpha.1+build`. The comparison follows SemVer
//! 2.0.0 precedence for the numeric core and the pre-release suffix and
//! ignores build metadata entirely:
//!
//! - an optional leading `v`/`V` is ignored
//! - missing core components count as `0` (`1.2` == `1.2.0`)
//! - a release outranks any of its pre-releases (`1.0.0-alpha < 1.0.0`)
//! - an empty pre-release is no pre-release (`1.0.0-` == `1.0.0`)
//! - pre-release identifiers compare left to right; numeric identifiers
//!   compare as integers and rank below alphanumeric ones, which compare in
//!   ASCII order; a strict prefix ranks lower

use std::cmp::Ordering;

/// Compares two version strings by precedence.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (core_a, pre_a) = split_version(a);
    let (core_b, pre_b) = split_version(b);

    let core_order = core_components(core_a).cmp(&core_components(core_b));
    if core_order != Ordering::Equal {
        return core_order;
    }

    match (pre_a, pre_b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(pre_a), Some(pre_b)) => compare_prerelease(pre_a, pre_b),
    }
}

/// Sorts version-bearing items newest first.
pub fn sort_newest_first<T>(items: &mut [T], version: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| compare_versions(version(b), version(a)));
}

/// Splits a version into its numeric core and optional pre-release suffix.
fn split_version(version: &str) -> (&str, Option<&str>) {
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    let version = version.split_once('+').map_or(version, |(v, _build)| v);
    match version.split_once('-') {
        Some((core, pre)) if !pre.is_empty() => (core, Some(pre)),
        Some((core, _)) => (core, None),
        None => (version, None),
    }
}

/// Parses `major.minor.patch`; absent or non-numeric components are `0`.
fn core_components(core: &str) -> [u64; 3] {
    let mut parts = core.split('.');
    std::array::from_fn(|_| {
        parts
            .next()
            .and_then(|part| part.parse::<u64>().ok())
            .unwrap_or(0)
    })
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut ids_a = a.split('.');
    let mut ids_b = b.split('.');
    loop {
        match (ids_a.next(), ids_b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(id_a), Some(id_b)) => {
                let order = compare_identifier(id_a, id_b);
                if order != Ordering::Equal {
                    return order;
                }
            }
        }
    }
}

fn compare_identifier(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_numeric(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.as_bytes().cmp(b.as_bytes()),
    }
}

fn is_numeric(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Integer comparison of digit strings of any length.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
