//! Total order over package version strings of the form
//! `[epoch:]version[-release]`.
//!
//! Epochs compare as integers, the version and release parts segment-wise:
//! runs of digits compare numerically (leading zeros ignored), runs of
//! letters byte-wise, and a numeric segment always sorts after an
//! alphabetic one. The resolver and the sync planner rely on this order
//! being strict and antisymmetric.

use std::cmp::Ordering;

/// Compare two full version strings.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    let (epoch_a, rest_a) = split_epoch(a);
    let (epoch_b, rest_b) = split_epoch(b);

    match epoch_a.cmp(&epoch_b) {
        Ordering::Equal => {}
        ord => return ord,
    }

    let (ver_a, rel_a) = split_release(rest_a);
    let (ver_b, rel_b) = split_release(rest_b);

    match rpmvercmp(ver_a, ver_b) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // A missing release matches any release.
    match (rel_a, rel_b) {
        (Some(ra), Some(rb)) => rpmvercmp(ra, rb),
        _ => Ordering::Equal,
    }
}

fn split_epoch(version: &str) -> (u64, &str) {
    match version.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
            (epoch.parse().unwrap_or(0), rest)
        }
        _ => (0, version),
    }
}

fn split_release(version: &str) -> (&str, Option<&str>) {
    match version.rsplit_once('-') {
        Some((ver, rel)) => (ver, Some(rel)),
        None => (version, None),
    }
}

/// Segment-wise comparison of a version component.
fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut ia = 0;
    let mut ib = 0;

    while ia < a.len() || ib < b.len() {
        // separators are not significant by themselves
        while ia < a.len() && !a[ia].is_ascii_alphanumeric() {
            ia += 1;
        }
        while ib < b.len() && !b[ib].is_ascii_alphanumeric() {
            ib += 1;
        }
        if ia == a.len() || ib == b.len() {
            break;
        }

        let numeric = a[ia].is_ascii_digit();
        let seg_a = take_run(a, ia, numeric);
        let seg_b = take_run(b, ib, b[ib].is_ascii_digit());

        // the two segments are of different kinds, the numeric one is newer
        if numeric != b[ib].is_ascii_digit() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let na = trim_zeros(seg_a);
            let nb = trim_zeros(seg_b);
            // a longer digit run is a bigger number
            na.len().cmp(&nb.len()).then_with(|| na.cmp(nb))
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }

        ia += seg_a.len();
        ib += seg_b.len();
    }

    // one side ran out of segments. A trailing alphabetic segment never
    // beats an empty remainder (`1.0a` < `1.0` < `1.0.1`).
    let rem_a = a.get(ia..).unwrap_or(b"");
    let rem_b = b.get(ib..).unwrap_or(b"");
    if rem_a.is_empty() && rem_b.is_empty() {
        Ordering::Equal
    } else if (rem_a.is_empty() && !starts_alpha(rem_b)) || starts_alpha(rem_a) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn take_run(s: &[u8], start: usize, numeric: bool) -> &[u8] {
    let mut end = start;
    while end < s.len() {
        let d = s[end].is_ascii_digit();
        let a = s[end].is_ascii_alphabetic();
        if (numeric && !d) || (!numeric && !a) {
            break;
        }
        end += 1;
    }
    &s[start..end]
}

fn trim_zeros(s: &[u8]) -> &[u8] {
    let mut i = 0;
    while i + 1 < s.len() && s[i] == b'0' {
        i += 1;
    }
    &s[i..]
}

fn starts_alpha(s: &[u8]) -> bool {
    s.iter()
        .find(|b| b.is_ascii_alphanumeric())
        .map(|b| b.is_ascii_alphabetic())
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::vercmp;
    use std::cmp::Ordering::{Equal, Greater, Less};

    fn check(a: &str, b: &str, expected: std::cmp::Ordering) {
        assert_eq!(vercmp(a, b), expected, "vercmp({:?}, {:?})", a, b);
        assert_eq!(
            vercmp(b, a),
            expected.reverse(),
            "vercmp({:?}, {:?})",
            b,
            a
        );
    }

    #[test]
    fn test_numeric() {
        check("1.0", "1.0", Equal);
        check("1.0", "2.0", Less);
        check("1.10", "1.9", Greater);
        check("1.01", "1.1", Equal);
        check("1.2", "1.2.1", Less);
    }

    #[test]
    fn test_alpha() {
        check("1.0a", "1.0b", Less);
        check("1.0a", "1.0", Less);
        check("1.0a", "1.0.1", Less);
        check("a", "1", Less);
        check("1.0rc1", "1.0", Less);
    }

    #[test]
    fn test_separators() {
        check("1.0.", "1.0", Equal);
        check("1..0", "1.0", Equal);
        check("1_0", "1.0", Equal);
    }

    #[test]
    fn test_epoch() {
        check("1:1.0", "2.0", Greater);
        check("0:1.0", "1.0", Equal);
        check("2:1.0", "1:2.0", Greater);
    }

    #[test]
    fn test_release() {
        check("1.0-1", "1.0-2", Less);
        check("1.0-1", "1.0", Equal);
        check("1.0-2", "1.1-1", Less);
    }

    #[test]
    fn test_transitive() {
        // spot check a chain: rc < release < point release
        let chain = ["1.0rc2", "1.0", "1.0.1", "1.1", "2:0.1"];
        for w in chain.windows(2) {
            check(w[0], w[1], Less);
        }
        check(chain[0], chain[4], Less);
    }
}
