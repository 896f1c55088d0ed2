use std::cmp::Ordering;

use crate::error::MergeError;
use crate::site::site_id_cmp;

/// Outcome of the last-writer-wins conflict rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// The last-writer-wins conflict rule. `local_version` is absent when no
/// clock row exists yet for the target cell.
///
/// The rule is asymmetric on purpose: the remote site wins ties (`>=`) when
/// it sorts after the local site, and must strictly exceed the local
/// version (`>`) when it sorts before. This asymmetry is what makes the
/// rule converge: two peers applying each other's writes at equal versions
/// agree on the higher-ordered site without needing to compare histories.
///
/// Known asymmetry, preserved intentionally: this only ever compares the
/// remote site id against the local site id, never against the site id
/// recorded on the existing cell clock. When two different remote sites
/// both write at the same version to the same cell, a third site's
/// decision can depend on arrival order. See DESIGN.md.
pub fn decide(
    remote_site: &[u8],
    remote_version: i64,
    local_version: Option<i64>,
    local_site: &[u8],
) -> Result<Decision, MergeError> {
    let cmp = site_id_cmp(remote_site, local_site);
    if cmp == Ordering::Equal {
        return Err(MergeError::SelfPatch);
    }

    let Some(local_version) = local_version else {
        return Ok(Decision::Accept);
    };

    let accept = match cmp {
        Ordering::Greater => remote_version >= local_version,
        Ordering::Less => remote_version > local_version,
        Ordering::Equal => unreachable!("handled above"),
    };

    Ok(if accept {
        Decision::Accept
    } else {
        Decision::Reject
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_patch_is_rejected_with_error() {
        let err = decide(b"\x01", 5, Some(1), b"\x01").unwrap_err();
        assert!(matches!(err, MergeError::SelfPatch));
    }

    #[test]
    fn no_local_clock_always_accepts() {
        assert_eq!(decide(b"\x02", 1, None, b"\x01").unwrap(), Decision::Accept);
        assert_eq!(decide(b"\x00", 1, None, b"\x01").unwrap(), Decision::Accept);
    }

    #[test]
    fn higher_remote_site_wins_ties() {
        // 0x03 > 0x01 (local), so tie goes to remote.
        assert_eq!(
            decide(b"\x03", 7, Some(7), b"\x01").unwrap(),
            Decision::Accept
        );
    }

    #[test]
    fn lower_remote_site_must_strictly_exceed() {
        // 0x03 < local 0x09, so tie is rejected.
        assert_eq!(
            decide(b"\x03", 7, Some(7), b"\x09").unwrap(),
            Decision::Reject
        );
        assert_eq!(
            decide(b"\x03", 8, Some(7), b"\x09").unwrap(),
            Decision::Accept
        );
    }

    #[test]
    fn lower_version_loses_regardless_of_site() {
        assert_eq!(
            decide(b"\x03", 6, Some(7), b"\x01").unwrap(),
            Decision::Reject
        );
    }
}
