//! Multisig group identity.
//!
//! The identity of a multisig group is the *set* of its pubkeys plus the
//! threshold `m`; redeem-script ordering does not change it. The running
//! fingerprint across inputs decides whether a multisig change output may
//! pass without confirmation.

use coldsign_core::{
    hashes::{DigestWriter, Sha256Writer},
    ser::{write_bytes_prefixed, write_u32_le},
};

use crate::{error::SignError, types::MultisigDescriptor};

/// A stable digest of a multisig group's identity.
pub fn multisig_fingerprint(multisig: &MultisigDescriptor) -> Result<[u8; 32], SignError> {
    let n = multisig.pubkeys.len() as u32;
    if multisig.m == 0 || multisig.m > n || n == 0 || n > 15 {
        return Err(SignError::Data("Invalid multisig parameters"));
    }
    let mut pubkeys = multisig.pubkeys.clone();
    pubkeys.sort();

    let mut h = Sha256Writer::default();
    write_u32_le(&mut h, multisig.m)?;
    write_u32_le(&mut h, n)?;
    for pubkey in &pubkeys {
        write_bytes_prefixed(&mut h, pubkey)?;
    }
    Ok(h.finish())
}

/// The index of `pubkey` in the descriptor's pubkey list, which is also the
/// slot its signature occupies.
pub fn multisig_pubkey_index(
    multisig: &MultisigDescriptor,
    pubkey: &[u8],
) -> Result<usize, SignError> {
    multisig
        .pubkeys
        .iter()
        .position(|candidate| candidate == pubkey)
        .ok_or(SignError::Data("Pubkey not found in multisig script"))
}

/// Running multisig identity across a transaction's inputs.
///
/// Starts empty; the first multisig input records its fingerprint, later
/// inputs must match it, and any non-multisig input (or differing group)
/// sets `mismatch` permanently.
#[derive(Clone, Debug, Default)]
pub struct MultisigFingerprint {
    fingerprint: Option<[u8; 32]>,
    mismatch: bool,
}

impl MultisigFingerprint {
    /// Fold one multisig input into the running identity.
    pub fn add(&mut self, multisig: &MultisigDescriptor) -> Result<(), SignError> {
        let fp = multisig_fingerprint(multisig)?;
        if !self.mismatch && self.fingerprint.is_none() {
            self.fingerprint = Some(fp);
        } else if self.fingerprint != Some(fp) {
            self.mismatch = true;
        }
        Ok(())
    }

    /// Record a non-multisig input.
    pub fn mark_mismatch(&mut self) {
        self.mismatch = true;
    }

    /// Whether the group identity has been poisoned.
    pub fn mismatch(&self) -> bool {
        self.mismatch
    }

    /// True only when no mismatch has been observed and `multisig` carries
    /// the recorded identity.
    pub fn matches(&self, multisig: &MultisigDescriptor) -> Result<bool, SignError> {
        if self.mismatch {
            return Ok(false);
        }
        Ok(self.fingerprint == Some(multisig_fingerprint(multisig)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn group(pubkeys: Vec<Vec<u8>>, m: u32) -> MultisigDescriptor {
        MultisigDescriptor {
            pubkeys,
            m,
            signatures: vec![],
        }
    }

    #[test]
    fn identity_ignores_ordering() {
        let a = group(vec![vec![0x02; 33], vec![0x03; 33]], 2);
        let b = group(vec![vec![0x03; 33], vec![0x02; 33]], 2);
        assert_eq!(
            multisig_fingerprint(&a).unwrap(),
            multisig_fingerprint(&b).unwrap()
        );

        let other_threshold = group(a.pubkeys.clone(), 1);
        assert_ne!(
            multisig_fingerprint(&a).unwrap(),
            multisig_fingerprint(&other_threshold).unwrap()
        );
    }

    #[test]
    fn it_tracks_matching_groups() {
        let a = group(vec![vec![0x02; 33], vec![0x03; 33]], 2);
        let b = group(vec![vec![0x03; 33], vec![0x02; 33]], 2);

        let mut fp = MultisigFingerprint::default();
        fp.add(&a).unwrap();
        fp.add(&b).unwrap();
        assert!(!fp.mismatch());
        assert!(fp.matches(&a).unwrap());
    }

    #[test]
    fn a_single_sig_input_poisons_the_group() {
        let a = group(vec![vec![0x02; 33], vec![0x03; 33]], 2);
        let mut fp = MultisigFingerprint::default();
        fp.add(&a).unwrap();
        fp.mark_mismatch();
        assert!(!fp.matches(&a).unwrap());
    }

    #[test]
    fn differing_groups_poison_permanently() {
        let a = group(vec![vec![0x02; 33], vec![0x03; 33]], 2);
        let c = group(vec![vec![0x02; 33], vec![0x04; 33]], 2);
        let mut fp = MultisigFingerprint::default();
        fp.add(&a).unwrap();
        fp.add(&c).unwrap();
        assert!(fp.mismatch());
        assert!(!fp.matches(&a).unwrap());
        assert!(!fp.matches(&c).unwrap());
    }
}
