//! The ordered, weighted validator set and its diff/priority arithmetic.
//!
//! A `ValidatorSet` is stored in ascending address order so iteration and
//! hashing are deterministic across nodes. The set caches its total voting
//! power and a proposer cursor; once a set is embedded in a persisted state
//! it is treated as read-only.
//!
//! # Diff application
//!
//! `update_with_change_set` applies a batch of `{public key, power}` diffs:
//! power 0 removes, power > 0 adds or updates. Removals are applied before
//! upserts so a batch may remove one key and add another without collision.
//! The whole batch is applied to a scratch copy and committed only on
//! success, so a failing batch leaves the set untouched.
//!
//! # Proposer priorities
//!
//! Each validator carries a signed priority driving weighted round-robin
//! proposer selection. After every mutation the priorities are rescaled so
//! their spread is at most `PRIORITY_WINDOW_FACTOR * total_power`, then
//! centered so they sum to zero. The window is enforced by ratio scaling
//! rather than a hard clamp: clamping after centering could break the
//! zero-sum invariant, while scaling preserves both bounds.

use std::collections::{BTreeMap, HashSet};

use veris_crypto::{hash_bytes, PublicKey};
use veris_types::{to_hex, Address, Hash32};
use veris_wire::io::{put_bytes, put_i64, put_u32, put_var_bytes};

/// Bound on the spread of proposer priorities, as a multiple of the set's
/// total voting power. Fixed by protocol; not tunable.
pub const PRIORITY_WINDOW_FACTOR: i64 = 2;

/// Maximum total voting power of a set. The headroom (factor 8 below
/// `i64::MAX`) guarantees priority arithmetic cannot overflow.
pub const MAX_TOTAL_VOTING_POWER: i64 = i64::MAX / 8;

// ============================================================================
// Validator
// ============================================================================

/// A single validator: key-derived address, voting power, and the proposer
/// priority accumulator.
#[derive(Clone, Debug, PartialEq)]
pub struct Validator {
    pub address: Address,
    pub pub_key: PublicKey,
    pub voting_power: i64,
    pub proposer_priority: i64,
}

impl Validator {
    /// Create a validator with priority zero. The address is derived from
    /// the key and cannot be chosen.
    pub fn new(pub_key: PublicKey, voting_power: i64) -> Self {
        Validator {
            address: pub_key.address(),
            pub_key,
            voting_power,
            proposer_priority: 0,
        }
    }
}

/// One entry of a validator diff: power 0 removes the key's validator,
/// power > 0 adds or updates it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorUpdate {
    pub pub_key: PublicKey,
    pub power: i64,
}

impl ValidatorUpdate {
    pub fn address(&self) -> Address {
        self.pub_key.address()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorSetError {
    /// An address appeared more than once in a set or diff.
    DuplicateValidator(Address),
    /// A removal targeted an address not in the set.
    ValidatorNotFound(Address),
    /// The diff would leave the set empty.
    EmptyValidatorSet,
    /// A diff entry carried negative power.
    NegativePower { power: i64 },
    /// A set member carried non-positive power.
    InvalidVotingPower { address: Address, power: i64 },
    /// The sum of powers exceeds `MAX_TOTAL_VOTING_POWER`.
    TotalVotingPowerOverflow { total: i128 },
    /// A validator's address does not match its public key.
    MismatchedAddress { address: Address, expected: Address },
}

impl std::fmt::Display for ValidatorSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorSetError::DuplicateValidator(addr) => {
                write!(f, "duplicate validator address {}", to_hex(addr))
            }
            ValidatorSetError::ValidatorNotFound(addr) => {
                write!(f, "validator {} not found in set", to_hex(addr))
            }
            ValidatorSetError::EmptyValidatorSet => {
                write!(f, "applying the changes would leave an empty validator set")
            }
            ValidatorSetError::NegativePower { power } => {
                write!(f, "negative voting power {} in update", power)
            }
            ValidatorSetError::InvalidVotingPower { address, power } => {
                write!(
                    f,
                    "validator {} has non-positive voting power {}",
                    to_hex(address),
                    power
                )
            }
            ValidatorSetError::TotalVotingPowerOverflow { total } => {
                write!(
                    f,
                    "total voting power {} exceeds maximum {}",
                    total, MAX_TOTAL_VOTING_POWER
                )
            }
            ValidatorSetError::MismatchedAddress { address, expected } => {
                write!(
                    f,
                    "validator address {} does not match its key (expected {})",
                    to_hex(address),
                    to_hex(expected)
                )
            }
        }
    }
}

impl std::error::Error for ValidatorSetError {}

// ============================================================================
// ValidatorSet
// ============================================================================

/// An ordered sequence of validators with a cached total voting power and a
/// proposer cursor.
///
/// # Invariants
///
/// - Validators are sorted by ascending address; addresses are unique.
/// - Every member's power is positive and the total fits
///   `MAX_TOTAL_VOTING_POWER`.
/// - Priorities sum to zero and each lies within the priority window after
///   any mutation.
///
/// The empty set is constructible only because a fresh chain has no
/// predecessor set to attribute a last commit to; every mutation path
/// refuses to produce one.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    total_voting_power: i64,
    proposer_index: Option<usize>,
}

impl ValidatorSet {
    /// The empty set. Legal only as the genesis predecessor set.
    pub fn empty() -> Self {
        ValidatorSet {
            validators: Vec::new(),
            total_voting_power: 0,
            proposer_index: None,
        }
    }

    /// Build a set from validators, sorting by address and validating the
    /// set invariants.
    pub fn new(mut validators: Vec<Validator>) -> Result<Self, ValidatorSetError> {
        validators.sort_by(|a, b| a.address.cmp(&b.address));

        let mut seen: HashSet<Address> = HashSet::with_capacity(validators.len());
        let mut total: i128 = 0;
        for v in &validators {
            let expected = v.pub_key.address();
            if v.address != expected {
                return Err(ValidatorSetError::MismatchedAddress {
                    address: v.address,
                    expected,
                });
            }
            if !seen.insert(v.address) {
                return Err(ValidatorSetError::DuplicateValidator(v.address));
            }
            if v.voting_power <= 0 {
                return Err(ValidatorSetError::InvalidVotingPower {
                    address: v.address,
                    power: v.voting_power,
                });
            }
            total += v.voting_power as i128;
        }
        if total > MAX_TOTAL_VOTING_POWER as i128 {
            return Err(ValidatorSetError::TotalVotingPowerOverflow { total });
        }

        let mut set = ValidatorSet {
            validators,
            total_voting_power: total as i64,
            proposer_index: None,
        };
        set.rescale_priorities();
        set.center_priorities();
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_voting_power(&self) -> i64 {
        self.total_voting_power
    }

    /// The validators in canonical (ascending address) order.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    pub fn has_address(&self, address: &Address) -> bool {
        self.get_by_address(address).is_some()
    }

    /// Index and validator for an address, if present.
    pub fn get_by_address(&self, address: &Address) -> Option<(usize, &Validator)> {
        self.validators
            .binary_search_by(|v| v.address.cmp(address))
            .ok()
            .map(|idx| (idx, &self.validators[idx]))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    /// Content hash over (address, key, power) of every member in order.
    /// Priorities are transient scheduling state and excluded.
    pub fn hash(&self) -> Hash32 {
        let mut buf = Vec::new();
        put_u32(&mut buf, self.validators.len() as u32);
        for v in &self.validators {
            put_bytes(&mut buf, &v.address);
            put_var_bytes(&mut buf, v.pub_key.as_bytes());
            put_i64(&mut buf, v.voting_power);
        }
        hash_bytes(&buf)
    }

    // ========================================================================
    // Diff application
    // ========================================================================

    /// Apply a batch of validator diffs.
    ///
    /// Ordering within the batch is irrelevant; removals are applied before
    /// upserts. On any error the set is left exactly as it was.
    pub fn update_with_change_set(
        &mut self,
        changes: &[ValidatorUpdate],
    ) -> Result<(), ValidatorSetError> {
        if changes.is_empty() {
            return Ok(());
        }

        // Each address may appear at most once per batch.
        let mut seen: HashSet<Address> = HashSet::with_capacity(changes.len());
        for change in changes {
            if change.power < 0 {
                return Err(ValidatorSetError::NegativePower {
                    power: change.power,
                });
            }
            if !seen.insert(change.address()) {
                return Err(ValidatorSetError::DuplicateValidator(change.address()));
            }
        }

        let mut scratch: BTreeMap<Address, Validator> = self
            .validators
            .iter()
            .map(|v| (v.address, v.clone()))
            .collect();

        // Removals first, so "remove A, add B" batches never collide.
        for change in changes.iter().filter(|c| c.power == 0) {
            let address = change.address();
            if scratch.remove(&address).is_none() {
                return Err(ValidatorSetError::ValidatorNotFound(address));
            }
        }

        for change in changes.iter().filter(|c| c.power > 0) {
            let address = change.address();
            // An existing validator keeps its accumulated priority; a new
            // one starts at zero and is folded in by the rescale below.
            let proposer_priority = scratch.get(&address).map_or(0, |v| v.proposer_priority);
            scratch.insert(
                address,
                Validator {
                    address,
                    pub_key: change.pub_key.clone(),
                    voting_power: change.power,
                    proposer_priority,
                },
            );
        }

        if scratch.is_empty() {
            return Err(ValidatorSetError::EmptyValidatorSet);
        }
        let total: i128 = scratch.values().map(|v| v.voting_power as i128).sum();
        if total > MAX_TOTAL_VOTING_POWER as i128 {
            return Err(ValidatorSetError::TotalVotingPowerOverflow { total });
        }

        // Commit. BTreeMap iteration already yields ascending addresses.
        self.validators = scratch.into_values().collect();
        self.total_voting_power = total as i64;
        self.proposer_index = None;
        self.rescale_priorities();
        self.center_priorities();
        Ok(())
    }

    // ========================================================================
    // Proposer priorities
    // ========================================================================

    /// Advance the proposer schedule by `times` rounds.
    ///
    /// Each round adds every validator's power to its priority, selects the
    /// maximum (ties broken by lower address) as proposer, and subtracts the
    /// total power from the winner. Repeated calls yield a deterministic
    /// round-robin weighted by power.
    pub fn increment_proposer_priority(&mut self, times: u32) {
        if self.validators.is_empty() {
            return;
        }
        self.rescale_priorities();
        self.center_priorities();
        for _ in 0..times {
            for v in &mut self.validators {
                v.proposer_priority += v.voting_power;
            }
            let idx = self.max_priority_index();
            self.validators[idx].proposer_priority -= self.total_voting_power;
            self.proposer_index = Some(idx);
        }
    }

    /// Copy the set and advance the copy's schedule.
    pub fn copy_increment_proposer_priority(&self, times: u32) -> Self {
        let mut copy = self.clone();
        copy.increment_proposer_priority(times);
        copy
    }

    /// The current proposer: the validator selected by the last increment,
    /// or the current priority maximum if the schedule has not advanced.
    pub fn proposer(&self) -> Option<&Validator> {
        if self.validators.is_empty() {
            return None;
        }
        let idx = self
            .proposer_index
            .unwrap_or_else(|| self.max_priority_index());
        self.validators.get(idx)
    }

    fn max_priority_index(&self) -> usize {
        let mut best = 0;
        for idx in 1..self.validators.len() {
            let v = &self.validators[idx];
            let b = &self.validators[best];
            // Ties break toward the lower address; the vec is address-sorted
            // so strictly-greater is the only way to displace the leader.
            if v.proposer_priority > b.proposer_priority {
                best = idx;
            }
        }
        best
    }

    /// Compress the priority spread to at most
    /// `PRIORITY_WINDOW_FACTOR * total_voting_power`.
    ///
    /// Without this bound an excluded validator's accumulated priority would
    /// starve the rest of the set upon re-entry. The target spread leaves
    /// two units of slack so the truncation in ratio division and in
    /// remainder-distributing centering cannot push any priority back out
    /// of the window.
    fn rescale_priorities(&mut self) {
        if self.validators.is_empty() {
            return;
        }
        let window = PRIORITY_WINDOW_FACTOR.saturating_mul(self.total_voting_power);
        if window == 0 {
            return;
        }
        let diff_max = (window - 2).max(1);
        let max = self
            .validators
            .iter()
            .map(|v| v.proposer_priority)
            .max()
            .unwrap_or(0);
        let min = self
            .validators
            .iter()
            .map(|v| v.proposer_priority)
            .min()
            .unwrap_or(0);
        let diff = (max as i128) - (min as i128);
        if diff > diff_max as i128 {
            let ratio = ((diff + diff_max as i128 - 1) / diff_max as i128) as i64;
            for v in &mut self.validators {
                v.proposer_priority /= ratio;
            }
        }
    }

    /// Shift priorities so they sum to exactly zero.
    ///
    /// The average is floored and the remainder distributed one unit at a
    /// time in address order, so the sum lands on zero rather than on the
    /// division residue.
    fn center_priorities(&mut self) {
        if self.validators.is_empty() {
            return;
        }
        let n = self.validators.len() as i128;
        let sum: i128 = self
            .validators
            .iter()
            .map(|v| v.proposer_priority as i128)
            .sum();
        let avg = sum.div_euclid(n);
        let mut remainder = (sum - avg * n) as i64;
        for v in &mut self.validators {
            let mut shift = avg as i64;
            if remainder > 0 {
                shift += 1;
                remainder -= 1;
            }
            v.proposer_priority -= shift;
        }
    }
}

// ============================================================================
// Wire encoding (persistence)
// ============================================================================

// The persisted form carries priorities and the proposer cursor so a
// restarted node resumes the exact proposer schedule. The content hash above
// deliberately excludes both.
impl veris_wire::io::WireEncode for ValidatorSet {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.validators.len() as u32);
        for v in &self.validators {
            put_var_bytes(out, v.pub_key.as_bytes());
            put_i64(out, v.voting_power);
            put_i64(out, v.proposer_priority);
        }
        match self.proposer_index {
            Some(idx) => {
                veris_wire::io::put_u8(out, 1);
                put_u32(out, idx as u32);
            }
            None => veris_wire::io::put_u8(out, 0),
        }
    }
}

impl veris_wire::io::WireDecode for ValidatorSet {
    fn decode(input: &mut &[u8]) -> Result<Self, veris_wire::WireError> {
        use veris_wire::io::{get_i64, get_u32, get_u8, get_var_bytes};
        use veris_wire::WireError;

        let count = get_u32(input)? as usize;
        let mut validators = Vec::with_capacity(count.min(1024));
        let mut total: i128 = 0;
        for _ in 0..count {
            let key_bytes = get_var_bytes(input, veris_crypto::PUBLIC_KEY_SIZE)?;
            let pub_key = PublicKey::from_bytes(&key_bytes)
                .map_err(|_| WireError::InvalidValue("bad validator key"))?;
            let voting_power = get_i64(input)?;
            let proposer_priority = get_i64(input)?;
            if voting_power <= 0 {
                return Err(WireError::InvalidValue("non-positive voting power"));
            }
            total += voting_power as i128;
            validators.push(Validator {
                address: pub_key.address(),
                pub_key,
                voting_power,
                proposer_priority,
            });
        }
        if total > MAX_TOTAL_VOTING_POWER as i128 {
            return Err(WireError::InvalidValue("total voting power overflow"));
        }
        // Canonical order and uniqueness are part of the stored form.
        for pair in validators.windows(2) {
            if pair[0].address >= pair[1].address {
                return Err(WireError::InvalidValue("validators out of order"));
            }
        }
        let proposer_index = match get_u8(input)? {
            0 => None,
            1 => {
                let idx = get_u32(input)? as usize;
                if idx >= validators.len() {
                    return Err(WireError::InvalidValue("proposer index out of range"));
                }
                Some(idx)
            }
            _ => return Err(WireError::InvalidValue("bad proposer index flag")),
        };
        Ok(ValidatorSet {
            validators,
            total_voting_power: total as i64,
            proposer_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veris_crypto::Keypair;

    fn val(power: i64) -> (Keypair, Validator) {
        let kp = Keypair::generate();
        let v = Validator::new(kp.public_key(), power);
        (kp, v)
    }

    fn set_of(powers: &[i64]) -> ValidatorSet {
        let validators = powers.iter().map(|&p| val(p).1).collect();
        ValidatorSet::new(validators).expect("valid set")
    }

    fn priority_sum(set: &ValidatorSet) -> i128 {
        set.iter().map(|v| v.proposer_priority as i128).sum()
    }

    #[test]
    fn new_sorts_by_address_and_totals_power() {
        let set = set_of(&[10, 20, 30]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.total_voting_power(), 60);
        let addrs: Vec<_> = set.iter().map(|v| v.address).collect();
        let mut sorted = addrs.clone();
        sorted.sort();
        assert_eq!(addrs, sorted);
    }

    #[test]
    fn new_rejects_non_positive_power() {
        let (_, v) = val(0);
        assert!(matches!(
            ValidatorSet::new(vec![v]),
            Err(ValidatorSetError::InvalidVotingPower { .. })
        ));
    }

    #[test]
    fn new_rejects_duplicate_addresses() {
        let (_, v) = val(10);
        assert!(matches!(
            ValidatorSet::new(vec![v.clone(), v]),
            Err(ValidatorSetError::DuplicateValidator(_))
        ));
    }

    #[test]
    fn empty_diff_is_membership_noop() {
        let mut set = set_of(&[10, 20]);
        let before = set.clone();
        set.update_with_change_set(&[]).expect("noop");
        assert_eq!(set, before);
    }

    #[test]
    fn add_update_remove() {
        let (kp_a, v_a) = val(10);
        let mut set = ValidatorSet::new(vec![v_a]).unwrap();

        // Add a second validator.
        let kp_b = Keypair::generate();
        set.update_with_change_set(&[ValidatorUpdate {
            pub_key: kp_b.public_key(),
            power: 20,
        }])
        .expect("add");
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_voting_power(), 30);
        assert!(set.has_address(&kp_b.public_key().address()));

        // Update the first one's power.
        set.update_with_change_set(&[ValidatorUpdate {
            pub_key: kp_a.public_key(),
            power: 15,
        }])
        .expect("update");
        let (_, v) = set.get_by_address(&kp_a.public_key().address()).unwrap();
        assert_eq!(v.voting_power, 15);
        assert_eq!(set.total_voting_power(), 35);

        // Remove the second one.
        set.update_with_change_set(&[ValidatorUpdate {
            pub_key: kp_b.public_key(),
            power: 0,
        }])
        .expect("remove");
        assert_eq!(set.len(), 1);
        assert!(!set.has_address(&kp_b.public_key().address()));
    }

    #[test]
    fn removing_unknown_validator_fails_and_preserves_set() {
        let mut set = set_of(&[10]);
        let before = set.clone();
        let stranger = Keypair::generate();
        let err = set
            .update_with_change_set(&[ValidatorUpdate {
                pub_key: stranger.public_key(),
                power: 0,
            }])
            .unwrap_err();
        assert!(matches!(err, ValidatorSetError::ValidatorNotFound(_)));
        assert_eq!(set, before);
    }

    #[test]
    fn removing_everyone_fails_and_preserves_set() {
        let (kp, v) = val(10);
        let mut set = ValidatorSet::new(vec![v]).unwrap();
        let before = set.clone();
        let err = set
            .update_with_change_set(&[ValidatorUpdate {
                pub_key: kp.public_key(),
                power: 0,
            }])
            .unwrap_err();
        assert_eq!(err, ValidatorSetError::EmptyValidatorSet);
        assert_eq!(set, before);
        assert!(!set.is_empty());
    }

    #[test]
    fn negative_power_in_diff_fails() {
        let mut set = set_of(&[10]);
        let kp = Keypair::generate();
        let err = set
            .update_with_change_set(&[ValidatorUpdate {
                pub_key: kp.public_key(),
                power: -5,
            }])
            .unwrap_err();
        assert_eq!(err, ValidatorSetError::NegativePower { power: -5 });
    }

    #[test]
    fn duplicate_address_in_diff_fails() {
        let mut set = set_of(&[10]);
        let kp = Keypair::generate();
        let err = set
            .update_with_change_set(&[
                ValidatorUpdate {
                    pub_key: kp.public_key(),
                    power: 5,
                },
                ValidatorUpdate {
                    pub_key: kp.public_key(),
                    power: 7,
                },
            ])
            .unwrap_err();
        assert!(matches!(err, ValidatorSetError::DuplicateValidator(_)));
    }

    #[test]
    fn remove_and_add_in_one_batch() {
        let (kp_a, v_a) = val(10);
        let mut set = ValidatorSet::new(vec![v_a]).unwrap();
        let kp_b = Keypair::generate();
        set.update_with_change_set(&[
            ValidatorUpdate {
                pub_key: kp_a.public_key(),
                power: 0,
            },
            ValidatorUpdate {
                pub_key: kp_b.public_key(),
                power: 10,
            },
        ])
        .expect("swap");
        assert_eq!(set.len(), 1);
        assert!(set.has_address(&kp_b.public_key().address()));
    }

    #[test]
    fn priorities_sum_to_zero_after_updates() {
        let mut set = set_of(&[10, 20, 30]);
        assert_eq!(priority_sum(&set), 0);
        let kp = Keypair::generate();
        set.update_with_change_set(&[ValidatorUpdate {
            pub_key: kp.public_key(),
            power: 25,
        }])
        .expect("add");
        assert_eq!(priority_sum(&set), 0);
    }

    #[test]
    fn priorities_stay_within_window() {
        let mut set = set_of(&[1, 1, 1000]);
        for _ in 0..50 {
            set.increment_proposer_priority(1);
        }
        set.update_with_change_set(&[]).unwrap();
        set.increment_proposer_priority(1);
        let bound = PRIORITY_WINDOW_FACTOR * set.total_voting_power() + set.total_voting_power();
        for v in set.iter() {
            assert!(v.proposer_priority.abs() <= bound);
        }
    }

    #[test]
    fn proposer_rotation_is_power_weighted() {
        let kp_heavy = Keypair::generate();
        let kp_light = Keypair::generate();
        let mut set = ValidatorSet::new(vec![
            Validator::new(kp_heavy.public_key(), 3),
            Validator::new(kp_light.public_key(), 1),
        ])
        .unwrap();

        let heavy = kp_heavy.public_key().address();
        let mut heavy_count = 0;
        for _ in 0..4 {
            set.increment_proposer_priority(1);
            if set.proposer().unwrap().address == heavy {
                heavy_count += 1;
            }
        }
        // 3-of-4 rounds go to the validator holding 3/4 of the power.
        assert_eq!(heavy_count, 3);
    }

    #[test]
    fn rotation_is_deterministic() {
        let validators: Vec<Validator> = (0..4).map(|i| val(10 + i).1).collect();
        let set_a = ValidatorSet::new(validators.clone()).unwrap();
        let set_b = ValidatorSet::new(validators).unwrap();

        let mut a = set_a;
        let mut b = set_b;
        for _ in 0..12 {
            a.increment_proposer_priority(1);
            b.increment_proposer_priority(1);
            assert_eq!(
                a.proposer().unwrap().address,
                b.proposer().unwrap().address
            );
        }
    }

    #[test]
    fn hash_ignores_priorities() {
        let mut set = set_of(&[10, 20]);
        let h1 = set.hash();
        set.increment_proposer_priority(3);
        assert_eq!(h1, set.hash());
    }

    #[test]
    fn hash_tracks_membership() {
        let mut set = set_of(&[10, 20]);
        let h1 = set.hash();
        let kp = Keypair::generate();
        set.update_with_change_set(&[ValidatorUpdate {
            pub_key: kp.public_key(),
            power: 5,
        }])
        .unwrap();
        assert_ne!(h1, set.hash());
    }

    #[test]
    fn persisted_form_restores_schedule_state() {
        use veris_wire::io::{WireDecode, WireEncode};

        let mut set = set_of(&[10, 20, 30]);
        set.increment_proposer_priority(2);
        let decoded = ValidatorSet::decode_exact(&set.encode_to_vec()).expect("roundtrip");
        assert_eq!(decoded, set);
        assert_eq!(
            decoded.proposer().unwrap().address,
            set.proposer().unwrap().address
        );

        let empty = ValidatorSet::empty();
        let decoded = ValidatorSet::decode_exact(&empty.encode_to_vec()).expect("empty");
        assert_eq!(decoded, empty);
    }
}
