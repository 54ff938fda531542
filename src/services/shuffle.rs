//! Seeded answer-choice permutations.
//!
//! A permutation is recoverable from its seed alone: the same
//! `(learner, question, counter)` always yields the same display order, so a
//! reviewed question can be redisplayed without storing anything. When the
//! permutation is also persisted on the attempt, the stored copy is the audit
//! record and a recomputation must reproduce it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

/// Answer choice counts the engine displays. A single choice is accepted and
/// always comes back as the identity.
pub const SUPPORTED_CHOICE_COUNTS: [usize; 3] = [1, 4, 5];

const SEED_SEPARATOR: u8 = 0x1f;

/// Display order of a question's choices: `self[display_idx] == canonical_idx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct ChoicePermutation(Vec<usize>);

impl ChoicePermutation {
    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    pub fn from_vec(order: Vec<usize>) -> EngineResult<Self> {
        check_choice_count(order.len())?;
        let mut seen = vec![false; order.len()];
        for &idx in &order {
            match seen.get_mut(idx) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(EngineError::invalid(format!("choice {idx} appears twice in {order:?}"))),
                None => return Err(EngineError::invalid(format!("choice {idx} out of range in {order:?}"))),
            }
        }
        Ok(Self(order))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(pos, idx)| pos == *idx)
    }

    /// Canonical choice shown at `display_idx`.
    pub fn canonical(&self, display_idx: usize) -> Option<usize> {
        self.0.get(display_idx).copied()
    }

    /// Display position of `canonical_idx`.
    pub fn display_of(&self, canonical_idx: usize) -> Option<usize> {
        self.0.iter().position(|idx| *idx == canonical_idx)
    }

    /// Reorders canonical choices into display order.
    pub fn apply<T: Clone>(&self, canonical: &[T]) -> EngineResult<Vec<T>> {
        if canonical.len() != self.0.len() {
            return Err(EngineError::invalid(format!(
                "permutation covers {} choices, question has {}",
                self.0.len(),
                canonical.len()
            )));
        }
        Ok(self.0.iter().map(|idx| canonical[*idx].clone()).collect())
    }
}

impl TryFrom<Vec<usize>> for ChoicePermutation {
    type Error = EngineError;

    fn try_from(order: Vec<usize>) -> Result<Self, Self::Error> {
        Self::from_vec(order)
    }
}

impl From<ChoicePermutation> for Vec<usize> {
    fn from(perm: ChoicePermutation) -> Self {
        perm.0
    }
}

/// Seed bytes for one display of a question to a learner. `counter` changes
/// the order between displays (e.g. the attempt number).
pub fn shuffle_seed(learner_id: &str, question_id: &str, counter: u32) -> Vec<u8> {
    let mut seed = Vec::with_capacity(learner_id.len() + question_id.len() + 12);
    seed.extend_from_slice(learner_id.as_bytes());
    seed.push(SEED_SEPARATOR);
    seed.extend_from_slice(question_id.as_bytes());
    seed.push(SEED_SEPARATOR);
    seed.extend_from_slice(counter.to_string().as_bytes());
    seed
}

/// Deterministic permutation of `0..n` for an opaque seed.
pub fn shuffle(seed: &[u8], n: usize) -> EngineResult<ChoicePermutation> {
    if seed.is_empty() {
        return Err(EngineError::invalid("shuffle seed must not be empty"));
    }
    check_choice_count(n)?;

    let mut order: Vec<usize> = (0..n).collect();
    fisher_yates(&mut rng_for(seed), &mut order);
    Ok(ChoicePermutation(order))
}

/// Same generator applied to an arbitrary list, used for question order within a session.
pub fn shuffle_items<T>(seed: &[u8], items: &mut [T]) {
    fisher_yates(&mut rng_for(seed), items);
}

/// Recomputes the permutation from `seed` and checks it against the persisted one.
pub fn verify_permutation(persisted: &ChoicePermutation, seed: &[u8]) -> EngineResult<()> {
    let recomputed = shuffle(seed, persisted.len())?;
    if &recomputed != persisted {
        return Err(EngineError::invalid(format!(
            "persisted choice order {:?} does not match seeded order {:?}",
            persisted.as_slice(),
            recomputed.as_slice()
        )));
    }
    Ok(())
}

/// A selection is correct when the display position maps back to the canonical answer.
pub fn grade(permutation: &ChoicePermutation, correct_idx: usize, selected: Option<usize>) -> bool {
    selected
        .and_then(|display| permutation.canonical(display))
        .is_some_and(|canonical| canonical == correct_idx)
}

fn check_choice_count(n: usize) -> EngineResult<()> {
    if SUPPORTED_CHOICE_COUNTS.contains(&n) {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "choice count must be 4 or 5, got {n}"
        )))
    }
}

fn rng_for(seed: &[u8]) -> ChaCha8Rng {
    let digest = Sha256::digest(seed);
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    ChaCha8Rng::from_seed(key)
}

fn fisher_yates<T>(rng: &mut ChaCha8Rng, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = (rng.gen::<f64>() * (i + 1) as f64).floor() as usize;
        items.swap(i, j.min(i));
    }
}
