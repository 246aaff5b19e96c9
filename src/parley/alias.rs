//! Deterministic display-name generation for agent slots.
//!
//! Models are never shown the internal slot letters. Instead each (slot,
//! persona) pair maps to a stable two-token name: a first name drawn from a
//! pool fixed per slot letter (slots A and C share one pool, slot B draws
//! from a disjoint one) and a surname from a pool shared by everyone. The
//! mapping is a pure function of its inputs: the pair is hashed with SHA-256
//! and two independent slices of the digest index the pools, so the same pair
//! yields the same name across calls, sessions, and process restarts.

use sha2::{Digest, Sha256};

use crate::parley::message::Slot;

/// First names for slots A and C.
const FIRST_NAMES_AC: [&str; 20] = [
    "Clara", "Maya", "Elena", "Sofia", "Iris", "Nora", "Lena", "Ada", "Vera", "Thea", "Alice",
    "Diana", "Freya", "Greta", "Ines", "Julia", "Livia", "Mira", "Paula", "Rosa",
];

/// First names for slot B, disjoint from the A/C pool.
const FIRST_NAMES_B: [&str; 20] = [
    "Marco", "Felix", "Oscar", "Henry", "Leo", "Victor", "Arthur", "Bruno", "Caleb", "Dario",
    "Elias", "Gustav", "Hugo", "Ivan", "Jonas", "Lars", "Milo", "Nils", "Pablo", "Simon",
];

/// Surnames shared across all slots.
const SURNAMES: [&str; 24] = [
    "Halden", "Mercer", "Voss", "Calloway", "Ibarra", "Lindqvist", "Okafor", "Reyes", "Sato",
    "Thornton", "Ullman", "Varga", "Whitaker", "Yates", "Zeller", "Ashford", "Bergmann", "Castel",
    "Donovan", "Eriksen", "Falk", "Grayson", "Hoffman", "Kessler",
];

/// Map a (slot, persona) pair to its stable two-token display name.
///
/// Pure and context-free: no randomness, no external state, identical inputs
/// always yield an identical name.
pub fn alias(slot: Slot, persona_id: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}", slot.letter(), persona_id).as_bytes());

    // Two independent 8-byte slices of the digest pick the pool entries.
    let mut first_bytes = [0u8; 8];
    first_bytes.copy_from_slice(&digest[0..8]);
    let mut surname_bytes = [0u8; 8];
    surname_bytes.copy_from_slice(&digest[8..16]);
    let first_index = u64::from_be_bytes(first_bytes) as usize;
    let surname_index = u64::from_be_bytes(surname_bytes) as usize;

    let first = match slot {
        Slot::A | Slot::C => FIRST_NAMES_AC[first_index % FIRST_NAMES_AC.len()],
        Slot::B => FIRST_NAMES_B[first_index % FIRST_NAMES_B.len()],
    };
    let surname = SURNAMES[surname_index % SURNAMES.len()];

    format!("{} {}", first, surname)
}
