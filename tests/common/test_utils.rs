use std::collections::HashSet;

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed seed so every scenario is reproducible.
pub const SEED: u64 = 37;

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

/// One random alphanumeric string of random length 1..=32.
pub fn random_item(rng: &mut StdRng) -> String {
    let len = rng.gen_range(1..=32);
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// `count` distinct non-empty random alphanumeric strings.
pub fn random_items(rng: &mut StdRng, count: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut items = Vec::with_capacity(count);
    while items.len() < count {
        let item = random_item(rng);
        if seen.insert(item.clone()) {
            items.push(item);
        }
    }
    items
}
