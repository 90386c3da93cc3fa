use bloomset::{Filter, FilterConfigBuilder, FilterError, StableBloomFilter};

mod common;
use common::test_utils::{random_items, seeded_rng};

fn create_filter(capacity: u64, fpp: f64, bits_per_bucket: u32) -> StableBloomFilter {
    let config = FilterConfigBuilder::default()
        .capacity(capacity)
        .false_positive_rate(fpp)
        .bits_per_bucket(bits_per_bucket)
        .build()
        .expect("config should build");
    StableBloomFilter::create(config).expect("filter should build")
}

#[test]
fn fpp_stays_bounded_after_heavy_insertion() {
    let filter = create_filter(10_000, 0.01, 8);
    let mut rng = seeded_rng();
    let items = random_items(&mut rng, 60_000);
    let (inserted, disjoint) = items.split_at(10_000);

    for item in inserted {
        assert!(filter.put(item.as_bytes()), "stable put always succeeds");
    }

    let false_positives = disjoint
        .iter()
        .filter(|item| filter.might_contain(item.as_bytes()))
        .count();
    let measured = false_positives as f64 / disjoint.len() as f64;
    println!(
        "measured fpp {measured:.4} over {} disjoint items (stable target 0.01)",
        disjoint.len()
    );
    assert!(
        measured <= 0.02,
        "measured fpp {measured:.4} exceeds the 0.02 bound"
    );
}

#[test]
fn freshly_inserted_item_is_visible() {
    let filter = create_filter(1_000, 0.01, 4);
    let mut rng = seeded_rng();
    for item in random_items(&mut rng, 200) {
        filter.put(item.as_bytes());
        assert!(
            filter.might_contain(item.as_bytes()),
            "an item must be visible immediately after its own put"
        );
    }
}

#[test]
fn expected_fpp_tracks_the_stable_point() {
    let filter = create_filter(10_000, 0.01, 8);
    let predicted = filter.expected_fpp();
    assert!(
        predicted > 0.0 && predicted <= 0.02,
        "stable-point prediction {predicted} should sit near the target rate"
    );
}

#[test]
fn clear_evicts_everything() {
    let filter = create_filter(1_000, 0.01, 8);
    let mut rng = seeded_rng();
    let items = random_items(&mut rng, 100);
    for item in &items {
        filter.put(item.as_bytes());
    }
    filter.clear();
    for item in &items {
        assert!(!filter.might_contain(item.as_bytes()));
    }
}

#[test]
fn remove_is_unsupported() {
    let filter = create_filter(100, 0.01, 8);
    assert!(matches!(
        filter.remove(b"anything"),
        Err(FilterError::Unsupported(_))
    ));
}

#[test]
fn merge_requires_matching_geometry() {
    let a = create_filter(1_000, 0.01, 8);
    let b = create_filter(1_000, 0.01, 8);
    let different = create_filter(2_000, 0.01, 8);

    a.merge_in_place(&b).expect("identical geometry should merge");
    assert!(matches!(
        a.merge_in_place(&different),
        Err(FilterError::IncompatibleMerge(_))
    ));
}

#[test]
fn merged_filter_sees_both_sides() {
    let a = create_filter(2_000, 0.01, 8);
    let b = create_filter(2_000, 0.01, 8);
    let mut rng = seeded_rng();
    let items = random_items(&mut rng, 200);
    let (set_a, set_b) = items.split_at(100);

    for item in set_a {
        a.put(item.as_bytes());
    }
    for item in set_b {
        b.put(item.as_bytes());
    }
    a.merge_in_place(&b).unwrap();

    for item in &items {
        assert!(
            a.might_contain(item.as_bytes()),
            "merged stable filter must see recently saturated buckets from both sides"
        );
    }
}
