//! Fuzz target for coordinate parsing.
//!
//! Run with: cargo +nightly fuzz run coordinate_fuzz -- -max_total_time=60

#![no_main]

use honeycomb_core::{CoordId, Coordinate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(coordinate) = Coordinate::parse(input) else {
        // Rejected input must be rejected the same way through CoordId.
        assert!(CoordId::parse(input).is_err());
        return;
    };

    // The canonical id parses back to the same coordinate.
    let id = coordinate.to_id();
    let reparsed = id.coordinate().expect("canonical id must parse");
    assert_eq!(reparsed, coordinate);
    assert_eq!(id.depth(), Some(coordinate.depth()));

    match coordinate.parent() {
        Some(parent) => {
            let direction = coordinate.direction().expect("non-root has a direction");
            assert_eq!(parent.child(direction), coordinate);
            assert!(parent.is_ancestor_of(&coordinate));
            assert_eq!(parent.generation_distance(&coordinate), Some(1));
        }
        None => assert!(coordinate.is_root()),
    }
});
