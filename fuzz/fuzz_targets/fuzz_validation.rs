//! Fuzz testing for sanitization and validation.
//!
//! Checks, for arbitrary product requests, that:
//!
//! - `sanitize` never panics and is idempotent
//! - sanitized output contains no denylisted substring
//! - `validate_product` never panics and reports each field at most once
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use product_ingest::models::ProductRequest;
use product_ingest::validation::{
    DENYLISTED_SUBSTRINGS, sanitize, sanitize_product, validate_product,
};

#[derive(Debug, Arbitrary)]
struct Input {
    name: String,
    price: Option<f64>,
    description: Option<String>,
}

fuzz_target!(|input: Input| {
    let once = sanitize(&input.name);
    assert_eq!(sanitize(&once), once);
    for pattern in DENYLISTED_SUBSTRINGS {
        assert!(!once.contains(pattern));
    }

    let mut request = ProductRequest {
        name: input.name,
        price: input.price,
        description: input.description,
    };
    sanitize_product(&mut request);

    let errors = validate_product(&request);
    for field in ["name", "price", "description"] {
        assert!(errors.iter().filter(|e| e.field == field).count() <= 1);
    }
});
