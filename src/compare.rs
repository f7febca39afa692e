// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Comparison of received values against expected value expressions.

/// Parses `s` as a floating point number, ignoring surrounding whitespace.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

/// Compares a received value against an expected value expression.
///
/// Two numbers compare numerically. An expectation of the form `>N` or `<N`,
/// where `N` is a number, requires the received value to be a number greater
/// or less than `N`. Everything else must match exactly.
pub fn compare(received: &str, expected: &str) -> bool {
    let received_number = parse_number(received);
    if let (Some(r), Some(e)) = (received_number, parse_number(expected)) {
        return r == e;
    }
    if let Some(r) = received_number {
        if let Some(bound) = expected.strip_prefix('>').and_then(parse_number) {
            return r > bound;
        }
        if let Some(bound) = expected.strip_prefix('<').and_then(parse_number) {
            return r < bound;
        }
    }
    received == expected
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn numeric_equality() {
        assert!(compare("1", "1.0"));
        assert!(compare("1e3", "1000"));
        assert!(compare(" 7 ", "7"));
        assert!(!compare("1", "2"));
        assert!(!compare("NaN", "NaN"));
    }

    #[test]
    fn relational() {
        assert!(compare("5", ">3"));
        assert!(!compare("3", ">3"));
        assert!(compare("-1", "<0"));
        assert!(!compare("0", "<0"));
        assert!(compare("1.5", ">1.25"));
    }

    #[test]
    fn string_fallback() {
        assert!(compare("abc", "abc"));
        assert!(!compare("abc", "ABC"));
        // A bare operator is not a numeric bound.
        assert!(compare(">", ">"));
        assert!(!compare("5", ">"));
        // Relational expectations need a numeric receiver.
        assert!(!compare("abc", ">3"));
        assert!(compare(">x", ">x"));
        assert!(!compare("10", ">=3"));
    }

    proptest! {
        #[test]
        fn numbers_compare_as_floats(a in any::<f64>(), b in any::<f64>()) {
            prop_assert_eq!(compare(&a.to_string(), &b.to_string()), a == b);
        }

        #[test]
        fn greater_than(a in -1e9f64..1e9, b in -1e9f64..1e9) {
            prop_assert_eq!(compare(&a.to_string(), &format!(">{b}")), a > b);
        }

        #[test]
        fn less_than(a in -1e9f64..1e9, b in -1e9f64..1e9) {
            prop_assert_eq!(compare(&a.to_string(), &format!("<{b}")), a < b);
        }

        #[test]
        fn non_numeric_is_exact(
            a in "[a-hj-mo-zA-HJ-MO-Z ]{0,8}",
            b in "[<>]?[a-hj-mo-zA-HJ-MO-Z]{1,8}"
        ) {
            prop_assert_eq!(compare(&a, &b), a == b);
        }
    }
}
