//! Fingerprint laws: invariance under query permutation, sensitivity to
//! everything that matters.

use granite_coalesce::fingerprint;
use http::Method;
use proptest::prelude::*;
use url::Url;

fn url_with_params(pairs: &[(String, String)]) -> Url {
    Url::parse_with_params("https://api.example.com/resource", pairs).unwrap()
}

fn key_value() -> impl Strategy<Value = (String, String)> {
    ("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,12}").prop_map(|(k, v)| (k, v))
}

proptest! {
    #[test]
    fn invariant_under_query_permutation(
        pairs in prop::collection::vec(key_value(), 0..8),
        body in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut reversed = pairs.clone();
        reversed.reverse();

        let a = fingerprint(&Method::GET, &url_with_params(&pairs), &body);
        let b = fingerprint(&Method::GET, &url_with_params(&reversed), &body);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn shuffled_params_agree(
        pairs in prop::collection::vec(key_value(), 0..8).prop_shuffle(),
    ) {
        let mut sorted = pairs.clone();
        sorted.sort();

        let a = fingerprint(&Method::GET, &url_with_params(&pairs), b"");
        let b = fingerprint(&Method::GET, &url_with_params(&sorted), b"");
        prop_assert_eq!(a, b);
    }

    #[test]
    fn body_changes_change_the_key(
        body_a in prop::collection::vec(any::<u8>(), 0..64),
        body_b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(body_a != body_b);
        let url = url_with_params(&[]);
        let a = fingerprint(&Method::POST, &url, &body_a);
        let b = fingerprint(&Method::POST, &url, &body_b);
        prop_assert_ne!(a, b);
    }

    #[test]
    fn methods_partition_the_keyspace(pairs in prop::collection::vec(key_value(), 0..4)) {
        let url = url_with_params(&pairs);
        let get = fingerprint(&Method::GET, &url, b"");
        let post = fingerprint(&Method::POST, &url, b"");
        prop_assert_ne!(get, post);
    }

    #[test]
    fn fingerprints_are_hex_sha256(pairs in prop::collection::vec(key_value(), 0..4)) {
        let key = fingerprint(&Method::GET, &url_with_params(&pairs), b"");
        prop_assert_eq!(key.len(), 64);
        prop_assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
