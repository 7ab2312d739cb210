use obograph_obo::{strip_comment, IdentifierNormalizer, PrefixMap, OBO_PURL_BASE};
use proptest::prelude::*;

fn prefix() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z][A-Za-z0-9_.-]{0,8}")
        .unwrap()
        .prop_filter("values starting with http are URIs", |p| !p.starts_with("http"))
}

/// Normalizer that knows `p`, so a `_` inside it is not taken as the split.
fn knowing(prefixes: PrefixMap, p: &str) -> IdentifierNormalizer {
    IdentifierNormalizer::new(OBO_PURL_BASE, prefixes.with_known_prefix(p))
}

fn local() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9_.:-]{1,12}").unwrap()
}

proptest! {
    #[test]
    fn normalize_then_shorten_round_trips(p in prefix(), l in local()) {
        let normalizer = knowing(PrefixMap::empty(), &p);
        let raw = format!("{p}:{l}");
        let id = normalizer.normalize(&raw).unwrap();

        let expected_suffix = format!("{p}_{l}");
        prop_assert!(id.uri().ends_with(&expected_suffix));
        prop_assert_eq!(normalizer.shorten(id.uri()), raw);
    }

    #[test]
    fn round_trip_holds_through_legacy_remap(l in local()) {
        let normalizer = IdentifierNormalizer::default();
        let raw = format!("ncbi:{l}");
        let id = normalizer.normalize(&raw).unwrap();

        let expected_suffix = format!("NCBITaxon_{l}");
        prop_assert!(id.uri().ends_with(&expected_suffix));
        prop_assert_eq!(normalizer.shorten(id.uri()), raw);
    }

    #[test]
    fn uri_round_trip_is_exact_for_any_prefix(p in prefix(), l in local()) {
        let normalizer = knowing(PrefixMap::default(), &p);
        let id = normalizer.normalize(&format!("{p}:{l}")).unwrap();
        let again = normalizer.normalize(&normalizer.shorten(id.uri())).unwrap();
        prop_assert_eq!(again.uri(), id.uri());
    }

    #[test]
    fn illegal_characters_are_rejected(
        p in prefix(),
        l in local(),
        bad in prop::sample::select(vec!['<', '>', '"', '{', '}', '|', '\\', '^', '`']),
    ) {
        let normalizer = IdentifierNormalizer::default();
        let raw = format!("{p}:{l}{bad}");
        prop_assert!(normalizer.normalize(&raw).is_err());
    }

    #[test]
    fn quoted_bang_is_never_a_comment(body in "[a-z !]{0,20}", tail in "[a-z ]{0,10}") {
        let line = format!("synonym: \"{body}\" EXACT [] ! {tail}");
        let stripped = strip_comment(&line);
        let expected = format!("synonym: \"{body}\" EXACT []");
        prop_assert_eq!(stripped, expected.as_str());
    }
}
