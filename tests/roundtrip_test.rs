//! Round-trip laws of the reference codec.
//!
//! decode(encode(v)) == v for every lossless transform; lossy timestamp forms
//! lose exactly the precision their granularity cannot carry.

use chrono::{DateTime, Timelike, Utc};
use proptest::prelude::*;
use protowire::{
    compile, decode_bytes, encode_bytes, format_timestamp, parse_timestamp, BytesEncoding,
    Compiled, FileDescriptorSet, GenerateOptions, TimestampFormat,
};
use serde_json::{json, Value};

const BYTES_ENCODINGS: [BytesEncoding; 5] = [
    BytesEncoding::Base64,
    BytesEncoding::Base64Raw,
    BytesEncoding::Base64Url,
    BytesEncoding::Base64UrlRaw,
    BytesEncoding::Hex,
];

fn bytes_encoding() -> impl Strategy<Value = BytesEncoding> {
    prop::sample::select(BYTES_ENCODINGS.to_vec())
}

/// Instants between 1970 and 2100 with nanosecond precision.
fn instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000)
        .prop_map(|(secs, nanos)| DateTime::from_timestamp(secs, nanos).unwrap())
}

fn compiled() -> Compiled {
    let set: FileDescriptorSet = serde_json::from_value(json!({"file": [{
        "name": "r.proto",
        "package": "r",
        "messageType": [{"name": "R", "field": [
            {"name": "n", "number": 1, "label": "LABEL_OPTIONAL", "type": "TYPE_INT64",
             "options": {"[sebuf.http.int64_encoding]": "NUMBER"}},
            {"name": "u", "number": 2, "label": "LABEL_OPTIONAL", "type": "TYPE_UINT64",
             "options": {"[sebuf.http.int64_encoding]": "NUMBER"}},
            {"name": "data", "number": 3, "label": "LABEL_OPTIONAL", "type": "TYPE_BYTES",
             "options": {"[sebuf.http.bytes_encoding]": "BASE64URL_RAW"}},
            {"name": "blobs", "number": 4, "label": "LABEL_REPEATED", "type": "TYPE_BYTES",
             "options": {"[sebuf.http.bytes_encoding]": "HEX"}}
        ]}]
    }]}))
    .unwrap();
    compile(&set, &[], &GenerateOptions::new()).unwrap()
}

proptest! {
    #[test]
    fn bytes_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..64), encoding in bytes_encoding()) {
        let text = encode_bytes(&bytes, encoding);
        prop_assert_eq!(decode_bytes(&text, encoding).unwrap(), bytes);
    }

    #[test]
    fn hex_is_lowercase_digits(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let text = encode_bytes(&bytes, BytesEncoding::Hex);
        prop_assert_eq!(text.len(), bytes.len() * 2);
        prop_assert!(text.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn unix_seconds_drop_subseconds(t in instant()) {
        let wire = format_timestamp(t, TimestampFormat::UnixSeconds);
        prop_assert!(wire.is_i64());
        let back = parse_timestamp(&wire, TimestampFormat::UnixSeconds).unwrap().unwrap();
        prop_assert_eq!(back, t.with_nanosecond(0).unwrap());
    }

    #[test]
    fn unix_millis_truncate(t in instant()) {
        let wire = format_timestamp(t, TimestampFormat::UnixMillis);
        let back = parse_timestamp(&wire, TimestampFormat::UnixMillis).unwrap().unwrap();
        let truncated = t.with_nanosecond(t.nanosecond() / 1_000_000 * 1_000_000).unwrap();
        prop_assert_eq!(back, truncated);
    }

    #[test]
    fn date_keeps_the_day(t in instant()) {
        let wire = format_timestamp(t, TimestampFormat::Date);
        let back = parse_timestamp(&wire, TimestampFormat::Date).unwrap().unwrap();
        prop_assert_eq!(back.date_naive(), t.date_naive());
        prop_assert_eq!(back.num_seconds_from_midnight(), 0);
    }

    #[test]
    fn message_round_trip(
        n in any::<i64>(),
        u in any::<u64>(),
        data in prop::collection::vec(any::<u8>(), 0..32),
        blobs in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 0..4),
    ) {
        let compiled = compiled();
        let codec = compiled.codec();
        let baseline = json!({
            "n": n.to_string(),
            "u": u.to_string(),
            "data": encode_bytes(&data, BytesEncoding::Base64),
            "blobs": blobs.iter().map(|b| encode_bytes(b, BytesEncoding::Base64)).collect::<Vec<_>>()
        });

        let wire = codec.encode("r.R", &baseline).unwrap();
        prop_assert_eq!(&wire["n"], &Value::from(n));
        prop_assert_eq!(&wire["u"], &Value::from(u));

        let decoded = codec.decode("r.R", &wire).unwrap();
        prop_assert_eq!(decoded, baseline);
    }
}
