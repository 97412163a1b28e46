//! Known token ids for the embedded `gpt2-like` encoding.
use tikcount::{Config, Encoding, EncodingType, TokenInt};

fn gpt2_like() -> Encoding {
    Encoding::load(EncodingType::Gpt2Like, &Config::default()).unwrap()
}

const FIXTURES: &[(&str, &[TokenInt])] = &[
    ("", &[]),
    ("hello world", &[257, 296, 299]),
    ("Hello world!", &[410, 299, 33]),
    (
        "The quick brown fox jumps over the lazy dog.",
        &[
            288, 409, 278, 376, 119, 110, 396, 32, 106, 338, 112, 115, 347, 263, 279, 97, 122, 121,
            395, 46,
        ],
    ),
    ("1234567", &[49, 50, 51, 52, 53, 54, 55]),
    ("hello<|endoftext|>world", &[257, 296, 415, 119, 282, 293]),
    (
        "fn main() { let count = 42; }",
        &[102, 110, 280, 314, 312, 358, 279, 330, 307, 356, 355, 50, 59, 359],
    ),
    ("  indented", &[32, 273, 100, 259, 399]),
    (
        "they'd say: \"hi!\"",
        &[116, 257, 121, 39, 100, 320, 121, 58, 32, 34, 104, 105, 33, 34],
    ),
    (
        "Ünïcödé ✓ text",
        &[195, 156, 110, 195, 175, 99, 195, 182, 100, 195, 169, 32, 226, 156, 147, 322],
    ),
];

#[test]
fn encodes_fixtures() {
    let encoding = gpt2_like();

    for (text, expected) in FIXTURES {
        assert_eq!(*expected, encoding.encode(text), "encoding {text:?}");
        assert_eq!(expected.len(), encoding.count(text), "counting {text:?}");
        assert_eq!(*text, encoding.decode_tokens_to_string(expected).unwrap());
    }
}

#[test]
fn ordinary_encoding_splits_special_tokens() {
    let encoding = gpt2_like();
    let text = "hello<|endoftext|>world";

    let tokens = encoding.encode_ordinary(text);
    assert!(!tokens.contains(&415));
    assert_eq!(text, encoding.decode_tokens_to_string(&tokens).unwrap());
    assert_eq!(tokens.len(), encoding.count_ordinary(text));
}

#[test]
fn whole_chunk_tokens_are_used_directly() {
    let encoding = gpt2_like();

    // " world" is a token of its own
    assert_eq!(vec![299], encoding.encode(" world"));
    assert_eq!(Some(299), encoding.vocab().token_for_bytes(" world"));
}

#[test]
fn every_byte_is_one_token() {
    let encoding = gpt2_like();
    let vocab = encoding.vocab();

    for byte in 0..=255u8 {
        let token = vocab.byte_token(byte);
        assert_eq!(vec![token], tikcount::byte_pair_encode(&[byte], vocab));
        assert_eq!(Some(&[byte][..]), vocab.bytes_for_token(token));
    }
}
