//! RC4 known-answer vectors.

use pdfseal_core::arcfour::Arcfour;

#[test]
fn test_arcfour_key() {
    let mut cipher = Arcfour::new(b"Key");
    let result = cipher.process(b"Plaintext");
    assert_eq!(hex::encode(&result), "bbf316e8d940af0ad3");
}

#[test]
fn test_arcfour_wiki() {
    let mut cipher = Arcfour::new(b"Wiki");
    let result = cipher.process(b"pedia");
    assert_eq!(hex::encode(&result), "1021bf0420");
}

#[test]
fn test_arcfour_secret() {
    let mut cipher = Arcfour::new(b"Secret");
    let result = cipher.process(b"Attack at dawn");
    assert_eq!(hex::encode(&result), "45a01f645fc35b383552544b9bf5");
}

#[test]
fn test_arcfour_stream_continues_across_calls() {
    let mut split = Arcfour::new(b"Secret");
    let mut out = split.process(b"Attack ");
    out.extend(split.process(b"at dawn"));
    assert_eq!(hex::encode(&out), "45a01f645fc35b383552544b9bf5");
}

#[test]
fn test_arcfour_crypt_in_place_is_symmetric() {
    let mut buf = *b"Plaintext";
    Arcfour::crypt(b"Key", &mut buf);
    assert_eq!(hex::encode(&buf), "bbf316e8d940af0ad3");
    Arcfour::crypt(b"Key", &mut buf);
    assert_eq!(&buf, b"Plaintext");
}
