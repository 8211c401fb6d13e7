//! Per-object encryption: streaming sessions against the single-call API
//! and the decrypt walk over object trees.

use pdfseal_core::model::{Dictionary, PDFObject, PDFStream};
use pdfseal_core::{CipherKind, CryptoHandler, Encryptor};
use proptest::prelude::*;

const IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

fn handlers() -> Vec<CryptoHandler> {
    vec![
        CryptoHandler::new(CipherKind::Rc4, &[0x42; 5], true),
        CryptoHandler::new(CipherKind::Rc4, &[0x42; 16], true),
        CryptoHandler::new(CipherKind::Aes128, &[0x42; 16], true),
        CryptoHandler::new(CipherKind::Aes256, &[0x42; 32], true),
    ]
}

fn encrypt_chunked(handler: &CryptoHandler, objnum: u32, data: &[u8], chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut session = handler.encrypt_start_with_iv(objnum, 0, &IV);
    for part in data.chunks(chunk) {
        session.update(part, &mut out);
    }
    session.finish(&mut out);
    out
}

fn decrypt_chunked(handler: &CryptoHandler, objnum: u32, data: &[u8], chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut session = handler.decrypt_start(objnum, 0);
    for part in data.chunks(chunk) {
        session.update(part, &mut out);
    }
    session.finish(&mut out);
    out
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn streaming_encrypt_matches_single_call(
        data in proptest::collection::vec(any::<u8>(), 0..10_000),
        chunk in 1usize..512,
        objnum in 1u32..10_000,
    ) {
        for handler in handlers() {
            let whole = handler.encrypt_content_with_iv(objnum, 0, &data, &IV);
            prop_assert_eq!(encrypt_chunked(&handler, objnum, &data, chunk), whole.clone());
            prop_assert_eq!(whole.len(), handler.encrypt_get_size(data.len()));
        }
    }

    #[test]
    fn streaming_decrypt_matches_single_call(
        data in proptest::collection::vec(any::<u8>(), 0..10_000),
        chunk in 1usize..512,
    ) {
        for handler in handlers() {
            let enc = handler.encrypt_content(3, 0, &data);
            prop_assert_eq!(decrypt_chunked(&handler, 3, &enc, chunk), data.clone());
            prop_assert_eq!(handler.decrypt(3, 0, &enc), data.clone());
        }
    }
}

#[test]
fn aes_prefixes_the_iv() {
    let handler = CryptoHandler::new(CipherKind::Aes128, &[7; 16], true);
    let out = handler.encrypt_content_with_iv(1, 0, b"abc", &IV);
    assert_eq!(&out[..16], &IV);
    assert_eq!(out.len(), 32);
}

#[test]
fn aes_block_aligned_input_gets_full_pad_block() {
    let handler = CryptoHandler::new(CipherKind::Aes256, &[7; 32], true);
    assert_eq!(handler.encrypt_content(1, 0, &[0; 16]).len(), 48);
    assert_eq!(handler.encrypt_get_size(16), 48);
    assert_eq!(handler.decrypt_get_size(48), 32);
}

#[test]
fn aes256_ignores_object_number() {
    let handler = CryptoHandler::new(CipherKind::Aes256, &[9; 32], true);
    let enc = handler.encrypt_content_with_iv(1, 0, b"same key", &IV);
    assert_eq!(handler.decrypt(999, 3, &enc), b"same key");
}

#[test]
fn identity_passes_data_through() {
    let handler = CryptoHandler::identity();
    assert_eq!(handler.encrypt_content(1, 0, b"clear"), b"clear");
    assert_eq!(handler.decrypt(1, 0, b"clear"), b"clear");
    assert_eq!(handler.encrypt_get_size(5), 5);
}

#[test]
fn encryptor_binds_object_number() {
    let handler = CryptoHandler::new(CipherKind::Aes128, &[3; 16], true);
    let encryptor = Encryptor::new(&handler, 42);
    let enc = encryptor.encrypt(b"bound");
    assert_eq!(handler.decrypt(42, 0, &enc), b"bound");
}

fn sig_dict(handler: &CryptoHandler, objnum: u32, type_key: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.insert(
        type_key.into(),
        PDFObject::string(handler.encrypt_content(objnum, 0, b"Sig")),
    );
    dict.insert("Contents".into(), PDFObject::hex_string(vec![0x30, 0x82, 0x01]));
    dict
}

#[test]
fn signature_detected_after_type_is_decrypted() {
    for handler in handlers() {
        for key in ["Type", "FT"] {
            let mut root = PDFObject::Dict(sig_dict(&handler, 8, key));
            handler.decrypt_object_tree(&mut root, 8, 0);
            let dict = root.as_dict().unwrap();
            assert_eq!(dict[key].as_string().unwrap(), b"Sig");
            assert_eq!(dict["Contents"].as_string().unwrap(), &[0x30, 0x82, 0x01]);
        }
    }
}

#[test]
fn nested_contents_outside_signatures_are_decrypted() {
    let handler = CryptoHandler::new(CipherKind::Rc4, &[1; 16], true);
    let mut page = Dictionary::new();
    page.insert("Type".into(), PDFObject::name("Page"));
    page.insert(
        "Contents".into(),
        PDFObject::string(handler.encrypt_content(4, 0, b"text")),
    );
    let mut outer = Dictionary::new();
    outer.insert("Kids".into(), PDFObject::Array(vec![PDFObject::Dict(page)]));
    outer.insert("Sig".into(), PDFObject::Dict(sig_dict(&handler, 4, "Type")));

    let mut root = PDFObject::Dict(outer);
    handler.decrypt_object_tree(&mut root, 4, 0);

    let outer = root.as_dict().unwrap();
    let page = outer["Kids"].as_array().unwrap()[0].as_dict().unwrap();
    assert_eq!(page["Contents"].as_string().unwrap(), b"text");
    let sig = outer["Sig"].as_dict().unwrap();
    assert_eq!(sig["Contents"].as_string().unwrap(), &[0x30, 0x82, 0x01]);
}

fn metadata_stream(data: Vec<u8>) -> PDFObject {
    let mut attrs = Dictionary::new();
    attrs.insert("Type".into(), PDFObject::name("Metadata"));
    attrs.insert("Subtype".into(), PDFObject::name("XML"));
    PDFObject::Stream(Box::new(PDFStream::new(attrs, data)))
}

#[test]
fn metadata_stays_clear_when_not_encrypted() {
    let handler = CryptoHandler::new(CipherKind::Aes128, &[5; 16], false);
    let mut root = metadata_stream(b"<x:xmpmeta/>".to_vec());
    handler.decrypt_object_tree(&mut root, 2, 0);
    assert_eq!(root.as_stream().unwrap().get_rawdata(), b"<x:xmpmeta/>");
}

#[test]
fn metadata_decrypted_when_encrypted() {
    let handler = CryptoHandler::new(CipherKind::Aes128, &[5; 16], true);
    let mut root = metadata_stream(handler.encrypt_content(2, 0, b"<x:xmpmeta/>"));
    handler.decrypt_object_tree(&mut root, 2, 0);
    assert_eq!(root.as_stream().unwrap().get_rawdata(), b"<x:xmpmeta/>");
}

#[test]
fn short_aes_stream_becomes_empty() {
    let handler = CryptoHandler::new(CipherKind::Aes128, &[5; 16], true);
    let mut root = PDFObject::Stream(Box::new(PDFStream::new(Dictionary::new(), vec![1, 2, 3])));
    handler.decrypt_object_tree(&mut root, 2, 0);
    assert!(root.as_stream().unwrap().get_rawdata().is_empty());
}
