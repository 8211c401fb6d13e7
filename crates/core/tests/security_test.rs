//! Standard security handler: authentication against known files and
//! round trips through freshly created dictionaries.

use pdfseal_core::model::{Dictionary, PDFObject};
use pdfseal_core::security::PasswordEncoding;
use pdfseal_core::{
    CipherKind, EncryptionDescriptor, EncryptionSettings, PdfError, Permissions, SecurityHandler,
};

// rc4-40.pdf: V=1, R=2, password "foo"
const RC4_40_O: [u8; 32] = [
    1, 169, 240, 206, 242, 141, 0, 248, 223, 176, 37, 143, 94, 240, 197, 92, 157, 247, 200, 22,
    149, 143, 54, 49, 0, 175, 119, 236, 2, 38, 36, 84,
];
const RC4_40_U: [u8; 32] = [
    105, 75, 157, 162, 248, 9, 199, 124, 114, 119, 140, 251, 202, 194, 4, 129, 178, 114, 5, 208,
    231, 211, 34, 98, 54, 130, 131, 100, 102, 106, 151, 8,
];

// rc4-128.pdf: V=2, R=3, password "foo"
const RC4_128_O: [u8; 32] = [
    208, 72, 209, 82, 158, 83, 93, 24, 132, 205, 56, 86, 54, 123, 24, 75, 74, 144, 223, 1, 230, 55,
    209, 110, 202, 6, 91, 175, 78, 100, 144, 11,
];
const RC4_128_U: [u8; 32] = [
    9, 52, 18, 54, 59, 157, 50, 124, 122, 197, 1, 68, 199, 199, 85, 241, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0,
];

const DOCID: [u8; 16] = [
    101, 26, 148, 254, 235, 120, 104, 211, 18, 169, 123, 55, 114, 112, 134, 14,
];

fn rc4_dict(v: i64, r: i64, length: i64, o: &[u8], u: &[u8]) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.insert("Filter".into(), PDFObject::name("Standard"));
    dict.insert("V".into(), PDFObject::Int(v));
    dict.insert("R".into(), PDFObject::Int(r));
    dict.insert("P".into(), PDFObject::Int(-4));
    dict.insert("Length".into(), PDFObject::Int(length));
    dict.insert("O".into(), PDFObject::string(o.to_vec()));
    dict.insert("U".into(), PDFObject::string(u.to_vec()));
    dict
}

fn open(
    dict: &Dictionary,
    file_id: &[u8],
    password: &[u8],
) -> pdfseal_core::Result<SecurityHandler> {
    let descriptor = EncryptionDescriptor::from_dict(dict)?;
    SecurityHandler::on_init(&descriptor, file_id, password)
}

/// Build a new encryption dictionary for `settings`.
fn create(
    settings: &EncryptionSettings,
    file_id: &[u8],
    user: &[u8],
    owner: &[u8],
) -> (Dictionary, SecurityHandler) {
    let mut dict = settings.to_dict();
    let handler = SecurityHandler::on_create(&mut dict, file_id, user, owner).unwrap();
    (dict, handler)
}

fn all_settings() -> Vec<EncryptionSettings> {
    vec![
        EncryptionSettings::rc4_40(),
        EncryptionSettings::rc4_128(),
        EncryptionSettings::aes_128(),
        EncryptionSettings::aes_256(5),
        EncryptionSettings::aes_256(6),
    ]
}

// --- Known files ---

#[test]
fn test_rc4_40_correct_password() {
    let dict = rc4_dict(1, 2, 40, &RC4_40_O, &RC4_40_U);
    let handler = open(&dict, &DOCID, b"foo").unwrap();
    assert_eq!(handler.cipher(), CipherKind::Rc4);
    assert_eq!(handler.key_len(), 5);
    assert_eq!(handler.revision(), 2);
}

#[test]
fn test_rc4_40_wrong_password() {
    let dict = rc4_dict(1, 2, 40, &RC4_40_O, &RC4_40_U);
    let err = open(&dict, &DOCID, b"wrong").unwrap_err();
    assert!(matches!(err, PdfError::InvalidPassword));
    assert!(err.is_auth_failure());
}

#[test]
fn test_rc4_40_empty_password_fails() {
    let dict = rc4_dict(1, 2, 40, &RC4_40_O, &RC4_40_U);
    assert!(matches!(
        open(&dict, &DOCID, b""),
        Err(PdfError::InvalidPassword)
    ));
}

#[test]
fn test_rc4_128_correct_password() {
    let dict = rc4_dict(2, 3, 128, &RC4_128_O, &RC4_128_U);
    let handler = open(&dict, &DOCID, b"foo").unwrap();
    assert_eq!(handler.cipher(), CipherKind::Rc4);
    assert_eq!(handler.key_len(), 16);
}

#[test]
fn test_rc4_128_wrong_password() {
    let dict = rc4_dict(2, 3, 128, &RC4_128_O, &RC4_128_U);
    assert!(open(&dict, &DOCID, b"bar").is_err());
}

#[test]
fn test_rc4_128_depends_on_file_id() {
    let dict = rc4_dict(2, 3, 128, &RC4_128_O, &RC4_128_U);
    assert!(open(&dict, &[0u8; 16], b"foo").is_err());
}

#[test]
fn test_rc4_object_keys_differ_per_object_and_generation() {
    let dict = rc4_dict(2, 3, 128, &RC4_128_O, &RC4_128_U);
    let handler = open(&dict, &DOCID, b"foo").unwrap();
    let crypto = handler.crypto_handler();

    let a = crypto.encrypt_content(1, 0, b"Test data");
    let b = crypto.encrypt_content(2, 0, b"Test data");
    let c = crypto.encrypt_content(1, 1, b"Test data");
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_eq!(crypto.decrypt(1, 0, &a), b"Test data");
}

// --- Dictionary validation ---

#[test]
fn test_non_standard_filter_is_unsupported() {
    let mut dict = rc4_dict(1, 2, 40, &RC4_40_O, &RC4_40_U);
    dict.insert("Filter".into(), PDFObject::name("Adobe.PubSec"));
    assert!(matches!(
        open(&dict, &DOCID, b"foo"),
        Err(PdfError::UnsupportedEncryption(_))
    ));
}

#[test]
fn test_unknown_revision_is_unsupported() {
    let mut dict = rc4_dict(1, 2, 40, &RC4_40_O, &RC4_40_U);
    dict.insert("R".into(), PDFObject::Int(7));
    assert!(matches!(
        open(&dict, &DOCID, b"foo"),
        Err(PdfError::UnsupportedEncryption(_))
    ));
}

#[test]
fn test_short_owner_hash_is_structural_error() {
    let dict = rc4_dict(1, 2, 40, &RC4_40_O[..20], &RC4_40_U);
    let err = open(&dict, &DOCID, b"foo").unwrap_err();
    assert!(matches!(err, PdfError::EncryptionError(_)));
    assert!(!err.is_auth_failure());
}

#[test]
fn test_identity_crypt_filter_means_no_encryption() {
    let mut dict = EncryptionSettings::aes_128().to_dict();
    let mut std_cf = Dictionary::new();
    std_cf.insert("CFM".into(), PDFObject::name("None"));
    let mut cf = Dictionary::new();
    cf.insert("StdCF".into(), PDFObject::Dict(std_cf));
    dict.insert("CF".into(), PDFObject::Dict(cf));

    let handler = open(&dict, &DOCID, b"anything").unwrap();
    assert_eq!(handler.cipher(), CipherKind::None);
    assert_eq!(handler.crypto_handler().decrypt(1, 0, b"plain"), b"plain");
}

#[test]
fn test_unknown_crypt_filter_method_is_unsupported() {
    let mut dict = EncryptionSettings::aes_128().to_dict();
    let mut std_cf = Dictionary::new();
    std_cf.insert("CFM".into(), PDFObject::name("Rot13"));
    let mut cf = Dictionary::new();
    cf.insert("StdCF".into(), PDFObject::Dict(std_cf));
    dict.insert("CF".into(), PDFObject::Dict(cf));
    dict.insert("O".into(), PDFObject::string(vec![0; 32]));
    dict.insert("U".into(), PDFObject::string(vec![0; 32]));

    assert!(matches!(
        open(&dict, &DOCID, b""),
        Err(PdfError::UnsupportedEncryption(_))
    ));
}

// --- Created dictionaries ---

#[test]
fn test_user_and_owner_passwords_round_trip() {
    for settings in all_settings() {
        let (dict, created) = create(&settings, &DOCID, b"user", b"owner");

        let user = open(&dict, &DOCID, b"user").unwrap();
        assert!(!user.is_owner_unlocked(), "{:?}", settings.cipher);
        assert_eq!(user.file_key(), created.file_key());

        let owner = open(&dict, &DOCID, b"owner").unwrap();
        assert!(owner.is_owner_unlocked(), "{:?}", settings.cipher);
        assert_eq!(owner.file_key(), created.file_key());

        assert!(matches!(
            open(&dict, &DOCID, b"nope"),
            Err(PdfError::InvalidPassword)
        ));
    }
}

#[test]
fn test_created_key_sizes() {
    let expected = [
        (CipherKind::Rc4, 5),
        (CipherKind::Rc4, 16),
        (CipherKind::Aes128, 16),
        (CipherKind::Aes256, 32),
        (CipherKind::Aes256, 32),
    ];
    for (settings, (cipher, len)) in all_settings().iter().zip(expected) {
        let (_, handler) = create(settings, &DOCID, b"u", b"o");
        assert_eq!(handler.cipher(), cipher);
        assert_eq!(handler.key_len(), len);
    }
}

#[test]
fn test_owner_password_recovers_user_password() {
    for settings in [EncryptionSettings::rc4_40(), EncryptionSettings::rc4_128()] {
        let (dict, _) = create(&settings, &DOCID, b"user pw", b"owner pw");
        let descriptor = EncryptionDescriptor::from_dict(&dict).unwrap();
        let handler = SecurityHandler::on_init(&descriptor, &DOCID, b"owner pw").unwrap();
        assert_eq!(handler.get_user_password(&descriptor, b"owner pw"), b"user pw");
    }
}

#[test]
fn test_empty_user_password_with_owner_secret() {
    let (dict, _) = create(&EncryptionSettings::rc4_128(), &DOCID, b"", b"secret");

    let owner = open(&dict, &DOCID, b"secret").unwrap();
    assert!(owner.is_owner_unlocked());
    assert_eq!(owner.permissions(false), 0xFFFF_FFFC);

    let anonymous = open(&dict, &DOCID, b"").unwrap();
    assert!(!anonymous.is_owner_unlocked());
}

#[test]
fn test_empty_owner_password_defaults_to_user() {
    for settings in all_settings() {
        let (dict, _) = create(&settings, &DOCID, b"same", b"");
        let handler = open(&dict, &DOCID, b"same").unwrap();
        assert!(handler.is_owner_unlocked(), "{:?}", settings.cipher);
    }
}

#[test]
fn test_permissions_reported() {
    let settings =
        EncryptionSettings::aes_128().with_permissions(Permissions::PRINT | Permissions::COPY);
    let (dict, _) = create(&settings, &DOCID, b"u", b"o");

    let user = open(&dict, &DOCID, b"u").unwrap();
    let perms = Permissions::from_bits_retain(user.permissions(true));
    assert!(perms.contains(Permissions::PRINT));
    assert!(perms.contains(Permissions::COPY));
    assert!(!perms.contains(Permissions::MODIFY));
    assert_eq!(user.permissions(true) & 0b11, 0);

    let owner = open(&dict, &DOCID, b"o").unwrap();
    assert_eq!(owner.permissions(true), 0xFFFF_FFFC);
    assert_eq!(owner.permissions(false), user.permissions(false));
}

#[test]
fn test_unencrypted_metadata_flag_round_trips() {
    for settings in [EncryptionSettings::rc4_128(), EncryptionSettings::aes_256(6)] {
        let settings = settings.with_encrypt_metadata(false);
        let (dict, _) = create(&settings, &DOCID, b"u", b"o");
        assert_eq!(dict["EncryptMetadata"], PDFObject::Bool(false));
        let handler = open(&dict, &DOCID, b"u").unwrap();
        assert!(!handler.encrypt_metadata());
    }
}

#[test]
fn test_tampered_perms_is_rejected() {
    let (mut dict, _) = create(&EncryptionSettings::aes_256(6), &DOCID, b"u", b"o");
    dict.insert("P".into(), PDFObject::Int(-3904));
    assert!(matches!(
        open(&dict, &DOCID, b"u"),
        Err(PdfError::EncryptionError(_))
    ));
}

#[test]
fn test_missing_perms_is_structural_error() {
    let (mut dict, _) = create(&EncryptionSettings::aes_256(5), &DOCID, b"u", b"o");
    dict.shift_remove("Perms");
    assert!(matches!(
        open(&dict, &DOCID, b"u"),
        Err(PdfError::EncryptionError(_))
    ));
}

#[test]
fn test_aes256_password_truncated_to_127_bytes() {
    let long = vec![b'x'; 200];
    let (dict, _) = create(&EncryptionSettings::aes_256(6), &DOCID, &long, b"owner");
    assert!(open(&dict, &DOCID, &long[..127]).is_ok());
    assert!(open(&dict, &DOCID, &long[..126]).is_err());
}

#[test]
fn test_utf8_password_matches_latin1_dictionary() {
    let (dict, _) = create(&EncryptionSettings::rc4_128(), &DOCID, &[0xE9], b"owner");
    let handler = open(&dict, &DOCID, "é".as_bytes()).unwrap();
    assert_eq!(handler.password_encoding(), PasswordEncoding::Utf8ToLatin1);
    assert_eq!(handler.encoded_password("é".as_bytes()), vec![0xE9]);
}

#[test]
fn test_latin1_password_matches_utf8_dictionary() {
    let (dict, _) = create(&EncryptionSettings::aes_256(5), &DOCID, "é".as_bytes(), b"owner");
    let handler = open(&dict, &DOCID, &[0xE9]).unwrap();
    assert_eq!(handler.password_encoding(), PasswordEncoding::Latin1ToUtf8);
}

#[test]
fn test_user_only_rekey_keeps_owner_hash() {
    let (mut dict, _) = create(&EncryptionSettings::rc4_128(), &DOCID, b"user", b"owner");
    let owner_hash = dict["O"].clone();
    let new_id = [7u8; 16];

    let rekeyed = SecurityHandler::on_create_user_only(&mut dict, &new_id, b"user").unwrap();
    assert_eq!(dict["O"], owner_hash);

    let reopened = open(&dict, &new_id, b"user").unwrap();
    assert_eq!(reopened.file_key(), rekeyed.file_key());
    assert!(open(&dict, &new_id, b"owner").unwrap().is_owner_unlocked());
    assert!(open(&dict, &DOCID, b"user").is_err());
}

// --- AES-256 known file ---

// aes-256.pdf: V=5, R=5, owner password "foo". The file carries no /Perms;
// AES256_PERMS is the block its file key seals for P=-4 with metadata
// encrypted.
const AES256_O: [u8; 48] = [
    197, 126, 60, 46, 218, 22, 190, 91, 132, 46, 198, 222, 145, 49, 111, 125, 24, 147, 223, 122, 6,
    21, 159, 78, 155, 195, 49, 220, 252, 161, 203, 182, 215, 56, 115, 236, 23, 247, 193, 14, 39,
    184, 210, 207, 56, 201, 114, 199,
];
const AES256_U: [u8; 48] = [
    179, 236, 138, 87, 238, 76, 63, 44, 188, 66, 38, 224, 89, 1, 136, 216, 233, 86, 206, 51, 43,
    103, 248, 173, 26, 183, 85, 55, 229, 239, 180, 149, 88, 136, 28, 124, 249, 186, 223, 59, 180,
    7, 178, 19, 84, 51, 249, 188,
];
const AES256_OE: [u8; 32] = [
    91, 206, 49, 194, 37, 90, 49, 81, 128, 220, 14, 148, 72, 121, 213, 222, 45, 98, 227, 35, 15,
    76, 191, 10, 54, 211, 184, 43, 81, 250, 80, 231,
];
const AES256_UE: [u8; 32] = [
    121, 209, 78, 72, 9, 195, 93, 96, 16, 97, 189, 216, 198, 84, 195, 205, 125, 73, 208, 81, 173,
    33, 196, 195, 9, 4, 57, 3, 226, 247, 31, 8,
];
const AES256_PERMS: [u8; 16] = [
    87, 0, 3, 209, 179, 115, 201, 29, 19, 88, 153, 165, 196, 129, 55, 253,
];
const AES256_FILE_KEY: &str = "5250e6e3f7b07091b017f36f36312d5574f84b32f2de934a42c0f8068928d0aa";

fn aes256_dict() -> Dictionary {
    let mut std_cf = Dictionary::new();
    std_cf.insert("CFM".into(), PDFObject::name("AESV3"));
    std_cf.insert("Length".into(), PDFObject::Int(32));
    std_cf.insert("AuthEvent".into(), PDFObject::name("DocOpen"));
    let mut cf = Dictionary::new();
    cf.insert("StdCF".into(), PDFObject::Dict(std_cf));

    let mut dict = Dictionary::new();
    dict.insert("Filter".into(), PDFObject::name("Standard"));
    dict.insert("V".into(), PDFObject::Int(5));
    dict.insert("R".into(), PDFObject::Int(5));
    dict.insert("P".into(), PDFObject::Int(-4));
    dict.insert("Length".into(), PDFObject::Int(256));
    dict.insert("O".into(), PDFObject::string(AES256_O.to_vec()));
    dict.insert("U".into(), PDFObject::string(AES256_U.to_vec()));
    dict.insert("OE".into(), PDFObject::string(AES256_OE.to_vec()));
    dict.insert("UE".into(), PDFObject::string(AES256_UE.to_vec()));
    dict.insert("Perms".into(), PDFObject::string(AES256_PERMS.to_vec()));
    dict.insert("CF".into(), PDFObject::Dict(cf));
    dict.insert("StmF".into(), PDFObject::name("StdCF"));
    dict.insert("StrF".into(), PDFObject::name("StdCF"));
    dict
}

#[test]
fn test_aes256_owner_password_unwraps_known_key() {
    let handler = open(&aes256_dict(), &[], b"foo").unwrap();
    assert!(handler.is_owner_unlocked());
    assert_eq!(handler.cipher(), CipherKind::Aes256);
    assert_eq!(handler.revision(), 5);
    assert_eq!(hex::encode(handler.file_key()), AES256_FILE_KEY);
    assert_eq!(handler.permissions(false), 0xFFFF_FFFC);
}

#[test]
fn test_aes256_known_file_rejects_other_passwords() {
    for password in [&b"fop"[..], b"Foo", b"fo", b""] {
        let err = open(&aes256_dict(), &[], password).unwrap_err();
        assert!(err.is_auth_failure(), "{password:?}: {err}");
    }
}

#[test]
fn test_aes256_one_byte_change_fails() {
    for revision in [5, 6] {
        let settings = EncryptionSettings::aes_256(revision);
        let (dict, created) = create(&settings, &DOCID, b"user-secret", b"owner-secret");

        let user = open(&dict, &DOCID, b"user-secret").unwrap();
        assert_eq!(user.file_key(), created.file_key());
        let owner = open(&dict, &DOCID, b"owner-secret").unwrap();
        assert_eq!(owner.file_key(), created.file_key());

        for altered in [&b"user-secreT"[..], b"User-secret", b"owner-secreu"] {
            assert!(
                matches!(open(&dict, &DOCID, altered), Err(PdfError::InvalidPassword)),
                "R{revision} accepted {altered:?}"
            );
        }
    }
}

#[test]
fn test_handler_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SecurityHandler>();
}
