#![forbid(unsafe_code)]

//! PKCS#12 (.p12/.pfx) reader (RFC 7292).
//!
//! Handles the two schemes OpenSSL writes: PBES2 (PBKDF2 + AES-CBC) and the
//! legacy pbeWithSHAAnd3-KeyTripleDES-CBC. The MAC is checked before any
//! bag is decrypted. PFX files are BER, so parsing goes through
//! `yasna::parse_ber`.

use cipher::{block_padding::Pkcs7, BlockCipher, BlockDecryptMut, KeyInit, KeyIvInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use xseal_core::Error;
use yasna::models::ObjectIdentifier;
use yasna::{ASN1Error, ASN1ErrorKind, BERReader, Tag};

const OID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

const OID_PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
const OID_CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];
const OID_X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];

const OID_PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
const OID_PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
const OID_PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];

const OID_AES_128_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 2];
const OID_AES_192_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 22];
const OID_AES_256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];

const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
const OID_HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];

/// KDF diversifiers (RFC 7292 Appendix B.3).
const ID_KEY: u8 = 1;
const ID_IV: u8 = 2;
const ID_MAC: u8 = 3;

fn oid(components: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(components)
}

fn invalid() -> ASN1Error {
    ASN1Error::new(ASN1ErrorKind::Invalid)
}

/// Contents extracted from a PKCS#12 file.
#[derive(Debug, Default)]
pub struct Pkcs12Contents {
    /// PKCS#8 DER-encoded private keys.
    pub private_keys: Vec<Vec<u8>>,
    /// DER-encoded X.509 certificates.
    pub certificates: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashAlg {
    Sha1,
    Sha256,
}

#[derive(Debug)]
enum Encryption {
    PbeSha1And3Des {
        salt: Vec<u8>,
        iterations: u32,
    },
    Pbes2 {
        salt: Vec<u8>,
        iterations: u32,
        prf: HashAlg,
        key_len: usize,
        iv: Vec<u8>,
    },
}

struct MacData {
    hash: HashAlg,
    digest: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
}

enum ContentInfo {
    Data(Vec<u8>),
    Encrypted(Encryption, Vec<u8>),
}

enum SafeBag {
    ShroudedKey(Encryption, Vec<u8>),
    Cert(Vec<u8>),
    Other,
}

/// Parse a PKCS#12 file, decrypting with the given password.
pub fn parse(data: &[u8], password: &str) -> Result<Pkcs12Contents, Error> {
    let (auth_safe, mac) = yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            if r.next().read_u32()? != 3 {
                return Err(invalid());
            }
            let auth_safe = read_data_content_info(r.next())?;
            let mac = r.read_optional(read_mac_data)?;
            Ok((auth_safe, mac))
        })
    })
    .map_err(|e| Error::Key(format!("failed to parse PKCS#12 PFX: {e}")))?;

    let bmp_password = password_to_bmp(password);
    if let Some(mac) = &mac {
        verify_mac(mac, &auth_safe, &bmp_password)?;
    }

    let infos = yasna::parse_ber(&auth_safe, |r| r.collect_sequence_of(read_content_info))
        .map_err(|e| Error::Key(format!("failed to parse PKCS#12 authSafe: {e}")))?;

    let mut contents = Pkcs12Contents::default();
    for info in infos {
        let bags = match info {
            ContentInfo::Data(data) => data,
            ContentInfo::Encrypted(alg, ciphertext) => {
                decrypt(&alg, &ciphertext, password, &bmp_password)?
            }
        };
        let bags = yasna::parse_ber(&bags, |r| r.collect_sequence_of(read_safe_bag))
            .map_err(|e| Error::Key(format!("failed to parse PKCS#12 SafeBags: {e}")))?;

        for bag in bags {
            match bag {
                SafeBag::ShroudedKey(alg, ciphertext) => contents
                    .private_keys
                    .push(decrypt(&alg, &ciphertext, password, &bmp_password)?),
                SafeBag::Cert(der) => contents.certificates.push(der),
                SafeBag::Other => {}
            }
        }
    }

    tracing::debug!(
        keys = contents.private_keys.len(),
        certs = contents.certificates.len(),
        "parsed PKCS#12 bundle"
    );
    Ok(contents)
}

// ── ASN.1 ────────────────────────────────────────────────────────────

/// ContentInfo of type `data`; returns the OCTET STRING payload.
fn read_data_content_info(r: BERReader) -> Result<Vec<u8>, ASN1Error> {
    r.read_sequence(|r| {
        if r.next().read_oid()? != oid(OID_DATA) {
            return Err(invalid());
        }
        r.next().read_tagged(Tag::context(0), |r| r.read_bytes())
    })
}

fn read_content_info(r: BERReader) -> Result<ContentInfo, ASN1Error> {
    r.read_sequence(|r| {
        let content_type = r.next().read_oid()?;
        if content_type == oid(OID_DATA) {
            let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
            return Ok(ContentInfo::Data(data));
        }
        if content_type != oid(OID_ENCRYPTED_DATA) {
            return Err(invalid());
        }
        r.next().read_tagged(Tag::context(0), |r| {
            r.read_sequence(|r| {
                let _version = r.next().read_u32()?;
                r.next().read_sequence(|r| {
                    let _content_type = r.next().read_oid()?;
                    let alg = read_encryption_algorithm(r.next())?;
                    let ciphertext = r
                        .next()
                        .read_tagged_implicit(Tag::context(0), |r| r.read_bytes())?;
                    Ok(ContentInfo::Encrypted(alg, ciphertext))
                })
            })
        })
    })
}

fn read_safe_bag(r: BERReader) -> Result<SafeBag, ASN1Error> {
    r.read_sequence(|r| {
        let bag_type = r.next().read_oid()?;
        let bag = if bag_type == oid(OID_PKCS8_SHROUDED_KEY_BAG) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let alg = read_encryption_algorithm(r.next())?;
                    let ciphertext = r.next().read_bytes()?;
                    Ok(SafeBag::ShroudedKey(alg, ciphertext))
                })
            })?
        } else if bag_type == oid(OID_CERT_BAG) {
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    if r.next().read_oid()? != oid(OID_X509_CERTIFICATE) {
                        return Err(invalid());
                    }
                    let der = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
                    Ok(SafeBag::Cert(der))
                })
            })?
        } else {
            r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            SafeBag::Other
        };
        // bagAttributes (friendlyName, localKeyId) are not needed
        r.read_optional(|r| r.read_der())?;
        Ok(bag)
    })
}

fn read_encryption_algorithm(r: BERReader) -> Result<Encryption, ASN1Error> {
    r.read_sequence(|r| {
        let alg = r.next().read_oid()?;
        if alg == oid(OID_PBE_SHA1_3DES) {
            return r.next().read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u32()?;
                Ok(Encryption::PbeSha1And3Des { salt, iterations })
            });
        }
        if alg != oid(OID_PBES2) {
            return Err(invalid());
        }
        r.next().read_sequence(|r| {
            let (salt, iterations, prf) = r.next().read_sequence(|r| {
                if r.next().read_oid()? != oid(OID_PBKDF2) {
                    return Err(invalid());
                }
                r.next().read_sequence(|r| {
                    let salt = r.next().read_bytes()?;
                    let iterations = r.next().read_u32()?;
                    let _key_length = r.read_optional(|r| r.read_u32())?;
                    let prf = r.read_optional(read_prf)?.unwrap_or(HashAlg::Sha1);
                    Ok((salt, iterations, prf))
                })
            })?;
            let (key_len, iv) = r.next().read_sequence(|r| {
                let cipher = r.next().read_oid()?;
                let key_len = if cipher == oid(OID_AES_128_CBC) {
                    16
                } else if cipher == oid(OID_AES_192_CBC) {
                    24
                } else if cipher == oid(OID_AES_256_CBC) {
                    32
                } else {
                    return Err(invalid());
                };
                Ok((key_len, r.next().read_bytes()?))
            })?;
            Ok(Encryption::Pbes2 {
                salt,
                iterations,
                prf,
                key_len,
                iv,
            })
        })
    })
}

fn read_prf(r: BERReader) -> Result<HashAlg, ASN1Error> {
    r.read_sequence(|r| {
        let prf = r.next().read_oid()?;
        r.read_optional(|r| r.read_null())?;
        if prf == oid(OID_HMAC_SHA256) {
            Ok(HashAlg::Sha256)
        } else if prf == oid(OID_HMAC_SHA1) {
            Ok(HashAlg::Sha1)
        } else {
            Err(invalid())
        }
    })
}

fn read_mac_data(r: BERReader) -> Result<MacData, ASN1Error> {
    r.read_sequence(|r| {
        let (hash, digest) = r.next().read_sequence(|r| {
            let hash = r.next().read_sequence(|r| {
                let alg = r.next().read_oid()?;
                r.read_optional(|r| r.read_null())?;
                if alg == oid(OID_SHA256) {
                    Ok(HashAlg::Sha256)
                } else if alg == oid(OID_SHA1) {
                    Ok(HashAlg::Sha1)
                } else {
                    Err(invalid())
                }
            })?;
            Ok((hash, r.next().read_bytes()?))
        })?;
        let salt = r.next().read_bytes()?;
        let iterations = r.read_optional(|r| r.read_u32())?.unwrap_or(1);
        Ok(MacData {
            hash,
            digest,
            salt,
            iterations,
        })
    })
}

// ── Key derivation and decryption ────────────────────────────────────

/// Encode a password as BMPString (UTF-16BE) with a two-byte terminator.
fn password_to_bmp(password: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let mut bmp: Vec<u8> = password.encode_utf16().flat_map(u16::to_be_bytes).collect();
    bmp.extend_from_slice(&[0, 0]);
    bmp
}

/// Repeat `data` until it fills a multiple of `v` bytes.
fn fill_to_multiple(data: &[u8], v: usize) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let len = data.len().div_ceil(v) * v;
    data.iter().copied().cycle().take(len).collect()
}

/// The PKCS#12 KDF (RFC 7292 Appendix B.2).
fn kdf<D>(id: u8, password: &[u8], salt: &[u8], iterations: u32, out_len: usize) -> Vec<u8>
where
    D: Digest + sha2::digest::FixedOutputReset,
{
    const V: usize = 64;
    let u = <D as Digest>::output_size();

    let diversifier = [id; V];
    let mut i_block = fill_to_multiple(salt, V);
    i_block.extend(fill_to_multiple(password, V));

    let mut out = Vec::with_capacity(out_len + u);
    let mut hasher = D::new();
    while out.len() < out_len {
        Digest::update(&mut hasher, diversifier);
        Digest::update(&mut hasher, &i_block);
        let mut a = hasher.finalize_reset();
        for _ in 1..iterations {
            Digest::update(&mut hasher, &a);
            a = hasher.finalize_reset();
        }
        out.extend_from_slice(&a);
        if out.len() >= out_len {
            break;
        }

        // I_j = (I_j + B + 1) mod 2^(v*8)
        let b = fill_to_multiple(&a, V);
        for chunk in i_block.chunks_mut(V) {
            let mut carry = 1u16;
            for (x, y) in chunk.iter_mut().zip(&b).rev() {
                let sum = u16::from(*x) + u16::from(*y) + carry;
                *x = sum as u8;
                carry = sum >> 8;
            }
        }
    }
    out.truncate(out_len);
    out
}

fn hmac_of<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|e| Error::Key(format!("PKCS#12 MAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_mac(mac: &MacData, auth_safe: &[u8], bmp_password: &[u8]) -> Result<(), Error> {
    let computed = match mac.hash {
        HashAlg::Sha1 => {
            let key = kdf::<Sha1>(ID_MAC, bmp_password, &mac.salt, mac.iterations, 20);
            hmac_of::<Hmac<Sha1>>(&key, auth_safe)?
        }
        HashAlg::Sha256 => {
            let key = kdf::<Sha256>(ID_MAC, bmp_password, &mac.salt, mac.iterations, 32);
            hmac_of::<Hmac<Sha256>>(&key, auth_safe)?
        }
    };
    if computed != mac.digest {
        return Err(Error::Key(
            "PKCS#12 MAC verification failed (wrong password?)".into(),
        ));
    }
    Ok(())
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| Error::Key(format!("PKCS#12 cipher init failed: {e}")))?;
    let mut buf = ciphertext.to_vec();
    let plain = decryptor
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|e| Error::Key(format!("PKCS#12 decryption failed: {e}")))?;
    Ok(plain.to_vec())
}

fn decrypt(
    alg: &Encryption,
    ciphertext: &[u8],
    password: &str,
    bmp_password: &[u8],
) -> Result<Vec<u8>, Error> {
    match alg {
        Encryption::PbeSha1And3Des { salt, iterations } => {
            let key = kdf::<Sha1>(ID_KEY, bmp_password, salt, *iterations, 24);
            let iv = kdf::<Sha1>(ID_IV, bmp_password, salt, *iterations, 8);
            cbc_decrypt::<des::TdesEde3>(&key, &iv, ciphertext)
        }
        Encryption::Pbes2 {
            salt,
            iterations,
            prf,
            key_len,
            iv,
        } => {
            let mut key = vec![0u8; *key_len];
            match prf {
                HashAlg::Sha1 => {
                    pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, *iterations, &mut key)
                }
                HashAlg::Sha256 => {
                    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, *iterations, &mut key)
                }
            }
            match key_len {
                16 => cbc_decrypt::<aes::Aes128>(&key, iv, ciphertext),
                24 => cbc_decrypt::<aes::Aes192>(&key, iv, ciphertext),
                _ => cbc_decrypt::<aes::Aes256>(&key, iv, ciphertext),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../test-data/keys")
            .join(name);
        std::fs::read(path).unwrap()
    }

    #[test]
    fn bmp_password() {
        assert!(password_to_bmp("").is_empty());
        assert_eq!(password_to_bmp("A"), vec![0x00, 0x41, 0x00, 0x00]);
        assert_eq!(password_to_bmp("ab"), vec![0x00, 0x61, 0x00, 0x62, 0x00, 0x00]);
    }

    #[test]
    fn kdf_is_deterministic_and_diversified() {
        let password = password_to_bmp("test");
        let key = kdf::<Sha1>(ID_KEY, &password, b"saltsalt", 2048, 24);
        assert_eq!(key.len(), 24);
        assert_eq!(key, kdf::<Sha1>(ID_KEY, &password, b"saltsalt", 2048, 24));

        let iv = kdf::<Sha1>(ID_IV, &password, b"saltsalt", 2048, 8);
        assert_ne!(&key[..8], &iv[..]);
        // longer outputs extend shorter ones
        assert_eq!(&key[..8], &kdf::<Sha1>(ID_KEY, &password, b"saltsalt", 2048, 8)[..]);
        assert_eq!(kdf::<Sha256>(ID_MAC, &password, b"saltsalt", 1, 32).len(), 32);
    }

    #[test]
    fn pbes2_bundle() {
        let contents = parse(&fixture("rsa.p12"), "secret").unwrap();
        assert_eq!(contents.private_keys.len(), 1);
        assert_eq!(contents.certificates.len(), 1);
        assert_eq!(contents.private_keys[0][0], 0x30);
    }

    #[test]
    fn legacy_3des_bundle() {
        let contents = parse(&fixture("rsa-legacy.p12"), "secret").unwrap();
        assert_eq!(contents.private_keys.len(), 1);
        assert_eq!(contents.certificates.len(), 1);
    }

    #[test]
    fn wrong_password_fails_mac() {
        let err = parse(&fixture("rsa.p12"), "wrong").unwrap_err();
        assert!(err.to_string().contains("MAC verification failed"), "{err}");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse(b"\x30\x03\x02\x01\x02", "secret").is_err());
    }
}
