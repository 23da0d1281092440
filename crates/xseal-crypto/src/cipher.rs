#![forbid(unsafe_code)]

//! Block cipher algorithm implementations (AES-CBC, 3DES-CBC).
//!
//! Cipher text is laid out as `IV || ciphertext`.  Encryption pads with
//! PKCS#7; decryption accepts any W3C padding, which only fixes the last
//! byte.

use cipher::block_padding::NoPadding;
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use rand::RngCore;
use xseal_core::{algorithm, Error};

/// Trait for cipher algorithms.
pub trait CipherAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;
    fn key_size(&self) -> usize;
}

/// Create a cipher algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
    let alg: Box<dyn CipherAlgorithm> = match uri {
        algorithm::AES128_CBC => Box::new(Cbc::<aes::Aes128>::new(algorithm::AES128_CBC, 16)),
        algorithm::AES192_CBC => Box::new(Cbc::<aes::Aes192>::new(algorithm::AES192_CBC, 24)),
        algorithm::AES256_CBC => Box::new(Cbc::<aes::Aes256>::new(algorithm::AES256_CBC, 32)),
        algorithm::TRIPLEDES_CBC => {
            Box::new(Cbc::<des::TdesEde3>::new(algorithm::TRIPLEDES_CBC, 24))
        }
        _ => return Err(Error::UnsupportedAlgorithm(format!("cipher: {uri}"))),
    };
    Ok(alg)
}

/// Generate a random session key of `size` bytes.
pub fn generate_key(size: usize) -> Vec<u8> {
    let mut key = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

struct Cbc<C> {
    uri: &'static str,
    key_size: usize,
    _cipher: std::marker::PhantomData<fn() -> C>,
}

impl<C> Cbc<C> {
    fn new(uri: &'static str, key_size: usize) -> Self {
        Self {
            uri,
            key_size,
            _cipher: std::marker::PhantomData,
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.key_size {
            return Err(Error::Crypto(format!(
                "{} expects a {} byte key, got {}",
                self.uri,
                self.key_size,
                key.len()
            )));
        }
        Ok(())
    }
}

impl<C> CipherAlgorithm for Cbc<C>
where
    C: BlockCipher + BlockEncryptMut + BlockDecryptMut + KeyInit,
{
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn key_size(&self) -> usize {
        self.key_size
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_key(key)?;
        let block = C::block_size();
        let mut iv = vec![0u8; block];
        rand::thread_rng().fill_bytes(&mut iv);

        // Already PKCS7-padded, use NoPadding in cipher
        let mut buf = pkcs7_pad(plaintext, block);
        let buf_len = buf.len();
        let enc = cbc::Encryptor::<C>::new_from_slices(key, &iv)
            .map_err(|e| Error::Crypto(format!("{} init: {e}", self.uri)))?;
        enc.encrypt_padded_mut::<NoPadding>(&mut buf, buf_len)
            .map_err(|e| Error::Crypto(format!("{} encrypt: {e}", self.uri)))?;

        iv.extend_from_slice(&buf);
        Ok(iv)
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_key(key)?;
        let block = C::block_size();
        if data.len() < 2 * block || data.len() % block != 0 {
            return Err(Error::Crypto(format!(
                "{}: cipher text length {} is not IV plus whole blocks",
                self.uri,
                data.len()
            )));
        }
        let (iv, ciphertext) = data.split_at(block);
        let mut buf = ciphertext.to_vec();
        let dec = cbc::Decryptor::<C>::new_from_slices(key, iv)
            .map_err(|e| Error::Crypto(format!("{} init: {e}", self.uri)))?;
        dec.decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|e| Error::Crypto(format!("{} decrypt: {e}", self.uri)))?;
        xmlenc_unpad(&buf, block)
    }
}

fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Remove W3C XML Encryption padding.
///
/// Only the last byte (the padding length) is checked, so both PKCS#7 and
/// ISO 10126 style padding are accepted.
fn xmlenc_unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>, Error> {
    let Some(&pad_byte) = data.last() else {
        return Ok(Vec::new());
    };
    let pad_len = pad_byte as usize;
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(Error::Crypto("invalid padding".into()));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkcs7_pad_full_block() {
        let padded = pkcs7_pad(b"0123456789abcdef", 16);
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
        assert_eq!(xmlenc_unpad(&padded, 16).unwrap(), b"0123456789abcdef");
    }

    #[test]
    fn test_iso10126_unpad() {
        let mut data = b"hello world!".to_vec();
        data.extend_from_slice(&[0xAB, 0xCD, 0xEF, 0x04]);
        assert_eq!(xmlenc_unpad(&data, 16).unwrap(), b"hello world!");
        data.pop();
        data.push(0x11);
        assert!(xmlenc_unpad(&data, 16).is_err());
    }

    #[test]
    fn test_cbc_roundtrip_all_ciphers() {
        let plaintexts: &[&[u8]] = &[b"", b"A", b"Exactly16bytes!!", b"spans several cipher blocks of data"];
        for uri in [
            algorithm::AES128_CBC,
            algorithm::AES192_CBC,
            algorithm::AES256_CBC,
            algorithm::TRIPLEDES_CBC,
        ] {
            let cipher = from_uri(uri).unwrap();
            let key = generate_key(cipher.key_size());
            for &pt in plaintexts {
                let ct = cipher.encrypt(&key, pt).unwrap();
                assert_eq!(cipher.decrypt(&key, &ct).unwrap(), pt, "{uri}");
            }
        }
    }

    #[test]
    fn test_iv_is_prepended_and_random() {
        let key = [7u8; 16];
        let cipher = from_uri(algorithm::AES128_CBC).unwrap();
        let a = cipher.encrypt(&key, b"same").unwrap();
        let b = cipher.encrypt(&key, b"same").unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a[..16], b[..16]);
    }

    #[test]
    fn test_bad_inputs() {
        let cipher = from_uri(algorithm::AES256_CBC).unwrap();
        assert!(cipher.encrypt(&[0u8; 16], b"x").is_err());
        assert!(cipher.decrypt(&[0u8; 32], &[0u8; 20]).is_err());
        assert!(from_uri("http://www.w3.org/2009/xmlenc11#aes128-gcm").is_err());
    }
}
