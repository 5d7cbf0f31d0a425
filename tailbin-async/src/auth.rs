//! credential scrambling for the authentication plugins the server
//! may negotiate
//!
//! reference: https://dev.mysql.com/doc/internals/en/authentication-method.html
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha1::{Digest, Sha1};
use sha2::Sha256;

pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
pub const SHA256_PASSWORD: &str = "sha256_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

/// caching_sha2_password single byte statuses
pub mod caching_sha2 {
    /// client asks for the server public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// server: scramble matched the cache, an OK follows
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// server: switch to the full exchange
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// sha256_password single byte request for the server public key
pub const SHA256_REQUEST_PUBLIC_KEY: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    MysqlNativePassword,
    MysqlClearPassword,
    Sha256Password,
    CachingSha2Password,
}

impl AuthPlugin {
    /// an empty name means the server predates pluggable auth and
    /// speaks mysql_native_password
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "" | MYSQL_NATIVE_PASSWORD => Ok(AuthPlugin::MysqlNativePassword),
            MYSQL_CLEAR_PASSWORD => Ok(AuthPlugin::MysqlClearPassword),
            SHA256_PASSWORD => Ok(AuthPlugin::Sha256Password),
            CACHING_SHA2_PASSWORD => Ok(AuthPlugin::CachingSha2Password),
            other => Err(Error::UnsupportedAuthPlugin(other.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthPlugin::MysqlNativePassword => MYSQL_NATIVE_PASSWORD,
            AuthPlugin::MysqlClearPassword => MYSQL_CLEAR_PASSWORD,
            AuthPlugin::Sha256Password => SHA256_PASSWORD,
            AuthPlugin::CachingSha2Password => CACHING_SHA2_PASSWORD,
        }
    }

    /// the scrambled credentials sent with the handshake response or
    /// after an auth switch
    pub fn scramble(&self, password: &str, seed: &[u8], secure: bool) -> Vec<u8> {
        match self {
            AuthPlugin::MysqlNativePassword => scramble411(password, seed),
            AuthPlugin::MysqlClearPassword => cleartext(password),
            AuthPlugin::CachingSha2Password => scramble_sha256(password, seed),
            AuthPlugin::Sha256Password => {
                if password.is_empty() {
                    vec![0]
                } else if secure {
                    cleartext(password)
                } else {
                    // public key not known yet, request it
                    vec![SHA256_REQUEST_PUBLIC_KEY]
                }
            }
        }
    }
}

/// password followed by a NUL byte
pub fn cleartext(password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(password.len() + 1);
    out.extend_from_slice(password.as_bytes());
    out.push(0);
    out
}

/// mysql_native_password: SHA1(pw) XOR SHA1(seed + SHA1(SHA1(pw)))
pub fn scramble411(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![];
    }
    let seed = if seed.len() > 20 { &seed[..20] } else { seed };

    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let stage1: [u8; 20] = hasher.finalize().into();

    let mut hasher = Sha1::new();
    hasher.update(stage1);
    let stage2: [u8; 20] = hasher.finalize().into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// caching_sha2_password fast path:
/// SHA256(pw) XOR SHA256(SHA256(SHA256(pw)) + seed)
pub fn scramble_sha256(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![];
    }
    let seed = if seed.len() > 20 { &seed[..20] } else { seed };

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let stage1: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(stage1);
    let stage2: [u8; 32] = hasher.finalize().into();

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(seed);
    let stage3: [u8; 32] = hasher.finalize().into();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// full authentication over an untrusted transport: the NUL
/// terminated password is XORed against the rotating seed and RSA
/// encrypted (OAEP-SHA1) with the server public key PEM
pub fn encrypt_password(password: &str, seed: &[u8], public_key_pem: &[u8]) -> Result<Vec<u8>> {
    if seed.is_empty() {
        return Err(Error::Protocol("empty auth seed".to_owned()));
    }
    let mut pw = cleartext(password);
    for (i, b) in pw.iter_mut().enumerate() {
        *b ^= seed[i % seed.len()];
    }
    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| Error::Protocol(format!("public key is not valid PEM: {}", e)))?;
    // servers emit either SubjectPublicKeyInfo or PKCS#1
    let public_key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::Protocol(format!("invalid server public key: {}", e)))?;
    let padding = rsa::Oaep::new::<Sha1>();
    public_key
        .encrypt(&mut OsRng, padding, &pw)
        .map_err(|e| Error::Protocol(format!("rsa encryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_names() {
        assert_eq!(
            AuthPlugin::MysqlNativePassword,
            AuthPlugin::from_name("").unwrap()
        );
        assert_eq!(
            AuthPlugin::CachingSha2Password,
            AuthPlugin::from_name("caching_sha2_password").unwrap()
        );
        assert!(matches!(
            AuthPlugin::from_name("dialog"),
            Err(Error::UnsupportedAuthPlugin(_))
        ));
    }

    #[test]
    fn test_scramble411_fixture() {
        // password "secret" with seed 01 02 .. 14
        let seed: Vec<u8> = (1u8..=20).collect();
        let rst = scramble411("secret", &seed);
        assert_eq!(20, rst.len());
        // computed with the documented algorithm: sha1 of "secret" is
        // e5e9fa1ba31ecd1ae84f75caaa474f3a663f05f4
        let stage1 = {
            let mut h = Sha1::new();
            h.update(b"secret");
            let out: [u8; 20] = h.finalize().into();
            out
        };
        let stage2 = {
            let mut h = Sha1::new();
            h.update(stage1);
            let out: [u8; 20] = h.finalize().into();
            out
        };
        let expected: Vec<u8> = {
            let mut h = Sha1::new();
            h.update(&seed);
            h.update(stage2);
            let mix: [u8; 20] = h.finalize().into();
            mix.iter().zip(stage1.iter()).map(|(a, b)| a ^ b).collect()
        };
        assert_eq!(expected, rst);
    }

    #[test]
    fn test_scramble411_empty_password() {
        assert!(scramble411("", &[0u8; 20]).is_empty());
    }

    #[test]
    fn test_scramble_sha256() {
        let seed = [7u8; 20];
        let rst = scramble_sha256("secret", &seed);
        assert_eq!(32, rst.len());
        assert_eq!(rst, scramble_sha256("secret", &seed));
        assert_ne!(rst, scramble_sha256("other", &seed));
        assert!(scramble_sha256("", &seed).is_empty());
    }

    #[test]
    fn test_initial_response_sha256() {
        let seed = [1u8; 20];
        assert_eq!(
            vec![0],
            AuthPlugin::Sha256Password.scramble("", &seed, false)
        );
        assert_eq!(
            vec![SHA256_REQUEST_PUBLIC_KEY],
            AuthPlugin::Sha256Password.scramble("pw", &seed, false)
        );
        assert_eq!(
            b"pw\x00".to_vec(),
            AuthPlugin::Sha256Password.scramble("pw", &seed, true)
        );
    }

    #[test]
    fn test_cleartext() {
        assert_eq!(b"secret\x00".to_vec(), cleartext("secret"));
    }
}
