//! Push-message verification and (de)encryption.
//!
//! Plaintext mode signs `token`, `timestamp` and `nonce`. AES mode also signs
//! the `Encrypt` payload, which is AES-256-CBC over
//! `random(16) | len(4, BE) | xml | app_id` with 32-byte PKCS#7 padding.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use super::config::WechatConfig;
use super::message::{EncryptedEnvelope, InboundMessage, cdata};
use crate::error::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const PAD_BLOCK: usize = 32;

/// EncodingAESKey is unpadded base64 whose trailing bits are not always zero.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Query parameters WeChat attaches to every push request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookParams {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub echostr: Option<String>,
    pub encrypt_type: Option<String>,
    pub msg_signature: Option<String>,
}

impl WebhookParams {
    fn is_encrypted(&self) -> bool {
        self.encrypt_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("aes"))
    }
}

/// A verified push message.
#[derive(Debug, Clone)]
pub struct Opened {
    pub message: InboundMessage,
    /// Whether the reply must be sealed.
    pub encrypted: bool,
}

/// Hex SHA-1 over the lexicographically sorted concatenation of `parts`.
#[must_use]
pub fn signature(parts: &[&str]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_unstable();
    hex::encode(Sha1::digest(sorted.concat().as_bytes()))
}

/// Verifies, decrypts and seals push messages for one official account.
#[derive(Clone)]
pub struct WebhookVerifier {
    token: String,
    app_id: String,
    aes_key: Option<[u8; 32]>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("app_id", &self.app_id)
            .field("encrypted", &self.aes_key.is_some())
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    #[must_use]
    pub fn new(token: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            app_id: app_id.into(),
            aes_key: None,
        }
    }

    /// Enable AES mode with a 43-character EncodingAESKey.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key does not decode to 32 bytes.
    pub fn with_encoding_aes_key(mut self, encoding_aes_key: &str) -> Result<Self, Error> {
        let bytes = KEY_ENGINE
            .decode(format!("{encoding_aes_key}="))
            .map_err(|e| Error::Config(format!("WECHAT_AESKEY: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Config(format!("WECHAT_AESKEY: expected 32 bytes, got {}", b.len()))
        })?;
        self.aes_key = Some(key);
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured EncodingAESKey is invalid.
    pub fn from_config(config: &WechatConfig) -> Result<Self, Error> {
        let verifier = Self::new(config.token(), config.app_id());
        match config.encoding_aes_key() {
            Some(key) => verifier.with_encoding_aes_key(key),
            None => Ok(verifier),
        }
    }

    fn check(
        &self,
        expected: Option<&str>,
        extra: Option<&str>,
        params: &WebhookParams,
    ) -> Result<(), Error> {
        let timestamp = params.timestamp.as_deref().ok_or(Error::Signature)?;
        let nonce = params.nonce.as_deref().ok_or(Error::Signature)?;
        let expected = expected.ok_or(Error::Signature)?;

        let mut parts = vec![self.token.as_str(), timestamp, nonce];
        parts.extend(extra);
        if signature(&parts).eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(Error::Signature)
        }
    }

    /// Answers the server-URL verification handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signature`] if the signature or `echostr` is missing or wrong.
    pub fn verify_url(&self, params: &WebhookParams) -> Result<String, Error> {
        self.check(params.signature.as_deref(), None, params)?;
        params.echostr.clone().ok_or(Error::Signature)
    }

    /// Verifies a push request and decodes its message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signature`] on a bad signature, [`Error::Crypto`] if an
    /// encrypted payload cannot be opened, or [`Error::Message`] on malformed XML.
    pub fn open(&self, params: &WebhookParams, body: &str) -> Result<Opened, Error> {
        if !params.is_encrypted() {
            self.check(params.signature.as_deref(), None, params)?;
            return Ok(Opened {
                message: InboundMessage::parse_xml(body)?,
                encrypted: false,
            });
        }

        let key = self
            .aes_key
            .as_ref()
            .ok_or_else(|| Error::Crypto("encrypted push but no EncodingAESKey configured".into()))?;
        let envelope = EncryptedEnvelope::parse_xml(body)?;
        self.check(params.msg_signature.as_deref(), Some(envelope.encrypt.as_str()), params)?;
        let xml = self.decrypt(key, &envelope.encrypt)?;

        Ok(Opened {
            message: InboundMessage::parse_xml(&xml)?,
            encrypted: true,
        })
    }

    /// Produces the response body for a reply.
    ///
    /// Plain replies are returned as-is; encrypted ones are wrapped in a
    /// signed envelope reusing the request's timestamp and nonce.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if encryption is requested without a key.
    pub fn seal(
        &self,
        reply_xml: &str,
        encrypted: bool,
        params: &WebhookParams,
    ) -> Result<String, Error> {
        if !encrypted {
            return Ok(reply_xml.to_string());
        }
        let key = self
            .aes_key
            .as_ref()
            .ok_or_else(|| Error::Crypto("no EncodingAESKey configured".into()))?;

        let timestamp = params
            .timestamp
            .clone()
            .unwrap_or_else(|| time::OffsetDateTime::now_utc().unix_timestamp().to_string());
        let nonce = params
            .nonce
            .clone()
            .unwrap_or_else(|| rand::rng().random::<u32>().to_string());
        let encrypt = self.encrypt(key, reply_xml)?;
        let msg_signature = signature(&[
            self.token.as_str(),
            timestamp.as_str(),
            nonce.as_str(),
            encrypt.as_str(),
        ]);

        Ok(format!(
            "<xml><Encrypt>{}</Encrypt><MsgSignature>{}</MsgSignature>\
             <TimeStamp>{}</TimeStamp><Nonce>{}</Nonce></xml>",
            cdata(&encrypt),
            cdata(&msg_signature),
            timestamp,
            cdata(&nonce),
        ))
    }

    fn decrypt(&self, key: &[u8; 32], encrypted: &str) -> Result<String, Error> {
        let mut buf = STANDARD
            .decode(encrypted.trim())
            .map_err(|e| Error::Crypto(format!("base64: {e}")))?;
        let cipher = Aes256CbcDec::new_from_slices(key, &key[..16])
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let padded = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let pad = usize::from(*padded.last().ok_or_else(|| Error::Crypto("empty payload".into()))?);
        if pad == 0 || pad > PAD_BLOCK || pad > padded.len() {
            return Err(Error::Crypto("bad padding".into()));
        }
        let plain = &padded[..padded.len() - pad];
        if plain.len() < 20 {
            return Err(Error::Crypto("payload too short".into()));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&plain[16..20]);
        let msg_end = usize::try_from(u32::from_be_bytes(len_bytes))
            .ok()
            .and_then(|len| len.checked_add(20))
            .filter(|end| *end <= plain.len())
            .ok_or_else(|| Error::Crypto("bad message length".into()))?;

        if &plain[msg_end..] != self.app_id.as_bytes() {
            return Err(Error::Crypto("app id mismatch".into()));
        }
        String::from_utf8(plain[20..msg_end].to_vec())
            .map_err(|e| Error::Crypto(format!("utf-8: {e}")))
    }

    fn encrypt(&self, key: &[u8; 32], xml: &str) -> Result<String, Error> {
        let len = u32::try_from(xml.len()).map_err(|_| Error::Crypto("reply too large".into()))?;
        let random: [u8; 16] = rand::rng().random();

        let mut buf = Vec::with_capacity(20 + xml.len() + self.app_id.len() + PAD_BLOCK);
        buf.extend_from_slice(&random);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(xml.as_bytes());
        buf.extend_from_slice(self.app_id.as_bytes());
        let pad = PAD_BLOCK - buf.len() % PAD_BLOCK;
        // pad is in 1..=32
        buf.resize(buf.len() + pad, pad as u8);

        let msg_len = buf.len();
        let cipher = Aes256CbcEnc::new_from_slices(key, &key[..16])
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let sealed = cipher
            .encrypt_padded_mut::<NoPadding>(&mut buf, msg_len)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(STANDARD.encode(sealed))
    }
}
