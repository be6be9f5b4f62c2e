//! Key normalization applied before a key is routed.
//!
//! Cache servers only accept short keys without whitespace or control
//! characters, so every key passes through a translator before it reaches a
//! locator.

use std::borrow::Cow;

use sha2::{Digest, Sha256};

use crate::config::KeyTranslatorKind;
use crate::error::RoutingError;

/// Longest key, in bytes, a cache server accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Turns a caller's key into the key sent to, and routed for, a cache host.
pub trait KeyTranslator: Send + Sync {
    /// Translate `key`, or reject it.
    fn translate<'a>(&self, key: &'a str) -> Result<Cow<'a, str>, RoutingError>;
}

/// Accepts protocol-safe keys unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyTranslator;

impl KeyTranslator for DefaultKeyTranslator {
    fn translate<'a>(&self, key: &'a str) -> Result<Cow<'a, str>, RoutingError> {
        let reason = if key.is_empty() {
            Some("key is empty")
        } else if key.len() > MAX_KEY_LENGTH {
            Some("key is longer than 250 bytes")
        } else if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("key contains whitespace or control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RoutingError::InvalidKey {
                key: key.to_string(),
                reason,
            }),
            None => Ok(Cow::Borrowed(key)),
        }
    }
}

/// Hashes keys that are too long, then applies the default rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargeKeyHashingTranslator {
    inner: DefaultKeyTranslator,
}

impl KeyTranslator for LargeKeyHashingTranslator {
    fn translate<'a>(&self, key: &'a str) -> Result<Cow<'a, str>, RoutingError> {
        if key.len() <= MAX_KEY_LENGTH {
            return self.inner.translate(key);
        }

        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.inner.translate(&digest)?;
        Ok(Cow::Owned(digest))
    }
}

/// The translator chosen by configuration.
#[derive(Debug, Clone, Copy)]
pub enum Translator {
    /// See [`DefaultKeyTranslator`].
    Default(DefaultKeyTranslator),
    /// See [`LargeKeyHashingTranslator`].
    LargeKeyHashing(LargeKeyHashingTranslator),
}

impl From<KeyTranslatorKind> for Translator {
    fn from(kind: KeyTranslatorKind) -> Self {
        match kind {
            KeyTranslatorKind::Default => Self::Default(DefaultKeyTranslator),
            KeyTranslatorKind::LargeKeyHashing => {
                Self::LargeKeyHashing(LargeKeyHashingTranslator::default())
            }
        }
    }
}

impl KeyTranslator for Translator {
    fn translate<'a>(&self, key: &'a str) -> Result<Cow<'a, str>, RoutingError> {
        match self {
            Self::Default(translator) => translator.translate(key),
            Self::LargeKeyHashing(translator) => translator.translate(key),
        }
    }
}
