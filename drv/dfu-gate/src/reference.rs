// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The digest we expect the next staged image to carry.
//!
//! The expected digest is fetched from elsewhere (over the network, in
//! practice) and may arrive at any time relative to an upload, so it is kept
//! behind a lock and handed out by value.

use mcuboot_image::{Sha256Digest, SHA256_LEN};
use spin::Mutex;

/// Process-wide expected digest.  The platform glue owns it: the network
/// fetch writes it, and the gate built for the management callback borrows
/// it.
pub static REFERENCE: ReferenceDigest = ReferenceDigest::new();

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReferenceError {
    /// The supplied digest was not exactly 32 bytes.
    BadLength,
}

#[derive(Debug, Default)]
pub struct ReferenceDigest {
    digest: Mutex<Option<Sha256Digest>>,
}

impl ReferenceDigest {
    pub const fn new() -> Self {
        Self {
            digest: Mutex::new(None),
        }
    }

    pub fn set(&self, digest: Sha256Digest) {
        *self.digest.lock() = Some(digest);
    }

    /// Sets the digest from raw bytes as received.  On error the previous
    /// digest, if any, is kept.
    pub fn set_from_slice(&self, bytes: &[u8]) -> Result<(), ReferenceError> {
        let raw: [u8; SHA256_LEN] =
            bytes.try_into().map_err(|_| ReferenceError::BadLength)?;
        self.set(Sha256Digest(raw));
        Ok(())
    }

    pub fn clear(&self) {
        *self.digest.lock() = None;
    }

    pub fn get(&self) -> Option<Sha256Digest> {
        *self.digest.lock()
    }
}
