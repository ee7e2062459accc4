// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading the metadata of MCUboot images staged in a storage area.
//!
//! A staged image is laid out as
//!
//! ```text
//! [ ImageHeader | padding ][ payload ][ protected TLVs ]?[ info TLVs ]
//!  <- header_size ------>  <- image_size ->
//! ```
//!
//! and the SHA-256 digest we care about lives as a record in the info TLV
//! region.  Nothing about a staged image can be trusted: it was written by
//! whoever last spoke to the update manager.  Every offset read from the
//! image is checked against the area (and, for TLV records, against the
//! region that contains them) before it is used.
//!
//! This crate does not compute digests, it only finds the one the image
//! claims for itself.

#![cfg_attr(not(any(test, feature = "builder")), no_std)]

#[cfg(feature = "builder")]
pub mod builder;
pub mod flash;
pub mod header;
pub mod tlv;

use core::fmt;

pub use flash::{AreaId, FlashArea, FlashError, FlashMap, RamArea};
pub use header::{ImageHeader, ImageVersion, IMAGE_MAGIC};
pub use tlv::{RegionCursor, TlvRecord, TlvRegion, Trailer};

pub const SHA256_LEN: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageError {
    /// The storage area could not be opened or read.
    Io(FlashError),
    /// A mandatory magic number did not match, or a header field is
    /// internally inconsistent.
    Format,
    /// An optional region is absent, or a well-formed region holds no
    /// matching record.
    NotFound,
    /// A declared length reaches past the end of its region or area.
    Overflow,
}

impl From<FlashError> for ImageError {
    fn from(e: FlashError) -> Self {
        ImageError::Io(e)
    }
}

/// A SHA-256 digest as stored in (or expected of) an image.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Sha256Digest(pub [u8; SHA256_LEN]);

impl Sha256Digest {
    pub fn as_bytes(&self) -> &[u8; SHA256_LEN] {
        &self.0
    }
}

impl From<[u8; SHA256_LEN]> for Sha256Digest {
    fn from(bytes: [u8; SHA256_LEN]) -> Self {
        Self(bytes)
    }
}

/// Lower-case hex, the way the update tooling prints digests.
impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({self})")
    }
}

/// What a single pass over a staged image tells us.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ImageSummary {
    pub version: ImageVersion,
    pub image_size: u32,
    pub has_protected_tlvs: bool,
    pub digest: Sha256Digest,
}

/// Reads the header at `start`, locates the trailer and extracts the
/// SHA-256 digest the image carries.
pub fn summarize<A: FlashArea>(
    area: &A,
    start: u32,
) -> Result<ImageSummary, ImageError> {
    let header = ImageHeader::read(area, start)?;
    let trailer_offset = header.trailer_offset(start, area.size())?;
    let trailer = Trailer::locate(area, trailer_offset)?;
    let digest = trailer.info.cursor(area).find_sha256()?;

    Ok(ImageSummary {
        version: header.version,
        image_size: header.image_size.get(),
        has_protected_tlvs: trailer.protected.is_some(),
        digest,
    })
}

/// Extracts the SHA-256 digest of the image whose header sits at `start`.
pub fn read_image_sha256<A: FlashArea>(
    area: &A,
    start: u32,
) -> Result<Sha256Digest, ImageError> {
    summarize(area, start).map(|s| s.digest)
}

/// Opens area `id`, summarizes the image staged there, and closes it again.
pub fn summarize_area<M: FlashMap>(
    map: &M,
    id: AreaId,
) -> Result<ImageSummary, ImageError> {
    let area = map.open(id)?;
    summarize(&area, map.image_start_offset(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_prints_as_hex() {
        let mut bytes = [0u8; SHA256_LEN];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let digest = Sha256Digest(bytes);
        let text = format!("{digest}");
        assert_eq!(text.len(), 64);
        assert!(text.starts_with("ab00"));
        assert!(text.ends_with("0001"));
        assert_eq!(format!("{digest:?}"), format!("Sha256Digest({text})"));
    }

    #[test]
    fn flash_errors_become_io() {
        assert_eq!(
            ImageError::from(FlashError::ReadFailed),
            ImageError::Io(FlashError::ReadFailed)
        );
    }
}
