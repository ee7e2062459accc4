// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lays out images in memory.
//!
//! This is for tests and host tooling; it makes no attempt to produce a
//! bootable image (there is no signature, and the digest is whatever the
//! caller asks for).  It will happily produce malformed images too, since
//! that's mostly what the tests want.

use crate::header::{ImageHeader, ImageVersion, IMAGE_MAGIC};
use crate::tlv::{
    IMAGE_TLV_INFO_MAGIC, IMAGE_TLV_PROT_INFO_MAGIC, IMAGE_TLV_SHA256,
};
use crate::Sha256Digest;
use zerocopy::{FromZeros, IntoBytes, U16, U32};

#[derive(Clone, Debug)]
pub struct ImageBuilder {
    magic: u32,
    header_size: u16,
    version: (u8, u8, u16, u32),
    payload: Vec<u8>,
    protected: Vec<(u16, Vec<u8>)>,
    info: Vec<(u16, Vec<u8>)>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            magic: IMAGE_MAGIC,
            header_size: ImageHeader::SIZE as u16,
            version: (0, 0, 0, 0),
            payload: Vec::new(),
            protected: Vec::new(),
            info: Vec::new(),
        }
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    /// Header size as recorded in the header.  Anything past the 32 bytes
    /// of the header proper is zero padding.
    pub fn header_size(mut self, header_size: u16) -> Self {
        self.header_size = header_size;
        self
    }

    pub fn version(
        mut self,
        major: u8,
        minor: u8,
        revision: u16,
        build_num: u32,
    ) -> Self {
        self.version = (major, minor, revision, build_num);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn protected_tlv(mut self, kind: u16, value: &[u8]) -> Self {
        self.protected.push((kind, value.to_vec()));
        self
    }

    pub fn info_tlv(mut self, kind: u16, value: &[u8]) -> Self {
        self.info.push((kind, value.to_vec()));
        self
    }

    pub fn sha256(self, digest: Sha256Digest) -> Self {
        self.info_tlv(IMAGE_TLV_SHA256, digest.as_bytes())
    }

    fn region(magic: u16, records: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let body_len: usize =
            records.iter().map(|(_, value)| 4 + value.len()).sum();
        let mut out = Vec::with_capacity(4 + body_len);
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&((4 + body_len) as u16).to_le_bytes());
        for (kind, value) in records {
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&(value.len() as u16).to_le_bytes());
            out.extend_from_slice(value);
        }
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let protected = if self.protected.is_empty() {
            Vec::new()
        } else {
            Self::region(IMAGE_TLV_PROT_INFO_MAGIC, &self.protected)
        };

        let (major, minor, revision, build_num) = self.version;
        let mut header = ImageHeader::new_zeroed();
        header.magic = U32::new(self.magic);
        header.header_size = U16::new(self.header_size);
        header.protect_tlv_size = U16::new(protected.len() as u16);
        header.image_size = U32::new(self.payload.len() as u32);
        header.version = ImageVersion {
            major,
            minor,
            revision: U16::new(revision),
            build_num: U32::new(build_num),
        };

        let mut out = header.as_bytes().to_vec();
        // A header_size below 32 is malformed; keep the full header so the
        // reader still sees it.
        out.resize(out.len().max(usize::from(self.header_size)), 0);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&protected);
        out.extend(Self::region(IMAGE_TLV_INFO_MAGIC, &self.info));
        out
    }
}
