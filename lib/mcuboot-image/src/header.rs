// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed header at the start of every image slot.

use crate::flash::FlashArea;
use crate::ImageError;
use static_assertions::const_assert_eq;
use zerocopy::{FromZeros, IntoBytes, LittleEndian, U16, U32};

pub const IMAGE_MAGIC: u32 = 0x96f3_b83d;

/// Semantic version carried in the image header.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    zerocopy_derive::FromBytes,
    zerocopy_derive::IntoBytes,
    zerocopy_derive::Immutable,
    zerocopy_derive::KnownLayout,
    zerocopy_derive::Unaligned,
)]
#[repr(C)]
pub struct ImageVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: U16<LittleEndian>,
    pub build_num: U32<LittleEndian>,
}

#[derive(
    Copy,
    Clone,
    Debug,
    zerocopy_derive::FromBytes,
    zerocopy_derive::IntoBytes,
    zerocopy_derive::Immutable,
    zerocopy_derive::KnownLayout,
    zerocopy_derive::Unaligned,
)]
#[repr(C)]
pub struct ImageHeader {
    pub magic: U32<LittleEndian>,
    pub load_addr: U32<LittleEndian>,
    /// Size of the header, including any padding before the payload.
    pub header_size: U16<LittleEndian>,
    /// Total size of the protected TLV region, zero if absent.
    pub protect_tlv_size: U16<LittleEndian>,
    /// Size of the payload, not counting the header.
    pub image_size: U32<LittleEndian>,
    pub flags: U32<LittleEndian>,
    pub version: ImageVersion,
    pub _pad: U32<LittleEndian>,
}

const_assert_eq!(core::mem::size_of::<ImageVersion>(), 8);
const_assert_eq!(core::mem::size_of::<ImageHeader>(), 32);

impl ImageHeader {
    pub const SIZE: u32 = core::mem::size_of::<ImageHeader>() as u32;

    /// Reads and validates the header found at `start` within `area`.
    pub fn read<A: FlashArea>(
        area: &A,
        start: u32,
    ) -> Result<Self, ImageError> {
        let mut header = ImageHeader::new_zeroed();
        area.read(start, header.as_mut_bytes())
            .map_err(ImageError::Io)?;

        if header.magic.get() != IMAGE_MAGIC {
            return Err(ImageError::Format);
        }
        // The payload cannot begin inside the header.
        if u32::from(header.header_size.get()) < Self::SIZE {
            return Err(ImageError::Format);
        }
        Ok(header)
    }

    /// Offset of the trailer (the first TLV info record) for an image whose
    /// header sits at `start`, checked against an area of `area_size`
    /// bytes.
    pub fn trailer_offset(
        &self,
        start: u32,
        area_size: u32,
    ) -> Result<u32, ImageError> {
        let offset = start
            .checked_add(u32::from(self.header_size.get()))
            .and_then(|o| o.checked_add(self.image_size.get()))
            .ok_or(ImageError::Overflow)?;
        if offset > area_size {
            return Err(ImageError::Overflow);
        }
        Ok(offset)
    }
}
