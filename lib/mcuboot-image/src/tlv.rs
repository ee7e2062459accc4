// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TLV regions in the image trailer.
//!
//! Immediately after the payload an image carries an optional *protected*
//! TLV region (covered by the image signature) followed by the mandatory
//! *info* region.  Each region opens with a [`TlvInfo`] record whose
//! `total_len` covers the whole region, info record included, and is then a
//! packed sequence of records: a [`TlvRecordHeader`] followed by `len` bytes
//! of value.
//!
//! Everything here is read out of a slot that may have been written by
//! anyone.  All record walking goes through [`RegionCursor`], which refuses
//! to hand out any range that ends past the region it was built for.

use core::ops::Range;

use crate::flash::FlashArea;
use crate::{ImageError, Sha256Digest, SHA256_LEN};
use static_assertions::const_assert_eq;
use zerocopy::{FromZeros, IntoBytes, LittleEndian, U16};

pub const IMAGE_TLV_INFO_MAGIC: u16 = 0x6907;
pub const IMAGE_TLV_PROT_INFO_MAGIC: u16 = 0x6908;

pub const IMAGE_TLV_KEYHASH: u16 = 0x01;
pub const IMAGE_TLV_SHA256: u16 = 0x10;

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
pub struct TlvInfo {
    pub magic: U16<LittleEndian>,
    pub total_len: U16<LittleEndian>,
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
pub struct TlvRecordHeader {
    pub kind: U16<LittleEndian>,
    pub len: U16<LittleEndian>,
}

const_assert_eq!(core::mem::size_of::<TlvInfo>(), 4);
const_assert_eq!(core::mem::size_of::<TlvRecordHeader>(), 4);

const TLV_INFO_SIZE: u32 = core::mem::size_of::<TlvInfo>() as u32;
const RECORD_HEADER_SIZE: u32 =
    core::mem::size_of::<TlvRecordHeader>() as u32;

/// Extent of one TLV region within an area.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TlvRegion {
    /// Offset of the first record (just past the info record).
    pub records_start: u32,
    /// One past the last byte of the region.
    pub end: u32,
}

impl TlvRegion {
    /// Looks for a region opening with `magic` at `offset`.
    ///
    /// A magic mismatch is reported as [`ImageError::NotFound`], which is
    /// how an absent optional region shows up.
    pub fn find<A: FlashArea>(
        area: &A,
        offset: u32,
        magic: u16,
    ) -> Result<Self, ImageError> {
        let records_start = offset
            .checked_add(TLV_INFO_SIZE)
            .filter(|&end| end <= area.size())
            .ok_or(ImageError::Overflow)?;

        let mut info = TlvInfo::new_zeroed();
        area.read(offset, info.as_mut_bytes())
            .map_err(ImageError::Io)?;

        if info.magic.get() != magic {
            return Err(ImageError::NotFound);
        }

        let total = u32::from(info.total_len.get());
        if total < TLV_INFO_SIZE {
            return Err(ImageError::Format);
        }
        let end = offset.checked_add(total).ok_or(ImageError::Overflow)?;
        if end > area.size() {
            return Err(ImageError::Overflow);
        }

        Ok(Self { records_start, end })
    }

    pub fn cursor<'a, A: FlashArea>(
        &self,
        area: &'a A,
    ) -> RegionCursor<'a, A> {
        RegionCursor {
            area,
            pos: self.records_start,
            end: self.end,
        }
    }
}

/// The protected region (if any) and the info region of one image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Trailer {
    pub protected: Option<TlvRegion>,
    pub info: TlvRegion,
}

impl Trailer {
    /// Locates the trailer regions starting at `offset`, the first byte
    /// past the payload.
    pub fn locate<A: FlashArea>(
        area: &A,
        offset: u32,
    ) -> Result<Self, ImageError> {
        let protected =
            match TlvRegion::find(area, offset, IMAGE_TLV_PROT_INFO_MAGIC) {
                Ok(region) => Some(region),
                Err(ImageError::NotFound) => None,
                Err(e) => return Err(e),
            };
        let info_offset = protected.map_or(offset, |p| p.end);

        let info = TlvRegion::find(area, info_offset, IMAGE_TLV_INFO_MAGIC)
            .map_err(|e| match e {
                // The info region is not optional.
                ImageError::NotFound => ImageError::Format,
                e => e,
            })?;

        Ok(Self { protected, info })
    }
}

/// One record within a region.  The value has already been checked to lie
/// within the region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TlvRecord {
    pub kind: u16,
    pub value: Range<u32>,
}

impl TlvRecord {
    pub fn len(&self) -> u32 {
        self.value.end - self.value.start
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Sequential, bounds-checked reader over the records of a region.
///
/// `take` is the only place that advances the cursor, and
/// therefore the only place that decides whether a span is inside the
/// region.
pub struct RegionCursor<'a, A> {
    area: &'a A,
    pos: u32,
    end: u32,
}

impl<'a, A: FlashArea> RegionCursor<'a, A> {
    pub fn remaining(&self) -> u32 {
        self.end.saturating_sub(self.pos)
    }

    /// Claims the next `len` bytes of the region.
    fn take(&mut self, len: u32) -> Result<Range<u32>, ImageError> {
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.end)
            .ok_or(ImageError::Overflow)?;
        self.pos = end;
        Ok(start..end)
    }

    /// Reads the next record header and claims its value.
    ///
    /// Returns `Ok(None)` once too little of the region is left to hold
    /// another record header.  A record whose value would run past the end
    /// of the region is an [`ImageError::Overflow`]; its value is never
    /// read.
    pub fn next_record(&mut self) -> Result<Option<TlvRecord>, ImageError> {
        if self.remaining() < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        let header_span = self.take(RECORD_HEADER_SIZE)?;
        let mut header = TlvRecordHeader::new_zeroed();
        self.area
            .read(header_span.start, header.as_mut_bytes())
            .map_err(ImageError::Io)?;

        let value = match self.take(u32::from(header.len.get())) {
            Ok(value) => value,
            Err(e) => {
                // Nothing after a bad length can be trusted.
                self.pos = self.end;
                return Err(e);
            }
        };

        Ok(Some(TlvRecord {
            kind: header.kind.get(),
            value,
        }))
    }

    /// Reads the value of `record` into `dest`, which must be exactly as
    /// long as the value.  A `dest` of any other length is refused with
    /// [`ImageError::Format`]; the record doesn't have the shape the caller
    /// expected.
    pub fn read_value(
        &self,
        record: &TlvRecord,
        dest: &mut [u8],
    ) -> Result<(), ImageError> {
        if dest.len() as u64 != u64::from(record.len()) {
            return Err(ImageError::Format);
        }
        self.area
            .read(record.value.start, dest)
            .map_err(ImageError::Io)
    }

    /// Finds the first record of `kind` whose value is exactly `dest.len()`
    /// bytes long and copies its value into `dest`.
    ///
    /// Records of the right kind but a different length are skipped, as is
    /// anything after the first match.
    pub fn find_into(
        &mut self,
        kind: u16,
        dest: &mut [u8],
    ) -> Result<(), ImageError> {
        while let Some(record) = self.next_record()? {
            if record.kind == kind
                && u64::from(record.len()) == dest.len() as u64
            {
                return self.read_value(&record, dest);
            }
        }
        Err(ImageError::NotFound)
    }

    /// Finds the SHA-256 digest of the image.
    pub fn find_sha256(&mut self) -> Result<Sha256Digest, ImageError> {
        let mut digest = [0u8; SHA256_LEN];
        self.find_into(IMAGE_TLV_SHA256, &mut digest)?;
        Ok(Sha256Digest(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::RamArea;
    use crate::FlashError;

    /// Lays out a single region with `magic` at offset 0.
    fn region(magic: u16, records: &[(u16, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (kind, value) in records {
            body.extend_from_slice(&kind.to_le_bytes());
            body.extend_from_slice(&(value.len() as u16).to_le_bytes());
            body.extend_from_slice(value);
        }
        let mut out = Vec::new();
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&(body.len() as u16 + 4).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn finds_region_bounds() {
        let bytes = region(IMAGE_TLV_INFO_MAGIC, &[(1, &[0xaa; 3][..])]);
        let area = RamArea::new(&bytes);
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        assert_eq!(
            found,
            TlvRegion {
                records_start: 4,
                end: 11
            }
        );
    }

    #[test]
    fn wrong_magic_is_not_found() {
        let bytes = region(IMAGE_TLV_INFO_MAGIC, &[]);
        let area = RamArea::new(&bytes);
        assert_eq!(
            TlvRegion::find(&area, 0, IMAGE_TLV_PROT_INFO_MAGIC),
            Err(ImageError::NotFound)
        );
    }

    #[test]
    fn info_record_past_area_is_overflow() {
        let bytes = [0x07u8, 0x69];
        let area = RamArea::new(&bytes);
        assert_eq!(
            TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC),
            Err(ImageError::Overflow)
        );
        assert_eq!(
            TlvRegion::find(&area, u32::MAX - 1, IMAGE_TLV_INFO_MAGIC),
            Err(ImageError::Overflow)
        );
    }

    #[test]
    fn total_len_smaller_than_info_is_format() {
        let bytes = [0x07u8, 0x69, 0x02, 0x00];
        let area = RamArea::new(&bytes);
        assert_eq!(
            TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC),
            Err(ImageError::Format)
        );
    }

    #[test]
    fn total_len_past_area_is_overflow() {
        let mut bytes = region(IMAGE_TLV_INFO_MAGIC, &[(1, &[0; 4][..])]);
        // Claim one more byte than the area holds.
        let claimed = bytes.len() as u16 + 1;
        bytes[2..4].copy_from_slice(&claimed.to_le_bytes());
        let area = RamArea::new(&bytes);
        assert_eq!(
            TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC),
            Err(ImageError::Overflow)
        );
    }

    #[test]
    fn trailer_skips_protected_region() {
        let mut bytes =
            region(IMAGE_TLV_PROT_INFO_MAGIC, &[(0x50, &[1; 8][..])]);
        let prot_len = bytes.len() as u32;
        bytes.extend(region(IMAGE_TLV_INFO_MAGIC, &[(1, &[2; 2][..])]));
        let area = RamArea::new(&bytes);

        let trailer = Trailer::locate(&area, 0).unwrap();
        assert_eq!(
            trailer.protected,
            Some(TlvRegion {
                records_start: 4,
                end: prot_len
            })
        );
        assert_eq!(trailer.info.records_start, prot_len + 4);
        assert_eq!(trailer.info.end, bytes.len() as u32);
    }

    #[test]
    fn trailer_without_info_region_is_format() {
        let mut bytes =
            region(IMAGE_TLV_PROT_INFO_MAGIC, &[(0x50, &[1; 8][..])]);
        bytes.extend_from_slice(&[0xff; 8]);
        let area = RamArea::new(&bytes);
        assert_eq!(Trailer::locate(&area, 0), Err(ImageError::Format));
    }

    #[test]
    fn first_matching_digest_wins() {
        let first = [0x11u8; 32];
        let second = [0x22u8; 32];
        let bytes = region(
            IMAGE_TLV_INFO_MAGIC,
            &[
                (IMAGE_TLV_KEYHASH, &[0x33; 32][..]),
                // Right kind, wrong length: skipped.
                (IMAGE_TLV_SHA256, &[0x44; 16][..]),
                (IMAGE_TLV_SHA256, &first[..]),
                (IMAGE_TLV_SHA256, &second[..]),
            ],
        );
        let area = RamArea::new(&bytes);
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        assert_eq!(
            found.cursor(&area).find_sha256(),
            Ok(Sha256Digest(first))
        );
    }

    #[test]
    fn missing_digest_is_not_found() {
        let bytes =
            region(IMAGE_TLV_INFO_MAGIC, &[(IMAGE_TLV_KEYHASH, &[0; 32][..])]);
        let area = RamArea::new(&bytes);
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        assert_eq!(
            found.cursor(&area).find_sha256(),
            Err(ImageError::NotFound)
        );
    }

    #[test]
    fn trailing_slop_shorter_than_a_header_ends_the_walk() {
        let mut bytes = region(IMAGE_TLV_INFO_MAGIC, &[(1, &[0; 2][..])]);
        bytes.extend_from_slice(&[0x10, 0x00, 0x20]);
        let total = bytes.len() as u16;
        bytes[2..4].copy_from_slice(&total.to_le_bytes());

        let area = RamArea::new(&bytes);
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        let mut cursor = found.cursor(&area);
        assert!(cursor.next_record().unwrap().is_some());
        assert_eq!(cursor.remaining(), 3);
        assert_eq!(cursor.next_record(), Ok(None));
    }

    /// Reads of the region beyond the record header are refused before
    /// they reach the area.
    struct Watched<'a> {
        inner: RamArea<'a>,
        limit: u32,
    }

    impl FlashArea for Watched<'_> {
        fn size(&self) -> u32 {
            self.inner.size()
        }

        fn read(
            &self,
            offset: u32,
            dest: &mut [u8],
        ) -> Result<(), FlashError> {
            assert!(
                offset as usize + dest.len() <= self.limit as usize,
                "read of {offset:#x}+{} past {:#x}",
                dest.len(),
                self.limit
            );
            self.inner.read(offset, dest)
        }
    }

    #[test]
    fn overlong_record_is_overflow_and_never_read() {
        let mut bytes =
            region(IMAGE_TLV_INFO_MAGIC, &[(IMAGE_TLV_SHA256, &[0; 32][..])]);
        // Shrink the region so the digest value no longer fits, and leave the
        // bytes after it in the area.
        let shrunk = bytes.len() as u16 - 1;
        bytes[2..4].copy_from_slice(&shrunk.to_le_bytes());

        let area = Watched {
            inner: RamArea::new(&bytes),
            limit: 8,
        };
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        let mut cursor = found.cursor(&area);
        assert_eq!(cursor.find_sha256(), Err(ImageError::Overflow));
        // The cursor is spent after an overflow.
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn overlong_record_before_digest_is_overflow() {
        let digest = [0x5au8; 32];
        let mut bytes = region(
            IMAGE_TLV_INFO_MAGIC,
            &[
                (IMAGE_TLV_KEYHASH, &[0; 4][..]),
                (IMAGE_TLV_SHA256, &digest[..]),
            ],
        );
        // The key hash claims 200 bytes but only 4 are there; the digest
        // after it would be found if the walk went on.
        bytes[6..8].copy_from_slice(&200u16.to_le_bytes());
        bytes.resize(bytes.len() + 256, 0xff);

        let area = Watched {
            inner: RamArea::new(&bytes),
            limit: 8,
        };
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        assert_eq!(found.end, 48);
        assert_eq!(
            found.cursor(&area).find_sha256(),
            Err(ImageError::Overflow)
        );
    }

    #[test]
    fn value_into_wrong_sized_buffer_is_refused() {
        let bytes = region(IMAGE_TLV_INFO_MAGIC, &[(0x30, &[7; 6][..])]);
        let area = RamArea::new(&bytes);
        let found = TlvRegion::find(&area, 0, IMAGE_TLV_INFO_MAGIC).unwrap();
        let mut cursor = found.cursor(&area);
        let record = cursor.next_record().unwrap().unwrap();

        let mut short = [0u8; 4];
        assert_eq!(
            cursor.read_value(&record, &mut short),
            Err(ImageError::Format)
        );
        let mut exact = [0u8; 6];
        cursor.read_value(&record, &mut exact).unwrap();
        assert_eq!(exact, [7; 6]);
    }
}
