// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access to the storage areas that hold staged images.
//!
//! The platform owns the actual flash driver; all this crate needs is a way
//! to open an area by id and to perform bounded reads from it.  Offsets are
//! always relative to the start of the area.  An open area is closed by
//! dropping its handle.

/// Identifies a storage area (an MCUboot slot) on the platform.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AreaId(pub u8);

impl TryFrom<i32> for AreaId {
    type Error = ();

    /// The update manager reports the area of an upload as a signed value,
    /// with negative numbers meaning "none".
    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        u8::try_from(raw).map(AreaId).map_err(|_| ())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlashError {
    /// The platform has no area with the requested id.
    NoSuchArea,
    /// The area could not be opened.
    OpenFailed,
    /// The underlying read failed.
    ReadFailed,
    /// The read would extend past the end of the area.
    OutOfBounds,
}

/// An open storage area.
pub trait FlashArea {
    /// Size of the area in bytes.
    fn size(&self) -> u32;

    /// Fills `dest` from `offset`.  Implementations must refuse reads that
    /// do not lie wholly inside the area.
    fn read(&self, offset: u32, dest: &mut [u8]) -> Result<(), FlashError>;
}

impl<T: FlashArea + ?Sized> FlashArea for &T {
    fn size(&self) -> u32 {
        (**self).size()
    }

    fn read(&self, offset: u32, dest: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(offset, dest)
    }
}

/// The set of storage areas known to the platform.
pub trait FlashMap {
    type Area<'a>: FlashArea
    where
        Self: 'a;

    fn open(&self, id: AreaId) -> Result<Self::Area<'_>, FlashError>;

    /// Offset within the area at which the image header sits.  This is zero
    /// for every layout we ship, but some boards reserve space in front of
    /// the image.
    fn image_start_offset(&self, _id: AreaId) -> u32 {
        0
    }
}

/// A storage area backed by memory, for images that are staged in RAM
/// rather than flash.
#[derive(Copy, Clone)]
pub struct RamArea<'a> {
    buffer: &'a [u8],
}

impl<'a> RamArea<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }
}

impl FlashArea for RamArea<'_> {
    fn size(&self) -> u32 {
        // Areas larger than 4 GiB are truncated; nothing past that point is
        // addressable by a u32 offset anyway.
        u32::try_from(self.buffer.len()).unwrap_or(u32::MAX)
    }

    fn read(&self, offset: u32, dest: &mut [u8]) -> Result<(), FlashError> {
        let start = offset as usize;
        let data = start
            .checked_add(dest.len())
            .and_then(|end| self.buffer.get(start..end))
            .ok_or(FlashError::OutOfBounds)?;
        dest.copy_from_slice(data);
        Ok(())
    }
}
