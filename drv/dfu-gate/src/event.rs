// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Update lifecycle events, as delivered by the management event callback.
//!
//! The callback hands us a raw event code, an optional untyped payload, and
//! (out of band) the id of the area the current upload was written to.  We
//! turn that into a [`LifecycleEvent`] once, here, and nothing past this
//! point looks at raw codes.

/// Management event group for image management.
pub const IMAGE_GROUP: u32 = 3;

const fn event_code(group: u32, id: u32) -> u32 {
    (group << 16) | (1 << id)
}

/// An upload has finished and is staged, waiting to be tested.
pub const DFU_PENDING: u32 = event_code(IMAGE_GROUP, 3);
/// A staged image has been confirmed.
pub const DFU_CONFIRMED: u32 = event_code(IMAGE_GROUP, 4);

/// Mask to register with to receive every event we handle.
pub const NOTIFICATION_MASK: u32 = DFU_PENDING | DFU_CONFIRMED;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LifecycleEvent {
    /// The upload to `area_id` is complete.  The id is passed through
    /// unvalidated; negative or oversized values mean the update manager
    /// doesn't know where the image went.
    Pending { area_id: i32 },
    /// `image` is the confirmed image index, if the event carried one.
    Confirmed { image: Option<u8> },
}

impl LifecycleEvent {
    /// Decodes a raw management event.  Returns `None` for events we don't
    /// handle.
    ///
    /// A confirmation payload is a single byte holding the image index;
    /// anything else is treated as absent.
    pub fn decode(
        code: u32,
        payload: Option<&[u8]>,
        upload_area: i32,
    ) -> Option<Self> {
        match code {
            DFU_PENDING => Some(Self::Pending {
                area_id: upload_area,
            }),
            DFU_CONFIRMED => {
                let image = match payload {
                    Some(&[image]) => Some(image),
                    _ => None,
                };
                Some(Self::Confirmed { image })
            }
            _ => None,
        }
    }
}
