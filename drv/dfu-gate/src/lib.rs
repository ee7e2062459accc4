// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gate that decides whether a freshly staged firmware image may proceed.
//!
//! When the update manager reports that an upload has been staged, we pull
//! the SHA-256 digest the image carries out of its trailer and compare it
//! with the digest we were told to expect.  A match lets the update go on;
//! a mismatch abandons it, which asks the platform to erase the staged
//! image.
//!
//! It is entirely possible for the comparison to be impossible: the update
//! manager may not know where the upload went, the image may be malformed,
//! or no expected digest may have arrived yet.  What happens then is up to
//! the [`FailurePolicy`] in the gate's [`GateConfig`].
//!
//! The gate never computes a digest itself, and it never looks at the
//! payload.  The digest in the trailer is whatever the uploader put there.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod event;
pub mod reference;

pub use config::{FailurePolicy, GateConfig};
pub use event::{LifecycleEvent, NOTIFICATION_MASK};
pub use reference::{ReferenceDigest, ReferenceError, REFERENCE};

use mcuboot_image::{AreaId, FlashMap, ImageError, ImageVersion, Sha256Digest};
use ringbuf::{ringbuf, ringbuf_entry};

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Pending(i32),
    UnknownArea(i32),
    DigestUnavailable(u8, ImageError),
    Staged {
        area: u8,
        version: ImageVersion,
        image_size: u32,
        digest: Sha256Digest,
    },
    NoReference,
    Match,
    Mismatch {
        expected: Sha256Digest,
    },
    Inconclusive(FailurePolicy),
    Abandoning {
        retries: u8,
    },
    AbortFailed(AbortError),
    Confirmed(u8),
}

ringbuf!(Trace, 16, Trace::None);

/// Failure reported by the platform when asked to abandon a staged image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AbortError(pub i32);

/// The platform's way of throwing away a staged image.
pub trait AbortAction {
    fn abandon(&mut self, retries: u8) -> Result<(), AbortError>;
}

impl<T: AbortAction + ?Sized> AbortAction for &mut T {
    fn abandon(&mut self, retries: u8) -> Result<(), AbortError> {
        (**self).abandon(retries)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GateState {
    /// No upload seen yet.
    Idle,
    /// An upload is staged and being checked.
    Pending,
    /// The last staged image was let through.
    Accepted,
    /// The last staged image was thrown away.
    Abandoned,
}

/// Why a staged image could not be checked.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Inconclusive {
    /// The update manager gave an area id that can't name an area.
    UnknownArea(i32),
    /// The area couldn't be read, or didn't hold a well-formed image.
    DigestUnavailable(ImageError),
    /// No expected digest has been supplied.
    NoReference,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Check {
    Match,
    Mismatch,
    Inconclusive(Inconclusive),
}

/// Result of checking one staged image.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    pub check: Check,
    /// Either [`GateState::Accepted`] or [`GateState::Abandoned`].
    pub state: GateState,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Disposition {
    Verified(Verdict),
    /// An image was confirmed; the index is 0 if the event didn't say.
    Confirmed { image: u8 },
}

pub struct Gate<'r, M, A> {
    map: M,
    abort: A,
    reference: &'r ReferenceDigest,
    config: GateConfig,
    state: GateState,
}

impl<'r, M: FlashMap, A: AbortAction> Gate<'r, M, A> {
    pub fn new(
        map: M,
        abort: A,
        reference: &'r ReferenceDigest,
        config: GateConfig,
    ) -> Self {
        Self {
            map,
            abort,
            reference,
            config,
            state: GateState::Idle,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn abort_action(&self) -> &A {
        &self.abort
    }

    /// Decodes and handles a raw management event.  Events we don't
    /// subscribe to are ignored and yield `None`.
    pub fn dispatch_raw(
        &mut self,
        code: u32,
        payload: Option<&[u8]>,
        upload_area: i32,
    ) -> Option<Disposition> {
        let event = LifecycleEvent::decode(code, payload, upload_area)?;
        Some(self.handle(event))
    }

    pub fn handle(&mut self, event: LifecycleEvent) -> Disposition {
        match event {
            LifecycleEvent::Pending { area_id } => {
                Disposition::Verified(self.verify(area_id))
            }
            LifecycleEvent::Confirmed { image } => {
                let image = image.unwrap_or(0);
                ringbuf_entry!(Trace::Confirmed(image));
                Disposition::Confirmed { image }
            }
        }
    }

    fn verify(&mut self, area_id: i32) -> Verdict {
        ringbuf_entry!(Trace::Pending(area_id));
        self.state = GateState::Pending;

        let check = self.check(area_id);
        let accept = match check {
            Check::Match => {
                ringbuf_entry!(Trace::Match);
                true
            }
            Check::Mismatch => false,
            Check::Inconclusive(_) => {
                let policy = self.config.on_inconclusive;
                ringbuf_entry!(Trace::Inconclusive(policy));
                policy == FailurePolicy::FailOpen
            }
        };

        self.state = if accept {
            GateState::Accepted
        } else {
            self.abandon();
            GateState::Abandoned
        };

        Verdict {
            check,
            state: self.state,
        }
    }

    fn check(&self, area_id: i32) -> Check {
        let Ok(area) = AreaId::try_from(area_id) else {
            ringbuf_entry!(Trace::UnknownArea(area_id));
            return Check::Inconclusive(Inconclusive::UnknownArea(area_id));
        };

        // The area is open only for the duration of this call.
        let summary = match mcuboot_image::summarize_area(&self.map, area) {
            Ok(summary) => summary,
            Err(e) => {
                ringbuf_entry!(Trace::DigestUnavailable(area.0, e));
                return Check::Inconclusive(Inconclusive::DigestUnavailable(
                    e,
                ));
            }
        };
        ringbuf_entry!(Trace::Staged {
            area: area.0,
            version: summary.version,
            image_size: summary.image_size,
            digest: summary.digest,
        });

        let Some(expected) = self.reference.get() else {
            ringbuf_entry!(Trace::NoReference);
            return Check::Inconclusive(Inconclusive::NoReference);
        };

        if summary.digest == expected {
            Check::Match
        } else {
            ringbuf_entry!(Trace::Mismatch { expected });
            Check::Mismatch
        }
    }

    fn abandon(&mut self) {
        let retries = self.config.abort_retries;
        ringbuf_entry!(Trace::Abandoning { retries });
        if let Err(e) = self.abort.abandon(retries) {
            // There's nothing more we can do about it from here.
            ringbuf_entry!(Trace::AbortFailed(e));
        }
    }
}
