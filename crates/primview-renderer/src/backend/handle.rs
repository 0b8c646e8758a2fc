//! Move-only GPU handles.
//!
//! Handles wrap a non-zero id issued by a device. They are neither `Clone`
//! nor `Copy`: whoever holds one owns the resource and gives it back to the
//! device through the matching `release_*` call.

use std::fmt;
use std::num::NonZeroU32;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a device-issued id.
            pub fn from_raw(id: NonZeroU32) -> Self {
                Self(id)
            }

            /// Returns the raw id.
            pub fn raw(&self) -> u32 {
                self.0.get()
            }

            /// Name of the resource kind, for error messages.
            pub const KIND: &'static str = $kind;
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

gpu_handle!(
    /// Vertex array: binds a buffer to a vertex layout.
    VertexArray,
    "vertex array"
);

gpu_handle!(
    /// Vertex or uniform buffer.
    Buffer,
    "buffer"
);

gpu_handle!(
    /// Linked shader program.
    Program,
    "program"
);

/// Monotonic id source shared by backends. Zero is never issued.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u32,
    limit: Option<u32>,
}

impl HandleAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: 1,
            limit: None,
        }
    }

    /// Caps the total number of ids this allocator will issue.
    pub(crate) fn set_limit(&mut self, limit: Option<u32>) {
        self.limit = limit;
    }

    /// Number of ids issued so far.
    pub(crate) fn issued(&self) -> u32 {
        self.next - 1
    }

    pub(crate) fn next(&mut self) -> Option<NonZeroU32> {
        if self.limit.is_some_and(|limit| self.issued() >= limit) {
            return None;
        }
        let id = NonZeroU32::new(self.next)?;
        self.next = self.next.checked_add(1)?;
        Some(id)
    }
}
