//! Application supplied identifiers.
//!
//! Firmware describes its devices and its message kinds as closed enumerations. Both are
//! mapped onto a single byte on the wire, so the enumerations only need a stable ordinal and a
//! way back from it. The [`device_ids!`](crate::device_ids) and
//! [`packet_kinds!`](crate::packet_kinds) macros generate both halves.

use core::fmt::Debug;

/// Identifier of a peer in application terms.
///
/// Ordinals are `0..COUNT`; `COUNT` itself is the sentinel marking the end of the valid range.
pub trait DeviceId: Copy + Eq + Debug + 'static {
    /// Number of valid device ids.
    const COUNT: u8;

    /// Ordinal of this id.
    fn to_raw(self) -> u8;

    /// Map an ordinal back to an id, `None` if it is out of range.
    fn from_raw(raw: u8) -> Option<Self>;
}

/// Application defined message kind.
///
/// Ordinals must stay below [`INTERNAL_TAG_BASE`](crate::packet::INTERNAL_TAG_BASE), the upper half
/// of the tag space belongs to protocol messages.
pub trait PacketKind: Copy + Eq + Debug + 'static {
    /// Number of application message kinds.
    const COUNT: u8;

    fn to_raw(self) -> u8;

    fn from_raw(raw: u8) -> Option<Self>;
}

/// Define a device id enumeration implementing [`DeviceId`].
///
/// ```ignore
/// commlink::device_ids! {
///     pub enum Node { Gateway, Sensor, Display }
/// }
/// ```
#[macro_export]
macro_rules! device_ids {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $crate::__closed_enum!($crate::id::DeviceId, $(#[$meta])* $vis enum $name { $($variant),+ });
    };
}

/// Define a packet kind enumeration implementing [`PacketKind`].
#[macro_export]
macro_rules! packet_kinds {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $crate::__closed_enum!($crate::id::PacketKind, $(#[$meta])* $vis enum $name { $($variant),+ });
        const _: () = assert!(
            <$name as $crate::id::PacketKind>::COUNT <= $crate::packet::INTERNAL_TAG_BASE,
            "too many packet kinds"
        );
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __closed_enum {
    ($tr:path, $(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl $tr for $name {
            const COUNT: u8 = Self::ALL.len() as u8;

            fn to_raw(self) -> u8 {
                self as u8
            }

            fn from_raw(raw: u8) -> Option<Self> {
                Self::ALL.get(raw as usize).copied()
            }
        }
    };
}
