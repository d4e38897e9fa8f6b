//! Interface tokens and wire-stable operation codes.

use crate::parcel::Parcel;

pub const SAMGR_INTERFACE_TOKEN: &str = "samgr.ISystemAbilityManager";
pub const LOCAL_MANAGER_INTERFACE_TOKEN: &str = "samgr.ILocalAbilityManager";
pub const STATUS_LISTENER_INTERFACE_TOKEN: &str = "samgr.ISystemAbilityStatusChange";
pub const LOAD_CALLBACK_INTERFACE_TOKEN: &str = "samgr.ISystemAbilityLoadCallback";

/// Reads the interface token and compares it by exact match.
///
/// A parcel that cannot even be read counts as a mismatch.
pub fn enforce_interface(data: &mut Parcel, expected: &str) -> bool {
    matches!(data.read_interface_token(), Ok(token) if token == expected)
}

macro_rules! op_codes {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn code(self) -> u32 {
                self as u32
            }
        }

        impl TryFrom<u32> for $name {
            type Error = u32;

            fn try_from(code: u32) -> std::result::Result<Self, u32> {
                match code {
                    $($value => Ok(Self::$variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

op_codes! {
    /// Registry operations.
    SamgrCode {
        Get = 1,
        Check = 2,
        Add = 3,
        Remove = 4,
        List = 5,
        Subscribe = 6,
        Load = 7,
        LoadRemote = 8,
        CheckRemote = 9,
        AddOnDemandInfo = 10,
        CheckImmediate = 12,
        Unsubscribe = 18,
        AddProcess = 20,
    }
}

op_codes! {
    /// Per-process manager operations.
    LocalManagerCode {
        StartAbility = 1,
    }
}

op_codes! {
    /// Status listener callbacks.
    StatusListenerCode {
        OnAdd = 1,
        OnRemove = 2,
    }
}

op_codes! {
    /// Load callbacks.
    LoadCallbackCode {
        OnLoadSuccess = 1,
        OnLoadFail = 2,
        OnLoadRemote = 3,
    }
}
