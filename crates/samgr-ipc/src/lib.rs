//! # samgr ipc
//!
//! The inter-process surface every component talks through: a typed
//! [`Parcel`], the [`RemoteObject`] trait implemented by stubs, and
//! [`RemoteHandle`], which pairs a connection identity with liveness watches.
//!
//! The transport itself is in-process: `transact` dispatches straight into the
//! target stub. Stubs and proxies still go through a parcel so argument order
//! and reply codes stay exactly what a real channel would carry.

pub mod codes;
pub mod parcel;
pub mod remote;

pub use codes::{LoadCallbackCode, LocalManagerCode, SamgrCode, StatusListenerCode};
pub use parcel::Parcel;
pub use remote::{
    CallContext, DeathRecipient, HandleToken, MessageOption, RemoteHandle, RemoteObject, WatchId,
};
