pub mod arena;
pub mod bridge;
pub mod closure;
pub mod guest;
pub mod raw;
pub mod refs;
pub mod slot;
pub mod value;
pub mod views;

pub use bridge::{Bridge, BridgeError, BridgeResult};
pub use closure::{ClosureHandle, ClosureVariant};
pub use guest::GuestRuntime;
pub use raw::RawValueRegistry;
pub use refs::ReferenceTable;
pub use slot::{KIND_OFFSET, Kind, SLOT_SIZE};
pub use value::{ElementKind, HostObject, HostValue, TypedView, UniqueToken};
pub use views::{GuestMemory, ViewManager, Views, ViewsMut};
