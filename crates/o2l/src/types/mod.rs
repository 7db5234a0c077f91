//! Built-in runtime types: containers, iterators, records, enums,
//! protocols, errors, results, and FFI handles, together with their
//! per-type method tables consumed by the dispatcher.

pub(crate) mod enums;
pub(crate) mod error;
pub(crate) mod ffi_types;
pub(crate) mod list;
pub(crate) mod map;
pub(crate) mod number;
pub(crate) mod protocol;
pub(crate) mod record;
pub(crate) mod repeat;
pub(crate) mod result;
pub(crate) mod set;
pub(crate) mod text;

pub use enums::EnumInstance;
pub use error::ErrorInstance;
pub use ffi_types::{
    CArrayInstance, CBufferInstance, CCallbackInstance, CStructInstance, FfiHandle, FfiType,
    PtrInstance,
};
pub use list::{ListInstance, ListIterator};
pub use map::{MapEntry, MapInstance, MapIterator};
pub use protocol::{MethodSignature, ProtocolInstance};
pub use record::{RecordInstance, RecordType};
pub use repeat::RepeatIterator;
pub use result::ResultInstance;
pub use set::{SetInstance, SetIterator};
