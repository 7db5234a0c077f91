use std::{cell::RefCell, rc::Rc};

use strum::{Display, EnumString};

// Opaque FFI handle values. The dispatcher treats these as leaves: they
// expose no methods of their own, all manipulation goes through the `ffi`
// host object.

/// Type codes accepted in FFI signature strings, e.g. `"i32,text->ptr"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FfiType {
    I32,
    I64,
    F32,
    F64,
    Bool,
    Text,
    Ptr,
    Void,
    Cstring,
    Struct,
    Array,
    Callback,
}

/// A raw native pointer captured from or handed to native code.
#[derive(Debug)]
pub struct PtrInstance {
    address: usize,
}

impl PtrInstance {
    #[must_use]
    pub fn new(address: usize) -> Self {
        Self { address }
    }

    #[must_use]
    pub fn null() -> Self {
        Self { address: 0 }
    }

    #[must_use]
    pub fn address(&self) -> usize {
        self.address
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.address == 0
    }
}

/// An owned byte buffer whose base address can be passed to native code.
/// NUL-terminated when created via `ffi.cstring`.
#[derive(Debug)]
pub struct CBufferInstance {
    bytes: RefCell<Vec<u8>>,
}

impl CBufferInstance {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: RefCell::new(bytes) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.borrow().is_empty()
    }

    #[must_use]
    pub fn base_address(&self) -> usize {
        self.bytes.borrow().as_ptr() as usize
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }
}

/// A C struct description: ordered field types plus flattened storage.
#[derive(Debug)]
pub struct CStructInstance {
    field_types: Vec<FfiType>,
    data: RefCell<Vec<u8>>,
}

impl CStructInstance {
    #[must_use]
    pub fn new(field_types: Vec<FfiType>, data: Vec<u8>) -> Self {
        Self { field_types, data: RefCell::new(data) }
    }

    #[must_use]
    pub fn field_types(&self) -> &[FfiType] {
        &self.field_types
    }

    #[must_use]
    pub fn base_address(&self) -> usize {
        self.data.borrow().as_ptr() as usize
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.borrow().len()
    }
}

/// A fixed-length native array of one element type.
#[derive(Debug)]
pub struct CArrayInstance {
    element_type: FfiType,
    data: RefCell<Vec<u8>>,
    length: usize,
}

impl CArrayInstance {
    #[must_use]
    pub fn new(element_type: FfiType, data: Vec<u8>, length: usize) -> Self {
        Self { element_type, data: RefCell::new(data), length }
    }

    #[must_use]
    pub fn element_type(&self) -> FfiType {
        self.element_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[must_use]
    pub fn base_address(&self) -> usize {
        self.data.borrow().as_ptr() as usize
    }
}

/// A callback descriptor. Invoking native code back into the interpreter
/// is not supported; the descriptor exists so signatures mentioning
/// callbacks round-trip as values.
#[derive(Debug)]
pub struct CCallbackInstance {
    signature: String,
}

impl CCallbackInstance {
    #[must_use]
    pub fn new(signature: impl Into<String>) -> Self {
        Self { signature: signature.into() }
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// The FFI leaf of the value tag tree.
#[derive(Debug, Clone)]
pub enum FfiHandle {
    Ptr(Rc<PtrInstance>),
    Buffer(Rc<CBufferInstance>),
    Struct(Rc<CStructInstance>),
    Array(Rc<CArrayInstance>),
    Callback(Rc<CCallbackInstance>),
}

impl FfiHandle {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ptr(_) => "Ptr<Void>",
            Self::Buffer(_) => "CBuffer",
            Self::Struct(_) => "CStruct",
            Self::Array(_) => "CArray",
            Self::Callback(_) => "CCallback",
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Ptr(ptr) => {
                if ptr.is_null() {
                    "Ptr<Void>(null)".to_owned()
                } else {
                    format!("Ptr<Void>(0x{:x})", ptr.address())
                }
            }
            Self::Buffer(buf) => format!("CBuffer(size={})", buf.len()),
            Self::Struct(st) => format!("CStruct(fields={})", st.field_types().len()),
            Self::Array(arr) => format!("CArray<{}>(length={})", arr.element_type(), arr.len()),
            Self::Callback(cb) => format!("CCallback({})", cb.signature()),
        }
    }

    #[must_use]
    pub fn identity_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ptr(a), Self::Ptr(b)) => Rc::ptr_eq(a, b),
            (Self::Buffer(a), Self::Buffer(b)) => Rc::ptr_eq(a, b),
            (Self::Struct(a), Self::Struct(b)) => Rc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Callback(a), Self::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn type_codes_parse_lowercase() {
        assert_eq!(FfiType::from_str("i32").unwrap(), FfiType::I32);
        assert_eq!(FfiType::from_str("cstring").unwrap(), FfiType::Cstring);
        assert!(FfiType::from_str("quux").is_err());
    }

    #[test]
    fn null_pointer_renders_as_null() {
        let handle = FfiHandle::Ptr(Rc::new(PtrInstance::null()));
        assert_eq!(handle.render(), "Ptr<Void>(null)");
    }
}
