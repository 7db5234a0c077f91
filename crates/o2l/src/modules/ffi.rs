use std::{
    cell::RefCell,
    ffi::{CStr, CString},
    rc::Rc,
    str::FromStr,
};

use libloading::Library;
use log::{info, warn};

use crate::{
    exception::{EvalResult, Flow},
    modules::{int_arg, require_arity, text_arg},
    object::ObjectInstance,
    types::{
        CArrayInstance, CBufferInstance, CCallbackInstance, CStructInstance, ErrorInstance,
        FfiHandle, FfiType, PtrInstance, ResultInstance,
    },
    value::{type_name, Value},
};

// The ffi module is gated behind a process-wide enable flag (checked at
// import). Fallible operations return Result envelopes instead of
// raising, so native failures stay inspectable from user code.

/// Wraps a value in `Result.Success`.
fn ffi_success(value: Value) -> Value {
    let ty = type_name(&value);
    Value::Result(Rc::new(ResultInstance::success(value, &ty, "Error")))
}

/// Wraps a failure in `Result.Error` with the FFI error code.
fn ffi_error(message: impl Into<String>) -> Value {
    let error = Value::Error(Rc::new(ErrorInstance::new(message, "FFI_ERROR")));
    Value::Result(Rc::new(ResultInstance::error(error, "Value", "Error")))
}

pub(crate) fn create_ffi_object() -> Rc<ObjectInstance> {
    let ffi = Rc::new(ObjectInstance::new("ffi"));

    ffi.add_native("load", true, |args, _ctx| {
        require_arity("ffi.load()", args, 1)?;
        let path = text_arg("ffi.load()", args, 0)?;
        // SAFETY: loading a shared library runs its initialisers; that is
        // the entire point of the user-requested ffi.load call.
        match unsafe { Library::new(path) } {
            Ok(library) => {
                info!("ffi loaded {path}");
                Ok(ffi_success(create_library_object(path, library)))
            }
            Err(e) => Ok(ffi_error(format!("Cannot load library '{path}': {e}"))),
        }
    });

    ffi.add_native("getLastErrno", true, |args, _ctx| {
        require_arity("ffi.getLastErrno()", args, 0)?;
        Ok(Value::Int(i64::from(
            std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        )))
    });

    ffi.add_native("setPolicy", true, |args, _ctx| {
        require_arity("ffi.setPolicy()", args, 1)?;
        let policy = text_arg("ffi.setPolicy()", args, 0)?;
        match policy {
            "allow" | "deny" | "prompt" => {
                warn!("ffi.setPolicy('{policy}') is advisory; enforcement is the enable flag");
                Ok(Value::void())
            }
            _ => Err(Flow::eval(format!("Unknown FFI policy '{policy}'"))),
        }
    });

    ffi.add_native("ptr", true, |args, _ctx| {
        require_arity("ffi.ptr()", args, 1)?;
        let address = int_arg("ffi.ptr()", args, 0)?;
        Ok(Value::Ffi(FfiHandle::Ptr(Rc::new(PtrInstance::new(address as usize)))))
    });

    ffi.add_native("nullPtr", true, |args, _ctx| {
        require_arity("ffi.nullPtr()", args, 0)?;
        Ok(Value::Ffi(FfiHandle::Ptr(Rc::new(PtrInstance::null()))))
    });

    ffi.add_native("cstring", true, |args, _ctx| {
        require_arity("ffi.cstring()", args, 1)?;
        let text = text_arg("ffi.cstring()", args, 0)?;
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Ok(Value::Ffi(FfiHandle::Buffer(Rc::new(CBufferInstance::new(bytes)))))
    });

    ffi.add_native("struct", true, |args, _ctx| {
        require_arity("ffi.struct()", args, 1)?;
        let Some(Value::List(fields)) = args.first() else {
            return Err(Flow::eval("ffi.struct() argument must be a List of type codes"));
        };
        let mut field_types = Vec::new();
        let mut size = 0usize;
        for field in fields.values() {
            let Value::Text(code) = field else {
                return Err(Flow::eval("ffi.struct() type codes must be Text"));
            };
            let ty = FfiType::from_str(&code)
                .map_err(|_| Flow::eval(format!("Unknown FFI type code '{code}'")))?;
            size += scalar_size(ty)
                .ok_or_else(|| Flow::eval(format!("Type '{code}' is not a struct field type")))?;
            field_types.push(ty);
        }
        Ok(Value::Ffi(FfiHandle::Struct(Rc::new(CStructInstance::new(
            field_types,
            vec![0; size],
        )))))
    });

    ffi.add_native("array", true, |args, _ctx| {
        require_arity("ffi.array()", args, 2)?;
        let code = text_arg("ffi.array()", args, 0)?;
        let length = int_arg("ffi.array()", args, 1)?;
        if length < 0 {
            return Err(Flow::eval("ffi.array() length cannot be negative"));
        }
        let ty = FfiType::from_str(code)
            .map_err(|_| Flow::eval(format!("Unknown FFI type code '{code}'")))?;
        let elem = scalar_size(ty)
            .ok_or_else(|| Flow::eval(format!("Type '{code}' is not an array element type")))?;
        Ok(Value::Ffi(FfiHandle::Array(Rc::new(CArrayInstance::new(
            ty,
            vec![0; elem * length as usize],
            length as usize,
        )))))
    });

    ffi.add_native("callback", true, |args, _ctx| {
        require_arity("ffi.callback()", args, 1)?;
        let signature = text_arg("ffi.callback()", args, 0)?;
        parse_signature(signature)?;
        Ok(Value::Ffi(FfiHandle::Callback(Rc::new(CCallbackInstance::new(signature)))))
    });

    ffi.add_native("ptrToString", true, |args, _ctx| {
        require_arity("ffi.ptrToString()", args, 1)?;
        let address = ptr_argument(args)?;
        if address == 0 {
            return Ok(ffi_error("Cannot read string from null pointer"));
        }
        // SAFETY: the user asserted this address holds a NUL-terminated C
        // string; reading a bad pointer is inherent to raw FFI access.
        let text = unsafe { CStr::from_ptr(address as *const std::os::raw::c_char) }
            .to_string_lossy()
            .into_owned();
        Ok(ffi_success(Value::text(text)))
    });

    ffi.add_native("ptrToInt", true, |args, _ctx| {
        require_arity("ffi.ptrToInt()", args, 1)?;
        deref_scalar(args, |address| {
            // SAFETY: user-directed raw pointer read, as above.
            Value::Int(unsafe { *(address as *const i64) })
        })
    });

    ffi.add_native("ptrToDouble", true, |args, _ctx| {
        require_arity("ffi.ptrToDouble()", args, 1)?;
        deref_scalar(args, |address| {
            // SAFETY: user-directed raw pointer read, as above.
            Value::Double(unsafe { *(address as *const f64) })
        })
    });

    ffi.add_native("ptrToFloat", true, |args, _ctx| {
        require_arity("ffi.ptrToFloat()", args, 1)?;
        deref_scalar(args, |address| {
            // SAFETY: user-directed raw pointer read, as above.
            Value::Float(unsafe { *(address as *const f32) })
        })
    });

    ffi.add_native("ptrToBool", true, |args, _ctx| {
        require_arity("ffi.ptrToBool()", args, 1)?;
        deref_scalar(args, |address| {
            // SAFETY: user-directed raw pointer read, as above.
            Value::Bool(unsafe { *(address as *const u8) } != 0)
        })
    });

    ffi
}

fn ptr_argument(args: &[Value]) -> EvalResult<usize> {
    match args.first() {
        Some(Value::Ffi(FfiHandle::Ptr(ptr))) => Ok(ptr.address()),
        Some(Value::Ffi(FfiHandle::Buffer(buffer))) => Ok(buffer.base_address()),
        _ => Err(Flow::eval("Argument must be a Ptr")),
    }
}

fn deref_scalar(args: &[Value], read: impl Fn(usize) -> Value) -> EvalResult<Value> {
    let address = ptr_argument(args)?;
    if address == 0 {
        return Ok(ffi_error("Cannot dereference null pointer"));
    }
    Ok(ffi_success(read(address)))
}

fn scalar_size(ty: FfiType) -> Option<usize> {
    match ty {
        FfiType::I32 | FfiType::F32 | FfiType::Bool => Some(4),
        FfiType::I64 | FfiType::F64 | FfiType::Ptr => Some(8),
        _ => None,
    }
}

/// Parses `"i32,text->ptr"` into argument types and a return type.
fn parse_signature(signature: &str) -> EvalResult<(Vec<FfiType>, FfiType)> {
    let (params, ret) = signature
        .split_once("->")
        .ok_or_else(|| Flow::eval(format!("Invalid FFI signature '{signature}': missing '->'")))?;
    let ret = FfiType::from_str(ret.trim())
        .map_err(|_| Flow::eval(format!("Unknown FFI return type '{}'", ret.trim())))?;
    let mut arg_types = Vec::new();
    let params = params.trim();
    if !params.is_empty() && params != "void" {
        for code in params.split(',') {
            let ty = FfiType::from_str(code.trim())
                .map_err(|_| Flow::eval(format!("Unknown FFI argument type '{}'", code.trim())))?;
            arg_types.push(ty);
        }
    }
    Ok((arg_types, ret))
}

fn create_library_object(path: &str, library: Library) -> Value {
    let object = Rc::new(ObjectInstance::new("Library"));
    let library = Rc::new(RefCell::new(Some(library)));
    let path = path.to_owned();

    {
        let library = Rc::clone(&library);
        object.add_native("symbol", true, move |args, _ctx| {
            require_arity("Library.symbol()", args, 2)?;
            let name = text_arg("Library.symbol()", args, 0)?;
            let signature = text_arg("Library.symbol()", args, 1)?;
            let (arg_types, ret) = parse_signature(signature)?;
            if library.borrow().is_none() {
                return Ok(ffi_error("Library is closed"));
            }
            // Resolve eagerly so a missing symbol surfaces here, not at
            // call time.
            {
                let guard = library.borrow();
                let lib = guard.as_ref().expect("checked above");
                let mut symbol = name.as_bytes().to_vec();
                symbol.push(0);
                // SAFETY: only the address is probed; no call happens yet.
                if let Err(e) = unsafe { lib.get::<*const std::os::raw::c_void>(&symbol) } {
                    return Ok(ffi_error(format!("Symbol '{name}' not found: {e}")));
                }
            }
            Ok(ffi_success(create_native_fn_object(
                Rc::clone(&library),
                name,
                arg_types,
                ret,
            )))
        });
    }

    {
        let library = Rc::clone(&library);
        object.add_native("close", true, move |args, _ctx| {
            require_arity("Library.close()", args, 0)?;
            info!("ffi closing {path}");
            library.borrow_mut().take();
            Ok(Value::void())
        });
    }

    Value::Object(object)
}

fn create_native_fn_object(
    library: Rc<RefCell<Option<Library>>>,
    name: &str,
    arg_types: Vec<FfiType>,
    ret: FfiType,
) -> Value {
    let object = Rc::new(ObjectInstance::new("NativeFn"));
    let name = name.to_owned();

    object.add_native("call", true, move |args, _ctx| {
        if args.len() != arg_types.len() {
            return Ok(ffi_error(format!(
                "{name}() expects {} arguments, got {}",
                arg_types.len(),
                args.len()
            )));
        }
        let guard = library.borrow();
        let Some(lib) = guard.as_ref() else {
            return Ok(ffi_error("Library is closed"));
        };
        Ok(invoke(lib, &name, &arg_types, ret, args))
    });

    Value::Object(object)
}

/// The shapes of native call currently marshalled. Arguments of integer
/// class (including pointers and strings) pass through `u64` slots; pure
/// floating-point signatures use dedicated shapes. Anything else is
/// reported as an unsupported signature via the Result envelope.
fn invoke(lib: &Library, name: &str, arg_types: &[FfiType], ret: FfiType, args: &[Value]) -> Value {
    let mut symbol = name.as_bytes().to_vec();
    symbol.push(0);

    let int_class = arg_types.iter().all(|ty| {
        matches!(
            ty,
            FfiType::I32 | FfiType::I64 | FfiType::Bool | FfiType::Ptr | FfiType::Text | FfiType::Cstring
        )
    });
    // Only whole-f64 signatures take the float path; f32 arguments travel
    // in different register widths and are not marshalled here. A zero-arg
    // signature is vacuously both classes, so the return type decides.
    let float_class = arg_types.iter().all(|ty| matches!(ty, FfiType::F64));
    let use_float = float_class
        && arg_types.len() <= 2
        && matches!(ret, FfiType::F64 | FfiType::Void)
        && (!arg_types.is_empty() || ret == FfiType::F64);

    if int_class && !use_float && arg_types.len() <= 6 {
        // Owned C strings must outlive the native call.
        let mut keep_alive: Vec<CString> = Vec::new();
        let mut slots = [0u64; 6];
        for (i, (value, ty)) in args.iter().zip(arg_types).enumerate() {
            match marshal_int_slot(value, *ty, &mut keep_alive) {
                Ok(slot) => slots[i] = slot,
                Err(message) => return ffi_error(message),
            }
        }
        // SAFETY: the symbol is resolved from a user-loaded library and
        // called with the user-declared signature; passing surplus
        // integer-register arguments is benign for non-variadic C ABIs on
        // the supported targets.
        let raw = unsafe {
            let f = match lib.get::<unsafe extern "C" fn(u64, u64, u64, u64, u64, u64) -> u64>(&symbol) {
                Ok(f) => f,
                Err(e) => return ffi_error(format!("Symbol '{name}' not found: {e}")),
            };
            f(slots[0], slots[1], slots[2], slots[3], slots[4], slots[5])
        };
        return unmarshal_int_return(raw, ret);
    }

    if use_float {
        let mut floats = [0f64; 2];
        for (i, (value, ty)) in args.iter().zip(arg_types).enumerate() {
            floats[i] = match (value, ty) {
                (Value::Double(v), FfiType::F64) => *v,
                (Value::Int(v), FfiType::F64) => *v as f64,
                _ => {
                    return ffi_error(format!(
                        "Cannot marshal {} as {ty}",
                        type_name(value)
                    ));
                }
            };
        }
        // SAFETY: as above; float arguments travel in float registers.
        let raw = unsafe {
            match args.len() {
                0 => match lib.get::<unsafe extern "C" fn() -> f64>(&symbol) {
                    Ok(f) => f(),
                    Err(e) => return ffi_error(format!("Symbol '{name}' not found: {e}")),
                },
                1 => match lib.get::<unsafe extern "C" fn(f64) -> f64>(&symbol) {
                    Ok(f) => f(floats[0]),
                    Err(e) => return ffi_error(format!("Symbol '{name}' not found: {e}")),
                },
                _ => match lib.get::<unsafe extern "C" fn(f64, f64) -> f64>(&symbol) {
                    Ok(f) => f(floats[0], floats[1]),
                    Err(e) => return ffi_error(format!("Symbol '{name}' not found: {e}")),
                },
            }
        };
        return match ret {
            FfiType::F64 => ffi_success(Value::Double(raw)),
            _ => ffi_success(Value::void()),
        };
    }

    ffi_error(format!(
        "Unsupported FFI signature: {} -> {ret}",
        arg_types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    ))
}

fn marshal_int_slot(
    value: &Value,
    ty: FfiType,
    keep_alive: &mut Vec<CString>,
) -> Result<u64, String> {
    match (value, ty) {
        (Value::Int(v), FfiType::I32) => Ok(*v as i32 as u32 as u64),
        (Value::Int(v), FfiType::I64) => Ok(*v as u64),
        (Value::Long(v), FfiType::I64) => Ok(*v as i64 as u64),
        (Value::Bool(v), FfiType::Bool) => Ok(u64::from(*v)),
        (Value::Text(s), FfiType::Text | FfiType::Cstring) => {
            let cstring = CString::new(s.as_bytes())
                .map_err(|_| "Text argument contains an interior NUL".to_owned())?;
            let address = cstring.as_ptr() as u64;
            keep_alive.push(cstring);
            Ok(address)
        }
        (Value::Ffi(FfiHandle::Ptr(ptr)), FfiType::Ptr) => Ok(ptr.address() as u64),
        (Value::Ffi(FfiHandle::Buffer(buffer)), FfiType::Ptr) => Ok(buffer.base_address() as u64),
        (Value::Ffi(FfiHandle::Struct(st)), FfiType::Ptr) => Ok(st.base_address() as u64),
        (Value::Ffi(FfiHandle::Array(arr)), FfiType::Ptr) => Ok(arr.base_address() as u64),
        _ => Err(format!("Cannot marshal {} as {ty}", type_name(value))),
    }
}

fn unmarshal_int_return(raw: u64, ret: FfiType) -> Value {
    match ret {
        FfiType::Void => ffi_success(Value::void()),
        FfiType::I32 => ffi_success(Value::Int(i64::from(raw as u32 as i32))),
        FfiType::I64 => ffi_success(Value::Int(raw as i64)),
        FfiType::Bool => ffi_success(Value::Bool(raw & 0xFF != 0)),
        FfiType::Ptr => ffi_success(Value::Ffi(FfiHandle::Ptr(Rc::new(PtrInstance::new(
            raw as usize,
        ))))),
        FfiType::Text | FfiType::Cstring => {
            if raw == 0 {
                return ffi_error("Native function returned a null string");
            }
            // SAFETY: the user-declared return type asserts this is a
            // NUL-terminated C string.
            let text = unsafe { CStr::from_ptr(raw as *const std::os::raw::c_char) }
                .to_string_lossy()
                .into_owned();
            ffi_success(Value::text(text))
        }
        FfiType::F32 | FfiType::F64 | FfiType::Struct | FfiType::Array | FfiType::Callback => {
            ffi_error(format!("Unsupported return type {ret} for integer-class call"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_parsing() {
        let (args, ret) = parse_signature("i32,i32->i32").unwrap();
        assert_eq!(args, vec![FfiType::I32, FfiType::I32]);
        assert_eq!(ret, FfiType::I32);

        let (args, ret) = parse_signature("->void").unwrap();
        assert!(args.is_empty());
        assert_eq!(ret, FfiType::Void);

        assert!(parse_signature("i32,i32").is_err());
        assert!(parse_signature("i32->quux").is_err());
    }
}
