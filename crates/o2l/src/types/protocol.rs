use std::fmt::Write as _;

/// A method signature inside a protocol declaration.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
}

/// A protocol: a named capability descriptor listing required method
/// signatures. Protocols carry no behaviour of their own.
#[derive(Debug)]
pub struct ProtocolInstance {
    name: String,
    signatures: Vec<MethodSignature>,
}

impl ProtocolInstance {
    #[must_use]
    pub fn new(name: impl Into<String>, signatures: Vec<MethodSignature>) -> Self {
        Self { name: name.into(), signatures }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signatures(&self) -> &[MethodSignature] {
        &self.signatures
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("Protocol {} {{ ", self.name);
        for (i, sig) in self.signatures.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(
                out,
                "method {}({}): {}",
                sig.name,
                sig.param_types.join(", "),
                sig.return_type
            );
        }
        out.push_str(" }");
        out
    }
}
