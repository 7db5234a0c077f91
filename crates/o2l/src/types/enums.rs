use std::fmt::Write as _;

/// An enum declaration at runtime: the type descriptor holding its named
/// members and their integer values. Member access yields `Int`.
#[derive(Debug)]
pub struct EnumInstance {
    name: String,
    members: Vec<(String, i64)>,
}

impl EnumInstance {
    #[must_use]
    pub fn new(name: impl Into<String>, members: Vec<(String, i64)>) -> Self {
        Self { name: name.into(), members }
    }

    #[must_use]
    pub fn enum_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn member_value(&self, member: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| *value)
    }

    #[must_use]
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[must_use]
    pub fn render_detailed(&self) -> String {
        let mut out = format!("enum {} {{ ", self.name);
        for (i, (name, value)) in self.members.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{name} = {value}");
        }
        out.push_str(" }");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_lookup() {
        let colors = EnumInstance::new(
            "Color",
            vec![("RED".to_owned(), 0), ("GREEN".to_owned(), 1)],
        );
        assert_eq!(colors.member_value("GREEN"), Some(1));
        assert_eq!(colors.member_value("BLUE"), None);
        assert_eq!(
            colors.render_detailed(),
            "enum Color { RED = 0, GREEN = 1 }"
        );
    }
}
