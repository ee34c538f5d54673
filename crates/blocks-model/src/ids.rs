/// Generate a fresh component identifier.
///
/// Identifiers are opaque to the store; UUID v4 keeps them unique without
/// coordination.
pub fn new_component_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = new_component_id();
        let b = new_component_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
