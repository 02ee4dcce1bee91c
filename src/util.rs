/// Short display name for a product identifier: the component after the
/// last dot (`com.example.app.pro` -> `pro`). Returns `None` for
/// identifiers without a dot.
pub fn resource_name(product_id: &str) -> Option<&str> {
    product_id.rsplit_once('.').map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_the_trailing_component() {
        assert_eq!(resource_name("com.example.app.pro"), Some("pro"));
        assert_eq!(resource_name("nodots"), None);
    }
}
