symbolic_enum! {
    /// How a product is shipped.
    pub enum ProductType {
        Chilled => "CHILLED",
        Frozen => "FROZEN",
    }
}
