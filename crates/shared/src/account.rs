symbolic_enum! {
    /// Role carried in the session token.
    pub enum Role {
        Admin => "ADMIN",
        User => "USER",
    }
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }
}
