symbolic_enum! {
    /// Workflow state of a customer quote request.
    pub enum QuoteStatus {
        Unread => "UNREAD",
        Read => "READ",
        Pending => "PENDING",
        Processed => "PROCESSED",
        Responded => "RESPONDED",
        Archived => "ARCHIVED",
        Trash => "TRASH",
    }
}

impl Default for QuoteStatus {
    fn default() -> Self {
        Self::Unread
    }
}

impl QuoteStatus {
    /// Whether a quote in this status shows up in a list filtered by `filter`.
    /// An unfiltered list hides archived and trashed quotes.
    pub fn visible_in(self, filter: Option<QuoteStatus>) -> bool {
        match filter {
            Some(wanted) => self == wanted,
            None => !matches!(self, Self::Archived | Self::Trash),
        }
    }
}
