use shelf_catalog::{Book, CopySlot, Hash};

/// What importing a candidate into a given book amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No book describes the candidate yet.
    CreateWork,
    /// The requested slot is free. For a retail copy, an existing non-retail
    /// copy is trumped.
    AttachCopy { id: u64 },
    /// The flagged retail copy gives way; any non-retail copy is trumped too.
    ReplaceRetail { id: u64 },
    /// The flagged non-retail copy gives way.
    ReplaceNonRetail { id: u64 },
    /// The book already holds this content, or the slot is taken by a copy
    /// nobody asked to replace.
    RejectDuplicate { id: u64 },
    /// A non-retail candidate for a book that already has its retail copy.
    RejectSuperseded { id: u64 },
}

impl Decision {
    /// Whether carrying out the decision discards a file the user kept.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::ReplaceRetail { .. } | Self::ReplaceNonRetail { .. })
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RejectDuplicate { .. } | Self::RejectSuperseded { .. })
    }
}

/// Decides how a candidate with content `hash`, meant for `slot`, relates to
/// the `book` it was matched with.
pub fn resolve(book: Option<&Book>, hash: &Hash, slot: CopySlot) -> Decision {
    let Some(book) = book else {
        return Decision::CreateWork;
    };
    let id = book.id;
    if book.holds_hash(hash.as_str()) {
        return Decision::RejectDuplicate { id };
    }
    match slot {
        CopySlot::Retail => match &book.retail {
            None => Decision::AttachCopy { id },
            Some(retail) if retail.needs_replacement => Decision::ReplaceRetail { id },
            Some(_) => Decision::RejectDuplicate { id },
        },
        CopySlot::NonRetail if book.retail.is_some() => Decision::RejectSuperseded { id },
        CopySlot::NonRetail => match &book.non_retail {
            None => Decision::AttachCopy { id },
            Some(non_retail) if non_retail.needs_replacement => Decision::ReplaceNonRetail { id },
            Some(_) => Decision::RejectDuplicate { id },
        },
    }
}
