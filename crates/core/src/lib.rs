#![forbid(unsafe_code)]

pub mod scrape;

pub mod ids {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FolderId(i64);

    impl FolderId {
        pub fn new(raw: i64) -> Self {
            Self(raw)
        }

        pub fn as_i64(self) -> i64 {
            self.0
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NoteId(i64);

    impl NoteId {
        pub fn new(raw: i64) -> Self {
            Self(raw)
        }

        pub fn as_i64(self) -> i64 {
            self.0
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TagId(i64);

    impl TagId {
        pub fn new(raw: i64) -> Self {
            Self(raw)
        }

        pub fn as_i64(self) -> i64 {
            self.0
        }
    }
}

pub mod model {
    /// One row of the note list as the summary view shows it. The list
    /// exposes no stable per-item identifier, so this triple doubles as
    /// the item's identity for stall detection.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ItemSummary {
        pub title: String,
        pub modified: String,
        pub legacy_created: Option<String>,
    }

    /// Fields read from an item's opened info panel.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ItemDetail {
        pub folder: String,
        pub parent_path: String,
        pub modified: String,
        pub created: String,
    }
}
