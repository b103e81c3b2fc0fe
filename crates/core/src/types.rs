/// Chapter identifiers as assigned by the render service.
pub type ChapterId = i64;

/// 1-based position of a shot within its chapter.
pub type Ordinal = u32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
