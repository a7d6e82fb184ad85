use bot_core::domains::documents::Document;
use chrono::{TimeZone, Utc};

/// A document published on 21 March 2025 at 10:`minute` UTC.
pub fn document(title: &str, minute: u32) -> Document {
    Document::new(
        title,
        format!(
            "https://www.fia.com/sites/default/files/decision-document/{}.pdf",
            title.replace(' ', "_")
        ),
        Utc.with_ymd_and_hms(2025, 3, 21, 10, minute, 0).unwrap(),
    )
}
