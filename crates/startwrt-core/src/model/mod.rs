// ── Domain model ──
//
// Sections, option values, section ids, and the change vocabulary the
// overlay records.

pub mod change;
pub mod section;
pub mod section_id;
pub mod value;

pub use change::{Change, ChangeOp, ChangeRecord, InvalidRecord};
pub use section::{Section, SectionRef, is_valid_name, is_valid_type};
pub use section_id::{PlaceholderId, SectionId};
pub use value::OptionValue;
