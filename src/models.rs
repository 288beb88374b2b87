mod attempt;
mod policy;
mod recording;
mod types;
mod verdict;

pub use attempt::{Attempt, AttemptContext};
pub use policy::HomeworkPolicy;
pub use recording::Recording;
pub use types::{AttemptStatus, UserRole};
pub use verdict::{ReviewVerdict, VerdictRecord, MAX_FEEDBACK_LEN};

pub type AttemptId = i64;
pub type LessonId = i64;
pub type UserId = i64;
