pub mod capture;
pub mod review;
pub mod reward;
pub mod submission;
pub(crate) mod wav;
