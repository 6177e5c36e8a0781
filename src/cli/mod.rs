pub mod assign_ids;
pub mod push;
