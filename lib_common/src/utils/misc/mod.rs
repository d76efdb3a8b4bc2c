/// System and process information helpers.
pub mod sys_info;
