pub mod admin_process;
pub mod observability;
pub mod restart;
pub mod worker_table;
