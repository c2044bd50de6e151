pub mod crm_records;
pub mod email;

pub use crm_records::CrmRecordService;
pub use email::EmailService;
