pub mod appointments;
pub mod audit_logs;
pub mod service_appointments;
pub mod services;
pub mod users;

pub use appointments::Entity as Appointments;
pub use audit_logs::Entity as AuditLogs;
pub use service_appointments::Entity as ServiceAppointments;
pub use services::Entity as Services;
pub use users::Entity as Users;
